pub mod cache;
pub mod chain;
pub mod validator;

pub use cache::DecisionCache;
pub use chain::TokenValidationChain;
pub use validator::{RemoteIntrospectionValidator, TokenValidator, ValidatorError};
