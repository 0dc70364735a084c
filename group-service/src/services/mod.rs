pub mod aggregation;
pub mod metrics;
pub mod providers;
pub mod registry;
pub mod token;

pub use aggregation::GroupAggregationEngine;
pub use registry::ProviderRegistry;
pub use token::{DecisionCache, TokenValidationChain};
