pub mod auth;
pub mod metrics;

pub use auth::{AuthenticatedClient, bearer_auth_middleware, require_client_credentials};
pub use metrics::metrics_middleware;
