//! Application startup and lifecycle management.
//!
//! Configuration is turned into providers, the registry, the aggregation
//! engine and the validation chain here, once. Any misconfiguration fails
//! `build` before a listener is bound.

use crate::config::GroupServiceConfig;
use crate::services::{metrics, GroupAggregationEngine, ProviderRegistry, TokenValidationChain};
use crate::{build_router, AppState};
use axum::Router;
use service_core::error::AppError;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::task::JoinHandle;

/// Application container for managing server lifecycle.
pub struct Application {
    port: u16,
    listener: TcpListener,
    router: Router,
    state: AppState,
    eviction: Option<JoinHandle<()>>,
}

impl Application {
    /// Build the application with the given configuration.
    pub async fn build(config: GroupServiceConfig) -> Result<Self, AppError> {
        metrics::init_metrics().map_err(|e| {
            tracing::error!("Failed to initialize metrics: {}", e);
            AppError::InternalError(e.into())
        })?;

        let provider_configs = config.provider_configs()?;
        let registry = ProviderRegistry::from_configs(provider_configs)?;
        tracing::info!(
            providers = registry.len(),
            authoritative = registry.authoritative().count(),
            "Group providers configured"
        );

        config.validate_token_validators()?;
        let token_chain =
            TokenValidationChain::from_config(&config.token_validators, &config.decision_cache)?;
        if config.token_validators.is_empty() {
            tracing::warn!("No token validators configured - every bearer token will be rejected");
        }

        let eviction = token_chain.cache().map(|cache| {
            tracing::info!(
                ttl_ms = config.decision_cache.ttl_ms,
                eviction_interval_ms = config.decision_cache.eviction_interval_ms,
                "Token decision cache enabled"
            );
            cache.spawn_eviction(config.decision_cache.eviction_interval())
        });

        let state = AppState {
            engine: GroupAggregationEngine::new(registry),
            token_chain,
            required_scope: config.required_scope.as_str().into(),
        };
        let router = build_router(state.clone());

        // Port 0 binds a random port for testing
        let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            tracing::error!("Failed to bind HTTP listener to {}: {}", addr, e);
            AppError::from(e)
        })?;
        let port = listener.local_addr()?.port();

        tracing::info!(
            service = %config.service_name,
            port,
            "Group service ready"
        );

        Ok(Self {
            port,
            listener,
            router,
            state,
            eviction,
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn state(&self) -> AppState {
        self.state.clone()
    }

    /// Serve until SIGINT or SIGTERM, then drain in-flight requests.
    pub async fn run_until_stopped(self) -> std::io::Result<()> {
        let result = axum::serve(self.listener, self.router)
            .with_graceful_shutdown(shutdown_signal())
            .await;

        if let Some(eviction) = self.eviction {
            eviction.abort();
        }

        tracing::info!("Service shutdown complete");
        result
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received SIGINT, starting graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        },
    }
}
