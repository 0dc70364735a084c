use group_service::{config::GroupServiceConfig, Application};
use service_core::observability::init_tracing;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration - fail fast if invalid
    let config = GroupServiceConfig::load()?;

    init_tracing(
        &config.service_name,
        &config.server.log_level,
        &config.server.otlp_endpoint,
    )?;

    tracing::info!(
        service = %config.service_name,
        version = env!("CARGO_PKG_VERSION"),
        "Starting group service"
    );

    let application = Application::build(config).await?;
    application.run_until_stopped().await?;

    Ok(())
}
