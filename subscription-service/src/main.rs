use service_core::observability::init_tracing;
use subscription_service::config::SubscriptionConfig;
use subscription_service::services::init_metrics;
use subscription_service::Application;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = SubscriptionConfig::load()?;

    init_tracing(
        "subscription-service",
        &config.common.log_level,
        config.otlp_endpoint.as_deref(),
    );

    if let Err(e) = init_metrics() {
        tracing::warn!("Metrics disabled: {}", e);
    }

    let application = Application::build(config).await?;
    application.run_until_stopped().await?;

    Ok(())
}
