use gateway_service::{config::Config, Application};
use service_core::observability::init_tracing;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let log_level =
        std::env::var("RUST_LOG").unwrap_or_else(|_| "info,gateway_service=debug".into());
    let otlp_endpoint = std::env::var("GATEWAY_OTLP_ENDPOINT").ok();
    init_tracing("gateway-service", &log_level, otlp_endpoint.as_deref());

    let config = Config::from_env().expect("Failed to load configuration");
    let application = Application::build(config).await?;
    application.run_until_stopped().await?;

    Ok(())
}
