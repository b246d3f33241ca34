use stadium_alerts::config::AppConfig;
use stadium_alerts::service::AlertService;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load config
    let config = AppConfig::load()?;

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(&config.log_level)
        .init();

    info!(
        "Starting Stadium Alert Service (simulator {}:{} -> clients {}:{})...",
        config.simulator_broker, config.simulator_port, config.client_broker, config.client_port
    );

    let service = AlertService::new(config);
    service.run().await?;

    Ok(())
}
