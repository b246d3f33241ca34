use crate::config::AppConfig;
use crate::models::EmergencyEvent;
use crate::relay::RelayHandler;
use serde_json::Value;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn};

/// Details key listing subscribers that also get the alert on their own topic.
pub const TARGET_CLIENTS_KEY: &str = "target_clients";

pub struct AlertService {
    relay: Arc<RelayHandler>,
}

impl AlertService {
    pub fn new(config: AppConfig) -> Self {
        Self::from_relay(Arc::new(RelayHandler::new(config)))
    }

    /// Wraps an existing relay and installs the service's event processing.
    pub fn from_relay(relay: Arc<RelayHandler>) -> Self {
        relay.set_event_hook(process_emergency_event);
        Self { relay }
    }

    pub fn relay(&self) -> &Arc<RelayHandler> {
        &self.relay
    }

    /// Runs until SIGINT or SIGTERM, then stops the relay once. Only a
    /// startup connection failure is returned as an error.
    pub async fn run(&self) -> anyhow::Result<()> {
        info!("Starting Alert Service...");
        self.relay.start().await?;
        info!("Alert Service is running. Press Ctrl+C to stop.");

        shutdown_signal().await;

        info!("Shutting down gracefully...");
        self.relay.stop().await;
        info!("Alert Service stopped.");
        Ok(())
    }
}

/// Builds one alert per event, broadcasts it, and also delivers it to any
/// client listed under `target_clients` in the event details.
pub fn process_emergency_event(relay: &RelayHandler, event: EmergencyEvent) {
    info!("Processing emergency event: {}", event.event_type);

    let alert = relay.build_alert(&event);
    relay.broadcast(&alert);

    for client_id in target_clients(&event) {
        relay.send_to_client(&client_id, &alert);
    }
}

fn target_clients(event: &EmergencyEvent) -> Vec<String> {
    match event.details_source().get(TARGET_CLIENTS_KEY) {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .collect(),
        Some(other) => {
            warn!(
                "Event {} has non-array {}: {}",
                event.event_id, TARGET_CLIENTS_KEY, other
            );
            Vec::new()
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C"),
        _ = terminate => info!("Received SIGTERM"),
    }
}
