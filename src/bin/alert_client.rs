//! Example subscriber: listens on the broadcast topic and on its own client
//! topic and logs every alert it receives.
//!
//! Usage: `alert_client [client_id]`

use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use stadium_alerts::config::AppConfig;
use stadium_alerts::models::ClientAlert;
use std::time::Duration;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::load()?;
    tracing_subscriber::fmt()
        .with_env_filter(&config.log_level)
        .init();

    let client_id = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "client_123".to_string());
    let own_topic = config.client_topic(&client_id);

    let mut options = MqttOptions::new(
        format!("alert_client_{}", client_id),
        &config.client_broker,
        config.client_port,
    );
    options.set_keep_alive(config.keep_alive());

    let (client, mut eventloop) = AsyncClient::new(options, 10);
    info!(
        "Connecting to MQTT broker at {}:{} as {}",
        config.client_broker, config.client_port, client_id
    );

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Disconnecting...");
                client.try_disconnect()?;
                break;
            }
            notification = eventloop.poll() => match notification {
                Ok(Event::Incoming(Packet::ConnAck(_))) => {
                    info!("Connected to MQTT broker");
                    client.try_subscribe(&config.broadcast_topic, QoS::AtLeastOnce)?;
                    client.try_subscribe(&own_topic, QoS::AtLeastOnce)?;
                    info!("Subscribed to {} and {}", config.broadcast_topic, own_topic);
                }
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    match serde_json::from_slice::<ClientAlert>(&publish.payload) {
                        Ok(alert) => info!(
                            topic = %publish.topic,
                            alert_id = alert.alert_id,
                            alert_type = %alert.alert_type,
                            severity = %alert.severity,
                            timestamp = %alert.timestamp,
                            affected_areas = ?alert.affected_areas,
                            "ALERT RECEIVED: {}",
                            alert.message
                        ),
                        Err(e) => warn!("Failed to decode alert on {}: {}", publish.topic, e),
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    error!("MQTT connection error: {}", e);
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
            },
        }
    }

    Ok(())
}
