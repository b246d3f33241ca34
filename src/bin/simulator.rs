//! Publishes a fixed series of stadium emergencies to the simulator topic.

use chrono::Local;
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use serde_json::{json, Value};
use stadium_alerts::config::AppConfig;
use stadium_alerts::models::EmergencyEvent;
use std::time::Duration;
use tracing::{error, info};
use uuid::Uuid;

const EVENT_INTERVAL: Duration = Duration::from_secs(3);

fn scenario() -> Vec<(&'static str, &'static str, Value)> {
    vec![
        (
            "FIRE",
            "HIGH",
            json!({
                "description": "Fire detected in section B",
                "disabled_tiles": [101, 102, 103, 201, 202],
            }),
        ),
        (
            "SECURITY",
            "MEDIUM",
            json!({
                "description": "Security incident near gate 4",
                "disabled_tiles": [405, 406],
            }),
        ),
        (
            "MEDICAL",
            "HIGH",
            json!({
                "description": "Medical emergency in section C",
                "disabled_tiles": [301],
            }),
        ),
        (
            "EVACUATION",
            "CRITICAL",
            json!({
                "description": "Evacuation required - all sections",
                "disabled_tiles": (100..500).collect::<Vec<i64>>(),
            }),
        ),
    ]
}

fn make_event(index: usize, event_type: &str, severity: &str, metadata: Value) -> EmergencyEvent {
    let sections = ["A", "B", "C", "D"];
    EmergencyEvent {
        event_id: format!("evt_{}_{}", Local::now().timestamp(), index),
        event_type: event_type.to_string(),
        timestamp: Local::now().fixed_offset(),
        severity: severity.to_string(),
        location_id: None,
        location: json!({"section": sections[index % sections.len()], "level": index % 3 + 1})
            .as_object()
            .cloned(),
        metadata: metadata.as_object().cloned(),
        details: None,
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::load()?;
    tracing_subscriber::fmt()
        .with_env_filter(&config.log_level)
        .init();

    let client_id = format!("stadium_simulator-{}", Uuid::new_v4().simple());
    let mut options = MqttOptions::new(client_id, &config.simulator_broker, config.simulator_port);
    options.set_keep_alive(config.keep_alive());

    let (client, mut eventloop) = AsyncClient::new(options, 10);
    info!(
        "Connecting to MQTT broker at {}:{}",
        config.simulator_broker, config.simulator_port
    );

    let driver = tokio::spawn(async move {
        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Packet::ConnAck(_))) => info!("Connected successfully"),
                Ok(Event::Incoming(Packet::PubAck(ack))) => info!("Broker acknowledged packet {}", ack.pkid),
                Ok(_) => {}
                Err(e) => {
                    error!("MQTT connection error: {}", e);
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
            }
        }
    });

    let events = scenario();
    let total = events.len();
    for (i, (event_type, severity, metadata)) in events.into_iter().enumerate() {
        let event = make_event(i, event_type, severity, metadata);
        let payload = serde_json::to_vec(&event)?;
        client
            .publish(&config.simulator_topic, QoS::AtLeastOnce, false, payload)
            .await?;
        info!(
            "[Event {}/{}] Published {} event {} (severity {})",
            i + 1,
            total,
            event.event_type,
            event.event_id,
            event.severity
        );
        tokio::time::sleep(EVENT_INTERVAL).await;
    }

    info!("All test events published");
    client.disconnect().await?;
    tokio::time::sleep(Duration::from_millis(500)).await;
    driver.abort();
    Ok(())
}
