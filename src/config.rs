use anyhow::Result;
use dotenvy::dotenv;
use serde::Deserialize;
use std::env;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub simulator_broker: String,
    pub simulator_port: u16,
    pub client_broker: String,
    pub client_port: u16,
    pub simulator_topic: String,
    pub client_topic_prefix: String,
    pub broadcast_topic: String,
    pub mqtt_client_id: String,
    pub mqtt_keep_alive_secs: u64,
    pub mqtt_connect_timeout_secs: u64,
    pub mqtt_reconnect_initial_ms: u64,
    pub mqtt_reconnect_max_ms: u64,
    pub inbound_channel_capacity: usize,
    pub log_level: String,
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        dotenv().ok();
        Ok(Self::from_lookup(|key| env::var(key).ok()))
    }

    /// Builds the config from an arbitrary key lookup. `load` feeds it the
    /// process environment.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let text = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());
        let number = |key: &str, fallback: Option<&str>, default: &str| -> String {
            lookup(key)
                .or_else(|| fallback.and_then(|f| lookup(f)))
                .unwrap_or_else(|| default.to_string())
        };

        let simulator_broker = lookup("SIMULATOR_BROKER")
            .or_else(|| lookup("MQTT_BROKER"))
            .unwrap_or_else(|| "localhost".to_string());
        let simulator_port = parse_or(&number("SIMULATOR_PORT", Some("MQTT_PORT"), "1883"), 1883);
        let client_broker = lookup("CLIENT_BROKER")
            .or_else(|| lookup("MQTT_BROKER"))
            .unwrap_or_else(|| "localhost".to_string());
        let client_port = parse_or(&number("CLIENT_PORT", Some("MQTT_PORT"), "1884"), 1884);

        let simulator_topic = text("SIMULATOR_TOPIC", "stadium/events/alerts");
        let client_topic_prefix = text("CLIENT_TOPIC_PREFIX", "alerts/client");
        let broadcast_topic = text("BROADCAST_TOPIC", "alerts/broadcast");
        let mqtt_client_id = text("MQTT_CLIENT_ID", "alert_service");

        let mqtt_keep_alive_secs = parse_or(&number("MQTT_KEEP_ALIVE_SECS", None, "60"), 60);
        let mqtt_connect_timeout_secs =
            parse_or(&number("MQTT_CONNECT_TIMEOUT_SECS", None, "10"), 10);
        let mqtt_reconnect_initial_ms =
            parse_or(&number("MQTT_RECONNECT_INITIAL_MS", None, "500"), 500);
        let mqtt_reconnect_max_ms = parse_or(&number("MQTT_RECONNECT_MAX_MS", None, "30000"), 30000);
        let inbound_channel_capacity =
            parse_or(&number("INBOUND_CHANNEL_CAPACITY", None, "100"), 100usize).max(1);

        let log_level = text("LOG_LEVEL", "info");

        Self {
            simulator_broker,
            simulator_port,
            client_broker,
            client_port,
            simulator_topic,
            client_topic_prefix,
            broadcast_topic,
            mqtt_client_id,
            mqtt_keep_alive_secs,
            mqtt_connect_timeout_secs,
            mqtt_reconnect_initial_ms,
            mqtt_reconnect_max_ms,
            inbound_channel_capacity,
            log_level,
        }
    }

    pub fn keep_alive(&self) -> Duration {
        Duration::from_secs(self.mqtt_keep_alive_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.mqtt_connect_timeout_secs)
    }

    pub fn reconnect_initial(&self) -> Duration {
        Duration::from_millis(self.mqtt_reconnect_initial_ms)
    }

    pub fn reconnect_max(&self) -> Duration {
        Duration::from_millis(self.mqtt_reconnect_max_ms.max(self.mqtt_reconnect_initial_ms))
    }

    /// Topic a single subscriber listens on: `{prefix}/{client_id}`.
    pub fn client_topic(&self, client_id: &str) -> String {
        format!("{}/{}", self.client_topic_prefix, client_id)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

fn parse_or<T: FromStr>(raw: &str, default: T) -> T {
    raw.trim().parse().unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_allow_local_operation() {
        let config = AppConfig::default();
        assert_eq!(config.simulator_broker, "localhost");
        assert_eq!(config.simulator_port, 1883);
        assert_eq!(config.client_broker, "localhost");
        assert_eq!(config.client_port, 1884);
        assert_eq!(config.simulator_topic, "stadium/events/alerts");
        assert_eq!(config.client_topic_prefix, "alerts/client");
        assert_eq!(config.broadcast_topic, "alerts/broadcast");
        assert_eq!(config.log_level, "info");
        assert_eq!(config.keep_alive(), Duration::from_secs(60));
    }

    #[test]
    fn test_single_broker_variables_apply_to_both_legs() {
        let config = AppConfig::from_lookup(lookup_from(&[
            ("MQTT_BROKER", "broker.local"),
            ("MQTT_PORT", "2883"),
            ("SIMULATOR_TOPIC", "stadium/events/emergency"),
        ]));
        assert_eq!(config.simulator_broker, "broker.local");
        assert_eq!(config.client_broker, "broker.local");
        assert_eq!(config.simulator_port, 2883);
        assert_eq!(config.client_port, 2883);
        assert_eq!(config.simulator_topic, "stadium/events/emergency");
    }

    #[test]
    fn test_specific_variables_win_over_shared_ones() {
        let config = AppConfig::from_lookup(lookup_from(&[
            ("MQTT_BROKER", "shared"),
            ("SIMULATOR_BROKER", "sim"),
            ("CLIENT_BROKER", "clients"),
            ("MQTT_PORT", "2883"),
            ("CLIENT_PORT", "9001"),
        ]));
        assert_eq!(config.simulator_broker, "sim");
        assert_eq!(config.client_broker, "clients");
        assert_eq!(config.client_port, 9001);
        assert_eq!(config.simulator_port, 2883);
    }

    #[test]
    fn test_unparseable_numbers_fall_back() {
        let config = AppConfig::from_lookup(lookup_from(&[
            ("SIMULATOR_PORT", "not-a-port"),
            ("INBOUND_CHANNEL_CAPACITY", "0"),
            ("MQTT_RECONNECT_INITIAL_MS", "5000"),
            ("MQTT_RECONNECT_MAX_MS", "100"),
        ]));
        assert_eq!(config.simulator_port, 1883);
        assert_eq!(config.inbound_channel_capacity, 1);
        assert_eq!(config.reconnect_max(), Duration::from_millis(5000));
    }

    #[test]
    fn test_client_topic() {
        let config = AppConfig::default();
        assert_eq!(config.client_topic("c42"), "alerts/client/c42");
    }
}
