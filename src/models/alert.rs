use chrono::{DateTime, FixedOffset, Local};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertType {
    Fire,
    Security,
    Medical,
    Evacuation,
}

impl AlertType {
    /// Maps a producer event type onto an alert type. Unknown types become
    /// `Security` rather than being rejected.
    pub fn classify(event_type: &str) -> Self {
        match event_type.trim().to_uppercase().as_str() {
            "FIRE" | "FIRE_ALERT" => AlertType::Fire,
            "SECURITY" => AlertType::Security,
            "MEDICAL" => AlertType::Medical,
            "EVACUATION" => AlertType::Evacuation,
            _ => AlertType::Security,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AlertType::Fire => "FIRE",
            AlertType::Security => "SECURITY",
            AlertType::Medical => "MEDICAL",
            AlertType::Evacuation => "EVACUATION",
        }
    }
}

impl fmt::Display for AlertType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Internal alert, numbered by the relay that created it.
#[derive(Debug, Clone, PartialEq)]
pub struct Alert {
    pub id: u64,
    pub alert_type: AlertType,
    pub disabled_tiles: Vec<i64>,
    pub message: String,
    pub timestamp: DateTime<FixedOffset>,
    pub severity: String,
}

impl Alert {
    pub const DEFAULT_SEVERITY: &'static str = "HIGH";

    /// Alert with no source event: current time, `HIGH` severity, no tiles.
    pub fn new(id: u64, alert_type: AlertType, message: impl Into<String>) -> Self {
        Self {
            id,
            alert_type,
            disabled_tiles: Vec::new(),
            message: message.into(),
            timestamp: Local::now().fixed_offset(),
            severity: Self::DEFAULT_SEVERITY.to_string(),
        }
    }

    pub fn with_disabled_tiles(mut self, tiles: Vec<i64>) -> Self {
        self.disabled_tiles = tiles;
        self
    }
}

/// Wire format delivered to subscribers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientAlert {
    pub alert_id: u64,
    pub alert_type: String,
    pub message: String,
    pub timestamp: String,
    pub severity: String,
    #[serde(default)]
    pub affected_areas: Vec<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification_is_case_insensitive() {
        assert_eq!(AlertType::classify("fire"), AlertType::Fire);
        assert_eq!(AlertType::classify("FIRE"), AlertType::Fire);
        assert_eq!(AlertType::classify("Fire_Alert"), AlertType::Fire);
        assert_eq!(AlertType::classify("medical"), AlertType::Medical);
        assert_eq!(AlertType::classify("EVACUATION"), AlertType::Evacuation);
        assert_eq!(AlertType::classify("security"), AlertType::Security);
    }

    #[test]
    fn test_unknown_types_default_to_security() {
        assert_eq!(AlertType::classify("WEATHER"), AlertType::Security);
        assert_eq!(AlertType::classify(""), AlertType::Security);
        assert_eq!(AlertType::classify("🔥"), AlertType::Security);
    }

    #[test]
    fn test_alert_type_serializes_as_canonical_string() {
        assert_eq!(
            serde_json::to_string(&AlertType::Evacuation).unwrap(),
            "\"EVACUATION\""
        );
        assert_eq!(AlertType::Medical.to_string(), "MEDICAL");
    }

    #[test]
    fn test_standalone_alert_defaults() {
        let alert = Alert::new(7, AlertType::Fire, "drill");
        assert_eq!(alert.severity, "HIGH");
        assert!(alert.disabled_tiles.is_empty());

        let alert = alert.with_disabled_tiles(vec![3, 1, 2]);
        assert_eq!(alert.disabled_tiles, vec![3, 1, 2]);
    }

    #[test]
    fn test_client_alert_json_round_trip() {
        let sent = ClientAlert {
            alert_id: 12,
            alert_type: "FIRE".to_string(),
            message: "FIRE: Fire in B".to_string(),
            timestamp: "2025-06-01T18:30:00.123456+00:00".to_string(),
            severity: "CRITICAL".to_string(),
            affected_areas: vec![202, 101, 102],
        };
        let body = serde_json::to_vec(&sent).unwrap();
        let received: ClientAlert = serde_json::from_slice(&body).unwrap();
        assert_eq!(received, sent);
    }
}
