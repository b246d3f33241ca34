use crate::models::{Alert, ClientAlert};

pub fn project(alert: &Alert) -> ClientAlert {
    ClientAlert {
        alert_id: alert.id,
        alert_type: alert.alert_type.as_str().to_string(),
        message: alert.message.clone(),
        timestamp: alert.timestamp.to_rfc3339(),
        severity: alert.severity.clone(),
        affected_areas: alert.disabled_tiles.clone(),
    }
}

impl From<&Alert> for ClientAlert {
    fn from(alert: &Alert) -> Self {
        project(alert)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::event::parse_iso8601;
    use crate::models::AlertType;

    fn alert() -> Alert {
        Alert {
            id: 1,
            alert_type: AlertType::Fire,
            disabled_tiles: vec![102, 101, 330],
            message: "FIRE: Fire in B".to_string(),
            timestamp: parse_iso8601("2025-06-01T18:30:00.250+02:00").unwrap(),
            severity: "HIGH".to_string(),
        }
    }

    #[test]
    fn test_projection_fields() {
        let client = project(&alert());
        assert_eq!(client.alert_id, 1);
        assert_eq!(client.alert_type, "FIRE");
        assert_eq!(client.message, "FIRE: Fire in B");
        assert_eq!(client.severity, "HIGH");
        assert_eq!(client.affected_areas, vec![102, 101, 330]);
    }

    #[test]
    fn test_timestamp_is_iso8601_and_lossless() {
        let source = alert();
        let client = project(&source);
        assert_eq!(client.timestamp, "2025-06-01T18:30:00.250+02:00");
        assert_eq!(parse_iso8601(&client.timestamp), Some(source.timestamp));
    }

    #[test]
    fn test_projection_is_deterministic() {
        let source = alert();
        assert_eq!(project(&source), ClientAlert::from(&source));
    }

    #[test]
    fn test_wire_body_round_trip() {
        let client = project(&alert());
        let body = serde_json::to_string(&client).unwrap();
        let value: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(value["affected_areas"], serde_json::json!([102, 101, 330]));
        assert_eq!(value["alert_type"], "FIRE");

        let back: ClientAlert = serde_json::from_str(&body).unwrap();
        assert_eq!(back, client);
    }
}
