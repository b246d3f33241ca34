use crate::error::{RelayError, Result};
use crate::models::EmergencyEvent;
use serde_json::Value;

/// Parses one inbound payload. A body that is not JSON at all is a
/// `Decode` error; JSON that does not describe a complete event is a
/// `Validation` error. Nothing partial is ever returned.
pub fn decode_event(payload: &[u8]) -> Result<EmergencyEvent> {
    // 1. Parse JSON
    let value: Value = serde_json::from_slice(payload).map_err(RelayError::Decode)?;

    // 2. Check shape
    if !value.is_object() {
        return Err(RelayError::Validation(format!(
            "expected a JSON object, got {}",
            json_kind(&value)
        )));
    }

    serde_json::from_value(value).map_err(|e| RelayError::Validation(e.to_string()))
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_valid_event() {
        let payload = br#"{
            "event_id": "fire-001",
            "event_type": "FIRE",
            "timestamp": "2025-06-01T18:30:00Z",
            "severity": "CRITICAL",
            "location_id": "section-b",
            "metadata": {"description": "Major fire", "disabled_tiles": [201, 202, 203]}
        }"#;

        let event = decode_event(payload).unwrap();
        assert_eq!(event.event_id, "fire-001");
        assert_eq!(event.severity, "CRITICAL");
        assert_eq!(event.location_id.as_deref(), Some("section-b"));
    }

    #[test]
    fn test_malformed_body_is_decode_error() {
        let err = decode_event(b"{not json").unwrap_err();
        assert!(matches!(err, RelayError::Decode(_)));

        let err = decode_event(&[0xff, 0xfe, 0x00]).unwrap_err();
        assert!(matches!(err, RelayError::Decode(_)));
    }

    #[test]
    fn test_missing_required_field_is_validation_error() {
        let payload = br#"{"event_id": "x", "event_type": "FIRE", "severity": "HIGH"}"#;
        match decode_event(payload).unwrap_err() {
            RelayError::Validation(reason) => assert!(reason.contains("timestamp")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_bad_timestamp_is_validation_error() {
        let payload = br#"{
            "event_id": "x",
            "event_type": "FIRE",
            "timestamp": "last tuesday",
            "severity": "HIGH"
        }"#;
        assert!(matches!(
            decode_event(payload).unwrap_err(),
            RelayError::Validation(_)
        ));
    }

    #[test]
    fn test_non_object_is_validation_error() {
        assert!(matches!(
            decode_event(b"[1, 2, 3]").unwrap_err(),
            RelayError::Validation(_)
        ));
    }
}
