use crate::models::event::DetailsSource;
use crate::models::{Alert, AlertType, EmergencyEvent};
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::warn;

const FALLBACK_DESCRIPTION: &str = "Emergency detected";

/// Turns events into numbered alerts. Each builder owns its own counter, so
/// ids start at 1 per instance and are never shared between instances.
#[derive(Debug, Default)]
pub struct AlertBuilder {
    last_id: AtomicU64,
}

impl AlertBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Id of the most recently built alert, 0 if none yet.
    pub fn last_id(&self) -> u64 {
        self.last_id.load(Ordering::SeqCst)
    }

    pub fn next_id(&self) -> u64 {
        self.last_id.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn build(&self, event: &EmergencyEvent) -> Alert {
        let id = self.next_id();
        let details = event.details_source();

        Alert {
            id,
            alert_type: AlertType::classify(&event.event_type),
            disabled_tiles: disabled_tiles(&details, &event.event_id),
            message: format!("{}: {}", event.event_type, description(&details)),
            timestamp: event.timestamp,
            severity: event.severity.clone(),
        }
    }
}

fn description(details: &DetailsSource<'_>) -> String {
    match details.get("description") {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => FALLBACK_DESCRIPTION.to_string(),
        Some(other) => other.to_string(),
    }
}

fn disabled_tiles(details: &DetailsSource<'_>, event_id: &str) -> Vec<i64> {
    match details.get("disabled_tiles") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => {
            let tiles: Vec<i64> = items.iter().filter_map(tile_id).collect();
            if tiles.len() != items.len() {
                warn!(
                    "Event {} has {} non-integer disabled_tiles entries, skipped",
                    event_id,
                    items.len() - tiles.len()
                );
            }
            tiles
        }
        Some(other) => {
            warn!("Event {} has non-array disabled_tiles: {}", event_id, other);
            Vec::new()
        }
    }
}

/// Integers, or floats with no fractional part (`101.0`).
fn tile_id(value: &Value) -> Option<i64> {
    value.as_i64().or_else(|| {
        value
            .as_f64()
            .filter(|f| f.fract() == 0.0 && *f >= i64::MIN as f64 && *f < i64::MAX as f64)
            .map(|f| f as i64)
    })
}
