use thiserror::Error;

/// Failures the relay can hit. Only `Connection` errors raised during
/// startup ever leave the relay handler; the rest are logged per message.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("malformed message body: {0}")]
    Decode(#[source] serde_json::Error),

    #[error("invalid emergency event: {0}")]
    Validation(String),

    #[error("connection to {broker} failed: {reason}")]
    Connection { broker: String, reason: String },

    #[error("publish to '{topic}' failed: {reason}")]
    Publish { topic: String, reason: String },
}

pub type Result<T> = std::result::Result<T, RelayError>;
