use thiserror::Error;

/// Errors raised while assembling the run configuration.
///
/// These are fatal: they abort the run before any phase starts.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid duration '{0}': expected a dDhHmMsS specification such as 30S or 1H30M")]
    InvalidDuration(String),

    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },

    #[error("IO error reading config: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),
}

/// Errors reported by a messaging transport
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("connection failed: {0}")]
    Connect(String),

    #[error("destination busy: {0}")]
    Busy(String),

    #[error("publish failed: {0}")]
    Publish(String),

    #[error("receive failed: {0}")]
    Receive(String),

    #[error("close failed: {0}")]
    Close(String),

    #[error("session already closed")]
    Closed,
}

impl TransportError {
    /// Get the error code used in reports
    pub fn error_code(&self) -> &'static str {
        match self {
            TransportError::Connect(_) => "connect_failed",
            TransportError::Busy(_) => "destination_busy",
            TransportError::Publish(_) => "publish_failed",
            TransportError::Receive(_) => "receive_failed",
            TransportError::Close(_) => "close_failed",
            TransportError::Closed => "session_closed",
        }
    }
}
