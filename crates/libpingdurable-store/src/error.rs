use libpingdurable_core::TransportError;
use thiserror::Error;

/// Errors raised by the on-disk queue store
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("queue busy: {0}")]
    Busy(String),

    #[error("queue directory missing: {0}")]
    Missing(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl StoreError {
    pub fn error_code(&self) -> &'static str {
        match self {
            StoreError::Busy(_) => "queue_busy",
            StoreError::Missing(_) => "queue_missing",
            StoreError::Io(_) => "io_error",
            StoreError::Sled(_) => "db_error",
            StoreError::Json(_) => "internal_error",
        }
    }
}

/// Map a store failure onto the transport error for the operation that hit it
pub(crate) fn publish_error(e: StoreError) -> TransportError {
    TransportError::Publish(e.to_string())
}

pub(crate) fn receive_error(e: StoreError) -> TransportError {
    TransportError::Receive(e.to_string())
}

impl From<StoreError> for TransportError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Busy(msg) => TransportError::Busy(msg),
            other => TransportError::Connect(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_busy_maps_to_transport_busy() {
        let err: TransportError = StoreError::Busy("held".to_string()).into();
        assert!(matches!(err, TransportError::Busy(_)));
    }

    #[test]
    fn test_open_failures_map_to_connect() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: TransportError = StoreError::Io(io).into();
        assert!(matches!(err, TransportError::Connect(_)));
    }
}
