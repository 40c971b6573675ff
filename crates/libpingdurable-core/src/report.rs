//! Machine-readable run report

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::{ConfigOverrides, PingConfig};
use crate::driver::{ReceiveOutcome, SendOutcome};
use crate::handoff::HandoffOutcome;

/// Everything observed during one two-phase run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub config: ConfigOverrides,
    pub send: SendOutcome,
    pub handoff: HandoffOutcome,
    /// Absent when the run was cancelled before the receive phase
    #[serde(skip_serializing_if = "Option::is_none")]
    pub receive: Option<ReceiveOutcome>,
    /// Receive phase idled out short of the confirmed-sent count
    pub lost: bool,
}

impl RunReport {
    pub fn new(
        config: &PingConfig,
        started_at: DateTime<Utc>,
        send: SendOutcome,
        handoff: HandoffOutcome,
        receive: Option<ReceiveOutcome>,
    ) -> Self {
        let lost = receive.as_ref().map(|r| r.is_loss()).unwrap_or(false);
        Self {
            run_id: Uuid::new_v4().to_string(),
            started_at,
            config: config.to_overrides(),
            send,
            handoff,
            receive,
            lost,
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Write the report as pretty JSON, replacing any existing file
    pub fn write_json(&self, path: &Path) -> std::io::Result<()> {
        let json = self.to_json().map_err(std::io::Error::from)?;
        std::fs::write(path, json)
    }
}

/// Durations as fractional seconds
pub mod serde_duration {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs_f64().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}
