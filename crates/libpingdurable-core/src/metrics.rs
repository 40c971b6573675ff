//! Publish latency recording

use std::time::Duration;

use hdrhistogram::Histogram;
use serde::{Deserialize, Serialize};

/// Latency histogram for publish calls (microsecond resolution)
pub struct LatencyRecorder {
    histogram: Option<Histogram<u64>>,
}

impl LatencyRecorder {
    pub fn new() -> Self {
        // 1 microsecond to 60 seconds, 3 significant figures
        let histogram = Histogram::new_with_bounds(1, 60_000_000, 3).ok();
        Self { histogram }
    }

    pub fn record(&mut self, latency: Duration) {
        if let Some(ref mut hist) = self.histogram {
            let micros = (latency.as_micros() as u64).clamp(1, 60_000_000);
            let _ = hist.record(micros);
        }
    }

    pub fn percentiles(&self) -> LatencyPercentiles {
        match self.histogram {
            Some(ref hist) if !hist.is_empty() => LatencyPercentiles {
                samples: hist.len(),
                p50_us: hist.value_at_percentile(50.0),
                p95_us: hist.value_at_percentile(95.0),
                p99_us: hist.value_at_percentile(99.0),
                max_us: hist.max(),
            },
            _ => LatencyPercentiles::default(),
        }
    }
}

impl Default for LatencyRecorder {
    fn default() -> Self {
        Self::new()
    }
}

/// Latency percentiles
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LatencyPercentiles {
    pub samples: u64,
    pub p50_us: u64,
    pub p95_us: u64,
    pub p99_us: u64,
    pub max_us: u64,
}

impl LatencyPercentiles {
    pub fn p50_ms(&self) -> f64 {
        self.p50_us as f64 / 1000.0
    }

    pub fn p95_ms(&self) -> f64 {
        self.p95_us as f64 / 1000.0
    }

    pub fn p99_ms(&self) -> f64 {
        self.p99_us as f64 / 1000.0
    }

    pub fn max_ms(&self) -> f64 {
        self.max_us as f64 / 1000.0
    }
}
