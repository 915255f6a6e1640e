use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One probe observation. Timeouts carry no round-trip time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub round_trip_secs: Option<f64>,
    pub is_timeout: bool,
    pub observed_at: DateTime<Utc>,
}

impl Sample {
    pub fn reply(round_trip_secs: f64) -> Self {
        Self {
            round_trip_secs: Some(round_trip_secs),
            is_timeout: false,
            observed_at: Utc::now(),
        }
    }

    pub fn timeout() -> Self {
        Self {
            round_trip_secs: None,
            is_timeout: true,
            observed_at: Utc::now(),
        }
    }

    /// Measured round trip in milliseconds, `None` for timeouts.
    pub fn round_trip_ms(&self) -> Option<f64> {
        if self.is_timeout {
            return None;
        }
        self.round_trip_secs.map(|secs| secs * 1000.0)
    }
}

/// Display-relevant bucket for a sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SeverityBand {
    Fast,
    Medium,
    Slow,
    Timeout,
}
