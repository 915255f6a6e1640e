use std::net::IpAddr;

use serde::{Deserialize, Serialize};

/// Resolved probe destination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Destination {
    pub host: String,
    pub ip: IpAddr,
}

impl Destination {
    /// True when the configured target was a hostname rather than the literal address.
    pub fn is_named(&self) -> bool {
        self.host != self.ip.to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ProbeFailure {
    Timeout,
    Dns(String),
    Other(String),
}

/// Result of one probe delivered by a running prober.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ProbeOutcome {
    Reply { round_trip_secs: f64 },
    Failure(ProbeFailure),
}
