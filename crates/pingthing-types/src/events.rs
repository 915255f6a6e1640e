use std::net::IpAddr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{network::NetworkAvailability, probe::Destination};

pub const APP_NAME: &str = "PingThing";

/// What a display update is reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DisplayKind {
    Success,
    Timeout,
    Error,
    Waiting,
    Pinging,
}

/// Immutable status message pushed to the display collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisplayUpdate {
    pub id: Uuid,
    pub kind: DisplayKind,
    pub target: String,
    pub ip: Option<IpAddr>,
    pub ms: Option<f64>,
    pub tooltip: String,
    pub average_ms: Option<f64>,
    pub message: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl DisplayUpdate {
    fn new(kind: DisplayKind, target: impl Into<String>, tooltip: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            target: target.into(),
            ip: None,
            ms: None,
            tooltip,
            average_ms: None,
            message: None,
            timestamp: Utc::now(),
        }
    }

    pub fn success(destination: &Destination, ms: f64, average_ms: Option<f64>) -> Self {
        let tooltip = match average_ms {
            Some(avg) => format!("{ms:.0}ms (avg: {avg:.1})"),
            None => APP_NAME.to_string(),
        };
        let mut update = Self::new(DisplayKind::Success, &destination.host, tooltip);
        update.ip = Some(destination.ip);
        update.ms = Some(ms);
        update.average_ms = average_ms;
        update
    }

    pub fn timeout(destination: &Destination, average_ms: Option<f64>) -> Self {
        let mut update = Self::new(DisplayKind::Timeout, &destination.host, "timeout".into());
        update.ip = Some(destination.ip);
        update.average_ms = average_ms;
        update
    }

    pub fn error(target: impl Into<String>, ip: Option<IpAddr>, message: impl Into<String>) -> Self {
        let message = message.into();
        let mut update = Self::new(DisplayKind::Error, target, message.clone());
        update.ip = ip;
        update.message = Some(message);
        update
    }

    pub fn waiting(target: impl Into<String>, message: impl Into<String>) -> Self {
        let message = message.into();
        let mut update = Self::new(DisplayKind::Waiting, target, message.clone());
        update.message = Some(message);
        update
    }

    pub fn pinging(destination: &Destination) -> Self {
        let mut update = Self::new(DisplayKind::Pinging, &destination.host, APP_NAME.into());
        update.ip = Some(destination.ip);
        update
    }

    /// Whether the probe session is currently live.
    pub fn is_live(&self) -> bool {
        matches!(
            self.kind,
            DisplayKind::Success | DisplayKind::Timeout | DisplayKind::Pinging
        )
    }

    /// The resolved destination, once the update carries an address.
    pub fn destination(&self) -> Option<Destination> {
        self.ip.map(|ip| Destination {
            host: self.target.clone(),
            ip,
        })
    }

    fn target_label(&self) -> String {
        match self.destination() {
            Some(destination) if destination.is_named() => {
                format!("{} [{}]", destination.host, destination.ip)
            }
            _ => self.target.clone(),
        }
    }

    /// Menu-style one line status.
    pub fn title(&self) -> String {
        let message = self.message.as_deref().unwrap_or_default();
        match self.kind {
            DisplayKind::Success => format!(
                "🟢 {} • {:.0}ms",
                self.target_label(),
                self.ms.unwrap_or_default()
            ),
            DisplayKind::Timeout => format!("🔴 {} (timeout)", self.target_label()),
            DisplayKind::Error => format!("❌ {message}"),
            DisplayKind::Waiting => format!("🔴 {} ({message})", self.target),
            DisplayKind::Pinging => format!("🟢 {} (pinging)", self.target_label()),
        }
    }
}

/// Edge-triggered reachability change emitted by the network monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailabilityChanged {
    pub is_active: bool,
    pub availability: NetworkAvailability,
}
