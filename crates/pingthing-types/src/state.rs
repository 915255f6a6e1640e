use serde::{Deserialize, Serialize};

/// Lifecycle state of the probe supervisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum SupervisorState {
    #[default]
    Idle,
    WaitingForNetwork,
    Active,
    Faulted,
}

impl SupervisorState {
    pub fn label(self) -> &'static str {
        match self {
            SupervisorState::Idle => "idle",
            SupervisorState::WaitingForNetwork => "waiting for network",
            SupervisorState::Active => "active",
            SupervisorState::Faulted => "faulted",
        }
    }
}
