use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum InterfaceKind {
    Wifi,
    Cellular,
    WiredEthernet,
    #[default]
    Other,
}

/// Host reachability as reported by the platform path source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct NetworkAvailability {
    pub is_active: bool,
    pub is_expensive: bool,
    pub is_constrained: bool,
    pub interface_kind: InterfaceKind,
}

impl NetworkAvailability {
    pub fn active(interface_kind: InterfaceKind) -> Self {
        Self {
            is_active: true,
            interface_kind,
            ..Self::default()
        }
    }

    pub fn inactive() -> Self {
        Self::default()
    }
}
