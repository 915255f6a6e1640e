use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};

use async_trait::async_trait;
use pingthing_types::network::{InterfaceKind, NetworkAvailability};
use tokio::net::UdpSocket;
use tracing::{debug, warn};

use crate::PathSource;

/// Treats the network as usable when the OS has a route to any probe address.
///
/// Connecting a UDP socket only performs the route lookup; nothing is sent.
pub struct RouteProbeSource {
    probe_addrs: Vec<SocketAddr>,
}

impl RouteProbeSource {
    pub fn new(probe_addrs: Vec<SocketAddr>) -> Self {
        Self { probe_addrs }
    }

    pub fn from_config(addrs: &[String]) -> Self {
        let probe_addrs = addrs
            .iter()
            .filter_map(|raw| match raw.parse::<SocketAddr>() {
                Ok(addr) => Some(addr),
                Err(err) => {
                    warn!("Ignoring reachability probe address {raw:?}: {err}");
                    None
                }
            })
            .collect();
        Self::new(probe_addrs)
    }

    async fn has_route(addr: SocketAddr) -> bool {
        let bind: SocketAddr = if addr.is_ipv4() {
            (Ipv4Addr::UNSPECIFIED, 0).into()
        } else {
            (Ipv6Addr::UNSPECIFIED, 0).into()
        };
        let socket = match UdpSocket::bind(bind).await {
            Ok(socket) => socket,
            Err(err) => {
                debug!("Route probe bind for {addr} failed: {err}");
                return false;
            }
        };
        match socket.connect(addr).await {
            Ok(()) => socket
                .local_addr()
                .map(|local| !local.ip().is_unspecified())
                .unwrap_or(false),
            Err(err) => {
                debug!("No route to {addr}: {err}");
                false
            }
        }
    }
}

#[async_trait]
impl PathSource for RouteProbeSource {
    async fn current_path(&self) -> NetworkAvailability {
        let mut is_active = false;
        for addr in &self.probe_addrs {
            if Self::has_route(*addr).await {
                is_active = true;
                break;
            }
        }
        if !is_active {
            return NetworkAvailability::inactive();
        }
        let interface_kind = detect_interface_kind();
        NetworkAvailability {
            is_active,
            is_expensive: interface_kind == InterfaceKind::Cellular,
            is_constrained: false,
            interface_kind,
        }
    }
}

/// Kind of a named interface from its sysfs traits.
pub(crate) fn classify_interface(name: &str, wireless: bool, has_device: bool) -> InterfaceKind {
    if wireless {
        InterfaceKind::Wifi
    } else if name.starts_with("ww") {
        InterfaceKind::Cellular
    } else if has_device {
        InterfaceKind::WiredEthernet
    } else {
        InterfaceKind::Other
    }
}

/// Picks the most specific kind among several up interfaces.
pub(crate) fn preferred_kind(kinds: &[InterfaceKind]) -> InterfaceKind {
    [
        InterfaceKind::Cellular,
        InterfaceKind::Wifi,
        InterfaceKind::WiredEthernet,
    ]
    .into_iter()
    .find(|kind| kinds.contains(kind))
    .unwrap_or(InterfaceKind::Other)
}

#[cfg(target_os = "linux")]
fn detect_interface_kind() -> InterfaceKind {
    let Ok(entries) = std::fs::read_dir("/sys/class/net") else {
        return InterfaceKind::Other;
    };
    let mut kinds = Vec::new();
    for entry in entries.flatten() {
        let name = entry.file_name().to_string_lossy().into_owned();
        if name == "lo" {
            continue;
        }
        let path = entry.path();
        let up = std::fs::read_to_string(path.join("operstate"))
            .map(|state| state.trim() == "up")
            .unwrap_or(false);
        if up {
            kinds.push(classify_interface(
                &name,
                path.join("wireless").exists(),
                path.join("device").exists(),
            ));
        }
    }
    preferred_kind(&kinds)
}

#[cfg(not(target_os = "linux"))]
fn detect_interface_kind() -> InterfaceKind {
    InterfaceKind::Other
}
