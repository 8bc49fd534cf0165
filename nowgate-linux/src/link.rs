//! Host link facts: interface operstate and the local address used to reach the broker.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::path::Path;
use std::time::Duration;

use nowgate_core::TransportKind;
use tokio::net::{self, UdpSocket};
use tokio::time;

const SYS_CLASS_NET: &str = "/sys/class/net";
const RESOLVE_TIMEOUT: Duration = Duration::from_secs(1);

/// `up`, and `unknown` for drivers that never report a state.
pub fn operstate_is_up(state: &str) -> bool {
    matches!(state.trim(), "up" | "unknown")
}

fn read_operstate(root: &Path, interface: &str) -> Option<String> {
    std::fs::read_to_string(root.join(interface).join("operstate")).ok()
}

fn link_up_at(root: &Path, transport: TransportKind, interface: &str) -> bool {
    if !transport.has_broker_link() {
        return false;
    }
    read_operstate(root, interface).is_some_and(|s| operstate_is_up(&s))
}

/// Whether the broker-carrying link is up. Radio-only never is.
pub fn link_up(transport: TransportKind, interface: &str) -> bool {
    link_up_at(Path::new(SYS_CLASS_NET), transport, interface)
}

/// Source address the kernel would pick to reach `host:port`. Sends nothing.
/// Name resolution is bounded by `RESOLVE_TIMEOUT`.
pub async fn local_ip_towards(host: &str, port: u16) -> Option<IpAddr> {
    let mut addrs = time::timeout(RESOLVE_TIMEOUT, net::lookup_host((host, port)))
        .await
        .ok()?
        .ok()?;
    let target = addrs.next()?;
    let any: IpAddr = match target {
        SocketAddr::V4(_) => Ipv4Addr::UNSPECIFIED.into(),
        SocketAddr::V6(_) => Ipv6Addr::UNSPECIFIED.into(),
    };
    let socket = UdpSocket::bind((any, 0)).await.ok()?;
    socket.connect(target).await.ok()?;
    Some(socket.local_addr().ok()?.ip())
}
