//! Per-session configuration snapshot consumed by the dispatcher.

use serde::Deserialize;

use crate::address::NodeAddr;
use crate::scheduler::Intervals;
use crate::topic::is_valid_prefix;

/// Physical transport carrying the broker session alongside the radio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TransportKind {
    /// Radio only; the broker is never reachable.
    RadioOnly,
    /// Radio plus wireless station mode.
    #[default]
    Wireless,
    /// Radio plus wired ethernet.
    Wired,
}

impl TransportKind {
    pub fn has_broker_link(self) -> bool {
        !matches!(self, TransportKind::RadioOnly)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TransportKind::RadioOnly => "radio-only",
            TransportKind::Wireless => "wireless",
            TransportKind::Wired => "wired",
        }
    }
}

impl std::str::FromStr for TransportKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "radio-only" => Ok(TransportKind::RadioOnly),
            "wireless" => Ok(TransportKind::Wireless),
            "wired" => Ok(TransportKind::Wired),
            other => Err(ConfigError::UnknownTransport(other.to_string())),
        }
    }
}

/// Immutable for one session; a reload builds a new one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayConfig {
    pub topic_prefix: String,
    pub device_name: String,
    pub network_name: String,
    pub node_address: NodeAddr,
    pub transport: TransportKind,
    /// Firmware string reported in the attributes snapshot.
    pub firmware: String,
    /// Hardware string reported in the attributes snapshot.
    pub mcu: String,
    pub intervals: Intervals,
}

impl GatewayConfig {
    pub fn new(node_address: NodeAddr) -> Self {
        Self {
            topic_prefix: "homeassistant".to_string(),
            device_name: "ESP-NOW gateway".to_string(),
            network_name: "nowgate".to_string(),
            node_address,
            transport: TransportKind::default(),
            firmware: env!("CARGO_PKG_VERSION").to_string(),
            mcu: std::env::consts::ARCH.to_string(),
            intervals: Intervals::default(),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !is_valid_prefix(&self.topic_prefix) {
            return Err(ConfigError::BadPrefix(self.topic_prefix.clone()));
        }
        if self.device_name.trim().is_empty() {
            return Err(ConfigError::Empty("device_name"));
        }
        if self.network_name.trim().is_empty() {
            return Err(ConfigError::Empty("network_name"));
        }
        if self.node_address.is_broadcast() {
            return Err(ConfigError::BroadcastAddress);
        }
        let i = &self.intervals;
        for (name, secs) in [
            ("availability_secs", i.availability_secs),
            ("keep_alive_secs", i.keep_alive_secs),
            ("attributes_secs", i.attributes_secs),
        ] {
            if secs == 0 {
                return Err(ConfigError::ZeroInterval(name));
            }
        }
        Ok(())
    }
}

/// Invalid configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("topic prefix {0:?} must be one non-empty segment without '/', '+' or '#'")]
    BadPrefix(String),
    #[error("{0} must not be empty")]
    Empty(&'static str),
    #[error("node address must not be the broadcast address")]
    BroadcastAddress,
    #[error("interval {0} must be at least one second")]
    ZeroInterval(&'static str),
    #[error("unknown transport {0:?} (expected radio-only, wireless or wired)")]
    UnknownTransport(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> GatewayConfig {
        GatewayConfig::new(NodeAddr::new([0x24, 0x6f, 0x28, 0x01, 0x02, 0x03]))
    }

    #[test]
    fn defaults_are_valid() {
        assert_eq!(config().validate(), Ok(()));
    }

    #[test]
    fn rejects_multi_segment_prefix() {
        let mut c = config();
        c.topic_prefix = "home/assistant".to_string();
        assert!(matches!(c.validate(), Err(ConfigError::BadPrefix(_))));
    }

    #[test]
    fn rejects_empty_names_and_zero_intervals() {
        let mut c = config();
        c.device_name = " ".to_string();
        assert_eq!(c.validate(), Err(ConfigError::Empty("device_name")));

        let mut c = config();
        c.intervals.keep_alive_secs = 0;
        assert_eq!(c.validate(), Err(ConfigError::ZeroInterval("keep_alive_secs")));

        let mut c = config();
        c.node_address = NodeAddr::BROADCAST;
        assert_eq!(c.validate(), Err(ConfigError::BroadcastAddress));
    }

    #[test]
    fn transport_parses_kebab_case() {
        let t: TransportKind = serde_json::from_str("\"radio-only\"").unwrap();
        assert_eq!(t, TransportKind::RadioOnly);
        assert!(!t.has_broker_link());
        assert_eq!("wired".parse::<TransportKind>().unwrap(), TransportKind::Wired);
        assert!("ethernet".parse::<TransportKind>().is_err());
        assert_eq!(TransportKind::Wireless.as_str(), "wireless");
    }
}
