//! Load config from file and environment.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use nowgate_core::{GatewayConfig, Intervals, NodeAddr, TransportKind};
use serde::Deserialize;

use crate::logging::LogFormat;

/// Env var naming an explicit config file.
pub const CONFIG_ENV: &str = "NOWGATE_CONFIG";

/// Daemon configuration. File: `$NOWGATE_CONFIG`, ~/.config/nowgate/config.toml or
/// /etc/nowgate/config.toml. Env overrides: NOWGATE_MQTT_HOST, NOWGATE_MQTT_PORT,
/// NOWGATE_TOPIC_PREFIX, NOWGATE_TRANSPORT.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default = "default_topic_prefix")]
    pub topic_prefix: String,
    #[serde(default = "default_device_name")]
    pub device_name: String,
    /// Mesh network name, reported in the gateway attributes.
    #[serde(default = "default_network_name")]
    pub network_name: String,
    #[serde(default)]
    pub transport: TransportKind,
    /// Interface whose operstate decides whether the broker link is up.
    #[serde(default = "default_interface")]
    pub interface: String,
    #[serde(default)]
    pub log_format: LogFormat,
    #[serde(default)]
    pub mqtt: MqttConfig,
    #[serde(default)]
    pub radio: RadioConfig,
    #[serde(default)]
    pub intervals: Intervals,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MqttConfig {
    #[serde(default = "default_mqtt_host")]
    pub host: String,
    #[serde(default = "default_mqtt_port")]
    pub port: u16,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    /// Upper bound on one connect attempt.
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_mqtt_keep_alive_secs")]
    pub keep_alive_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RadioConfig {
    /// Local UDP address for the radio adapter link.
    #[serde(default = "default_radio_bind")]
    pub bind: SocketAddr,
    /// Radio co-processor address; datagrams from anywhere else are ignored.
    #[serde(default = "default_radio_adapter")]
    pub adapter: SocketAddr,
    /// This gateway's own radio address.
    #[serde(default)]
    pub node_address: Option<NodeAddr>,
}

fn default_topic_prefix() -> String {
    "homeassistant".to_string()
}
fn default_device_name() -> String {
    "ESP-NOW gateway".to_string()
}
fn default_network_name() -> String {
    "nowgate".to_string()
}
fn default_interface() -> String {
    "wlan0".to_string()
}
fn default_mqtt_host() -> String {
    "localhost".to_string()
}
fn default_mqtt_port() -> u16 {
    1883
}
fn default_connect_timeout_secs() -> u64 {
    5
}
fn default_mqtt_keep_alive_secs() -> u64 {
    30
}
fn default_radio_bind() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 45800))
}
fn default_radio_adapter() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 45801))
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            host: default_mqtt_host(),
            port: default_mqtt_port(),
            user: None,
            password: None,
            connect_timeout_secs: default_connect_timeout_secs(),
            keep_alive_secs: default_mqtt_keep_alive_secs(),
        }
    }
}

impl Default for RadioConfig {
    fn default() -> Self {
        Self {
            bind: default_radio_bind(),
            adapter: default_radio_adapter(),
            node_address: None,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            topic_prefix: default_topic_prefix(),
            device_name: default_device_name(),
            network_name: default_network_name(),
            transport: TransportKind::default(),
            interface: default_interface(),
            log_format: LogFormat::default(),
            mqtt: MqttConfig::default(),
            radio: RadioConfig::default(),
            intervals: Intervals::default(),
        }
    }
}

impl Config {
    /// Session snapshot for the core.
    pub fn gateway_config(&self) -> Result<GatewayConfig> {
        let Some(node_address) = self.radio.node_address else {
            bail!("radio.node_address is not set");
        };
        let mut g = GatewayConfig::new(node_address);
        g.topic_prefix = self.topic_prefix.clone();
        g.device_name = self.device_name.clone();
        g.network_name = self.network_name.clone();
        g.transport = self.transport;
        g.intervals = self.intervals;
        g.validate()?;
        Ok(g)
    }
}

/// Load config: default, then config file (explicit path, `$NOWGATE_CONFIG`, or the first that
/// exists), then env vars.
pub fn load(explicit: Option<&Path>) -> Result<Config> {
    let from_env = std::env::var_os(CONFIG_ENV).map(PathBuf::from);
    let mut c = match explicit.map(Path::to_path_buf).or(from_env) {
        Some(p) => load_file(&p)?,
        None => match config_paths().into_iter().find(|p| p.exists()) {
            Some(p) => load_file(&p)?,
            None => Config::default(),
        },
    };
    apply_env(&mut c, |key| std::env::var(key).ok());
    Ok(c)
}

fn config_paths() -> Vec<PathBuf> {
    let home = std::env::var_os("HOME").map(PathBuf::from);
    let mut out = Vec::new();
    if let Some(h) = home {
        out.push(h.join(".config/nowgate/config.toml"));
    }
    out.push(PathBuf::from("/etc/nowgate/config.toml"));
    out
}

fn load_file(path: &Path) -> Result<Config> {
    let s = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    toml::from_str(&s).with_context(|| format!("parsing {}", path.display()))
}

fn apply_env(c: &mut Config, var: impl Fn(&str) -> Option<String>) {
    if let Some(s) = var("NOWGATE_MQTT_HOST") {
        c.mqtt.host = s;
    }
    if let Some(s) = var("NOWGATE_MQTT_PORT") {
        if let Ok(p) = s.parse::<u16>() {
            c.mqtt.port = p;
        }
    }
    if let Some(s) = var("NOWGATE_TOPIC_PREFIX") {
        c.topic_prefix = s;
    }
    if let Some(s) = var("NOWGATE_TRANSPORT") {
        if let Ok(t) = s.parse::<TransportKind>() {
            c.transport = t;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        let c: Config = toml::from_str("").unwrap();
        assert_eq!(c.topic_prefix, "homeassistant");
        assert_eq!(c.mqtt.port, 1883);
        assert_eq!(c.transport, TransportKind::Wireless);
        assert_eq!(c.intervals, Intervals::default());
        assert!(c.radio.node_address.is_none());
    }

    #[test]
    fn full_file() {
        let c: Config = toml::from_str(
            r#"
            topic_prefix = "home"
            device_name = "Attic gateway"
            transport = "wired"
            interface = "eth0"
            log_format = "json"

            [mqtt]
            host = "broker.lan"
            user = "gw"
            password = "secret"

            [radio]
            adapter = "192.168.4.2:45801"
            node_address = "24:6F:28:00:00:01"

            [intervals]
            keep_alive_secs = 15
            "#,
        )
        .unwrap();
        assert_eq!(c.transport, TransportKind::Wired);
        assert_eq!(c.log_format, LogFormat::Json);
        assert_eq!(c.mqtt.user.as_deref(), Some("gw"));
        assert_eq!(c.intervals.keep_alive_secs, 15);
        assert_eq!(c.intervals.availability_secs, 5);
        let g = c.gateway_config().unwrap();
        assert_eq!(g.node_address.to_string(), "246f28000001");
        assert_eq!(g.topic_prefix, "home");
    }

    #[test]
    fn unknown_keys_rejected() {
        assert!(toml::from_str::<Config>("wifi_ssid = \"x\"").is_err());
        assert!(toml::from_str::<Config>("[mqtt]\ntls = true").is_err());
    }

    #[test]
    fn node_address_required() {
        assert!(Config::default().gateway_config().is_err());
    }

    #[test]
    fn invalid_prefix_rejected() {
        let mut c = Config::default();
        c.radio.node_address = Some("246f28000001".parse().unwrap());
        c.topic_prefix = "a/b".to_string();
        assert!(c.gateway_config().is_err());
    }

    #[test]
    fn env_overrides() {
        let mut c = Config::default();
        apply_env(&mut c, |key| match key {
            "NOWGATE_MQTT_HOST" => Some("10.0.0.2".to_string()),
            "NOWGATE_MQTT_PORT" => Some("not-a-port".to_string()),
            "NOWGATE_TRANSPORT" => Some("radio-only".to_string()),
            _ => None,
        });
        assert_eq!(c.mqtt.host, "10.0.0.2");
        assert_eq!(c.mqtt.port, 1883);
        assert_eq!(c.transport, TransportKind::RadioOnly);
    }

    #[test]
    fn explicit_path_must_exist() {
        assert!(load(Some(Path::new("/nonexistent/nowgate.toml"))).is_err());
    }
}
