//! Host-driven API: GatewayCore receives events from the host and returns actions, in order.

use std::net::IpAddr;
use std::time::Duration;

use serde::de::IgnoredAny;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::address::NodeAddr;
use crate::availability::{Availability, Check, LinkStatus};
use crate::config::{ConfigError, GatewayConfig};
use crate::discovery::{self, CapabilityDescriptor};
use crate::protocol::{DeviceType, Frame, PayloadType, RfSensorType};
use crate::stats::{BridgeStats, DropReason};
use crate::topic::{self, CommandField, Topics};
use crate::wire::{self, FrameDecodeError};

const ONLINE: &[u8] = b"online";
const OFFLINE: &[u8] = b"offline";
const GATEWAY_TYPE: &str = "ESP-NOW Gateway";

/// Action for the host to perform. Actions are executed in the order returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Start one bounded broker connect attempt; report the outcome with
    /// `on_broker_connected` or `on_broker_lost`.
    Connect,
    /// Subscribe with QoS 2.
    Subscribe { topic: String },
    /// Publish with QoS 2.
    Publish {
        topic: String,
        payload: Vec<u8>,
        retain: bool,
    },
    /// Send an encoded frame to one node.
    Unicast { to: NodeAddr, frame: Vec<u8> },
    /// Send an encoded frame to every node.
    Broadcast { frame: Vec<u8> },
    /// Restart the gateway process (end the session and start fresh).
    Restart,
}

/// Host facts reported in the attributes snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HostSnapshot {
    pub ip: Option<IpAddr>,
    pub uptime: Duration,
}

#[derive(Serialize)]
struct GatewayAttributes<'a> {
    #[serde(rename = "Type")]
    kind: &'static str,
    #[serde(rename = "MCU")]
    mcu: &'a str,
    #[serde(rename = "MAC")]
    mac: String,
    #[serde(rename = "Firmware")]
    firmware: &'a str,
    #[serde(rename = "Network")]
    network: &'a str,
    #[serde(rename = "IP")]
    ip: String,
    #[serde(rename = "Uptime")]
    uptime: String,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ForwardKind {
    Code(u64),
    Name(String),
}

/// Leading fields of a Forward message; the rest is relayed untouched.
#[derive(Deserialize)]
struct ForwardHeader {
    #[serde(rename = "type")]
    kind: ForwardKind,
    id: u16,
}

/// `Days:D Hours:H Mins:M`
pub fn format_uptime(uptime: Duration) -> String {
    let mins = uptime.as_secs() / 60;
    let hours = mins / 60;
    let days = hours / 24;
    format!("Days:{} Hours:{} Mins:{}", days, hours % 24, mins % 60)
}

/// Bridge dispatcher. Owns the session configuration, broker availability and counters.
pub struct GatewayCore {
    config: GatewayConfig,
    topics: Topics,
    availability: Availability,
    stats: BridgeStats,
}

impl GatewayCore {
    pub fn new(config: GatewayConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            topics: Topics::new(config.topic_prefix.clone()),
            availability: Availability::new(config.transport),
            config,
            stats: BridgeStats::default(),
        })
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub fn topics(&self) -> &Topics {
        &self.topics
    }

    pub fn availability(&self) -> &Availability {
        &self.availability
    }

    pub fn stats(&self) -> &BridgeStats {
        &self.stats
    }

    pub fn node_address(&self) -> NodeAddr {
        self.config.node_address
    }

    fn reject(&mut self, reason: DropReason, detail: &str) -> Vec<Action> {
        self.stats.record_drop(reason);
        debug!(%reason, detail, "dropped");
        Vec::new()
    }

    fn publish(&mut self, topic: String, payload: impl Into<Vec<u8>>, retain: bool) -> Action {
        self.stats.publishes += 1;
        Action::Publish {
            topic,
            payload: payload.into(),
            retain,
        }
    }

    fn encode(&mut self, frame: &Frame) -> Option<Vec<u8>> {
        match wire::encode_frame(frame) {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                self.stats.record_drop(DropReason::Oversize);
                warn!(error = %e, payload = ?frame.payload_type, "outbound frame not sent");
                None
            }
        }
    }

    /// Frame from the radio link. Nothing is published unless the broker is available.
    pub fn on_radio_frame(&mut self, from: NodeAddr, bytes: &[u8]) -> Vec<Action> {
        self.stats.frames_received += 1;
        if !self.availability.is_available() {
            return self.reject(DropReason::BrokerUnavailable, "broker unavailable");
        }
        let frame = match wire::decode_frame(bytes) {
            Ok(f) => f,
            Err(e @ FrameDecodeError::Truncated { .. }) => {
                return self.reject(DropReason::Truncated, &e.to_string())
            }
            Err(e) => return self.reject(DropReason::UnknownClass, &e.to_string()),
        };
        let class = frame.device_type;
        match frame.payload_type {
            PayloadType::State => {
                let topic = self.topics.state(class, &from);
                vec![self.publish(topic, frame.message, true)]
            }
            PayloadType::KeepAlive => {
                let topic = self.topics.availability(class, &from);
                vec![self.publish(topic, ONLINE, true)]
            }
            PayloadType::Attributes => {
                if serde_json::from_slice::<IgnoredAny>(&frame.message).is_err() {
                    return self.reject(DropReason::MalformedMessage, "attributes are not JSON");
                }
                let topic = self.topics.attributes(class, &from);
                vec![self.publish(topic, frame.message, true)]
            }
            PayloadType::Config => self.on_config(class, from, &frame.message),
            PayloadType::Forward => self.on_forward(frame.message),
            PayloadType::Set | PayloadType::Update | PayloadType::Restart => {
                self.reject(DropReason::UnexpectedPayload, "command frame from a node")
            }
        }
    }

    fn on_config(&mut self, class: DeviceType, from: NodeAddr, message: &[u8]) -> Vec<Action> {
        let descriptor = match CapabilityDescriptor::from_json(message) {
            Ok(d) => d,
            Err(e) => return self.reject(DropReason::MalformedMessage, &e.to_string()),
        };
        let Some(discovery) = discovery::synthesize(&self.topics, class, &from, &descriptor) else {
            return self.reject(DropReason::NoDocument, class.topic_segment());
        };
        match discovery.payload() {
            Ok(payload) => {
                debug!(
                    topic = %discovery.topic,
                    component = discovery.component.as_str(),
                    "discovery"
                );
                vec![self.publish(discovery.topic, payload, true)]
            }
            Err(e) => self.reject(DropReason::MalformedMessage, &e.to_string()),
        }
    }

    fn on_forward(&mut self, message: Vec<u8>) -> Vec<Action> {
        let header: ForwardHeader = match serde_json::from_slice(&message) {
            Ok(h) => h,
            Err(e) => return self.reject(DropReason::MalformedMessage, &e.to_string()),
        };
        let kind = match header.kind {
            ForwardKind::Code(code) => match RfSensorType::from_code(code) {
                Some(t) => t.name().to_string(),
                None => return self.reject(DropReason::UnknownClass, "unknown rf sensor type"),
            },
            ForwardKind::Name(name) if topic::is_valid_prefix(&name) => name,
            ForwardKind::Name(_) => {
                let detail = "rf sensor type is not a topic segment";
                return self.reject(DropReason::MalformedMessage, detail);
            }
        };
        let topic = self.topics.rf_sensor(&kind, header.id);
        vec![self.publish(topic, message, false)]
    }

    /// Message delivered on one of the command subscriptions.
    pub fn on_mqtt_message(&mut self, topic: &str, payload: &[u8]) -> Vec<Action> {
        self.stats.commands_received += 1;
        let address = topic::extract_node_address(topic);
        if address.is_empty() {
            return Vec::new();
        }
        // Retained-command clears come back on our own subscriptions.
        if payload.is_empty() {
            return Vec::new();
        }
        let text = String::from_utf8_lossy(payload);
        match &*text {
            "update" => self.on_lifecycle(topic, address, PayloadType::Update),
            "restart" => self.on_lifecycle(topic, address, PayloadType::Restart),
            _ => self.on_command(topic, &text),
        }
    }

    fn on_command(&mut self, topic: &str, text: &str) -> Vec<Action> {
        let Some(route) = topic::classify(topic, self.topics.prefix()) else {
            return Vec::new();
        };
        let Ok(target) = route.address.parse::<NodeAddr>() else {
            return self.reject(DropReason::BadAddress, route.address);
        };
        let value = match route.field {
            CommandField::Set if text == "ON" => "ON",
            CommandField::Set => "OFF",
            _ => text,
        };
        let mut body = serde_json::Map::new();
        body.insert(route.field.key().to_string(), value.into());
        let message = serde_json::Value::Object(body).to_string();
        let frame = Frame::new(DeviceType::Gateway, PayloadType::Set, message);
        self.unicast(target, &frame).into_iter().collect()
    }

    fn on_lifecycle(&mut self, topic: &str, address: &str, kind: PayloadType) -> Vec<Action> {
        let class = topic
            .strip_prefix(self.topics.prefix())
            .and_then(|rest| rest.strip_prefix('/'))
            .and_then(|rest| rest.split('/').next())
            .and_then(DeviceType::from_topic_segment);
        let Some(class @ (DeviceType::Gateway | DeviceType::Switch | DeviceType::Led)) = class
        else {
            return Vec::new();
        };
        let Ok(target) = address.parse::<NodeAddr>() else {
            return self.reject(DropReason::BadAddress, address);
        };
        let mut actions = vec![self.publish(topic.to_string(), Vec::new(), true)];
        if target == self.config.node_address {
            if kind == PayloadType::Update {
                debug!("firmware update for the gateway itself ignored");
                return actions;
            }
            info!("restart requested");
            actions.push(self.publish(self.topics.availability(class, &target), OFFLINE, true));
            actions.push(Action::Restart);
            return actions;
        }
        actions.push(self.publish(self.topics.availability(class, &target), OFFLINE, true));
        let frame = Frame::new(DeviceType::Gateway, kind, "{}");
        actions.extend(self.unicast(target, &frame));
        actions
    }

    fn unicast(&mut self, to: NodeAddr, frame: &Frame) -> Option<Action> {
        let bytes = self.encode(frame)?;
        self.stats.unicasts += 1;
        Some(Action::Unicast { to, frame: bytes })
    }

    fn keep_alive_broadcast(&mut self) -> Option<Action> {
        let state = if self.availability.is_available() {
            "online"
        } else {
            "offline"
        };
        let message = serde_json::json!({ "MQTT": state }).to_string();
        let bytes = self.encode(&Frame::new(DeviceType::Gateway, PayloadType::KeepAlive, message))?;
        self.stats.broadcasts += 1;
        Some(Action::Broadcast { frame: bytes })
    }

    fn gateway_status(&mut self) -> Action {
        let topic = self
            .topics
            .availability(DeviceType::Gateway, &self.config.node_address);
        self.publish(topic, ONLINE, true)
    }

    fn attributes(&mut self, host: &HostSnapshot) -> Vec<Action> {
        let attrs = GatewayAttributes {
            kind: GATEWAY_TYPE,
            mcu: &self.config.mcu,
            mac: self.config.node_address.to_string(),
            firmware: &self.config.firmware,
            network: &self.config.network_name,
            ip: host.ip.map(|ip| ip.to_string()).unwrap_or_default(),
            uptime: format_uptime(host.uptime),
        };
        match serde_json::to_vec(&attrs) {
            Ok(payload) => {
                let topic = self
                    .topics
                    .attributes(DeviceType::Gateway, &self.config.node_address);
                vec![self.publish(topic, payload, true)]
            }
            Err(e) => {
                warn!(error = %e, "attributes not serialized");
                Vec::new()
            }
        }
    }

    /// Availability-check tick.
    pub fn on_availability_check(&mut self, status: LinkStatus) -> Vec<Action> {
        match self.availability.on_check(status) {
            Check::Idle => Vec::new(),
            Check::Connect => {
                debug!(transport = self.config.transport.as_str(), "connecting to broker");
                vec![Action::Connect]
            }
            Check::Lost { reconnect } => {
                info!(reconnect, "broker session lost");
                let mut actions: Vec<Action> = self.keep_alive_broadcast().into_iter().collect();
                if reconnect {
                    actions.push(Action::Connect);
                }
                actions
            }
        }
    }

    /// Broker handshake succeeded: subscribe, then announce discovery, attributes and keep-alive.
    pub fn on_broker_connected(&mut self, host: &HostSnapshot) -> Vec<Action> {
        if !self.availability.on_connected() {
            return Vec::new();
        }
        info!(prefix = self.topics.prefix(), "broker available");
        let mut actions: Vec<Action> = self
            .topics
            .subscriptions()
            .into_iter()
            .map(|topic| Action::Subscribe { topic })
            .collect();
        let expire_after = self
            .config
            .intervals
            .keep_alive_secs
            .saturating_mul(3)
            .try_into()
            .unwrap_or(u32::MAX);
        let marker = discovery::gateway_discovery(
            &self.topics,
            &self.config.node_address,
            &self.config.device_name,
            expire_after,
        );
        match marker.payload() {
            Ok(payload) => actions.push(self.publish(marker.topic, payload, true)),
            Err(e) => warn!(error = %e, "gateway discovery not serialized"),
        }
        actions.extend(self.attributes(host));
        actions.extend(self.on_keep_alive_due());
        actions
    }

    /// Connect attempt failed or the session dropped.
    pub fn on_broker_lost(&mut self) -> Vec<Action> {
        if !self.availability.on_disconnected() {
            return Vec::new();
        }
        info!("broker unavailable");
        self.keep_alive_broadcast().into_iter().collect()
    }

    /// Keep-alive tick: gateway status (when available) and the radio broadcast (always).
    pub fn on_keep_alive_due(&mut self) -> Vec<Action> {
        let mut actions = Vec::new();
        if self.availability.is_available() {
            actions.push(self.gateway_status());
        }
        actions.extend(self.keep_alive_broadcast());
        actions
    }

    /// Attributes tick; only while available.
    pub fn on_attributes_due(&mut self, host: &HostSnapshot) -> Vec<Action> {
        if !self.availability.is_available() {
            return Vec::new();
        }
        self.attributes(host)
    }

    /// Session ending: mark the gateway offline on the broker and tell the nodes.
    pub fn on_shutdown(&mut self) -> Vec<Action> {
        let mut actions = Vec::new();
        if self.availability.on_disconnected() {
            let topic = self
                .topics
                .availability(DeviceType::Gateway, &self.config.node_address);
            actions.push(self.publish(topic, OFFLINE, true));
        }
        actions.extend(self.keep_alive_broadcast());
        actions
    }
}
