//! Discovery synthesis: map a node's capability descriptor to the broker's auto-discovery document.
//!
//! Pure and deterministic: the same device class, address and descriptor always produce the same
//! topic and byte-identical payload. Device classes without a discoverable entity produce nothing.

use serde::{Deserialize, Deserializer, Serialize};

use crate::address::NodeAddr;
use crate::protocol::DeviceType;
use crate::topic::{CommandField, Topics};

/// QoS advertised to the hub for every entity.
const DISCOVERY_QOS: u8 = 2;
/// Connectivity expiry used when a gateway-class node does not announce one.
pub const DEFAULT_CONNECTIVITY_EXPIRE_SECS: u32 = 30;
const ON: &str = "ON";
const OFF: &str = "OFF";

/// Hub entity component, used in the config topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HaComponent {
    Switch,
    Light,
    Sensor,
    BinarySensor,
}

impl HaComponent {
    pub fn as_str(self) -> &'static str {
        match self {
            HaComponent::Switch => "switch",
            HaComponent::Light => "light",
            HaComponent::Sensor => "sensor",
            HaComponent::BinarySensor => "binary_sensor",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "switch" => Some(HaComponent::Switch),
            "light" => Some(HaComponent::Light),
            "sensor" => Some(HaComponent::Sensor),
            "binary_sensor" => Some(HaComponent::BinarySensor),
            _ => None,
        }
    }
}

/// LED channel layout announced by LED nodes; selects the RGB and color-temperature blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedKind {
    /// Single white channel.
    W,
    /// Warm + cold white.
    Ww,
    Rgb,
    Rgbw,
    Rgbww,
}

impl LedKind {
    pub fn from_code(code: u64) -> Option<Self> {
        match code {
            1 => Some(LedKind::W),
            2 => Some(LedKind::Ww),
            3 => Some(LedKind::Rgb),
            4 => Some(LedKind::Rgbw),
            5 => Some(LedKind::Rgbww),
            _ => None,
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "w" => Some(LedKind::W),
            "ww" => Some(LedKind::Ww),
            "rgb" => Some(LedKind::Rgb),
            "rgbw" => Some(LedKind::Rgbw),
            "rgbww" => Some(LedKind::Rgbww),
            _ => None,
        }
    }

    pub fn has_rgb(self) -> bool {
        matches!(self, LedKind::Rgb | LedKind::Rgbw | LedKind::Rgbww)
    }

    pub fn has_color_temp(self) -> bool {
        matches!(self, LedKind::Ww | LedKind::Rgbww)
    }
}

/// `class` in a descriptor: a hub device class name, or (LED nodes) a numeric LED kind.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum ClassField {
    Code(u64),
    Name(String),
}

/// Capability descriptor carried in the inner JSON of a `Config` frame. Unknown keys are ignored.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CapabilityDescriptor {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default = "default_unit")]
    pub unit: u8,
    /// Hub component (`switch`, `light`, `sensor`, `binary_sensor`).
    #[serde(rename = "type", default)]
    pub component: Option<String>,
    #[serde(default)]
    pub class: Option<ClassField>,
    /// Key of the state JSON that carries this entity's value.
    #[serde(default)]
    pub template: Option<String>,
    #[serde(default, deserialize_with = "flag")]
    pub reverse: bool,
    /// Seconds without an update before the hub marks the entity unavailable.
    #[serde(default)]
    pub expire: Option<u32>,
    #[serde(default)]
    pub payload_on: Option<String>,
    #[serde(default)]
    pub payload_off: Option<String>,
    #[serde(default)]
    pub unit_of_measurement: Option<String>,
}

fn default_unit() -> u8 {
    1
}

/// Nodes send `"reverse": true` or `"reverse": "true"`.
fn flag<'de, D: Deserializer<'de>>(d: D) -> Result<bool, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Text(String),
    }
    Ok(match Flag::deserialize(d)? {
        Flag::Bool(b) => b,
        Flag::Text(s) => s.eq_ignore_ascii_case("true"),
    })
}

impl CapabilityDescriptor {
    /// Parse the inner JSON of a `Config` frame.
    pub fn from_json(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }

    fn class_name(&self) -> Option<String> {
        match &self.class {
            Some(ClassField::Name(s)) if !s.is_empty() => Some(s.clone()),
            _ => None,
        }
    }

    fn led_kind(&self) -> LedKind {
        match &self.class {
            Some(ClassField::Code(c)) => LedKind::from_code(*c),
            Some(ClassField::Name(s)) => LedKind::from_name(s),
            None => None,
        }
        .unwrap_or(LedKind::W)
    }

    /// Declared component: `Ok(None)` when absent, `Err(())` when declared but unknown.
    fn declared_component(&self) -> Result<Option<HaComponent>, ()> {
        match self.component.as_deref() {
            None => Ok(None),
            Some(s) => HaComponent::parse(s).map(Some).ok_or(()),
        }
    }
}

/// One auto-discovery document. Field order is fixed; absent fields are omitted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DiscoveryDocument {
    pub platform: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub unique_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_class: Option<String>,
    pub state_topic: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value_template: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state_value_template: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command_topic: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub json_attributes_topic: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub availability_topic: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload_on: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload_off: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit_of_measurement: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub brightness_state_topic: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub brightness_value_template: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub brightness_command_topic: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rgb_state_topic: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rgb_value_template: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rgb_command_topic: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color_temp_state_topic: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color_temp_value_template: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color_temp_command_topic: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expire_after: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub force_update: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub optimistic: Option<bool>,
    pub qos: u8,
    pub retain: bool,
}

impl DiscoveryDocument {
    fn base(name: Option<String>, addr: &NodeAddr, unit: u8, state_topic: String) -> Self {
        Self {
            platform: "mqtt",
            name,
            unique_id: format!("{}-{}", addr, unit),
            state_topic,
            qos: DISCOVERY_QOS,
            retain: true,
            ..Default::default()
        }
    }
}

/// A synthesized document and the config topic it is published to (retained).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Discovery {
    pub topic: String,
    pub component: HaComponent,
    pub document: DiscoveryDocument,
}

impl Discovery {
    /// Pretty JSON payload.
    pub fn payload(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&self.document)
    }
}

fn template(key: &str) -> String {
    format!("{{{{ value_json.{} }}}}", key)
}

fn is_template_key(key: &str) -> bool {
    !key.is_empty() && key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Build the discovery document for a node of class `device` at `addr`.
/// `None` for classes without an entity (RF sensors), for a component the class cannot take,
/// or for an invalid template key.
pub fn synthesize(
    topics: &Topics,
    device: DeviceType,
    addr: &NodeAddr,
    descriptor: &CapabilityDescriptor,
) -> Option<Discovery> {
    let declared = descriptor.declared_component().ok()?;
    match device {
        DeviceType::Switch => {
            let component = declared.unwrap_or(HaComponent::Switch);
            switch(topics, addr, descriptor, component)
        }
        DeviceType::Led => match declared {
            None | Some(HaComponent::Light) => Some(light(topics, addr, descriptor)),
            _ => None,
        },
        DeviceType::Sensor => {
            let component = declared.unwrap_or(HaComponent::Sensor);
            sensor(topics, addr, descriptor, component)
        }
        DeviceType::Gateway | DeviceType::RfGateway => match declared {
            None | Some(HaComponent::BinarySensor) => Some(connectivity(
                topics,
                device,
                addr,
                descriptor.unit,
                descriptor.name.clone(),
                descriptor.expire.unwrap_or(DEFAULT_CONNECTIVITY_EXPIRE_SECS),
            )),
            _ => None,
        },
        DeviceType::RfSensor => None,
    }
}

/// The gateway's own connectivity marker, announced on every broker (re)connect.
pub fn gateway_discovery(
    topics: &Topics,
    addr: &NodeAddr,
    device_name: &str,
    expire_after: u32,
) -> Discovery {
    connectivity(
        topics,
        DeviceType::Gateway,
        addr,
        1,
        Some(device_name.to_string()),
        expire_after,
    )
}

fn switch(
    topics: &Topics,
    addr: &NodeAddr,
    d: &CapabilityDescriptor,
    component: HaComponent,
) -> Option<Discovery> {
    let class = DeviceType::Switch;
    let mut doc = DiscoveryDocument::base(d.name.clone(), addr, d.unit, topics.state(class, addr));
    match component {
        HaComponent::Switch => {
            doc.device_class = d.class_name();
            doc.value_template = Some(template("state"));
        }
        HaComponent::Light => doc.state_value_template = Some(template("state")),
        _ => return None,
    }
    let (on, off) = if d.reverse { (OFF, ON) } else { (ON, OFF) };
    doc.command_topic = Some(topics.command(class, addr, CommandField::Set));
    doc.json_attributes_topic = Some(topics.attributes(class, addr));
    doc.availability_topic = Some(topics.availability(class, addr));
    doc.payload_on = Some(on.to_string());
    doc.payload_off = Some(off.to_string());
    doc.optimistic = Some(false);
    Some(Discovery {
        topic: topics.config(component.as_str(), addr, d.unit),
        component,
        document: doc,
    })
}

fn light(topics: &Topics, addr: &NodeAddr, d: &CapabilityDescriptor) -> Discovery {
    let class = DeviceType::Led;
    let state = topics.state(class, addr);
    let kind = d.led_kind();
    let mut doc = DiscoveryDocument::base(d.name.clone(), addr, d.unit, state.clone());
    doc.state_value_template = Some(template("state"));
    doc.command_topic = Some(topics.command(class, addr, CommandField::Set));
    doc.json_attributes_topic = Some(topics.attributes(class, addr));
    doc.availability_topic = Some(topics.availability(class, addr));
    doc.payload_on = Some(ON.to_string());
    doc.payload_off = Some(OFF.to_string());
    doc.brightness_state_topic = Some(state.clone());
    doc.brightness_value_template = Some(template("brightness"));
    doc.brightness_command_topic = Some(topics.command(class, addr, CommandField::Brightness));
    if kind.has_rgb() {
        doc.rgb_state_topic = Some(state.clone());
        doc.rgb_value_template = Some("{{ value_json.rgb | join(',') }}".to_string());
        doc.rgb_command_topic = Some(topics.command(class, addr, CommandField::Rgb));
    }
    if kind.has_color_temp() {
        doc.color_temp_state_topic = Some(state);
        doc.color_temp_value_template = Some(template("temperature"));
        doc.color_temp_command_topic = Some(topics.command(class, addr, CommandField::Temperature));
    }
    doc.optimistic = Some(false);
    Discovery {
        topic: topics.config(HaComponent::Light.as_str(), addr, d.unit),
        component: HaComponent::Light,
        document: doc,
    }
}

fn sensor(
    topics: &Topics,
    addr: &NodeAddr,
    d: &CapabilityDescriptor,
    component: HaComponent,
) -> Option<Discovery> {
    let class = DeviceType::Sensor;
    let key = d.template.as_deref().unwrap_or("state");
    if !is_template_key(key) {
        return None;
    }
    let mut doc = DiscoveryDocument::base(d.name.clone(), addr, d.unit, topics.state(class, addr));
    doc.device_class = d.class_name();
    doc.value_template = Some(template(key));
    doc.json_attributes_topic = Some(topics.attributes(class, addr));
    match component {
        HaComponent::Sensor => doc.unit_of_measurement = d.unit_of_measurement.clone(),
        HaComponent::BinarySensor => {
            doc.payload_on = Some(d.payload_on.clone().unwrap_or_else(|| ON.to_string()));
            doc.payload_off = Some(d.payload_off.clone().unwrap_or_else(|| OFF.to_string()));
        }
        _ => return None,
    }
    doc.expire_after = d.expire.filter(|&s| s > 0);
    doc.force_update = Some(true);
    Some(Discovery {
        topic: topics.config(component.as_str(), addr, d.unit),
        component,
        document: doc,
    })
}

fn connectivity(
    topics: &Topics,
    class: DeviceType,
    addr: &NodeAddr,
    unit: u8,
    name: Option<String>,
    expire_after: u32,
) -> Discovery {
    let mut doc = DiscoveryDocument::base(name, addr, unit, topics.availability(class, addr));
    doc.device_class = Some("connectivity".to_string());
    doc.json_attributes_topic = Some(topics.attributes(class, addr));
    doc.payload_on = Some("online".to_string());
    doc.payload_off = Some("offline".to_string());
    doc.expire_after = Some(expire_after);
    doc.force_update = Some(true);
    Discovery {
        topic: topics.config(HaComponent::BinarySensor.as_str(), addr, unit),
        component: HaComponent::BinarySensor,
        document: doc,
    }
}
