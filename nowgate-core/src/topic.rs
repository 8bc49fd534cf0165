//! Topic routing: `<prefix>/<class>/<addr>[-<unit>]/<field>`. Segment index 2 always carries
//! the node address; the prefix is a single segment so that position never moves.

use crate::address::NodeAddr;
use crate::protocol::DeviceType;

/// Index of the node-address segment in every node-addressed topic.
const ADDRESS_SEGMENT: usize = 2;

/// Take the node address segment (index 2). Empty when the topic has fewer than three segments;
/// callers treat empty as "not a node-addressed command".
pub fn extract_node_address(topic: &str) -> &str {
    topic.split('/').nth(ADDRESS_SEGMENT).unwrap_or("")
}

/// Check a topic prefix: one non-empty segment, no wildcards.
pub fn is_valid_prefix(prefix: &str) -> bool {
    !prefix.is_empty() && !prefix.contains(['/', '+', '#'])
}

/// Command suffixes understood on command-capable classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandField {
    Set,
    Brightness,
    Temperature,
    Rgb,
}

impl CommandField {
    /// Key used for this field in the outbound inner JSON.
    pub fn key(self) -> &'static str {
        match self {
            CommandField::Set => "set",
            CommandField::Brightness => "brightness",
            CommandField::Temperature => "temperature",
            CommandField::Rgb => "rgb",
        }
    }

    fn parse(field: &str) -> Option<Self> {
        match field {
            "set" => Some(CommandField::Set),
            "brightness" => Some(CommandField::Brightness),
            "temperature" => Some(CommandField::Temperature),
            "rgb" => Some(CommandField::Rgb),
            _ => None,
        }
    }
}

/// A matched command topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandRoute<'a> {
    pub class: DeviceType,
    pub address: &'a str,
    pub field: CommandField,
}

/// Match `<prefix>/<class>/<addr>/<field>` against the command-capable classes.
/// Switches accept `set`; LEDs accept `set`, `brightness`, `temperature`, `rgb`.
/// Anything else is `None` and is ignored by the caller.
pub fn classify<'a>(topic: &'a str, prefix: &str) -> Option<CommandRoute<'a>> {
    let rest = topic.strip_prefix(prefix)?.strip_prefix('/')?;
    let mut parts = rest.split('/');
    let class = DeviceType::from_topic_segment(parts.next()?)?;
    let address = parts.next()?;
    let field = CommandField::parse(parts.next()?)?;
    if parts.next().is_some() || address.is_empty() {
        return None;
    }
    let accepted = match class {
        DeviceType::Switch => field == CommandField::Set,
        DeviceType::Led => true,
        _ => false,
    };
    accepted.then_some(CommandRoute {
        class,
        address,
        field,
    })
}

/// Topic builder for one prefix.
#[derive(Debug, Clone)]
pub struct Topics {
    prefix: String,
}

impl Topics {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// `<prefix>/<class>/<addr>/<field>`
    pub fn device(&self, class: DeviceType, addr: &NodeAddr, field: &str) -> String {
        format!("{}/{}/{}/{}", self.prefix, class.topic_segment(), addr, field)
    }


    pub fn state(&self, class: DeviceType, addr: &NodeAddr) -> String {
        self.device(class, addr, "state")
    }

    pub fn attributes(&self, class: DeviceType, addr: &NodeAddr) -> String {
        self.device(class, addr, "attributes")
    }

    pub fn availability(&self, class: DeviceType, addr: &NodeAddr) -> String {
        self.device(class, addr, class.keep_alive_field())
    }

    pub fn command(&self, class: DeviceType, addr: &NodeAddr, field: CommandField) -> String {
        self.device(class, addr, field.key())
    }

    /// `<prefix>/<component>/<addr>-<unit>/config`
    pub fn config(&self, component: &str, addr: &NodeAddr, unit: u8) -> String {
        format!("{}/{}/{}-{}/config", self.prefix, component, addr, unit)
    }

    /// `<prefix>/rf_sensor/<type>/<id>/state`
    pub fn rf_sensor(&self, kind: &str, id: u16) -> String {
        format!(
            "{}/{}/{}/{}/state",
            self.prefix,
            DeviceType::RfSensor.topic_segment(),
            kind,
            id
        )
    }

    /// Command wildcards the gateway subscribes to.
    pub fn subscriptions(&self) -> [String; 3] {
        [DeviceType::Gateway, DeviceType::Switch, DeviceType::Led]
            .map(|class| format!("{}/{}/#", self.prefix, class.topic_segment()))
    }
}
