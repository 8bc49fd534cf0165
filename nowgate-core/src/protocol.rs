//! Radio protocol: device classes, payload roles and their wire codes and topic names.

/// Class of the originating/target physical device. One byte on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceType {
    Gateway,
    Switch,
    Led,
    Sensor,
    RfSensor,
    RfGateway,
}

impl DeviceType {
    pub const ALL: [DeviceType; 6] = [
        DeviceType::Gateway,
        DeviceType::Switch,
        DeviceType::Led,
        DeviceType::Sensor,
        DeviceType::RfSensor,
        DeviceType::RfGateway,
    ];

    pub fn code(self) -> u8 {
        match self {
            DeviceType::Gateway => 0x01,
            DeviceType::Switch => 0x02,
            DeviceType::Led => 0x03,
            DeviceType::Sensor => 0x04,
            DeviceType::RfSensor => 0x05,
            DeviceType::RfGateway => 0x06,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|d| d.code() == code)
    }

    /// Topic segment naming this class (`<prefix>/<segment>/<addr>/...`).
    pub fn topic_segment(self) -> &'static str {
        match self {
            DeviceType::Gateway => "espnow_gateway",
            DeviceType::Switch => "espnow_switch",
            DeviceType::Led => "espnow_led",
            DeviceType::Sensor => "espnow_sensor",
            DeviceType::RfSensor => "rf_sensor",
            DeviceType::RfGateway => "rf_gateway",
        }
    }

    pub fn from_topic_segment(segment: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|d| d.topic_segment() == segment)
    }

    /// Field carrying liveness. Gateways report `status`; nodes report `keep_alive`.
    pub fn keep_alive_field(self) -> &'static str {
        match self {
            DeviceType::Gateway | DeviceType::RfGateway => "status",
            _ => "keep_alive",
        }
    }
}

/// Semantic role of a frame. One byte on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PayloadType {
    State,
    KeepAlive,
    Attributes,
    Config,
    Forward,
    Set,
    Update,
    Restart,
}

impl PayloadType {
    pub const ALL: [PayloadType; 8] = [
        PayloadType::State,
        PayloadType::KeepAlive,
        PayloadType::Attributes,
        PayloadType::Config,
        PayloadType::Forward,
        PayloadType::Set,
        PayloadType::Update,
        PayloadType::Restart,
    ];

    pub fn code(self) -> u8 {
        match self {
            PayloadType::State => 0x01,
            PayloadType::KeepAlive => 0x02,
            PayloadType::Attributes => 0x03,
            PayloadType::Config => 0x04,
            PayloadType::Forward => 0x05,
            PayloadType::Set => 0x06,
            PayloadType::Update => 0x07,
            PayloadType::Restart => 0x08,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.code() == code)
    }

    /// True when the message buffer must hold a JSON document.
    pub fn carries_json(self) -> bool {
        matches!(
            self,
            PayloadType::Attributes | PayloadType::Config | PayloadType::Forward
        )
    }
}

/// Third-party sensor kinds relayed by RF gateways in `Forward` frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RfSensorType {
    Temperature,
    Humidity,
    WaterLeakage,
    Plant,
    Motion,
    Door,
}

impl RfSensorType {
    pub const ALL: [RfSensorType; 6] = [
        RfSensorType::Temperature,
        RfSensorType::Humidity,
        RfSensorType::WaterLeakage,
        RfSensorType::Plant,
        RfSensorType::Motion,
        RfSensorType::Door,
    ];

    pub fn code(self) -> u8 {
        match self {
            RfSensorType::Temperature => 1,
            RfSensorType::Humidity => 2,
            RfSensorType::WaterLeakage => 3,
            RfSensorType::Plant => 4,
            RfSensorType::Motion => 5,
            RfSensorType::Door => 6,
        }
    }

    pub fn from_code(code: u64) -> Option<Self> {
        Self::ALL.into_iter().find(|t| u64::from(t.code()) == code)
    }

    pub fn name(self) -> &'static str {
        match self {
            RfSensorType::Temperature => "temperature",
            RfSensorType::Humidity => "humidity",
            RfSensorType::WaterLeakage => "water_leakage",
            RfSensorType::Plant => "plant",
            RfSensorType::Motion => "motion",
            RfSensorType::Door => "door",
        }
    }
}

/// One radio frame: device class, payload role, and the raw message bytes (JSON or plain text).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub device_type: DeviceType,
    pub payload_type: PayloadType,
    pub message: Vec<u8>,
}

impl Frame {
    pub fn new(
        device_type: DeviceType,
        payload_type: PayloadType,
        message: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            device_type,
            payload_type,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_unique_and_reversible() {
        for d in DeviceType::ALL {
            assert_eq!(DeviceType::from_code(d.code()), Some(d));
            assert_eq!(DeviceType::from_topic_segment(d.topic_segment()), Some(d));
        }
        for p in PayloadType::ALL {
            assert_eq!(PayloadType::from_code(p.code()), Some(p));
        }
        for t in RfSensorType::ALL {
            assert_eq!(RfSensorType::from_code(u64::from(t.code())), Some(t));
        }
    }

    #[test]
    fn unknown_codes_are_none() {
        assert_eq!(DeviceType::from_code(0), None);
        assert_eq!(DeviceType::from_code(0xee), None);
        assert_eq!(PayloadType::from_code(0), None);
        assert_eq!(RfSensorType::from_code(999), None);
        assert_eq!(DeviceType::from_topic_segment("espnow_blind"), None);
    }

    #[test]
    fn keep_alive_alias() {
        assert_eq!(DeviceType::Gateway.keep_alive_field(), "status");
        assert_eq!(DeviceType::Switch.keep_alive_field(), "keep_alive");
    }

    #[test]
    fn json_payload_roles() {
        assert!(PayloadType::Config.carries_json());
        assert!(PayloadType::Forward.carries_json());
        assert!(!PayloadType::State.carries_json());
        assert!(!PayloadType::KeepAlive.carries_json());
    }
}
