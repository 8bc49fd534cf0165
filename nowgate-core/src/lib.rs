//! ESP-NOW radio to MQTT gateway core.
//! Host-driven: no I/O; host passes events and receives actions.

pub mod address;
pub mod availability;
pub mod config;
pub mod core;
pub mod discovery;
pub mod protocol;
pub mod scheduler;
pub mod stats;
pub mod topic;
pub mod wire;

pub use address::{AddrParseError, NodeAddr};
pub use availability::{Availability, LinkStatus};
pub use config::{ConfigError, GatewayConfig, TransportKind};
pub use crate::core::{Action, GatewayCore, HostSnapshot};
pub use protocol::{DeviceType, Frame, PayloadType, RfSensorType};
pub use scheduler::{Concern, DueFlag, Intervals, Scheduler, Triggers};
pub use stats::{BridgeStats, DropReason};
pub use wire::{decode_frame, encode_frame, FrameDecodeError, FrameEncodeError, FRAME_SIZE};
