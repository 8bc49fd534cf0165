//! Bridge counters. Drops stay silent on the wire; they are counted here instead.

use std::fmt;

/// Why an inbound frame or command produced no output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DropReason {
    /// Radio frame arrived while the broker was unavailable.
    BrokerUnavailable,
    /// Radio frame shorter than the envelope.
    Truncated,
    /// Unknown device or payload type code.
    UnknownClass,
    /// Message was not the JSON its payload type requires.
    MalformedMessage,
    /// Payload type that is never bridged in this direction.
    UnexpectedPayload,
    /// Config frame that maps to no discovery document.
    NoDocument,
    /// Command topic without a parseable node address.
    BadAddress,
    /// Outbound message did not fit the frame buffer.
    Oversize,
}

impl DropReason {
    pub const ALL: [DropReason; 8] = [
        DropReason::BrokerUnavailable,
        DropReason::Truncated,
        DropReason::UnknownClass,
        DropReason::MalformedMessage,
        DropReason::UnexpectedPayload,
        DropReason::NoDocument,
        DropReason::BadAddress,
        DropReason::Oversize,
    ];

    fn index(self) -> usize {
        self as usize
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DropReason::BrokerUnavailable => "broker_unavailable",
            DropReason::Truncated => "truncated",
            DropReason::UnknownClass => "unknown_class",
            DropReason::MalformedMessage => "malformed_message",
            DropReason::UnexpectedPayload => "unexpected_payload",
            DropReason::NoDocument => "no_document",
            DropReason::BadAddress => "bad_address",
            DropReason::Oversize => "oversize",
        }
    }
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Counters owned by the dispatcher; read by the host for logging.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BridgeStats {
    pub frames_received: u64,
    pub commands_received: u64,
    pub publishes: u64,
    pub unicasts: u64,
    pub broadcasts: u64,
    drops: [u64; DropReason::ALL.len()],
}

impl BridgeStats {
    pub fn record_drop(&mut self, reason: DropReason) {
        self.drops[reason.index()] += 1;
    }

    pub fn dropped(&self, reason: DropReason) -> u64 {
        self.drops[reason.index()]
    }

    pub fn total_dropped(&self) -> u64 {
        self.drops.iter().sum()
    }
}

impl fmt::Display for BridgeStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "rx={} cmd={} pub={} unicast={} broadcast={} dropped={}",
            self.frames_received,
            self.commands_received,
            self.publishes,
            self.unicasts,
            self.broadcasts,
            self.total_dropped()
        )
    }
}
