//! Node addresses: 6-byte radio hardware address, rendered as colon-free lowercase hex in topics.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Length of a node address in bytes.
pub const ADDR_LEN: usize = 6;

/// Radio node address (6 bytes). `Display` gives the canonical topic form `aabbccddeeff`.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct NodeAddr([u8; ADDR_LEN]);

impl NodeAddr {
    /// Destination address for radio broadcast.
    pub const BROADCAST: NodeAddr = NodeAddr([0xff; ADDR_LEN]);

    pub const fn new(bytes: [u8; ADDR_LEN]) -> Self {
        NodeAddr(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; ADDR_LEN] {
        &self.0
    }

    /// Build from a slice; `None` unless exactly 6 bytes.
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        let arr: [u8; ADDR_LEN] = bytes.try_into().ok()?;
        Some(NodeAddr(arr))
    }

    pub fn is_broadcast(&self) -> bool {
        *self == Self::BROADCAST
    }
}

impl fmt::Display for NodeAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in &self.0 {
            write!(f, "{:02x}", b)?;
        }
        Ok(())
    }
}

/// Error parsing a node address from text.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AddrParseError {
    #[error("expected 12 hex digits, got {0}")]
    BadLength(usize),
    #[error("invalid hex digit {0:?}")]
    BadDigit(char),
}

impl FromStr for NodeAddr {
    type Err = AddrParseError;

    /// Accepts `aabbccddeeff` and the separated forms `AA:BB:CC:DD:EE:FF` / `aa-bb-cc-dd-ee-ff`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits: Vec<char> = s.chars().filter(|c| *c != ':' && *c != '-').collect();
        if digits.len() != ADDR_LEN * 2 {
            return Err(AddrParseError::BadLength(digits.len()));
        }
        let mut out = [0u8; ADDR_LEN];
        for (i, pair) in digits.chunks(2).enumerate() {
            let hi = pair[0].to_digit(16).ok_or(AddrParseError::BadDigit(pair[0]))?;
            let lo = pair[1].to_digit(16).ok_or(AddrParseError::BadDigit(pair[1]))?;
            out[i] = (hi * 16 + lo) as u8;
        }
        Ok(NodeAddr(out))
    }
}

impl Serialize for NodeAddr {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for NodeAddr {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let s = String::deserialize(d)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
