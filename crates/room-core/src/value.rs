//! Status values and the codecs that map them to wire tokens.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// A human-readable status value: either a named state (`"On"`, `"HDMI 1"`)
/// or an integer level (volume).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StatusValue {
    Int(i64),
    Text(String),
}

impl StatusValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            StatusValue::Text(s) => Some(s),
            StatusValue::Int(_) => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            StatusValue::Int(i) => Some(*i),
            StatusValue::Text(_) => None,
        }
    }
}

impl fmt::Display for StatusValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatusValue::Int(i) => write!(f, "{}", i),
            StatusValue::Text(s) => write!(f, "{}", s),
        }
    }
}

impl From<&str> for StatusValue {
    fn from(value: &str) -> Self {
        StatusValue::Text(value.to_string())
    }
}

impl From<String> for StatusValue {
    fn from(value: String) -> Self {
        StatusValue::Text(value)
    }
}

impl From<i64> for StatusValue {
    fn from(value: i64) -> Self {
        StatusValue::Int(value)
    }
}

impl From<i32> for StatusValue {
    fn from(value: i32) -> Self {
        StatusValue::Int(i64::from(value))
    }
}

impl From<u8> for StatusValue {
    fn from(value: u8) -> Self {
        StatusValue::Int(i64::from(value))
    }
}

/// Bidirectional lookup between human values and wire tokens.
///
/// Tokens are compared case-insensitively on decode, since devices are free to
/// answer in either case.
#[derive(Debug, Clone, Default)]
pub struct ValueTable {
    to_wire: HashMap<String, String>,
    from_wire: HashMap<String, String>,
}

impl ValueTable {
    pub fn new<I, H, W>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (H, W)>,
        H: Into<String>,
        W: Into<String>,
    {
        let mut table = Self::default();
        for (human, wire) in pairs {
            let human = human.into();
            let wire = wire.into();
            table.from_wire.insert(wire.to_ascii_uppercase(), human.clone());
            table.to_wire.insert(human, wire);
        }
        table
    }

    pub fn encode(&self, human: &str) -> Option<&str> {
        self.to_wire.get(human).map(String::as_str)
    }

    pub fn decode(&self, wire: &str) -> Option<&str> {
        self.from_wire
            .get(&wire.to_ascii_uppercase())
            .map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.to_wire.len()
    }

    pub fn is_empty(&self) -> bool {
        self.to_wire.is_empty()
    }
}

/// How a command's value travels on the wire.
#[derive(Debug, Clone)]
pub enum ValueCodec {
    /// Named states looked up in a table.
    Table(ValueTable),
    /// Integer within `min..=max`, sent as two upper-case hex digits.
    HexByte { min: i64, max: i64 },
    /// A single fixed token; the caller's value is ignored.
    Fixed(String),
}

impl ValueCodec {
    pub fn table<I, H, W>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (H, W)>,
        H: Into<String>,
        W: Into<String>,
    {
        ValueCodec::Table(ValueTable::new(pairs))
    }

    /// Wire token for `value`, or `None` if the value is not accepted.
    pub fn encode(&self, value: &StatusValue) -> Option<String> {
        match self {
            ValueCodec::Table(table) => value
                .as_text()
                .and_then(|human| table.encode(human))
                .map(str::to_string),
            ValueCodec::HexByte { min, max } => value
                .as_int()
                .filter(|level| (*min..=*max).contains(level))
                .map(|level| format!("{:02X}", level)),
            ValueCodec::Fixed(token) => Some(token.clone()),
        }
    }

    /// Human value for a token read back from the device.
    pub fn decode(&self, token: &str) -> Option<StatusValue> {
        match self {
            ValueCodec::Table(table) => table.decode(token).map(StatusValue::from),
            ValueCodec::HexByte { min, max } => i64::from_str_radix(token, 16)
                .ok()
                .filter(|level| (*min..=*max).contains(level))
                .map(StatusValue::Int),
            ValueCodec::Fixed(_) => None,
        }
    }
}
