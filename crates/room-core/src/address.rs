//! Device addressing on multidrop control links.

use crate::error::DriverError;
use std::fmt;
use std::str::FromStr;

/// Two-hex-digit set id of a device on the control bus.
///
/// `00` is the broadcast address: every device on the bus acts on the frame
/// and none of them answer.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeviceId(String);

impl DeviceId {
    pub const BROADCAST: &'static str = "Broadcast";

    pub fn broadcast() -> Self {
        Self("00".to_string())
    }

    pub fn from_number(id: u8) -> Result<Self, DriverError> {
        if (1..=99).contains(&id) {
            Ok(Self(format!("{:02X}", id)))
        } else {
            Err(DriverError::InvalidDeviceId(id.to_string()))
        }
    }

    pub fn is_broadcast(&self) -> bool {
        self.0 == "00"
    }

    /// The id as it appears inside a frame.
    pub fn as_wire(&self) -> &str {
        &self.0
    }
}

impl Default for DeviceId {
    fn default() -> Self {
        Self("01".to_string())
    }
}

impl FromStr for DeviceId {
    type Err = DriverError;

    /// Accepts `Broadcast` or a decimal id in `1..=99`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.eq_ignore_ascii_case(Self::BROADCAST) {
            return Ok(Self::broadcast());
        }
        trimmed
            .parse::<u8>()
            .map_err(|_| DriverError::InvalidDeviceId(s.to_string()))
            .and_then(Self::from_number)
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
