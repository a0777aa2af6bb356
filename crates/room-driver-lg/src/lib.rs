//! LG xxUR640S9UD series display driver.
//!
//! Implements [`room_core::Protocol`] for the RS-232 control protocol of the
//! LG commercial UHD displays, in two link profiles:
//!
//! - [`Profile::Serial`]: bidirectional. Every status command can be queried
//!   and replies are decoded into the status cache.
//! - [`Profile::Ethernet`]: the network control port. Write-only; `Power` is
//!   replaced by `PowerOff`.
//!
//! ```rust,ignore
//! use room_core::{Device, DeviceOptions};
//! use room_driver_lg::LgDisplay;
//!
//! let mut display = Device::new(link, LgDisplay::serial(), DeviceOptions::named("Left"))?;
//! display.set("Volume", &55.into(), None).await?; // kf 01 37\r
//! ```

pub mod command;
pub mod reply;

use regex::bytes::Regex;
use room_core::{CommandTable, DriverResult, MatchRule, Protocol};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

pub use command::{command_table, LgCommand};
pub use reply::reject_label;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LgError {
    #[error("unknown control profile '{0}' (expected 'serial' or 'ethernet')")]
    UnknownProfile(String),
}

/// Which control port the display is reached through.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Profile {
    #[default]
    Serial,
    Ethernet,
}

impl FromStr for Profile {
    type Err = LgError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "serial" => Ok(Profile::Serial),
            "ethernet" => Ok(Profile::Ethernet),
            _ => Err(LgError::UnknownProfile(s.to_string())),
        }
    }
}

impl fmt::Display for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Profile::Serial => f.write_str("serial"),
            Profile::Ethernet => f.write_str("ethernet"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LgDisplay {
    profile: Profile,
}

impl LgDisplay {
    pub fn new(profile: Profile) -> Self {
        Self { profile }
    }

    pub fn serial() -> Self {
        Self::new(Profile::Serial)
    }

    pub fn ethernet() -> Self {
        Self::new(Profile::Ethernet)
    }

    pub fn profile(&self) -> Profile {
        self.profile
    }
}

impl Protocol for LgDisplay {
    fn commands(&self) -> CommandTable {
        command_table(self.profile)
    }

    fn match_rules(&self) -> DriverResult<Vec<MatchRule>> {
        match self.profile {
            Profile::Serial => reply::match_rules(),
            Profile::Ethernet => Ok(Vec::new()),
        }
    }

    fn reply_delimiter(&self) -> DriverResult<Regex> {
        reply::compile(reply::ACK_PATTERN)
    }

    fn is_rejection(&self, reply: &[u8]) -> bool {
        reply
            .windows(reply::REJECT_TOKEN.len())
            .any(|window| window == reply::REJECT_TOKEN)
    }

    fn is_unidirectional(&self) -> bool {
        self.profile == Profile::Ethernet
    }
}
