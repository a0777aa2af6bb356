//! Room configuration using Figment
//!
//! Configuration is loaded from:
//! 1. `config/room.toml` (base configuration)
//! 2. Environment variables prefixed with `ROOM_`, nested with `__`
//!    (for example `ROOM_CONNECTION__POLL_INTERVAL_SECS=10`)
//!
//! # Example
//! ```no_run
//! use room_control::config::RoomConfig;
//!
//! let config = RoomConfig::load()?;
//! config.validate()?;
//! println!("Room: {}", config.application.name);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use room_core::{DeviceId, DeviceOptions, DriverError};
use room_driver_lg::{LgError, Profile};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Default configuration file, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "config/room.toml";

/// Top-level room configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RoomConfig {
    #[serde(default)]
    pub application: ApplicationConfig,
    #[serde(default)]
    pub connection: ConnectionConfig,
    #[serde(default)]
    pub displays: Vec<DisplayConfig>,
}

/// Application-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationConfig {
    #[serde(default = "default_name")]
    pub name: String,
    /// Logging level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Log output (pretty, compact, json)
    #[serde(default = "default_log_format")]
    pub log_format: String,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            log_level: default_log_level(),
            log_format: default_log_format(),
        }
    }
}

/// Connection handling shared by every display
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Unanswered keep-alive queries tolerated before a display is marked
    /// disconnected
    #[serde(default = "default_disconnect_limit")]
    pub disconnect_limit: u32,
    /// Keep-alive query interval
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    /// Wait for a `Set` acknowledgement
    #[serde(default = "default_response_timeout")]
    pub response_timeout_ms: u64,
    /// Receive buffer cap
    #[serde(default = "default_max_buffer")]
    pub max_buffer_bytes: usize,
    /// Pause between reconnect attempts after the link drops
    #[serde(default = "default_reconnect_delay")]
    pub reconnect_delay_secs: u64,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            disconnect_limit: default_disconnect_limit(),
            poll_interval_secs: default_poll_interval(),
            response_timeout_ms: default_response_timeout(),
            max_buffer_bytes: default_max_buffer(),
            reconnect_delay_secs: default_reconnect_delay(),
        }
    }
}

impl ConnectionConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn response_timeout(&self) -> Duration {
        Duration::from_millis(self.response_timeout_ms)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.reconnect_delay_secs)
    }
}

/// How the controller reaches a display
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkKind {
    /// Serial-over-Ethernet adapter or the display's network control port
    #[default]
    Tcp,
    /// RS-232 port on the controller (needs the `serial` feature)
    Serial,
}

/// Display definition in configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisplayConfig {
    /// Unique display identifier, used on the command line and console
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub link: LinkKind,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub serial_path: Option<String>,
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    /// Set id on the control bus: `1`..`99` or `Broadcast`
    #[serde(default = "default_device_id")]
    pub device_id: String,
    /// The link carries no replies
    #[serde(default)]
    pub unidirectional: bool,
    /// Control profile: `serial` (bidirectional) or `ethernet` (write-only)
    #[serde(default = "default_profile")]
    pub profile: String,
    /// Command queried on every poll to keep liveness up to date
    #[serde(default = "default_keep_alive")]
    pub keep_alive: String,
}

impl DisplayConfig {
    /// Name for logs and status output; falls back to the id.
    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            &self.id
        } else {
            &self.name
        }
    }

    pub fn device_id(&self) -> Result<DeviceId, DriverError> {
        self.device_id.parse()
    }

    pub fn profile(&self) -> Result<Profile, LgError> {
        self.profile.parse()
    }

    /// Driver options for this display.
    pub fn device_options(
        &self,
        connection: &ConnectionConfig,
    ) -> Result<DeviceOptions, DriverError> {
        Ok(DeviceOptions {
            name: self.display_name().to_string(),
            device_id: self.device_id()?,
            unidirectional: self.unidirectional,
            disconnect_limit: connection.disconnect_limit,
            response_timeout: connection.response_timeout(),
            max_buffer: connection.max_buffer_bytes,
        })
    }
}

// Default value functions
fn default_name() -> String {
    "Room Control".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_disconnect_limit() -> u32 {
    15
}

fn default_poll_interval() -> u64 {
    5
}

fn default_response_timeout() -> u64 {
    300
}

fn default_max_buffer() -> usize {
    2048
}

fn default_reconnect_delay() -> u64 {
    5
}

fn default_baud_rate() -> u32 {
    9600
}

fn default_device_id() -> String {
    "1".to_string()
}

fn default_profile() -> String {
    "serial".to_string()
}

fn default_keep_alive() -> String {
    "Power".to_string()
}

impl RoomConfig {
    /// Load configuration from `config/room.toml` and environment variables
    pub fn load() -> Result<Self, figment::Error> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Load configuration from a specific file path
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, figment::Error> {
        Figment::new()
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("ROOM_").split("__"))
            .extract()
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> Result<(), String> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.application.log_level.to_lowercase().as_str()) {
            return Err(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.application.log_level,
                valid_levels.join(", ")
            ));
        }

        let valid_formats = ["pretty", "compact", "json"];
        if !valid_formats.contains(&self.application.log_format.to_lowercase().as_str()) {
            return Err(format!(
                "Invalid log_format '{}'. Must be one of: {}",
                self.application.log_format,
                valid_formats.join(", ")
            ));
        }

        if self.connection.poll_interval_secs == 0 {
            return Err("poll_interval_secs must be at least 1".to_string());
        }

        let mut ids = std::collections::HashSet::new();
        for display in &self.displays {
            if !ids.insert(&display.id) {
                return Err(format!("Duplicate display ID: {}", display.id));
            }

            match display.link {
                LinkKind::Tcp if display.host.is_none() || display.port.is_none() => {
                    return Err(format!(
                        "Display '{}' uses a tcp link but has no host/port",
                        display.id
                    ));
                }
                LinkKind::Serial if display.serial_path.is_none() => {
                    return Err(format!(
                        "Display '{}' uses a serial link but has no serial_path",
                        display.id
                    ));
                }
                _ => {}
            }

            display
                .device_id()
                .map_err(|e| format!("Display '{}': {}", display.id, e))?;
            display
                .profile()
                .map_err(|e| format!("Display '{}': {}", display.id, e))?;
        }

        Ok(())
    }

    pub fn display(&self, id: &str) -> Option<&DisplayConfig> {
        self.displays.iter().find(|display| display.id == id)
    }
}
