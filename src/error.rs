//! Room-level errors.
//!
//! Driver failures keep their own type ([`room_core::DriverError`]); this enum
//! adds what can only go wrong above a single device.

use room_core::DriverError;
use thiserror::Error;

pub type RoomResult<T> = std::result::Result<T, RoomError>;

#[derive(Error, Debug)]
pub enum RoomError {
    /// No display with that id is configured.
    #[error("Unknown display '{0}'")]
    UnknownDisplay(String),

    /// The display's connection handler has stopped.
    #[error("Connection handler for '{0}' is not running")]
    HandlerGone(String),

    #[error("Driver error: {0}")]
    Driver(#[from] DriverError),

    #[error("Configuration error: {0}")]
    Config(String),
}
