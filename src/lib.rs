//! # Room Control
//!
//! Controller for an AV room: two displays switched from a touch panel (or
//! the console that stands in for it), with startup, shutdown and per-display
//! power actions.
//!
//! ## Crate Structure
//!
//! - **`config`**: Room configuration loaded with Figment from
//!   `config/room.toml` and `ROOM_*` environment variables.
//! - **`tracing_setup`**: Structured logging initialization.
//! - **`link`**: Stream transports (TCP serial-over-Ethernet, optional local
//!   serial port) implementing `room_core::Transport`.
//! - **`actor`**: Per-display connection handler owning the driver.
//! - **`room`**: Room-level sequences over all displays.
//! - **`console`**: Line commands for the `run` mode.
//! - **`error`**: `RoomError` for failures above a single device.
//!
//! Device protocol logic lives in the workspace crates `room-core` (driver
//! core) and `room-driver-lg` (display protocol).

pub mod actor;
pub mod config;
pub mod console;
pub mod error;
pub mod link;
pub mod room;
pub mod tracing_setup;

pub use actor::{DeviceActor, DeviceHandle, StatusEvent};
pub use config::RoomConfig;
pub use error::{RoomError, RoomResult};
pub use room::{DisplayStatus, Room};
