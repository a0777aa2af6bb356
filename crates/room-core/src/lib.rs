//! `room-core`
//!
//! Vendor-independent core for command/response device drivers: the kind of
//! RS-232 or serial-over-IP control protocol spoken by displays, matrix
//! switchers and projectors.
//!
//! ## Building Blocks
//!
//! - [`CommandTable`]: static registry of commands with their set/query encoders
//! - [`ResponseMatcher`]: regex scan of an accumulating receive buffer
//! - [`StatusCache`] / [`SubscriptionRegistry`]: write-if-changed status tree
//!   with per-path callbacks
//! - [`LivenessTracker`]: unanswered-query counter driving `ConnectionStatus`
//! - [`Device`]: the `Set` / `Update` / `SubscribeStatus` / `ReadStatus` facade
//!
//! A vendor crate supplies a [`Protocol`]; the application supplies a
//! [`Transport`] and feeds inbound bytes to [`Device::receive`].
//!
//! ## Example
//!
//! ```rust,ignore
//! use room_core::{Device, DeviceOptions, mock::MockTransport};
//!
//! let (transport, handle) = MockTransport::new();
//! let mut display = Device::new(transport, protocol, DeviceOptions::named("Left"))?;
//! display.subscribe_status("Power", None, |cmd, value, _| println!("{cmd} -> {value}"))?;
//! display.set("Power", &"On".into(), None).await?;
//! display.receive(b"a 01 OK01x");
//! ```

pub mod address;
pub mod command;
pub mod device;
pub mod error;
pub mod liveness;
pub mod matcher;
pub mod mock;
pub mod qualifier;
pub mod status;
pub mod transport;
pub mod value;

pub use address::DeviceId;
pub use command::{
    CommandEntry, CommandTable, EncodeSet, EncodeUpdate, FrameContext, CONNECTION_STATUS,
};
pub use device::{Device, DeviceOptions, Protocol, SetOutcome, UpdateOutcome};
pub use error::{DriverError, DriverErrorKind, DriverResult, Operation, TransportError};
pub use liveness::{ConnectionState, LivenessTracker};
pub use matcher::{MatchOutcome, MatchRule, ResponseMatcher};
pub use qualifier::{Qualifier, QualifierPath};
pub use status::{StatusCache, StatusCallback, StatusChange, SubscriptionRegistry};
pub use transport::Transport;
pub use value::{StatusValue, ValueCodec, ValueTable};
