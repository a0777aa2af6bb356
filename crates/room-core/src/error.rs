//! Error types for the driver core.
//!
//! Only programming errors and broken links surface as [`DriverError`]. Runtime
//! conditions a device produces on its own (an invalid value for a command, a
//! rejected frame, a missing acknowledgement) are logged and reported through
//! [`crate::SetOutcome`] / [`crate::UpdateOutcome`] instead, so the caller is
//! never forced to unwind for them.
//!
//! ## Error Hierarchy
//!
//! - **`UnsupportedCommand`**: the command name is not in the device's command
//!   table, or the command has no path for the requested operation.
//! - **`Transport`**: writing to (or waiting on) the link failed.
//! - **`InvalidPattern`**: a match rule could not be compiled while the
//!   protocol was being installed.
//! - **`InvalidDeviceId`**: a device id outside `1..=99` / `Broadcast`.

use thiserror::Error;

// =============================================================================
// Error Kinds
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverErrorKind {
    Lookup,
    Communication,
    Configuration,
}

impl std::fmt::Display for DriverErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            DriverErrorKind::Lookup => "lookup",
            DriverErrorKind::Communication => "communication",
            DriverErrorKind::Configuration => "configuration",
        };
        write!(f, "{}", label)
    }
}

/// The driver operation a lookup failure was raised for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Set,
    Update,
    SubscribeStatus,
    ReadStatus,
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Operation::Set => "Set",
            Operation::Update => "Update",
            Operation::SubscribeStatus => "SubscribeStatus",
            Operation::ReadStatus => "ReadStatus",
        };
        write!(f, "{}", label)
    }
}

// =============================================================================
// Transport Errors
// =============================================================================

/// Failure reported by a [`crate::Transport`] implementation.
#[derive(Error, Debug)]
pub enum TransportError {
    /// Underlying stream I/O failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The link is not connected (never opened, or dropped by the peer).
    #[error("link is not connected")]
    Closed,
}

// =============================================================================
// Driver Errors
// =============================================================================

/// Convenience alias for driver results.
pub type DriverResult<T> = std::result::Result<T, DriverError>;

/// Primary error type for the driver core.
#[derive(Error, Debug)]
pub enum DriverError {
    /// Command is unknown, or does not support the requested operation.
    ///
    /// This is a programming error in the caller (a typo in a command name,
    /// or `Set` on a feedback-only command such as `ConnectionStatus`).
    #[error("{command} does not support {operation}")]
    UnsupportedCommand {
        command: String,
        operation: Operation,
    },

    /// Writing a frame or waiting for its reply failed at the link level.
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// A response pattern failed to compile.
    #[error("Invalid response pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    /// Device id is neither `Broadcast` nor within `1..=99`.
    #[error("Invalid Device ID Parameter: {0}")]
    InvalidDeviceId(String),
}

impl DriverError {
    pub fn unsupported(command: impl Into<String>, operation: Operation) -> Self {
        DriverError::UnsupportedCommand {
            command: command.into(),
            operation,
        }
    }

    /// Broad category, for log fields and metrics labels.
    pub fn kind(&self) -> DriverErrorKind {
        match self {
            DriverError::UnsupportedCommand { .. } => DriverErrorKind::Lookup,
            DriverError::Transport(_) => DriverErrorKind::Communication,
            DriverError::InvalidPattern { .. } | DriverError::InvalidDeviceId(_) => {
                DriverErrorKind::Configuration
            }
        }
    }
}
