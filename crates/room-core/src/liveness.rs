//! Connection liveness tracking.
//!
//! Queries are fire-and-forget, so the only evidence that a device is still
//! there is that its replies keep decoding. The tracker counts queries sent
//! since the last decoded reply and declares the device disconnected once the
//! count exceeds the configured limit.

use crate::value::StatusValue;
use std::fmt;

/// Default number of unanswered queries tolerated before disconnecting.
pub const DEFAULT_DISCONNECT_LIMIT: u32 = 15;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connected,
    Disconnected,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Connected => "Connected",
            ConnectionState::Disconnected => "Disconnected",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<ConnectionState> for StatusValue {
    fn from(state: ConnectionState) -> Self {
        StatusValue::from(state.as_str())
    }
}

/// Counter plus a two-state machine. Starts optimistic (`Connected`).
///
/// Methods return `Some(state)` only when the state actually changed, so the
/// caller can forward transitions without deduplicating them.
#[derive(Debug, Clone)]
pub struct LivenessTracker {
    threshold: u32,
    counter: u32,
    state: ConnectionState,
    announced: bool,
}

impl Default for LivenessTracker {
    fn default() -> Self {
        Self::new(DEFAULT_DISCONNECT_LIMIT)
    }
}

impl LivenessTracker {
    pub fn new(threshold: u32) -> Self {
        Self {
            threshold,
            counter: 0,
            state: ConnectionState::Connected,
            announced: false,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn pending(&self) -> u32 {
        self.counter
    }

    /// `true` exactly once: on the first query after construction. The
    /// caller publishes the initial `Connected` state at that point.
    pub fn first_query(&mut self) -> bool {
        if self.announced {
            return false;
        }
        self.announced = true;
        self.counter = 0;
        true
    }

    /// Account for one outbound query.
    pub fn record_query(&mut self) -> Option<ConnectionState> {
        self.counter = self.counter.saturating_add(1);
        if self.counter > self.threshold && self.state == ConnectionState::Connected {
            self.state = ConnectionState::Disconnected;
            return Some(ConnectionState::Disconnected);
        }
        None
    }

    /// A reply decoded into a status value.
    pub fn on_reply(&mut self) -> Option<ConnectionState> {
        self.counter = 0;
        self.reconnect()
    }

    /// The device answered, but with a refusal. Proves the link is alive
    /// without saying anything about state.
    pub fn on_reject(&mut self) {
        self.counter = 0;
    }

    /// The transport (re)established its link.
    pub fn link_up(&mut self) -> Option<ConnectionState> {
        self.counter = 0;
        self.announced = true;
        self.reconnect()
    }

    /// The transport lost its link.
    pub fn link_down(&mut self) -> Option<ConnectionState> {
        if self.state == ConnectionState::Disconnected {
            return None;
        }
        self.state = ConnectionState::Disconnected;
        Some(ConnectionState::Disconnected)
    }

    fn reconnect(&mut self) -> Option<ConnectionState> {
        if self.state == ConnectionState::Connected {
            return None;
        }
        self.state = ConnectionState::Connected;
        Some(ConnectionState::Connected)
    }
}
