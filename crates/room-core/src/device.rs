//! Driver facade: `Set` / `Update` / `SubscribeStatus` / `ReadStatus`.
//!
//! A [`Device`] glues a [`Protocol`] (what the frames look like) to a
//! [`Transport`] (where they go) and owns all per-device mutable state: the
//! receive buffer, the status cache, the subscriptions and the liveness
//! counter. It performs no locking; callers drive it from one task.
//!
//! # Dispatch policy
//!
//! | Situation | Result |
//! |---|---|
//! | unknown command | `Err(UnsupportedCommand)` |
//! | `Set` / `Update` on a command without a set / query path | `Err(UnsupportedCommand)` |
//! | value or qualifier not accepted | logged, `Discarded` |
//! | write-only device | `Set` sent without waiting, `Update` discarded |
//! | no acknowledgement in time | logged, `TimedOut` |
//! | device refuses | logged, `Rejected` |

use crate::address::DeviceId;
use crate::command::{CommandTable, FrameContext, CONNECTION_STATUS};
use crate::error::{DriverError, DriverResult, Operation};
use crate::liveness::{ConnectionState, LivenessTracker, DEFAULT_DISCONNECT_LIMIT};
use crate::matcher::{MatchOutcome, MatchRule, ResponseMatcher, DEFAULT_MAX_BUFFER};
use crate::qualifier::{Qualifier, QualifierPath};
use crate::status::{StatusCache, StatusChange, StatusObserver, SubscriptionRegistry};
use crate::transport::Transport;
use crate::value::StatusValue;
use regex::bytes::Regex;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Default wait for a `Set` acknowledgement.
pub const DEFAULT_RESPONSE_TIMEOUT: Duration = Duration::from_millis(300);

/// Wire-level description of a device family.
pub trait Protocol: Send + Sync {
    /// Every command the device understands.
    fn commands(&self) -> CommandTable;

    /// Rules decoding unsolicited and queried replies.
    fn match_rules(&self) -> DriverResult<Vec<MatchRule>>;

    /// Pattern terminating the acknowledgement of a `Set`.
    fn reply_delimiter(&self) -> DriverResult<Regex>;

    /// Whether an acknowledgement is a refusal.
    fn is_rejection(&self, reply: &[u8]) -> bool;

    /// Protocols that never answer (for example a control-only network port).
    fn is_unidirectional(&self) -> bool {
        false
    }
}

/// Per-instance settings.
#[derive(Debug, Clone)]
pub struct DeviceOptions {
    /// Name used in log lines.
    pub name: String,
    pub device_id: DeviceId,
    /// Link cannot carry replies back.
    pub unidirectional: bool,
    pub disconnect_limit: u32,
    pub response_timeout: Duration,
    pub max_buffer: usize,
}

impl Default for DeviceOptions {
    fn default() -> Self {
        Self {
            name: "device".to_string(),
            device_id: DeviceId::default(),
            unidirectional: false,
            disconnect_limit: DEFAULT_DISCONNECT_LIMIT,
            response_timeout: DEFAULT_RESPONSE_TIMEOUT,
            max_buffer: DEFAULT_MAX_BUFFER,
        }
    }
}

impl DeviceOptions {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

/// Result of a `Set` that did not fail at the lookup or link level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetOutcome {
    /// Device acknowledged the frame.
    Accepted,
    /// Device answered with a refusal.
    Rejected,
    /// No acknowledgement within the response timeout.
    TimedOut,
    /// Value or qualifier not valid for the command; nothing was sent.
    Discarded,
    /// Write-only device: frame sent, no acknowledgement expected.
    Sent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// Query written; the answer arrives through [`Device::receive`].
    Sent,
    /// Nothing to ask: write-only device, or the qualifier is incomplete.
    Discarded,
}

pub struct Device<T> {
    name: String,
    device_id: DeviceId,
    write_only: bool,
    response_timeout: Duration,
    protocol: Box<dyn Protocol>,
    commands: CommandTable,
    delimiter: Regex,
    transport: T,
    matcher: ResponseMatcher,
    cache: StatusCache,
    subscriptions: SubscriptionRegistry,
    observers: Vec<StatusObserver>,
    liveness: LivenessTracker,
}

impl<T> std::fmt::Debug for Device<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Device")
            .field("name", &self.name)
            .field("device_id", &self.device_id)
            .field("write_only", &self.write_only)
            .field("state", &self.liveness.state())
            .finish_non_exhaustive()
    }
}

impl<T: Transport> Device<T> {
    /// Install `protocol` over `transport`.
    ///
    /// Match rules are only registered when replies can come back: not for a
    /// broadcast id, a unidirectional link, or a protocol that never answers.
    pub fn new(
        transport: T,
        protocol: impl Protocol + 'static,
        options: DeviceOptions,
    ) -> DriverResult<Self> {
        let write_only = options.unidirectional
            || options.device_id.is_broadcast()
            || protocol.is_unidirectional();

        let mut matcher = ResponseMatcher::new(options.max_buffer);
        if !write_only {
            for rule in protocol.match_rules()? {
                matcher.add_match_string(rule);
            }
        }

        let delimiter = protocol.reply_delimiter()?;
        let commands = protocol.commands();

        debug!(
            device = %options.name,
            id = %options.device_id,
            write_only,
            commands = commands.len(),
            rules = matcher.rule_count(),
            "driver installed"
        );

        Ok(Self {
            name: options.name,
            device_id: options.device_id,
            write_only,
            response_timeout: options.response_timeout,
            protocol: Box::new(protocol),
            commands,
            delimiter,
            transport,
            matcher,
            cache: StatusCache::new(),
            subscriptions: SubscriptionRegistry::new(),
            observers: Vec::new(),
            liveness: LivenessTracker::new(options.disconnect_limit),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn device_id(&self) -> &DeviceId {
        &self.device_id
    }

    pub fn is_write_only(&self) -> bool {
        self.write_only
    }

    pub fn commands(&self) -> &CommandTable {
        &self.commands
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.liveness.state()
    }

    /// Bytes held in the receive buffer.
    pub fn buffered_len(&self) -> usize {
        self.matcher.buffered().len()
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    // =========================================================================
    // Set / Update
    // =========================================================================

    pub async fn set(
        &mut self,
        command: &str,
        value: &StatusValue,
        qualifier: Option<&Qualifier>,
    ) -> DriverResult<SetOutcome> {
        let frame = match self.encode_set(command, value, qualifier)? {
            Some(frame) => frame,
            None => {
                warn!(device = %self.name, command, %value, "Invalid Command for Set{}", command);
                return Ok(SetOutcome::Discarded);
            }
        };

        debug!(device = %self.name, command, frame = %frame.escape_debug(), "set");

        if self.write_only {
            self.transport.send(frame.as_bytes()).await?;
            return Ok(SetOutcome::Sent);
        }

        let reply = self
            .transport
            .send_and_wait(frame.as_bytes(), self.response_timeout, &self.delimiter)
            .await?;

        match reply {
            None => {
                error!(device = %self.name, command, "{}: Invalid/unexpected response", command);
                Ok(SetOutcome::TimedOut)
            }
            Some(reply) if self.protocol.is_rejection(&reply) => {
                error!(
                    device = %self.name,
                    command,
                    reply = %String::from_utf8_lossy(&reply),
                    "An error occurred: {}.",
                    command
                );
                Ok(SetOutcome::Rejected)
            }
            Some(_) => Ok(SetOutcome::Accepted),
        }
    }

    pub async fn update(
        &mut self,
        command: &str,
        qualifier: Option<&Qualifier>,
    ) -> DriverResult<UpdateOutcome> {
        let frame = match self.encode_update(command, qualifier)? {
            Some(frame) => frame,
            None => {
                warn!(device = %self.name, command, "Inappropriate Command {}", command);
                return Ok(UpdateOutcome::Discarded);
            }
        };

        if self.liveness.first_query() {
            self.publish_connection(ConnectionState::Connected);
        }
        if let Some(state) = self.liveness.record_query() {
            self.publish_connection(state);
        }

        debug!(device = %self.name, command, frame = %frame.escape_debug(), "update");
        self.transport.send(frame.as_bytes()).await?;
        Ok(UpdateOutcome::Sent)
    }

    fn encode_set(
        &self,
        command: &str,
        value: &StatusValue,
        qualifier: Option<&Qualifier>,
    ) -> DriverResult<Option<String>> {
        let entry = self
            .commands
            .get(command)
            .ok_or_else(|| DriverError::unsupported(command, Operation::Set))?;
        let setter = entry
            .setter()
            .ok_or_else(|| DriverError::unsupported(command, Operation::Set))?;

        let Some(path) = QualifierPath::resolve(entry.parameters(), qualifier) else {
            return Ok(None);
        };
        let ctx = FrameContext {
            device_id: &self.device_id,
            qualifier: &path,
        };
        Ok(setter.encode_set(value, &ctx))
    }

    fn encode_update(
        &self,
        command: &str,
        qualifier: Option<&Qualifier>,
    ) -> DriverResult<Option<String>> {
        let entry = self
            .commands
            .get(command)
            .ok_or_else(|| DriverError::unsupported(command, Operation::Update))?;
        let updater = entry
            .updater()
            .ok_or_else(|| DriverError::unsupported(command, Operation::Update))?;
        if self.write_only {
            return Ok(None);
        }
        let Some(path) = QualifierPath::resolve(entry.parameters(), qualifier) else {
            return Ok(None);
        };
        let ctx = FrameContext {
            device_id: &self.device_id,
            qualifier: &path,
        };
        Ok(Some(updater.encode_update(&ctx)))
    }

    // =========================================================================
    // Inbound path
    // =========================================================================

    /// Feed one inbound chunk. Never fails: anything unparseable stays in the
    /// (bounded) buffer or is dropped as noise.
    pub fn receive(&mut self, chunk: &[u8]) {
        for outcome in self.matcher.feed(chunk) {
            match outcome {
                MatchOutcome::Status {
                    command,
                    value,
                    qualifier,
                } => {
                    if let Some(state) = self.liveness.on_reply() {
                        self.publish_connection(state);
                    }
                    self.write_status(&command, value, qualifier.as_ref());
                }
                MatchOutcome::Rejected { label } => {
                    self.liveness.on_reject();
                    error!(device = %self.name, command = %label, "An error occurred: {}.", label);
                }
                MatchOutcome::Ignored => {
                    debug!(device = %self.name, "reply decoded to nothing");
                }
            }
        }
    }

    // =========================================================================
    // Status
    // =========================================================================

    /// Store a value and notify on change. Returns whether anything changed.
    ///
    /// Unknown commands and incomplete qualifiers are ignored.
    pub fn write_status(
        &mut self,
        command: &str,
        value: StatusValue,
        qualifier: Option<&Qualifier>,
    ) -> bool {
        let Some(entry) = self.commands.get(command) else {
            warn!(device = %self.name, command, "status for unknown command ignored");
            return false;
        };
        let Some(path) = QualifierPath::resolve(entry.parameters(), qualifier) else {
            return false;
        };

        if !self.cache.write(command, path.clone(), value.clone()) {
            return false;
        }

        debug!(device = %self.name, command, %value, "status changed");
        self.subscriptions.notify(command, &path, &value, qualifier);

        if !self.observers.is_empty() {
            let change = StatusChange {
                command: command.to_string(),
                value,
                qualifier: qualifier.cloned(),
            };
            for observer in &mut self.observers {
                observer(&change);
            }
        }
        true
    }

    /// Bind `callback` to one status path. Re-binding the same path replaces
    /// the previous callback; an incomplete qualifier binds nothing.
    pub fn subscribe_status<F>(
        &mut self,
        command: &str,
        qualifier: Option<&Qualifier>,
        callback: F,
    ) -> DriverResult<()>
    where
        F: FnMut(&str, &StatusValue, Option<&Qualifier>) + Send + 'static,
    {
        let entry = self
            .commands
            .get(command)
            .ok_or_else(|| DriverError::unsupported(command, Operation::SubscribeStatus))?;
        if let Some(path) = QualifierPath::resolve(entry.parameters(), qualifier) {
            self.subscriptions.subscribe(command, path, Box::new(callback));
        }
        Ok(())
    }

    /// Last known value, or `None` if nothing has been stored at that path.
    pub fn read_status(
        &self,
        command: &str,
        qualifier: Option<&Qualifier>,
    ) -> DriverResult<Option<StatusValue>> {
        let entry = self
            .commands
            .get(command)
            .ok_or_else(|| DriverError::unsupported(command, Operation::ReadStatus))?;
        Ok(QualifierPath::resolve(entry.parameters(), qualifier)
            .and_then(|path| self.cache.read(command, &path).cloned()))
    }

    /// Register an observer that sees every status change on this device.
    pub fn observe<F>(&mut self, observer: F)
    where
        F: FnMut(&StatusChange) + Send + 'static,
    {
        self.observers.push(Box::new(observer));
    }

    // =========================================================================
    // Link state
    // =========================================================================

    /// The transport (re)connected.
    pub fn mark_link_up(&mut self) {
        self.liveness.link_up();
        self.publish_connection(ConnectionState::Connected);
    }

    /// The transport lost its link. Partial frames are discarded.
    pub fn mark_link_down(&mut self) {
        self.matcher.clear();
        self.liveness.link_down();
        self.publish_connection(ConnectionState::Disconnected);
    }

    fn publish_connection(&mut self, state: ConnectionState) {
        if self.write_status(CONNECTION_STATUS, state.into(), None) {
            match state {
                ConnectionState::Connected => info!(device = %self.name, "connected"),
                ConnectionState::Disconnected => warn!(device = %self.name, "disconnected"),
            }
        }
    }
}
