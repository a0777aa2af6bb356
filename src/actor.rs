//! Per-display connection handler.
//!
//! Each display runs in its own Tokio task that is the single owner of its
//! [`Device`]. Everything else talks to it through a [`DeviceHandle`]:
//!
//! ```text
//! Room / console ──DeviceCommand──> DeviceActor ──frames──> display
//!        ^                              │   ^
//!        │                              │   └── inbound chunks (receive)
//!        └──────── StatusEvent <────────┘
//!               (broadcast)
//! ```
//!
//! The actor loop selects over four sources:
//! - the command mailbox (`Set`, `Update`, `ReadStatus`, `SubscribeStatus`,
//!   `Shutdown`), each answered on a oneshot channel
//! - inbound byte chunks, fed to the driver's response matcher
//! - the keep-alive timer, which issues `Update(keep_alive)`
//! - the reconnect timer, armed while the link is down

use crate::config::{ConnectionConfig, DisplayConfig};
use crate::error::{RoomError, RoomResult};
use crate::link::{self, DynLink, StreamTransport};
use anyhow::Result;
use async_trait::async_trait;
use room_core::{
    Device, DriverError, DriverResult, Qualifier, SetOutcome, StatusCallback, StatusValue,
    TransportError, UpdateOutcome,
};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

const MAILBOX_CAPACITY: usize = 32;

/// A status change published by one display.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusEvent {
    /// Display id from configuration
    pub device: String,
    pub command: String,
    pub value: StatusValue,
    pub qualifier: Option<Qualifier>,
}

impl fmt::Display for StatusEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} = {}", self.device, self.command, self.value)?;
        if let Some(qualifier) = &self.qualifier {
            write!(f, " [{}]", qualifier)?;
        }
        Ok(())
    }
}

/// Opens the byte stream a display is reached through.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self) -> Result<DynLink>;
}

#[async_trait]
impl Connector for DisplayConfig {
    async fn connect(&self) -> Result<DynLink> {
        link::open(self).await
    }
}

/// Messages accepted by a [`DeviceActor`].
///
/// Each variant carries the oneshot sender its answer goes back on.
pub enum DeviceCommand {
    Set {
        command: String,
        value: StatusValue,
        qualifier: Option<Qualifier>,
        response: oneshot::Sender<DriverResult<SetOutcome>>,
    },
    Update {
        command: String,
        qualifier: Option<Qualifier>,
        response: oneshot::Sender<DriverResult<UpdateOutcome>>,
    },
    ReadStatus {
        command: String,
        qualifier: Option<Qualifier>,
        response: oneshot::Sender<DriverResult<Option<StatusValue>>>,
    },
    SubscribeStatus {
        command: String,
        qualifier: Option<Qualifier>,
        callback: StatusCallback,
        response: oneshot::Sender<DriverResult<()>>,
    },
    Shutdown {
        response: oneshot::Sender<()>,
    },
}

impl fmt::Debug for DeviceCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Set { command, value, .. } => write!(f, "Set({command}, {value})"),
            Self::Update { command, .. } => write!(f, "Update({command})"),
            Self::ReadStatus { command, .. } => write!(f, "ReadStatus({command})"),
            Self::SubscribeStatus { command, .. } => write!(f, "SubscribeStatus({command})"),
            Self::Shutdown { .. } => write!(f, "Shutdown"),
        }
    }
}

impl DeviceCommand {
    pub fn set(
        command: impl Into<String>,
        value: StatusValue,
        qualifier: Option<Qualifier>,
    ) -> (Self, oneshot::Receiver<DriverResult<SetOutcome>>) {
        let (tx, rx) = oneshot::channel();
        let cmd = Self::Set {
            command: command.into(),
            value,
            qualifier,
            response: tx,
        };
        (cmd, rx)
    }

    pub fn update(
        command: impl Into<String>,
        qualifier: Option<Qualifier>,
    ) -> (Self, oneshot::Receiver<DriverResult<UpdateOutcome>>) {
        let (tx, rx) = oneshot::channel();
        let cmd = Self::Update {
            command: command.into(),
            qualifier,
            response: tx,
        };
        (cmd, rx)
    }

    pub fn read_status(
        command: impl Into<String>,
        qualifier: Option<Qualifier>,
    ) -> (Self, oneshot::Receiver<DriverResult<Option<StatusValue>>>) {
        let (tx, rx) = oneshot::channel();
        let cmd = Self::ReadStatus {
            command: command.into(),
            qualifier,
            response: tx,
        };
        (cmd, rx)
    }

    pub fn subscribe_status(
        command: impl Into<String>,
        qualifier: Option<Qualifier>,
        callback: StatusCallback,
    ) -> (Self, oneshot::Receiver<DriverResult<()>>) {
        let (tx, rx) = oneshot::channel();
        let cmd = Self::SubscribeStatus {
            command: command.into(),
            qualifier,
            callback,
            response: tx,
        };
        (cmd, rx)
    }

    pub fn shutdown() -> (Self, oneshot::Receiver<()>) {
        let (tx, rx) = oneshot::channel();
        (Self::Shutdown { response: tx }, rx)
    }
}

/// Timing for one actor.
#[derive(Debug, Clone)]
pub struct ActorSettings {
    /// Command queried on every poll
    pub keep_alive: String,
    pub poll_interval: Duration,
    pub reconnect_delay: Duration,
}

impl ActorSettings {
    pub fn new(display: &DisplayConfig, connection: &ConnectionConfig) -> Self {
        Self {
            keep_alive: display.keep_alive.clone(),
            poll_interval: connection.poll_interval(),
            reconnect_delay: connection.reconnect_delay(),
        }
    }
}

/// Cloneable front end of a running [`DeviceActor`].
#[derive(Debug, Clone)]
pub struct DeviceHandle {
    id: String,
    tx: mpsc::Sender<DeviceCommand>,
}

impl DeviceHandle {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn is_running(&self) -> bool {
        !self.tx.is_closed()
    }

    pub async fn set(
        &self,
        command: &str,
        value: impl Into<StatusValue>,
        qualifier: Option<Qualifier>,
    ) -> RoomResult<SetOutcome> {
        let (cmd, rx) = DeviceCommand::set(command, value.into(), qualifier);
        self.request(cmd, rx).await?.map_err(RoomError::from)
    }

    pub async fn update(
        &self,
        command: &str,
        qualifier: Option<Qualifier>,
    ) -> RoomResult<UpdateOutcome> {
        let (cmd, rx) = DeviceCommand::update(command, qualifier);
        self.request(cmd, rx).await?.map_err(RoomError::from)
    }

    pub async fn read_status(
        &self,
        command: &str,
        qualifier: Option<Qualifier>,
    ) -> RoomResult<Option<StatusValue>> {
        let (cmd, rx) = DeviceCommand::read_status(command, qualifier);
        self.request(cmd, rx).await?.map_err(RoomError::from)
    }

    /// Bind a callback inside the actor. It runs on the actor task, so it
    /// must not block.
    pub async fn subscribe_status<F>(
        &self,
        command: &str,
        qualifier: Option<Qualifier>,
        callback: F,
    ) -> RoomResult<()>
    where
        F: FnMut(&str, &StatusValue, Option<&Qualifier>) + Send + 'static,
    {
        let (cmd, rx) = DeviceCommand::subscribe_status(command, qualifier, Box::new(callback));
        self.request(cmd, rx).await?.map_err(RoomError::from)
    }

    /// Ask the actor to stop and wait until it has.
    pub async fn shutdown(&self) -> RoomResult<()> {
        let (cmd, rx) = DeviceCommand::shutdown();
        self.request(cmd, rx).await
    }

    async fn request<R>(&self, cmd: DeviceCommand, rx: oneshot::Receiver<R>) -> RoomResult<R> {
        self.tx
            .send(cmd)
            .await
            .map_err(|_| RoomError::HandlerGone(self.id.clone()))?;
        rx.await.map_err(|_| RoomError::HandlerGone(self.id.clone()))
    }
}

/// Connection handler owning one display driver.
pub struct DeviceActor {
    id: String,
    device: Device<StreamTransport>,
    connector: Option<Arc<dyn Connector>>,
    settings: ActorSettings,
    reconnect_at: Option<Instant>,
}

impl DeviceActor {
    /// Wire `device` to the event channel. With no connector the stream must
    /// already be attached to the device's transport; it is then never
    /// reopened.
    pub fn new(
        id: impl Into<String>,
        mut device: Device<StreamTransport>,
        connector: Option<Arc<dyn Connector>>,
        settings: ActorSettings,
        events: broadcast::Sender<StatusEvent>,
    ) -> Self {
        let id = id.into();
        let device_id = id.clone();
        device.observe(move |change| {
            // No receivers is fine; the change is still cached.
            let _ = events.send(StatusEvent {
                device: device_id.clone(),
                command: change.command.clone(),
                value: change.value.clone(),
                qualifier: change.qualifier.clone(),
            });
        });

        Self {
            id,
            device,
            connector,
            settings,
            reconnect_at: None,
        }
    }

    /// Start the actor on the current runtime.
    pub fn spawn(self) -> (DeviceHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(MAILBOX_CAPACITY);
        let handle = DeviceHandle {
            id: self.id.clone(),
            tx,
        };
        let task = tokio::spawn(self.run(rx));
        (handle, task)
    }

    /// Main event loop.
    pub async fn run(mut self, mut command_rx: mpsc::Receiver<DeviceCommand>) {
        info!(device = %self.id, "connection handler started");

        if self.connector.is_some() {
            self.connect().await;
        } else if self.device.transport().is_attached() {
            self.device.mark_link_up();
        }

        let mut poll = tokio::time::interval(self.settings.poll_interval);
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately; initialization queries
        // explicitly, so skip it.
        poll.tick().await;

        loop {
            let reconnect_at = self.reconnect_at;
            tokio::select! {
                command = command_rx.recv() => match command {
                    Some(DeviceCommand::Shutdown { response }) => {
                        let _ = response.send(());
                        break;
                    }
                    Some(command) => self.handle_command(command).await,
                    None => break,
                },

                chunk = self.device.transport_mut().recv() => match chunk {
                    Some(bytes) => self.device.receive(&bytes),
                    None => self.link_lost("closed by peer"),
                },

                _ = poll.tick() => self.poll().await,

                _ = tokio::time::sleep_until(reconnect_at.unwrap_or_else(Instant::now)),
                    if reconnect_at.is_some() => self.connect().await,
            }
        }

        self.device.transport_mut().detach();
        info!(device = %self.id, "connection handler stopped");
    }

    async fn handle_command(&mut self, command: DeviceCommand) {
        debug!(device = %self.id, ?command, "handling command");
        match command {
            DeviceCommand::Set {
                command,
                value,
                qualifier,
                response,
            } => {
                let result = self.device.set(&command, &value, qualifier.as_ref()).await;
                self.check_transport(&result);
                let _ = response.send(result);
            }
            DeviceCommand::Update {
                command,
                qualifier,
                response,
            } => {
                let result = self.device.update(&command, qualifier.as_ref()).await;
                self.check_transport(&result);
                let _ = response.send(result);
            }
            DeviceCommand::ReadStatus {
                command,
                qualifier,
                response,
            } => {
                let _ = response.send(self.device.read_status(&command, qualifier.as_ref()));
            }
            DeviceCommand::SubscribeStatus {
                command,
                qualifier,
                callback,
                response,
            } => {
                let result = self
                    .device
                    .subscribe_status(&command, qualifier.as_ref(), callback);
                let _ = response.send(result);
            }
            DeviceCommand::Shutdown { response } => {
                let _ = response.send(());
            }
        }
    }

    /// Keep-alive query. Skipped while the link is down or when the display
    /// cannot answer.
    async fn poll(&mut self) {
        if self.device.is_write_only() || !self.device.transport().is_attached() {
            return;
        }
        let result = self.device.update(&self.settings.keep_alive, None).await;
        match &result {
            Err(DriverError::Transport(_)) => self.check_transport(&result),
            Err(e) => warn!(device = %self.id, error = %e, "keep-alive query failed"),
            Ok(_) => {}
        }
    }

    async fn connect(&mut self) {
        self.reconnect_at = None;
        let Some(connector) = self.connector.clone() else {
            return;
        };

        match connector.connect().await {
            Ok(stream) => {
                self.device.transport_mut().attach(stream);
                self.device.mark_link_up();
            }
            Err(e) => {
                warn!(
                    device = %self.id,
                    error = %e,
                    retry_in = ?self.settings.reconnect_delay,
                    "connect failed"
                );
                self.device.mark_link_down();
                self.schedule_reconnect();
            }
        }
    }

    fn check_transport<R>(&mut self, result: &DriverResult<R>) {
        if let Err(DriverError::Transport(e)) = result {
            let reason = match e {
                TransportError::Io(io) => io.to_string(),
                TransportError::Closed => "closed".to_string(),
            };
            self.link_lost(&reason);
        }
    }

    fn link_lost(&mut self, reason: &str) {
        if !self.device.transport().is_attached() && self.reconnect_at.is_some() {
            return;
        }
        warn!(device = %self.id, reason, "link lost");
        self.device.transport_mut().detach();
        self.device.mark_link_down();
        self.schedule_reconnect();
    }

    fn schedule_reconnect(&mut self) {
        if self.connector.is_some() {
            self.reconnect_at = Some(Instant::now() + self.settings.reconnect_delay);
        }
    }
}
