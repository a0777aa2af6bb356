//! Room controller: the actions the touch panel exposes.
//!
//! A [`Room`] owns one connection handler per configured display and runs
//! the room-level sequences on top of them. Sequences address displays in
//! configuration order and send every `Set` before the follow-up `Update`s.

use crate::actor::{ActorSettings, Connector, DeviceActor, DeviceHandle, StatusEvent};
use crate::config::RoomConfig;
use crate::error::{RoomError, RoomResult};
use crate::link::StreamTransport;
use anyhow::{Context, Result};
use room_core::{Device, StatusValue, CONNECTION_STATUS};
use room_driver_lg::{LgDisplay, Profile};
use std::fmt;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

const EVENT_CAPACITY: usize = 256;

/// One display as the room sees it.
#[derive(Debug, Clone)]
pub struct RoomDisplay {
    pub id: String,
    pub name: String,
    pub profile: Profile,
    pub handle: DeviceHandle,
}

impl RoomDisplay {
    /// Command and value that switch the display on or off, if the profile
    /// has one.
    fn power_command(&self, on: bool) -> Option<(&'static str, StatusValue)> {
        match (self.profile, on) {
            (Profile::Serial, true) => Some(("Power", "On".into())),
            (Profile::Serial, false) => Some(("Power", "Off".into())),
            (Profile::Ethernet, true) => None,
            (Profile::Ethernet, false) => Some(("PowerOff", "".into())),
        }
    }

    /// Command carrying the power state, if the profile can report it.
    fn power_status(&self) -> Option<&'static str> {
        match self.profile {
            Profile::Serial => Some("Power"),
            Profile::Ethernet => None,
        }
    }
}

/// Last known state of one display.
#[derive(Debug, Clone, PartialEq)]
pub struct DisplayStatus {
    pub id: String,
    pub name: String,
    pub power: Option<StatusValue>,
    pub connection: Option<StatusValue>,
}

impl fmt::Display for DisplayStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn or_unknown(value: &Option<StatusValue>) -> String {
            value
                .as_ref()
                .map_or_else(|| "unknown".to_string(), ToString::to_string)
        }
        write!(
            f,
            "{} ({}): power {}, {}",
            self.id,
            self.name,
            or_unknown(&self.power),
            or_unknown(&self.connection)
        )
    }
}

pub struct Room {
    displays: Vec<RoomDisplay>,
    events: broadcast::Sender<StatusEvent>,
    tasks: Vec<JoinHandle<()>>,
}

impl Default for Room {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Room {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Room")
            .field("displays", &self.displays)
            .finish()
    }
}

impl Room {
    /// An empty room. Displays are added with [`Room::add`].
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            displays: Vec::new(),
            events,
            tasks: Vec::new(),
        }
    }

    /// Build and start a connection handler for every configured display.
    ///
    /// Every driver is built before any handler starts, so a bad display
    /// leaves nothing running.
    pub fn spawn(config: &RoomConfig) -> Result<Self> {
        let mut room = Self::new();
        let mut actors = Vec::with_capacity(config.displays.len());
        for display in &config.displays {
            let profile = display
                .profile()
                .with_context(|| format!("display '{}'", display.id))?;
            let options = display
                .device_options(&config.connection)
                .with_context(|| format!("display '{}'", display.id))?;
            let device = Device::new(StreamTransport::new(), LgDisplay::new(profile), options)
                .with_context(|| format!("Failed to build driver for '{}'", display.id))?;

            let connector: Arc<dyn Connector> = Arc::new(display.clone());
            let actor = DeviceActor::new(
                display.id.clone(),
                device,
                Some(connector),
                ActorSettings::new(display, &config.connection),
                room.event_sender(),
            );
            actors.push((display.display_name(), profile, actor));
        }
        for (name, profile, actor) in actors {
            room.add(name, profile, actor);
        }
        info!(displays = room.displays.len(), "room started");
        Ok(room)
    }

    /// Sender to hand to [`DeviceActor::new`] for displays added by hand.
    pub fn event_sender(&self) -> broadcast::Sender<StatusEvent> {
        self.events.clone()
    }

    /// Start `actor` and register it under its id.
    pub fn add(&mut self, name: impl Into<String>, profile: Profile, actor: DeviceActor) {
        let (handle, task) = actor.spawn();
        self.displays.push(RoomDisplay {
            id: handle.id().to_string(),
            name: name.into(),
            profile,
            handle,
        });
        self.tasks.push(task);
    }

    pub fn events(&self) -> broadcast::Receiver<StatusEvent> {
        self.events.subscribe()
    }

    pub fn displays(&self) -> &[RoomDisplay] {
        &self.displays
    }

    pub fn display(&self, id: &str) -> RoomResult<&RoomDisplay> {
        self.displays
            .iter()
            .find(|display| display.id == id)
            .ok_or_else(|| RoomError::UnknownDisplay(id.to_string()))
    }

    /// Query the power state of every display.
    pub async fn initialize(&self) -> RoomResult<()> {
        self.for_each(|display| self.refresh(display)).await
    }

    /// Power every display on.
    pub async fn startup(&self) -> RoomResult<()> {
        info!("room startup");
        self.power_all(true).await
    }

    /// Power every display off.
    pub async fn shutdown(&self) -> RoomResult<()> {
        info!("room shutdown");
        self.power_all(false).await
    }

    /// Switch one display and ask it for its new state.
    pub async fn power(&self, id: &str, on: bool) -> RoomResult<()> {
        let display = self.display(id)?;
        self.apply_power(display, on).await?;
        self.refresh(display).await
    }

    /// Last known power and connection state of every display.
    pub async fn status(&self) -> RoomResult<Vec<DisplayStatus>> {
        let mut snapshot = Vec::with_capacity(self.displays.len());
        for display in &self.displays {
            let power = match display.power_status() {
                Some(command) => display.handle.read_status(command, None).await?,
                None => None,
            };
            let connection = display.handle.read_status(CONNECTION_STATUS, None).await?;
            snapshot.push(DisplayStatus {
                id: display.id.clone(),
                name: display.name.clone(),
                power,
                connection,
            });
        }
        Ok(snapshot)
    }

    /// Stop every connection handler and wait for their tasks.
    pub async fn close(self) {
        for entry in &self.displays {
            if let Err(e) = entry.handle.shutdown().await {
                warn!(display = %entry.id, error = %e, "handler already stopped");
            }
        }
        for task in self.tasks {
            if let Err(e) = task.await {
                error!(error = %e, "connection handler task failed");
            }
        }
    }

    async fn power_all(&self, on: bool) -> RoomResult<()> {
        let sets = self.for_each(|display| self.apply_power(display, on)).await;
        let updates = self.for_each(|display| self.refresh(display)).await;
        sets.and(updates)
    }

    async fn apply_power(&self, entry: &RoomDisplay, on: bool) -> RoomResult<()> {
        let Some((command, value)) = entry.power_command(on) else {
            warn!(
                display = %entry.id,
                profile = %entry.profile,
                "no power-on command for this control profile"
            );
            return Ok(());
        };
        let outcome = entry.handle.set(command, value, None).await?;
        info!(display = %entry.id, command, ?outcome, "power {}", if on { "on" } else { "off" });
        Ok(())
    }

    async fn refresh(&self, display: &RoomDisplay) -> RoomResult<()> {
        if let Some(command) = display.power_status() {
            display.handle.update(command, None).await?;
        }
        Ok(())
    }

    /// Run `step` on every display in order. A failing display is logged and
    /// skipped; the first error is returned once all have been tried.
    async fn for_each<'a, F, Fut>(&'a self, mut step: F) -> RoomResult<()>
    where
        F: FnMut(&'a RoomDisplay) -> Fut,
        Fut: std::future::Future<Output = RoomResult<()>>,
    {
        let mut first_error = None;
        for entry in &self.displays {
            if let Err(e) = step(entry).await {
                error!(display = %entry.id, error = %e, "display step failed");
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}
