//! Command table: the static registry of what a device can be told and asked.
//!
//! Each [`CommandEntry`] pairs a command name with an optional set encoder and
//! an optional update (query) encoder. The table is built once when the
//! protocol is installed and never changes afterwards; `Set`/`Update` resolve
//! through it instead of synthesising method names at runtime.

use crate::address::DeviceId;
use crate::qualifier::QualifierPath;
use crate::value::StatusValue;
use std::collections::HashMap;
use std::sync::Arc;

/// Feedback-only command every device carries. Values are `Connected` and
/// `Disconnected`.
pub const CONNECTION_STATUS: &str = "ConnectionStatus";

/// Addressing information handed to encoders.
#[derive(Debug, Clone, Copy)]
pub struct FrameContext<'a> {
    pub device_id: &'a DeviceId,
    pub qualifier: &'a QualifierPath,
}

/// Builds the frame for `Set(command, value)`.
pub trait EncodeSet: Send + Sync {
    /// Frame to transmit, or `None` when `value` is not valid for the command.
    fn encode_set(&self, value: &StatusValue, ctx: &FrameContext<'_>) -> Option<String>;
}

/// Builds the query frame for `Update(command)`.
pub trait EncodeUpdate: Send + Sync {
    fn encode_update(&self, ctx: &FrameContext<'_>) -> String;
}

#[derive(Clone)]
pub struct CommandEntry {
    name: String,
    parameters: Vec<String>,
    set: Option<Arc<dyn EncodeSet>>,
    update: Option<Arc<dyn EncodeUpdate>>,
}

impl std::fmt::Debug for CommandEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandEntry")
            .field("name", &self.name)
            .field("parameters", &self.parameters)
            .field("settable", &self.set.is_some())
            .field("queryable", &self.update.is_some())
            .finish()
    }
}

impl CommandEntry {
    /// A feedback-only command with no parameters.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parameters: Vec::new(),
            set: None,
            update: None,
        }
    }

    /// Declare the qualifier parameters addressing this command's status.
    pub fn with_parameters<I, S>(mut self, parameters: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.parameters = parameters.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_set(mut self, encoder: impl EncodeSet + 'static) -> Self {
        self.set = Some(Arc::new(encoder));
        self
    }

    pub fn with_update(mut self, encoder: impl EncodeUpdate + 'static) -> Self {
        self.update = Some(Arc::new(encoder));
        self
    }

    /// Share one encoder object for both directions.
    pub fn with_codec<E>(mut self, encoder: E) -> Self
    where
        E: EncodeSet + EncodeUpdate + 'static,
    {
        let shared = Arc::new(encoder);
        self.set = Some(shared.clone());
        self.update = Some(shared);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parameters(&self) -> &[String] {
        &self.parameters
    }

    pub fn setter(&self) -> Option<&dyn EncodeSet> {
        self.set.as_deref()
    }

    pub fn updater(&self) -> Option<&dyn EncodeUpdate> {
        self.update.as_deref()
    }
}

/// Lookup table from command name to its entry.
#[derive(Debug, Clone)]
pub struct CommandTable {
    entries: HashMap<String, CommandEntry>,
}

impl Default for CommandTable {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandTable {
    /// An empty table holding only [`CONNECTION_STATUS`].
    pub fn new() -> Self {
        let mut entries = HashMap::new();
        entries.insert(
            CONNECTION_STATUS.to_string(),
            CommandEntry::new(CONNECTION_STATUS),
        );
        Self { entries }
    }

    /// Add (or replace) a command.
    pub fn insert(&mut self, entry: CommandEntry) {
        self.entries.insert(entry.name.clone(), entry);
    }

    pub fn with(mut self, entry: CommandEntry) -> Self {
        self.insert(entry);
        self
    }

    pub fn get(&self, name: &str) -> Option<&CommandEntry> {
        self.entries.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Command names, sorted for stable listings.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.entries.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}
