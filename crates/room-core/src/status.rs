//! Status cache and subscription registry.
//!
//! Both are keyed by command name and then by [`QualifierPath`]. Slots are
//! created lazily on first write; a write only counts as a change (and only
//! then triggers notification) when the slot is new or the value differs.

use crate::qualifier::{Qualifier, QualifierPath};
use crate::value::StatusValue;
use std::collections::HashMap;

/// Callback bound with `SubscribeStatus`: `(command, value, qualifier)`.
pub type StatusCallback = Box<dyn FnMut(&str, &StatusValue, Option<&Qualifier>) + Send>;

/// A change that passed the write-if-changed check.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusChange {
    pub command: String,
    pub value: StatusValue,
    pub qualifier: Option<Qualifier>,
}

/// Observer notified of every status change on a device, regardless of path.
pub type StatusObserver = Box<dyn FnMut(&StatusChange) + Send>;

#[derive(Debug, Default)]
pub struct StatusCache {
    slots: HashMap<String, HashMap<QualifierPath, StatusValue>>,
}

impl StatusCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `value` at `path`. Returns `true` when the stored value changed.
    pub fn write(&mut self, command: &str, path: QualifierPath, value: StatusValue) -> bool {
        let slots = self.slots.entry(command.to_string()).or_default();
        match slots.get(&path) {
            Some(live) if *live == value => false,
            _ => {
                slots.insert(path, value);
                true
            }
        }
    }

    pub fn read(&self, command: &str, path: &QualifierPath) -> Option<&StatusValue> {
        self.slots.get(command).and_then(|slots| slots.get(path))
    }

    pub fn clear(&mut self) {
        self.slots.clear();
    }
}

#[derive(Default)]
pub struct SubscriptionRegistry {
    callbacks: HashMap<String, HashMap<QualifierPath, StatusCallback>>,
}

impl std::fmt::Debug for SubscriptionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let counts: HashMap<&str, usize> = self
            .callbacks
            .iter()
            .map(|(command, paths)| (command.as_str(), paths.len()))
            .collect();
        f.debug_struct("SubscriptionRegistry")
            .field("callbacks", &counts)
            .finish()
    }
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `callback` at `path`, replacing any callback already bound there.
    pub fn subscribe(&mut self, command: &str, path: QualifierPath, callback: StatusCallback) {
        self.callbacks
            .entry(command.to_string())
            .or_default()
            .insert(path, callback);
    }

    pub fn is_subscribed(&self, command: &str, path: &QualifierPath) -> bool {
        self.callbacks
            .get(command)
            .is_some_and(|paths| paths.contains_key(path))
    }

    /// Invoke the callback bound at exactly `path`, if any.
    pub fn notify(
        &mut self,
        command: &str,
        path: &QualifierPath,
        value: &StatusValue,
        qualifier: Option<&Qualifier>,
    ) -> bool {
        match self
            .callbacks
            .get_mut(command)
            .and_then(|paths| paths.get_mut(path))
        {
            Some(callback) => {
                callback(command, value, qualifier);
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn path(values: &[&str]) -> QualifierPath {
        let params: Vec<String> = (0..values.len()).map(|i| format!("p{i}")).collect();
        let q: Qualifier = params
            .iter()
            .zip(values)
            .map(|(p, v)| (p.clone(), v.to_string()))
            .collect();
        QualifierPath::resolve(&params, Some(&q)).unwrap()
    }

    #[test]
    fn write_reports_changes_only() {
        let mut cache = StatusCache::new();
        assert!(cache.write("Power", QualifierPath::root(), "On".into()));
        assert!(!cache.write("Power", QualifierPath::root(), "On".into()));
        assert!(cache.write("Power", QualifierPath::root(), "Off".into()));
        assert_eq!(
            cache.read("Power", &QualifierPath::root()),
            Some(&StatusValue::from("Off"))
        );
    }

    #[test]
    fn slots_are_independent_per_path() {
        let mut cache = StatusCache::new();
        cache.write("Volume", path(&["1"]), 10.into());
        cache.write("Volume", path(&["2"]), 20.into());
        assert_eq!(cache.read("Volume", &path(&["1"])), Some(&StatusValue::Int(10)));
        assert_eq!(cache.read("Volume", &path(&["2"])), Some(&StatusValue::Int(20)));
        assert_eq!(cache.read("Volume", &path(&["3"])), None);
        assert_eq!(cache.read("Volume", &QualifierPath::root()), None);
    }

    #[test]
    fn notify_hits_exact_path_only() {
        let hits = Arc::new(Mutex::new(Vec::new()));
        let mut registry = SubscriptionRegistry::new();
        let sink = hits.clone();
        registry.subscribe(
            "Volume",
            path(&["1"]),
            Box::new(move |cmd, value, _q| sink.lock().unwrap().push(format!("{cmd}={value}"))),
        );

        assert!(!registry.notify("Volume", &path(&["2"]), &5.into(), None));
        assert!(registry.notify("Volume", &path(&["1"]), &7.into(), None));
        assert_eq!(*hits.lock().unwrap(), vec!["Volume=7".to_string()]);
    }

    #[test]
    fn resubscribing_replaces_callback() {
        let hits = Arc::new(Mutex::new(0u32));
        let mut registry = SubscriptionRegistry::new();
        registry.subscribe("Power", QualifierPath::root(), Box::new(|_, _, _| {}));
        let sink = hits.clone();
        registry.subscribe(
            "Power",
            QualifierPath::root(),
            Box::new(move |_, _, _| *sink.lock().unwrap() += 1),
        );

        registry.notify("Power", &QualifierPath::root(), &"On".into(), None);
        assert_eq!(*hits.lock().unwrap(), 1);
        assert!(registry.is_subscribed("Power", &QualifierPath::root()));
    }
}
