//! Qualifiers and the resolved paths they address inside a command's status.
//!
//! A [`Qualifier`] is the caller-facing, order-independent map of parameter
//! name to value (`{"Channel": "2"}`). Before it can address anything it is
//! resolved against the command's declared parameter list into a
//! [`QualifierPath`]: the parameter values in declaration order. Resolution is
//! fail-closed; a qualifier missing any declared parameter resolves to `None`.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Qualifier(BTreeMap<String, String>);

impl Qualifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, parameter: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(parameter.into(), value.into());
        self
    }

    pub fn insert(&mut self, parameter: impl Into<String>, value: impl Into<String>) {
        self.0.insert(parameter.into(), value.into());
    }

    pub fn get(&self, parameter: &str) -> Option<&str> {
        self.0.get(parameter).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Qualifier {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

impl fmt::Display for Qualifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (name, value) in &self.0 {
            if !first {
                write!(f, ", ")?;
            }
            write!(f, "{}={}", name, value)?;
            first = false;
        }
        Ok(())
    }
}

/// Ordered parameter values addressing one status slot of a command.
///
/// The empty path is the command's root slot, used by every unqualified
/// command.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct QualifierPath(Vec<String>);

impl QualifierPath {
    pub fn root() -> Self {
        Self::default()
    }

    /// Resolve `qualifier` against a command's declared `parameters`.
    ///
    /// - no qualifier (or an empty one) addresses the root slot
    /// - a command without parameters ignores any qualifier
    /// - otherwise every declared parameter must be present
    pub fn resolve(parameters: &[String], qualifier: Option<&Qualifier>) -> Option<Self> {
        let qualifier = match qualifier {
            Some(q) if !q.is_empty() => q,
            _ => return Some(Self::root()),
        };

        parameters
            .iter()
            .map(|parameter| qualifier.get(parameter).map(str::to_string))
            .collect::<Option<Vec<_>>>()
            .map(Self)
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    pub fn values(&self) -> &[String] {
        &self.0
    }
}
