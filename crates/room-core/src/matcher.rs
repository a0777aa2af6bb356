//! Response matcher: turns an inbound byte stream into decoded replies.
//!
//! Inbound chunks are appended to a receive buffer that is rescanned against
//! every registered [`MatchRule`] in registration order. Each rule consumes
//! all of its matches (one chunk can carry several batched replies) and hands
//! the captures to its decoder. Whatever precedes the earliest match is
//! treated as unrecoverable noise and dropped; the buffer is always capped at
//! `max_buffer` bytes, oldest bytes first, so unparseable input cannot grow
//! it without bound. A partial frame simply stays buffered until the next
//! chunk completes it.
//!
//! The scan is `O(rules × rescans)` per chunk. That is fine for control
//! protocols exchanging a handful of short frames per second.

use crate::qualifier::Qualifier;
use crate::value::StatusValue;
use regex::bytes::{Captures, Regex};
use std::sync::Arc;

/// Default receive buffer cap in bytes.
pub const DEFAULT_MAX_BUFFER: usize = 2048;

/// What a decoder made of one matched reply.
#[derive(Debug, Clone, PartialEq)]
pub enum MatchOutcome {
    /// A status value to write into the cache.
    Status {
        command: String,
        value: StatusValue,
        qualifier: Option<Qualifier>,
    },
    /// The device refused a command. `label` names what was refused.
    Rejected { label: String },
    /// Well-formed reply carrying nothing usable (for example an out of
    /// range level).
    Ignored,
}

impl MatchOutcome {
    pub fn status(command: impl Into<String>, value: impl Into<StatusValue>) -> Self {
        MatchOutcome::Status {
            command: command.into(),
            value: value.into(),
            qualifier: None,
        }
    }
}

pub type DecodeFn = Arc<dyn Fn(&Captures<'_>, Option<&str>) -> MatchOutcome + Send + Sync>;

/// A compiled pattern, its decoder and an opaque tag passed back to it.
#[derive(Clone)]
pub struct MatchRule {
    pattern: Regex,
    decode: DecodeFn,
    tag: Option<String>,
}

impl std::fmt::Debug for MatchRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MatchRule")
            .field("pattern", &self.pattern.as_str())
            .field("tag", &self.tag)
            .finish_non_exhaustive()
    }
}

impl MatchRule {
    pub fn new<F>(pattern: Regex, decode: F) -> Self
    where
        F: Fn(&Captures<'_>, Option<&str>) -> MatchOutcome + Send + Sync + 'static,
    {
        Self {
            pattern,
            decode: Arc::new(decode),
            tag: None,
        }
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    pub fn pattern(&self) -> &str {
        self.pattern.as_str()
    }
}

#[derive(Debug)]
pub struct ResponseMatcher {
    rules: Vec<MatchRule>,
    buffer: Vec<u8>,
    max_buffer: usize,
}

impl Default for ResponseMatcher {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_BUFFER)
    }
}

impl ResponseMatcher {
    pub fn new(max_buffer: usize) -> Self {
        Self {
            rules: Vec::new(),
            buffer: Vec::new(),
            max_buffer,
        }
    }

    /// Register a rule. A second rule with an identical pattern is ignored;
    /// returns whether the rule was added.
    pub fn add_match_string(&mut self, rule: MatchRule) -> bool {
        if self
            .rules
            .iter()
            .any(|existing| existing.pattern() == rule.pattern())
        {
            return false;
        }
        self.rules.push(rule);
        true
    }

    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    /// Bytes currently held back waiting for a complete frame.
    pub fn buffered(&self) -> &[u8] {
        &self.buffer
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    /// Append `chunk` and return every reply it completed, in scan order.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<MatchOutcome> {
        self.buffer.extend_from_slice(chunk);

        let mut outcomes = Vec::new();
        let mut earliest: Option<usize> = None;

        for rule in &self.rules {
            loop {
                let (start, end, outcome) = match rule.pattern.captures(&self.buffer) {
                    Some(caps) => {
                        let whole = match caps.get(0) {
                            Some(m) => m,
                            None => break,
                        };
                        let outcome = (rule.decode)(&caps, rule.tag.as_deref());
                        (whole.start(), whole.end(), outcome)
                    }
                    None => break,
                };

                outcomes.push(outcome);
                earliest = Some(earliest.map_or(start, |e| e.min(start)));
                if end == start {
                    // Zero-width match: nothing to consume, would loop forever.
                    break;
                }
                self.buffer.drain(start..end);
            }
        }

        if let Some(start) = earliest {
            let start = start.min(self.buffer.len());
            if start > 0 {
                tracing::trace!(dropped = start, "discarding noise ahead of reply");
                self.buffer.drain(..start);
            }
        }

        if self.buffer.len() > self.max_buffer {
            let excess = self.buffer.len() - self.max_buffer;
            self.buffer.drain(..excess);
        }

        outcomes
    }
}
