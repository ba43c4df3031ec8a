//! Ordered command queue consumed by the execution engine.
//!
//! The queue is split by a cursor into an executed prefix and a pending
//! suffix. The cursor only moves forward. An injected command takes the slot
//! right after the command that triggered it: it replaces the next pending
//! command (the oracle picks its answer from the pending list) or is appended
//! when nothing is pending.

use serde::{Deserialize, Serialize};

/// Where a queue entry came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "origin", rename_all = "snake_case")]
pub enum EntryOrigin {
    Planned,
    Injected { replaced: Option<String> },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueEntry {
    pub command: String,
    pub origin: EntryOrigin,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CommandQueue {
    entries: Vec<QueueEntry>,
    cursor: usize,
}

impl CommandQueue {
    pub fn new<S: AsRef<str>>(commands: &[S]) -> Self {
        Self {
            entries: commands
                .iter()
                .map(|command| QueueEntry {
                    command: command.as_ref().to_string(),
                    origin: EntryOrigin::Planned,
                })
                .collect(),
            cursor: 0,
        }
    }

    /// Index of the entry currently being executed.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn current(&self) -> Option<&QueueEntry> {
        self.entries.get(self.cursor)
    }

    /// Consume the current entry.
    pub fn advance(&mut self) {
        if self.cursor < self.entries.len() {
            self.cursor += 1;
        }
    }

    /// Commands up to and including the current one.
    pub fn executed(&self) -> Vec<&str> {
        let end = (self.cursor + 1).min(self.entries.len());
        self.entries[..end]
            .iter()
            .map(|entry| entry.command.as_str())
            .collect()
    }

    /// Commands after the current one.
    pub fn pending(&self) -> Vec<&str> {
        let start = (self.cursor + 1).min(self.entries.len());
        self.entries[start..]
            .iter()
            .map(|entry| entry.command.as_str())
            .collect()
    }

    /// Commands already consumed, once the queue has stopped moving.
    pub fn consumed(&self) -> Vec<&str> {
        self.entries[..self.cursor]
            .iter()
            .map(|entry| entry.command.as_str())
            .collect()
    }

    /// Commands never reached, once the queue has stopped moving.
    pub fn remaining(&self) -> Vec<&str> {
        self.entries[self.cursor..]
            .iter()
            .map(|entry| entry.command.as_str())
            .collect()
    }

    pub fn entries(&self) -> &[QueueEntry] {
        &self.entries
    }

    /// Place `command` right after the current entry and return its index.
    ///
    /// Returns `None` when there is no current entry or when the current entry
    /// was itself injected: an injected command never triggers another one.
    pub fn inject_after_current(&mut self, command: String) -> Option<usize> {
        let current = self.entries.get(self.cursor)?;
        if matches!(current.origin, EntryOrigin::Injected { .. }) {
            return None;
        }
        let slot = self.cursor + 1;
        match self.entries.get_mut(slot) {
            Some(next) => {
                let replaced = std::mem::replace(&mut next.command, command);
                next.origin = EntryOrigin::Injected {
                    replaced: Some(replaced),
                };
            }
            None => self.entries.push(QueueEntry {
                command,
                origin: EntryOrigin::Injected { replaced: None },
            }),
        }
        Some(slot)
    }
}
