//! Per-role audit files and the merged run timeline.
//!
//! Each role owns `run{N}/{role}.json`: an object keyed `"Request {k}"` in
//! request order, each value holding the global sequence number, the
//! messages exactly as sent to the oracle and the raw response.

use std::collections::BTreeMap;
use std::fs;
use std::sync::LazyLock;

use anyhow::{Context, Result};
use regex::Regex;
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use tracing::debug;

use crate::core::conversation::Turn;
use crate::core::types::Role;
use crate::io::atomic::write_json_atomic;
use crate::io::run_context::RunPaths;

static REQUEST_KEY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^Request (\d+)$").expect("valid request key regex")
});

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub order: u64,
    pub context: Vec<Turn>,
    pub response: String,
}

/// Serializes entries as `{"Request 1": .., "Request 2": ..}` in order.
struct Requests<'a>(&'a [AuditEntry]);

impl Serialize for Requests<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (idx, entry) in self.0.iter().enumerate() {
            map.serialize_entry(&format!("Request {}", idx + 1), entry)?;
        }
        map.end()
    }
}

/// Writer for one run's audit files.
#[derive(Debug)]
pub struct AuditLog {
    paths: RunPaths,
    entries: BTreeMap<Role, Vec<AuditEntry>>,
}

impl AuditLog {
    pub fn new(paths: RunPaths) -> Self {
        Self {
            paths,
            entries: BTreeMap::new(),
        }
    }

    /// Append one exchange for `role` and rewrite its file. Returns the
    /// role-local request number.
    pub fn record(
        &mut self,
        role: Role,
        order: u64,
        context: Vec<Turn>,
        response: &str,
    ) -> Result<usize> {
        let entries = self.entries.entry(role).or_default();
        entries.push(AuditEntry {
            order,
            context,
            response: response.to_string(),
        });
        let path = self.paths.audit_path(role);
        write_json_atomic(&path, &Requests(entries))
            .with_context(|| format!("write audit for {role}"))?;
        debug!(%role, order, request = entries.len(), "audit entry written");
        Ok(entries.len())
    }
}

/// Entries of one audit file, in request order.
pub fn load_role_audit(paths: &RunPaths, role: Role) -> Result<Vec<(usize, AuditEntry)>> {
    let path = paths.audit_path(role);
    let contents =
        fs::read_to_string(&path).with_context(|| format!("read audit {}", path.display()))?;
    let raw: BTreeMap<String, AuditEntry> = serde_json::from_str(&contents)
        .with_context(|| format!("parse audit {}", path.display()))?;

    let mut entries = Vec::with_capacity(raw.len());
    for (key, entry) in raw {
        let request = REQUEST_KEY
            .captures(&key)
            .and_then(|caps| caps[1].parse::<usize>().ok())
            .with_context(|| format!("unexpected key `{key}` in {}", path.display()))?;
        entries.push((request, entry));
    }
    entries.sort_by_key(|(request, _)| *request);
    Ok(entries)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimelineEntry {
    pub order: u64,
    pub role: Role,
    pub request: usize,
    pub response: String,
}

/// Merge every role's audit file into one list ordered by sequence number.
pub fn load_timeline(paths: &RunPaths) -> Result<Vec<TimelineEntry>> {
    let mut timeline = Vec::new();
    for role in Role::ALL {
        if !paths.audit_path(role).exists() {
            continue;
        }
        for (request, entry) in load_role_audit(paths, role)? {
            timeline.push(TimelineEntry {
                order: entry.order,
                role,
                request,
                response: entry.response,
            });
        }
    }
    timeline.sort_by_key(|entry| entry.order);
    Ok(timeline)
}
