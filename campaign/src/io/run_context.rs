//! Run numbering, run directories and the per-run sequence counter.

use std::cell::Cell;
use std::fmt;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::core::types::Role;
use crate::io::atomic::write_json_atomic;

/// Canonical paths inside one `run{N}` directory.
#[derive(Debug, Clone)]
pub struct RunPaths {
    pub dir: PathBuf,
    pub meta_path: PathBuf,
    pub findings_path: PathBuf,
    pub report_path: PathBuf,
}

impl RunPaths {
    pub fn new(log_dir: &Path, run_number: u32) -> Self {
        let dir = log_dir.join(format!("run{run_number}"));
        Self {
            meta_path: dir.join("run.json"),
            findings_path: dir.join("findings.json"),
            report_path: dir.join("report.md"),
            dir,
        }
    }

    /// Audit file for one role.
    pub fn audit_path(&self, role: Role) -> PathBuf {
        self.dir.join(format!("{role}.json"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Done,
    Escalated,
    Failed,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            RunStatus::Running => "running",
            RunStatus::Done => "done",
            RunStatus::Escalated => "escalated",
            RunStatus::Failed => "failed",
        };
        f.write_str(label)
    }
}

/// Persisted run metadata (`run{N}/run.json`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunMeta {
    pub run_number: u32,
    pub status: RunStatus,
    pub target: String,
    pub started_at: String,
    pub ended_at: Option<String>,
}

/// State shared by every role within one run.
///
/// Constructed once per campaign; the sequence counter orders every persisted
/// oracle exchange across roles.
#[derive(Debug)]
pub struct RunContext {
    run_number: u32,
    target: String,
    started_at: String,
    paths: RunPaths,
    sequence: Cell<u64>,
}

impl RunContext {
    /// Claim the next free run number under `log_dir` and mark it running.
    pub fn begin(log_dir: &Path, target: &str) -> Result<Self> {
        fs::create_dir_all(log_dir)
            .with_context(|| format!("create log dir {}", log_dir.display()))?;

        let mut run_number = next_run_number(log_dir)?;
        let paths = loop {
            let paths = RunPaths::new(log_dir, run_number);
            match fs::create_dir(&paths.dir) {
                Ok(()) => break paths,
                // Another process claimed this number first.
                Err(err) if err.kind() == ErrorKind::AlreadyExists => run_number += 1,
                Err(err) => {
                    return Err(err)
                        .with_context(|| format!("create run dir {}", paths.dir.display()));
                }
            }
        };

        let ctx = Self {
            run_number,
            target: target.to_string(),
            started_at: now_rfc3339(),
            paths,
            sequence: Cell::new(0),
        };
        ctx.write_meta(RunStatus::Running, None)?;
        info!(run = run_number, dir = %ctx.paths.dir.display(), "run started");
        Ok(ctx)
    }

    pub fn run_number(&self) -> u32 {
        self.run_number
    }

    pub fn paths(&self) -> &RunPaths {
        &self.paths
    }

    /// Next global sequence number (1-based).
    pub fn next_sequence(&self) -> u64 {
        let next = self.sequence.get() + 1;
        self.sequence.set(next);
        next
    }

    /// Archive the run with its terminal status.
    pub fn finish(&self, status: RunStatus) -> Result<()> {
        self.write_meta(status, Some(now_rfc3339()))?;
        info!(run = self.run_number, %status, "run archived");
        Ok(())
    }

    fn write_meta(&self, status: RunStatus, ended_at: Option<String>) -> Result<()> {
        let meta = RunMeta {
            run_number: self.run_number,
            status,
            target: self.target.clone(),
            started_at: self.started_at.clone(),
            ended_at,
        };
        write_json_atomic(&self.paths.meta_path, &meta)
    }
}

fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}

fn parse_run_dir(name: &str) -> Option<u32> {
    name.strip_prefix("run")?.parse().ok()
}

fn run_numbers(log_dir: &Path) -> Result<Vec<u32>> {
    let entries = match fs::read_dir(log_dir) {
        Ok(entries) => entries,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => {
            return Err(err).with_context(|| format!("read log dir {}", log_dir.display()));
        }
    };
    let mut numbers = Vec::new();
    for entry in entries {
        let entry = entry.with_context(|| format!("read entry in {}", log_dir.display()))?;
        if !entry.path().is_dir() {
            continue;
        }
        if let Some(n) = entry.file_name().to_str().and_then(parse_run_dir) {
            numbers.push(n);
        }
    }
    Ok(numbers)
}

/// One past the highest existing `run{N}` directory; 1 when none exist.
pub fn next_run_number(log_dir: &Path) -> Result<u32> {
    let highest = run_numbers(log_dir)?.into_iter().max().unwrap_or(0);
    Ok(highest + 1)
}

pub fn load_run_meta(path: &Path) -> Result<RunMeta> {
    let contents =
        fs::read_to_string(path).with_context(|| format!("read run meta {}", path.display()))?;
    let meta = serde_json::from_str(&contents)
        .with_context(|| format!("parse run meta {}", path.display()))?;
    Ok(meta)
}

/// A run directory and whatever metadata it carries.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub run_number: u32,
    pub meta: Option<RunMeta>,
}

/// Every run under `log_dir`, newest first.
pub fn list_runs(log_dir: &Path) -> Result<Vec<RunSummary>> {
    let mut numbers = run_numbers(log_dir)?;
    numbers.sort_unstable_by(|a, b| b.cmp(a));
    let mut runs = Vec::with_capacity(numbers.len());
    for run_number in numbers {
        let paths = RunPaths::new(log_dir, run_number);
        let meta = if paths.meta_path.exists() {
            Some(load_run_meta(&paths.meta_path)?)
        } else {
            debug!(run = run_number, "run has no meta file");
            None
        };
        runs.push(RunSummary { run_number, meta });
    }
    Ok(runs)
}

/// Resolve an existing run directory.
pub fn existing_run(log_dir: &Path, run_number: u32) -> Result<RunPaths> {
    let paths = RunPaths::new(log_dir, run_number);
    if !paths.dir.is_dir() {
        return Err(anyhow!("run{run_number} not found under {}", log_dir.display()));
    }
    Ok(paths)
}
