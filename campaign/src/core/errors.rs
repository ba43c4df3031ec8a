//! Failure classification shared by every phase of a campaign.
//!
//! Failures travel as `anyhow::Error`; the domain kind rides along as a
//! [`CampaignError`] somewhere in the chain and is recovered with
//! [`failure_kind`].

use std::fmt;

use serde::{Deserialize, Serialize};

/// Why an operation failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Session connect or channel setup failed outside a command scope.
    Transport,
    /// The decision oracle failed or returned an unusable structured answer.
    Decision,
    /// A single remote command raised, timed out, or exited non-zero.
    Command,
    /// A remediation command failed.
    Remediation,
    /// Invalid configuration or an approved plan that cannot run.
    Configuration,
}

impl FailureKind {
    pub fn as_str(self) -> &'static str {
        match self {
            FailureKind::Transport => "transport",
            FailureKind::Decision => "decision",
            FailureKind::Command => "command",
            FailureKind::Remediation => "remediation",
            FailureKind::Configuration => "configuration",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failure tagged with its [`FailureKind`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CampaignError {
    pub kind: FailureKind,
    pub message: String,
}

impl CampaignError {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Transport, message)
    }

    pub fn decision(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Decision, message)
    }

    pub fn command(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Command, message)
    }

    pub fn remediation(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Remediation, message)
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Configuration, message)
    }
}

impl fmt::Display for CampaignError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} error: {}", self.kind, self.message)
    }
}

impl std::error::Error for CampaignError {}

/// Find the first [`CampaignError`] in the chain and return its kind.
pub fn failure_kind(err: &anyhow::Error) -> Option<FailureKind> {
    err.chain()
        .find_map(|cause| cause.downcast_ref::<CampaignError>())
        .map(|tagged| tagged.kind)
}
