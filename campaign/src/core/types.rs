//! Shared deterministic types for campaign core logic.
//!
//! The decision types mirror the structured answers the oracle must return.
//! Required fields have no serde default: a missing field is a parse failure,
//! never a silent fallback.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Exit status recorded when the channel reports none.
pub const UNKNOWN_EXIT_STATUS: i32 = -1;

/// A participant in the campaign conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Proposer,
    Reviewer,
    Executor,
    Monitor,
    Recovery,
    Reporter,
}

impl Role {
    pub const ALL: [Role; 6] = [
        Role::Proposer,
        Role::Reviewer,
        Role::Executor,
        Role::Monitor,
        Role::Recovery,
        Role::Reporter,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Proposer => "proposer",
            Role::Reviewer => "reviewer",
            Role::Executor => "executor",
            Role::Monitor => "monitor",
            Role::Recovery => "recovery",
            Role::Reporter => "reporter",
        }
    }

    pub fn parse(raw: &str) -> Option<Role> {
        Role::ALL.into_iter().find(|role| role.as_str() == raw)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the campaign is about: the target and the client's request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Brief {
    pub target: String,
    pub description: String,
}

/// A proposed plan of remote commands.
///
/// The oracle supplies `commands` (under the `strategy` key) and an optional
/// explanation. `approved` and `feedback` are filled in by [`Strategy::reviewed`],
/// which returns a new value instead of mutating the proposal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Strategy {
    #[serde(rename = "strategy")]
    pub commands: Vec<String>,
    #[serde(default)]
    pub explanation: Option<String>,
    #[serde(default)]
    pub approved: bool,
    #[serde(default)]
    pub feedback: Option<String>,
}

impl Strategy {
    pub fn new(commands: Vec<String>) -> Self {
        Self {
            commands,
            explanation: None,
            approved: false,
            feedback: None,
        }
    }

    pub fn reviewed(&self, review: &ReviewResult) -> Strategy {
        Strategy {
            commands: self.commands.clone(),
            explanation: self.explanation.clone(),
            approved: review.approved,
            feedback: review.feedback.clone(),
        }
    }
}

/// Reviewer verdict on a proposed strategy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewResult {
    pub approved: bool,
    #[serde(default)]
    pub feedback: Option<String>,
}

/// Reviewer verdict on the output of an execution phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssessmentResult {
    pub satisfactory: bool,
    #[serde(default)]
    pub feedback: Option<String>,
}

/// Reviewer verdict on a generated report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportReview {
    #[serde(rename = "report_approval", alias = "Report Approval")]
    pub approved: bool,
    #[serde(default)]
    pub feedback: Option<String>,
}

/// Answer to "what should be typed next?". Empty means stop the queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputDecision {
    pub input: String,
}

/// How the monitor reads the state of the current command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandState {
    /// Still producing output or loading.
    Running,
    /// Finished its work and now waits for a reply.
    AwaitingInput,
    Finished,
}

/// Monitor verdict for the output accumulated so far.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorVerdict {
    pub input_needed: bool,
    #[serde(default)]
    pub command_state: Option<CommandState>,
}

impl MonitorVerdict {
    /// Only a command that stopped and waits for a reply gets input; a command
    /// that is still running is left alone even when it looks interactive.
    pub fn needs_input(&self) -> bool {
        self.input_needed && self.command_state != Some(CommandState::Running)
    }
}

/// Remediation commands proposed for a failed command, in execution order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemediationPlan {
    #[serde(default)]
    pub fix: Vec<String>,
    #[serde(default)]
    pub explanation: Option<String>,
}

/// Why a command was run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    Normal,
    InjectedInput,
    Remediation,
}

/// One executed command and everything it printed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub command: String,
    pub output: String,
    pub exit_status: i32,
    pub kind: RecordKind,
    #[serde(default)]
    pub error: Option<String>,
}

/// Why an execution phase stopped running commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStop {
    /// Every queued command was visited.
    QueueDrained,
    /// A command needed input and the oracle had none to give.
    InputDeclined,
}
