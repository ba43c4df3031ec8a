//! Workflow phases and the pure transition table between them.

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    ProposeStrategy,
    ReviewStrategy,
    Executing,
    AssessOutput,
    Reporting,
    Done,
}

impl Phase {
    pub fn as_str(self) -> &'static str {
        match self {
            Phase::ProposeStrategy => "propose_strategy",
            Phase::ReviewStrategy => "review_strategy",
            Phase::Executing => "executing",
            Phase::AssessOutput => "assess_output",
            Phase::Reporting => "reporting",
            Phase::Done => "done",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the phase that just ran produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseSignal {
    StrategyProposed,
    StrategyReviewed { approved: bool, has_commands: bool },
    OutputCollected,
    OutputAssessed { satisfactory: bool },
    ReportReviewed { approved: bool },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionError {
    /// The reviewer approved a strategy that has nothing to run.
    EmptyApprovedStrategy,
    /// The signal does not belong to the phase.
    Unexpected { phase: Phase, signal: PhaseSignal },
}

impl fmt::Display for TransitionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransitionError::EmptyApprovedStrategy => {
                f.write_str("approved strategy contains no commands")
            }
            TransitionError::Unexpected { phase, signal } => {
                write!(f, "signal {signal:?} is not valid in phase {phase}")
            }
        }
    }
}

impl std::error::Error for TransitionError {}

/// Next phase for `phase` given `signal`.
pub fn next_phase(phase: Phase, signal: PhaseSignal) -> Result<Phase, TransitionError> {
    use PhaseSignal::{
        OutputAssessed, OutputCollected, ReportReviewed, StrategyProposed, StrategyReviewed,
    };

    match (phase, signal) {
        (Phase::ProposeStrategy, StrategyProposed) => Ok(Phase::ReviewStrategy),
        (
            Phase::ReviewStrategy,
            StrategyReviewed {
                approved: true,
                has_commands: true,
            },
        ) => Ok(Phase::Executing),
        (
            Phase::ReviewStrategy,
            StrategyReviewed {
                approved: true,
                has_commands: false,
            },
        ) => Err(TransitionError::EmptyApprovedStrategy),
        (Phase::ReviewStrategy, StrategyReviewed { approved: false, .. }) => {
            Ok(Phase::ProposeStrategy)
        }
        (Phase::Executing, OutputCollected) => Ok(Phase::AssessOutput),
        (Phase::AssessOutput, OutputAssessed { satisfactory: true }) => Ok(Phase::Reporting),
        (Phase::AssessOutput, OutputAssessed { satisfactory: false }) => {
            Ok(Phase::ProposeStrategy)
        }
        (Phase::Reporting, ReportReviewed { approved: true }) => Ok(Phase::Done),
        (Phase::Reporting, ReportReviewed { approved: false }) => Ok(Phase::Reporting),
        (phase, signal) => Err(TransitionError::Unexpected { phase, signal }),
    }
}
