//! Run-scoped findings log (`run{N}/findings.json`).
//!
//! An append-only, ordered list of heterogeneous workflow events. The whole
//! file is rewritten atomically on every append so it is always complete.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::types::{
    AssessmentResult, ExecutionRecord, ExecutionStop, ReportReview, ReviewResult, Strategy,
};
use crate::io::atomic::write_json_atomic;

/// What prompted a proposal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProposalOrigin {
    Initial,
    AfterReview,
    AfterAssessment,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Finding {
    StrategyProposed {
        round: u32,
        origin: ProposalOrigin,
        strategy: Strategy,
    },
    StrategyReviewed {
        round: u32,
        review: ReviewResult,
        strategy: Strategy,
    },
    CommandsExecuted {
        commands: Vec<String>,
        output: String,
        records: Vec<ExecutionRecord>,
        stop: ExecutionStop,
    },
    OutputAssessed {
        assessment: AssessmentResult,
    },
    ReportReviewed {
        round: u32,
        report: String,
        review: ReportReview,
    },
}

impl Finding {
    pub fn event_name(&self) -> &'static str {
        match self {
            Finding::StrategyProposed { .. } => "strategy_proposed",
            Finding::StrategyReviewed { .. } => "strategy_reviewed",
            Finding::CommandsExecuted { .. } => "commands_executed",
            Finding::OutputAssessed { .. } => "output_assessed",
            Finding::ReportReviewed { .. } => "report_reviewed",
        }
    }
}

#[derive(Debug)]
pub struct FindingsLog {
    path: PathBuf,
    findings: Vec<Finding>,
}

impl FindingsLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            findings: Vec::new(),
        }
    }

    pub fn append(&mut self, finding: Finding) -> Result<()> {
        debug!(event = finding.event_name(), index = self.findings.len(), "finding recorded");
        self.findings.push(finding);
        write_json_atomic(&self.path, &self.findings)
            .with_context(|| format!("persist findings {}", self.path.display()))
    }

    pub fn findings(&self) -> &[Finding] {
        &self.findings
    }
}

pub fn load_findings(path: &Path) -> Result<Vec<Finding>> {
    let contents =
        fs::read_to_string(path).with_context(|| format!("read findings {}", path.display()))?;
    let findings = serde_json::from_str(&contents)
        .with_context(|| format!("parse findings {}", path.display()))?;
    Ok(findings)
}
