//! Proposer, reviewer and reporter: the decisions the workflow asks for.

use anyhow::{Context, Result};
use minijinja::context;
use tracing::{debug, warn};

use super::Agents;
use super::prompts::{Operation, propose_context, report_context};
use crate::core::types::{AssessmentResult, Brief, ReportReview, ReviewResult, Strategy};
use crate::io::findings::Finding;
use crate::io::oracle::DecisionOracle;
use crate::workflow::CampaignRoles;

impl<O: DecisionOracle> CampaignRoles for Agents<'_, O> {
    fn propose(&mut self, brief: &Brief, feedback: Option<&str>) -> Result<Strategy> {
        let user = self.prompts.render(
            Operation::Propose,
            propose_context(&brief.target, &brief.description, feedback),
        )?;
        let strategy: Strategy = self.decide(Operation::Propose, user)?;
        // A proposal is never pre-approved, whatever the oracle wrote.
        Ok(Strategy {
            explanation: strategy.explanation,
            ..Strategy::new(strategy.commands)
        })
    }

    fn review_strategy(&mut self, brief: &Brief, strategy: &Strategy) -> Result<ReviewResult> {
        let proposal = serde_json::to_string_pretty(strategy).context("serialize strategy")?;
        let user = self.prompts.render(
            Operation::ReviewStrategy,
            context! { description => &brief.description, strategy => proposal },
        )?;
        self.decide(Operation::ReviewStrategy, user)
    }

    fn assess_output(&mut self, brief: &Brief, output: &str) -> Result<AssessmentResult> {
        let user = self.prompts.render(
            Operation::AssessOutput,
            context! { description => &brief.description, output => output },
        )?;
        self.decide(Operation::AssessOutput, user)
    }

    fn generate_report(
        &mut self,
        brief: &Brief,
        findings: &[Finding],
        feedback: Option<&str>,
    ) -> Result<String> {
        let findings = serde_json::to_string_pretty(findings).context("serialize findings")?;
        let user = self.prompts.render(
            Operation::Report,
            report_context(&brief.target, &brief.description, &findings, feedback),
        )?;
        let report = self.ask(Operation::Report, user, false)?;
        let report = report.trim();
        if report.is_empty() {
            warn!("reporter returned an empty report");
        }
        debug!(bytes = report.len(), "report drafted");
        Ok(report.to_string())
    }

    fn review_report(&mut self, _brief: &Brief, report: &str) -> Result<ReportReview> {
        let user = self
            .prompts
            .render(Operation::ReviewReport, context! { report => report })?;
        self.decide(Operation::ReviewReport, user)
    }
}
