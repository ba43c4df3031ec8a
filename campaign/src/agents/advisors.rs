//! Monitor, input oracle and error handler backed by the decision oracle.

use anyhow::{Context, Result};
use minijinja::context;
use tracing::{debug, info};

use super::Agents;
use super::prompts::Operation;
use crate::core::types::{InputDecision, MonitorVerdict, RemediationPlan};
use crate::io::oracle::DecisionOracle;
use crate::monitor::{InputOracle, MonitorView, RuntimeMonitor};
use crate::recovery::ErrorHandler;

impl<O: DecisionOracle> RuntimeMonitor for Agents<'_, O> {
    fn needs_input(&mut self, view: &MonitorView<'_>) -> Result<bool> {
        let user = self.prompts.render(
            Operation::Classify,
            context! {
                target => &view.brief.target,
                description => &view.brief.description,
                output => view.output,
                executed => serde_json::to_string(view.executed).context("serialize executed")?,
                pending => serde_json::to_string(view.pending).context("serialize pending")?,
            },
        )?;
        let verdict: MonitorVerdict = self.decide(Operation::Classify, user)?;
        if verdict.input_needed && !verdict.needs_input() {
            info!("command still running, not sending input");
        }
        debug!(?verdict, "monitor verdict");
        Ok(verdict.needs_input())
    }
}

impl<O: DecisionOracle> InputOracle for Agents<'_, O> {
    fn next_input(&mut self, view: &MonitorView<'_>) -> Result<String> {
        let user = self.prompts.render(
            Operation::NextInput,
            context! {
                target => &view.brief.target,
                description => &view.brief.description,
                output => view.output,
                pending => serde_json::to_string(view.pending).context("serialize pending")?,
            },
        )?;
        let decision: InputDecision = self.decide(Operation::NextInput, user)?;
        Ok(decision.input)
    }
}

impl<O: DecisionOracle> ErrorHandler for Agents<'_, O> {
    fn remediation(&mut self, error: &str, context: &str) -> Result<Vec<String>> {
        let user = self.prompts.render(
            Operation::Recover,
            context! { error => error.trim_end(), context => context },
        )?;
        let plan: RemediationPlan = self.decide(Operation::Recover, user)?;
        if let Some(explanation) = &plan.explanation {
            debug!(%explanation, "remediation rationale");
        }
        Ok(plan.fix)
    }
}
