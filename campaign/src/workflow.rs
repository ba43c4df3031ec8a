//! Workflow controller: propose → review → execute → assess → report.
//!
//! The loop only performs side effects; which phase comes next is decided by
//! [`next_phase`]. Revision loops are bounded by [`WorkflowLimits`] and end in
//! an explicit [`CampaignStop::Escalated`] instead of running forever.

use anyhow::{Context, Result, anyhow};
use tracing::{error, info, instrument, warn};

use crate::core::errors::CampaignError;
use crate::core::phase::{Phase, PhaseSignal, TransitionError, next_phase};
use crate::core::types::{AssessmentResult, Brief, ReportReview, ReviewResult, Strategy};
use crate::engine::{Advisors, EngineSettings, execute};
use crate::io::atomic::write_atomic;
use crate::io::config::{CampaignConfig, SessionConfig};
use crate::io::findings::{Finding, FindingsLog, ProposalOrigin};
use crate::io::run_context::{RunContext, RunStatus};
use crate::io::session::SessionProvider;

/// The oracle-backed decisions the controller needs.
pub trait CampaignRoles {
    fn propose(&mut self, brief: &Brief, feedback: Option<&str>) -> Result<Strategy>;
    fn review_strategy(&mut self, brief: &Brief, strategy: &Strategy) -> Result<ReviewResult>;
    fn assess_output(&mut self, brief: &Brief, output: &str) -> Result<AssessmentResult>;
    fn generate_report(
        &mut self,
        brief: &Brief,
        findings: &[Finding],
        feedback: Option<&str>,
    ) -> Result<String>;
    fn review_report(&mut self, brief: &Brief, report: &str) -> Result<ReportReview>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkflowLimits {
    /// Total proposals allowed in one run, across both revision loops.
    pub max_proposals: u32,
    pub max_report_rounds: u32,
}

impl Default for WorkflowLimits {
    fn default() -> Self {
        Self {
            max_proposals: 10,
            max_report_rounds: 5,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CampaignSettings {
    pub brief: Brief,
    pub session: SessionConfig,
    pub engine: EngineSettings,
    pub limits: WorkflowLimits,
}

impl CampaignSettings {
    pub fn from_config(cfg: &CampaignConfig) -> Self {
        Self {
            brief: cfg.brief(),
            session: cfg.session.clone(),
            engine: EngineSettings::from(&cfg.engine),
            limits: WorkflowLimits {
                max_proposals: cfg.workflow.max_proposals,
                max_report_rounds: cfg.workflow.max_report_rounds,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CampaignStop {
    /// A report was approved.
    Done,
    /// A revision loop hit its cap in `phase` after `rounds` attempts.
    Escalated { phase: Phase, rounds: u32 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CampaignOutcome {
    pub run_number: u32,
    pub stop: CampaignStop,
    pub proposals: u32,
    pub strategy_reviews: u32,
    pub executions: u32,
    pub report_rounds: u32,
    /// The approved report, when the run finished.
    pub report: Option<String>,
}

#[derive(Debug, Default)]
struct Counters {
    proposals: u32,
    strategy_reviews: u32,
    executions: u32,
    report_rounds: u32,
}

impl Counters {
    fn outcome(&self, run: &RunContext, stop: CampaignStop, report: Option<String>) -> CampaignOutcome {
        CampaignOutcome {
            run_number: run.run_number(),
            stop,
            proposals: self.proposals,
            strategy_reviews: self.strategy_reviews,
            executions: self.executions,
            report_rounds: self.report_rounds,
            report,
        }
    }
}

/// Drive one campaign to `Done` or escalation and archive the run.
///
/// Fatal errors (session connect, oracle decisions, configuration) archive
/// the run as `failed` and propagate.
#[instrument(skip_all, fields(run = run.run_number(), target = %settings.brief.target))]
pub fn run_campaign<R, P>(
    run: &RunContext,
    roles: &mut R,
    provider: &P,
    settings: &CampaignSettings,
    findings: &mut FindingsLog,
) -> Result<CampaignOutcome>
where
    R: CampaignRoles + Advisors,
    P: SessionProvider,
{
    match drive(run, roles, provider, settings, findings) {
        Ok(outcome) => {
            let status = match outcome.stop {
                CampaignStop::Done => RunStatus::Done,
                CampaignStop::Escalated { .. } => RunStatus::Escalated,
            };
            run.finish(status)?;
            Ok(outcome)
        }
        Err(err) => {
            error!(err = %format!("{err:#}"), "campaign failed");
            if let Err(archive_err) = run.finish(RunStatus::Failed) {
                warn!(err = %format!("{archive_err:#}"), "failed to archive failed run");
            }
            Err(err)
        }
    }
}

fn drive<R, P>(
    run: &RunContext,
    roles: &mut R,
    provider: &P,
    settings: &CampaignSettings,
    findings: &mut FindingsLog,
) -> Result<CampaignOutcome>
where
    R: CampaignRoles + Advisors,
    P: SessionProvider,
{
    let brief = &settings.brief;
    let limits = settings.limits;
    let mut counters = Counters::default();

    let mut phase = Phase::ProposeStrategy;
    let mut strategy: Option<Strategy> = None;
    let mut feedback: Option<String> = None;
    let mut origin = ProposalOrigin::Initial;
    let mut output = String::new();
    let mut report_feedback: Option<String> = None;
    let mut approved_report: Option<String> = None;

    while phase != Phase::Done {
        info!(%phase, "entering phase");
        let signal = match phase {
            Phase::ProposeStrategy => {
                if counters.proposals >= limits.max_proposals {
                    warn!(proposals = counters.proposals, "proposal cap reached, escalating");
                    let stop = CampaignStop::Escalated {
                        phase,
                        rounds: counters.proposals,
                    };
                    return Ok(counters.outcome(run, stop, None));
                }
                let proposal = roles.propose(brief, feedback.as_deref())?;
                counters.proposals += 1;
                info!(round = counters.proposals, commands = proposal.commands.len(), "strategy proposed");
                findings.append(Finding::StrategyProposed {
                    round: counters.proposals,
                    origin,
                    strategy: proposal.clone(),
                })?;
                strategy = Some(proposal);
                PhaseSignal::StrategyProposed
            }
            Phase::ReviewStrategy => {
                let current = strategy
                    .as_ref()
                    .ok_or_else(|| anyhow!("no strategy to review"))?;
                let review = roles.review_strategy(brief, current)?;
                counters.strategy_reviews += 1;
                let reviewed = current.reviewed(&review);
                info!(approved = review.approved, "strategy reviewed");
                findings.append(Finding::StrategyReviewed {
                    round: counters.proposals,
                    review: review.clone(),
                    strategy: reviewed.clone(),
                })?;
                if !review.approved {
                    feedback = review.feedback;
                    origin = ProposalOrigin::AfterReview;
                }
                let signal = PhaseSignal::StrategyReviewed {
                    approved: reviewed.approved,
                    has_commands: !reviewed.commands.is_empty(),
                };
                strategy = Some(reviewed);
                signal
            }
            Phase::Executing => {
                let commands = strategy
                    .as_ref()
                    .map(|s| s.commands.clone())
                    .ok_or_else(|| anyhow!("no approved strategy to execute"))?;
                let outcome = execute(
                    &commands,
                    provider,
                    &settings.session,
                    brief,
                    &mut *roles,
                    &settings.engine,
                )?;
                counters.executions += 1;
                findings.append(Finding::CommandsExecuted {
                    commands,
                    output: outcome.output.clone(),
                    records: outcome.records,
                    stop: outcome.stop,
                })?;
                output = outcome.output;
                PhaseSignal::OutputCollected
            }
            Phase::AssessOutput => {
                let assessment = roles.assess_output(brief, &output)?;
                info!(satisfactory = assessment.satisfactory, "output assessed");
                findings.append(Finding::OutputAssessed {
                    assessment: assessment.clone(),
                })?;
                if !assessment.satisfactory {
                    feedback = assessment.feedback;
                    origin = ProposalOrigin::AfterAssessment;
                }
                PhaseSignal::OutputAssessed {
                    satisfactory: assessment.satisfactory,
                }
            }
            Phase::Reporting => {
                if counters.report_rounds >= limits.max_report_rounds {
                    warn!(rounds = counters.report_rounds, "report cap reached, escalating");
                    let stop = CampaignStop::Escalated {
                        phase,
                        rounds: counters.report_rounds,
                    };
                    return Ok(counters.outcome(run, stop, None));
                }
                let draft =
                    roles.generate_report(brief, findings.findings(), report_feedback.as_deref())?;
                counters.report_rounds += 1;
                let review = roles.review_report(brief, &draft)?;
                info!(round = counters.report_rounds, approved = review.approved, "report reviewed");
                findings.append(Finding::ReportReviewed {
                    round: counters.report_rounds,
                    report: draft.clone(),
                    review: review.clone(),
                })?;
                if review.approved {
                    approved_report = Some(draft);
                } else {
                    report_feedback = review.feedback;
                }
                PhaseSignal::ReportReviewed {
                    approved: review.approved,
                }
            }
            Phase::Done => break,
        };
        phase = next_phase(phase, signal).map_err(transition_error)?;
    }

    let report = approved_report.ok_or_else(|| anyhow!("finished without an approved report"))?;
    let report_path = &run.paths().report_path;
    write_atomic(report_path, &report)
        .with_context(|| format!("write report {}", report_path.display()))?;
    info!(path = %report_path.display(), "report written");
    Ok(counters.outcome(run, CampaignStop::Done, Some(report)))
}

fn transition_error(err: TransitionError) -> anyhow::Error {
    match err {
        TransitionError::EmptyApprovedStrategy => CampaignError::configuration(err.to_string()).into(),
        TransitionError::Unexpected { .. } => anyhow::Error::new(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::errors::{FailureKind, failure_kind};
    use crate::test_support::{ScriptedCrew, ScriptedProvider};

    fn settings(limits: WorkflowLimits) -> CampaignSettings {
        CampaignSettings {
            brief: Brief {
                target: "10.0.0.1".to_string(),
                description: "check for vulnerabilities".to_string(),
            },
            session: SessionConfig::default(),
            engine: EngineSettings::default(),
            limits,
        }
    }

    #[test]
    fn approved_empty_strategy_is_fatal_configuration_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        let run = RunContext::begin(temp.path(), "10.0.0.1").expect("run");
        let mut findings = FindingsLog::new(&run.paths().findings_path);
        let mut crew = ScriptedCrew::new().propose(Vec::<String>::new()).approve();
        let provider = ScriptedProvider::new();

        let err = run_campaign(
            &run,
            &mut crew,
            &provider,
            &settings(WorkflowLimits::default()),
            &mut findings,
        )
        .unwrap_err();

        assert_eq!(failure_kind(&err), Some(FailureKind::Configuration));
        assert!(provider.executed().is_empty());
        let meta = crate::io::run_context::load_run_meta(&run.paths().meta_path).expect("meta");
        assert_eq!(meta.status, RunStatus::Failed);
    }

    #[test]
    fn proposal_cap_escalates() {
        let temp = tempfile::tempdir().expect("tempdir");
        let run = RunContext::begin(temp.path(), "10.0.0.1").expect("run");
        let mut findings = FindingsLog::new(&run.paths().findings_path);
        let mut crew = ScriptedCrew::new()
            .propose(["nmap 10.0.0.1"])
            .reject("too shallow")
            .propose(["nmap -A 10.0.0.1"])
            .reject("still shallow");
        let provider = ScriptedProvider::new();

        let outcome = run_campaign(
            &run,
            &mut crew,
            &provider,
            &settings(WorkflowLimits {
                max_proposals: 2,
                max_report_rounds: 5,
            }),
            &mut findings,
        )
        .expect("campaign");

        assert_eq!(
            outcome.stop,
            CampaignStop::Escalated {
                phase: Phase::ProposeStrategy,
                rounds: 2
            }
        );
        assert_eq!(outcome.strategy_reviews, 2);
        assert_eq!(crew.feedback_seen(), vec![None, Some("too shallow".to_string())]);
    }

    #[test]
    fn report_cap_escalates_without_writing_report() {
        let temp = tempfile::tempdir().expect("tempdir");
        let run = RunContext::begin(temp.path(), "10.0.0.1").expect("run");
        let mut findings = FindingsLog::new(&run.paths().findings_path);
        let mut crew = ScriptedCrew::new()
            .propose(["nmap 10.0.0.1"])
            .approve()
            .assess(true, None)
            .report("draft 1", false)
            .report("draft 2", false);
        let provider = ScriptedProvider::new();

        let outcome = run_campaign(
            &run,
            &mut crew,
            &provider,
            &settings(WorkflowLimits {
                max_proposals: 10,
                max_report_rounds: 2,
            }),
            &mut findings,
        )
        .expect("campaign");

        assert_eq!(
            outcome.stop,
            CampaignStop::Escalated {
                phase: Phase::Reporting,
                rounds: 2
            }
        );
        assert!(!run.paths().report_path.exists());
    }
}
