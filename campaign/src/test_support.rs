//! Scripted doubles for sessions, roles and the oracle.

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;

use anyhow::{Result, anyhow};

use crate::core::errors::CampaignError;
use crate::core::types::{AssessmentResult, Brief, ReportReview, ReviewResult, Strategy};
use crate::io::config::SessionConfig;
use crate::io::findings::Finding;
use crate::io::oracle::{DecisionOracle, OracleRequest};
use crate::io::session::{ExecChannel, RemoteSession, SessionProvider};
use crate::monitor::{InputOracle, MonitorView, RuntimeMonitor};
use crate::recovery::ErrorHandler;
use crate::workflow::CampaignRoles;

/// One scripted event on a channel, applied per poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    Stdout(String),
    Stderr(String),
    /// Nothing new this poll.
    Idle,
    /// The command finished with this status.
    Exit(Option<i32>),
    /// Never finish.
    Hang,
    /// The next read fails with this message.
    Fail(String),
}

/// Channel replaying a list of [`Step`]s, one per `exit_status_ready` poll.
#[derive(Debug)]
pub struct ScriptedChannel {
    steps: VecDeque<Step>,
    stdout: VecDeque<u8>,
    stderr: VecDeque<u8>,
    exit: Option<Option<i32>>,
    failure: Option<String>,
    hanging: bool,
    aborted: bool,
}

impl ScriptedChannel {
    pub fn new(steps: Vec<Step>) -> Self {
        Self {
            steps: steps.into(),
            stdout: VecDeque::new(),
            stderr: VecDeque::new(),
            exit: None,
            failure: None,
            hanging: false,
            aborted: false,
        }
    }

    pub fn aborted(&self) -> bool {
        self.aborted
    }

    fn drain(buf: &mut VecDeque<u8>, out: &mut [u8]) -> usize {
        let n = buf.len().min(out.len());
        for (slot, byte) in out.iter_mut().zip(buf.drain(..n)) {
            *slot = byte;
        }
        n
    }
}

impl ExecChannel for ScriptedChannel {
    fn read_stdout(&mut self, buf: &mut [u8]) -> Result<usize> {
        if let Some(msg) = self.failure.take() {
            return Err(anyhow!(msg));
        }
        Ok(Self::drain(&mut self.stdout, buf))
    }

    fn read_stderr(&mut self, buf: &mut [u8]) -> Result<usize> {
        Ok(Self::drain(&mut self.stderr, buf))
    }

    fn exit_status_ready(&mut self) -> Result<bool> {
        if !self.hanging
            && let Some(step) = self.steps.pop_front()
        {
            match step {
                Step::Stdout(text) => self.stdout.extend(text.into_bytes()),
                Step::Stderr(text) => self.stderr.extend(text.into_bytes()),
                Step::Idle => {}
                Step::Exit(status) => self.exit = Some(status),
                Step::Hang => self.hanging = true,
                Step::Fail(msg) => self.failure = Some(msg),
            }
        }
        Ok(self.exit.is_some())
    }

    fn exit_status(&mut self) -> Result<Option<i32>> {
        self.exit
            .ok_or_else(|| anyhow!("exit status requested before the command finished"))
    }

    fn abort(&mut self) -> Result<()> {
        self.aborted = true;
        Ok(())
    }
}

#[derive(Debug, Default)]
struct ProviderState {
    scripts: HashMap<String, Vec<Step>>,
    exec_failures: HashMap<String, String>,
    refuse_connect: Option<String>,
    executed: Vec<String>,
    connects: usize,
    closes: usize,
}

/// Session provider whose commands replay scripted output.
///
/// Unscripted commands print `ran {command}\n` and exit 0. Clones share state,
/// so a test can keep one handle while the engine consumes another.
#[derive(Debug, Clone, Default)]
pub struct ScriptedProvider {
    state: Rc<RefCell<ProviderState>>,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replay `steps` whenever `command` (as prepared) runs.
    pub fn script(self, command: &str, steps: Vec<Step>) -> Self {
        self.state
            .borrow_mut()
            .scripts
            .insert(command.to_string(), steps);
        self
    }

    /// Make `exec` itself fail for `command`.
    pub fn fail_exec(self, command: &str, message: &str) -> Self {
        self.state
            .borrow_mut()
            .exec_failures
            .insert(command.to_string(), message.to_string());
        self
    }

    pub fn refuse_connect(self, message: &str) -> Self {
        self.state.borrow_mut().refuse_connect = Some(message.to_string());
        self
    }

    /// Commands passed to `exec`, in order.
    pub fn executed(&self) -> Vec<String> {
        self.state.borrow().executed.clone()
    }

    pub fn connects(&self) -> usize {
        self.state.borrow().connects
    }

    pub fn closes(&self) -> usize {
        self.state.borrow().closes
    }
}

impl SessionProvider for ScriptedProvider {
    type Session = ScriptedSession;

    fn connect(&self, _cfg: &SessionConfig) -> Result<ScriptedSession> {
        let mut state = self.state.borrow_mut();
        if let Some(msg) = &state.refuse_connect {
            return Err(anyhow!("{msg}"));
        }
        state.connects += 1;
        Ok(ScriptedSession {
            state: Rc::clone(&self.state),
            closed: false,
        })
    }
}

#[derive(Debug)]
pub struct ScriptedSession {
    state: Rc<RefCell<ProviderState>>,
    closed: bool,
}

impl RemoteSession for ScriptedSession {
    type Channel = ScriptedChannel;

    fn exec(&mut self, command: &str) -> Result<ScriptedChannel> {
        let mut state = self.state.borrow_mut();
        state.executed.push(command.to_string());
        if let Some(msg) = state.exec_failures.get(command) {
            return Err(anyhow!("{msg}"));
        }
        let steps = state.scripts.get(command).cloned().unwrap_or_else(|| {
            vec![Step::Stdout(format!("ran {command}\n")), Step::Exit(Some(0))]
        });
        Ok(ScriptedChannel::new(steps))
    }

    fn close(&mut self) -> Result<()> {
        if !self.closed {
            self.closed = true;
            self.state.borrow_mut().closes += 1;
        }
        Ok(())
    }
}

fn exhausted(what: &str) -> anyhow::Error {
    CampaignError::decision(format!("scripted {what} exhausted")).into()
}

/// Roles answering from per-operation scripts, with call counters.
///
/// Monitor answers default to "no input needed" and remediation defaults to
/// no commands once their scripts run out.
#[derive(Debug, Default)]
pub struct ScriptedCrew {
    proposals: VecDeque<Strategy>,
    reviews: VecDeque<ReviewResult>,
    assessments: VecDeque<AssessmentResult>,
    reports: VecDeque<(String, ReportReview)>,
    monitor: VecDeque<Result<bool, String>>,
    inputs: VecDeque<String>,
    remediations: VecDeque<Result<Vec<String>, String>>,

    pub propose_calls: u32,
    pub review_calls: u32,
    pub assess_calls: u32,
    pub report_calls: u32,
    pub monitor_calls: u32,
    pub input_calls: u32,
    feedback_seen: Vec<Option<String>>,
    monitor_views: Vec<(Vec<String>, Vec<String>)>,
    recoveries: Vec<(String, String)>,
    report_feedback_seen: Vec<Option<String>>,
}

impl ScriptedCrew {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn propose<I>(mut self, commands: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        self.proposals
            .push_back(Strategy::new(commands.into_iter().map(Into::into).collect()));
        self
    }

    pub fn approve(mut self) -> Self {
        self.reviews.push_back(ReviewResult {
            approved: true,
            feedback: None,
        });
        self
    }

    pub fn reject(mut self, feedback: &str) -> Self {
        self.reviews.push_back(ReviewResult {
            approved: false,
            feedback: Some(feedback.to_string()),
        });
        self
    }

    pub fn assess(mut self, satisfactory: bool, feedback: Option<&str>) -> Self {
        self.assessments.push_back(AssessmentResult {
            satisfactory,
            feedback: feedback.map(str::to_string),
        });
        self
    }

    /// Queue a report draft and the review it will receive.
    pub fn report(mut self, draft: &str, approved: bool) -> Self {
        let feedback = (!approved).then(|| format!("revise: {draft}"));
        self.reports
            .push_back((draft.to_string(), ReportReview { approved, feedback }));
        self
    }

    pub fn monitor(mut self, input_needed: bool) -> Self {
        self.monitor.push_back(Ok(input_needed));
        self
    }

    pub fn monitor_fails(mut self, message: &str) -> Self {
        self.monitor.push_back(Err(message.to_string()));
        self
    }

    pub fn input(mut self, text: &str) -> Self {
        self.inputs.push_back(text.to_string());
        self
    }

    pub fn remediate<I>(mut self, commands: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        self.remediations
            .push_back(Ok(commands.into_iter().map(Into::into).collect()));
        self
    }

    pub fn remediation_fails(mut self, message: &str) -> Self {
        self.remediations.push_back(Err(message.to_string()));
        self
    }

    /// Feedback passed to each `propose` call, in order.
    pub fn feedback_seen(&self) -> Vec<Option<String>> {
        self.feedback_seen.clone()
    }

    pub fn report_feedback_seen(&self) -> Vec<Option<String>> {
        self.report_feedback_seen.clone()
    }

    /// `(executed, pending)` as seen by each monitor call.
    pub fn monitor_views(&self) -> Vec<(Vec<String>, Vec<String>)> {
        self.monitor_views.clone()
    }

    /// `(error, context)` for each recovery request.
    pub fn recoveries(&self) -> Vec<(String, String)> {
        self.recoveries.clone()
    }
}

impl CampaignRoles for ScriptedCrew {
    fn propose(&mut self, _brief: &Brief, feedback: Option<&str>) -> Result<Strategy> {
        self.propose_calls += 1;
        self.feedback_seen.push(feedback.map(str::to_string));
        self.proposals.pop_front().ok_or_else(|| exhausted("proposals"))
    }

    fn review_strategy(&mut self, _brief: &Brief, _strategy: &Strategy) -> Result<ReviewResult> {
        self.review_calls += 1;
        self.reviews.pop_front().ok_or_else(|| exhausted("reviews"))
    }

    fn assess_output(&mut self, _brief: &Brief, _output: &str) -> Result<AssessmentResult> {
        self.assess_calls += 1;
        self.assessments.pop_front().ok_or_else(|| exhausted("assessments"))
    }

    fn generate_report(
        &mut self,
        _brief: &Brief,
        _findings: &[Finding],
        feedback: Option<&str>,
    ) -> Result<String> {
        self.report_calls += 1;
        self.report_feedback_seen.push(feedback.map(str::to_string));
        self.reports
            .front()
            .map(|(draft, _)| draft.clone())
            .ok_or_else(|| exhausted("reports"))
    }

    fn review_report(&mut self, _brief: &Brief, _report: &str) -> Result<ReportReview> {
        self.reports
            .pop_front()
            .map(|(_, review)| review)
            .ok_or_else(|| exhausted("report reviews"))
    }
}

impl RuntimeMonitor for ScriptedCrew {
    fn needs_input(&mut self, view: &MonitorView<'_>) -> Result<bool> {
        self.monitor_calls += 1;
        self.monitor_views.push((
            view.executed.iter().map(|s| s.to_string()).collect(),
            view.pending.iter().map(|s| s.to_string()).collect(),
        ));
        match self.monitor.pop_front() {
            Some(Ok(needed)) => Ok(needed),
            Some(Err(msg)) => Err(CampaignError::decision(msg).into()),
            None => Ok(false),
        }
    }
}

impl InputOracle for ScriptedCrew {
    fn next_input(&mut self, _view: &MonitorView<'_>) -> Result<String> {
        self.input_calls += 1;
        self.inputs.pop_front().ok_or_else(|| exhausted("inputs"))
    }
}

impl ErrorHandler for ScriptedCrew {
    fn remediation(&mut self, error: &str, context: &str) -> Result<Vec<String>> {
        self.recoveries.push((error.to_string(), context.to_string()));
        match self.remediations.pop_front() {
            Some(Ok(fix)) => Ok(fix),
            Some(Err(msg)) => Err(CampaignError::decision(msg).into()),
            None => Ok(Vec::new()),
        }
    }
}

/// Oracle answering from a fixed list and capturing every request.
#[derive(Debug, Default)]
pub struct ScriptedOracle {
    responses: RefCell<VecDeque<String>>,
    requests: RefCell<Vec<OracleRequest>>,
}

impl ScriptedOracle {
    pub fn new<I>(responses: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        Self {
            responses: RefCell::new(responses.into_iter().map(Into::into).collect()),
            requests: RefCell::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<OracleRequest> {
        self.requests.borrow().clone()
    }
}

impl DecisionOracle for ScriptedOracle {
    fn complete(&self, request: &OracleRequest) -> Result<String> {
        self.requests.borrow_mut().push(request.clone());
        self.responses
            .borrow_mut()
            .pop_front()
            .ok_or_else(|| exhausted("oracle responses"))
    }
}
