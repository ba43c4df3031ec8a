//! End-to-end campaign scenarios over scripted sessions and roles.
//!
//! These tests drive `execute` and `run_campaign` against
//! [`ScriptedProvider`] and [`ScriptedCrew`] to verify queue order, error
//! recovery, input injection, revision loops and run artifacts.

use std::fs;
use std::time::Duration;

use campaign::core::errors::{FailureKind, failure_kind};
use campaign::core::types::{Brief, ExecutionStop, RecordKind};
use campaign::engine::{EngineSettings, execute};
use campaign::io::audit::load_timeline;
use campaign::io::config::SessionConfig;
use campaign::io::findings::{Finding, FindingsLog, ProposalOrigin, load_findings};
use campaign::io::run_context::{RunContext, RunStatus, load_run_meta};
use campaign::test_support::{ScriptedCrew, ScriptedProvider, Step};
use campaign::workflow::{CampaignSettings, CampaignStop, WorkflowLimits, run_campaign};

fn brief() -> Brief {
    Brief {
        target: "10.0.0.1".to_string(),
        description: "check for vulnerabilities on the target machine".to_string(),
    }
}

fn engine_settings() -> EngineSettings {
    EngineSettings {
        poll_interval: Duration::from_millis(1),
        read_chunk_bytes: 64,
        command_timeout: Some(Duration::from_secs(5)),
        recover_on_nonzero_exit: true,
    }
}

fn settings() -> CampaignSettings {
    CampaignSettings {
        brief: brief(),
        session: SessionConfig::default(),
        engine: engine_settings(),
        limits: WorkflowLimits::default(),
    }
}

fn commands(list: &[&str]) -> Vec<String> {
    list.iter().map(|c| c.to_string()).collect()
}

#[test]
fn single_command_runs_once_and_drains_queue() {
    let provider = ScriptedProvider::new();
    let mut crew = ScriptedCrew::new();

    let outcome = execute(
        &commands(&["scan 10.0.0.1"]),
        &provider,
        &SessionConfig::default(),
        &brief(),
        &mut crew,
        &engine_settings(),
    )
    .expect("execute");

    assert_eq!(outcome.executed, vec!["scan 10.0.0.1"]);
    assert!(outcome.pending.is_empty());
    assert_eq!(outcome.output, "ran scan 10.0.0.1\n");
    assert_eq!(outcome.stop, ExecutionStop::QueueDrained);
    assert_eq!(provider.connects(), 1);
    assert_eq!(provider.closes(), 1);
    assert_eq!(crew.monitor_calls, 1);
}

/// Second command dies mid-stream: its partial output, the remediation output
/// and the error text land in the transcript in that order, then the third
/// command still runs.
#[test]
fn mid_stream_failure_is_recovered_and_queue_continues() {
    let provider = ScriptedProvider::new().script(
        "nikto -h 10.0.0.1",
        vec![
            Step::Stdout("- Nikto v2\n".to_string()),
            Step::Fail("connection reset".to_string()),
        ],
    );
    let mut crew = ScriptedCrew::new().remediate(["apt-get install -y nikto"]);

    let outcome = execute(
        &commands(&["nmap 10.0.0.1", "nikto -h 10.0.0.1", "whoami"]),
        &provider,
        &SessionConfig::default(),
        &brief(),
        &mut crew,
        &engine_settings(),
    )
    .expect("execute");

    assert_eq!(
        outcome.output,
        "ran nmap 10.0.0.1\n\
         - Nikto v2\n\
         ran apt-get install -y nikto\n\
         Error executing command: nikto -h 10.0.0.1\n\
         Error message: connection reset\n\n\
         ran whoami\n"
    );
    assert_eq!(
        provider.executed(),
        vec![
            "nmap 10.0.0.1",
            "nikto -h 10.0.0.1",
            "apt-get install -y nikto",
            "whoami"
        ]
    );
    assert_eq!(outcome.executed, vec!["nmap 10.0.0.1", "nikto -h 10.0.0.1", "whoami"]);

    let kinds: Vec<RecordKind> = outcome.records.iter().map(|r| r.kind).collect();
    assert_eq!(
        kinds,
        vec![
            RecordKind::Normal,
            RecordKind::Normal,
            RecordKind::Remediation,
            RecordKind::Normal
        ]
    );
    assert_eq!(outcome.records[1].exit_status, -1);
    assert_eq!(outcome.records[1].error.as_deref(), Some("connection reset"));

    let recoveries = crew.recoveries();
    assert_eq!(recoveries.len(), 1);
    assert!(recoveries[0].0.starts_with("Error executing command: nikto -h 10.0.0.1"));
    assert!(recoveries[0].1.ends_with("ran nmap 10.0.0.1\n- Nikto v2\n"));
    assert_eq!(provider.closes(), 1);
}

#[test]
fn nonzero_exit_goes_through_recovery() {
    let provider = ScriptedProvider::new().script(
        "hydra -l root ssh://10.0.0.1",
        vec![
            Step::Stderr("hydra: command not found\n".to_string()),
            Step::Exit(Some(127)),
        ],
    );
    let mut crew = ScriptedCrew::new().remediation_fails("oracle unavailable");

    let outcome = execute(
        &commands(&["hydra -l root ssh://10.0.0.1"]),
        &provider,
        &SessionConfig::default(),
        &brief(),
        &mut crew,
        &engine_settings(),
    )
    .expect("execute");

    assert_eq!(
        outcome.output,
        "hydra: command not found\n\
         Error handler failed: decision error: oracle unavailable\n\
         Error executing command: hydra -l root ssh://10.0.0.1\n\
         Error message: command error: exited with status 127\n\n"
    );
    assert_eq!(outcome.records[0].exit_status, 127);
    // A failed command is never shown to the monitor.
    assert_eq!(crew.monitor_calls, 0);
}

#[test]
fn empty_input_stops_remaining_queue() {
    let provider = ScriptedProvider::new();
    let mut crew = ScriptedCrew::new().monitor(true).input("   ");

    let outcome = execute(
        &commands(&["msfconsole -q", "use auxiliary/scanner/ssh/ssh_version", "run"]),
        &provider,
        &SessionConfig::default(),
        &brief(),
        &mut crew,
        &engine_settings(),
    )
    .expect("execute");

    assert_eq!(outcome.stop, ExecutionStop::InputDeclined);
    assert_eq!(outcome.executed, vec!["msfconsole -q"]);
    assert_eq!(
        outcome.pending,
        vec!["use auxiliary/scanner/ssh/ssh_version", "run"]
    );
    assert_eq!(provider.executed(), vec!["msfconsole -q"]);
    assert_eq!(provider.closes(), 1);
}

#[test]
fn injected_input_runs_once_without_monitoring() {
    let provider = ScriptedProvider::new();
    let mut crew = ScriptedCrew::new()
        .monitor(true)
        .input("use auxiliary/scanner/ssh/ssh_version");

    let outcome = execute(
        &commands(&["msfconsole -q", "use exploit/multi/handler", "run"]),
        &provider,
        &SessionConfig::default(),
        &brief(),
        &mut crew,
        &engine_settings(),
    )
    .expect("execute");

    assert_eq!(
        provider.executed(),
        vec!["msfconsole -q", "use auxiliary/scanner/ssh/ssh_version", "run"]
    );
    assert_eq!(outcome.records[1].kind, RecordKind::InjectedInput);
    assert_eq!(crew.input_calls, 1);
    assert_eq!(crew.monitor_calls, 2);

    let views = crew.monitor_views();
    assert_eq!(views[0].0, vec!["msfconsole -q"]);
    assert_eq!(views[0].1, vec!["use exploit/multi/handler", "run"]);
}

#[test]
fn refused_connect_is_transport_failure() {
    let provider = ScriptedProvider::new().refuse_connect("connection refused");
    let mut crew = ScriptedCrew::new();

    let err = execute(
        &commands(&["id"]),
        &provider,
        &SessionConfig::default(),
        &brief(),
        &mut crew,
        &engine_settings(),
    )
    .unwrap_err();

    assert_eq!(failure_kind(&err), Some(FailureKind::Transport));
    assert!(provider.executed().is_empty());
    assert_eq!(provider.closes(), 0);
}

#[test]
fn full_campaign_writes_report_and_findings() {
    let temp = tempfile::tempdir().expect("tempdir");
    let run = RunContext::begin(temp.path(), "10.0.0.1").expect("run");
    let mut findings = FindingsLog::new(&run.paths().findings_path);
    let provider = ScriptedProvider::new();
    let mut crew = ScriptedCrew::new()
        .propose(["scan 10.0.0.1"])
        .approve()
        .assess(true, None)
        .report("# Findings\n\nport 22 open", true);

    let outcome =
        run_campaign(&run, &mut crew, &provider, &settings(), &mut findings).expect("campaign");

    assert_eq!(outcome.stop, CampaignStop::Done);
    assert_eq!(outcome.executions, 1);
    assert_eq!(provider.executed(), vec!["scan 10.0.0.1"]);
    assert_eq!(provider.closes(), 1);

    let report = fs::read_to_string(&run.paths().report_path).expect("report");
    assert_eq!(report, "# Findings\n\nport 22 open");

    let events: Vec<&str> = load_findings(&run.paths().findings_path)
        .expect("findings")
        .iter()
        .map(Finding::event_name)
        .collect();
    assert_eq!(
        events,
        vec![
            "strategy_proposed",
            "strategy_reviewed",
            "commands_executed",
            "output_assessed",
            "report_reviewed"
        ]
    );

    let meta = load_run_meta(&run.paths().meta_path).expect("meta");
    assert_eq!(meta.status, RunStatus::Done);
    assert!(meta.ended_at.is_some());
}

#[test]
fn rejected_strategies_are_revised_before_execution() {
    let temp = tempfile::tempdir().expect("tempdir");
    let run = RunContext::begin(temp.path(), "10.0.0.1").expect("run");
    let mut findings = FindingsLog::new(&run.paths().findings_path);
    let provider = ScriptedProvider::new();
    let mut crew = ScriptedCrew::new()
        .propose(["nmap 10.0.0.1"])
        .reject("add service detection")
        .propose(["nmap -sV 10.0.0.1"])
        .reject("include web checks")
        .propose(["nmap -sV 10.0.0.1", "nikto -h 10.0.0.1"])
        .approve()
        .assess(true, None)
        .report("report", true);

    let outcome =
        run_campaign(&run, &mut crew, &provider, &settings(), &mut findings).expect("campaign");

    assert_eq!(outcome.proposals, 3);
    assert_eq!(outcome.strategy_reviews, 3);
    assert_eq!(crew.propose_calls, 3);
    assert_eq!(crew.review_calls, 3);
    assert_eq!(
        crew.feedback_seen(),
        vec![
            None,
            Some("add service detection".to_string()),
            Some("include web checks".to_string())
        ]
    );
    assert_eq!(
        provider.executed(),
        vec!["nmap -sV 10.0.0.1", "nikto -h 10.0.0.1"]
    );

    let origins: Vec<ProposalOrigin> = findings
        .findings()
        .iter()
        .filter_map(|f| match f {
            Finding::StrategyProposed { origin, .. } => Some(*origin),
            _ => None,
        })
        .collect();
    assert_eq!(
        origins,
        vec![
            ProposalOrigin::Initial,
            ProposalOrigin::AfterReview,
            ProposalOrigin::AfterReview
        ]
    );
}

#[test]
fn unsatisfactory_output_loops_back_with_feedback() {
    let temp = tempfile::tempdir().expect("tempdir");
    let run = RunContext::begin(temp.path(), "10.0.0.1").expect("run");
    let mut findings = FindingsLog::new(&run.paths().findings_path);
    let provider = ScriptedProvider::new();
    let mut crew = ScriptedCrew::new()
        .propose(["nmap 10.0.0.1"])
        .approve()
        .assess(false, Some("scan udp too"))
        .propose(["nmap -sU 10.0.0.1"])
        .approve()
        .assess(true, None)
        .report("draft", false)
        .report("final", true);

    let outcome =
        run_campaign(&run, &mut crew, &provider, &settings(), &mut findings).expect("campaign");

    assert_eq!(outcome.executions, 2);
    assert_eq!(outcome.report_rounds, 2);
    assert_eq!(outcome.report.as_deref(), Some("final"));
    assert_eq!(provider.connects(), 2);
    assert_eq!(provider.closes(), 2);
    assert_eq!(
        crew.feedback_seen(),
        vec![None, Some("scan udp too".to_string())]
    );
    assert_eq!(
        crew.report_feedback_seen(),
        vec![None, Some("revise: draft".to_string())]
    );
}

#[test]
fn decision_failure_archives_run_as_failed() {
    let temp = tempfile::tempdir().expect("tempdir");
    let run = RunContext::begin(temp.path(), "10.0.0.1").expect("run");
    let mut findings = FindingsLog::new(&run.paths().findings_path);
    let provider = ScriptedProvider::new();
    let mut crew = ScriptedCrew::new();

    let err = run_campaign(&run, &mut crew, &provider, &settings(), &mut findings).unwrap_err();

    assert_eq!(failure_kind(&err), Some(FailureKind::Decision));
    let meta = load_run_meta(&run.paths().meta_path).expect("meta");
    assert_eq!(meta.status, RunStatus::Failed);
    assert!(load_timeline(run.paths()).expect("timeline").is_empty());
}

/// A failing remediation is recorded and skipped: the next remediation still
/// runs, nothing is retried, and the main queue carries on.
#[test]
fn failed_remediation_is_isolated() {
    let provider = ScriptedProvider::new()
        .script("enum4linux 10.0.0.1", vec![Step::Fail("broken pipe".to_string())])
        .script(
            "apt-get install -y enum4linux",
            vec![Step::Fail("dpkg lock held".to_string())],
        );
    let mut crew = ScriptedCrew::new().remediate([
        "apt-get install -y enum4linux",
        "apt-get install -y smbclient",
    ]);

    let outcome = execute(
        &commands(&["enum4linux 10.0.0.1", "smbclient -L 10.0.0.1 -N"]),
        &provider,
        &SessionConfig::default(),
        &brief(),
        &mut crew,
        &engine_settings(),
    )
    .expect("execute");

    assert_eq!(
        provider.executed(),
        vec![
            "enum4linux 10.0.0.1",
            "apt-get install -y enum4linux",
            "apt-get install -y smbclient",
            "smbclient -L 10.0.0.1 -N"
        ]
    );
    assert_eq!(
        outcome.executed,
        vec!["enum4linux 10.0.0.1", "smbclient -L 10.0.0.1 -N"]
    );

    let failed_fix = &outcome.records[1];
    assert_eq!(failed_fix.kind, RecordKind::Remediation);
    assert_eq!(failed_fix.command, "apt-get install -y enum4linux");
    assert_eq!(failed_fix.error.as_deref(), Some("dpkg lock held"));
    assert_eq!(outcome.records[2].kind, RecordKind::Remediation);
    assert!(outcome.records[2].error.is_none());
    // Only the original failure reaches the error handler.
    assert_eq!(crew.recoveries().len(), 1);

    assert_eq!(
        outcome.output,
        "ran apt-get install -y smbclient\n\
         Error executing command: enum4linux 10.0.0.1\n\
         Error message: broken pipe\n\n\
         ran smbclient -L 10.0.0.1 -N\n"
    );
}
