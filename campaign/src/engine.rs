//! Command execution engine.
//!
//! Runs one approved strategy over a single remote session. Commands are
//! visited in queue order exactly once; output is streamed into one
//! accumulated transcript that later phases read. Failures inside a
//! command's scope are recovered here and never abort the phase.

use std::thread;
use std::time::{Duration, Instant};

use anyhow::Result;
use tracing::{debug, info, instrument, warn};

use crate::core::decode::ChunkDecoder;
use crate::core::errors::CampaignError;
use crate::core::prepare::prepare_command;
use crate::core::queue::{CommandQueue, EntryOrigin};
use crate::core::types::{
    Brief, ExecutionRecord, ExecutionStop, RecordKind, UNKNOWN_EXIT_STATUS,
};
use crate::io::config::{EngineConfig, SessionConfig};
use crate::io::session::{ExecChannel, RemoteSession, SessionProvider};
use crate::monitor::{InputOracle, MonitorView, RuntimeMonitor};
use crate::recovery::{ErrorHandler, error_text, plan_remediation, recovery_context};

#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub poll_interval: Duration,
    pub read_chunk_bytes: usize,
    /// `None` waits forever.
    pub command_timeout: Option<Duration>,
    pub recover_on_nonzero_exit: bool,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self::from(&EngineConfig::default())
    }
}

impl From<&EngineConfig> for EngineSettings {
    fn from(cfg: &EngineConfig) -> Self {
        Self {
            poll_interval: cfg.poll_interval(),
            read_chunk_bytes: cfg.read_chunk_bytes,
            command_timeout: cfg.command_timeout(),
            recover_on_nonzero_exit: cfg.recover_on_nonzero_exit,
        }
    }
}

/// Everything the engine consults while running commands.
pub trait Advisors: RuntimeMonitor + InputOracle + ErrorHandler {}

impl<T: RuntimeMonitor + InputOracle + ErrorHandler + ?Sized> Advisors for T {}

/// What to do after a planned command finished.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AfterCommand {
    Continue,
    /// Input was needed but none should be sent: stop the whole queue.
    StopRun,
    /// Run this text next, in the slot right after the trigger.
    InjectCommand(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionOutcome {
    /// Combined output of every command, remediation and error, in order.
    pub output: String,
    pub records: Vec<ExecutionRecord>,
    pub executed: Vec<String>,
    pub pending: Vec<String>,
    pub stop: ExecutionStop,
}

/// Closes the session on every exit path.
struct SessionGuard<S: RemoteSession> {
    session: S,
}

impl<S: RemoteSession> Drop for SessionGuard<S> {
    fn drop(&mut self) {
        if let Err(err) = self.session.close() {
            warn!(err = %format!("{err:#}"), "failed to close remote session");
        }
    }
}

/// Run `commands` in order over one session from `provider`.
///
/// Only a failure to open the session is returned as an error (a `Transport`
/// failure); everything after that is folded into the outcome.
#[instrument(skip_all, fields(commands = commands.len(), host = %session_cfg.host))]
pub fn execute<P, A>(
    commands: &[String],
    provider: &P,
    session_cfg: &SessionConfig,
    brief: &Brief,
    advisors: &mut A,
    settings: &EngineSettings,
) -> Result<ExecutionOutcome>
where
    P: SessionProvider,
    A: Advisors + ?Sized,
{
    let session = provider
        .connect(session_cfg)
        .map_err(|err| CampaignError::transport(format!("{err:#}")))?;
    info!("remote session opened");

    let mut engine = Engine {
        guard: SessionGuard { session },
        brief,
        settings,
        output: String::new(),
        records: Vec::new(),
    };
    let mut queue = CommandQueue::new(commands);
    let mut stop = ExecutionStop::QueueDrained;

    while let Some(entry) = queue.current().cloned() {
        let planned = entry.origin == EntryOrigin::Planned;
        let kind = if planned {
            RecordKind::Normal
        } else {
            RecordKind::InjectedInput
        };

        let ran = engine.run(&prepare_command(&entry.command), kind);
        let after = match ran {
            Ok(()) if planned => {
                advise(&mut *advisors, brief, &engine.output, &queue).inspect_err(|err| {
                    // Monitor/oracle failures belong to the command that triggered them.
                    if let Some(record) = engine.records.last_mut() {
                        record.error = Some(format!("{err:#}"));
                    }
                })
            }
            Ok(()) => Ok(AfterCommand::Continue),
            Err(err) => Err(err),
        };

        match after {
            Ok(AfterCommand::Continue) => {}
            Ok(AfterCommand::StopRun) => {
                info!(index = queue.cursor(), "input needed but none given, stopping queue");
                queue.advance();
                stop = ExecutionStop::InputDeclined;
                break;
            }
            Ok(AfterCommand::InjectCommand(text)) => {
                if let Some(slot) = queue.inject_after_current(text) {
                    info!(slot, "input command injected");
                }
            }
            Err(err) => engine.recover(&entry.command, &err, &mut *advisors),
        }
        queue.advance();
    }

    let executed = queue.consumed().into_iter().map(str::to_string).collect();
    let pending = queue.remaining().into_iter().map(str::to_string).collect();
    info!(records = engine.records.len(), ?stop, "execution phase finished");
    Ok(ExecutionOutcome {
        output: std::mem::take(&mut engine.output),
        records: std::mem::take(&mut engine.records),
        executed,
        pending,
        stop,
    })
}

/// Consult the monitor and, when input is needed, the input oracle.
fn advise<A: Advisors + ?Sized>(
    advisors: &mut A,
    brief: &Brief,
    output: &str,
    queue: &CommandQueue,
) -> Result<AfterCommand> {
    let executed = queue.executed();
    let pending = queue.pending();
    let view = MonitorView {
        brief,
        output,
        executed: &executed,
        pending: &pending,
    };
    if !advisors.needs_input(&view)? {
        return Ok(AfterCommand::Continue);
    }
    let input = advisors.next_input(&view)?;
    let input = input.trim();
    if input.is_empty() {
        Ok(AfterCommand::StopRun)
    } else {
        Ok(AfterCommand::InjectCommand(input.to_string()))
    }
}

struct Engine<'a, S: RemoteSession> {
    guard: SessionGuard<S>,
    brief: &'a Brief,
    settings: &'a EngineSettings,
    output: String,
    records: Vec<ExecutionRecord>,
}

impl<S: RemoteSession> Engine<'_, S> {
    /// Run one prepared command, append what it printed and record it.
    fn run(&mut self, command: &str, kind: RecordKind) -> Result<()> {
        info!(command, ?kind, "executing command");
        let mut captured = String::new();
        let result = self
            .guard
            .session
            .exec(command)
            .and_then(|mut channel| stream_command(&mut channel, self.settings, &mut captured));
        self.output.push_str(&captured);

        let (exit_status, failure) = match result {
            Ok(Some(code)) if code != 0 && self.settings.recover_on_nonzero_exit => (
                code,
                Some(CampaignError::command(format!("exited with status {code}")).into()),
            ),
            Ok(status) => (status.unwrap_or(UNKNOWN_EXIT_STATUS), None),
            Err(err) => (UNKNOWN_EXIT_STATUS, Some(err)),
        };
        debug!(exit_status, bytes = captured.len(), "command finished");

        self.records.push(ExecutionRecord {
            command: command.to_string(),
            output: captured,
            exit_status,
            kind,
            error: failure.as_ref().map(|err: &anyhow::Error| format!("{err:#}")),
        });
        match failure {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Error recovery for a failed command: remediation, then the error text.
    fn recover<A: ErrorHandler + ?Sized>(
        &mut self,
        command: &str,
        err: &anyhow::Error,
        handler: &mut A,
    ) {
        let text = error_text(command, err);
        warn!(command, err = %format!("{err:#}"), "command failed, starting recovery");

        let context = recovery_context(self.brief, &self.output);
        let (fixes, note) = plan_remediation(handler, &text, &context);
        if let Some(note) = note {
            self.output.push_str(&note);
        }
        for fix in fixes {
            if let Err(fix_err) = self.run(&prepare_command(&fix), RecordKind::Remediation) {
                warn!(command = %fix, err = %format!("{fix_err:#}"), "remediation failed");
            }
        }
        self.output.push_str(&text);
    }
}

/// Poll `channel` until the command ends, appending decoded output to
/// `captured` as it arrives.
///
/// The command ends once the exit status is ready and no stdout is left to
/// read. Returns the exit status, or `None` when the remote reported none.
pub(crate) fn stream_command<C: ExecChannel>(
    channel: &mut C,
    settings: &EngineSettings,
    captured: &mut String,
) -> Result<Option<i32>> {
    let started = Instant::now();
    let mut buf = vec![0u8; settings.read_chunk_bytes.max(1)];
    let mut stdout = ChunkDecoder::default();
    let mut stderr = ChunkDecoder::default();

    loop {
        let ready = channel.exit_status_ready()?;
        let out = channel.read_stdout(&mut buf)?;
        if out > 0 {
            captured.push_str(&stdout.decode(&buf[..out]));
        }
        let err = channel.read_stderr(&mut buf)?;
        if err > 0 {
            captured.push_str(&stderr.decode(&buf[..err]));
        }
        if ready && out == 0 {
            break;
        }
        if let Some(limit) = settings.command_timeout
            && started.elapsed() >= limit
        {
            captured.push_str(&stdout.finish());
            captured.push_str(&stderr.finish());
            if let Err(abort_err) = channel.abort() {
                warn!(err = %format!("{abort_err:#}"), "failed to abort timed out command");
            }
            return Err(CampaignError::command(format!(
                "timed out after {}s",
                limit.as_secs_f64()
            ))
            .into());
        }
        if out == 0 && err == 0 {
            thread::sleep(settings.poll_interval);
        }
    }

    loop {
        let n = channel.read_stderr(&mut buf)?;
        if n == 0 {
            break;
        }
        captured.push_str(&stderr.decode(&buf[..n]));
    }
    captured.push_str(&stdout.finish());
    captured.push_str(&stderr.finish());
    channel.exit_status()
}
