//! Runtime monitor seam: does the command that just ran want input?

use anyhow::Result;

use crate::core::types::Brief;

/// What the monitor sees after a planned command.
#[derive(Debug, Clone, Copy)]
pub struct MonitorView<'a> {
    pub brief: &'a Brief,
    /// Everything captured in this execution phase so far.
    pub output: &'a str,
    pub executed: &'a [&'a str],
    pub pending: &'a [&'a str],
}

pub trait RuntimeMonitor {
    fn needs_input(&mut self, view: &MonitorView<'_>) -> Result<bool>;
}

/// Oracle for the literal text to send when input is needed.
///
/// An empty answer means nothing should be sent and the queue stops.
pub trait InputOracle {
    fn next_input(&mut self, view: &MonitorView<'_>) -> Result<String>;
}
