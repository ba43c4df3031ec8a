//! Error recovery sub-loop.
//!
//! A failed command is handed to the [`ErrorHandler`] together with the
//! output so far. Each remediation it returns runs once on the same session;
//! failures there are recorded and never retried.

use anyhow::Result;
use tracing::{info, warn};

use crate::core::types::Brief;

pub trait ErrorHandler {
    /// Remediation commands for `error`, in execution order.
    fn remediation(&mut self, error: &str, context: &str) -> Result<Vec<String>>;
}

/// Text describing a failed command, as woven into the accumulated output.
pub fn error_text(command: &str, err: &anyhow::Error) -> String {
    format!("Error executing command: {command}\nError message: {err:#}\n\n")
}

/// Context handed to the error handler.
pub fn recovery_context(brief: &Brief, output: &str) -> String {
    format!(
        "Target: {}\nClient request: {}\nCommand output:\n{}",
        brief.target, brief.description, output
    )
}

/// Ask `handler` for remediation. A failing handler yields no commands and a
/// note to weave into the output.
pub fn plan_remediation<H: ErrorHandler + ?Sized>(
    handler: &mut H,
    error: &str,
    context: &str,
) -> (Vec<String>, Option<String>) {
    match handler.remediation(error, context) {
        Ok(fix) => {
            info!(commands = fix.len(), "remediation planned");
            (fix, None)
        }
        Err(err) => {
            warn!(err = %format!("{err:#}"), "error handler failed, continuing without remediation");
            (Vec::new(), Some(format!("Error handler failed: {err:#}\n")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    struct Fixed(Result<Vec<String>, String>);

    impl ErrorHandler for Fixed {
        fn remediation(&mut self, _error: &str, _context: &str) -> Result<Vec<String>> {
            self.0.clone().map_err(|msg| anyhow!(msg))
        }
    }

    #[test]
    fn error_text_names_command_and_cause() {
        let err = anyhow!("connection reset").context("read stdout");
        assert_eq!(
            error_text("nikto -h 10.0.0.1", &err),
            "Error executing command: nikto -h 10.0.0.1\nError message: read stdout: connection reset\n\n"
        );
    }

    #[test]
    fn handler_failure_yields_note_and_no_commands() {
        let mut handler = Fixed(Err("oracle down".to_string()));
        let (fix, note) = plan_remediation(&mut handler, "boom", "ctx");
        assert!(fix.is_empty());
        assert_eq!(note.as_deref(), Some("Error handler failed: oracle down\n"));

        let mut handler = Fixed(Ok(vec!["apt-get install -y nikto".to_string()]));
        let (fix, note) = plan_remediation(&mut handler, "boom", "ctx");
        assert_eq!(fix, vec!["apt-get install -y nikto"]);
        assert!(note.is_none());
    }

    #[test]
    fn context_carries_brief_and_output() {
        let brief = Brief {
            target: "10.0.0.1".to_string(),
            description: "web scan".to_string(),
        };
        let ctx = recovery_context(&brief, "partial");
        assert_eq!(
            ctx,
            "Target: 10.0.0.1\nClient request: web scan\nCommand output:\npartial"
        );
    }
}
