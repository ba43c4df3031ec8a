//! Decision oracle backends.
//!
//! The oracle is opaque: it receives an instruction, a bounded history and a
//! user payload, and answers with text. Callers that need structure ask for
//! JSON and validate it themselves.

use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::Serialize;
use serde_json::{Value, json};
use tracing::{debug, instrument};

use crate::core::conversation::{Outbound, Turn};
use crate::core::errors::CampaignError;
use crate::io::config::OracleConfig;
use crate::io::process::run_with_timeout;

/// One oracle request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OracleRequest {
    pub instruction: String,
    pub history: Vec<Turn>,
    pub user: String,
    /// Ask for a JSON object answer.
    pub structured: bool,
}

impl OracleRequest {
    pub fn from_outbound(outbound: Outbound, structured: bool) -> Self {
        Self {
            instruction: outbound.instruction,
            history: outbound.history,
            user: outbound.user,
            structured,
        }
    }

    /// Flatten into chat messages: instruction, history, then the user turn.
    pub fn messages(&self) -> Vec<Turn> {
        let mut messages = Vec::with_capacity(self.history.len() + 2);
        messages.push(Turn::system(self.instruction.clone()));
        messages.extend(self.history.iter().cloned());
        messages.push(Turn::user(self.user.clone()));
        messages
    }
}

pub trait DecisionOracle {
    fn complete(&self, request: &OracleRequest) -> Result<String>;
}

impl<T: DecisionOracle + ?Sized> DecisionOracle for &T {
    fn complete(&self, request: &OracleRequest) -> Result<String> {
        (**self).complete(request)
    }
}

impl<T: DecisionOracle + ?Sized> DecisionOracle for Box<T> {
    fn complete(&self, request: &OracleRequest) -> Result<String> {
        (**self).complete(request)
    }
}

/// Build the backend named by the config.
pub fn oracle_from_config(cfg: &OracleConfig) -> Result<Box<dyn DecisionOracle>> {
    match cfg {
        OracleConfig::Chat {
            endpoint,
            model,
            api_key_env,
            timeout_secs,
        } => {
            let api_key = std::env::var(api_key_env)
                .with_context(|| format!("read oracle api key from ${api_key_env}"))?;
            Ok(Box::new(ChatOracle::new(
                endpoint.clone(),
                model.clone(),
                api_key,
                Duration::from_secs(*timeout_secs),
            )))
        }
        OracleConfig::Command {
            command,
            timeout_secs,
            output_limit_bytes,
        } => Ok(Box::new(CommandOracle {
            command: command.clone(),
            timeout: Duration::from_secs(*timeout_secs),
            output_limit_bytes: *output_limit_bytes,
        })),
    }
}

/// OpenAI-compatible chat-completions endpoint.
pub struct ChatOracle {
    agent: ureq::Agent,
    endpoint: String,
    model: String,
    api_key: String,
}

impl ChatOracle {
    pub fn new(endpoint: String, model: String, api_key: String, timeout: Duration) -> Self {
        let agent: ureq::Agent = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .build()
            .into();
        Self {
            agent,
            endpoint,
            model,
            api_key,
        }
    }

    fn payload(&self, request: &OracleRequest) -> Value {
        let mut payload = json!({
            "model": self.model,
            "messages": request.messages(),
        });
        if request.structured {
            payload["response_format"] = json!({ "type": "json_object" });
        }
        payload
    }
}

impl DecisionOracle for ChatOracle {
    #[instrument(skip_all, fields(model = %self.model, structured = request.structured))]
    fn complete(&self, request: &OracleRequest) -> Result<String> {
        let body = serde_json::to_string(&self.payload(request)).context("serialize chat request")?;
        let response: String = self
            .agent
            .post(&self.endpoint)
            .header("Authorization", &format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .send(&body)
            .map_err(|err| CampaignError::decision(format!("chat request failed: {err}")))?
            .body_mut()
            .read_to_string()
            .map_err(|err| CampaignError::decision(format!("read chat response: {err}")))?;
        debug!(bytes = response.len(), "chat response received");
        chat_content(&response)
    }
}

/// Extract `choices[0].message.content` from a chat-completions response.
pub fn chat_content(body: &str) -> Result<String> {
    let value: Value = serde_json::from_str(body)
        .map_err(|err| CampaignError::decision(format!("chat response is not JSON: {err}")))?;
    value["choices"][0]["message"]["content"]
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| {
            CampaignError::decision("chat response has no choices[0].message.content").into()
        })
}

/// External program answering on stdout.
#[derive(Debug, Clone)]
pub struct CommandOracle {
    pub command: Vec<String>,
    pub timeout: Duration,
    pub output_limit_bytes: usize,
}

impl DecisionOracle for CommandOracle {
    #[instrument(skip_all, fields(program = ?self.command.first()))]
    fn complete(&self, request: &OracleRequest) -> Result<String> {
        let (program, args) = self
            .command
            .split_first()
            .ok_or_else(|| anyhow!("oracle command is empty"))?;
        let mut cmd = Command::new(program);
        cmd.args(args);

        let input = serde_json::to_vec(request).context("serialize oracle request")?;
        let out = run_with_timeout(cmd, Some(&input), self.timeout, self.output_limit_bytes)
            .map_err(|err| CampaignError::decision(format!("oracle command failed: {err:#}")))?;
        if out.timed_out {
            return Err(CampaignError::decision(format!(
                "oracle command timed out after {}s",
                self.timeout.as_secs()
            ))
            .into());
        }
        if !out.status.success() {
            return Err(CampaignError::decision(format!(
                "oracle command exited with {:?}: {}",
                out.status.code(),
                out.stderr_tail(5)
            ))
            .into());
        }
        Ok(out.stdout_text().trim().to_string())
    }
}
