//! Campaign configuration stored in `campaign.toml`.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::core::types::Brief;
use crate::io::atomic::write_atomic;

/// Campaign configuration (TOML).
///
/// Every section is optional; missing fields fall back to the defaults below.
/// Secrets are read from the environment when the `*_env` fields are set.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct CampaignConfig {
    pub target: TargetConfig,
    pub session: SessionConfig,
    pub oracle: OracleConfig,
    pub engine: EngineConfig,
    pub workflow: WorkflowConfig,
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TargetConfig {
    /// Address of the host under assessment.
    pub address: String,
    /// The client's request, passed to every role.
    pub description: String,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            address: String::new(),
            description: "check for vulnerabilities on the target machine".to_string(),
        }
    }
}

/// Where commands run: the host the remote session connects to.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SessionConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    /// Inline password. Prefer `secret_env`.
    pub secret: Option<String>,
    /// Environment variable holding the password.
    pub secret_env: Option<String>,
    /// Private key file used instead of a password.
    pub private_key: Option<PathBuf>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 22,
            user: "root".to_string(),
            secret: None,
            secret_env: Some("CAMPAIGN_SSH_SECRET".to_string()),
            private_key: None,
        }
    }
}

/// Credentials resolved from [`SessionConfig`].
#[derive(Clone, PartialEq, Eq)]
pub enum SessionAuth {
    Password(String),
    KeyFile(PathBuf),
}

impl std::fmt::Debug for SessionAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionAuth::Password(_) => f.write_str("Password(<redacted>)"),
            SessionAuth::KeyFile(path) => write!(f, "KeyFile({})", path.display()),
        }
    }
}

impl SessionConfig {
    pub fn auth(&self) -> Result<SessionAuth> {
        if let Some(path) = &self.private_key {
            return Ok(SessionAuth::KeyFile(path.clone()));
        }
        if let Some(secret) = &self.secret {
            return Ok(SessionAuth::Password(secret.clone()));
        }
        if let Some(var) = &self.secret_env {
            let secret = std::env::var(var)
                .with_context(|| format!("read session secret from ${var}"))?;
            return Ok(SessionAuth::Password(secret));
        }
        Err(anyhow!(
            "session needs one of `secret`, `secret_env` or `private_key`"
        ))
    }
}

/// Decision oracle backend.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "backend", rename_all = "snake_case")]
pub enum OracleConfig {
    /// OpenAI-compatible chat-completions endpoint.
    Chat {
        #[serde(default = "default_endpoint")]
        endpoint: String,
        #[serde(default = "default_model")]
        model: String,
        #[serde(default = "default_api_key_env")]
        api_key_env: String,
        #[serde(default = "default_oracle_timeout_secs")]
        timeout_secs: u64,
    },
    /// External program: request JSON on stdin, answer on stdout.
    Command {
        command: Vec<String>,
        #[serde(default = "default_oracle_timeout_secs")]
        timeout_secs: u64,
        #[serde(default = "default_oracle_output_limit_bytes")]
        output_limit_bytes: usize,
    },
}

fn default_endpoint() -> String {
    "https://api.openai.com/v1/chat/completions".to_string()
}

fn default_model() -> String {
    "gpt-4o".to_string()
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

fn default_oracle_timeout_secs() -> u64 {
    300
}

fn default_oracle_output_limit_bytes() -> usize {
    1_000_000
}

impl Default for OracleConfig {
    fn default() -> Self {
        OracleConfig::Chat {
            endpoint: default_endpoint(),
            model: default_model(),
            api_key_env: default_api_key_env(),
            timeout_secs: default_oracle_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct EngineConfig {
    /// Sleep between polls when neither stream had data.
    pub poll_interval_ms: u64,
    /// Bytes read per poll from each stream.
    pub read_chunk_bytes: usize,
    /// Per-command wall-clock limit; `0` waits forever.
    pub command_timeout_secs: u64,
    /// Route non-zero exit statuses through error recovery.
    pub recover_on_nonzero_exit: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 10,
            read_chunk_bytes: 1024,
            command_timeout_secs: 60 * 60,
            recover_on_nonzero_exit: true,
        }
    }
}

impl EngineConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn command_timeout(&self) -> Option<Duration> {
        (self.command_timeout_secs > 0).then(|| Duration::from_secs(self.command_timeout_secs))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct WorkflowConfig {
    /// Total strategy proposals allowed in one run.
    pub max_proposals: u32,
    /// Report generations allowed before giving up.
    pub max_report_rounds: u32,
    /// Prior turns included in each oracle request.
    pub history_window: usize,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            max_proposals: 10,
            max_report_rounds: 5,
            history_window: 20,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct OutputConfig {
    /// Root for `run{N}` directories.
    pub log_dir: PathBuf,
    /// Optional TOML file overriding role instructions.
    pub instructions_file: Option<PathBuf>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            log_dir: PathBuf::from("context_logs"),
            instructions_file: None,
        }
    }
}

impl CampaignConfig {
    pub fn brief(&self) -> Brief {
        Brief {
            target: self.target.address.clone(),
            description: self.target.description.clone(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.target.address.trim().is_empty() {
            return Err(anyhow!("target.address must be set"));
        }
        if self.target.description.trim().is_empty() {
            return Err(anyhow!("target.description must be set"));
        }
        if self.session.host.trim().is_empty() {
            return Err(anyhow!("session.host must be set"));
        }
        if self.session.user.trim().is_empty() {
            return Err(anyhow!("session.user must be set"));
        }
        if self.session.port == 0 {
            return Err(anyhow!("session.port must be > 0"));
        }
        match &self.oracle {
            OracleConfig::Chat {
                endpoint,
                model,
                timeout_secs,
                ..
            } => {
                if endpoint.trim().is_empty() || model.trim().is_empty() {
                    return Err(anyhow!("oracle.endpoint and oracle.model must be set"));
                }
                if *timeout_secs == 0 {
                    return Err(anyhow!("oracle.timeout_secs must be > 0"));
                }
            }
            OracleConfig::Command {
                command,
                timeout_secs,
                output_limit_bytes,
            } => {
                if command.is_empty() || command[0].trim().is_empty() {
                    return Err(anyhow!("oracle.command must be a non-empty array"));
                }
                if *timeout_secs == 0 {
                    return Err(anyhow!("oracle.timeout_secs must be > 0"));
                }
                if *output_limit_bytes == 0 {
                    return Err(anyhow!("oracle.output_limit_bytes must be > 0"));
                }
            }
        }
        if self.engine.poll_interval_ms == 0 {
            return Err(anyhow!("engine.poll_interval_ms must be > 0"));
        }
        if self.engine.read_chunk_bytes == 0 {
            return Err(anyhow!("engine.read_chunk_bytes must be > 0"));
        }
        if self.workflow.max_proposals == 0 {
            return Err(anyhow!("workflow.max_proposals must be > 0"));
        }
        if self.workflow.max_report_rounds == 0 {
            return Err(anyhow!("workflow.max_report_rounds must be > 0"));
        }
        if self.workflow.history_window == 0 {
            return Err(anyhow!("workflow.history_window must be > 0"));
        }
        Ok(())
    }
}

/// Load config from a TOML file.
///
/// A missing file yields `CampaignConfig::default()`; callers validate after
/// applying command-line overrides.
pub fn load_config(path: &Path) -> Result<CampaignConfig> {
    if !path.exists() {
        return Ok(CampaignConfig::default());
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: CampaignConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &CampaignConfig) -> Result<()> {
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> CampaignConfig {
        let mut cfg = CampaignConfig::default();
        cfg.target.address = "10.0.0.1".to_string();
        cfg
    }

    #[test]
    fn load_missing_returns_default() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cfg = load_config(&temp.path().join("missing.toml")).expect("load");
        assert_eq!(cfg, CampaignConfig::default());
    }

    #[test]
    fn write_then_load_round_trips() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("campaign.toml");
        let cfg = valid();
        write_config(&path, &cfg).expect("write");
        let loaded = load_config(&path).expect("load");
        assert_eq!(loaded, cfg);
    }

    #[test]
    fn parses_command_oracle_with_partial_sections() {
        let raw = r#"
            [target]
            address = "10.0.0.5"

            [oracle]
            backend = "command"
            command = ["oracle-cli", "--json"]

            [engine]
            command_timeout_secs = 0
        "#;
        let cfg: CampaignConfig = toml::from_str(raw).expect("parse");
        cfg.validate().expect("valid");
        assert_eq!(cfg.session.port, 22);
        assert_eq!(cfg.engine.command_timeout(), None);
        assert!(matches!(
            cfg.oracle,
            OracleConfig::Command { timeout_secs: 300, .. }
        ));
    }

    #[test]
    fn validate_rejects_missing_target_and_zero_caps() {
        assert!(CampaignConfig::default().validate().is_err());

        let mut cfg = valid();
        cfg.workflow.max_proposals = 0;
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("max_proposals"));
    }

    #[test]
    fn auth_prefers_key_then_inline_secret() {
        let mut session = SessionConfig {
            secret: Some("pw".to_string()),
            ..SessionConfig::default()
        };
        assert_eq!(session.auth().expect("auth"), SessionAuth::Password("pw".into()));

        session.private_key = Some(PathBuf::from("/keys/id_ed25519"));
        assert_eq!(
            session.auth().expect("auth"),
            SessionAuth::KeyFile(PathBuf::from("/keys/id_ed25519"))
        );
    }

    #[test]
    fn auth_debug_redacts_password() {
        let auth = SessionAuth::Password("hunter2".to_string());
        assert!(!format!("{auth:?}").contains("hunter2"));
    }
}
