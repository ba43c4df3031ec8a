//! Role instructions and user-payload templates.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use minijinja::{Environment, Value, context};
use tracing::debug;

use crate::core::types::Role;

const DEFAULT_INSTRUCTIONS: &str = include_str!("prompts/instructions.toml");

const TEMPLATES: [(&str, &str); 8] = [
    ("propose", include_str!("prompts/propose.md")),
    ("next_input", include_str!("prompts/next_input.md")),
    ("review_strategy", include_str!("prompts/review_strategy.md")),
    ("assess_output", include_str!("prompts/assess_output.md")),
    ("review_report", include_str!("prompts/review_report.md")),
    ("classify", include_str!("prompts/monitor.md")),
    ("recover", include_str!("prompts/recover.md")),
    ("report", include_str!("prompts/report.md")),
];

/// One oracle operation: who asks, whom they talk to, and which template and
/// instruction apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Propose,
    NextInput,
    ReviewStrategy,
    AssessOutput,
    ReviewReport,
    Classify,
    Recover,
    Report,
}

impl Operation {
    pub fn key(self) -> &'static str {
        match self {
            Operation::Propose => "propose",
            Operation::NextInput => "next_input",
            Operation::ReviewStrategy => "review_strategy",
            Operation::AssessOutput => "assess_output",
            Operation::ReviewReport => "review_report",
            Operation::Classify => "classify",
            Operation::Recover => "recover",
            Operation::Report => "report",
        }
    }

    pub fn owner(self) -> Role {
        match self {
            Operation::Propose | Operation::NextInput => Role::Proposer,
            Operation::ReviewStrategy | Operation::AssessOutput | Operation::ReviewReport => {
                Role::Reviewer
            }
            Operation::Classify => Role::Monitor,
            Operation::Recover => Role::Recovery,
            Operation::Report => Role::Reporter,
        }
    }

    pub fn peer(self) -> Role {
        match self {
            Operation::Propose | Operation::AssessOutput => Role::Reviewer,
            Operation::NextInput => Role::Monitor,
            Operation::ReviewStrategy => Role::Proposer,
            Operation::ReviewReport => Role::Reporter,
            Operation::Classify | Operation::Recover => Role::Executor,
            Operation::Report => Role::Reviewer,
        }
    }
}

type InstructionTable = BTreeMap<String, BTreeMap<String, String>>;

pub struct PromptEngine {
    env: Environment<'static>,
    instructions: InstructionTable,
}

impl PromptEngine {
    /// Bundled templates and instructions.
    pub fn new() -> Result<Self> {
        let mut env = Environment::new();
        for (name, source) in TEMPLATES {
            env.add_template(name, source)
                .with_context(|| format!("load template {name}"))?;
        }
        let instructions: InstructionTable =
            toml::from_str(DEFAULT_INSTRUCTIONS).context("parse bundled instructions")?;
        Ok(Self { env, instructions })
    }

    /// Bundled defaults with entries from `path` layered on top.
    pub fn with_overrides(path: &Path) -> Result<Self> {
        let mut engine = Self::new()?;
        let contents = fs::read_to_string(path)
            .with_context(|| format!("read instructions {}", path.display()))?;
        let overrides: InstructionTable = toml::from_str(&contents)
            .with_context(|| format!("parse instructions {}", path.display()))?;
        for (role, ops) in overrides {
            if Role::parse(&role).is_none() {
                return Err(anyhow!("unknown role `{role}` in {}", path.display()));
            }
            for (op, text) in ops {
                debug!(%role, %op, "instruction overridden");
                engine
                    .instructions
                    .entry(role.clone())
                    .or_default()
                    .insert(op, text);
            }
        }
        Ok(engine)
    }

    pub fn instruction(&self, op: Operation) -> Result<&str> {
        let role = op.owner();
        self.instructions
            .get(role.as_str())
            .and_then(|ops| ops.get(op.key()))
            .map(|text| text.trim())
            .ok_or_else(|| anyhow!("no instruction for {role}.{}", op.key()))
    }

    pub fn render(&self, op: Operation, ctx: Value) -> Result<String> {
        let template = self.env.get_template(op.key())?;
        let rendered = template
            .render(ctx)
            .with_context(|| format!("render {} prompt", op.key()))?;
        Ok(rendered.trim().to_string())
    }
}

/// Context for a strategy proposal.
pub fn propose_context(target: &str, description: &str, feedback: Option<&str>) -> Value {
    context! {
        target => target,
        description => description,
        feedback => non_empty(feedback),
    }
}

pub fn report_context(
    target: &str,
    description: &str,
    findings: &str,
    feedback: Option<&str>,
) -> Value {
    context! {
        target => target,
        description => description,
        findings => findings,
        feedback => non_empty(feedback),
    }
}

fn non_empty(text: Option<&str>) -> Option<&str> {
    text.map(str::trim).filter(|s| !s.is_empty())
}
