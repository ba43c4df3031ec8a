//! Autonomous assessment campaign runner.
//!
//! Reads `campaign.toml`, opens one SSH session per execution phase and writes
//! every oracle exchange, the findings log and the approved report under
//! `context_logs/run{N}/`.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use campaign::agents::Agents;
use campaign::agents::prompts::PromptEngine;
use campaign::core::errors::CampaignError;
use campaign::exit_codes;
use campaign::io::audit::load_timeline;
use campaign::io::config::{CampaignConfig, load_config, write_config};
use campaign::io::findings::FindingsLog;
use campaign::io::oracle::oracle_from_config;
use campaign::io::run_context::{RunContext, existing_run, list_runs};
use campaign::io::session::SshProvider;
use campaign::logging;
use campaign::workflow::{CampaignSettings, CampaignStop, run_campaign};
use clap::{Parser, Subcommand};
use tracing::info;

#[derive(Parser)]
#[command(
    name = "campaign",
    version,
    about = "Autonomous multi-role assessment campaign over SSH"
)]
struct Cli {
    /// Config file.
    #[arg(short, long, global = true, default_value = "campaign.toml")]
    config: PathBuf,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write a default config file if missing.
    Init {
        /// Overwrite an existing config.
        #[arg(short, long)]
        force: bool,
    },
    /// Run one campaign until a report is approved or a revision cap is hit.
    Run {
        /// Target address (overrides `target.address`).
        #[arg(long)]
        target: Option<String>,
        /// Client request (overrides `target.description`).
        #[arg(long)]
        description: Option<String>,
        /// SSH host of the assessment machine (overrides `session.host`).
        #[arg(long)]
        host: Option<String>,
    },
    /// List past runs, newest first.
    Runs,
    /// Print every oracle exchange of a run in global order.
    Timeline {
        #[arg(long)]
        run: u32,
    },
}

fn main() {
    logging::init();
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{:#}", err);
            std::process::exit(exit_codes::FATAL);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Init { force } => cmd_init(&cli.config, force),
        Command::Run {
            target,
            description,
            host,
        } => cmd_run(&cli.config, target, description, host),
        Command::Runs => cmd_runs(&cli.config),
        Command::Timeline { run } => cmd_timeline(&cli.config, run),
    }
}

fn cmd_init(path: &Path, force: bool) -> Result<i32> {
    if !force && path.exists() {
        println!("{} already exists", path.display());
        return Ok(exit_codes::OK);
    }
    write_config(path, &CampaignConfig::default())?;
    println!("wrote {}", path.display());
    Ok(exit_codes::OK)
}

fn cmd_run(
    path: &Path,
    target: Option<String>,
    description: Option<String>,
    host: Option<String>,
) -> Result<i32> {
    let mut cfg = load_config(path)?;
    apply_overrides(&mut cfg, target, description, host);
    cfg.validate()
        .map_err(|err| CampaignError::configuration(format!("{err:#}")))
        .with_context(|| format!("invalid config {}", path.display()))?;

    let prompts = match &cfg.output.instructions_file {
        Some(file) => PromptEngine::with_overrides(file)?,
        None => PromptEngine::new()?,
    };
    let oracle = oracle_from_config(&cfg.oracle)?;
    let settings = CampaignSettings::from_config(&cfg);

    let run = RunContext::begin(&cfg.output.log_dir, &cfg.target.address)?;
    info!(run = run.run_number(), dir = %run.paths().dir.display(), "run started");
    let mut findings = FindingsLog::new(&run.paths().findings_path);
    let mut agents = Agents::new(
        oracle,
        &run,
        prompts,
        settings.brief.clone(),
        cfg.workflow.history_window,
    );

    let outcome = run_campaign(&run, &mut agents, &SshProvider, &settings, &mut findings)?;
    match outcome.stop {
        CampaignStop::Done => {
            println!("{}", run.paths().report_path.display());
            Ok(exit_codes::OK)
        }
        CampaignStop::Escalated { phase, rounds } => {
            eprintln!(
                "escalated: {phase} reached its cap after {rounds} rounds (run{})",
                outcome.run_number
            );
            Ok(exit_codes::ESCALATED)
        }
    }
}

fn apply_overrides(
    cfg: &mut CampaignConfig,
    target: Option<String>,
    description: Option<String>,
    host: Option<String>,
) {
    if let Some(target) = target {
        cfg.target.address = target;
    }
    if let Some(description) = description {
        cfg.target.description = description;
    }
    if let Some(host) = host {
        cfg.session.host = host;
    }
}

fn cmd_runs(path: &Path) -> Result<i32> {
    let cfg = load_config(path)?;
    for summary in list_runs(&cfg.output.log_dir)? {
        match summary.meta {
            Some(meta) => println!(
                "run{}\t{}\t{}\t{}",
                summary.run_number, meta.status, meta.target, meta.started_at
            ),
            None => println!("run{}\tunknown", summary.run_number),
        }
    }
    Ok(exit_codes::OK)
}

fn cmd_timeline(path: &Path, run_number: u32) -> Result<i32> {
    let cfg = load_config(path)?;
    let paths = existing_run(&cfg.output.log_dir, run_number)?;
    for entry in load_timeline(&paths)? {
        println!(
            "#{} {} request {}\n{}\n",
            entry.order, entry.role, entry.request, entry.response
        );
    }
    Ok(exit_codes::OK)
}
