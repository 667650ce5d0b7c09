//! Operator commands: run the pipeline, inspect state, self-check the
//! environment, and reset the processed ledger.

use std::io::{self, BufRead, Write};
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use crate::config::AppConfig;
use crate::error::Result;
use crate::ledger::effort::EffortLedger;
use crate::ledger::processed::ProcessedLedger;
use crate::pipeline::{Pipeline, StageContext};
use crate::workspace;

#[derive(Parser)]
#[command(name = "codemend", about = "Automated static-analysis finding remediation")]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Enable debug-level logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Show configuration and ledger state
    Status,
    /// Run one remediation pass (the default command)
    Run {
        /// Validate configuration and exit without side effects
        #[arg(long)]
        dry_run: bool,
    },
    /// Check connectivity prerequisites without processing anything
    Test,
    /// Clear the processed-finding ledger
    Reset {
        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },
}

pub fn dispatch(cli: Cli) -> ExitCode {
    let config = match AppConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "Failed to load configuration");
            return ExitCode::FAILURE;
        }
    };

    let outcome = match cli.command.unwrap_or(Command::Run { dry_run: false }) {
        Command::Status => status(&config),
        Command::Run { dry_run } => run(config, dry_run),
        Command::Test => self_check(&config),
        Command::Reset { yes } => reset(&config, yes),
    };

    match outcome {
        Ok(code) => code,
        Err(e) => {
            tracing::error!(error = %e, "Command failed");
            ExitCode::FAILURE
        }
    }
}

fn status(config: &AppConfig) -> Result<ExitCode> {
    println!("codemend status");
    println!("  tracker project: {}", config.tracker.project_key);
    println!("  repository:      {}", config.git.repo_path.display());
    println!(
        "  tool servers:    {}",
        config
            .enabled_servers()
            .keys()
            .cloned()
            .collect::<Vec<_>>()
            .join(", ")
    );

    let ledger = ProcessedLedger::new(&config.paths.processed_ledger);
    let records = ledger.load();
    let total_effort = EffortLedger::new(&config.paths.effort_ledger).load();
    println!("  processed:       {} findings", records.len());
    println!("  total effort:    {total_effort} minutes");

    if !records.is_empty() {
        println!("  recent:");
        for record in records.iter().rev().take(5) {
            println!("    {} {} {}", record.processed_date, record.key, record.review_url);
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn run(config: AppConfig, dry_run: bool) -> Result<ExitCode> {
    if dry_run {
        tracing::info!("Dry run: configuration loaded, nothing executed");
        return Ok(ExitCode::SUCCESS);
    }

    let ctx = StageContext::new(config)?;
    let summary = Pipeline::standard().run(&ctx);
    ctx.gateway.shutdown();

    println!("{}", serde_json::to_string_pretty(&summary)?);
    if summary.success {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}

/// Environment self-check: tool servers reachable, repository present,
/// ledgers readable. Reports every problem rather than stopping at the first.
fn self_check(config: &AppConfig) -> Result<ExitCode> {
    let mut ok = true;

    let ctx = StageContext::new(config.clone())?;
    for server in config.enabled_servers().keys() {
        match ctx.gateway.list_tools(server) {
            Ok(tools) => println!("ok    tool server {server}: {} tools", tools.len()),
            Err(e) => {
                ok = false;
                println!("FAIL  tool server {server}: {e}");
            }
        }
    }
    ctx.gateway.shutdown();

    if workspace::has_vcs_root(&config.git.repo_path) {
        println!("ok    repository {}", config.git.repo_path.display());
    } else {
        ok = false;
        println!(
            "FAIL  no repository at {}",
            config.git.repo_path.display()
        );
    }

    let processed = ProcessedLedger::new(&config.paths.processed_ledger).load();
    println!("ok    processed ledger: {} records", processed.len());

    Ok(if ok { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}

fn reset(config: &AppConfig, yes: bool) -> Result<ExitCode> {
    if !yes && !confirm("Clear the processed-finding ledger? [y/N] ")? {
        println!("Aborted.");
        return Ok(ExitCode::SUCCESS);
    }

    ProcessedLedger::new(&config.paths.processed_ledger).reset()?;
    println!("Processed ledger cleared.");
    Ok(ExitCode::SUCCESS)
}

fn confirm(prompt: &str) -> Result<bool> {
    print!("{prompt}");
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    Ok(matches!(line.trim(), "y" | "Y" | "yes"))
}
