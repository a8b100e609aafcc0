//! CLI for cross-environment migrations
//!
//! Logs go to stderr; stdout carries a single JSON response line so the
//! result can be parsed by scripts.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use migrator_core::config::topology_from_env;
use migrator_core::modes::RunPhase;
use migrator_core::report::RunStats;
use migrator_core::{MigrationConfig, MigrationEngine, RunResult};
use serde::Serialize;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "migrate_env")]
#[command(about = "Migrate document-store data between environments")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyse what a full run would do, without writing
    DryRun,

    /// Migrate a few records of one table (and one of each parent)
    Test {
        #[arg(long)]
        table: String,
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Migrate every table; rolls back on failure
    Full {
        #[arg(long)]
        confirm: bool,
    },

    /// Replay rollback journals left by interrupted runs
    Recover,

    /// Print the resolved table order
    Topology,
}

// ============================================================================
// JSON Response Types
// ============================================================================

#[derive(Serialize)]
struct Response {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    run_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stats: Option<RunStats>,
    #[serde(skip_serializing_if = "Option::is_none")]
    phase: Option<RunPhase>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    artifacts: Vec<PathBuf>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tables: Vec<TableInfo>,
}

impl Response {
    fn from_run(run: &RunResult) -> Self {
        Self {
            success: run.succeeded(),
            message: run.error.as_ref().map(|e| e.to_string()),
            run_id: Some(run.report.run_id.to_string()),
            stats: Some(run.report.stats.clone()),
            phase: None,
            artifacts: vec![run.report_path.clone()],
            tables: Vec::new(),
        }
    }
}

#[derive(Serialize)]
struct TableInfo {
    name: String,
    level: u32,
    foreign_keys: Vec<String>,
}

fn output(resp: &Response) -> Result<()> {
    println!("{}", serde_json::to_string(resp)?);
    Ok(())
}

/// Print the response, then turn a failed run into a non-zero exit.
fn finish(resp: Response) -> Result<()> {
    output(&resp)?;
    if resp.success {
        Ok(())
    } else {
        anyhow::bail!(resp.message.unwrap_or_else(|| "migration failed".to_string()))
    }
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,migrator_core=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    if let Commands::Topology = cli.command {
        return cmd_topology();
    }

    let config = MigrationConfig::from_env().context("Failed to load configuration")?;
    let engine = MigrationEngine::from_config(&config)?;
    match cli.command {
        Commands::DryRun => cmd_dry_run(&engine).await,
        Commands::Test { table, limit } => cmd_test(&engine, &table, limit).await,
        Commands::Full { confirm } => cmd_full(&engine, confirm).await,
        Commands::Recover => cmd_recover(&engine).await,
        Commands::Topology => cmd_topology(),
    }
}

// ============================================================================
// Commands
// ============================================================================

fn cmd_topology() -> Result<()> {
    let topology = topology_from_env()?;
    let tables = topology
        .descriptors()
        .iter()
        .map(|t| TableInfo {
            name: t.name.clone(),
            level: t.level,
            foreign_keys: t.foreign_keys.clone(),
        })
        .collect();

    output(&Response {
        success: true,
        message: Some(topology.order().join(" -> ")),
        run_id: None,
        stats: None,
        phase: None,
        artifacts: Vec::new(),
        tables,
    })
}

async fn cmd_dry_run(engine: &MigrationEngine) -> Result<()> {
    let result = engine.dry_run().await?;
    let mut resp = Response::from_run(&result.run);
    if let Some(analysis) = &result.analysis {
        resp.message = Some(format!(
            "{} records, {} relationships, ~{:.0}s estimated",
            analysis.total_items, analysis.total_relationships, analysis.estimated_duration_secs
        ));
    }
    resp.artifacts.extend(result.analysis_path);
    finish(resp)
}

async fn cmd_test(engine: &MigrationEngine, table: &str, limit: Option<usize>) -> Result<()> {
    let result = engine.test_table(table, limit).await?;
    finish(Response::from_run(&result))
}

async fn cmd_full(engine: &MigrationEngine, confirm: bool) -> Result<()> {
    if !confirm {
        return finish(Response {
            success: false,
            message: Some("Full migration writes to the target; re-run with --confirm".to_string()),
            run_id: None,
            stats: None,
            phase: None,
            artifacts: Vec::new(),
            tables: Vec::new(),
        });
    }

    let result = engine.run_full(confirm).await?;
    let mut resp = Response::from_run(&result.run);
    resp.phase = Some(result.phase);
    finish(resp)
}

async fn cmd_recover(engine: &MigrationEngine) -> Result<()> {
    let result = engine.recover().await?;
    let mut resp = Response::from_run(&result);
    if let Some(summary) = &result.report.rollback {
        resp.message.get_or_insert_with(|| {
            format!("Deleted {} of {} journaled writes", summary.deleted, summary.attempted)
        });
    }
    finish(resp)
}
