//! Entry point tying configuration, environments and artifacts together.
//!
//! Every mode produces a `RunReport` that is written to the artifact
//! directory whatever the outcome. A failed run still returns `Ok`; the
//! failure is carried in [`RunResult::error`] and the report's outcome.
//! `Err` is reserved for failures that prevent a report from being written
//! (and for an unconfirmed full run, which never starts).

use std::path::PathBuf;

use anyhow::Context;
use tracing::info;

use crate::artifacts::{self, ArtifactStore};
use crate::config::{EngineSettings, MigrationConfig};
use crate::context::{MigrationContext, RunState};
use crate::environment::Environment;
use crate::error::{MigrationError, Result};
use crate::modes::{self, DryRunAnalysis, FullMigration, RunPhase};
use crate::report::{RunMode, RunOutcome, RunReport};
use crate::rollback::{recover_pending, RollbackManager, RollbackSummary};
use crate::topology::Topology;

#[derive(Debug)]
pub struct RunResult {
    pub report: RunReport,
    pub report_path: PathBuf,
    /// The fatal error that ended the run, if any
    pub error: Option<MigrationError>,
}

impl RunResult {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

#[derive(Debug)]
pub struct DryRunResult {
    pub run: RunResult,
    pub analysis: Option<DryRunAnalysis>,
    pub analysis_path: Option<PathBuf>,
}

#[derive(Debug)]
pub struct FullRunResult {
    pub run: RunResult,
    pub phase: RunPhase,
}

pub struct MigrationEngine {
    settings: EngineSettings,
    topology: Topology,
    source: Environment,
    target: Environment,
    artifacts: ArtifactStore,
}

impl MigrationEngine {
    pub fn new(
        settings: EngineSettings,
        topology: Topology,
        source: Environment,
        target: Environment,
        artifacts: ArtifactStore,
    ) -> Self {
        Self {
            settings,
            topology,
            source,
            target,
            artifacts,
        }
    }

    /// Connect both environments over REST and load the topology.
    pub fn from_config(config: &MigrationConfig) -> anyhow::Result<Self> {
        let topology = config.load_topology()?;
        let timeout = config.settings.store_timeout;
        let artifacts = ArtifactStore::new(config.artifact_dir.clone());
        artifacts
            .ensure_dir()
            .with_context(|| format!("Failed to create {}", config.artifact_dir.display()))?;

        Ok(Self::new(
            config.settings.clone(),
            topology,
            config.source.connect(timeout),
            config.target.connect(timeout),
            artifacts,
        ))
    }

    pub fn context(&self) -> MigrationContext<'_> {
        MigrationContext {
            settings: &self.settings,
            topology: &self.topology,
            source: &self.source,
            target: &self.target,
        }
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    pub fn artifacts(&self) -> &ArtifactStore {
        &self.artifacts
    }

    fn start(&self, mode: RunMode) -> RunState {
        let state = RunState::new(mode, self.target.name(), RollbackManager::in_memory());
        info!(
            run_id = %state.run_id,
            mode = ?mode,
            source = self.source.name(),
            target = self.target.name(),
            "Starting run"
        );
        state
    }

    fn finish(&self, state: RunState, result: Result<()>) -> Result<RunResult> {
        let ctx = self.context();
        let rollback = state
            .rollback_summary
            .as_ref()
            .filter(|_| state.mode == RunMode::Full);
        let outcome = match (&result, rollback) {
            (Ok(()), _) => RunOutcome::Succeeded,
            (Err(e), Some(summary)) if summary.is_complete() => RunOutcome::RolledBack {
                category: e.category().to_string(),
                error: e.to_string(),
            },
            (Err(e), Some(summary)) => RunOutcome::RollbackIncomplete {
                category: e.category().to_string(),
                error: e.to_string(),
                remaining: summary.failures.len(),
            },
            (Err(e), None) => RunOutcome::Failed {
                category: e.category().to_string(),
                error: e.to_string(),
            },
        };
        let report = state.into_report(&ctx, outcome);
        let report_path = self
            .artifacts
            .write_json(artifacts::REPORT, report.run_id, &report)?;
        info!(
            run_id = %report.run_id,
            outcome = ?report.outcome,
            migrated = report.stats.records_migrated,
            warnings = report.stats.warnings,
            path = %report_path.display(),
            "Run finished"
        );
        Ok(RunResult {
            report,
            report_path,
            error: result.err(),
        })
    }

    /// Analyse the migration without writing to the target.
    pub async fn dry_run(&self) -> Result<DryRunResult> {
        let ctx = self.context();
        let mut state = self.start(RunMode::DryRun);

        let (analysis, analysis_path, result) = match modes::analyze(&ctx, &mut state).await {
            Ok(analysis) => {
                match self
                    .artifacts
                    .write_json(artifacts::DRY_RUN, state.run_id, &analysis)
                {
                    Ok(path) => (Some(analysis), Some(path), Ok(())),
                    Err(e) => (Some(analysis), None, Err(e)),
                }
            }
            Err(e) => (None, None, Err(e)),
        };

        Ok(DryRunResult {
            run: self.finish(state, result)?,
            analysis,
            analysis_path,
        })
    }

    /// Migrate up to `limit` records of one table (default one) plus one
    /// record of each parent table it needs.
    pub async fn test_table(&self, table: &str, limit: Option<usize>) -> Result<RunResult> {
        let ctx = self.context();
        let mut state = self.start(RunMode::Test);
        let result = modes::run_test(&ctx, &mut state, table, limit).await;
        self.finish(state, result)
    }

    /// Migrate every table. Refuses to start unless `confirmed`.
    pub async fn run_full(&self, confirmed: bool) -> Result<FullRunResult> {
        modes::require_confirmation(confirmed)?;

        let ctx = self.context();
        let mut state = self.start(RunMode::Full);
        let mut orchestrator = FullMigration::new(&ctx, &self.artifacts);
        let result = orchestrator.run(&mut state).await;
        let phase = orchestrator.phase().clone();

        Ok(FullRunResult {
            run: self.finish(state, result)?,
            phase,
        })
    }

    /// Replay rollback journals left behind by interrupted full runs.
    pub async fn recover(&self) -> Result<RunResult> {
        let mut state = self.start(RunMode::Recover);
        let result = match recover_pending(&self.artifacts, &self.target, &mut state.events).await {
            Ok(summaries) => {
                let merged = merge_summaries(summaries);
                let incomplete = merged.failures.len();
                state.rollback_summary = Some(merged);
                if incomplete == 0 {
                    Ok(())
                } else {
                    Err(MigrationError::RollbackIncomplete { failures: incomplete })
                }
            }
            Err(e) => Err(e),
        };
        self.finish(state, result)
    }
}

fn merge_summaries(summaries: Vec<RollbackSummary>) -> RollbackSummary {
    summaries
        .into_iter()
        .fold(RollbackSummary::default(), |mut merged, summary| {
            merged.attempted += summary.attempted;
            merged.deleted += summary.deleted;
            merged.failures.extend(summary.failures);
            merged
        })
}
