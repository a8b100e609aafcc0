use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::config::EngineSettings;
use crate::environment::Environment;
use crate::identity::IdentityMapper;
use crate::integrity::IntegrityReport;
use crate::preflight::PreflightReport;
use crate::report::{EventLog, RunMode, RunOutcome, RunReport, RunStats, TableStats};
use crate::rollback::{RollbackManager, RollbackSummary};
use crate::topology::Topology;

/// Read-only inputs shared by every component of a run.
#[derive(Debug, Clone, Copy)]
pub struct MigrationContext<'a> {
    pub settings: &'a EngineSettings,
    pub topology: &'a Topology,
    pub source: &'a Environment,
    pub target: &'a Environment,
}

/// Mutable state owned by exactly one run.
#[derive(Debug)]
pub struct RunState {
    pub run_id: Uuid,
    pub mode: RunMode,
    pub started_at: DateTime<Utc>,
    pub mapper: IdentityMapper,
    pub rollback: RollbackManager,
    pub events: EventLog,
    pub tables: Vec<TableStats>,
    pub preflight: Option<PreflightReport>,
    pub integrity: Option<IntegrityReport>,
    pub rollback_summary: Option<RollbackSummary>,
}

impl RunState {
    pub fn new(mode: RunMode, target_env: &str, rollback: RollbackManager) -> Self {
        Self::with_run_id(Uuid::now_v7(), mode, target_env, rollback)
    }

    pub fn with_run_id(
        run_id: Uuid,
        mode: RunMode,
        target_env: &str,
        rollback: RollbackManager,
    ) -> Self {
        Self {
            run_id,
            mode,
            started_at: Utc::now(),
            mapper: IdentityMapper::new(target_env),
            rollback,
            events: EventLog::new(),
            tables: Vec::new(),
            preflight: None,
            integrity: None,
            rollback_summary: None,
        }
    }

    /// Fold the finished run into its report.
    pub fn into_report(self, ctx: &MigrationContext<'_>, outcome: RunOutcome) -> RunReport {
        let finished_at = Utc::now();
        let stats = RunStats::aggregate(&self.tables, &self.events);
        RunReport {
            run_id: self.run_id,
            mode: self.mode,
            source_env: ctx.source.name().to_string(),
            target_env: ctx.target.name().to_string(),
            started_at: self.started_at,
            finished_at,
            duration_ms: (finished_at - self.started_at).num_milliseconds().max(0) as u64,
            outcome,
            stats,
            tables: self.tables,
            preflight: self.preflight,
            integrity: self.integrity,
            rollback: self.rollback_summary,
            mappings: self.mapper.all(),
            events: self.events.into_events(),
        }
    }
}
