//! Full migration of every registered table, in dependency order.
//!
//! Validating -> Migrating(table)... -> IntegrityChecking -> Reporting ->
//! Completed. Any fatal error after the first write rolls back every write
//! this run made and ends in RolledBack, or stays Failed if some deletes
//! did not go through. A fatal error before the first write ends in Failed.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::artifacts::{self, ArtifactStore};
use crate::context::{MigrationContext, RunState};
use crate::error::{MigrationError, Result};
use crate::integrity::{check_integrity, reconcile_counts};
use crate::migrator::migrate_table;
use crate::preflight::run_preflight;
use crate::rollback::{RollbackJournal, RollbackManager};
use crate::validation::validate_records;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "phase", rename_all = "kebab-case")]
pub enum RunPhase {
    Validating,
    Migrating { table: String },
    IntegrityChecking,
    Reporting,
    Failed,
    RolledBack,
    Completed,
}

/// Written after pre-flight, before the first write.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Checkpoint {
    pub run_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub source_env: String,
    pub target_env: String,
    pub tables: Vec<String>,
    pub source_counts: BTreeMap<String, u64>,
    pub target_counts: BTreeMap<String, u64>,
}

pub struct FullMigration<'c, 'a> {
    ctx: &'c MigrationContext<'a>,
    artifacts: &'c ArtifactStore,
    phase: RunPhase,
}

impl<'c, 'a> FullMigration<'c, 'a> {
    pub fn new(ctx: &'c MigrationContext<'a>, artifacts: &'c ArtifactStore) -> Self {
        Self {
            ctx,
            artifacts,
            phase: RunPhase::Validating,
        }
    }

    pub fn phase(&self) -> &RunPhase {
        &self.phase
    }

    fn enter(&mut self, phase: RunPhase) {
        info!(from = ?self.phase, to = ?phase, "Phase transition");
        self.phase = phase;
    }

    pub async fn run(&mut self, state: &mut RunState) -> Result<()> {
        self.enter(RunPhase::Validating);
        if let Err(e) = self.prepare(state).await {
            state.events.error(None, format!("Full migration aborted before writing: {}", e));
            self.enter(RunPhase::Failed);
            return Err(e);
        }

        match self.migrate_all(state).await {
            Ok(()) => {
                self.enter(RunPhase::IntegrityChecking);
                let mut integrity = check_integrity(self.ctx, &mut state.events).await;
                if let Some(preflight) = &state.preflight {
                    integrity.counts =
                        reconcile_counts(self.ctx, &state.tables, preflight, &mut state.events).await;
                }
                state.integrity = Some(integrity);

                self.enter(RunPhase::Reporting);
                if let Err(e) = state.rollback.finish() {
                    // The data is in place; only the journal's closing line is missing.
                    state
                        .events
                        .warn(None, format!("Could not close rollback journal: {}", e));
                }
                state.events.info(
                    None,
                    format!(
                        "Full migration completed: {} records across {} tables",
                        state.tables.iter().map(|t| t.migrated).sum::<usize>(),
                        state.tables.len()
                    ),
                );
                self.enter(RunPhase::Completed);
                Ok(())
            }
            Err(e) => {
                state.events.error(None, format!("Full migration failed: {}", e));
                self.enter(RunPhase::Failed);
                let summary = state.rollback.rollback(self.ctx.target, &mut state.events).await;
                if summary.is_complete() {
                    self.enter(RunPhase::RolledBack);
                }
                state.rollback_summary = Some(summary);
                Err(e)
            }
        }
    }

    /// Pre-flight, checkpoint and journal. Nothing has been written yet.
    async fn prepare(&mut self, state: &mut RunState) -> Result<()> {
        let preflight = run_preflight(self.ctx, &mut state.events).await?;

        let checkpoint = Checkpoint {
            run_id: state.run_id,
            created_at: Utc::now(),
            source_env: self.ctx.source.name().to_string(),
            target_env: self.ctx.target.name().to_string(),
            tables: self.ctx.topology.order().iter().map(|t| t.to_string()).collect(),
            source_counts: preflight.source_counts.clone(),
            target_counts: preflight.target_counts.clone(),
        };
        state.preflight = Some(preflight);
        let path = self
            .artifacts
            .write_json(artifacts::CHECKPOINT, state.run_id, &checkpoint)?;
        state
            .events
            .info(None, format!("Checkpoint written to {}", path.display()));

        let journal = RollbackJournal::create(self.artifacts, state.run_id, self.ctx.target.name())?;
        state
            .events
            .info(None, format!("Rollback journal at {}", journal.path().display()));
        state.rollback = RollbackManager::with_journal(journal);
        Ok(())
    }

    async fn migrate_all(&mut self, state: &mut RunState) -> Result<()> {
        let ctx = self.ctx;
        for table in ctx.topology.order() {
            self.enter(RunPhase::Migrating {
                table: table.to_string(),
            });
            let migration = migrate_table(ctx, state, table, None).await?;
            let mut stats = migration.stats;
            match validate_records(ctx, table, &migration.records, &mut state.events).await {
                Ok(outcome) => {
                    stats.validation = Some(outcome);
                    state.tables.push(stats);
                }
                Err(e) => {
                    state.tables.push(stats);
                    return Err(e);
                }
            }
        }
        Ok(())
    }
}

/// Refuse to start a full run without explicit confirmation.
pub fn require_confirmation(confirmed: bool) -> Result<()> {
    if confirmed {
        Ok(())
    } else {
        Err(MigrationError::NotConfirmed)
    }
}
