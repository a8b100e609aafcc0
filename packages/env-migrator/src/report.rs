//! Run statistics, structured event log and the final run report.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::identity::MappingEntry;
use crate::integrity::IntegrityReport;
use crate::preflight::PreflightReport;
use crate::rollback::RollbackSummary;
use crate::validation::ValidationOutcome;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventLevel {
    Info,
    Warn,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunEvent {
    pub at: DateTime<Utc>,
    pub level: EventLevel,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,
    pub message: String,
}

/// Structured log kept for the report. Every entry is mirrored to `tracing`.
#[derive(Debug, Default)]
pub struct EventLog {
    events: Vec<RunEvent>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&mut self, level: EventLevel, table: Option<&str>, message: String) {
        let table_name = table.unwrap_or("-");
        match level {
            EventLevel::Info => info!(table = table_name, "{}", message),
            EventLevel::Warn => warn!(table = table_name, "{}", message),
            EventLevel::Error => error!(table = table_name, "{}", message),
        }
        self.events.push(RunEvent {
            at: Utc::now(),
            level,
            table: table.map(str::to_string),
            message,
        });
    }

    pub fn info(&mut self, table: Option<&str>, message: impl Into<String>) {
        self.record(EventLevel::Info, table, message.into());
    }

    pub fn warn(&mut self, table: Option<&str>, message: impl Into<String>) {
        self.record(EventLevel::Warn, table, message.into());
    }

    pub fn error(&mut self, table: Option<&str>, message: impl Into<String>) {
        self.record(EventLevel::Error, table, message.into());
    }

    pub fn events(&self) -> &[RunEvent] {
        &self.events
    }

    pub fn count(&self, level: EventLevel) -> usize {
        self.events.iter().filter(|e| e.level == level).count()
    }

    pub fn into_events(self) -> Vec<RunEvent> {
        self.events
    }
}

/// Per-table counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableStats {
    pub table: String,
    pub scanned: usize,
    pub migrated: usize,
    pub skipped_existing: usize,
    pub failed: usize,
    pub relationships_preserved: usize,
    pub unresolved_relationships: usize,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validation: Option<ValidationOutcome>,
}

impl TableStats {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            ..Self::default()
        }
    }
}

/// Aggregate counters across all tables.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunStats {
    pub tables_processed: usize,
    pub records_migrated: usize,
    pub records_skipped: usize,
    pub relationships_preserved: usize,
    pub errors: usize,
    pub warnings: usize,
}

impl RunStats {
    pub fn aggregate(tables: &[TableStats], events: &EventLog) -> Self {
        let failed_records: usize = tables.iter().map(|t| t.failed).sum();
        Self {
            tables_processed: tables.len(),
            records_migrated: tables.iter().map(|t| t.migrated).sum(),
            records_skipped: tables.iter().map(|t| t.skipped_existing).sum(),
            relationships_preserved: tables.iter().map(|t| t.relationships_preserved).sum(),
            errors: failed_records + events.count(EventLevel::Error),
            warnings: events.count(EventLevel::Warn),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RunMode {
    DryRun,
    Test,
    Full,
    Recover,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "kebab-case")]
pub enum RunOutcome {
    Succeeded,
    Failed { category: String, error: String },
    RolledBack { category: String, error: String },
    /// The run failed and some of its writes could not be undone
    RollbackIncomplete {
        category: String,
        error: String,
        remaining: usize,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    pub run_id: Uuid,
    pub mode: RunMode,
    pub source_env: String,
    pub target_env: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub outcome: RunOutcome,
    pub stats: RunStats,
    pub tables: Vec<TableStats>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preflight: Option<PreflightReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub integrity: Option<IntegrityReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rollback: Option<RollbackSummary>,
    pub mappings: Vec<MappingEntry>,
    pub events: Vec<RunEvent>,
}

impl RunReport {
    pub fn succeeded(&self) -> bool {
        self.outcome == RunOutcome::Succeeded
    }
}
