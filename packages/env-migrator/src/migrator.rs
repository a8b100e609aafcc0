use std::time::Instant;

use chrono::Utc;
use tracing::{debug, info};

use crate::context::{MigrationContext, RunState};
use crate::error::{MigrationError, Result};
use crate::report::TableStats;
use crate::rollback::RollbackEntry;
use crate::store::{Item, PutOutcome, ScanRequest};
use crate::transform::RecordTransformer;

/// Log progress every this many scanned records.
const PROGRESS_INTERVAL: usize = 100;

/// A source record and the target record written for it.
#[derive(Debug, Clone)]
pub struct MigratedRecord {
    pub source: Item,
    pub target: Item,
    pub target_id: String,
}

#[derive(Debug, Clone, Default)]
pub struct TableMigration {
    pub stats: TableStats,
    /// Records written by this call; kept only for validation
    pub records: Vec<MigratedRecord>,
}

/// Copy up to `limit` records (all if `None`) of `table` from source to target.
///
/// Conflicts with records already in the target are skipped. Any other write
/// failure aborts with [`MigrationError::WriteFailed`], and a journal failure
/// after a write aborts with that error. In both cases the rollback log in
/// `state` still holds every write that succeeded, and the partial table
/// stats are appended to `state.tables`. On success the caller owns the
/// returned stats.
pub async fn migrate_table(
    ctx: &MigrationContext<'_>,
    state: &mut RunState,
    table: &str,
    limit: Option<usize>,
) -> Result<TableMigration> {
    if !ctx.topology.contains(table) {
        return Err(MigrationError::UnknownTable(table.to_string()));
    }

    let started = Instant::now();
    let transformer = RecordTransformer::new(ctx.topology, ctx.settings);
    let mut migration = TableMigration {
        stats: TableStats::new(table),
        records: Vec::new(),
    };
    let mut remaining = limit;
    let mut page_token = None;

    info!(table, limit = ?limit, "Migrating table");

    loop {
        let page_limit = match remaining {
            Some(0) => break,
            Some(n) => n.min(ctx.settings.page_size),
            None => ctx.settings.page_size,
        };
        let page = ctx
            .source
            .scan(
                table,
                ScanRequest {
                    limit: Some(page_limit),
                    page_token: page_token.take(),
                },
            )
            .await
            .map_err(|source| MigrationError::Store {
                env: ctx.source.name().to_string(),
                table: table.to_string(),
                source,
            })?;

        for item in page.items {
            if remaining == Some(0) {
                break;
            }
            if let Some(n) = remaining.as_mut() {
                *n -= 1;
            }

            match migrate_record(ctx, state, &transformer, table, item, &mut migration.stats).await {
                Ok(Some(record)) => migration.records.push(record),
                Ok(None) => {}
                Err(e) => {
                    migration.stats.duration_ms = started.elapsed().as_millis() as u64;
                    state.tables.push(migration.stats);
                    return Err(e);
                }
            }

            let stats = &migration.stats;
            if stats.scanned % PROGRESS_INTERVAL == 0 {
                info!(table, scanned = stats.scanned, migrated = stats.migrated, "Progress");
            }
        }

        match page.next_page_token {
            Some(token) => page_token = Some(token),
            None => break,
        }
    }

    let stats = &mut migration.stats;
    stats.duration_ms = started.elapsed().as_millis() as u64;
    info!(
        table,
        scanned = stats.scanned,
        migrated = stats.migrated,
        skipped = stats.skipped_existing,
        failed = stats.failed,
        relationships = stats.relationships_preserved,
        "Table migrated"
    );
    Ok(migration)
}

/// Transform one source record of `table` and write it to the target.
///
/// Returns the written record, or `None` when it was skipped (unusable
/// source record, or already present in the target). Counters in `stats`
/// are updated either way, including for a write whose journal append
/// failed.
pub async fn migrate_record(
    ctx: &MigrationContext<'_>,
    state: &mut RunState,
    transformer: &RecordTransformer<'_>,
    table: &str,
    item: Item,
    stats: &mut TableStats,
) -> Result<Option<MigratedRecord>> {
    stats.scanned += 1;

    let record = match transformer.transform(table, &item, &mut state.mapper, Utc::now()) {
        Ok(record) => record,
        Err(e) => {
            stats.failed += 1;
            state.events.warn(Some(table), format!("Skipping record: {}", e));
            return Ok(None);
        }
    };
    for missing in &record.unresolved {
        state.events.warn(
            Some(table),
            format!(
                "Unresolved {} '{}' on record {}; left unchanged",
                missing.field, missing.value, record.source_id
            ),
        );
    }

    match ctx.target.put_if_absent(table, &record.target_id, &record.item).await {
        Ok(PutOutcome::Written) => {
            stats.migrated += 1;
            stats.relationships_preserved += record.resolved;
            stats.unresolved_relationships += record.unresolved.len();
            state
                .rollback
                .push(RollbackEntry::delete(table, record.target_id.as_str()))?;
            Ok(Some(MigratedRecord {
                source: item,
                target: record.item,
                target_id: record.target_id,
            }))
        }
        Ok(PutOutcome::AlreadyExists) => {
            debug!(table, target_id = %record.target_id, "Record already present, skipping");
            stats.skipped_existing += 1;
            Ok(None)
        }
        Err(source) => {
            state.events.error(
                Some(table),
                format!("Write of {} failed: {}", record.target_id, source),
            );
            Err(MigrationError::WriteFailed {
                table: table.to_string(),
                id: record.target_id,
                source,
            })
        }
    }
}
