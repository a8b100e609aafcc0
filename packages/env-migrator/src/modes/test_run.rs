//! Single-table rehearsal against the real target.
//!
//! The first `limit` records of the chosen table are read, then every parent
//! record they reference is fetched from the source and written first,
//! deepest first, unless the run already mapped it. Writes from a test run
//! are kept; nothing is rolled back.

use std::collections::{BTreeMap, HashSet};
use std::time::Instant;

use crate::context::{MigrationContext, RunState};
use crate::error::{MigrationError, Result};
use crate::migrator::{migrate_record, MigratedRecord};
use crate::preflight::run_preflight;
use crate::report::TableStats;
use crate::store::{scalar_key, Item, ScanRequest};
use crate::topology::Topology;
use crate::transform::RecordTransformer;
use crate::validation::validate_records;

pub const DEFAULT_TEST_LIMIT: usize = 1;

/// `(referenced table, source id)` for every non-null foreign key of `item`,
/// in the table's declared field order.
pub fn referenced_records(topology: &Topology, table: &str, item: &Item) -> Vec<(String, String)> {
    topology
        .foreign_keys_of(table)
        .iter()
        .filter_map(|field| {
            let referenced = topology.referenced_table(field)?;
            let id = item.get(field).and_then(scalar_key)?;
            Some((referenced.to_string(), id))
        })
        .collect()
}

enum Step {
    Fetch { table: String, id: String },
    Write { table: String, item: Item },
}

pub async fn run_test(
    ctx: &MigrationContext<'_>,
    state: &mut RunState,
    table: &str,
    limit: Option<usize>,
) -> Result<()> {
    if !ctx.topology.contains(table) {
        return Err(MigrationError::UnknownTable(table.to_string()));
    }

    state.preflight = Some(run_preflight(ctx, &mut state.events).await?);

    let limit = limit.unwrap_or(DEFAULT_TEST_LIMIT);
    let records = read_source(ctx, table, limit).await?;

    let mut parents = BTreeMap::new();
    let seeded = seed_parents(ctx, state, table, &records, &mut parents).await;
    flush_parent_stats(ctx.topology, state, parents);
    seeded?;

    let (mut stats, written) = write_records(ctx, state, table, records).await?;
    let validation = validate_records(ctx, table, &written, &mut state.events).await;
    match validation {
        Ok(outcome) => {
            stats.validation = Some(outcome);
            state.tables.push(stats);
            Ok(())
        }
        Err(e) => {
            state.tables.push(stats);
            Err(e)
        }
    }
}

async fn read_source(ctx: &MigrationContext<'_>, table: &str, limit: usize) -> Result<Vec<Item>> {
    let mut items = Vec::new();
    let mut page_token = None;
    while items.len() < limit {
        let page = ctx
            .source
            .scan(
                table,
                ScanRequest {
                    limit: Some((limit - items.len()).min(ctx.settings.page_size)),
                    page_token: page_token.take(),
                },
            )
            .await
            .map_err(|source| MigrationError::Store {
                env: ctx.source.name().to_string(),
                table: table.to_string(),
                source,
            })?;
        items.extend(page.items);
        match page.next_page_token {
            Some(token) => page_token = Some(token),
            None => break,
        }
    }
    items.truncate(limit);
    Ok(items)
}

/// Write every parent record reachable from `records`, each after its own
/// parents. Strict level ordering rules out cycles.
async fn seed_parents(
    ctx: &MigrationContext<'_>,
    state: &mut RunState,
    table: &str,
    records: &[Item],
    parents: &mut BTreeMap<String, TableStats>,
) -> Result<()> {
    let transformer = RecordTransformer::new(ctx.topology, ctx.settings);
    let mut planned: HashSet<(String, String)> = HashSet::new();
    let mut steps: Vec<Step> = records
        .iter()
        .rev()
        .flat_map(|item| referenced_records(ctx.topology, table, item).into_iter().rev())
        .map(|(table, id)| Step::Fetch { table, id })
        .collect();

    while let Some(step) = steps.pop() {
        match step {
            Step::Fetch { table: parent, id } => {
                if state.mapper.lookup(&parent, &id).is_some()
                    || !planned.insert((parent.clone(), id.clone()))
                {
                    continue;
                }
                let found = ctx.source.get(&parent, &id).await.map_err(|source| {
                    MigrationError::Store {
                        env: ctx.source.name().to_string(),
                        table: parent.clone(),
                        source,
                    }
                })?;
                let Some(item) = found else {
                    state.events.warn(
                        Some(&parent),
                        format!("Referenced record '{}' is not in the source; not seeded", id),
                    );
                    continue;
                };
                let grandparents = referenced_records(ctx.topology, &parent, &item);
                steps.push(Step::Write {
                    table: parent,
                    item,
                });
                steps.extend(
                    grandparents
                        .into_iter()
                        .rev()
                        .map(|(table, id)| Step::Fetch { table, id }),
                );
            }
            Step::Write { table: parent, item } => {
                state.events.info(
                    Some(&parent),
                    format!("Seeding referenced '{}' record for '{}'", parent, table),
                );
                let stats = parents
                    .entry(parent.clone())
                    .or_insert_with(|| TableStats::new(parent.as_str()));
                let started = Instant::now();
                let written = migrate_record(ctx, state, &transformer, &parent, item, stats).await;
                stats.duration_ms += started.elapsed().as_millis() as u64;
                written?;
            }
        }
    }
    Ok(())
}

async fn write_records(
    ctx: &MigrationContext<'_>,
    state: &mut RunState,
    table: &str,
    records: Vec<Item>,
) -> Result<(TableStats, Vec<MigratedRecord>)> {
    let transformer = RecordTransformer::new(ctx.topology, ctx.settings);
    let started = Instant::now();
    let mut stats = TableStats::new(table);
    let mut written = Vec::new();

    for item in records {
        match migrate_record(ctx, state, &transformer, table, item, &mut stats).await {
            Ok(Some(record)) => written.push(record),
            Ok(None) => {}
            Err(e) => {
                stats.duration_ms = started.elapsed().as_millis() as u64;
                state.tables.push(stats);
                return Err(e);
            }
        }
    }
    stats.duration_ms = started.elapsed().as_millis() as u64;
    Ok((stats, written))
}

/// Parent stats go into the report ahead of the tested table, in topology
/// order.
fn flush_parent_stats(topology: &Topology, state: &mut RunState, mut parents: BTreeMap<String, TableStats>) {
    for table in topology.order() {
        if let Some(stats) = parents.remove(table) {
            state.tables.push(stats);
        }
    }
}
