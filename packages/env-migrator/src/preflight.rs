//! Pre-flight checks gating every mode.
//!
//! 1. Environment access: both sides answer a describe call (fatal).
//! 2. Table structure: every registered table exists on both sides (fatal).
//! 3. Source integrity sampling: shallow foreign-key field presence (warn).
//! 4. Target state: pre-existing target records (warn).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::context::MigrationContext;
use crate::environment::Environment;
use crate::error::{MigrationError, Result};
use crate::report::EventLog;
use crate::store::ScanRequest;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PreflightCheck {
    EnvironmentAccess,
    TableStructure,
    SourceIntegrity,
    TargetState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum CheckStatus {
    Passed,
    Warned { findings: usize },
}

impl CheckStatus {
    fn from_findings(findings: usize) -> Self {
        if findings == 0 {
            CheckStatus::Passed
        } else {
            CheckStatus::Warned { findings }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckResult {
    pub check: PreflightCheck,
    pub status: CheckStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreflightReport {
    pub checks: Vec<CheckResult>,
    pub source_counts: BTreeMap<String, u64>,
    pub target_counts: BTreeMap<String, u64>,
    /// Sampled source items lacking a declared foreign key, per `table.field`
    pub missing_foreign_keys: BTreeMap<String, usize>,
}

impl PreflightReport {
    fn record(&mut self, check: PreflightCheck, status: CheckStatus) {
        self.checks.push(CheckResult { check, status });
    }

    pub fn warnings(&self) -> usize {
        self.checks
            .iter()
            .map(|c| match c.status {
                CheckStatus::Passed => 0,
                CheckStatus::Warned { findings } => findings,
            })
            .sum()
    }
}

pub async fn run_preflight(ctx: &MigrationContext<'_>, events: &mut EventLog) -> Result<PreflightReport> {
    let mut report = PreflightReport::default();

    check_environment_access(ctx, events).await?;
    report.record(PreflightCheck::EnvironmentAccess, CheckStatus::Passed);

    check_table_structure(ctx, &mut report, events).await?;
    report.record(PreflightCheck::TableStructure, CheckStatus::Passed);

    let findings = sample_source_integrity(ctx, &mut report, events).await?;
    report.record(PreflightCheck::SourceIntegrity, CheckStatus::from_findings(findings));

    let findings = inspect_target_state(&report, events);
    report.record(PreflightCheck::TargetState, CheckStatus::from_findings(findings));

    events.info(
        None,
        format!("Pre-flight passed with {} warnings", report.warnings()),
    );
    Ok(report)
}

async fn check_environment_access(ctx: &MigrationContext<'_>, events: &mut EventLog) -> Result<()> {
    let first = ctx
        .topology
        .order()
        .first()
        .map(|t| t.to_string())
        .ok_or_else(|| MigrationError::InvalidTopology("no tables registered".into()))?;

    for env in [ctx.source, ctx.target] {
        if let Err(source) = env.describe(&first).await {
            events.error(None, format!("Environment '{}' unreachable: {}", env.name(), source));
            return Err(MigrationError::EnvironmentUnreachable {
                env: env.name().to_string(),
                source,
            });
        }
    }
    events.info(None, "Source and target environments reachable");
    Ok(())
}

async fn describe_all(
    ctx: &MigrationContext<'_>,
    env: &Environment,
    counts: &mut BTreeMap<String, u64>,
    missing: &mut Vec<(String, String)>,
) -> Result<()> {
    for table in ctx.topology.order() {
        let description = env.describe(table).await.map_err(|source| MigrationError::Store {
            env: env.name().to_string(),
            table: table.to_string(),
            source,
        })?;
        if description.exists {
            counts.insert(table.to_string(), description.approx_item_count);
        } else {
            missing.push((env.name().to_string(), env.physical_table(table)));
        }
    }
    Ok(())
}

async fn check_table_structure(
    ctx: &MigrationContext<'_>,
    report: &mut PreflightReport,
    events: &mut EventLog,
) -> Result<()> {
    let mut missing = Vec::new();
    describe_all(ctx, ctx.source, &mut report.source_counts, &mut missing).await?;
    describe_all(ctx, ctx.target, &mut report.target_counts, &mut missing).await?;

    for (env, table) in &missing {
        events.error(Some(table), format!("Table missing in '{}'", env));
    }
    match missing.into_iter().next() {
        Some((env, table)) => Err(MigrationError::MissingTable { env, table }),
        None => Ok(()),
    }
}

async fn sample_source_integrity(
    ctx: &MigrationContext<'_>,
    report: &mut PreflightReport,
    events: &mut EventLog,
) -> Result<usize> {
    let mut findings = 0;
    for descriptor in ctx.topology.descriptors() {
        if descriptor.foreign_keys.is_empty() {
            continue;
        }
        let table = descriptor.name.as_str();
        let page = ctx
            .source
            .scan(
                table,
                ScanRequest {
                    limit: Some(ctx.settings.preflight_sample_size),
                    page_token: None,
                },
            )
            .await
            .map_err(|source| MigrationError::Store {
                env: ctx.source.name().to_string(),
                table: table.to_string(),
                source,
            })?;

        for field in &descriptor.foreign_keys {
            let absent = page
                .items
                .iter()
                .filter(|item| item.get(field).map_or(true, |v| v.is_null()))
                .count();
            if absent > 0 {
                findings += 1;
                events.warn(
                    Some(table),
                    format!(
                        "{} of {} sampled records have no '{}'",
                        absent,
                        page.items.len(),
                        field
                    ),
                );
                report
                    .missing_foreign_keys
                    .insert(format!("{}.{}", table, field), absent);
            }
        }
    }
    Ok(findings)
}

fn inspect_target_state(report: &PreflightReport, events: &mut EventLog) -> usize {
    let mut findings = 0;
    for (table, count) in &report.target_counts {
        if *count > 0 {
            findings += 1;
            events.warn(
                Some(table),
                format!("Target already holds ~{} records; existing identities will be skipped", count),
            );
        }
    }
    findings
}
