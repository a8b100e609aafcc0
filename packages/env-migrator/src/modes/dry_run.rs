//! Dry-run analysis: what a full migration would move, and roughly how
//! long it would take. Reads only; never calls a mutating store operation.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::context::{MigrationContext, RunState};
use crate::error::{MigrationError, Result};
use crate::preflight::{run_preflight, PreflightReport};
use crate::store::ScanRequest;

/// How a field appeared across the sampled records.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldProfile {
    /// JSON type names seen for this field
    pub types: BTreeSet<String>,
    pub present_in: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableAnalysis {
    pub table: String,
    pub level: u32,
    pub source_count: u64,
    pub target_count: u64,
    pub foreign_keys: Vec<String>,
    pub dependencies: Vec<String>,
    pub estimated_relationships: u64,
    pub sampled: usize,
    pub fields: BTreeMap<String, FieldProfile>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DryRunAnalysis {
    pub run_id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub source_env: String,
    pub target_env: String,
    pub tables: Vec<TableAnalysis>,
    pub total_items: u64,
    pub total_relationships: u64,
    pub estimated_duration_secs: f64,
    pub estimated_completion: DateTime<Utc>,
    pub preflight: PreflightReport,
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Seconds needed to move `items` at `throughput` records per second.
pub fn estimate_duration_secs(items: u64, throughput: f64) -> f64 {
    if throughput > 0.0 {
        items as f64 / throughput
    } else {
        0.0
    }
}

/// Analyse every registered table. Pre-flight runs first and its fatal
/// errors abort the analysis.
pub async fn analyze(ctx: &MigrationContext<'_>, state: &mut RunState) -> Result<DryRunAnalysis> {
    let preflight = run_preflight(ctx, &mut state.events).await?;
    state.preflight = Some(preflight.clone());

    let mut tables = Vec::new();
    for descriptor in ctx.topology.descriptors() {
        let table = descriptor.name.as_str();
        let source_count = preflight.source_counts.get(table).copied().unwrap_or(0);
        let target_count = preflight.target_counts.get(table).copied().unwrap_or(0);

        let sample = ctx
            .source
            .scan(
                table,
                ScanRequest {
                    limit: Some(ctx.settings.dry_run_sample_size),
                    page_token: None,
                },
            )
            .await
            .map_err(|source| MigrationError::Store {
                env: ctx.source.name().to_string(),
                table: table.to_string(),
                source,
            })?;

        let mut fields: BTreeMap<String, FieldProfile> = BTreeMap::new();
        for item in &sample.items {
            for (name, value) in item {
                let profile = fields.entry(name.clone()).or_default();
                profile.types.insert(json_type_name(value).to_string());
                profile.present_in += 1;
            }
        }

        let analysis = TableAnalysis {
            table: table.to_string(),
            level: descriptor.level,
            source_count,
            target_count,
            foreign_keys: descriptor.foreign_keys.clone(),
            dependencies: ctx.topology.dependencies_of(table).into_iter().collect(),
            estimated_relationships: source_count * descriptor.foreign_keys.len() as u64,
            sampled: sample.items.len(),
            fields,
        };
        state.events.info(
            Some(table),
            format!(
                "~{} records, {} relationships, {} fields sampled",
                analysis.source_count,
                analysis.estimated_relationships,
                analysis.fields.len()
            ),
        );
        tables.push(analysis);
    }

    let total_items: u64 = tables.iter().map(|t| t.source_count).sum();
    let total_relationships: u64 = tables.iter().map(|t| t.estimated_relationships).sum();
    let estimated_duration_secs = estimate_duration_secs(total_items, ctx.settings.throughput_per_sec);
    let generated_at = Utc::now();

    state.events.info(
        None,
        format!(
            "Dry run: {} records, {} relationships, ~{:.0}s estimated",
            total_items, total_relationships, estimated_duration_secs
        ),
    );

    Ok(DryRunAnalysis {
        run_id: state.run_id,
        generated_at,
        source_env: ctx.source.name().to_string(),
        target_env: ctx.target.name().to_string(),
        tables,
        total_items,
        total_relationships,
        estimated_duration_secs,
        estimated_completion: generated_at
            + Duration::milliseconds((estimated_duration_secs * 1000.0) as i64),
        preflight,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn estimate_uses_fixed_throughput() {
        assert_eq!(estimate_duration_secs(1000, 10.0), 100.0);
        assert_eq!(estimate_duration_secs(0, 10.0), 0.0);
        assert_eq!(estimate_duration_secs(50, 0.0), 0.0);
    }

    #[test]
    fn type_names_cover_every_json_kind() {
        let names: Vec<_> = [json!(null), json!(true), json!(1), json!("a"), json!([]), json!({})]
            .iter()
            .map(json_type_name)
            .collect();
        assert_eq!(names, ["null", "boolean", "number", "string", "array", "object"]);
    }
}
