//! Post-table record validation.
//!
//! Each migrated record is re-read from the target by its new identity and
//! the table's declared content fields are compared with the source. Tables
//! that declare no content fields fall back to a legacy global list.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::context::MigrationContext;
use crate::error::{MigrationError, Result};
use crate::migrator::MigratedRecord;
use crate::report::EventLog;

/// Compared when a table declares no content fields of its own.
pub const LEGACY_CONTENT_FIELDS: &[&str] = &["email", "name", "title"];

/// Whether validation findings abort the run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationSeverity {
    #[default]
    Warn,
    Fatal,
}

impl FromStr for ValidationSeverity {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "warn" | "warning" => Ok(Self::Warn),
            "fatal" | "error" => Ok(Self::Fatal),
            other => Err(format!("unknown validation severity '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldMismatch {
    pub target_id: String,
    pub field: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationOutcome {
    pub checked: usize,
    /// Target identities that could not be read back
    pub missing: Vec<String>,
    pub mismatched: Vec<FieldMismatch>,
}

impl ValidationOutcome {
    pub fn findings(&self) -> usize {
        self.missing.len() + self.mismatched.len()
    }

    pub fn is_clean(&self) -> bool {
        self.findings() == 0
    }
}

/// Content fields compared for `table`.
pub fn content_fields_for<'a>(ctx: &'a MigrationContext<'_>, table: &str) -> Vec<&'a str> {
    match ctx.topology.descriptor(table) {
        Some(d) if !d.content_fields.is_empty() => {
            d.content_fields.iter().map(String::as_str).collect()
        }
        _ => LEGACY_CONTENT_FIELDS.to_vec(),
    }
}

pub async fn validate_records(
    ctx: &MigrationContext<'_>,
    table: &str,
    records: &[MigratedRecord],
    events: &mut EventLog,
) -> Result<ValidationOutcome> {
    let fields = content_fields_for(ctx, table);
    let mut outcome = ValidationOutcome::default();

    for record in records {
        outcome.checked += 1;
        let stored = ctx
            .target
            .get(table, &record.target_id)
            .await
            .map_err(|source| MigrationError::Store {
                env: ctx.target.name().to_string(),
                table: table.to_string(),
                source,
            })?;

        let Some(stored) = stored else {
            events.warn(
                Some(table),
                format!("Migrated record {} not found in target", record.target_id),
            );
            outcome.missing.push(record.target_id.clone());
            continue;
        };

        for field in &fields {
            if record.source.get(*field) != stored.get(*field) {
                events.warn(
                    Some(table),
                    format!("Field '{}' differs on record {}", field, record.target_id),
                );
                outcome.mismatched.push(FieldMismatch {
                    target_id: record.target_id.clone(),
                    field: field.to_string(),
                });
            }
        }
    }

    if outcome.is_clean() {
        events.info(Some(table), format!("Validated {} records", outcome.checked));
    } else if ctx.settings.validation_severity == ValidationSeverity::Fatal {
        return Err(MigrationError::ValidationFailed {
            table: table.to_string(),
            detail: format!(
                "{} missing, {} mismatched of {} checked",
                outcome.missing.len(),
                outcome.mismatched.len(),
                outcome.checked
            ),
        });
    }
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_parses_common_spellings() {
        assert_eq!("warn".parse::<ValidationSeverity>(), Ok(ValidationSeverity::Warn));
        assert_eq!("FATAL".parse::<ValidationSeverity>(), Ok(ValidationSeverity::Fatal));
        assert!("loud".parse::<ValidationSeverity>().is_err());
    }
}
