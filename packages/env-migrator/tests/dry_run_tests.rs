//! Integration tests for dry runs and pre-flight gating.

mod common;

use std::sync::Arc;

use common::*;
use migrator_core::artifacts::{DRY_RUN, REPORT};
use migrator_core::preflight::{CheckStatus, PreflightCheck};
use migrator_core::store::InMemoryStore;
use migrator_core::{Environment, MigrationEngine, MigrationError};
use serde_json::json;

#[tokio::test]
async fn dry_run_never_writes_to_target() {
    let h = TestHarness::new();
    seed_standard_dataset(&h.source);

    let result = h.engine().dry_run().await.unwrap();

    assert!(result.run.succeeded(), "{:?}", result.run.error);
    assert_eq!(h.target.mutation_count(), 0);
    assert_eq!(h.source.mutation_count(), 0);
    assert!(result.run.report.mappings.is_empty());
}

#[tokio::test]
async fn dry_run_estimates_counts_and_duration() {
    let h = TestHarness::new();
    seed_standard_dataset(&h.source);

    let result = h.engine().dry_run().await.unwrap();
    let analysis = result.analysis.unwrap();

    assert_eq!(analysis.total_items, STANDARD_DATASET_RECORDS as u64);
    assert_eq!(analysis.estimated_duration_secs, 1.2);
    assert_eq!(analysis.tables.len(), h.topology.order().len());

    let quote_items = analysis.tables.iter().find(|t| t.table == "QuoteItems").unwrap();
    assert_eq!(quote_items.source_count, 2);
    assert_eq!(quote_items.estimated_relationships, 4);
    assert_eq!(quote_items.dependencies, ["Projects", "Quotes"]);
    assert!(quote_items.fields["price"].types.contains("number"));
    assert_eq!(quote_items.fields["itemName"].present_in, 2);

    let contacts = analysis.tables.iter().find(|t| t.table == "Contacts").unwrap();
    let company = &contacts.fields["company"];
    assert!(company.types.contains("null"));
    assert_eq!(company.present_in, 1);
}

#[tokio::test]
async fn dry_run_writes_analysis_and_report_artifacts() {
    let h = TestHarness::new();
    seed_standard_dataset(&h.source);

    let result = h.engine().dry_run().await.unwrap();

    let artifacts = h.artifacts();
    assert_eq!(artifacts.list(DRY_RUN).unwrap(), vec![result.analysis_path.unwrap()]);
    assert_eq!(artifacts.list(REPORT).unwrap().len(), 1);

    let raw = std::fs::read_to_string(&artifacts.list(DRY_RUN).unwrap()[0]).unwrap();
    let body: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(body["sourceEnv"], json!(SOURCE_ENV));
    assert_eq!(body["targetEnv"], json!(TARGET_ENV));
    assert_eq!(body["totalItems"], json!(STANDARD_DATASET_RECORDS));
}

#[tokio::test]
async fn unreachable_target_fails_preflight() {
    let h = TestHarness::new();
    seed_standard_dataset(&h.source);
    h.target.set_unreachable(true);

    let result = h.engine().dry_run().await.unwrap();

    assert!(matches!(
        result.run.error,
        Some(MigrationError::EnvironmentUnreachable { ref env, .. }) if env == TARGET_ENV
    ));
    assert!(result.analysis.is_none());
    assert!(h.artifacts().list(DRY_RUN).unwrap().is_empty());
}

#[tokio::test]
async fn missing_target_table_fails_preflight_before_any_write() {
    let h = TestHarness::new();
    seed_standard_dataset(&h.source);
    let partial_target = Arc::new(InMemoryStore::new().with_tables(["Contacts"]));
    let engine = MigrationEngine::new(
        h.settings.clone(),
        h.topology.clone(),
        h.source_env(),
        Environment::new(TARGET_ENV, partial_target.clone()),
        h.artifacts(),
    );

    let result = engine.run_full(true).await.unwrap();

    assert!(matches!(
        result.run.error,
        Some(MigrationError::MissingTable { ref table, .. }) if table == "Properties"
    ));
    assert_eq!(partial_target.mutation_count(), 0);
    assert!(result.run.report.rollback.is_none());
}

#[tokio::test]
async fn preflight_warns_but_continues() {
    let h = TestHarness::new();
    seed_standard_dataset(&h.source);
    seed(&h.source, "Requests", json!({"id": "request-2", "message": "no links"}));
    seed(&h.target, "Contacts", json!({"id": "already-there"}));

    let result = h.engine().dry_run().await.unwrap();
    assert!(result.run.succeeded());

    let preflight = result.run.report.preflight.as_ref().unwrap();
    let status = |check: PreflightCheck| {
        preflight
            .checks
            .iter()
            .find(|c| c.check == check)
            .map(|c| c.status)
            .unwrap()
    };
    assert_eq!(status(PreflightCheck::EnvironmentAccess), CheckStatus::Passed);
    assert_eq!(status(PreflightCheck::TableStructure), CheckStatus::Passed);
    assert_eq!(status(PreflightCheck::SourceIntegrity), CheckStatus::Warned { findings: 3 });
    assert_eq!(status(PreflightCheck::TargetState), CheckStatus::Warned { findings: 1 });
    assert_eq!(preflight.missing_foreign_keys["Requests.addressId"], 1);
}
