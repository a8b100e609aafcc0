//! Test harness with in-memory environments.
//!
//! Each test gets a fresh source ("dev") and target ("prod") store with every
//! topology table created on both sides, plus its own artifact directory.

use std::sync::Arc;

use migrator_core::artifacts::ArtifactStore;
use migrator_core::store::InMemoryStore;
use migrator_core::{EngineSettings, Environment, MigrationEngine, Topology};
use tempfile::TempDir;

pub const SOURCE_ENV: &str = "dev";
pub const TARGET_ENV: &str = "prod";

fn init_tracing() {
    // Run tests with: RUST_LOG=debug cargo test -- --nocapture
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub struct TestHarness {
    pub source: Arc<InMemoryStore>,
    pub target: Arc<InMemoryStore>,
    pub topology: Topology,
    pub settings: EngineSettings,
    pub artifact_dir: TempDir,
}

impl TestHarness {
    /// Harness over the standard production topology.
    pub fn new() -> Self {
        Self::with_topology(Topology::standard())
    }

    pub fn with_topology(topology: Topology) -> Self {
        init_tracing();
        let source = Arc::new(InMemoryStore::new().with_tables(topology.order()));
        let target = Arc::new(InMemoryStore::new().with_tables(topology.order()));
        Self {
            source,
            target,
            topology,
            settings: EngineSettings::default(),
            artifact_dir: tempfile::tempdir().expect("Failed to create artifact dir"),
        }
    }

    pub fn source_env(&self) -> Environment {
        Environment::new(SOURCE_ENV, self.source.clone())
    }

    pub fn target_env(&self) -> Environment {
        Environment::new(TARGET_ENV, self.target.clone())
    }

    pub fn artifacts(&self) -> ArtifactStore {
        ArtifactStore::new(self.artifact_dir.path())
    }

    /// A fresh engine over this harness's stores. Engines built from the
    /// same harness share stores and artifacts, like reruns of the CLI.
    pub fn engine(&self) -> MigrationEngine {
        MigrationEngine::new(
            self.settings.clone(),
            self.topology.clone(),
            self.source_env(),
            self.target_env(),
            self.artifacts(),
        )
    }
}
