// Environment Migrator - Core
//
// Copies a relational dataset held in a schemaless document store from one
// deployment environment to another, giving every record a fresh
// deterministic identity and rewriting foreign keys to match.
//
// Modes (dry run, single-table test, full run) live in modes/ and are driven
// through MigrationEngine.

pub mod artifacts;
pub mod config;
pub mod context;
pub mod engine;
pub mod environment;
pub mod error;
pub mod identity;
pub mod integrity;
pub mod migrator;
pub mod modes;
pub mod preflight;
pub mod report;
pub mod resolver;
pub mod rollback;
pub mod store;
pub mod topology;
pub mod transform;
pub mod validation;

pub use config::{EngineSettings, EnvironmentConfig, MigrationConfig};
pub use engine::{DryRunResult, FullRunResult, MigrationEngine, RunResult};
pub use environment::{Environment, TableNaming};
pub use error::{MigrationError, Result, StoreError};
pub use report::{RunMode, RunOutcome, RunReport};
pub use topology::Topology;
