//! The three run modes. Each takes the shared context plus the run's own
//! state and leaves its findings in that state for the report.

pub mod dry_run;
pub mod full;
pub mod test_run;

pub use dry_run::{analyze, DryRunAnalysis, TableAnalysis};
pub use full::{require_confirmation, Checkpoint, FullMigration, RunPhase};
pub use test_run::{referenced_records, run_test, DEFAULT_TEST_LIMIT};
