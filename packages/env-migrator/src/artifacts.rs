//! Local artifact directory: dry-run analyses, checkpoints, run reports and
//! rollback journals. Files are timestamped and never overwritten.

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::Serialize;
use uuid::Uuid;

use crate::error::{MigrationError, Result};

pub const REPORT: &str = "report";
pub const DRY_RUN: &str = "dry_run";
pub const CHECKPOINT: &str = "checkpoint";
pub const ROLLBACK_JOURNAL: &str = "rollback";

#[derive(Debug, Clone)]
pub struct ArtifactStore {
    dir: PathBuf,
}

impl ArtifactStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn ensure_dir(&self) -> Result<()> {
        fs::create_dir_all(&self.dir).map_err(|e| MigrationError::artifact(&self.dir, e))
    }

    fn stem(kind: &str, run_id: Uuid) -> String {
        let run = run_id.simple().to_string();
        format!(
            "{}_{}_{}",
            kind,
            Utc::now().format("%Y%m%d_%H%M%S"),
            &run[run.len() - 8..]
        )
    }

    /// Create a fresh file named `<kind>_<timestamp>_<run>.<ext>`, adding a
    /// numeric suffix if that name is taken.
    pub fn create(&self, kind: &str, run_id: Uuid, ext: &str) -> Result<(PathBuf, File)> {
        self.ensure_dir()?;
        let stem = Self::stem(kind, run_id);
        for attempt in 0u32.. {
            let name = match attempt {
                0 => format!("{}.{}", stem, ext),
                n => format!("{}-{}.{}", stem, n, ext),
            };
            let path = self.dir.join(name);
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(file) => return Ok((path, file)),
                Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(MigrationError::artifact(path, e)),
            }
        }
        unreachable!("u32 attempts exhausted")
    }

    pub fn write_json<T: Serialize>(&self, kind: &str, run_id: Uuid, value: &T) -> Result<PathBuf> {
        let (path, file) = self.create(kind, run_id, "json")?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, value)?;
        writer
            .flush()
            .map_err(|e| MigrationError::artifact(&path, e))?;
        tracing::info!(path = %path.display(), kind, "Wrote artifact");
        Ok(path)
    }

    /// Artifacts of one kind, oldest first.
    pub fn list(&self, kind: &str) -> Result<Vec<PathBuf>> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(MigrationError::artifact(&self.dir, e)),
        };
        let prefix = format!("{}_", kind);
        let mut paths: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                path.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.starts_with(&prefix))
            })
            .collect();
        paths.sort();
        Ok(paths)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn never_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        let run_id = Uuid::now_v7();

        let first = store.write_json(REPORT, run_id, &json!({"n": 1})).unwrap();
        let second = store.write_json(REPORT, run_id, &json!({"n": 2})).unwrap();
        assert_ne!(first, second);

        let first_body: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&first).unwrap()).unwrap();
        assert_eq!(first_body["n"], 1);
        assert_eq!(store.list(REPORT).unwrap().len(), 2);
        assert!(store.list(DRY_RUN).unwrap().is_empty());
    }

    #[test]
    fn list_on_missing_dir_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path().join("absent"));
        assert!(store.list(REPORT).unwrap().is_empty());
    }
}
