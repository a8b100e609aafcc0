//! LIFO log of applied writes, replayed as deletes when a full run fails.
//!
//! When a journal is attached, each entry is appended and synced to disk
//! before `push` returns, so a crashed process still leaves enough behind to
//! undo its writes. A journal without a trailing completion line is pending
//! and can be replayed with [`recover_pending`].

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::artifacts::{self, ArtifactStore};
use crate::environment::Environment;
use crate::error::{MigrationError, Result};
use crate::report::EventLog;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RollbackAction {
    Delete,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollbackEntry {
    pub action: RollbackAction,
    pub table: String,
    pub id: String,
}

impl RollbackEntry {
    pub fn delete(table: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            action: RollbackAction::Delete,
            table: table.into(),
            id: id.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
enum JournalLine {
    Begin { run_id: Uuid, target_env: String, at: DateTime<Utc> },
    Entry(RollbackEntry),
    Completed { at: DateTime<Utc> },
}

/// Append-only JSON-lines journal of rollback entries.
#[derive(Debug)]
pub struct RollbackJournal {
    path: PathBuf,
    file: File,
}

impl RollbackJournal {
    pub fn create(artifacts: &ArtifactStore, run_id: Uuid, target_env: &str) -> Result<Self> {
        let (path, file) = artifacts.create(artifacts::ROLLBACK_JOURNAL, run_id, "jsonl")?;
        let mut journal = Self { path, file };
        journal.append(&JournalLine::Begin {
            run_id,
            target_env: target_env.to_string(),
            at: Utc::now(),
        })?;
        Ok(journal)
    }

    pub(crate) fn open_existing(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .append(true)
            .open(path)
            .map_err(|e| MigrationError::artifact(path, e))?;
        Ok(Self {
            path: path.to_path_buf(),
            file,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn append(&mut self, line: &JournalLine) -> Result<()> {
        let mut encoded = serde_json::to_vec(line)?;
        encoded.push(b'\n');
        self.file
            .write_all(&encoded)
            .and_then(|_| self.file.sync_data())
            .map_err(|e| MigrationError::artifact(&self.path, e))
    }

    /// Close the journal; it will no longer be considered pending.
    pub fn complete(mut self) -> Result<()> {
        self.append(&JournalLine::Completed { at: Utc::now() })
    }
}

/// Contents of a journal read back from disk.
#[derive(Debug, Clone)]
pub struct JournalContents {
    pub path: PathBuf,
    pub run_id: Option<Uuid>,
    pub target_env: Option<String>,
    pub entries: Vec<RollbackEntry>,
    pub completed: bool,
}

pub fn read_journal(path: &Path) -> Result<JournalContents> {
    let file = File::open(path).map_err(|e| MigrationError::artifact(path, e))?;
    let mut contents = JournalContents {
        path: path.to_path_buf(),
        run_id: None,
        target_env: None,
        entries: Vec::new(),
        completed: false,
    };

    let lines = BufReader::new(file)
        .lines()
        .collect::<std::io::Result<Vec<String>>>()
        .map_err(|e| MigrationError::artifact(path, e))?;
    let last = lines.len().saturating_sub(1);

    for (index, line) in lines.iter().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let parsed: JournalLine = match serde_json::from_str(line) {
            Ok(parsed) => parsed,
            // A crash mid-append can only tear the final line; that write
            // was never acknowledged.
            Err(_) if index == last => break,
            Err(e) => {
                return Err(MigrationError::Journal {
                    path: path.to_path_buf(),
                    detail: format!("line {}: {}", index + 1, e),
                })
            }
        };
        match parsed {
            JournalLine::Begin { run_id, target_env, .. } => {
                contents.run_id = Some(run_id);
                contents.target_env = Some(target_env);
            }
            JournalLine::Entry(entry) => contents.entries.push(entry),
            JournalLine::Completed { .. } => contents.completed = true,
        }
    }
    Ok(contents)
}

/// Journals in the artifact directory with no completion line.
pub fn pending_journals(artifacts: &ArtifactStore) -> Result<Vec<JournalContents>> {
    let mut pending = Vec::new();
    for path in artifacts.list(artifacts::ROLLBACK_JOURNAL)? {
        let contents = read_journal(&path)?;
        if !contents.completed {
            pending.push(contents);
        }
    }
    Ok(pending)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollbackFailure {
    pub table: String,
    pub id: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RollbackSummary {
    pub attempted: usize,
    pub deleted: usize,
    pub failures: Vec<RollbackFailure>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub journal: Option<PathBuf>,
}

impl RollbackSummary {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

#[derive(Debug, Default)]
pub struct RollbackManager {
    entries: Vec<RollbackEntry>,
    journal: Option<RollbackJournal>,
}

impl RollbackManager {
    pub fn in_memory() -> Self {
        Self::default()
    }

    pub fn with_journal(journal: RollbackJournal) -> Self {
        Self {
            entries: Vec::new(),
            journal: Some(journal),
        }
    }

    /// Resume a pending journal so its entries can be replayed.
    pub fn resume(contents: &JournalContents) -> Result<Self> {
        Ok(Self {
            entries: contents.entries.clone(),
            journal: Some(RollbackJournal::open_existing(&contents.path)?),
        })
    }

    /// Record a completed write. Durable before returning when journaled.
    /// The in-memory entry is kept even if the journal append fails, so the
    /// run's own rollback still covers it.
    pub fn push(&mut self, entry: RollbackEntry) -> Result<()> {
        self.entries.push(entry);
        match (self.journal.as_mut(), self.entries.last()) {
            (Some(journal), Some(entry)) => journal.append(&JournalLine::Entry(entry.clone())),
            _ => Ok(()),
        }
    }

    pub fn entries(&self) -> &[RollbackEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn journal_path(&self) -> Option<&Path> {
        self.journal.as_ref().map(RollbackJournal::path)
    }

    /// Undo every recorded write, newest first. Individual delete failures
    /// are logged and skipped. The journal is closed only if every delete
    /// succeeded, so a partial rollback stays recoverable.
    pub async fn rollback(&mut self, target: &Environment, events: &mut EventLog) -> RollbackSummary {
        let mut summary = RollbackSummary {
            attempted: self.entries.len(),
            journal: self.journal_path().map(Path::to_path_buf),
            ..RollbackSummary::default()
        };
        events.warn(
            None,
            format!("Rolling back {} writes in {}", summary.attempted, target.name()),
        );

        while let Some(entry) = self.entries.pop() {
            match entry.action {
                RollbackAction::Delete => match target.delete(&entry.table, &entry.id).await {
                    Ok(()) => summary.deleted += 1,
                    Err(e) => {
                        events.error(
                            Some(&entry.table),
                            format!("Rollback delete of {} failed: {}", entry.id, e),
                        );
                        summary.failures.push(RollbackFailure {
                            table: entry.table.clone(),
                            id: entry.id.clone(),
                            error: e.to_string(),
                        });
                    }
                },
            }
        }

        if summary.is_complete() {
            if let Err(e) = self.finish() {
                events.error(None, format!("Could not close rollback journal: {}", e));
            }
            events.info(None, format!("Rollback removed {} records", summary.deleted));
        } else {
            events.error(
                None,
                format!(
                    "Rollback incomplete: {} of {} deletes failed; target needs manual reconciliation",
                    summary.failures.len(),
                    summary.attempted
                ),
            );
        }
        summary
    }

    /// Mark the journal completed (no rollback needed or rollback done).
    pub fn finish(&mut self) -> Result<()> {
        match self.journal.take() {
            Some(journal) => journal.complete(),
            None => Ok(()),
        }
    }
}

/// Replay every pending journal against `target`.
pub async fn recover_pending(
    artifacts: &ArtifactStore,
    target: &Environment,
    events: &mut EventLog,
) -> Result<Vec<RollbackSummary>> {
    let mut summaries = Vec::new();
    for contents in pending_journals(artifacts)? {
        if let Some(env) = &contents.target_env {
            if env != target.name() {
                events.warn(
                    None,
                    format!(
                        "Skipping journal {} for environment '{}' (target is '{}')",
                        contents.path.display(),
                        env,
                        target.name()
                    ),
                );
                continue;
            }
        }
        events.info(
            None,
            format!(
                "Replaying journal {} ({} entries)",
                contents.path.display(),
                contents.entries.len()
            ),
        );
        let mut manager = RollbackManager::resume(&contents)?;
        summaries.push(manager.rollback(target, events).await);
    }
    Ok(summaries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{InMemoryStore, Item};
    use std::sync::Arc;

    fn seeded_target(ids: &[&str]) -> (Arc<InMemoryStore>, Environment) {
        let store = Arc::new(InMemoryStore::new().with_tables(["Contacts"]));
        for id in ids {
            store.insert("Contacts", id, Item::new());
        }
        let env = Environment::new("prod", store.clone());
        (store, env)
    }

    #[tokio::test]
    async fn rollback_deletes_in_reverse_order() {
        let (store, env) = seeded_target(&["a", "b"]);
        let mut manager = RollbackManager::in_memory();
        manager.push(RollbackEntry::delete("Contacts", "a")).unwrap();
        manager.push(RollbackEntry::delete("Contacts", "b")).unwrap();

        let mut events = EventLog::new();
        let summary = manager.rollback(&env, &mut events).await;
        assert_eq!(summary.attempted, 2);
        assert_eq!(summary.deleted, 2);
        assert!(summary.is_complete());
        assert!(manager.is_empty());
        assert_eq!(store.count("Contacts"), 0);
    }

    #[tokio::test]
    async fn delete_failures_do_not_stop_rollback() {
        let (store, env) = seeded_target(&["a"]);
        store.create_table("Projects");
        store.insert("Projects", "p", Item::new());
        store.fail_deletes_for("Contacts");

        let mut manager = RollbackManager::in_memory();
        manager.push(RollbackEntry::delete("Projects", "p")).unwrap();
        manager.push(RollbackEntry::delete("Contacts", "a")).unwrap();

        let mut events = EventLog::new();
        let summary = manager.rollback(&env, &mut events).await;
        assert_eq!(summary.deleted, 1);
        assert_eq!(summary.failures.len(), 1);
        assert_eq!(summary.failures[0].id, "a");
        assert_eq!(store.count("Projects"), 0);
    }

    #[test]
    fn journal_round_trips_and_completes() {
        let dir = tempfile::tempdir().unwrap();
        let artifacts = ArtifactStore::new(dir.path());
        let run_id = Uuid::now_v7();

        let journal = RollbackJournal::create(&artifacts, run_id, "prod").unwrap();
        let path = journal.path().to_path_buf();
        let mut manager = RollbackManager::with_journal(journal);
        manager.push(RollbackEntry::delete("Contacts", "x")).unwrap();

        let contents = read_journal(&path).unwrap();
        assert_eq!(contents.run_id, Some(run_id));
        assert_eq!(contents.entries, vec![RollbackEntry::delete("Contacts", "x")]);
        assert!(!contents.completed);
        assert_eq!(pending_journals(&artifacts).unwrap().len(), 1);

        manager.finish().unwrap();
        assert!(read_journal(&path).unwrap().completed);
        assert!(pending_journals(&artifacts).unwrap().is_empty());
    }

    #[tokio::test]
    async fn recover_replays_pending_journal() {
        let dir = tempfile::tempdir().unwrap();
        let artifacts = ArtifactStore::new(dir.path());
        let (store, env) = seeded_target(&["a", "b"]);

        {
            let journal = RollbackJournal::create(&artifacts, Uuid::now_v7(), "prod").unwrap();
            let mut manager = RollbackManager::with_journal(journal);
            manager.push(RollbackEntry::delete("Contacts", "a")).unwrap();
            manager.push(RollbackEntry::delete("Contacts", "b")).unwrap();
            // dropped without finishing, as if the process died
        }

        let mut events = EventLog::new();
        let summaries = recover_pending(&artifacts, &env, &mut events).await.unwrap();
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].deleted, 2);
        assert_eq!(store.count("Contacts"), 0);
        assert!(pending_journals(&artifacts).unwrap().is_empty());
    }
}
