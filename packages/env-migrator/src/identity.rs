//! Deterministic target identities.
//!
//! A target identity is a pure function of `(source table, source id, target
//! environment)`: the first 16 bytes of a SHA-256 digest, hex encoded. Nothing
//! run-local goes into it, so a rerun against the same target derives the
//! same identities and its conditional writes collide instead of duplicating.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Separator between digest inputs so `("ab", "c")` and `("a", "bc")` differ.
const FIELD_SEPARATOR: u8 = 0x1f;

/// Number of digest bytes kept (32 hex characters).
const IDENTITY_BYTES: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MappingEntry {
    pub source_table: String,
    pub source_id: String,
    pub target_id: String,
}

pub fn derive_target_id(source_table: &str, source_id: &str, target_env: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source_table.as_bytes());
    hasher.update([FIELD_SEPARATOR]);
    hasher.update(source_id.as_bytes());
    hasher.update([FIELD_SEPARATOR]);
    hasher.update(target_env.as_bytes());
    let digest = hasher.finalize();
    hex::encode(&digest[..IDENTITY_BYTES])
}

/// Run-scoped source -> target identity map for one target environment.
#[derive(Debug, Clone)]
pub struct IdentityMapper {
    target_env: String,
    entries: HashMap<(String, String), String>,
}

impl IdentityMapper {
    pub fn new(target_env: impl Into<String>) -> Self {
        Self {
            target_env: target_env.into(),
            entries: HashMap::new(),
        }
    }

    pub fn target_env(&self) -> &str {
        &self.target_env
    }

    /// Derive and record the target identity for a source record.
    pub fn assign(&mut self, source_table: &str, source_id: &str) -> String {
        let target_env = &self.target_env;
        self.entries
            .entry((source_table.to_string(), source_id.to_string()))
            .or_insert_with(|| derive_target_id(source_table, source_id, target_env))
            .clone()
    }

    /// Previously assigned identity. A miss means the referenced record has
    /// not been migrated in this run.
    pub fn lookup(&self, table: &str, source_id: &str) -> Option<&str> {
        self.entries
            .get(&(table.to_string(), source_id.to_string()))
            .map(String::as_str)
    }

    pub fn contains_table(&self, table: &str) -> bool {
        self.entries.keys().any(|(t, _)| t == table)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All entries ordered by `(source_table, source_id)`.
    pub fn all(&self) -> Vec<MappingEntry> {
        let mut entries: Vec<MappingEntry> = self
            .entries
            .iter()
            .map(|((table, source_id), target_id)| MappingEntry {
                source_table: table.clone(),
                source_id: source_id.clone(),
                target_id: target_id.clone(),
            })
            .collect();
        entries.sort_by(|a, b| {
            (a.source_table.as_str(), a.source_id.as_str())
                .cmp(&(b.source_table.as_str(), b.source_id.as_str()))
        });
        entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identities_are_stable_across_mappers() {
        let mut first_run = IdentityMapper::new("prod");
        let mut second_run = IdentityMapper::new("prod");
        assert_eq!(
            first_run.assign("Contacts", "c-1"),
            second_run.assign("Contacts", "c-1")
        );
    }

    #[test]
    fn identity_depends_on_every_input() {
        let base = derive_target_id("Contacts", "c-1", "prod");
        assert_ne!(base, derive_target_id("Projects", "c-1", "prod"));
        assert_ne!(base, derive_target_id("Contacts", "c-2", "prod"));
        assert_ne!(base, derive_target_id("Contacts", "c-1", "staging"));
        assert_ne!(derive_target_id("ab", "c", "x"), derive_target_id("a", "bc", "x"));
    }

    #[test]
    fn identity_format_is_32_hex_chars() {
        let id = derive_target_id("Contacts", "c-1", "prod");
        assert_eq!(id.len(), 32);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn lookup_returns_assigned_identity() {
        let mut mapper = IdentityMapper::new("prod");
        let assigned = mapper.assign("Properties", "p-9");
        assert_eq!(mapper.lookup("Properties", "p-9"), Some(assigned.as_str()));
        assert_eq!(mapper.lookup("Properties", "p-10"), None);
        assert_eq!(mapper.lookup("Contacts", "p-9"), None);
        assert!(mapper.contains_table("Properties"));
        assert!(!mapper.contains_table("Contacts"));
    }

    #[test]
    fn all_is_sorted() {
        let mut mapper = IdentityMapper::new("prod");
        mapper.assign("Requests", "2");
        mapper.assign("Contacts", "b");
        mapper.assign("Contacts", "a");
        mapper.assign("Contacts", "a");
        let keys: Vec<(String, String)> = mapper
            .all()
            .into_iter()
            .map(|e| (e.source_table, e.source_id))
            .collect();
        assert_eq!(
            keys,
            vec![
                ("Contacts".to_string(), "a".to_string()),
                ("Contacts".to_string(), "b".to_string()),
                ("Requests".to_string(), "2".to_string()),
            ]
        );
    }
}
