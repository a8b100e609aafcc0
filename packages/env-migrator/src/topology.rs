//! Table topology: processing order and foreign-key declarations.
//!
//! Tables are grouped into dependency levels. A table at level N may only
//! reference tables at a strictly lower level, so iterating in level order
//! guarantees referenced identities are mapped before they are needed.
//!
//! Foreign-key fields map to their owning table through an explicit lookup
//! table rather than name pattern matching, and the whole registry is
//! validated once at construction.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{MigrationError, Result};

/// Field name -> referenced table for the standard table set.
const STANDARD_FOREIGN_KEY_TABLES: &[(&str, &str)] = &[
    ("contactId", "Contacts"),
    ("agentContactId", "Contacts"),
    ("homeownerContactId", "Contacts"),
    ("postedByContactId", "Contacts"),
    ("addressId", "Properties"),
    ("propertyId", "Properties"),
    ("requestId", "Requests"),
    ("projectId", "Projects"),
    ("quoteId", "Quotes"),
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableDescriptor {
    pub name: String,
    pub level: u32,
    #[serde(default)]
    pub foreign_keys: Vec<String>,
    /// Fields compared between source and target during record validation.
    #[serde(default)]
    pub content_fields: Vec<String>,
}

impl TableDescriptor {
    pub fn new(name: impl Into<String>, level: u32) -> Self {
        Self {
            name: name.into(),
            level,
            foreign_keys: Vec::new(),
            content_fields: Vec::new(),
        }
    }

    pub fn with_foreign_keys(mut self, fields: &[&str]) -> Self {
        self.foreign_keys = fields.iter().map(|f| f.to_string()).collect();
        self
    }

    pub fn with_content_fields(mut self, fields: &[&str]) -> Self {
        self.content_fields = fields.iter().map(|f| f.to_string()).collect();
        self
    }
}

/// On-disk form of a custom topology (`TOPOLOGY_FILE`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopologyDefinition {
    pub tables: Vec<TableDescriptor>,
    pub foreign_key_tables: BTreeMap<String, String>,
}

#[derive(Debug, Clone)]
pub struct Topology {
    /// Sorted by level; declaration order within a level is kept
    tables: Vec<TableDescriptor>,
    foreign_key_tables: BTreeMap<String, String>,
}

impl Topology {
    /// Build and validate a topology.
    pub fn new(
        tables: Vec<TableDescriptor>,
        foreign_key_tables: BTreeMap<String, String>,
    ) -> Result<Self> {
        let topology = Self::assemble(tables, foreign_key_tables);
        topology.validate()?;
        Ok(topology)
    }

    fn assemble(
        mut tables: Vec<TableDescriptor>,
        foreign_key_tables: BTreeMap<String, String>,
    ) -> Self {
        tables.sort_by_key(|t| t.level);
        Self {
            tables,
            foreign_key_tables,
        }
    }

    /// The production table set.
    pub fn standard() -> Self {
        let tables = vec![
            TableDescriptor::new("Contacts", 1)
                .with_content_fields(&["email", "firstName", "lastName", "phone", "company"]),
            TableDescriptor::new("Properties", 1)
                .with_content_fields(&["propertyFullAddress", "city", "state", "zip"]),
            TableDescriptor::new("Affiliates", 2)
                .with_foreign_keys(&["contactId"])
                .with_content_fields(&["name", "email", "serviceType"]),
            TableDescriptor::new("Requests", 2)
                .with_foreign_keys(&["addressId", "agentContactId", "homeownerContactId"])
                .with_content_fields(&["message", "status", "relationToProperty"]),
            TableDescriptor::new("Projects", 3)
                .with_foreign_keys(&["addressId", "requestId", "agentContactId", "homeownerContactId"])
                .with_content_fields(&["title", "status", "description"]),
            TableDescriptor::new("Quotes", 4)
                .with_foreign_keys(&["projectId", "requestId", "addressId", "agentContactId"])
                .with_content_fields(&["title", "status", "quoteNumber"]),
            TableDescriptor::new("ProjectComments", 4)
                .with_foreign_keys(&["projectId", "postedByContactId"])
                .with_content_fields(&["comment", "postedByProfileImage"]),
            TableDescriptor::new("ProjectMilestones", 4)
                .with_foreign_keys(&["projectId"])
                .with_content_fields(&["name", "description", "order"]),
            TableDescriptor::new("ProjectPaymentTerms", 4)
                .with_foreign_keys(&["projectId"])
                .with_content_fields(&["paymentName", "paymentAmount"]),
            TableDescriptor::new("QuoteItems", 5)
                .with_foreign_keys(&["projectId", "quoteId"])
                .with_content_fields(&["itemName", "quantity", "price"]),
        ];
        let foreign_key_tables = STANDARD_FOREIGN_KEY_TABLES
            .iter()
            .map(|(field, table)| (field.to_string(), table.to_string()))
            .collect();
        Self::assemble(tables, foreign_key_tables)
    }

    pub fn from_definition(definition: TopologyDefinition) -> Result<Self> {
        Self::new(definition.tables, definition.foreign_key_tables)
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            MigrationError::InvalidTopology(format!("cannot read {}: {}", path.display(), e))
        })?;
        let definition: TopologyDefinition = serde_json::from_str(&raw).map_err(|e| {
            MigrationError::InvalidTopology(format!("cannot parse {}: {}", path.display(), e))
        })?;
        Self::from_definition(definition)
    }

    /// Check that every foreign key points at a registered table on a lower level.
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for table in &self.tables {
            if !seen.insert(table.name.as_str()) {
                return Err(MigrationError::InvalidTopology(format!(
                    "table '{}' is declared twice",
                    table.name
                )));
            }
        }

        for table in &self.tables {
            for field in &table.foreign_keys {
                let referenced = self.referenced_table(field).ok_or_else(|| {
                    MigrationError::InvalidTopology(format!(
                        "foreign key '{}.{}' has no table mapping",
                        table.name, field
                    ))
                })?;
                let target = self.descriptor(referenced).ok_or_else(|| {
                    MigrationError::InvalidTopology(format!(
                        "foreign key '{}.{}' references unregistered table '{}'",
                        table.name, field, referenced
                    ))
                })?;
                if target.level >= table.level {
                    return Err(MigrationError::InvalidTopology(format!(
                        "'{}' (level {}) references '{}' (level {}) via '{}'",
                        table.name, table.level, target.name, target.level, field
                    )));
                }
            }
        }
        Ok(())
    }

    /// Table names in processing order.
    pub fn order(&self) -> Vec<&str> {
        self.tables.iter().map(|t| t.name.as_str()).collect()
    }

    pub fn descriptors(&self) -> &[TableDescriptor] {
        &self.tables
    }

    pub fn descriptor(&self, table: &str) -> Option<&TableDescriptor> {
        self.tables.iter().find(|t| t.name == table)
    }

    pub fn contains(&self, table: &str) -> bool {
        self.descriptor(table).is_some()
    }

    /// Declared foreign-key fields; empty for unknown tables.
    pub fn foreign_keys_of(&self, table: &str) -> &[String] {
        self.descriptor(table)
            .map(|t| t.foreign_keys.as_slice())
            .unwrap_or_default()
    }

    /// Table owning the identities stored in `field`.
    pub fn referenced_table(&self, field: &str) -> Option<&str> {
        self.foreign_key_tables.get(field).map(String::as_str)
    }

    /// Tables directly referenced by `table`.
    pub fn dependencies_of(&self, table: &str) -> BTreeSet<String> {
        self.foreign_keys_of(table)
            .iter()
            .filter_map(|field| self.referenced_table(field))
            .map(str::to_string)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_topology_is_valid() {
        let topology = Topology::standard();
        assert!(topology.validate().is_ok());
        assert_eq!(topology.order().first(), Some(&"Contacts"));
        assert_eq!(topology.order().last(), Some(&"QuoteItems"));
    }

    #[test]
    fn order_respects_levels() {
        let topology = Topology::standard();
        let levels: Vec<u32> = topology.descriptors().iter().map(|t| t.level).collect();
        let mut sorted = levels.clone();
        sorted.sort();
        assert_eq!(levels, sorted);
    }

    #[test]
    fn dependencies_are_derived_from_foreign_keys() {
        let topology = Topology::standard();
        let deps: Vec<String> = topology.dependencies_of("Requests").into_iter().collect();
        assert_eq!(deps, vec!["Contacts".to_string(), "Properties".to_string()]);
        assert!(topology.dependencies_of("Contacts").is_empty());
        assert!(topology.dependencies_of("Unknown").is_empty());
    }

    #[test]
    fn rejects_reference_to_same_level() {
        let tables = vec![
            TableDescriptor::new("A", 1),
            TableDescriptor::new("B", 1).with_foreign_keys(&["aId"]),
        ];
        let fks = BTreeMap::from([("aId".to_string(), "A".to_string())]);
        let err = Topology::new(tables, fks).unwrap_err();
        assert!(matches!(err, MigrationError::InvalidTopology(_)));
    }

    #[test]
    fn rejects_unmapped_foreign_key() {
        let tables = vec![TableDescriptor::new("B", 2).with_foreign_keys(&["mysteryId"])];
        assert!(Topology::new(tables, BTreeMap::new()).is_err());
    }

    #[test]
    fn rejects_duplicate_tables() {
        let tables = vec![TableDescriptor::new("A", 1), TableDescriptor::new("A", 2)];
        assert!(Topology::new(tables, BTreeMap::new()).is_err());
    }

    #[test]
    fn parses_definition_json() {
        let raw = r#"{
            "tables": [
                { "name": "Requests", "level": 2, "foreignKeys": ["addressId"] },
                { "name": "Properties", "level": 1, "contentFields": ["city"] }
            ],
            "foreignKeyTables": { "addressId": "Properties" }
        }"#;
        let definition: TopologyDefinition = serde_json::from_str(raw).unwrap();
        let topology = Topology::from_definition(definition).unwrap();
        assert_eq!(topology.order(), vec!["Properties", "Requests"]);
        assert_eq!(topology.referenced_table("addressId"), Some("Properties"));
    }
}
