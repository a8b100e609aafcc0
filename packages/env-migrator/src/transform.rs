use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value;
use thiserror::Error;

use crate::config::EngineSettings;
use crate::identity::IdentityMapper;
use crate::resolver::ForeignKeyResolver;
use crate::store::{scalar_key, Item};
use crate::topology::Topology;

/// A record that cannot be migrated; it is counted and skipped.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RecordError {
    #[error("record has no usable '{field}' field")]
    MissingId { field: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnresolvedReference {
    pub field: String,
    pub value: String,
}

#[derive(Debug, Clone)]
pub struct TransformedRecord {
    pub source_id: String,
    pub target_id: String,
    pub item: Item,
    pub resolved: usize,
    pub unresolved: Vec<UnresolvedReference>,
}

/// Clones a source record into its target form: new identity, remapped
/// foreign keys, refreshed audit timestamps. Every other field is copied
/// unchanged.
pub struct RecordTransformer<'a> {
    topology: &'a Topology,
    settings: &'a EngineSettings,
}

impl<'a> RecordTransformer<'a> {
    pub fn new(topology: &'a Topology, settings: &'a EngineSettings) -> Self {
        Self { topology, settings }
    }

    pub fn transform(
        &self,
        table: &str,
        source: &Item,
        mapper: &mut IdentityMapper,
        now: DateTime<Utc>,
    ) -> Result<TransformedRecord, RecordError> {
        let id_field = self.settings.id_field.as_str();
        let source_id = source
            .get(id_field)
            .and_then(scalar_key)
            .ok_or_else(|| RecordError::MissingId {
                field: id_field.to_string(),
            })?;

        let target_id = mapper.assign(table, &source_id);
        let mut item = source.clone();
        item.insert(id_field.to_string(), Value::String(target_id.clone()));

        let resolver = ForeignKeyResolver::new(self.topology, mapper);
        let mut resolved = 0;
        let mut unresolved = Vec::new();
        for field in self.topology.foreign_keys_of(table) {
            let Some(value) = source.get(field) else {
                continue;
            };
            if value.is_null() {
                continue;
            }
            match resolver.resolve(field, value) {
                Some(mapped) => {
                    item.insert(field.clone(), Value::String(mapped));
                    resolved += 1;
                }
                None => unresolved.push(UnresolvedReference {
                    field: field.clone(),
                    value: scalar_key(value).unwrap_or_else(|| value.to_string()),
                }),
            }
        }

        let stamp = Value::String(now.to_rfc3339_opts(SecondsFormat::Millis, true));
        for field in &self.settings.timestamp_fields {
            item.insert(field.clone(), stamp.clone());
        }

        Ok(TransformedRecord {
            source_id,
            target_id,
            item,
            resolved,
            unresolved,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn item(value: Value) -> Item {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn replaces_identity_and_keeps_content() {
        let topology = Topology::standard();
        let settings = EngineSettings::default();
        let transformer = RecordTransformer::new(&topology, &settings);
        let mut mapper = IdentityMapper::new("prod");

        let source = item(json!({
            "id": "c-1",
            "email": "a@example.com",
            "tags": ["x", {"nested": 1}],
            "createdAt": "2020-01-01T00:00:00Z"
        }));
        let now = Utc::now();
        let out = transformer.transform("Contacts", &source, &mut mapper, now).unwrap();

        assert_eq!(out.source_id, "c-1");
        assert_eq!(out.item["id"], json!(out.target_id));
        assert_eq!(mapper.lookup("Contacts", "c-1"), Some(out.target_id.as_str()));
        assert_eq!(out.item["email"], source["email"]);
        assert_eq!(out.item["tags"], source["tags"]);
        let stamp = now.to_rfc3339_opts(SecondsFormat::Millis, true);
        assert_eq!(out.item["createdAt"], json!(stamp));
        assert_eq!(out.item["updatedAt"], json!(stamp));
    }

    #[test]
    fn rewrites_known_foreign_keys_and_reports_misses() {
        let topology = Topology::standard();
        let settings = EngineSettings::default();
        let transformer = RecordTransformer::new(&topology, &settings);
        let mut mapper = IdentityMapper::new("prod");
        let property = mapper.assign("Properties", "p-1");

        let source = item(json!({
            "id": "r-1",
            "addressId": "p-1",
            "agentContactId": "c-404",
            "homeownerContactId": null,
            "message": "hello"
        }));
        let out = transformer
            .transform("Requests", &source, &mut mapper, Utc::now())
            .unwrap();

        assert_eq!(out.item["addressId"], json!(property));
        assert_eq!(out.item["agentContactId"], json!("c-404"));
        assert_eq!(out.item["homeownerContactId"], json!(null));
        assert_eq!(out.resolved, 1);
        assert_eq!(
            out.unresolved,
            vec![UnresolvedReference {
                field: "agentContactId".into(),
                value: "c-404".into()
            }]
        );
    }

    #[test]
    fn missing_id_is_a_record_error() {
        let topology = Topology::standard();
        let settings = EngineSettings::default();
        let transformer = RecordTransformer::new(&topology, &settings);
        let mut mapper = IdentityMapper::new("prod");

        let err = transformer
            .transform("Contacts", &item(json!({"email": "x"})), &mut mapper, Utc::now())
            .unwrap_err();
        assert_eq!(err, RecordError::MissingId { field: "id".into() });
        assert!(mapper.is_empty());
    }
}
