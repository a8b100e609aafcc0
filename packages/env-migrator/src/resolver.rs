use serde_json::Value;

use crate::identity::IdentityMapper;
use crate::store::scalar_key;
use crate::topology::Topology;

/// Rewrites foreign-key values to target identities.
///
/// A miss is not an error: the referencing record keeps its original value
/// and the caller records a warning.
pub struct ForeignKeyResolver<'a> {
    topology: &'a Topology,
    mapper: &'a IdentityMapper,
}

impl<'a> ForeignKeyResolver<'a> {
    pub fn new(topology: &'a Topology, mapper: &'a IdentityMapper) -> Self {
        Self { topology, mapper }
    }

    pub fn resolve(&self, field: &str, source_value: &Value) -> Option<String> {
        let table = self.topology.referenced_table(field)?;
        let source_id = scalar_key(source_value)?;
        self.mapper
            .lookup(table, &source_id)
            .map(str::to_string)
    }
}
