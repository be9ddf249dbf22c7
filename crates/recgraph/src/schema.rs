//! Record type descriptors and schema derivation

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use recgraph_core::{
    predicate_name, PredicateKind, RecgraphError, Result, SchemaChange, SchemaUpdate,
    TypeUpdate, VectorIndexSpec,
};
use recgraph_query::TypeSchema;

use crate::codec::kind_of;
use crate::record::{RecordMeta, Shape};
use crate::tags::{self, Constraint};

/// Serialization name of the node id field
pub const GID_FIELD: &str = "gid";

/// Everything derived from one field's declaration
#[derive(Debug, Clone)]
pub struct FieldInfo {
    pub ident: &'static str,
    /// `json` tag name
    pub serial: String,
    pub shape: Shape,
    pub constraint: Option<Constraint>,
    /// Reverse predicate for read-only `readFrom` fields
    pub reverse: Option<String>,
    /// `<Type>.<serial>`
    pub predicate: String,
    pub is_gid: bool,
}

impl FieldInfo {
    /// Whether the field maps to a predicate of its own type
    pub fn is_stored(&self) -> bool {
        !self.is_gid && self.reverse.is_none()
    }
}

/// Derived description of a record type
#[derive(Debug, Clone)]
pub struct TypeDescriptor {
    type_name: &'static str,
    fields: Vec<FieldInfo>,
}

impl TypeDescriptor {
    /// Derive from a record's self-description
    pub fn derive(meta: &RecordMeta) -> Result<Self> {
        let mut fields = Vec::with_capacity(meta.fields.len());
        let mut has_gid = false;

        for field in &meta.fields {
            let serial = tags::json_name(field)?;
            let constraint = tags::constraint(field);
            let reverse = tags::reverse_edge(field)?;
            let is_gid = serial == GID_FIELD;

            if is_gid {
                if !matches!(field.shape, Shape::Uid) {
                    return Err(RecgraphError::MissingGid(meta.type_name.to_string()));
                }
                has_gid = true;
            }

            if constraint == Some(Constraint::Vector) {
                let kind = kind_of(field.shape)?;
                if kind != PredicateKind::VFloat {
                    return Err(RecgraphError::VectorKindMismatch {
                        field: field.ident.to_string(),
                        kind,
                    });
                }
            }

            fields.push(FieldInfo {
                ident: field.ident,
                predicate: predicate_name(meta.type_name, &serial),
                serial,
                shape: field.shape,
                constraint,
                reverse,
                is_gid,
            });
        }

        if !has_gid {
            return Err(RecgraphError::MissingGid(meta.type_name.to_string()));
        }

        Ok(Self {
            type_name: meta.type_name,
            fields,
        })
    }

    pub fn name(&self) -> &'static str {
        self.type_name
    }

    pub fn fields(&self) -> &[FieldInfo] {
        &self.fields
    }

    /// Field by serialization name
    pub fn field(&self, serial: &str) -> Option<&FieldInfo> {
        self.fields.iter().find(|f| f.serial == serial)
    }

    /// Fields carrying a predicate of this type
    pub fn stored_fields(&self) -> impl Iterator<Item = &FieldInfo> {
        self.fields.iter().filter(|f| f.is_stored())
    }

    pub fn unique_fields(&self) -> impl Iterator<Item = &FieldInfo> {
        self.stored_fields()
            .filter(|f| f.constraint == Some(Constraint::Unique))
    }

    /// Fail when no field identifies a node by value
    pub fn require_unique(&self) -> Result<()> {
        if self.unique_fields().next().is_none() {
            return Err(RecgraphError::NoUniqueConstraint(self.type_name.to_string()));
        }
        Ok(())
    }

    /// Nested record types referenced by this type, reverse fields included
    pub fn nested(&self) -> impl Iterator<Item = fn() -> RecordMeta> + '_ {
        self.fields.iter().filter_map(|f| f.shape.nested())
    }

    /// Predicate and type declarations for this type alone
    pub fn schema_change(&self) -> Result<SchemaChange> {
        let mut change = SchemaChange::default();

        for field in self.stored_fields() {
            let mut update = SchemaUpdate::new(field.predicate.clone(), kind_of(field.shape)?);
            update.list = matches!(field.shape, Shape::RecordList(_));

            match field.constraint {
                Some(Constraint::Unique) => {
                    update.tokenizers = vec![Constraint::Exact.to_string()];
                    update.unique = true;
                    update.upsert = true;
                }
                Some(Constraint::Vector) => {
                    update.vector_specs = vec![VectorIndexSpec::hnsw_cosine()];
                }
                Some(other) => update.tokenizers = vec![other.to_string()],
                None => {}
            }
            change.predicates.push(update);
        }

        change.types.push(TypeUpdate {
            name: self.type_name.to_string(),
            fields: self.stored_fields().map(|f| f.predicate.clone()).collect(),
        });
        Ok(change)
    }
}

impl TypeSchema for TypeDescriptor {
    fn type_name(&self) -> &str {
        self.type_name
    }

    fn predicate_kind(&self, serial: &str) -> Option<PredicateKind> {
        self.field(serial)
            .filter(|f| f.is_stored())
            .and_then(|f| kind_of(f.shape).ok())
    }

    fn reverse_edges(&self) -> Vec<(String, String)> {
        self.fields
            .iter()
            .filter_map(|f| f.reverse.clone().map(|pred| (f.serial.clone(), pred)))
            .collect()
    }
}

// ============================================================================
// Descriptor cache
// ============================================================================

/// Descriptors derived once per record type, keyed by type name
#[derive(Default)]
pub struct DescriptorCache {
    entries: RwLock<HashMap<&'static str, Arc<TypeDescriptor>>>,
}

impl DescriptorCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached descriptor, deriving it on first use
    pub fn get(&self, meta: fn() -> RecordMeta) -> Result<Arc<TypeDescriptor>> {
        let meta = meta();
        if let Some(descriptor) = self.entries.read().get(meta.type_name) {
            return Ok(Arc::clone(descriptor));
        }

        let derived = Arc::new(TypeDescriptor::derive(&meta)?);
        let mut entries = self.entries.write();
        let descriptor = entries.entry(meta.type_name).or_insert(derived);
        Ok(Arc::clone(descriptor))
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
