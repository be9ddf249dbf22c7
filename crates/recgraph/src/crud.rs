//! Record operations
//!
//! Writes turn a record's serde JSON into N-Quads on a single mutation:
//! one blank node for the record, plus one per nested record that has to be
//! created. Nested records that already exist are linked by uid instead,
//! either through their `gid` or through their first non-empty unique field.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use recgraph_core::{
    Context, Mutation, NQuad, Object, RecgraphError, Result, Subject, Value, TYPE_PREDICATE,
};
use recgraph_query::{eq, object_query, reverse_block, uid, QueryFunc, QueryParams};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value as Json};
use uuid::Uuid;

use crate::codec::{encode, filter_literal};
use crate::engine::EngineInner;
use crate::record::{Record, Shape};
use crate::schema::{TypeDescriptor, GID_FIELD};
use crate::tags::Constraint;
use crate::shape::{decode_many, decode_one};

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

// ============================================================================
// Identifiers
// ============================================================================

/// A unique-constrained field and the value to look up
#[derive(Debug, Clone, PartialEq)]
pub struct ConstrainedField {
    /// Serialization name of the field
    pub key: String,
    pub value: Json,
}

impl ConstrainedField {
    pub fn new(key: impl Into<String>, value: impl Into<Json>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// How to find a record
#[derive(Debug, Clone, PartialEq)]
pub enum Identifier {
    Gid(u64),
    Field(ConstrainedField),
}

impl Identifier {
    /// Identify by a unique-constrained field
    pub fn field(key: impl Into<String>, value: impl Into<Json>) -> Self {
        Self::Field(ConstrainedField::new(key, value))
    }
}

impl From<u64> for Identifier {
    fn from(gid: u64) -> Self {
        Self::Gid(gid)
    }
}

impl From<ConstrainedField> for Identifier {
    fn from(field: ConstrainedField) -> Self {
        Self::Field(field)
    }
}

// ============================================================================
// Writer
// ============================================================================

/// Escape one JSON pointer segment
fn pointer_segment(segment: &str) -> String {
    segment.replace('~', "~0").replace('/', "~1")
}

fn as_object<'j>(descriptor: &TypeDescriptor, json: &'j Json) -> Result<&'j Map<String, Json>> {
    json.as_object().ok_or_else(|| {
        RecgraphError::ExpectedStruct(format!("{} for type {}", json_kind(json), descriptor.name()))
    })
}

fn json_kind(json: &Json) -> &'static str {
    match json {
        Json::Null => "null",
        Json::Bool(_) => "bool",
        Json::Number(_) => "number",
        Json::String(_) => "string",
        Json::Array(_) => "array",
        Json::Object(_) => "object",
    }
}

fn gid_of(object: &Map<String, Json>) -> u64 {
    object.get(GID_FIELD).and_then(Json::as_u64).unwrap_or(0)
}

/// First unique-constrained field holding a non-zero value
fn unique_key(
    descriptor: &TypeDescriptor,
    object: &Map<String, Json>,
) -> Result<Option<(String, Value)>> {
    for field in descriptor.unique_fields() {
        let raw = object.get(&field.serial).unwrap_or(&Json::Null);
        if let Some(value) = encode(field.shape, raw)? {
            return Ok(Some((field.predicate.clone(), value)));
        }
    }
    Ok(None)
}

/// Whether a nested record carries nothing worth writing
fn is_blank(descriptor: &TypeDescriptor, object: &Map<String, Json>) -> Result<bool> {
    if gid_of(object) != 0 {
        return Ok(false);
    }
    for field in descriptor.stored_fields() {
        let raw = object.get(&field.serial).unwrap_or(&Json::Null);
        let empty = match (field.shape, raw) {
            (_, Json::Null) => true,
            (Shape::Record(_), Json::Object(_)) => false,
            (Shape::RecordList(_), Json::Array(items)) => items.is_empty(),
            (shape, raw) => encode(shape, raw)?.is_none(),
        };
        if !empty {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Uid of the node of `descriptor`'s type holding `value` under `predicate`
async fn lookup(
    inner: &EngineInner,
    ctx: &Context,
    ns: u64,
    descriptor: &TypeDescriptor,
    predicate: &str,
    value: &Value,
) -> Result<Option<u64>> {
    let Some(literal) = filter_literal(value) else {
        return Ok(None);
    };
    let json = inner.query(ctx, ns, &object_query(&eq(predicate, literal), "")).await?;
    let rows = json.get("obj").and_then(Json::as_array);
    match rows.and_then(|rows| rows.first()) {
        Some(row) => match decode_one::<Json>(descriptor, row) {
            Ok((gid, _)) => Ok(Some(gid)),
            Err(RecgraphError::NoObjectFound) => Ok(None),
            Err(e) => Err(e),
        },
        None => Ok(None),
    }
}

/// Accumulates one mutation and the gids to patch into the written value
struct Writer<'a> {
    inner: &'a EngineInner,
    ctx: &'a Context,
    ns: u64,
    mutation: Mutation,
    /// JSON pointer of each created record and its blank label
    created: Vec<(String, String)>,
    /// JSON pointer of each nested record linked to an existing node
    linked: Vec<(String, u64)>,
}

impl<'a> Writer<'a> {
    fn new(inner: &'a EngineInner, ctx: &'a Context, ns: u64) -> Self {
        Self {
            inner,
            ctx,
            ns,
            mutation: Mutation::default(),
            created: Vec::new(),
            linked: Vec::new(),
        }
    }

    /// Emit the type and every stored field of one record
    fn write_node<'s>(
        &'s mut self,
        descriptor: Arc<TypeDescriptor>,
        object: &'s Map<String, Json>,
        subject: Subject,
        pointer: String,
    ) -> BoxFuture<'s, Result<()>> {
        Box::pin(async move {
            self.mutation.set.push(NQuad::value(
                subject.clone(),
                TYPE_PREDICATE,
                Value::Str(descriptor.name().to_string()),
            ));

            for field in descriptor.stored_fields() {
                let Some(raw) = object.get(&field.serial) else {
                    continue;
                };
                let field_pointer = format!("{pointer}/{}", pointer_segment(&field.serial));

                match field.shape {
                    Shape::Record(meta) => {
                        if raw.is_null() {
                            continue;
                        }
                        let child = self.inner.descriptor(meta)?;
                        if let Some(target) = self.link(child, raw, field_pointer).await? {
                            self.mutation
                                .set
                                .push(NQuad::edge(subject.clone(), field.predicate.clone(), target));
                        }
                    }
                    Shape::RecordList(meta) => {
                        let Some(items) = raw.as_array() else {
                            continue;
                        };
                        let child = self.inner.descriptor(meta)?;
                        for (i, item) in items.iter().enumerate() {
                            let item_pointer = format!("{field_pointer}/{i}");
                            if let Some(target) =
                                self.link(Arc::clone(&child), item, item_pointer).await?
                            {
                                self.mutation.set.push(NQuad::edge(
                                    subject.clone(),
                                    field.predicate.clone(),
                                    target,
                                ));
                            }
                        }
                    }
                    shape => {
                        if let Some(value) = encode(shape, raw)? {
                            self.mutation.set.push(NQuad::value(
                                subject.clone(),
                                field.predicate.clone(),
                                value,
                            ));
                        }
                    }
                }
            }
            Ok(())
        })
    }

    /// Edge target for a nested record, creating it when no match exists
    fn link<'s>(
        &'s mut self,
        descriptor: Arc<TypeDescriptor>,
        json: &'s Json,
        pointer: String,
    ) -> BoxFuture<'s, Result<Option<Object>>> {
        Box::pin(async move {
            let object = as_object(&descriptor, json)?;
            let gid = gid_of(object);
            if gid != 0 {
                self.linked.push((pointer, gid));
                return Ok(Some(Object::Uid(gid)));
            }
            if is_blank(&descriptor, object)? {
                return Ok(None);
            }

            descriptor.require_unique()?;
            if let Some((predicate, value)) = unique_key(&descriptor, object)? {
                let found = lookup(self.inner, self.ctx, self.ns, &descriptor, &predicate, &value)
                    .await?;
                if let Some(gid) = found {
                    self.linked.push((pointer, gid));
                    return Ok(Some(Object::Uid(gid)));
                }
            }

            let label = Uuid::new_v4().simple().to_string();
            self.created.push((pointer.clone(), label.clone()));
            self.write_node(descriptor, object, Subject::Blank(label.clone()), pointer)
                .await?;
            Ok(Some(Object::Blank(label)))
        })
    }
}

fn set_gid(json: &mut Json, pointer: &str, gid: u64) {
    if let Some(Json::Object(object)) = json.pointer_mut(pointer) {
        object.insert(GID_FIELD.to_string(), Json::from(gid));
    }
}

/// Write `json` as a new node, or over `target` when given, and patch every
/// resulting gid into it
async fn write(
    inner: &EngineInner,
    ctx: &Context,
    ns: u64,
    descriptor: &Arc<TypeDescriptor>,
    json: &mut Json,
    target: Option<u64>,
) -> Result<u64> {
    let mut writer = Writer::new(inner, ctx, ns);
    let root_label = Uuid::new_v4().simple().to_string();
    {
        let object = as_object(descriptor, json)?;
        let subject = match target {
            Some(gid) => {
                for field in descriptor.stored_fields() {
                    writer
                        .mutation
                        .del
                        .push(NQuad::delete_predicate(gid, field.predicate.clone()));
                }
                Subject::Uid(gid)
            }
            None => Subject::Blank(root_label.clone()),
        };
        writer
            .write_node(Arc::clone(descriptor), object, subject, String::new())
            .await?;
    }

    let Writer {
        mutation,
        created,
        linked,
        ..
    } = writer;
    let assigned = inner.mutate(ctx, ns, mutation).await?;
    let resolve = |label: &str| {
        assigned
            .get(label)
            .copied()
            .ok_or_else(|| RecgraphError::engine(format!("no uid assigned to blank node {label}")))
    };

    let gid = match target {
        Some(gid) => gid,
        None => resolve(&root_label)?,
    };
    set_gid(json, "", gid);
    for (pointer, label) in &created {
        set_gid(json, pointer, resolve(label)?);
    }
    for (pointer, gid) in linked {
        set_gid(json, &pointer, gid);
    }
    Ok(gid)
}

fn to_json<T: Serialize>(descriptor: &TypeDescriptor, value: &T) -> Result<Json> {
    let json = serde_json::to_value(value)?;
    as_object(descriptor, &json)?;
    Ok(json)
}

// ============================================================================
// Operations
// ============================================================================

pub(crate) async fn create<T: Record>(
    inner: &EngineInner,
    ctx: &Context,
    ns: u64,
    value: &T,
) -> Result<(u64, T)> {
    let descriptor = inner.descriptor(T::meta)?;
    inner.ensure_schema(ctx, ns, &descriptor).await?;

    let mut json = to_json(&descriptor, value)?;
    let gid = write(inner, ctx, ns, &descriptor, &mut json, None).await?;
    Ok((gid, serde_json::from_value(json)?))
}

pub(crate) async fn create_many<T: Record>(
    inner: &EngineInner,
    ctx: &Context,
    ns: u64,
    values: &[T],
) -> Result<(Vec<u64>, Vec<T>)> {
    let mut gids = Vec::with_capacity(values.len());
    let mut created = Vec::with_capacity(values.len());
    for value in values {
        let (gid, value) = create(inner, ctx, ns, value).await?;
        gids.push(gid);
        created.push(value);
    }
    Ok((gids, created))
}

async fn fetch<T: DeserializeOwned>(
    inner: &EngineInner,
    ctx: &Context,
    ns: u64,
    descriptor: &TypeDescriptor,
    func: &QueryFunc,
) -> Result<(u64, T)> {
    let dql = object_query(func, &reverse_block(descriptor));
    let json = inner.query(ctx, ns, &dql).await?;
    let row = json
        .get("obj")
        .and_then(Json::as_array)
        .and_then(|rows| rows.first())
        .ok_or(RecgraphError::NoObjectFound)?;
    decode_one(descriptor, row)
}

pub(crate) async fn get<T: Record>(
    inner: &EngineInner,
    ctx: &Context,
    ns: u64,
    id: Identifier,
) -> Result<(u64, T)> {
    let descriptor = inner.descriptor(T::meta)?;
    inner.require_type(ctx, ns, descriptor.name()).await?;

    match id {
        Identifier::Gid(gid) => {
            if gid == 0 {
                return Err(RecgraphError::NoObjectFound);
            }
            fetch(inner, ctx, ns, &descriptor, &uid(gid)).await
        }
        Identifier::Field(field) => {
            descriptor.require_unique()?;
            let info = descriptor
                .field(&field.key)
                .filter(|f| f.is_stored() && f.constraint == Some(Constraint::Unique))
                .ok_or_else(|| {
                    RecgraphError::InvalidFilter(format!(
                        "type {} has no unique field {}",
                        descriptor.name(),
                        field.key
                    ))
                })?;
            let literal = encode(info.shape, &field.value)?
                .as_ref()
                .and_then(filter_literal)
                .ok_or(RecgraphError::NoObjectFound)?;
            fetch(inner, ctx, ns, &descriptor, &eq(info.predicate.clone(), literal)).await
        }
    }
}

pub(crate) async fn upsert<T: Record>(
    inner: &EngineInner,
    ctx: &Context,
    ns: u64,
    value: &T,
) -> Result<(u64, T, bool)> {
    let descriptor = inner.descriptor(T::meta)?;
    inner.ensure_schema(ctx, ns, &descriptor).await?;
    let mut json = to_json(&descriptor, value)?;

    let existing = {
        let object = as_object(&descriptor, &json)?;
        match gid_of(object) {
            0 => {
                descriptor.require_unique()?;
                match unique_key(&descriptor, object)? {
                    Some((predicate, value)) => {
                        lookup(inner, ctx, ns, &descriptor, &predicate, &value).await?
                    }
                    None => None,
                }
            }
            gid => {
                fetch::<Json>(inner, ctx, ns, &descriptor, &uid(gid)).await?;
                Some(gid)
            }
        }
    };

    let created = existing.is_none();
    let gid = write(inner, ctx, ns, &descriptor, &mut json, existing).await?;
    Ok((gid, serde_json::from_value(json)?, created))
}

pub(crate) async fn update<T: Record>(
    inner: &EngineInner,
    ctx: &Context,
    ns: u64,
    value: &T,
) -> Result<T> {
    let descriptor = inner.descriptor(T::meta)?;
    inner.ensure_schema(ctx, ns, &descriptor).await?;
    let mut json = to_json(&descriptor, value)?;

    let gid = gid_of(as_object(&descriptor, &json)?);
    if gid == 0 {
        return Err(RecgraphError::NoObjectFound);
    }
    fetch::<Json>(inner, ctx, ns, &descriptor, &uid(gid)).await?;

    write(inner, ctx, ns, &descriptor, &mut json, Some(gid)).await?;
    Ok(serde_json::from_value(json)?)
}

pub(crate) async fn delete<T: Record>(
    inner: &EngineInner,
    ctx: &Context,
    ns: u64,
    id: Identifier,
) -> Result<(u64, T)> {
    let (gid, value) = get::<T>(inner, ctx, ns, id).await?;
    let mutation = Mutation {
        set: Vec::new(),
        del: vec![NQuad::delete_node(gid)],
    };
    inner.mutate(ctx, ns, mutation).await?;
    Ok((gid, value))
}

pub(crate) async fn query<T: Record>(
    inner: &EngineInner,
    ctx: &Context,
    ns: u64,
    params: &QueryParams,
) -> Result<(Vec<u64>, Vec<T>)> {
    let descriptor = inner.descriptor(T::meta)?;
    inner.require_type(ctx, ns, descriptor.name()).await?;

    let dql = params.compile(&*descriptor)?;
    let json = inner.query(ctx, ns, &dql).await?;
    let rows = json
        .get("objs")
        .and_then(Json::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();
    decode_many(&descriptor, rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pointer_segment() {
        assert_eq!(pointer_segment("a/b~c"), "a~1b~0c");
    }

    #[test]
    fn test_identifier_conversions() {
        assert_eq!(Identifier::from(5), Identifier::Gid(5));
        assert_eq!(
            Identifier::field("clerk_id", "123"),
            Identifier::Field(ConstrainedField {
                key: "clerk_id".into(),
                value: Json::from("123"),
            })
        );
    }

    #[test]
    fn test_set_gid_patches_nested_objects() {
        let mut json = serde_json::json!({"gid": 0, "proj": {"gid": 0}, "items": [{"gid": 0}]});
        set_gid(&mut json, "", 1);
        set_gid(&mut json, "/proj", 2);
        set_gid(&mut json, "/items/0", 3);
        assert_eq!(json, serde_json::json!({"gid": 1, "proj": {"gid": 2}, "items": [{"gid": 3}]}));
    }
}
