//! Record-oriented query front end
//!
//! A `Filter` targets one field by its serialization name and compiles to
//! the matching DQL leaf against the fully qualified predicate. `QueryParams`
//! bundles a filter with pagination and sorting into a complete list fetch.

use recgraph_core::{predicate_name, PredicateKind, RecgraphError, Result};
use serde::{Deserialize, Serialize};

use crate::builder::{objects_query, reverse_block, TypeSchema};
use crate::func::{self, QueryFunc};

// ============================================================================
// Predicates
// ============================================================================

/// Comparison predicate. Values are textual for every field kind; numbers
/// are emitted verbatim and strings/times are quoted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StringPredicate {
    pub equals: Option<String>,
    pub less_than: Option<String>,
    pub less_or_equal: Option<String>,
    pub greater_than: Option<String>,
    pub greater_or_equal: Option<String>,
}

/// Term, full-text and regular-expression matching
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextPredicate {
    pub all_of_terms: Option<String>,
    pub any_of_terms: Option<String>,
    pub all_of_text: Option<String>,
    pub any_of_text: Option<String>,
    pub regexp: Option<String>,
}

/// Nearest-neighbour search over a float-vector field
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VectorPredicate {
    pub similar_to: Vec<f32>,
    pub top_k: u64,
}

/// Selection criterion on a single field
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    /// Serialization name of the field
    pub field: String,
    pub string: Option<StringPredicate>,
    pub text: Option<TextPredicate>,
    pub vector: Option<VectorPredicate>,
}

impl Filter {
    /// Empty filter on a field
    pub fn new(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            ..Self::default()
        }
    }

    fn string_mut(&mut self) -> &mut StringPredicate {
        self.string.get_or_insert_with(StringPredicate::default)
    }

    fn text_mut(&mut self) -> &mut TextPredicate {
        self.text.get_or_insert_with(TextPredicate::default)
    }

    /// `eq`
    pub fn equals(mut self, value: impl ToString) -> Self {
        self.string_mut().equals = Some(value.to_string());
        self
    }

    /// `lt`
    pub fn less_than(mut self, value: impl ToString) -> Self {
        self.string_mut().less_than = Some(value.to_string());
        self
    }

    /// `le`
    pub fn less_or_equal(mut self, value: impl ToString) -> Self {
        self.string_mut().less_or_equal = Some(value.to_string());
        self
    }

    /// `gt`
    pub fn greater_than(mut self, value: impl ToString) -> Self {
        self.string_mut().greater_than = Some(value.to_string());
        self
    }

    /// `ge`
    pub fn greater_or_equal(mut self, value: impl ToString) -> Self {
        self.string_mut().greater_or_equal = Some(value.to_string());
        self
    }

    /// `allofterms`
    pub fn all_of_terms(mut self, terms: impl Into<String>) -> Self {
        self.text_mut().all_of_terms = Some(terms.into());
        self
    }

    /// `anyofterms`
    pub fn any_of_terms(mut self, terms: impl Into<String>) -> Self {
        self.text_mut().any_of_terms = Some(terms.into());
        self
    }

    /// `alloftext`
    pub fn all_of_text(mut self, text: impl Into<String>) -> Self {
        self.text_mut().all_of_text = Some(text.into());
        self
    }

    /// `anyoftext`
    pub fn any_of_text(mut self, text: impl Into<String>) -> Self {
        self.text_mut().any_of_text = Some(text.into());
        self
    }

    /// `regexp`
    pub fn regexp(mut self, pattern: impl Into<String>) -> Self {
        self.text_mut().regexp = Some(pattern.into());
        self
    }

    /// `similar_to`
    pub fn similar_to(mut self, vector: Vec<f32>, top_k: u64) -> Self {
        self.vector = Some(VectorPredicate {
            similar_to: vector,
            top_k,
        });
        self
    }

    /// Whether this filter is a nearest-neighbour search
    pub fn is_vector(&self) -> bool {
        self.vector.is_some()
    }

    /// Compile against a record type's predicates
    pub fn compile(&self, schema: &dyn TypeSchema) -> Result<QueryFunc> {
        let kind = schema.predicate_kind(&self.field).ok_or_else(|| {
            RecgraphError::InvalidFilter(format!(
                "type {} has no field {}",
                schema.type_name(),
                self.field
            ))
        })?;
        let attr = predicate_name(schema.type_name(), &self.field);

        let groups = [self.string.is_some(), self.text.is_some(), self.vector.is_some()]
            .iter()
            .filter(|set| **set)
            .count();
        if groups > 1 {
            return Err(RecgraphError::InvalidFilter(
                "a filter carries at most one of string, text or vector predicates".to_string(),
            ));
        }

        if let Some(string) = &self.string {
            return compile_string(&attr, kind, string);
        }
        if let Some(text) = &self.text {
            return compile_text(&attr, text);
        }
        if let Some(vector) = &self.vector {
            if kind != PredicateKind::VFloat {
                return Err(RecgraphError::InvalidFilter(format!(
                    "similar_to requires a vector field, {} is {kind}",
                    self.field
                )));
            }
            if vector.top_k == 0 || vector.similar_to.is_empty() {
                return Err(RecgraphError::InvalidFilter(
                    "similar_to needs a vector and a positive top_k".to_string(),
                ));
            }
            return Ok(func::similar_to(attr, vector.top_k, &vector.similar_to));
        }

        Err(RecgraphError::InvalidFilter(format!(
            "filter on {} has no predicate",
            self.field
        )))
    }
}

fn compile_string(attr: &str, kind: PredicateKind, pred: &StringPredicate) -> Result<QueryFunc> {
    let literal = |v: &str| {
        if kind.is_quoted() {
            func::quote(v)
        } else {
            v.to_string()
        }
    };

    let mut leaves = Vec::new();
    if let Some(v) = &pred.equals {
        leaves.push(func::eq(attr, literal(v)));
    }
    if let Some(v) = &pred.less_than {
        leaves.push(func::lt(attr, literal(v)));
    }
    if let Some(v) = &pred.less_or_equal {
        leaves.push(func::le(attr, literal(v)));
    }
    if let Some(v) = &pred.greater_than {
        leaves.push(func::gt(attr, literal(v)));
    }
    if let Some(v) = &pred.greater_or_equal {
        leaves.push(func::ge(attr, literal(v)));
    }

    single_or_and(leaves, attr)
}

fn compile_text(attr: &str, pred: &TextPredicate) -> Result<QueryFunc> {
    let mut leaves = Vec::new();
    if let Some(v) = &pred.all_of_terms {
        leaves.push(func::allofterms(attr, v.clone()));
    }
    if let Some(v) = &pred.any_of_terms {
        leaves.push(func::anyofterms(attr, v.clone()));
    }
    if let Some(v) = &pred.all_of_text {
        leaves.push(func::alloftext(attr, v.clone()));
    }
    if let Some(v) = &pred.any_of_text {
        leaves.push(func::anyoftext(attr, v.clone()));
    }
    if let Some(v) = &pred.regexp {
        leaves.push(func::regexp(attr, v.clone()));
    }

    single_or_and(leaves, attr)
}

fn single_or_and(mut leaves: Vec<QueryFunc>, attr: &str) -> Result<QueryFunc> {
    match leaves.len() {
        0 => Err(RecgraphError::InvalidFilter(format!(
            "filter on {attr} has no predicate"
        ))),
        1 => Ok(leaves.remove(0)),
        _ => Ok(func::and(leaves)),
    }
}

// ============================================================================
// Pagination & sorting
// ============================================================================

/// `first` / `offset`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub limit: u64,
    pub offset: u64,
}

impl Pagination {
    pub fn new(limit: u64, offset: u64) -> Self {
        Self { limit, offset }
    }

    /// `, first: <n>, offset: <n>`
    pub fn render(&self) -> String {
        format!(", first: {}, offset: {}", self.limit, self.offset)
    }
}

/// Ordering by a field's serialization name
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sorting {
    pub order_asc: Option<String>,
    pub order_desc: Option<String>,
}

impl Sorting {
    /// Ascending by `field`
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            order_asc: Some(field.into()),
            order_desc: None,
        }
    }

    /// Descending by `field`
    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            order_asc: None,
            order_desc: Some(field.into()),
        }
    }

    /// `, orderasc: <attr>` and/or `, orderdesc: <attr>`
    pub fn render(&self, type_name: &str) -> String {
        let mut out = String::new();
        if let Some(field) = &self.order_asc {
            out.push_str(&format!(", orderasc: {}", predicate_name(type_name, field)));
        }
        if let Some(field) = &self.order_desc {
            out.push_str(&format!(", orderdesc: {}", predicate_name(type_name, field)));
        }
        out
    }
}

// ============================================================================
// Query parameters
// ============================================================================

/// Parameters of a record list query
#[derive(Debug, Clone, Default)]
pub struct QueryParams {
    pub filter: Option<Filter>,
    /// Extra DQL predicate, ANDed with the compiled filter
    pub func: Option<QueryFunc>,
    pub pagination: Option<Pagination>,
    pub sorting: Option<Sorting>,
}

impl QueryParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn with_func(mut self, func: QueryFunc) -> Self {
        self.func = Some(func);
        self
    }

    pub fn with_pagination(mut self, pagination: Pagination) -> Self {
        self.pagination = Some(pagination);
        self
    }

    pub fn with_sorting(mut self, sorting: Sorting) -> Self {
        self.sorting = Some(sorting);
        self
    }

    /// Orderings first, then pagination
    pub fn paging(&self, type_name: &str) -> String {
        let mut out = String::new();
        if let Some(sorting) = &self.sorting {
            out.push_str(&sorting.render(type_name));
        }
        if let Some(pagination) = &self.pagination {
            out.push_str(&pagination.render());
        }
        out
    }

    /// Compile into a complete `objs` query
    pub fn compile(&self, schema: &dyn TypeSchema) -> Result<String> {
        let type_name = schema.type_name();
        let paging = self.paging(type_name);
        let extra = reverse_block(schema);

        if let Some(sorting) = &self.sorting {
            for field in sorting.order_asc.iter().chain(sorting.order_desc.iter()) {
                if schema.predicate_kind(field).is_none() {
                    return Err(RecgraphError::InvalidFilter(format!(
                        "cannot sort {type_name} by unknown field {field}"
                    )));
                }
            }
        }

        let compiled = self.filter.as_ref().map(|f| f.compile(schema)).transpose()?;
        let is_vector = self.filter.as_ref().is_some_and(Filter::is_vector);

        if is_vector {
            return Ok(objects_query(
                type_name,
                compiled.as_ref(),
                self.func.as_ref(),
                &paging,
                &extra,
            ));
        }

        let filter = match (compiled, self.func.clone()) {
            (Some(a), Some(b)) => Some(func::and([func::group(a), func::group(b)])),
            (a, b) => a.or(b),
        };
        Ok(objects_query(type_name, None, filter.as_ref(), &paging, &extra))
    }
}
