//! Query skeletons
//!
//! Every record fetch selects the same body: the node's own predicates, one
//! level of inlined children, the type list, plus one block per reverse edge.

use recgraph_core::PredicateKind;

use crate::func::{type_of, QueryFunc};

/// Selection shared by single-object and list fetches
const NODE_BODY: &str =
    "gid: uid expand(_all_) { gid: uid expand(_all_) dgraph.type } dgraph.type";

/// Selection for nodes reached through a reverse edge
const REVERSE_BODY: &str = "{ gid: uid expand(_all_) dgraph.type }";

/// What query compilation needs to know about a record type
pub trait TypeSchema {
    /// Unqualified type name, the predicate prefix
    fn type_name(&self) -> &str;

    /// Kind of the predicate behind a serialization name
    fn predicate_kind(&self, serial: &str) -> Option<PredicateKind>;

    /// `(serialization name, reverse predicate)` for each reverse-edge field
    fn reverse_edges(&self) -> Vec<(String, String)>;
}

/// `<serial>: ~<predicate> { gid: uid expand(_all_) dgraph.type }` for every reverse edge
pub fn reverse_block(schema: &dyn TypeSchema) -> String {
    schema
        .reverse_edges()
        .iter()
        .map(|(serial, predicate)| format!("{serial}: ~{predicate} {REVERSE_BODY}"))
        .collect::<Vec<_>>()
        .join(" ")
}

fn body(extra: &str) -> String {
    if extra.is_empty() {
        NODE_BODY.to_string()
    } else {
        format!("{NODE_BODY} {extra}")
    }
}

/// Single-object fetch: `{ obj(func: <pred>) { ... } }`
pub fn object_query(func: &QueryFunc, extra: &str) -> String {
    format!("{{ obj(func: {}) {{ {} }} }}", func.render(), body(extra))
}

/// List fetch: `{ objs(func: <root><paging>) @filter(<pred>) { ... } }`
///
/// `root` defaults to `type("<T>")`. When the caller supplies its own root
/// function the type restriction moves into the filter.
pub fn objects_query(
    type_name: &str,
    root: Option<&QueryFunc>,
    filter: Option<&QueryFunc>,
    paging: &str,
    extra: &str,
) -> String {
    let (root, filter) = match root {
        None => (type_of(type_name).render(), filter.map(QueryFunc::render)),
        Some(root) => {
            let restriction = type_of(type_name).render();
            let filter = match filter {
                Some(f) => format!("{restriction} AND ({})", f.render()),
                None => restriction,
            };
            (root.render(), Some(filter))
        }
    };

    let filter = filter
        .map(|f| format!(" @filter({f})"))
        .unwrap_or_default();

    format!("{{ objs(func: {root}{paging}){filter} {{ {} }} }}", body(extra))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::func::{eq, or, similar_to, uid};

    struct ProjectSchema;

    impl TypeSchema for ProjectSchema {
        fn type_name(&self) -> &str {
            "Project"
        }

        fn predicate_kind(&self, serial: &str) -> Option<PredicateKind> {
            (serial == "name").then_some(PredicateKind::String)
        }

        fn reverse_edges(&self) -> Vec<(String, String)> {
            vec![("branches".to_string(), "Branch.proj".to_string())]
        }
    }

    #[test]
    fn test_object_query_without_extra() {
        assert_eq!(
            object_query(&uid(2), ""),
            "{ obj(func: uid(2)) { gid: uid expand(_all_) { gid: uid expand(_all_) dgraph.type } dgraph.type } }"
        );
    }

    #[test]
    fn test_object_query_with_reverse_edge() {
        let extra = reverse_block(&ProjectSchema);
        assert_eq!(
            extra,
            "branches: ~Branch.proj { gid: uid expand(_all_) dgraph.type }"
        );
        let query = object_query(&uid(7), &extra);
        assert!(query.ends_with(
            "dgraph.type branches: ~Branch.proj { gid: uid expand(_all_) dgraph.type } } }"
        ));
    }

    #[test]
    fn test_objects_query_with_filter_and_paging() {
        let filter = eq("User.age", 20);
        let query = objects_query("User", None, Some(&filter), ", first: 3, offset: 1", "");
        assert_eq!(
            query,
            "{ objs(func: type(\"User\"), first: 3, offset: 1) @filter(eq(User.age, 20)) { gid: uid expand(_all_) { gid: uid expand(_all_) dgraph.type } dgraph.type } }"
        );
    }

    #[test]
    fn test_objects_query_without_filter() {
        let query = objects_query("User", None, None, "", "");
        assert!(query.starts_with("{ objs(func: type(\"User\")) { gid: uid"));
        assert!(!query.contains("@filter"));
    }

    #[test]
    fn test_vector_root_keeps_type_restriction() {
        let root = similar_to("Document.textVec", 5, &[0.1]);
        let filter = or([eq("Document.kind", 1), eq("Document.kind", 2)]);
        let query = objects_query("Document", Some(&root), Some(&filter), "", "");
        assert!(query.contains(
            "@filter(type(\"Document\") AND (eq(Document.kind, 1) OR eq(Document.kind, 2)))"
        ));
    }

    #[test]
    fn test_objects_query_with_vector_root() {
        let root = similar_to("Document.textVec", 5, &[0.1, 0.1, 0.1]);
        let query = objects_query("Document", Some(&root), None, "", "");
        assert!(query.starts_with(
            "{ objs(func: similar_to(Document.textVec, 5, \"[0.1,0.1,0.1]\")) @filter(type(\"Document\")) {"
        ));
    }
}
