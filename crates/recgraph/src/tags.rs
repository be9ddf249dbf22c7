//! Struct tag parsing
//!
//! Tags follow the Go struct tag convention: space separated `key:"value"`
//! pairs with double-quoted, backslash-escaped values.

use std::fmt;

use recgraph_core::{predicate_name, RecgraphError, Result};

use crate::record::Field;

/// Index or uniqueness discipline selected by a `db:"constraint=..."` tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Constraint {
    Exact,
    Term,
    Hash,
    Unique,
    Fulltext,
    Trigram,
    Vector,
}

impl Constraint {
    pub fn parse(text: &str) -> Option<Self> {
        Some(match text {
            "exact" => Self::Exact,
            "term" => Self::Term,
            "hash" => Self::Hash,
            "unique" => Self::Unique,
            "fulltext" => Self::Fulltext,
            "trigram" => Self::Trigram,
            "vector" => Self::Vector,
            _ => return None,
        })
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Exact => "exact",
            Self::Term => "term",
            Self::Hash => "hash",
            Self::Unique => "unique",
            Self::Fulltext => "fulltext",
            Self::Trigram => "trigram",
            Self::Vector => "vector",
        }
    }
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Value stored under `key` in a struct tag, if present and well formed
pub fn lookup(tag: &str, key: &str) -> Option<String> {
    let mut rest = tag;
    loop {
        rest = rest.trim_start_matches(' ');
        if rest.is_empty() {
            return None;
        }

        let colon = rest.find(|c: char| c <= ' ' || c == ':' || c == '"' || c == '\x7f')?;
        if colon == 0 || !rest[colon..].starts_with(":\"") {
            return None;
        }
        let name = &rest[..colon];
        rest = &rest[colon + 1..];

        let (quoted, tail) = split_quoted(rest)?;
        rest = tail;
        if name == key {
            return unquote(quoted);
        }
    }
}

/// Split a leading `"..."` literal off `text`, honouring backslash escapes
fn split_quoted(text: &str) -> Option<(&str, &str)> {
    let bytes = text.as_bytes();
    let mut i = 1;
    while i < bytes.len() && bytes[i] != b'"' {
        if bytes[i] == b'\\' {
            i += 1;
        }
        i += 1;
    }
    if i >= bytes.len() {
        return None;
    }
    Some((&text[..=i], &text[i + 1..]))
}

fn unquote(quoted: &str) -> Option<String> {
    let inner = quoted.strip_prefix('"')?.strip_suffix('"')?;
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next()? {
            'n' => out.push('\n'),
            't' => out.push('\t'),
            'r' => out.push('\r'),
            '0' => out.push('\0'),
            other => out.push(other),
        }
    }
    Some(out)
}

/// Serialization name: the first comma separated token of the `json` tag
pub fn json_name(field: &Field) -> Result<String> {
    let name = lookup(field.tag, "json")
        .and_then(|v| v.split(',').next().map(str::to_string))
        .unwrap_or_default();
    if name.is_empty() || name == "-" {
        return Err(RecgraphError::MissingJsonTag(field.ident.to_string()));
    }
    Ok(name)
}

/// Constraint named by the `db` tag; unknown keys and values are ignored
pub fn constraint(field: &Field) -> Option<Constraint> {
    let db = lookup(field.tag, "db")?;
    db.split(',')
        .filter_map(|pair| pair.split_once('='))
        .filter(|(key, _)| key.trim() == "constraint")
        .find_map(|(_, value)| Constraint::parse(value.trim()))
}

/// Reverse predicate named by `readFrom:"type=<T>,field=<F>"`
pub fn reverse_edge(field: &Field) -> Result<Option<String>> {
    let Some(tag) = lookup(field.tag, "readFrom") else {
        return Ok(None);
    };
    let malformed = || RecgraphError::MalformedReverseTag {
        field: field.ident.to_string(),
        tag: tag.clone(),
    };

    let mut parts = tag.split(',');
    let (Some(first), Some(second), None) = (parts.next(), parts.next(), parts.next()) else {
        return Err(malformed());
    };
    let type_name = first.trim().strip_prefix("type=").ok_or_else(malformed)?;
    let field_name = second.trim().strip_prefix("field=").ok_or_else(malformed)?;
    if type_name.is_empty() || field_name.is_empty() {
        return Err(malformed());
    }
    Ok(Some(predicate_name(type_name, field_name)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Shape;
    use proptest::prelude::*;

    fn field(tag: &'static str) -> Field {
        Field::new("ClerkId", tag, Shape::String)
    }

    #[test]
    fn test_lookup_multiple_keys() {
        let tag = r#"json:"clerk_id,omitempty" db:"constraint=unique""#;
        assert_eq!(lookup(tag, "json").as_deref(), Some("clerk_id,omitempty"));
        assert_eq!(lookup(tag, "db").as_deref(), Some("constraint=unique"));
        assert_eq!(lookup(tag, "readFrom"), None);
    }

    #[test]
    fn test_lookup_escapes() {
        assert_eq!(lookup(r#"x:"a\"b""#, "x").as_deref(), Some("a\"b"));
        assert_eq!(lookup(r#"x:"unterminated"#, "x"), None);
    }

    #[test]
    fn test_json_name() {
        assert_eq!(json_name(&field(r#"json:"clerk_id,omitempty""#)).unwrap(), "clerk_id");
        let err = json_name(&field(r#"db:"constraint=unique""#)).unwrap_err();
        assert_eq!(err.to_string(), "field ClerkId has no json tag");
        assert!(json_name(&field(r#"json:",omitempty""#)).is_err());
    }

    #[test]
    fn test_constraint() {
        assert_eq!(
            constraint(&field(r#"json:"a" db:"constraint=unique""#)),
            Some(Constraint::Unique)
        );
        assert_eq!(
            constraint(&field(r#"json:"a" db:"other=1,constraint=vector""#)),
            Some(Constraint::Vector)
        );
        assert_eq!(constraint(&field(r#"json:"a" db:"constraint=btree""#)), None);
        assert_eq!(constraint(&field(r#"json:"a""#)), None);
    }

    #[test]
    fn test_reverse_edge() {
        let f = field(r#"json:"branches" readFrom:"type=Branch,field=proj""#);
        assert_eq!(reverse_edge(&f).unwrap().as_deref(), Some("Branch.proj"));
        assert_eq!(reverse_edge(&field(r#"json:"a""#)).unwrap(), None);

        let bad = field(r#"json:"branches" readFrom:"Branch.proj""#);
        assert!(matches!(
            reverse_edge(&bad),
            Err(RecgraphError::MalformedReverseTag { .. })
        ));
        let reordered = field(r#"json:"branches" readFrom:"field=proj,type=Branch""#);
        assert!(reverse_edge(&reordered).is_err());
    }

    proptest! {
        #[test]
        fn test_lookup_finds_any_plain_value(value in "[a-z_,=]{0,24}") {
            let tag = format!(r#"json:"{value}" db:"constraint=term""#);
            prop_assert_eq!(lookup(&tag, "json"), Some(value));
            prop_assert_eq!(lookup(&tag, "db"), Some("constraint=term".to_string()));
        }

        #[test]
        fn test_json_name_is_first_token(name in "[a-z][a-z0-9_]{0,12}", opts in "(,[a-z]{1,8}){0,2}") {
            let tag: &'static str = Box::leak(format!(r#"json:"{name}{opts}""#).into_boxed_str());
            prop_assert_eq!(json_name(&Field::new("F", tag, Shape::String)).unwrap(), name);
        }
    }
}
