//! Bulk-load formats: DQL schema files and N-Quad RDF

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use recgraph_core::{
    parse_uid, NQuad, Object, PredicateKind, RecgraphError, Result, SchemaChange, SchemaUpdate,
    Subject, TypeUpdate, Value, VectorIndexSpec,
};
use regex::Regex;

const TYPE_BLOCK: &str = r"(?s)\btype\s+<?([^\s{<>]+)>?\s*\{([^}]*)\}";
const PREDICATE_LINE: &str = r"^<?([^\s:<>]+)>?\s*:\s*(\[?\s*[A-Za-z0-9]+\s*\]?)(.*)\.\s*$";

fn compile(pattern: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|e| RecgraphError::engine(format!("schema pattern: {e}")))
}

fn load_error(msg: impl std::fmt::Display) -> RecgraphError {
    RecgraphError::engine(msg)
}

// ============================================================================
// Schema files
// ============================================================================

/// Parse a DQL schema file into predicate and type declarations
pub fn parse_schema(text: &str) -> Result<SchemaChange> {
    let text: String = text
        .lines()
        .map(|l| l.split('#').next().unwrap_or_default())
        .collect::<Vec<_>>()
        .join("\n");

    let type_block = compile(TYPE_BLOCK)?;
    let predicate_line = compile(PREDICATE_LINE)?;
    let mut change = SchemaChange::default();

    for caps in type_block.captures_iter(&text) {
        let fields = caps[2]
            .split(['\n', ','])
            .filter_map(|line| {
                let name = line.split(':').next().unwrap_or_default().trim();
                let name = name.trim_start_matches('<').trim_end_matches('>');
                (!name.is_empty()).then(|| name.to_string())
            })
            .collect();
        change.types.push(TypeUpdate {
            name: caps[1].to_string(),
            fields,
        });
    }

    let rest = type_block.replace_all(&text, "");
    for (lineno, line) in rest.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let caps = predicate_line
            .captures(line)
            .ok_or_else(|| load_error(format!("schema line {}: cannot parse {line:?}", lineno + 1)))?;
        change.predicates.push(parse_predicate(&caps[1], &caps[2], &caps[3])?);
    }

    Ok(change)
}

fn parse_predicate(name: &str, ty: &str, directives: &str) -> Result<SchemaUpdate> {
    let list = ty.starts_with('[');
    let ty_name = ty.trim_matches(|c: char| c == '[' || c == ']' || c.is_whitespace());
    let kind = PredicateKind::from_schema_name(ty_name)
        .ok_or_else(|| load_error(format!("unknown type {ty_name} for predicate {name}")))?;
    let mut update = SchemaUpdate::new(name, kind);
    update.list = list;

    let mut rest = directives.trim();
    while let Some(after_at) = rest.strip_prefix('@') {
        let end = after_at
            .find(|c: char| !(c.is_alphanumeric() || c == '_'))
            .unwrap_or(after_at.len());
        let directive = &after_at[..end];
        rest = after_at[end..].trim_start();

        let args = if rest.starts_with('(') {
            let close = matching_paren(rest)
                .ok_or_else(|| load_error(format!("unbalanced parentheses on {name}")))?;
            let inner = &rest[1..close];
            rest = rest[close + 1..].trim_start();
            Some(inner)
        } else {
            None
        };

        match directive {
            "index" => {
                for item in split_top_level(args.unwrap_or_default()) {
                    match item.find('(') {
                        Some(open) => update.vector_specs.push(VectorIndexSpec {
                            name: item[..open].trim().to_string(),
                            options: parse_options(&item[open + 1..item.len().saturating_sub(1)]),
                        }),
                        None => update.tokenizers.push(item.to_string()),
                    }
                }
            }
            "reverse" => update.reverse = true,
            "unique" => update.unique = true,
            "upsert" => update.upsert = true,
            // @count, @lang, @noconflict carry no meaning here
            _ => {}
        }
    }

    Ok(update)
}

fn matching_paren(text: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_str = false;
    for (i, c) in text.char_indices() {
        match c {
            '"' => in_str = !in_str,
            '(' if !in_str => depth += 1,
            ')' if !in_str => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

fn split_top_level(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut depth = 0usize;
    let mut in_str = false;
    let mut current = String::new();
    for c in text.chars() {
        match c {
            '"' => in_str = !in_str,
            '(' if !in_str => depth += 1,
            ')' if !in_str => depth = depth.saturating_sub(1),
            ',' if !in_str && depth == 0 => {
                let item = current.trim().to_string();
                if !item.is_empty() {
                    out.push(item);
                }
                current.clear();
                continue;
            }
            _ => {}
        }
        current.push(c);
    }
    let item = current.trim().to_string();
    if !item.is_empty() {
        out.push(item);
    }
    out
}

fn parse_options(text: &str) -> Vec<(String, String)> {
    split_top_level(text)
        .into_iter()
        .filter_map(|opt| {
            let (k, v) = opt.split_once(':')?;
            Some((k.trim().to_string(), v.trim().trim_matches('"').to_string()))
        })
        .collect()
}

// ============================================================================
// N-Quads
// ============================================================================

/// Parse an N-Quad document. Language tags, facets and graph labels are
/// dropped; typed literals are converted according to their XSD type.
pub fn parse_nquads(text: &str) -> Result<Vec<NQuad>> {
    let mut quads = Vec::new();
    for (lineno, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let quad = parse_line(line)
            .map_err(|e| load_error(format!("rdf line {}: {e}", lineno + 1)))?;
        quads.push(quad);
    }
    Ok(quads)
}

struct Cursor<'a> {
    text: &'a str,
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn rest(&self) -> &'a str {
        &self.text[self.pos..]
    }

    fn skip_ws(&mut self) {
        let rest = self.rest();
        self.pos += rest.len() - rest.trim_start().len();
    }

    fn iri(&mut self) -> std::result::Result<&'a str, String> {
        let rest = self.rest();
        let end = rest.find('>').ok_or("unterminated <iri>")?;
        self.pos += end + 1;
        Ok(&rest[1..end])
    }

    fn blank(&mut self) -> &'a str {
        let rest = &self.rest()[2..];
        let end = rest
            .find(|c: char| c.is_whitespace())
            .unwrap_or(rest.len());
        self.pos += 2 + end;
        &rest[..end]
    }

    fn literal(&mut self) -> std::result::Result<String, String> {
        let mut out = String::new();
        let mut chars = self.rest().char_indices().skip(1);
        while let Some((i, c)) = chars.next() {
            match c {
                '"' => {
                    self.pos += i + 1;
                    return Ok(out);
                }
                '\\' => match chars.next() {
                    Some((_, 'n')) => out.push('\n'),
                    Some((_, 't')) => out.push('\t'),
                    Some((_, 'r')) => out.push('\r'),
                    Some((_, 'u')) => {
                        let hex: String = chars.by_ref().take(4).map(|(_, c)| c).collect();
                        let code = u32::from_str_radix(&hex, 16)
                            .map_err(|_| format!("invalid escape \\u{hex}"))?;
                        out.push(char::from_u32(code).unwrap_or(char::REPLACEMENT_CHARACTER));
                    }
                    Some((_, other)) => out.push(other),
                    None => break,
                },
                c => out.push(c),
            }
        }
        Err("unterminated literal".to_string())
    }
}

fn node_ref(name: &str) -> std::result::Result<Subject, String> {
    if name.starts_with("0x") || name.starts_with("0X") {
        parse_uid(name)
            .map(Subject::Uid)
            .map_err(|e| e.to_string())
    } else {
        Ok(Subject::Blank(name.to_string()))
    }
}

fn subject_to_object(subject: Subject) -> Object {
    match subject {
        Subject::Uid(uid) => Object::Uid(uid),
        Subject::Blank(label) => Object::Blank(label),
    }
}

fn typed_literal(text: String, datatype: &str) -> std::result::Result<Value, String> {
    let local = datatype.rsplit([':', '#']).next().unwrap_or(datatype);
    let kind = match local {
        "string" | "password" => return Ok(Value::Str(text)),
        "int" | "integer" | "long" => PredicateKind::Int,
        "float" | "double" | "decimal" => PredicateKind::Float,
        "boolean" => PredicateKind::Bool,
        "dateTime" | "date" => PredicateKind::DateTime,
        "geojson" => PredicateKind::Geo,
        "base64Binary" => {
            return STANDARD
                .decode(text.trim())
                .map(Value::Bytes)
                .map_err(|e| e.to_string())
        }
        "vfloat" | "float32vector" => PredicateKind::VFloat,
        _ => return Ok(Value::Default(text)),
    };
    Value::Default(text).convert(kind).map_err(|e| e.to_string())
}

fn parse_line(line: &str) -> std::result::Result<NQuad, String> {
    let mut cur = Cursor { text: line, pos: 0 };

    let subject = if cur.rest().starts_with('<') {
        node_ref(cur.iri()?)?
    } else if cur.rest().starts_with("_:") {
        Subject::Blank(cur.blank().to_string())
    } else {
        return Err(format!("invalid subject in {line:?}"));
    };

    cur.skip_ws();
    if !cur.rest().starts_with('<') {
        return Err(format!("invalid predicate in {line:?}"));
    }
    let predicate = cur.iri()?.to_string();

    cur.skip_ws();
    let object = if cur.rest().starts_with('<') {
        subject_to_object(node_ref(cur.iri()?)?)
    } else if cur.rest().starts_with("_:") {
        Object::Blank(cur.blank().to_string())
    } else if cur.rest().starts_with('*') {
        cur.pos += 1;
        Object::Star
    } else if cur.rest().starts_with('"') {
        let text = cur.literal()?;
        if cur.rest().starts_with("^^") {
            cur.pos += 2;
            let datatype = cur.iri()?;
            Object::Value(typed_literal(text, datatype)?)
        } else {
            if cur.rest().starts_with('@') {
                let rest = cur.rest();
                let end = rest
                    .find(|c: char| c.is_whitespace())
                    .unwrap_or(rest.len());
                cur.pos += end;
            }
            Object::Value(Value::Default(text))
        }
    } else {
        return Err(format!("invalid object in {line:?}"));
    };

    // facets `( ... )`, graph labels and the closing `.` are not interpreted
    let tail = cur.rest().trim();
    if !tail.ends_with('.') {
        return Err(format!("missing terminating . in {line:?}"));
    }

    Ok(NQuad {
        subject,
        predicate,
        object,
    })
}
