//! Path evaluation over JSON documents.
//!
//! Reference paths (fields and indexes only) are walked directly. Paths with
//! wildcards, slices or filters are translated to JMESPath and evaluated with
//! the `jmespath` crate. Paths starting with `$$` address the context object.

pub mod intrinsic;
pub mod payload;

use serde_json::{Map, Value};

use crate::error::PathError;

/// One step of a parsed path
#[derive(Debug, Clone, PartialEq)]
pub enum Segment {
    Field(String),
    Index(i64),
    ArrayWildcard,
    ObjectWildcard,
    Slice(Option<i64>, Option<i64>, Option<i64>),
    Filter(String),
}

/// A parsed path expression
#[derive(Debug, Clone, PartialEq)]
pub struct Path {
    raw: String,
    context: bool,
    segments: Vec<Segment>,
    // Only set for paths that are not reference paths
    jmespath: Option<String>,
}

impl Path {
    pub fn parse(expression: &str) -> Result<Self, PathError> {
        let (context, rest) = if let Some(rest) = expression.strip_prefix("$$") {
            (true, rest)
        } else if let Some(rest) = expression.strip_prefix('$') {
            (false, rest)
        } else {
            return Err(PathError::new(expression, format!("Path \"{}\" must start with \"$\"", expression)));
        };

        let segments = parse_segments(expression, rest)?;
        let mut path = Path {
            raw: expression.to_string(),
            context,
            segments,
            jmespath: None,
        };

        if !path.is_reference() {
            let translated = to_jmespath(&path.segments, expression)?;
            jmespath::compile(&translated).map_err(|err| {
                PathError::new(expression, format!("Path \"{}\" is not supported: {}", expression, err))
            })?;
            path.jmespath = Some(translated);
        }

        Ok(path)
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Whether the path addresses the context object (`$$`)
    pub fn is_context(&self) -> bool {
        self.context
    }

    /// Whether the path addresses a single node: fields and indexes only
    pub fn is_reference(&self) -> bool {
        self.segments
            .iter()
            .all(|segment| matches!(segment, Segment::Field(_) | Segment::Index(_)))
    }

    /// Evaluate against a document, or against the context object for `$$` paths
    pub fn evaluate(&self, input: &Value, context: &Value) -> Result<Value, PathError> {
        let root = if self.context { context } else { input };

        match &self.jmespath {
            None => self.walk(root).cloned(),
            Some(expression) => {
                let compiled = jmespath::compile(expression)
                    .map_err(|err| PathError::new(&self.raw, err.to_string()))?;
                let result = compiled
                    .search(root)
                    .map_err(|err| PathError::new(&self.raw, format!("Path \"{}\" failed: {}", self.raw, err)))?;
                serde_json::to_value(&*result).map_err(|err| PathError::new(&self.raw, err.to_string()))
            }
        }
    }

    fn walk<'a>(&self, root: &'a Value) -> Result<&'a Value, PathError> {
        let mut node = root;
        for segment in &self.segments {
            let next = match segment {
                Segment::Field(name) => node.as_object().and_then(|object| object.get(name)),
                Segment::Index(index) => node
                    .as_array()
                    .and_then(|items| resolve_index(*index, items.len()).map(|i| &items[i])),
                _ => None,
            };
            node = next.ok_or_else(|| self.unresolved())?;
        }
        Ok(node)
    }

    /// Copy `data` and set `value` at this path, creating missing objects along the way
    pub fn set(&self, data: &Value, value: Value) -> Result<Value, PathError> {
        if self.context || !self.is_reference() {
            return Err(PathError::new(
                &self.raw,
                format!("Path \"{}\" is not a reference path", self.raw),
            ));
        }
        let mut root = data.clone();
        set_in(&mut root, &self.segments, value, &self.raw)?;
        Ok(root)
    }

    fn unresolved(&self) -> PathError {
        PathError::new(&self.raw, format!("Path \"{}\" could not be resolved", self.raw))
    }
}

impl std::fmt::Display for Path {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.raw)
    }
}

fn resolve_index(index: i64, len: usize) -> Option<usize> {
    let resolved = if index < 0 { len as i64 + index } else { index };
    (0..len as i64).contains(&resolved).then_some(resolved as usize)
}

fn set_in(node: &mut Value, segments: &[Segment], value: Value, raw: &str) -> Result<(), PathError> {
    let Some((first, rest)) = segments.split_first() else {
        *node = value;
        return Ok(());
    };

    match first {
        Segment::Field(name) => {
            let object = node.as_object_mut().ok_or_else(|| {
                PathError::new(raw, format!("Cannot set \"{}\": field \"{}\" is inside a non-object", raw, name))
            })?;
            let child = object
                .entry(name.clone())
                .or_insert_with(|| Value::Object(Map::new()));
            set_in(child, rest, value, raw)
        }
        Segment::Index(index) => {
            let items = node.as_array_mut().ok_or_else(|| {
                PathError::new(raw, format!("Cannot set \"{}\": index {} is inside a non-array", raw, index))
            })?;
            let i = resolve_index(*index, items.len()).ok_or_else(|| {
                PathError::new(raw, format!("Cannot set \"{}\": index {} is out of bounds", raw, index))
            })?;
            set_in(&mut items[i], rest, value, raw)
        }
        _ => Err(PathError::new(raw, format!("Path \"{}\" is not a reference path", raw))),
    }
}

fn parse_segments(expression: &str, mut rest: &str) -> Result<Vec<Segment>, PathError> {
    let invalid = |detail: &str| PathError::new(expression, format!("Invalid path \"{}\": {}", expression, detail));
    let mut segments = Vec::new();

    while !rest.is_empty() {
        if let Some(after) = rest.strip_prefix('.') {
            if let Some(after) = after.strip_prefix('*') {
                segments.push(Segment::ObjectWildcard);
                rest = after;
                continue;
            }
            let end = after.find(['.', '[']).unwrap_or(after.len());
            let name = &after[..end];
            if name.is_empty() {
                return Err(invalid("empty field name"));
            }
            segments.push(Segment::Field(name.to_string()));
            rest = &after[end..];
        } else if let Some(after) = rest.strip_prefix("['") {
            let end = after.find("']").ok_or_else(|| invalid("unterminated ['...']"))?;
            segments.push(Segment::Field(after[..end].to_string()));
            rest = &after[end + 2..];
        } else if let Some(after) = rest.strip_prefix("[?(") {
            let end = after.find(")]").ok_or_else(|| invalid("unterminated filter"))?;
            segments.push(Segment::Filter(after[..end].trim().to_string()));
            rest = &after[end + 2..];
        } else if let Some(after) = rest.strip_prefix('[') {
            let end = after.find(']').ok_or_else(|| invalid("unterminated ["))?;
            let inner = after[..end].trim();
            let segment = if inner == "*" {
                Segment::ArrayWildcard
            } else if inner.contains(':') {
                parse_slice(inner).ok_or_else(|| invalid("malformed slice"))?
            } else {
                Segment::Index(inner.parse::<i64>().map_err(|_| invalid("malformed index"))?)
            };
            segments.push(segment);
            rest = &after[end + 1..];
        } else {
            return Err(invalid("unexpected character"));
        }
    }

    Ok(segments)
}

fn parse_slice(inner: &str) -> Option<Segment> {
    let parts: Vec<&str> = inner.split(':').map(str::trim).collect();
    if parts.len() > 3 {
        return None;
    }
    let bound = |part: Option<&&str>| -> Option<Option<i64>> {
        match part {
            None => Some(None),
            Some(text) if text.is_empty() => Some(None),
            Some(text) => text.parse::<i64>().ok().map(Some),
        }
    };
    Some(Segment::Slice(bound(parts.first())?, bound(parts.get(1))?, bound(parts.get(2))?))
}

fn quote(name: &str) -> String {
    // A JSON string is a valid JMESPath quoted identifier
    serde_json::to_string(name).unwrap_or_else(|_| format!("\"{}\"", name))
}

fn to_jmespath(segments: &[Segment], expression: &str) -> Result<String, PathError> {
    let mut out = String::new();

    for segment in segments {
        match segment {
            Segment::Field(name) => {
                if !out.is_empty() {
                    out.push('.');
                }
                out.push_str(&quote(name));
            }
            Segment::Index(index) => out.push_str(&format!("[{}]", index)),
            Segment::ArrayWildcard => out.push_str("[*]"),
            Segment::ObjectWildcard => out.push_str(if out.is_empty() { "*" } else { ".*" }),
            Segment::Slice(start, stop, step) => {
                let part = |bound: &Option<i64>| bound.map(|b| b.to_string()).unwrap_or_default();
                out.push_str(&format!("[{}:{}", part(start), part(stop)));
                if let Some(step) = step {
                    out.push_str(&format!(":{}", step));
                }
                out.push(']');
            }
            Segment::Filter(filter) => {
                out.push_str(&format!("[?{}]", translate_filter(filter, expression)?));
            }
        }
    }

    if out.is_empty() {
        out.push('@');
    }
    Ok(out)
}

const COMPARISONS: &[&str] = &["==", "!=", "<=", ">=", "<", ">"];

/// Translate a JSONPath filter body such as `@.price > 10 && @.kind == 'book'`
fn translate_filter(filter: &str, expression: &str) -> Result<String, PathError> {
    let mut out = String::new();
    let mut rest = filter;

    loop {
        let split = ["&&", "||"]
            .iter()
            .filter_map(|token| find_outside_quotes(rest, token).map(|at| (at, *token)))
            .min_by_key(|(at, _)| *at);

        match split {
            Some((at, token)) => {
                out.push_str(&translate_clause(rest[..at].trim(), expression)?);
                out.push_str(&format!(" {} ", token));
                rest = &rest[at + token.len()..];
            }
            None => {
                out.push_str(&translate_clause(rest.trim(), expression)?);
                return Ok(out);
            }
        }
    }
}

fn translate_clause(clause: &str, expression: &str) -> Result<String, PathError> {
    for op in COMPARISONS {
        if let Some(at) = find_outside_quotes(clause, op) {
            let lhs = translate_operand(clause[..at].trim(), expression)?;
            let rhs = translate_operand(clause[at + op.len()..].trim(), expression)?;
            return Ok(format!("{} {} {}", lhs, op, rhs));
        }
    }
    translate_operand(clause, expression)
}

fn translate_operand(operand: &str, expression: &str) -> Result<String, PathError> {
    if let Some(rest) = operand.strip_prefix('@') {
        let segments = parse_segments(expression, rest)?;
        return to_jmespath(&segments, expression);
    }

    let literal: Value = if let Some(text) = operand.strip_prefix('\'').and_then(|o| o.strip_suffix('\'')) {
        Value::String(text.to_string())
    } else {
        serde_json::from_str(operand).map_err(|_| {
            PathError::new(expression, format!("Invalid path \"{}\": unsupported filter operand {}", expression, operand))
        })?
    };
    Ok(format!("`{}`", literal))
}

fn find_outside_quotes(text: &str, token: &str) -> Option<usize> {
    let mut quote: Option<char> = None;
    for (at, c) in text.char_indices() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None if c == '\'' || c == '"' => quote = Some(c),
            None if text[at..].starts_with(token) => return Some(at),
            None => {}
        }
    }
    None
}
