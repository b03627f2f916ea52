//! Reference path parsing and traversal
//!
//! Supports:
//! - a.b.c (dot notation)
//! - a.items[0].b (array index)
//!
//! Does NOT support:
//! - Wildcards: a.items[*]
//! - Slices: a.items[0:5]
//!
//! Paths are parsed once at validation time into typed segments; traversal is
//! a uniform walk over the serde_json::Value variant (null/bool/number/string/
//! array/object), so the resolver never depends on a block kind's own shape.

use serde_json::Value;

use crate::error::SkeinError;

/// A parsed path segment
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// Object field access: .field
    Field(String),
    /// Array index access: [0]
    Index(usize),
}

impl std::fmt::Display for Segment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Segment::Field(name) => write!(f, "{}", name),
            Segment::Index(i) => write!(f, "[{}]", i),
        }
    }
}

/// Parse a path string into segments
///
/// Examples:
/// - "body.count" → [Field("body"), Field("count")]
/// - "items[0].name" → [Field("items"), Index(0), Field("name")]
/// - "" → [] (root reference)
pub fn parse(path: &str) -> Result<Vec<Segment>, SkeinError> {
    if path.is_empty() {
        return Ok(vec![]);
    }

    let mut segments = Vec::new();

    for part in path.split('.') {
        if part.is_empty() {
            return Err(SkeinError::InvalidPath {
                path: path.to_string(),
            });
        }

        let mut rest = part;

        // Field before any bracket: field[0][1] → Field + Index + Index
        if let Some(bracket_pos) = rest.find('[') {
            let field = &rest[..bracket_pos];
            if !field.is_empty() {
                segments.push(Segment::Field(field.to_string()));
            }
            rest = &rest[bracket_pos..];

            while !rest.is_empty() {
                if !rest.starts_with('[') {
                    return Err(SkeinError::InvalidPath {
                        path: path.to_string(),
                    });
                }
                let close = rest.find(']').ok_or_else(|| SkeinError::InvalidPath {
                    path: path.to_string(),
                })?;
                let index: usize =
                    rest[1..close].parse().map_err(|_| SkeinError::InvalidPath {
                        path: path.to_string(),
                    })?;
                segments.push(Segment::Index(index));
                rest = &rest[close + 1..];
            }
        } else {
            segments.push(Segment::Field(rest.to_string()));
        }
    }

    Ok(segments)
}

/// Walk segments through a value, returning the reached sub-value.
///
/// Returns Ok(None) when a field/index does not exist on an object/array
/// (the caller maps this to FieldNotFound against the owning block).
/// Traversing *into* a scalar is an InvalidTraversal error.
pub fn walk<'a>(
    value: &'a Value,
    segments: &[Segment],
    full_path: &str,
) -> Result<Option<&'a Value>, SkeinError> {
    let mut current = value;

    for segment in segments {
        let next = match (segment, current) {
            (Segment::Field(name), Value::Object(map)) => map.get(name),
            (Segment::Index(i), Value::Array(items)) => items.get(*i),
            // Numeric field on an array would be a parse bug, not a data bug
            (Segment::Field(_), Value::Array(_)) | (Segment::Index(_), Value::Object(_)) => None,
            (segment, scalar) => {
                return Err(SkeinError::InvalidTraversal {
                    segment: segment.to_string(),
                    value_type: value_type_name(scalar).to_string(),
                    path: full_path.to_string(),
                });
            }
        };

        match next {
            Some(v) => current = v,
            None => return Ok(None),
        }
    }

    Ok(Some(current))
}

/// Human-readable name of a JSON value's variant
pub fn value_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
