//! Reference AST - `<block.path>` expressions inside block configuration
//!
//! References are extracted once, at validation time, into typed
//! [`BlockRef`] values; the resolver and validator both work from the same
//! AST instead of each block kind re-parsing its own strings.
//!
//! Syntax: `<id>`, `<id.field.sub>`, `<id.items[0].name>`.
//! The reserved source id `input` reads the run's initial input.

use std::sync::{Arc, LazyLock};

use regex::Regex;
use serde_json::Value;

use crate::error::SkeinError;
use crate::resolver::path::{self, Segment};
use crate::util::intern;

/// Reserved reference source for the run's initial input
pub const INPUT_SOURCE: &str = "input";

/// Pre-compiled regex for `<id.path>` references.
///
/// Source ids are snake_case; path segments are dot fields or bracket
/// indices. Matches that name no block in the graph are rejected by the
/// validator, not here.
static REF_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<([a-z][a-z0-9_]*)((?:\.[A-Za-z0-9_]+|\[[0-9]+\])*)>").unwrap()
});

/// A typed reference to another block's output
#[derive(Debug, Clone, PartialEq)]
pub struct BlockRef {
    /// Source block id (or `input` for the run input)
    pub source: Arc<str>,
    /// Path below the source output, e.g. "body.items[0].name" (may be empty)
    pub path: String,
    /// Parsed path segments
    pub segments: Vec<Segment>,
}

impl BlockRef {
    /// Render the reference back to its `<...>` form (for error messages)
    pub fn display(&self) -> String {
        if self.path.is_empty() {
            self.source.to_string()
        } else {
            format!("{}.{}", self.source, self.path)
        }
    }

    /// Whether this reference reads the run input rather than a block output
    pub fn is_input(&self) -> bool {
        &*self.source == INPUT_SOURCE
    }
}

/// A reference found inside a string, with its byte span
#[derive(Debug, Clone)]
pub struct SpannedRef {
    pub reference: BlockRef,
    pub start: usize,
    pub end: usize,
}

/// Extract all references from one string
pub fn extract_from_str(s: &str) -> Result<Vec<SpannedRef>, SkeinError> {
    let mut refs = Vec::new();

    for cap in REF_RE.captures_iter(s) {
        let m = cap.get(0).unwrap();
        let source = intern(&cap[1]);
        // Strip the leading dot so "a.b.c" paths parse uniformly
        let raw_path = cap[2].strip_prefix('.').unwrap_or(&cap[2]).to_string();
        let segments = path::parse(&raw_path)?;

        refs.push(SpannedRef {
            reference: BlockRef {
                source,
                path: raw_path,
                segments,
            },
            start: m.start(),
            end: m.end(),
        });
    }

    Ok(refs)
}

/// If the trimmed string is exactly one reference, return it.
///
/// Whole-value references substitute the typed upstream value; references
/// embedded in longer strings interpolate their display form instead.
pub fn whole_ref(s: &str) -> Result<Option<BlockRef>, SkeinError> {
    let trimmed = s.trim();
    let refs = extract_from_str(trimmed)?;
    match refs.as_slice() {
        [only] if only.start == 0 && only.end == trimmed.len() => {
            Ok(Some(only.reference.clone()))
        }
        _ => Ok(None),
    }
}

/// Recursively collect every reference inside a configuration value
pub fn extract_from_value(value: &Value, out: &mut Vec<BlockRef>) -> Result<(), SkeinError> {
    match value {
        Value::String(s) => {
            for spanned in extract_from_str(s)? {
                out.push(spanned.reference);
            }
        }
        Value::Array(items) => {
            for item in items {
                extract_from_value(item, out)?;
            }
        }
        Value::Object(map) => {
            for v in map.values() {
                extract_from_value(v, out)?;
            }
        }
        _ => {}
    }
    Ok(())
}

/// Check whether a string contains any reference syntax at all.
/// Cheap pre-filter before running the regex.
#[inline]
pub fn may_contain_ref(s: &str) -> bool {
    s.contains('<')
}
