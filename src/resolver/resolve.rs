//! Reference Resolution - config rewriting against upstream outputs
//!
//! Rewrites a block's configuration by substituting `<id.path>` references
//! with literal values taken from already-completed upstream outputs:
//! - a string that is exactly one reference takes the upstream value typed
//!   (objects stay objects, numbers stay numbers)
//! - references embedded in longer strings interpolate their display form
//!   in a single pass (Cow: zero alloc when a string has no references)
//!
//! Status gating: the referenced block must be Succeeded. A reference into a
//! branch-pruned block resolves to null so merge blocks below a condition
//! keep working. Any other status is UpstreamNotReady, a scheduler
//! invariant violation that aborts the run, never a block failure.
//!
//! Resolution is deterministic and side-effect-free: the same context always
//! yields the same resolved configuration.

use std::borrow::Cow;

use serde_json::{Map, Value};

use crate::context::{BlockStatus, ExecutionContext, SkipReason};
use crate::error::SkeinError;
use crate::graph::reference::{self, BlockRef};
use crate::graph::BlockSpec;

use super::path;

/// Resolve a block's full configuration to a literal parameter map
pub fn resolve_config(
    block: &BlockSpec,
    context: &ExecutionContext,
    run_input: &Value,
) -> Result<Map<String, Value>, SkeinError> {
    let mut resolved = Map::with_capacity(block.config.len());
    for (key, value) in &block.config {
        resolved.insert(key.clone(), resolve_value(value, context, run_input)?);
    }
    Ok(resolved)
}

/// Resolve one configuration value recursively
pub fn resolve_value(
    value: &Value,
    context: &ExecutionContext,
    run_input: &Value,
) -> Result<Value, SkeinError> {
    match value {
        Value::String(s) => resolve_string(s, context, run_input),
        Value::Array(items) => items
            .iter()
            .map(|item| resolve_value(item, context, run_input))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        Value::Object(map) => {
            let mut out = Map::with_capacity(map.len());
            for (k, v) in map {
                out.insert(k.clone(), resolve_value(v, context, run_input)?);
            }
            Ok(Value::Object(out))
        }
        other => Ok(other.clone()),
    }
}

fn resolve_string(
    s: &str,
    context: &ExecutionContext,
    run_input: &Value,
) -> Result<Value, SkeinError> {
    if !reference::may_contain_ref(s) {
        return Ok(Value::String(s.to_string()));
    }

    // Whole-value reference: substitute the typed upstream value
    if let Some(r) = reference::whole_ref(s)? {
        return lookup(&r, context, run_input);
    }

    // Embedded references: single-pass interpolation
    match interpolate(s, context, run_input)? {
        Cow::Borrowed(_) => Ok(Value::String(s.to_string())),
        Cow::Owned(out) => Ok(Value::String(out)),
    }
}

/// Interpolate embedded references into a string.
///
/// Returns Cow::Borrowed when the string contains no references.
fn interpolate<'a>(
    template: &'a str,
    context: &ExecutionContext,
    run_input: &Value,
) -> Result<Cow<'a, str>, SkeinError> {
    let refs = reference::extract_from_str(template)?;
    if refs.is_empty() {
        return Ok(Cow::Borrowed(template));
    }

    let mut result = String::with_capacity(template.len() + 64);
    let mut last_end = 0;

    for spanned in &refs {
        result.push_str(&template[last_end..spanned.start]);
        let value = lookup(&spanned.reference, context, run_input)?;
        result.push_str(&display_value(&value));
        last_end = spanned.end;
    }
    result.push_str(&template[last_end..]);

    Ok(Cow::Owned(result))
}

/// Fetch the value a reference points at.
fn lookup(
    reference: &BlockRef,
    context: &ExecutionContext,
    run_input: &Value,
) -> Result<Value, SkeinError> {
    if reference.is_input() {
        return walk_ref(run_input, reference);
    }

    let record = context.get(&reference.source).ok_or_else(|| {
        // Validation guarantees the block exists; a missing record means the
        // scheduler dispatched against the wrong context.
        SkeinError::UpstreamNotReady {
            block_id: reference.source.to_string(),
            status: "absent".to_string(),
        }
    })?;

    match record.status {
        BlockStatus::Succeeded => {
            let output = record.output.as_deref().unwrap_or(&Value::Null);
            walk_ref(output, reference)
        }
        BlockStatus::Skipped if record.skip_reason == Some(SkipReason::BranchNotSelected) => {
            Ok(Value::Null)
        }
        status => Err(SkeinError::UpstreamNotReady {
            block_id: reference.source.to_string(),
            status: status.as_str().to_string(),
        }),
    }
}

fn walk_ref(root: &Value, reference: &BlockRef) -> Result<Value, SkeinError> {
    match path::walk(root, &reference.segments, &reference.path)? {
        Some(v) => Ok(v.clone()),
        None => Err(SkeinError::FieldNotFound {
            block_id: reference.source.to_string(),
            path: reference.path.clone(),
        }),
    }
}

/// Display form for interpolated values: strings verbatim, scalars via
/// to_string, objects/arrays as compact JSON.
fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::BlockFailure;
    use crate::util::intern;
    use serde_json::json;
    use std::time::Duration;

    fn context_with(outputs: &[(&str, Value)]) -> ExecutionContext {
        let ctx = ExecutionContext::new(outputs.iter().map(|(id, _)| intern(id)));
        for (id, output) in outputs {
            ctx.mark_ready(id).unwrap();
            ctx.mark_running(id).unwrap();
            ctx.complete_success(id, output.clone(), None, Duration::ZERO)
                .unwrap();
        }
        ctx
    }

    fn resolve_one(s: &str, ctx: &ExecutionContext) -> Result<Value, SkeinError> {
        resolve_value(&json!(s), ctx, &Value::Null)
    }

    // ═══════════════════════════════════════════════════════════════
    // WHOLE-VALUE SUBSTITUTION
    // ═══════════════════════════════════════════════════════════════

    #[test]
    fn whole_reference_keeps_type() {
        let ctx = context_with(&[("fetch", json!({"count": 7, "tags": ["a", "b"]}))]);

        assert_eq!(resolve_one("<fetch.count>", &ctx).unwrap(), json!(7));
        assert_eq!(
            resolve_one("<fetch.tags>", &ctx).unwrap(),
            json!(["a", "b"])
        );
        assert_eq!(
            resolve_one("<fetch>", &ctx).unwrap(),
            json!({"count": 7, "tags": ["a", "b"]})
        );
    }

    #[test]
    fn array_index_reference() {
        let ctx = context_with(&[("list", json!({"items": [{"n": 1}, {"n": 2}]}))]);
        assert_eq!(resolve_one("<list.items[1].n>", &ctx).unwrap(), json!(2));
    }

    // ═══════════════════════════════════════════════════════════════
    // STRING INTERPOLATION
    // ═══════════════════════════════════════════════════════════════

    #[test]
    fn embedded_reference_interpolates() {
        let ctx = context_with(&[("user", json!({"name": "Ada", "score": 9.5}))]);
        let out = resolve_one("Hello <user.name>, score <user.score>!", &ctx).unwrap();
        assert_eq!(out, json!("Hello Ada, score 9.5!"));
    }

    #[test]
    fn embedded_object_interpolates_as_json() {
        let ctx = context_with(&[("cfg", json!({"opts": {"debug": true}}))]);
        let out = resolve_one("opts=<cfg.opts>", &ctx).unwrap();
        assert_eq!(out, json!(r#"opts={"debug":true}"#));
    }

    #[test]
    fn plain_string_passes_through() {
        let ctx = context_with(&[]);
        assert_eq!(
            resolve_one("no references here", &ctx).unwrap(),
            json!("no references here")
        );
        // '<' without reference grammar is left untouched
        assert_eq!(resolve_one("a < b", &ctx).unwrap(), json!("a < b"));
    }

    // ═══════════════════════════════════════════════════════════════
    // NESTED CONFIG RESOLUTION
    // ═══════════════════════════════════════════════════════════════

    #[test]
    fn nested_config_resolves_everywhere() {
        let ctx = context_with(&[("fetch", json!({"body": {"id": 42}}))]);
        let value = json!({
            "url": "https://api.test/items/<fetch.body.id>",
            "payload": {"raw": "<fetch.body>"},
            "list": ["<fetch.body.id>", 3]
        });

        let out = resolve_value(&value, &ctx, &Value::Null).unwrap();
        assert_eq!(
            out,
            json!({
                "url": "https://api.test/items/42",
                "payload": {"raw": {"id": 42}},
                "list": [42, 3]
            })
        );
    }

    #[test]
    fn run_input_reference() {
        let ctx = context_with(&[]);
        let input = json!({"user": {"name": "Grace"}});
        let out = resolve_value(&json!("<input.user.name>"), &ctx, &input).unwrap();
        assert_eq!(out, json!("Grace"));
    }

    // ═══════════════════════════════════════════════════════════════
    // ERROR GATING
    // ═══════════════════════════════════════════════════════════════

    #[test]
    fn missing_field_is_user_facing() {
        let ctx = context_with(&[("fetch", json!({"a": 1}))]);
        let err = resolve_one("<fetch.missing>", &ctx).unwrap_err();
        assert_eq!(err.code(), "SKEIN-040");
        assert!(!err.is_internal());
    }

    #[test]
    fn traversal_into_scalar_is_user_facing() {
        let ctx = context_with(&[("fetch", json!({"n": 1}))]);
        let err = resolve_one("<fetch.n.deep>", &ctx).unwrap_err();
        assert_eq!(err.code(), "SKEIN-041");
    }

    #[test]
    fn pending_upstream_is_invariant_violation() {
        let ctx = ExecutionContext::new([intern("late")]);
        let err = resolve_one("<late.value>", &ctx).unwrap_err();
        assert_eq!(err.code(), "SKEIN-042");
        assert!(err.is_internal());
    }

    #[test]
    fn failed_upstream_is_invariant_violation() {
        // The scheduler skips dependents of failed blocks before resolving;
        // reaching a failed upstream here means the ordering broke.
        let ctx = ExecutionContext::new([intern("bad")]);
        ctx.mark_ready("bad").unwrap();
        ctx.mark_running("bad").unwrap();
        ctx.complete_failure(
            "bad",
            BlockFailure::new("runtime", "x"),
            None,
            Duration::ZERO,
        )
        .unwrap();

        let err = resolve_one("<bad.value>", &ctx).unwrap_err();
        assert_eq!(err.code(), "SKEIN-042");
    }

    #[test]
    fn pruned_upstream_resolves_to_null() {
        let ctx = ExecutionContext::new([intern("pruned")]);
        ctx.mark_skipped("pruned", SkipReason::BranchNotSelected)
            .unwrap();

        assert_eq!(resolve_one("<pruned.value>", &ctx).unwrap(), json!(null));
        assert_eq!(resolve_one("<pruned>", &ctx).unwrap(), json!(null));
    }

    // ═══════════════════════════════════════════════════════════════
    // DETERMINISM
    // ═══════════════════════════════════════════════════════════════

    #[test]
    fn resolution_is_idempotent() {
        let ctx = context_with(&[("fetch", json!({"body": {"n": 1}}))]);
        let value = json!({"a": "<fetch.body>", "b": "n=<fetch.body.n>"});

        let first = resolve_value(&value, &ctx, &Value::Null).unwrap();
        let second = resolve_value(&value, &ctx, &Value::Null).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn substituted_values_are_not_rescanned() {
        // An upstream output containing reference-like text stays literal
        let ctx = context_with(&[("fetch", json!({"text": "<other.thing>"}))]);
        let out = resolve_one("<fetch.text>", &ctx).unwrap();
        assert_eq!(out, json!("<other.thing>"));
    }
}
