//! Graph Validation - description → validated, executable Graph
//!
//! Validates:
//! - schema version and block id format (snake_case, `input` reserved)
//! - duplicate block ids
//! - every `<id.path>` reference resolves to a block present in the graph
//! - condition blocks declare an expression and at least one branch, and
//!   every branch target exists
//! - function blocks carry source code
//! - the derived dependency graph is acyclic
//!
//! Pure function over the description: no side effects, no IO.

use std::sync::Arc;

use rustc_hash::{FxHashMap, FxHashSet};
use xxhash_rust::xxh3::xxh3_64;

use crate::error::SkeinError;
use crate::util::intern;

use super::block::{BlockKind, BlockSpec, GraphDescription};
use super::deps::DepGraph;
use super::reference::{self, BlockRef, INPUT_SOURCE};

/// A validated, immutable block graph ready to run
pub struct Graph {
    blocks: Vec<Arc<BlockSpec>>,
    index: FxHashMap<Arc<str>, usize>,
    deps: DepGraph,
    /// Per-block references extracted from configuration, keyed by block id
    refs: FxHashMap<Arc<str>, Vec<BlockRef>>,
    fingerprint: String,
}

impl Graph {
    /// Look up a block by id
    pub fn block(&self, id: &str) -> Option<&Arc<BlockSpec>> {
        self.index.get(id).map(|&i| &self.blocks[i])
    }

    /// All blocks in description order
    pub fn blocks(&self) -> &[Arc<BlockSpec>] {
        &self.blocks
    }

    /// References extracted from a block's configuration
    pub fn refs(&self, id: &str) -> &[BlockRef] {
        static EMPTY: &[BlockRef] = &[];
        self.refs.get(id).map_or(EMPTY, Vec::as_slice)
    }

    /// The derived dependency graph
    pub fn deps(&self) -> &DepGraph {
        &self.deps
    }

    /// Number of blocks
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Stable 64-bit fingerprint of the graph shape (xxh3 hex)
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }
}

/// Validate a block id: snake_case, non-empty, `input` reserved
pub fn validate_block_id(id: &str) -> Result<(), SkeinError> {
    if id.is_empty() {
        return Err(SkeinError::InvalidBlockId {
            id: id.to_string(),
            reason: "empty id".to_string(),
        });
    }
    if id == INPUT_SOURCE {
        return Err(SkeinError::InvalidBlockId {
            id: id.to_string(),
            reason: format!("'{}' is reserved for the run input", INPUT_SOURCE),
        });
    }
    let mut chars = id.chars();
    let first = chars.next().unwrap();
    if !first.is_ascii_lowercase() {
        return Err(SkeinError::InvalidBlockId {
            id: id.to_string(),
            reason: "must start with a lowercase letter".to_string(),
        });
    }
    if !chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_') {
        return Err(SkeinError::InvalidBlockId {
            id: id.to_string(),
            reason: "only lowercase letters, digits and underscores allowed".to_string(),
        });
    }
    Ok(())
}

/// Validate a description and derive the executable graph
pub fn validate(description: &GraphDescription) -> Result<Graph, SkeinError> {
    description.validate_schema()?;

    // Pass 1: ids (format, reservation, duplicates)
    let mut index: FxHashMap<Arc<str>, usize> =
        FxHashMap::with_capacity_and_hasher(description.blocks.len(), Default::default());
    let mut block_ids: Vec<Arc<str>> = Vec::with_capacity(description.blocks.len());

    for (i, block) in description.blocks.iter().enumerate() {
        validate_block_id(&block.id)?;
        let id = intern(&block.id);
        if index.insert(Arc::clone(&id), i).is_some() {
            return Err(SkeinError::DuplicateBlockId {
                id: block.id.clone(),
            });
        }
        block_ids.push(id);
    }

    // Pass 2: per-block structure, reference extraction, edge derivation
    let mut refs: FxHashMap<Arc<str>, Vec<BlockRef>> = FxHashMap::default();
    let mut edge_set: FxHashSet<(Arc<str>, Arc<str>)> = FxHashSet::default();
    let mut edges: Vec<(Arc<str>, Arc<str>)> = Vec::new();

    for (block, block_id) in description.blocks.iter().zip(&block_ids) {
        validate_shape(block)?;

        let mut block_refs = Vec::new();
        reference::extract_from_value(
            &serde_json::Value::Object(block.config.clone()),
            &mut block_refs,
        )?;

        for r in &block_refs {
            if r.is_input() {
                continue; // run input is always available
            }
            if r.source == *block_id {
                return Err(SkeinError::SelfReference {
                    block_id: block.id.clone(),
                    reference: r.display(),
                });
            }
            if !index.contains_key(&r.source) {
                return Err(SkeinError::UnresolvedReference {
                    block_id: block.id.clone(),
                    reference: r.display(),
                });
            }
            if edge_set.insert((Arc::clone(&r.source), Arc::clone(block_id))) {
                edges.push((Arc::clone(&r.source), Arc::clone(block_id)));
            }
        }

        refs.insert(Arc::clone(block_id), block_refs);

        // Implicit gate edges: condition → each declared branch root
        if let Some(branches) = &block.branches {
            for (branch, targets) in branches {
                for target in targets {
                    if target == &block.id {
                        return Err(SkeinError::UnknownBranchTarget {
                            block_id: block.id.clone(),
                            branch: branch.clone(),
                            target: target.clone(),
                        });
                    }
                    let Some(target_id) = index.get_key_value(target.as_str()).map(|(k, _)| k)
                    else {
                        return Err(SkeinError::UnknownBranchTarget {
                            block_id: block.id.clone(),
                            branch: branch.clone(),
                            target: target.clone(),
                        });
                    };
                    if edge_set.insert((Arc::clone(block_id), Arc::clone(target_id))) {
                        edges.push((Arc::clone(block_id), Arc::clone(target_id)));
                    }
                }
            }
        }
    }

    // Pass 3: acyclicity over the derived edges
    let deps = DepGraph::new(block_ids, &edges);
    deps.detect_cycles()?;

    let fingerprint = compute_fingerprint(description);

    Ok(Graph {
        blocks: description.blocks.clone(),
        index,
        deps,
        refs,
        fingerprint,
    })
}

/// Kind-specific structural requirements
fn validate_shape(block: &BlockSpec) -> Result<(), SkeinError> {
    match block.kind {
        BlockKind::Function => {
            if block.code().is_none() {
                return Err(SkeinError::ValidationError {
                    reason: format!("function block '{}' is missing string config 'code'", block.id),
                });
            }
        }
        BlockKind::Condition => {
            if block.expression().is_none() {
                return Err(SkeinError::ValidationError {
                    reason: format!(
                        "condition block '{}' is missing string config 'expression'",
                        block.id
                    ),
                });
            }
            match &block.branches {
                Some(branches) if !branches.is_empty() => {}
                _ => {
                    return Err(SkeinError::ValidationError {
                        reason: format!(
                            "condition block '{}' must declare at least one branch",
                            block.id
                        ),
                    });
                }
            }
        }
        _ => {
            if block.branches.is_some() {
                return Err(SkeinError::ValidationError {
                    reason: format!(
                        "block '{}' declares branches but is not a condition",
                        block.id
                    ),
                });
            }
        }
    }
    Ok(())
}

/// 64-bit fingerprint of the graph shape: schema + ids + kinds
fn compute_fingerprint(description: &GraphDescription) -> String {
    let mut input = String::new();
    input.push_str(&description.schema);
    for block in &description.blocks {
        input.push_str(&block.id);
        input.push_str(block.kind.as_str());
    }
    format!("{:016x}", xxh3_64(input.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> GraphDescription {
        GraphDescription::from_json(json).unwrap()
    }

    // ═══════════════════════════════════════════════════════════════
    // HAPPY PATH
    // ═══════════════════════════════════════════════════════════════

    #[test]
    fn validate_builds_edges_from_references() {
        let desc = parse(
            r#"{
                "schema": "skein/graph@0.3",
                "blocks": [
                    {"id": "fetch", "kind": "api", "config": {"url": "https://x.test"}},
                    {"id": "enrich", "kind": "function",
                     "config": {"code": "return input", "input": "<fetch.body>"}},
                    {"id": "emit", "kind": "response",
                     "config": {"data": {"value": "<enrich.result>"}}}
                ]
            }"#,
        );

        let graph = validate(&desc).unwrap();
        assert_eq!(graph.len(), 3);

        let enrich_deps: Vec<&str> = graph
            .deps()
            .dependencies("enrich")
            .iter()
            .map(|s| s.as_ref())
            .collect();
        assert_eq!(enrich_deps, vec!["fetch"]);

        let emit_deps: Vec<&str> = graph
            .deps()
            .dependencies("emit")
            .iter()
            .map(|s| s.as_ref())
            .collect();
        assert_eq!(emit_deps, vec!["enrich"]);

        // The derived edge set matches every reference in every config
        assert_eq!(graph.refs("enrich").len(), 1);
        assert_eq!(graph.refs("emit").len(), 1);
        assert!(graph.refs("fetch").is_empty());
    }

    #[test]
    fn input_references_add_no_edges() {
        let desc = parse(
            r#"{
                "schema": "skein/graph@0.3",
                "blocks": [
                    {"id": "calc", "kind": "function",
                     "config": {"code": "return input.x", "input": {"x": "<input.x>"}}}
                ]
            }"#,
        );

        let graph = validate(&desc).unwrap();
        assert!(graph.deps().dependencies("calc").is_empty());
        assert_eq!(graph.refs("calc").len(), 1);
    }

    #[test]
    fn condition_gates_branch_roots() {
        let desc = parse(
            r#"{
                "schema": "skein/graph@0.3",
                "blocks": [
                    {"id": "gate", "kind": "condition",
                     "config": {"expression": "input.n > 1", "input": {"n": "<input.n>"}},
                     "branches": {"then": ["big"], "else": ["small"]}},
                    {"id": "big", "kind": "function", "config": {"code": "return 'big'"}},
                    {"id": "small", "kind": "function", "config": {"code": "return 'small'"}}
                ]
            }"#,
        );

        let graph = validate(&desc).unwrap();
        // Implicit edges gate the branch roots even without references
        let big_deps: Vec<&str> = graph
            .deps()
            .dependencies("big")
            .iter()
            .map(|s| s.as_ref())
            .collect();
        assert_eq!(big_deps, vec!["gate"]);
        let small_deps: Vec<&str> = graph
            .deps()
            .dependencies("small")
            .iter()
            .map(|s| s.as_ref())
            .collect();
        assert_eq!(small_deps, vec!["gate"]);
    }

    #[test]
    fn fingerprint_is_stable_and_shape_sensitive() {
        let a = parse(
            r#"{"schema": "skein/graph@0.3",
                "blocks": [{"id": "a", "kind": "response", "config": {}}]}"#,
        );
        let b = parse(
            r#"{"schema": "skein/graph@0.3",
                "blocks": [{"id": "b", "kind": "response", "config": {}}]}"#,
        );

        let ga = validate(&a).unwrap();
        let ga2 = validate(&a).unwrap();
        let gb = validate(&b).unwrap();

        assert_eq!(ga.fingerprint(), ga2.fingerprint());
        assert_ne!(ga.fingerprint(), gb.fingerprint());
        assert_eq!(ga.fingerprint().len(), 16);
    }

    // ═══════════════════════════════════════════════════════════════
    // REJECTIONS
    // ═══════════════════════════════════════════════════════════════

    #[test]
    fn reference_cycle_is_rejected() {
        let desc = parse(
            r#"{
                "schema": "skein/graph@0.3",
                "blocks": [
                    {"id": "a", "kind": "function",
                     "config": {"code": "return 1", "x": "<b.result>"}},
                    {"id": "b", "kind": "function",
                     "config": {"code": "return 1", "x": "<a.result>"}}
                ]
            }"#,
        );

        let err = validate(&desc).unwrap_err();
        assert_eq!(err.code(), "SKEIN-020");
        let msg = err.to_string();
        // Cycle report names both offending blocks
        assert!(msg.contains('a') && msg.contains('b'));
    }

    #[test]
    fn unresolved_reference_is_rejected() {
        let desc = parse(
            r#"{
                "schema": "skein/graph@0.3",
                "blocks": [
                    {"id": "a", "kind": "response", "config": {"data": "<ghost.value>"}}
                ]
            }"#,
        );

        let err = validate(&desc).unwrap_err();
        assert_eq!(err.code(), "SKEIN-021");
        assert!(err.to_string().contains("ghost.value"));
    }

    #[test]
    fn self_reference_is_rejected() {
        let desc = parse(
            r#"{
                "schema": "skein/graph@0.3",
                "blocks": [
                    {"id": "a", "kind": "response", "config": {"data": "<a.value>"}}
                ]
            }"#,
        );

        let err = validate(&desc).unwrap_err();
        assert_eq!(err.code(), "SKEIN-022");
    }

    #[test]
    fn duplicate_id_is_rejected() {
        let desc = parse(
            r#"{
                "schema": "skein/graph@0.3",
                "blocks": [
                    {"id": "a", "kind": "response", "config": {}},
                    {"id": "a", "kind": "response", "config": {}}
                ]
            }"#,
        );
        assert_eq!(validate(&desc).unwrap_err().code(), "SKEIN-024");
    }

    #[test]
    fn reserved_input_id_is_rejected() {
        let desc = parse(
            r#"{"schema": "skein/graph@0.3",
                "blocks": [{"id": "input", "kind": "response", "config": {}}]}"#,
        );
        assert_eq!(validate(&desc).unwrap_err().code(), "SKEIN-025");
    }

    #[test]
    fn non_snake_case_id_is_rejected() {
        for bad in ["myBlock", "my-block", "9block", "My_block"] {
            assert!(validate_block_id(bad).is_err(), "{bad} should be invalid");
        }
        for good in ["my_block", "block9", "a"] {
            assert!(validate_block_id(good).is_ok(), "{good} should be valid");
        }
    }

    #[test]
    fn unknown_branch_target_is_rejected() {
        let desc = parse(
            r#"{
                "schema": "skein/graph@0.3",
                "blocks": [
                    {"id": "gate", "kind": "condition",
                     "config": {"expression": "true"},
                     "branches": {"then": ["ghost"]}}
                ]
            }"#,
        );
        assert_eq!(validate(&desc).unwrap_err().code(), "SKEIN-023");
    }

    #[test]
    fn function_without_code_is_rejected() {
        let desc = parse(
            r#"{"schema": "skein/graph@0.3",
                "blocks": [{"id": "f", "kind": "function", "config": {}}]}"#,
        );
        assert_eq!(validate(&desc).unwrap_err().code(), "SKEIN-004");
    }

    #[test]
    fn condition_without_branches_is_rejected() {
        let desc = parse(
            r#"{"schema": "skein/graph@0.3",
                "blocks": [{"id": "c", "kind": "condition",
                            "config": {"expression": "true"}}]}"#,
        );
        assert_eq!(validate(&desc).unwrap_err().code(), "SKEIN-004");
    }

    #[test]
    fn branches_on_non_condition_are_rejected() {
        let desc = parse(
            r#"{"schema": "skein/graph@0.3",
                "blocks": [
                    {"id": "a", "kind": "response", "config": {}},
                    {"id": "f", "kind": "function",
                     "config": {"code": "return 1"}, "branches": {"then": ["a"]}}
                ]}"#,
        );
        assert_eq!(validate(&desc).unwrap_err().code(), "SKEIN-004");
    }

    #[test]
    fn branch_targeting_itself_is_rejected() {
        let desc = parse(
            r#"{"schema": "skein/graph@0.3",
                "blocks": [
                    {"id": "gate", "kind": "condition",
                     "config": {"expression": "true"},
                     "branches": {"then": ["gate"]}}
                ]}"#,
        );
        assert_eq!(validate(&desc).unwrap_err().code(), "SKEIN-023");
    }
}
