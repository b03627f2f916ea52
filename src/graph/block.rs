//! Block Description Types - the external graph contract
//!
//! Contains the JSON-parsed types consumed read-only from the editor /
//! storage layer:
//! - `GraphDescription`: root description with schema tag and block list
//! - `BlockSpec`: one block (id, kind, configuration, condition branches)
//! - `BlockKind`: the closed set of executable block kinds

use std::sync::Arc;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::SkeinError;

/// Expected schema version for v0.3 graph descriptions
pub const SCHEMA_V03: &str = "skein/graph@0.3";

/// Kind tag of an executable block
///
/// `function` and `condition` run user code in the sandbox; `response`
/// shapes the run output; `agent` and `api` are external collaborators
/// registered by the embedding application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlockKind {
    Agent,
    Api,
    Function,
    Condition,
    Response,
}

impl BlockKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BlockKind::Agent => "agent",
            BlockKind::Api => "api",
            BlockKind::Function => "function",
            BlockKind::Condition => "condition",
            BlockKind::Response => "response",
        }
    }
}

impl std::fmt::Display for BlockKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One block in the description
#[derive(Debug, Deserialize)]
pub struct BlockSpec {
    pub id: String,
    pub kind: BlockKind,
    /// Parameter name → raw value; values may embed `<id.path>` references,
    /// including inside interpolated strings. Immutable once a run starts.
    #[serde(default)]
    pub config: Map<String, Value>,
    /// Condition blocks only: branch name → downstream root block ids.
    /// Exactly one branch is selected per evaluation; roots of the other
    /// branches are pruned without executing.
    #[serde(default)]
    pub branches: Option<FxHashMap<String, Vec<String>>>,
}

impl BlockSpec {
    /// Function block source code, when present
    pub fn code(&self) -> Option<&str> {
        self.config.get("code").and_then(Value::as_str)
    }

    /// Condition branch expression, when present
    pub fn expression(&self) -> Option<&str> {
        self.config.get("expression").and_then(Value::as_str)
    }

    /// Per-block sandbox timeout override in seconds (function blocks)
    pub fn timeout_secs(&self) -> Option<u64> {
        self.config.get("timeout_secs").and_then(Value::as_u64)
    }
}

/// Graph description parsed from JSON (raw)
#[derive(Debug, Deserialize)]
struct GraphDescriptionRaw {
    pub schema: String,
    pub blocks: Vec<BlockSpec>,
}

/// Graph description with Arc-wrapped blocks for efficient sharing
#[derive(Debug)]
pub struct GraphDescription {
    pub schema: String,
    pub blocks: Vec<Arc<BlockSpec>>,
}

impl<'de> Deserialize<'de> for GraphDescription {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = GraphDescriptionRaw::deserialize(deserializer)?;
        Ok(GraphDescription {
            schema: raw.schema,
            blocks: raw.blocks.into_iter().map(Arc::new).collect(),
        })
    }
}

impl GraphDescription {
    /// Parse a description from a JSON string
    pub fn from_json(s: &str) -> Result<Self, SkeinError> {
        serde_json::from_str(s).map_err(|e| SkeinError::ParseError {
            details: e.to_string(),
        })
    }

    /// Validate the schema version tag
    pub fn validate_schema(&self) -> Result<(), SkeinError> {
        if self.schema != SCHEMA_V03 {
            return Err(SkeinError::InvalidSchemaVersion {
                version: self.schema.clone(),
            });
        }
        Ok(())
    }
}
