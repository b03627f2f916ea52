//! Engine Error Types with Error Codes
//!
//! Error code ranges:
//! - SKEIN-000-009: Graph description errors
//! - SKEIN-020-029: Graph validation errors
//! - SKEIN-040-049: Reference resolution errors
//! - SKEIN-050-059: Sandbox errors
//! - SKEIN-060-069: Scheduler/context errors
//! - SKEIN-090-099: IO/config errors
//!
//! Validation errors are fatal before a run starts. Resolution errors split:
//! FieldNotFound is a user-facing block failure, UpstreamNotReady is an
//! internal invariant violation that aborts the whole run. Sandbox errors mark
//! the function block Failed with the specific kind attached; the engine never
//! retries any of them.

use miette::Diagnostic;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, SkeinError>;

/// Trait for errors that provide fix suggestions
pub trait FixSuggestion {
    fn fix_suggestion(&self) -> Option<&str>;
}

/// All error variants are part of the public API.
///
/// Implements both `thiserror::Error` for std error compatibility
/// and `miette::Diagnostic` for fancy terminal error display.
#[derive(Error, Debug, Diagnostic)]
pub enum SkeinError {
    // ═══════════════════════════════════════════
    // GRAPH DESCRIPTION ERRORS (000-009)
    // ═══════════════════════════════════════════
    #[error("[SKEIN-001] Failed to parse graph description: {details}")]
    #[diagnostic(
        code(skein::parse_error),
        help("Check the description is valid JSON with a 'blocks' array")
    )]
    ParseError { details: String },

    #[error("[SKEIN-002] Invalid schema version: {version}")]
    #[diagnostic(
        code(skein::invalid_schema_version),
        help("Use 'skein/graph@0.3' as the schema version")
    )]
    InvalidSchemaVersion { version: String },

    #[error("[SKEIN-003] Graph file not found: {path}")]
    #[diagnostic(code(skein::graph_not_found), help("Check the file path exists"))]
    GraphNotFound { path: String },

    #[error("[SKEIN-004] Graph validation failed: {reason}")]
    #[diagnostic(
        code(skein::validation_error),
        help("Check block structure matches the description contract")
    )]
    ValidationError { reason: String },

    // ═══════════════════════════════════════════
    // GRAPH VALIDATION ERRORS (020-029)
    // ═══════════════════════════════════════════
    #[error("[SKEIN-020] Cycle detected in block graph: {cycle}")]
    #[diagnostic(
        code(skein::cycle_detected),
        help("Remove circular references between blocks")
    )]
    CycleDetected { cycle: String },

    #[error("[SKEIN-021] Block '{block_id}' references unknown block in '<{reference}>'")]
    #[diagnostic(
        code(skein::unresolved_reference),
        help("Every <id.path> reference must name a block present in the graph")
    )]
    UnresolvedReference { block_id: String, reference: String },

    #[error("[SKEIN-022] Block '{block_id}' references its own output in '<{reference}>'")]
    SelfReference { block_id: String, reference: String },

    #[error("[SKEIN-023] Condition '{block_id}' branch '{branch}' targets unknown block '{target}'")]
    UnknownBranchTarget {
        block_id: String,
        branch: String,
        target: String,
    },

    #[error("[SKEIN-024] Duplicate block id '{id}'")]
    DuplicateBlockId { id: String },

    #[error("[SKEIN-025] Invalid block id '{id}': {reason}")]
    InvalidBlockId { id: String, reason: String },

    #[error("[SKEIN-026] No operation registered for block kind '{kind}'")]
    #[diagnostic(
        code(skein::unsupported_block_kind),
        help("Register a BlockOperation for this kind before starting the run")
    )]
    UnsupportedBlockKind { kind: String },

    // ═══════════════════════════════════════════
    // RESOLUTION ERRORS (040-049)
    // ═══════════════════════════════════════════
    #[error("[SKEIN-040] Field '{path}' not found in output of block '{block_id}'")]
    #[diagnostic(
        code(skein::field_not_found),
        help("Check the referenced path exists in the upstream block's output")
    )]
    FieldNotFound { block_id: String, path: String },

    #[error("[SKEIN-041] Cannot traverse '{segment}' on {value_type} (expected object/array) in '{path}'")]
    InvalidTraversal {
        segment: String,
        value_type: String,
        path: String,
    },

    /// Internal invariant violation: the scheduler dispatched a block whose
    /// dependency has not succeeded. Aborts the run, never downgraded to a
    /// block failure.
    #[error("[SKEIN-042] Upstream block '{block_id}' is {status}, not succeeded (scheduler invariant violated)")]
    UpstreamNotReady { block_id: String, status: String },

    #[error("[SKEIN-043] Invalid reference path: {path}")]
    InvalidPath { path: String },

    // ═══════════════════════════════════════════
    // SANDBOX ERRORS (050-059)
    // ═══════════════════════════════════════════
    #[error("[SKEIN-050] Function code timed out after {limit_ms}ms")]
    #[diagnostic(
        code(skein::sandbox_timeout),
        help("Reduce the work done in the block or raise timeout_secs (bounded by config)")
    )]
    SandboxTimeout { limit_ms: u64 },

    #[error("[SKEIN-051] Function code exceeded the memory ceiling ({limit_bytes} bytes)")]
    SandboxMemoryExceeded { limit_bytes: usize },

    #[error("[SKEIN-052] Function code raised an error: {message}")]
    SandboxRuntime { message: String },

    #[error("[SKEIN-053] Function code has a syntax error: {details}")]
    SandboxSyntax { details: String },

    #[error("[SKEIN-054] Function code interrupted by run cancellation")]
    SandboxCancelled,

    // ═══════════════════════════════════════════
    // SCHEDULER / CONTEXT ERRORS (060-069)
    // ═══════════════════════════════════════════
    /// Internal invariant violation: out-of-order record transition.
    #[error("[SKEIN-060] Illegal transition for block '{block_id}': {from} -> {to}")]
    IllegalTransition {
        block_id: String,
        from: String,
        to: String,
    },

    /// Internal invariant violation: blocks remain pending but nothing can run.
    #[error("[SKEIN-061] Run stalled: no block is ready but {pending} block(s) remain pending")]
    Stalled { pending: usize },

    #[error("[SKEIN-063] Operation for block '{block_id}' failed: {reason}")]
    OperationFailed { block_id: String, reason: String },

    #[error("[SKEIN-064] Operation for block '{block_id}' timed out after {timeout_secs}s")]
    OperationTimeout { block_id: String, timeout_secs: u64 },

    // ═══════════════════════════════════════════
    // IO / CONFIG ERRORS (090-099)
    // ═══════════════════════════════════════════
    #[error("[SKEIN-090] IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("[SKEIN-091] JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("[SKEIN-092] Config error: {reason}")]
    ConfigError { reason: String },
}

impl SkeinError {
    /// Get the error code (e.g., "SKEIN-020")
    pub fn code(&self) -> &'static str {
        match self {
            Self::ParseError { .. } => "SKEIN-001",
            Self::InvalidSchemaVersion { .. } => "SKEIN-002",
            Self::GraphNotFound { .. } => "SKEIN-003",
            Self::ValidationError { .. } => "SKEIN-004",
            Self::CycleDetected { .. } => "SKEIN-020",
            Self::UnresolvedReference { .. } => "SKEIN-021",
            Self::SelfReference { .. } => "SKEIN-022",
            Self::UnknownBranchTarget { .. } => "SKEIN-023",
            Self::DuplicateBlockId { .. } => "SKEIN-024",
            Self::InvalidBlockId { .. } => "SKEIN-025",
            Self::UnsupportedBlockKind { .. } => "SKEIN-026",
            Self::FieldNotFound { .. } => "SKEIN-040",
            Self::InvalidTraversal { .. } => "SKEIN-041",
            Self::UpstreamNotReady { .. } => "SKEIN-042",
            Self::InvalidPath { .. } => "SKEIN-043",
            Self::SandboxTimeout { .. } => "SKEIN-050",
            Self::SandboxMemoryExceeded { .. } => "SKEIN-051",
            Self::SandboxRuntime { .. } => "SKEIN-052",
            Self::SandboxSyntax { .. } => "SKEIN-053",
            Self::SandboxCancelled => "SKEIN-054",
            Self::IllegalTransition { .. } => "SKEIN-060",
            Self::Stalled { .. } => "SKEIN-061",
            Self::OperationFailed { .. } => "SKEIN-063",
            Self::OperationTimeout { .. } => "SKEIN-064",
            Self::IoError(_) => "SKEIN-090",
            Self::JsonError(_) => "SKEIN-091",
            Self::ConfigError { .. } => "SKEIN-092",
        }
    }

    /// Check if the error is a resource failure rather than a user-code or
    /// validation failure. The engine retries nothing; callers may use this
    /// to decide their own retry policy.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::SandboxTimeout { .. }
                | Self::SandboxMemoryExceeded { .. }
                | Self::OperationTimeout { .. }
        )
    }

    /// Check if the error signals an engine invariant violation (never a
    /// user-facing block failure). These abort the run with a diagnostic.
    pub fn is_internal(&self) -> bool {
        matches!(
            self,
            Self::UpstreamNotReady { .. } | Self::IllegalTransition { .. } | Self::Stalled { .. }
        )
    }
}

impl FixSuggestion for SkeinError {
    fn fix_suggestion(&self) -> Option<&str> {
        match self {
            Self::ParseError { .. } => Some("Check the description is valid JSON"),
            Self::InvalidSchemaVersion { .. } => Some("Use 'skein/graph@0.3' as the schema version"),
            Self::GraphNotFound { .. } => Some("Check the file path exists"),
            Self::ValidationError { .. } => Some("Check block structure matches the contract"),
            Self::CycleDetected { .. } => Some("Remove circular references between blocks"),
            Self::UnresolvedReference { .. } => {
                Some("Every <id.path> reference must name a block in the graph")
            }
            Self::SelfReference { .. } => Some("A block cannot reference its own output"),
            Self::UnknownBranchTarget { .. } => {
                Some("Branch targets must be block ids present in the graph")
            }
            Self::DuplicateBlockId { .. } => Some("Block ids must be unique within a graph"),
            Self::InvalidBlockId { .. } => {
                Some("Block ids must be snake_case; 'input' is reserved for the run input")
            }
            Self::UnsupportedBlockKind { .. } => {
                Some("Register a BlockOperation for this kind before starting the run")
            }
            Self::FieldNotFound { .. } => {
                Some("Check the referenced path exists in the upstream output")
            }
            Self::InvalidTraversal { .. } => {
                Some("Check the path - accessing a field on a non-object")
            }
            Self::UpstreamNotReady { .. } => None, // engine bug, not user-fixable
            Self::InvalidPath { .. } => Some("Use format: <block_id.field.subfield>"),
            Self::SandboxTimeout { .. } => {
                Some("Reduce the work in the block or raise timeout_secs")
            }
            Self::SandboxMemoryExceeded { .. } => {
                Some("Reduce allocations in the block code")
            }
            Self::SandboxRuntime { .. } => Some("Fix the error raised by the block code"),
            Self::SandboxSyntax { .. } => Some("Fix the syntax error in the block code"),
            Self::SandboxCancelled => None,
            Self::IllegalTransition { .. } => None,
            Self::Stalled { .. } => None,
            Self::OperationFailed { .. } => Some("Check the collaborator's error payload"),
            Self::OperationTimeout { .. } => {
                Some("Check the collaborator service is responsive")
            }
            Self::IoError(_) => Some("Check file path and permissions"),
            Self::JsonError(_) => Some("Check JSON syntax"),
            Self::ConfigError { .. } => {
                Some("Check ~/.config/skein/config.toml for syntax errors")
            }
        }
    }
}
