//! Resolver Module - reference resolution against the execution context
//!
//! - `path`: typed path segments and uniform traversal over JSON values
//! - `resolve`: config rewriting (`<id.path>` → literal values)
//!
//! The resolver is kind-agnostic: it works from the reference AST extracted
//! at validation time and never inspects what a block does with its config.

pub mod path;
mod resolve;

pub use path::Segment;
pub use resolve::{resolve_config, resolve_value};
