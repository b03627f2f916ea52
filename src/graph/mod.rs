//! Graph Module - block model and static validation
//!
//! Contains the block graph representation and its validator:
//! - `block`: JSON description types (GraphDescription, BlockSpec, BlockKind)
//! - `reference`: `<id.path>` reference AST extracted at validation time
//! - `deps`: derived dependency graph with cycle detection
//! - `validate`: description → validated Graph
//!
//! The Graph is immutable after validation; the scheduler and resolver only
//! read it.

mod block;
mod deps;
pub mod reference;
mod validate;

pub use block::{BlockKind, BlockSpec, GraphDescription, SCHEMA_V03};
pub use deps::{DepGraph, DepVec};
pub use reference::{BlockRef, INPUT_SOURCE};
pub use validate::{validate, validate_block_id, Graph};
