//! DepGraph - dependency structure derived from block references
//!
//! Edges are computed by the validator: block A depends on block B iff any
//! of A's configuration values references B's output, plus one implicit
//! edge from every condition block to each of its declared branch roots so
//! a branch root can never run before its gate decides.
//!
//! Performance notes:
//! - Arc<str> for zero-cost cloning of block ids
//! - FxHashMap for faster hashing on short string keys
//! - SmallVec for stack-allocated small dependency lists (0-4 items)
//!
//! Cycle detection uses the DFS three-color algorithm.

use std::collections::VecDeque;
use std::sync::Arc;

use rustc_hash::{FxHashMap, FxHashSet};
use smallvec::SmallVec;

use crate::error::SkeinError;

/// Stack-allocated deps: most blocks have 0-4 dependencies
pub type DepVec = SmallVec<[Arc<str>; 4]>;

/// Graph of block dependencies
///
/// Immutable after construction by the validator.
pub struct DepGraph {
    /// block_id -> successor block_ids
    adjacency: FxHashMap<Arc<str>, DepVec>,
    /// block_id -> predecessor block_ids
    predecessors: FxHashMap<Arc<str>, DepVec>,
    /// All block ids, in description order
    block_ids: Vec<Arc<str>>,
}

impl DepGraph {
    /// Build from interned block ids and a deduplicated edge list
    pub fn new(block_ids: Vec<Arc<str>>, edges: &[(Arc<str>, Arc<str>)]) -> Self {
        let capacity = block_ids.len();
        let mut adjacency: FxHashMap<Arc<str>, DepVec> =
            FxHashMap::with_capacity_and_hasher(capacity, Default::default());
        let mut predecessors: FxHashMap<Arc<str>, DepVec> =
            FxHashMap::with_capacity_and_hasher(capacity, Default::default());

        for id in &block_ids {
            adjacency.insert(Arc::clone(id), DepVec::new());
            predecessors.insert(Arc::clone(id), DepVec::new());
        }

        for (source, target) in edges {
            adjacency
                .entry(Arc::clone(source))
                .or_default()
                .push(Arc::clone(target));
            predecessors
                .entry(Arc::clone(target))
                .or_default()
                .push(Arc::clone(source));
        }

        Self {
            adjacency,
            predecessors,
            block_ids,
        }
    }

    /// Dependencies of a block (its predecessors)
    #[inline]
    pub fn dependencies(&self, block_id: &str) -> &[Arc<str>] {
        static EMPTY: &[Arc<str>] = &[];
        self.predecessors
            .get(block_id)
            .map_or(EMPTY, SmallVec::as_slice)
    }

    /// Dependents of a block (its successors)
    #[inline]
    pub fn dependents(&self, block_id: &str) -> &[Arc<str>] {
        static EMPTY: &[Arc<str>] = &[];
        self.adjacency
            .get(block_id)
            .map_or(EMPTY, SmallVec::as_slice)
    }

    /// All block ids in description order
    pub fn block_ids(&self) -> &[Arc<str>] {
        &self.block_ids
    }

    /// Check if there's a path from `from` to `to` (BFS)
    pub fn has_path(&self, from: &str, to: &str) -> bool {
        if from == to {
            return true;
        }

        let mut visited: FxHashSet<&str> = FxHashSet::default();
        let mut queue: VecDeque<&str> = VecDeque::new();

        queue.push_back(from);
        visited.insert(from);

        while let Some(current) = queue.pop_front() {
            if let Some(neighbors) = self.adjacency.get(current) {
                for neighbor in neighbors {
                    if neighbor.as_ref() == to {
                        return true;
                    }
                    if visited.insert(neighbor.as_ref()) {
                        queue.push_back(neighbor.as_ref());
                    }
                }
            }
        }

        false
    }

    /// Detect cycles using DFS with three-color marking.
    ///
    /// Returns `Err(SkeinError::CycleDetected)` with the cycle path if any
    /// cycle is found.
    ///
    /// - White: unvisited
    /// - Gray: currently in DFS stack (visiting)
    /// - Black: fully processed
    ///
    /// A cycle exists when traversal reaches a Gray node.
    pub fn detect_cycles(&self) -> Result<(), SkeinError> {
        #[derive(Clone, Copy, PartialEq, Eq)]
        enum Color {
            White,
            Gray,
            Black,
        }

        let mut colors: FxHashMap<Arc<str>, Color> = self
            .block_ids
            .iter()
            .map(|id| (Arc::clone(id), Color::White))
            .collect();
        let mut stack: Vec<Arc<str>> = Vec::new();

        fn dfs(
            node: Arc<str>,
            adjacency: &FxHashMap<Arc<str>, DepVec>,
            colors: &mut FxHashMap<Arc<str>, Color>,
            stack: &mut Vec<Arc<str>>,
        ) -> Result<(), String> {
            colors.insert(Arc::clone(&node), Color::Gray);
            stack.push(Arc::clone(&node));

            if let Some(neighbors) = adjacency.get(&node) {
                for neighbor in neighbors {
                    match colors.get(neighbor) {
                        Some(Color::Gray) => {
                            // Gray neighbor is in the current DFS path: cycle
                            let cycle_start = stack
                                .iter()
                                .position(|x| x.as_ref() == neighbor.as_ref())
                                .unwrap_or(0);
                            let cycle: Vec<&str> =
                                stack[cycle_start..].iter().map(|s| s.as_ref()).collect();
                            return Err(format!("{} -> {}", cycle.join(" -> "), neighbor));
                        }
                        Some(Color::White) | None => {
                            dfs(Arc::clone(neighbor), adjacency, colors, stack)?;
                        }
                        Some(Color::Black) => {}
                    }
                }
            }

            stack.pop();
            colors.insert(node, Color::Black);
            Ok(())
        }

        for block_id in &self.block_ids {
            if colors.get(block_id) == Some(&Color::White) {
                if let Err(cycle) = dfs(
                    Arc::clone(block_id),
                    &self.adjacency,
                    &mut colors,
                    &mut stack,
                ) {
                    return Err(SkeinError::CycleDetected { cycle });
                }
            }
        }

        Ok(())
    }
}
