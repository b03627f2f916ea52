//! String interning for recurring block IDs
//!
//! Ensures each unique block id is stored only once in memory.
//! Uses DashMap for lock-free concurrent access.
//!
//! Performance benefits:
//! - Memory: single allocation per unique string
//! - Cloning: Arc::clone is O(1), no string copy

use std::sync::{Arc, LazyLock};

use dashmap::DashMap;

/// Global string interner (thread-safe, lock-free)
static INTERNER: LazyLock<Interner> = LazyLock::new(Interner::new);

/// Intern a string through the global interner
pub fn intern(s: &str) -> Arc<str> {
    INTERNER.intern(s)
}

/// Thread-safe string interner using DashMap
struct Interner {
    /// Map from string content to interned Arc<str>
    strings: DashMap<Arc<str>, ()>,
}

impl Interner {
    fn new() -> Self {
        Self {
            strings: DashMap::new(),
        }
    }

    /// Intern a string, returning a shared Arc<str>
    ///
    /// If the string was already interned, returns the existing Arc.
    fn intern(&self, s: &str) -> Arc<str> {
        if let Some(existing) = self.strings.get(s) {
            return Arc::clone(existing.key());
        }

        let key: Arc<str> = Arc::from(s);
        self.strings.insert(Arc::clone(&key), ());
        key
    }
}
