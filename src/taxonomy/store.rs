// 📸 Hierarchy Store - shared, swappable lookup snapshots
// Readers clone an Arc and keep reading it; rebuilds replace the Arc whole.

use std::sync::{Arc, PoisonError, RwLock};
use tracing::info;

use super::defaults::HierarchyDefaults;
use super::lookup::HierarchyLookup;
use super::row::{HierarchyFields, HierarchyRow};

pub struct HierarchyStore {
    current: RwLock<Arc<HierarchyLookup>>,
}

impl HierarchyStore {
    pub fn new(lookup: HierarchyLookup) -> Self {
        HierarchyStore {
            current: RwLock::new(Arc::new(lookup)),
        }
    }

    /// Store holding only the default row
    pub fn with_defaults(defaults: &HierarchyDefaults) -> Self {
        let empty: &[HierarchyRow] = &[];
        Self::new(HierarchyLookup::build(empty, defaults))
    }

    /// Current snapshot. Stays valid after later rebuilds.
    pub fn current(&self) -> Arc<HierarchyLookup> {
        // The slot only ever holds a complete Arc, so a poisoned lock is still readable
        let guard = self.current.read().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&*guard)
    }

    /// Build a fresh lookup outside the lock, then swap it in
    pub fn rebuild<T: HierarchyFields>(&self, rows: &[T]) -> Arc<HierarchyLookup> {
        let defaults = self.current().defaults().clone();
        let next = Arc::new(HierarchyLookup::build(rows, &defaults));

        {
            let mut guard = self.current.write().unwrap_or_else(PoisonError::into_inner);
            *guard = Arc::clone(&next);
        }

        info!(triples = next.len(), "hierarchy lookup rebuilt");
        next
    }
}

// ============================================================================
// TESTS
// ============================================================================
