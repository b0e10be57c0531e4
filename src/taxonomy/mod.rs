// Expense Taxonomy - controlled (project, category, sub-category) vocabulary
//
// Every triple that reaches storage or the UI passes through here:
// - row:      normalize, dedupe, guarantee the default row
// - lookup:   allowed-triple index, membership check, per-level coercion
// - store:    shared read-only snapshots, swapped whole on rebuild
// - defaults: injected fallback labels
//
// Pure and synchronous. No I/O apart from loading defaults from a file.

pub mod defaults;
pub mod lookup;
pub mod row;
pub mod store;

pub use defaults::{HierarchyDefaults, DEFAULT_CATEGORY, DEFAULT_PROJECT, DEFAULT_SUB_CATEGORY};
pub use lookup::{
    build_hierarchy_lookup, coerce_hierarchy_triple, is_allowed_hierarchy_triple, Fallbacks,
    HierarchyLookup, Resolution, ResolutionStatus,
};
pub use row::{
    dedupe_hierarchy_rows, ensure_default_hierarchy, normalize_hierarchy_row, HierarchyFields,
    HierarchyRow, RawHierarchyRow,
};
pub use store::HierarchyStore;
