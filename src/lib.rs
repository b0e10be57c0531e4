// Expense Taxonomy - Core Library
// Exposes all modules for use in the CLI, the API server, and tests

pub mod config;
pub mod db;
pub mod expense;
pub mod import;
pub mod logging;
pub mod taxonomy;

// Re-export commonly used types
pub use config::AppConfig;
pub use db::{
    add_curated_hierarchy_row, get_all_expenses, insert_expenses, load_hierarchy_rows,
    load_lookup, setup_database, spending_by_hierarchy, verify_count, HierarchySpending,
};
pub use expense::{
    parse_amount, parse_amount_text, parse_expense_date, sanitize_candidate, sanitize_candidates,
    Expense, ExpenseCandidate, ExpenseSource, SanitizedCandidate,
};
pub use import::{import_csv, import_from_reader, ImportReport, SkippedRow};
pub use logging::init_tracing;
pub use taxonomy::{
    build_hierarchy_lookup, coerce_hierarchy_triple, dedupe_hierarchy_rows,
    ensure_default_hierarchy, is_allowed_hierarchy_triple, normalize_hierarchy_row, Fallbacks,
    HierarchyDefaults, HierarchyFields, HierarchyLookup, HierarchyRow, HierarchyStore,
    RawHierarchyRow, Resolution, ResolutionStatus, DEFAULT_CATEGORY, DEFAULT_PROJECT,
    DEFAULT_SUB_CATEGORY,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
