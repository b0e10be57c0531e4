// 🧭 Hierarchy Defaults - the safe fallback at every level
// Injected into the normalizer, the default-guarantee pass and the resolver

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use super::row::HierarchyRow;

pub const DEFAULT_PROJECT: &str = "日常开支";
pub const DEFAULT_CATEGORY: &str = "其他";
pub const DEFAULT_SUB_CATEGORY: &str = "其他";

// ============================================================================
// HIERARCHY DEFAULTS
// ============================================================================

/// Fallback label for each taxonomy level.
///
/// Passed by reference wherever a missing or unknown label has to be
/// replaced, so tests can run against alternate defaults without touching
/// global state.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct HierarchyDefaults {
    pub project: String,
    pub category: String,
    pub sub_category: String,
}

impl HierarchyDefaults {
    /// Build alternate defaults. Blank values keep the standard constant.
    pub fn new(project: &str, category: &str, sub_category: &str) -> Self {
        HierarchyDefaults {
            project: non_blank_or(project, DEFAULT_PROJECT),
            category: non_blank_or(category, DEFAULT_CATEGORY),
            sub_category: non_blank_or(sub_category, DEFAULT_SUB_CATEGORY),
        }
    }

    /// Load defaults from a JSON file: `{"project": .., "category": .., "sub_category": ..}`
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read defaults file: {:?}", path.as_ref()))?;

        let parsed: HierarchyDefaults =
            serde_json::from_str(&content).context("Failed to parse defaults JSON")?;

        Ok(parsed.sanitized())
    }

    /// Re-apply the blank-value rule (serde may hand us empty strings)
    pub fn sanitized(self) -> Self {
        HierarchyDefaults::new(&self.project, &self.category, &self.sub_category)
    }

    /// The canonical default row, always present in a built lookup
    pub fn default_row(&self) -> HierarchyRow {
        HierarchyRow::new(&self.project, &self.category, &self.sub_category)
    }
}

impl Default for HierarchyDefaults {
    fn default() -> Self {
        HierarchyDefaults {
            project: DEFAULT_PROJECT.to_string(),
            category: DEFAULT_CATEGORY.to_string(),
            sub_category: DEFAULT_SUB_CATEGORY.to_string(),
        }
    }
}

fn non_blank_or(value: &str, fallback: &str) -> String {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        fallback.to_string()
    } else {
        trimmed.to_string()
    }
}

// ============================================================================
// TESTS
// ============================================================================
