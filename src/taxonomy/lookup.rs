// 🔎 Hierarchy Lookup - allowed triples + parent → children indexes
// Built once per known-good row set, read-only afterwards.
//
// Two structures, one pass:
// - allowed:  exact (project, category, sub_category) triples
// - projects: project → category → sub-categories seen under the pair

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use super::defaults::HierarchyDefaults;
use super::row::{ensure_default_hierarchy, normalize_hierarchy_row, HierarchyFields, HierarchyRow};

// ============================================================================
// RESOLUTION RESULT
// ============================================================================

/// Which levels were replaced by their default during coercion
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fallbacks {
    pub project: bool,
    pub category: bool,
    pub sub_category: bool,
}

impl Fallbacks {
    pub fn any(&self) -> bool {
        self.project || self.category || self.sub_category
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResolutionStatus {
    /// Normalized triple was already allowed
    Exact,

    /// At least one level was not found under its resolved parent
    Coerced(Fallbacks),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub row: HierarchyRow,
    pub status: ResolutionStatus,
}

impl Resolution {
    pub fn is_exact(&self) -> bool {
        matches!(self.status, ResolutionStatus::Exact)
    }

    pub fn fallbacks(&self) -> Fallbacks {
        match self.status {
            ResolutionStatus::Exact => Fallbacks::default(),
            ResolutionStatus::Coerced(fallbacks) => fallbacks,
        }
    }
}

// ============================================================================
// HIERARCHY LOOKUP
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct HierarchyLookup {
    defaults: HierarchyDefaults,
    rows: Vec<HierarchyRow>,
    allowed: HashSet<HierarchyRow>,
    projects: HashMap<String, CategoryIndex>,
}

/// category → sub-categories, for one project
type CategoryIndex = HashMap<String, HashSet<String>>;

impl HierarchyLookup {
    /// Build from any row set. The default-guarantee pass runs first, so the
    /// default row is always a member.
    pub fn build<T: HierarchyFields>(rows: &[T], defaults: &HierarchyDefaults) -> Self {
        let finalized = ensure_default_hierarchy(rows, defaults);
        Self::index(finalized, defaults)
    }

    fn index(rows: Vec<HierarchyRow>, defaults: &HierarchyDefaults) -> Self {
        let mut allowed = HashSet::with_capacity(rows.len());
        let mut projects: HashMap<String, CategoryIndex> = HashMap::new();

        for raw in &rows {
            // No-op for already-normalized rows
            let row = normalize_hierarchy_row(raw, defaults);

            projects
                .entry(row.project.clone())
                .or_default()
                .entry(row.category.clone())
                .or_default()
                .insert(row.sub_category.clone());
            allowed.insert(row);
        }

        debug_assert!(
            allowed.contains(&defaults.default_row()),
            "default hierarchy row missing from finalized lookup"
        );

        HierarchyLookup {
            defaults: defaults.clone(),
            rows,
            allowed,
            projects,
        }
    }

    pub fn defaults(&self) -> &HierarchyDefaults {
        &self.defaults
    }

    /// Finalized rows in first-seen order
    pub fn rows(&self) -> &[HierarchyRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.allowed.len()
    }

    /// Never true for a built lookup (the default row is always present)
    pub fn is_empty(&self) -> bool {
        self.allowed.is_empty()
    }

    // ========================================================================
    // MEMBERSHIP CHECK
    // ========================================================================

    /// True iff the normalized triple is an exact allowed triple
    pub fn is_allowed<T: HierarchyFields + ?Sized>(&self, raw: &T) -> bool {
        let row = normalize_hierarchy_row(raw, &self.defaults);
        self.allowed.contains(&row)
    }

    // Borrowed keys only, no allocation per check
    fn has_category(&self, project: &str, category: &str) -> bool {
        self.projects
            .get(project)
            .is_some_and(|categories| categories.contains_key(category))
    }

    fn has_sub_category(&self, project: &str, category: &str, sub_category: &str) -> bool {
        self.projects
            .get(project)
            .and_then(|categories| categories.get(category))
            .is_some_and(|subs| subs.contains(sub_category))
    }

    // ========================================================================
    // COERCION RESOLVER
    // ========================================================================

    /// Map any triple onto known labels, one level at a time.
    ///
    /// Each level is checked against the children of its *resolved* parent
    /// and falls back to the level default when absent. A category that is
    /// valid only under some other project is not recovered. The result is
    /// not guaranteed to be an allowed triple itself.
    pub fn resolve<T: HierarchyFields + ?Sized>(&self, raw: &T) -> Resolution {
        let row = normalize_hierarchy_row(raw, &self.defaults);

        if self.allowed.contains(&row) {
            return Resolution {
                row,
                status: ResolutionStatus::Exact,
            };
        }

        let HierarchyRow {
            project,
            category,
            sub_category,
        } = row;
        let mut fallbacks = Fallbacks::default();

        let project = if self.projects.contains_key(&project) {
            project
        } else {
            fallbacks.project = true;
            self.defaults.project.clone()
        };

        let category = if self.has_category(&project, &category) {
            category
        } else {
            fallbacks.category = true;
            self.defaults.category.clone()
        };

        let sub_category = if self.has_sub_category(&project, &category, &sub_category) {
            sub_category
        } else {
            fallbacks.sub_category = true;
            self.defaults.sub_category.clone()
        };

        Resolution {
            row: HierarchyRow {
                project,
                category,
                sub_category,
            },
            status: ResolutionStatus::Coerced(fallbacks),
        }
    }

    pub fn coerce<T: HierarchyFields + ?Sized>(&self, raw: &T) -> HierarchyRow {
        self.resolve(raw).row
    }

    // ========================================================================
    // PICKER QUERIES (known labels only, first-seen order)
    // ========================================================================

    pub fn projects(&self) -> Vec<&str> {
        ordered_unique(self.rows.iter().map(|r| r.project.as_str()))
    }

    pub fn categories_for(&self, project: &str) -> Vec<&str> {
        ordered_unique(
            self.rows
                .iter()
                .filter(|r| r.project == project)
                .map(|r| r.category.as_str()),
        )
    }

    pub fn sub_categories_for(&self, project: &str, category: &str) -> Vec<&str> {
        ordered_unique(
            self.rows
                .iter()
                .filter(|r| r.project == project && r.category == category)
                .map(|r| r.sub_category.as_str()),
        )
    }
}

fn ordered_unique<'a>(labels: impl Iterator<Item = &'a str>) -> Vec<&'a str> {
    let mut seen = HashSet::new();
    labels.filter(|label| seen.insert(*label)).collect()
}

/// Free-function form of [`HierarchyLookup::build`]
pub fn build_hierarchy_lookup<T: HierarchyFields>(
    rows: &[T],
    defaults: &HierarchyDefaults,
) -> HierarchyLookup {
    HierarchyLookup::build(rows, defaults)
}

/// Free-function form of [`HierarchyLookup::is_allowed`]
pub fn is_allowed_hierarchy_triple<T: HierarchyFields + ?Sized>(
    raw: &T,
    lookup: &HierarchyLookup,
) -> bool {
    lookup.is_allowed(raw)
}

/// Free-function form of [`HierarchyLookup::coerce`]
pub fn coerce_hierarchy_triple<T: HierarchyFields + ?Sized>(
    raw: &T,
    lookup: &HierarchyLookup,
) -> HierarchyRow {
    lookup.coerce(raw)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::taxonomy::row::RawHierarchyRow;
    use serde_json::json;

    fn sample_lookup() -> HierarchyLookup {
        let rows = vec![
            RawHierarchyRow::new("日常开支", "购物", "食品"),
            RawHierarchyRow::new("日常开支", "购物", "日用品"),
            RawHierarchyRow::new("日常开支", "餐饮", "午餐"),
            RawHierarchyRow::new("旅行", "交通", "机票"),
            RawHierarchyRow::new("旅行", "住宿", "酒店"),
        ];
        HierarchyLookup::build(&rows, &HierarchyDefaults::default())
    }

    #[test]
    fn test_build_contains_default_row() {
        let lookup = sample_lookup();

        assert!(lookup.is_allowed(&HierarchyDefaults::default().default_row()));
        assert_eq!(lookup.len(), 6);
        assert_eq!(lookup.rows()[0], HierarchyDefaults::default().default_row());
    }

    #[test]
    fn test_build_is_deterministic() {
        let a = sample_lookup();
        let b = sample_lookup();

        assert_eq!(a, b);
    }

    #[test]
    fn test_index_consistency() {
        let lookup = sample_lookup();

        for row in lookup.rows() {
            assert!(lookup.has_category(&row.project, &row.category));
            assert!(lookup.has_sub_category(&row.project, &row.category, &row.sub_category));
        }
    }

    #[test]
    fn test_index_is_scoped_by_parent() {
        let lookup = sample_lookup();

        // "机票" exists, but only under (旅行, 交通)
        assert!(lookup.has_sub_category("旅行", "交通", "机票"));
        assert!(!lookup.has_sub_category("日常开支", "交通", "机票"));
        assert!(!lookup.has_sub_category("不存在", "交通", "机票"));
        assert!(!lookup.has_category("不存在", "交通"));
    }

    #[test]
    fn test_is_allowed_normalizes_input() {
        let lookup = sample_lookup();

        assert!(lookup.is_allowed(&("  旅行 ", "交通", " 机票")));
        assert!(lookup.is_allowed(&json!({"project": "旅行", "category": "住宿", "subCategory": "酒店"})));
        assert!(!lookup.is_allowed(&("旅行", "交通", "酒店")));
        assert!(!lookup.is_allowed(&("旅行", "交通", "机票 ✈")));
    }

    #[test]
    fn test_is_allowed_blank_is_default() {
        let lookup = sample_lookup();
        assert!(lookup.is_allowed(&json!({})));
    }

    #[test]
    fn test_resolve_exact_match() {
        let lookup = sample_lookup();
        let resolution = lookup.resolve(&("日常开支", "购物", "食品"));

        assert!(resolution.is_exact());
        assert_eq!(resolution.row, HierarchyRow::new("日常开支", "购物", "食品"));
        assert!(!resolution.fallbacks().any());
    }

    #[test]
    fn test_resolve_all_levels_unknown() {
        let lookup = sample_lookup();
        let resolution = lookup.resolve(&("不存在", "不存在", "不存在"));

        assert_eq!(resolution.row, HierarchyRow::new("日常开支", "其他", "其他"));
        assert_eq!(
            resolution.fallbacks(),
            Fallbacks {
                project: true,
                category: true,
                sub_category: true
            }
        );
    }

    #[test]
    fn test_resolve_only_sub_category_falls_back() {
        let lookup = sample_lookup();
        let resolution = lookup.resolve(&("日常开支", "购物", "不存在"));

        assert_eq!(resolution.row, HierarchyRow::new("日常开支", "购物", "其他"));
        assert_eq!(
            resolution.fallbacks(),
            Fallbacks {
                project: false,
                category: false,
                sub_category: true
            }
        );
        // Per-level fallback can land outside the allowed set
        assert!(!lookup.is_allowed(&resolution.row));
    }

    #[test]
    fn test_resolve_category_checked_against_resolved_project() {
        let lookup = sample_lookup();

        // "交通" exists only under "旅行"; the unknown project resolves to the
        // default project, so the category falls back too.
        let row = lookup.coerce(&("出差", "交通", "机票"));
        assert_eq!(row, HierarchyRow::new("日常开支", "其他", "其他"));

        // A known project with a category from another project
        let row = lookup.coerce(&("日常开支", "交通", "机票"));
        assert_eq!(row, HierarchyRow::new("日常开支", "其他", "其他"));
    }

    #[test]
    fn test_resolve_unknown_category_under_known_project() {
        let lookup = sample_lookup();
        let row = lookup.coerce(&("旅行", "不存在", "其他"));

        // "旅行" has no "其他" category, so (旅行, 其他) has no sub-categories
        assert_eq!(row, HierarchyRow::new("旅行", "其他", "其他"));
    }

    #[test]
    fn test_resolve_malformed_json() {
        let lookup = sample_lookup();
        let row = lookup.coerce(&json!({"project": 12, "category": [], "sub_category": null}));

        assert_eq!(row, HierarchyDefaults::default().default_row());
    }

    #[test]
    fn test_alternate_defaults() {
        let defaults = HierarchyDefaults::new("Household", "Misc", "General");
        let rows = vec![RawHierarchyRow::new("Work", "Travel", "Taxi")];
        let lookup = HierarchyLookup::build(&rows, &defaults);

        assert!(lookup.is_allowed(&("Household", "Misc", "General")));
        assert_eq!(
            lookup.coerce(&("Work", "Travel", "Bus")),
            HierarchyRow::new("Work", "Travel", "General")
        );
        assert_eq!(
            lookup.coerce(&("Unknown", "", "")),
            HierarchyRow::new("Household", "Misc", "General")
        );
    }

    #[test]
    fn test_free_function_forms() {
        let defaults = HierarchyDefaults::default();
        let rows = vec![HierarchyRow::new("日常开支", "购物", "食品")];
        let lookup = build_hierarchy_lookup(&rows, &defaults);

        assert!(is_allowed_hierarchy_triple(&rows[0], &lookup));
        assert_eq!(coerce_hierarchy_triple(&rows[0], &lookup), rows[0]);
    }

    #[test]
    fn test_picker_queries_first_seen_order() {
        let lookup = sample_lookup();

        assert_eq!(lookup.projects(), vec!["日常开支", "旅行"]);
        assert_eq!(lookup.categories_for("日常开支"), vec!["其他", "购物", "餐饮"]);
        assert_eq!(lookup.sub_categories_for("日常开支", "购物"), vec!["食品", "日用品"]);
        assert!(lookup.categories_for("不存在").is_empty());
    }

    #[test]
    fn test_resolution_serializes_status() {
        let lookup = sample_lookup();
        let json = serde_json::to_value(lookup.resolve(&("日常开支", "购物", "食品"))).unwrap();

        assert_eq!(json["status"]["kind"], "exact");
        assert_eq!(json["row"]["sub_category"], "食品");
    }
}
