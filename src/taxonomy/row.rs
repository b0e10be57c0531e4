// 🏷️ Hierarchy Rows - (project, category, sub-category) triples
// Raw triples come from SQLite history, spreadsheet imports and LLM output.
// Nothing here can fail: every input normalizes to a valid row.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::borrow::Cow;
use std::collections::HashSet;

use super::defaults::HierarchyDefaults;

// ============================================================================
// HIERARCHY ROW
// ============================================================================

/// One leaf of the expense taxonomy.
///
/// The struct is its own composite key: `Eq + Hash` over the three fields,
/// compared exactly (case-sensitive, no collation).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct HierarchyRow {
    pub project: String,
    pub category: String,
    pub sub_category: String,
}

impl HierarchyRow {
    pub fn new(project: &str, category: &str, sub_category: &str) -> Self {
        HierarchyRow {
            project: project.to_string(),
            category: category.to_string(),
            sub_category: sub_category.to_string(),
        }
    }

    /// Display path: "项目 / 分类 / 子分类"
    pub fn path_string(&self) -> String {
        format!("{} / {} / {}", self.project, self.category, self.sub_category)
    }
}

// ============================================================================
// RAW FIELD ACCESS
// ============================================================================

/// Anything that carries a (possibly missing, possibly malformed) triple.
pub trait HierarchyFields {
    fn raw_project(&self) -> Option<Cow<'_, str>>;
    fn raw_category(&self) -> Option<Cow<'_, str>>;
    fn raw_sub_category(&self) -> Option<Cow<'_, str>>;
}

impl HierarchyFields for HierarchyRow {
    fn raw_project(&self) -> Option<Cow<'_, str>> {
        Some(Cow::Borrowed(&self.project))
    }

    fn raw_category(&self) -> Option<Cow<'_, str>> {
        Some(Cow::Borrowed(&self.category))
    }

    fn raw_sub_category(&self) -> Option<Cow<'_, str>> {
        Some(Cow::Borrowed(&self.sub_category))
    }
}

impl HierarchyFields for (&str, &str, &str) {
    fn raw_project(&self) -> Option<Cow<'_, str>> {
        Some(Cow::Borrowed(self.0))
    }

    fn raw_category(&self) -> Option<Cow<'_, str>> {
        Some(Cow::Borrowed(self.1))
    }

    fn raw_sub_category(&self) -> Option<Cow<'_, str>> {
        Some(Cow::Borrowed(self.2))
    }
}

/// Accepted key spellings per level. The first entry is the field name
/// itself; the rest also match after `canonical_key`.
pub(crate) const PROJECT_KEYS: &[&str] = &["project", "项目"];
pub(crate) const CATEGORY_KEYS: &[&str] = &["category", "分类", "类别"];
pub(crate) const SUB_CATEGORY_KEYS: &[&str] = &["sub_category", "subcategory", "子分类", "子类别"];

/// Lowercase and drop `_`, `-` and spaces: `Sub_Category` → `subcategory`
pub(crate) fn canonical_key(key: &str) -> String {
    key.chars()
        .filter(|c| !matches!(c, '_' | '-' | ' '))
        .flat_map(char::to_lowercase)
        .collect()
}

pub(crate) fn is_hierarchy_key(key: &str) -> bool {
    let canonical = canonical_key(key);
    [PROJECT_KEYS, CATEGORY_KEYS, SUB_CATEGORY_KEYS]
        .iter()
        .any(|keys| keys.contains(&canonical.as_str()))
}

/// Text form of a JSON scalar. Null, arrays and objects count as absent.
pub(crate) fn scalar_text(value: &Value) -> Option<Cow<'_, str>> {
    match value {
        Value::String(s) => Some(Cow::Borrowed(s.as_str())),
        Value::Number(n) => Some(Cow::Owned(n.to_string())),
        Value::Bool(b) => Some(Cow::Owned(b.to_string())),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

/// Exact key wins over a spelling variant, so `{"project": .., "Project": ..}`
/// always reads the same field.
pub(crate) fn object_field<'a>(map: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .find_map(|key| map.get(*key))
        .or_else(|| {
            map.iter()
                .find(|(k, _)| keys.contains(&canonical_key(k).as_str()))
                .map(|(_, v)| v)
        })
}

impl HierarchyFields for Value {
    fn raw_project(&self) -> Option<Cow<'_, str>> {
        self.as_object()
            .and_then(|map| object_field(map, PROJECT_KEYS))
            .and_then(scalar_text)
    }

    fn raw_category(&self) -> Option<Cow<'_, str>> {
        self.as_object()
            .and_then(|map| object_field(map, CATEGORY_KEYS))
            .and_then(scalar_text)
    }

    fn raw_sub_category(&self) -> Option<Cow<'_, str>> {
        self.as_object()
            .and_then(|map| object_field(map, SUB_CATEGORY_KEYS))
            .and_then(scalar_text)
    }
}

// ============================================================================
// RAW HIERARCHY ROW
// ============================================================================

/// A triple as it arrived, before normalization.
///
/// Deserializes from any JSON value. Non-object input yields an all-absent
/// row, which normalizes to the default row.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Value")]
pub struct RawHierarchyRow {
    pub project: Option<String>,
    pub category: Option<String>,
    pub sub_category: Option<String>,
}

impl RawHierarchyRow {
    pub fn new(project: &str, category: &str, sub_category: &str) -> Self {
        RawHierarchyRow {
            project: Some(project.to_string()),
            category: Some(category.to_string()),
            sub_category: Some(sub_category.to_string()),
        }
    }
}

impl From<Value> for RawHierarchyRow {
    fn from(value: Value) -> Self {
        RawHierarchyRow {
            project: value.raw_project().map(Cow::into_owned),
            category: value.raw_category().map(Cow::into_owned),
            sub_category: value.raw_sub_category().map(Cow::into_owned),
        }
    }
}

impl From<HierarchyRow> for RawHierarchyRow {
    fn from(row: HierarchyRow) -> Self {
        RawHierarchyRow {
            project: Some(row.project),
            category: Some(row.category),
            sub_category: Some(row.sub_category),
        }
    }
}

impl HierarchyFields for RawHierarchyRow {
    fn raw_project(&self) -> Option<Cow<'_, str>> {
        self.project.as_deref().map(Cow::Borrowed)
    }

    fn raw_category(&self) -> Option<Cow<'_, str>> {
        self.category.as_deref().map(Cow::Borrowed)
    }

    fn raw_sub_category(&self) -> Option<Cow<'_, str>> {
        self.sub_category.as_deref().map(Cow::Borrowed)
    }
}

// ============================================================================
// NORMALIZER
// ============================================================================

fn normalize_level(raw: Option<Cow<'_, str>>, fallback: &str) -> String {
    match raw.as_deref().map(str::trim) {
        Some(trimmed) if !trimmed.is_empty() => trimmed.to_string(),
        _ => fallback.to_string(),
    }
}

/// Trim every level and substitute the level default when blank or absent.
/// Idempotent: a normalized row normalizes to itself.
pub fn normalize_hierarchy_row<T>(raw: &T, defaults: &HierarchyDefaults) -> HierarchyRow
where
    T: HierarchyFields + ?Sized,
{
    HierarchyRow {
        project: normalize_level(raw.raw_project(), &defaults.project),
        category: normalize_level(raw.raw_category(), &defaults.category),
        sub_category: normalize_level(raw.raw_sub_category(), &defaults.sub_category),
    }
}

// ============================================================================
// DEDUPLICATOR + DEFAULT GUARANTEE
// ============================================================================

/// Drop repeated triples, keeping each first occurrence in its original order
pub fn dedupe_hierarchy_rows<I>(rows: I) -> Vec<HierarchyRow>
where
    I: IntoIterator<Item = HierarchyRow>,
{
    let mut seen = HashSet::new();
    let mut unique = Vec::new();

    for row in rows {
        if seen.insert(row.clone()) {
            unique.push(row);
        }
    }

    unique
}

/// Normalize, dedupe, and prepend the default row when history lacks it.
///
/// The result holds the default row exactly once and no duplicates.
pub fn ensure_default_hierarchy<T>(rows: &[T], defaults: &HierarchyDefaults) -> Vec<HierarchyRow>
where
    T: HierarchyFields,
{
    let mut unique =
        dedupe_hierarchy_rows(rows.iter().map(|raw| normalize_hierarchy_row(raw, defaults)));

    let default_row = defaults.default_row();
    if !unique.contains(&default_row) {
        unique.insert(0, default_row);
    }

    unique
}

// ============================================================================
// TESTS
// ============================================================================
