//! Property-based tests for the taxonomy engine
//!
//! 1. Normalization is idempotent
//! 2. The default row is always present exactly once, with no duplicates
//! 3. Deduplication keeps first-occurrence order
//! 4. Exact matches are never coerced
//! 5. Every unknown level falls back to its default
//! 6. Membership agrees with the normalized allowed set

use expense_taxonomy::*;
use proptest::prelude::*;
use std::collections::HashSet;

// ============================================================================
// Strategies
// ============================================================================

/// Small label alphabet so collisions (and therefore duplicates) are common
fn label_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("日常开支".to_string()),
        Just("其他".to_string()),
        Just("购物".to_string()),
        Just("旅行".to_string()),
        Just("A".to_string()),
        Just("a".to_string()),
        "[ \t]{0,2}[a-c]{0,2}[ \t]{0,2}".prop_map(|s| s),
    ]
}

fn raw_row_strategy() -> impl Strategy<Value = RawHierarchyRow> {
    (
        proptest::option::of(label_strategy()),
        proptest::option::of(label_strategy()),
        proptest::option::of(label_strategy()),
    )
        .prop_map(|(project, category, sub_category)| RawHierarchyRow {
            project,
            category,
            sub_category,
        })
}

fn rows_strategy() -> impl Strategy<Value = Vec<RawHierarchyRow>> {
    prop::collection::vec(raw_row_strategy(), 0..40)
}

fn defaults() -> HierarchyDefaults {
    HierarchyDefaults::default()
}

// ============================================================================
// Normalizer / Deduplicator / Default guarantee
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    #[test]
    fn normalization_is_idempotent(raw in raw_row_strategy()) {
        let once = normalize_hierarchy_row(&raw, &defaults());
        let twice = normalize_hierarchy_row(&once, &defaults());

        prop_assert_eq!(&once, &twice);
        prop_assert!(!once.project.is_empty());
        prop_assert_eq!(once.project.trim(), once.project.as_str());
    }

    #[test]
    fn default_row_present_exactly_once(rows in rows_strategy()) {
        let result = ensure_default_hierarchy(&rows, &defaults());
        let default_row = defaults().default_row();

        prop_assert_eq!(result.iter().filter(|r| **r == default_row).count(), 1);

        let unique: HashSet<_> = result.iter().collect();
        prop_assert_eq!(unique.len(), result.len());
    }

    #[test]
    fn dedupe_keeps_first_occurrence_order(rows in rows_strategy()) {
        let normalized: Vec<HierarchyRow> = rows
            .iter()
            .map(|r| normalize_hierarchy_row(r, &defaults()))
            .collect();

        let unique = dedupe_hierarchy_rows(normalized.clone());

        // Expected order: position of each triple's first appearance
        let mut expected = Vec::new();
        for row in &normalized {
            if !expected.contains(row) {
                expected.push(row.clone());
            }
        }
        prop_assert_eq!(unique, expected);
    }
}

// ============================================================================
// Lookup / Membership / Coercion
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(300))]

    #[test]
    fn source_rows_are_never_coerced(rows in rows_strategy()) {
        let lookup = HierarchyLookup::build(&rows, &defaults());

        for raw in &rows {
            let normalized = normalize_hierarchy_row(raw, &defaults());
            let resolution = lookup.resolve(raw);

            prop_assert!(resolution.is_exact());
            prop_assert_eq!(resolution.row, normalized);
        }
    }

    #[test]
    fn unknown_levels_fall_back(rows in rows_strategy(), candidate in raw_row_strategy()) {
        let lookup = HierarchyLookup::build(&rows, &defaults());
        let finalized = ensure_default_hierarchy(&rows, &defaults());
        let input = normalize_hierarchy_row(&candidate, &defaults());
        let resolved = lookup.coerce(&candidate);

        if finalized.contains(&input) {
            prop_assert_eq!(resolved, input);
        } else {
            let project_known = finalized.iter().any(|r| r.project == input.project);
            let expected_project = if project_known { input.project.clone() } else { defaults().project };
            prop_assert_eq!(&resolved.project, &expected_project);

            let category_known = finalized
                .iter()
                .any(|r| r.project == resolved.project && r.category == input.category);
            let expected_category = if category_known { input.category.clone() } else { defaults().category };
            prop_assert_eq!(&resolved.category, &expected_category);

            let sub_known = finalized.iter().any(|r| {
                r.project == resolved.project
                    && r.category == resolved.category
                    && r.sub_category == input.sub_category
            });
            let expected_sub = if sub_known { input.sub_category.clone() } else { defaults().sub_category };
            prop_assert_eq!(&resolved.sub_category, &expected_sub);
        }
    }

    #[test]
    fn membership_matches_allowed_set(rows in rows_strategy(), candidate in raw_row_strategy()) {
        let lookup = HierarchyLookup::build(&rows, &defaults());
        let finalized: HashSet<HierarchyRow> =
            ensure_default_hierarchy(&rows, &defaults()).into_iter().collect();

        let expected = finalized.contains(&normalize_hierarchy_row(&candidate, &defaults()));
        prop_assert_eq!(lookup.is_allowed(&candidate), expected);
    }

    #[test]
    fn rebuilding_is_deterministic(rows in rows_strategy()) {
        let a = HierarchyLookup::build(&rows, &defaults());
        let b = HierarchyLookup::build(&rows, &defaults());
        prop_assert_eq!(a, b);
    }
}
