//! End-to-end taxonomy scenarios: default guarantee, exact-match precedence,
//! per-level fallback, and the AI-candidate → SQLite → rebuilt snapshot flow.

use expense_taxonomy::*;
use rusqlite::Connection;
use serde_json::json;
use std::time::{Duration, Instant};

fn row(project: &str, category: &str, sub_category: &str) -> HierarchyRow {
    HierarchyRow::new(project, category, sub_category)
}

fn shopping_lookup() -> HierarchyLookup {
    let rows = vec![json!({"project": "日常开支", "category": "购物", "sub_category": "食品"})];
    build_hierarchy_lookup(&rows, &HierarchyDefaults::default())
}

// ============================================================================
// Core scenarios
// ============================================================================

#[test]
fn empty_history_yields_only_default_row() {
    let rows: Vec<RawHierarchyRow> = Vec::new();
    let result = ensure_default_hierarchy(&rows, &HierarchyDefaults::default());

    assert_eq!(result, vec![row("日常开支", "其他", "其他")]);
}

#[test]
fn unknown_triple_coerces_to_default() {
    let lookup = shopping_lookup();
    let coerced = coerce_hierarchy_triple(
        &json!({"project": "不存在", "category": "不存在", "sub_category": "不存在"}),
        &lookup,
    );

    assert_eq!(coerced, row("日常开支", "其他", "其他"));
}

#[test]
fn known_triple_is_returned_unchanged() {
    let lookup = shopping_lookup();
    let known = row("日常开支", "购物", "食品");

    assert!(is_allowed_hierarchy_triple(&known, &lookup));
    assert_eq!(coerce_hierarchy_triple(&known, &lookup), known);
}

#[test]
fn repeated_history_rows_are_deduplicated() {
    let rows = vec![
        RawHierarchyRow::new("日常开支", "购物", "食品"),
        RawHierarchyRow::new("日常开支", "购物", "食品"),
    ];
    let result = ensure_default_hierarchy(&rows, &HierarchyDefaults::default());

    let matching = result
        .iter()
        .filter(|r| **r == row("日常开支", "购物", "食品"))
        .count();
    assert_eq!(matching, 1);
    assert_eq!(result.len(), 2);
}

#[test]
fn only_unknown_sub_category_falls_back() {
    let lookup = shopping_lookup();
    let coerced = coerce_hierarchy_triple(&("日常开支", "购物", "不存在"), &lookup);

    assert_eq!(coerced, row("日常开支", "购物", "其他"));
}

#[test]
fn cross_project_category_is_not_recovered() {
    let rows = vec![
        RawHierarchyRow::new("日常开支", "购物", "食品"),
        RawHierarchyRow::new("旅行", "交通", "机票"),
    ];
    let lookup = HierarchyLookup::build(&rows, &HierarchyDefaults::default());

    let resolution = lookup.resolve(&("日常开支", "交通", "机票"));

    assert_eq!(resolution.row, row("日常开支", "其他", "其他"));
    assert_eq!(
        resolution.fallbacks(),
        Fallbacks {
            project: false,
            category: true,
            sub_category: true
        }
    );
}

// ============================================================================
// Performance
// ============================================================================

#[test]
fn coercion_over_thousands_of_labels_is_fast() {
    let mut rows = Vec::new();
    for p in 0..20 {
        for c in 0..20 {
            for s in 0..10 {
                rows.push(row(&format!("项目{}", p), &format!("分类{}", c), &format!("子分类{}", s)));
            }
        }
    }
    let lookup = HierarchyLookup::build(&rows, &HierarchyDefaults::default());
    assert_eq!(lookup.len(), 4001);

    let candidates: Vec<_> = (0..500)
        .map(|i| {
            json!({
                "project": format!("项目{}", i % 25),
                "category": format!("分类{}", i % 23),
                "sub_category": format!("子分类{}", i % 13),
            })
        })
        .collect();

    let started = Instant::now();
    let mut exact = 0;
    for candidate in &candidates {
        if lookup.is_allowed(candidate) {
            exact += 1;
        }
        let _ = lookup.coerce(candidate);
    }
    let elapsed = started.elapsed();

    assert!(exact > 0);
    assert!(
        elapsed < Duration::from_millis(500),
        "500 checks + coercions took {:?}",
        elapsed
    );
}

// ============================================================================
// Candidate → storage → snapshot flow
// ============================================================================

#[test]
fn saved_candidates_extend_rebuilt_snapshot_only_with_coerced_labels() {
    let conn = Connection::open_in_memory().unwrap();
    setup_database(&conn).unwrap();
    let defaults = HierarchyDefaults::default();

    add_curated_hierarchy_row(&conn, &row("日常开支", "餐饮", "午餐")).unwrap();
    let store = HierarchyStore::new(load_lookup(&conn, &defaults).unwrap());

    let candidates: Vec<ExpenseCandidate> = serde_json::from_value(json!([
        {"project": "日常开支", "category": "餐饮", "sub_category": "午餐", "amount": 32, "date": "2024-05-01"},
        {"project": "火星基地", "category": "氧气", "sub_category": "罐装", "amount": "¥99", "date": "2024-05-02"}
    ]))
    .unwrap();

    let sanitized = sanitize_candidates(candidates, &store.current());
    assert_eq!(sanitized[0].status, ResolutionStatus::Exact);
    assert_eq!(sanitized[1].row, defaults.default_row());

    let expenses: Vec<Expense> = sanitized
        .into_iter()
        .map(|c| c.into_expense(ExpenseSource::Ai).unwrap())
        .collect();
    assert_eq!(insert_expenses(&conn, &expenses).unwrap(), 2);

    let rebuilt = store.rebuild(&load_hierarchy_rows(&conn).unwrap());

    // Hallucinated labels never reach the taxonomy
    assert!(!rebuilt.is_allowed(&("火星基地", "氧气", "罐装")));
    assert_eq!(rebuilt.projects(), vec!["日常开支"]);
    assert_eq!(rebuilt.len(), 2);
}

#[test]
fn imported_history_becomes_known_taxonomy() {
    let data = "日期,金额,备注,项目,分类,子分类\n\
                2024-05-01,45,滴滴,出差,交通,打车\n";
    let report = import_from_reader(data.as_bytes(), &HierarchyDefaults::default()).unwrap();

    let conn = Connection::open_in_memory().unwrap();
    setup_database(&conn).unwrap();
    insert_expenses(&conn, &report.expenses).unwrap();

    let lookup = load_lookup(&conn, &HierarchyDefaults::default()).unwrap();

    assert!(lookup.is_allowed(&("出差", "交通", "打车")));
    assert_eq!(
        lookup.coerce(&("出差", "交通", "地铁")),
        row("出差", "交通", "其他")
    );
}
