use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::expense::{Expense, ExpenseSource};
use crate::taxonomy::{HierarchyDefaults, HierarchyLookup, HierarchyRow, RawHierarchyRow};

pub fn setup_database(conn: &Connection) -> Result<()> {
    // Enable WAL mode for crash recovery
    conn.pragma_update(None, "journal_mode", "WAL")?;

    // ==========================================================================
    // Expenses Table
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS expenses (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            idempotency_hash TEXT UNIQUE NOT NULL,
            expense_uuid TEXT UNIQUE NOT NULL,
            date TEXT NOT NULL,
            amount REAL NOT NULL,
            description TEXT NOT NULL,
            project TEXT NOT NULL,
            category TEXT NOT NULL,
            sub_category TEXT NOT NULL,
            source TEXT NOT NULL,
            created_at TEXT NOT NULL
        )",
        [],
    )?;

    // ==========================================================================
    // Curated hierarchy rows (labels approved by the user, with or without expenses)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS hierarchy_rows (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            project TEXT NOT NULL,
            category TEXT NOT NULL,
            sub_category TEXT NOT NULL,
            created_at TEXT NOT NULL,
            UNIQUE(project, category, sub_category)
        )",
        [],
    )?;

    // ==========================================================================
    // Indexes
    // ==========================================================================
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_expenses_date ON expenses(date)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_expenses_hierarchy ON expenses(project, category, sub_category)",
        [],
    )?;

    Ok(())
}

/// Insert expenses, skipping ones whose idempotency hash is already stored.
/// Returns the number actually inserted.
pub fn insert_expenses(conn: &Connection, expenses: &[Expense]) -> Result<usize> {
    let mut inserted = 0;
    let mut duplicates = 0;

    for expense in expenses {
        let hash = expense.compute_idempotency_hash();

        let result = conn.execute(
            "INSERT INTO expenses (
                idempotency_hash, expense_uuid, date, amount, description,
                project, category, sub_category, source, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                hash,
                expense.id,
                expense.date.format("%Y-%m-%d").to_string(),
                expense.amount,
                expense.description,
                expense.project,
                expense.category,
                expense.sub_category,
                expense.source.as_str(),
                expense.created_at.to_rfc3339(),
            ],
        );

        match result {
            Ok(_) => inserted += 1,
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                debug!(hash = %hash, "duplicate expense skipped");
                duplicates += 1;
            }
            Err(e) => return Err(e).context("Failed to insert expense"),
        }
    }

    info!(inserted, duplicates, "expenses stored");

    Ok(inserted)
}

pub fn get_all_expenses(conn: &Connection) -> Result<Vec<Expense>> {
    let mut stmt = conn.prepare(
        "SELECT expense_uuid, date, amount, description,
                project, category, sub_category, source, created_at
         FROM expenses
         ORDER BY date DESC, id DESC",
    )?;

    let rows = stmt
        .query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, f64>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, String>(5)?,
                row.get::<_, String>(6)?,
                row.get::<_, String>(7)?,
                row.get::<_, String>(8)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    rows.into_iter()
        .map(
            |(id, date, amount, description, project, category, sub_category, source, created_at)| -> Result<Expense> {
                let date = NaiveDate::parse_from_str(&date, "%Y-%m-%d")
                    .with_context(|| format!("Corrupt expense date in database: {}", date))?;
                let created_at = DateTime::parse_from_rfc3339(&created_at)
                    .map(|dt| dt.with_timezone(&Utc))
                    .with_context(|| format!("Corrupt expense timestamp in database: {}", created_at))?;

                Ok(Expense {
                    id,
                    date,
                    amount,
                    description,
                    project,
                    category,
                    sub_category,
                    source: ExpenseSource::from_str_lossy(&source),
                    created_at,
                })
            },
        )
        .collect()
}

pub fn verify_count(conn: &Connection) -> Result<i64> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM expenses", [], |row| row.get(0))?;

    Ok(count)
}

/// Record a user-approved triple. Returns false when it was already curated.
pub fn add_curated_hierarchy_row(conn: &Connection, row: &HierarchyRow) -> Result<bool> {
    let changed = conn
        .execute(
            "INSERT OR IGNORE INTO hierarchy_rows (project, category, sub_category, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![row.project, row.category, row.sub_category, Utc::now().to_rfc3339()],
        )
        .context("Failed to store curated hierarchy row")?;

    Ok(changed > 0)
}

/// Every triple the taxonomy should know: curated rows first, then the
/// triples used by stored expenses, each in insertion order.
/// Returned raw; the lookup builder normalizes and dedupes.
pub fn load_hierarchy_rows(conn: &Connection) -> Result<Vec<RawHierarchyRow>> {
    let mut stmt = conn.prepare(
        "SELECT project, category, sub_category FROM (
             SELECT 0 AS origin, id, project, category, sub_category FROM hierarchy_rows
             UNION ALL
             SELECT 1 AS origin, id, project, category, sub_category FROM expenses
         )
         ORDER BY origin, id",
    )?;

    let rows = stmt
        .query_map([], |row| {
            Ok(RawHierarchyRow {
                project: row.get(0)?,
                category: row.get(1)?,
                sub_category: row.get(2)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(rows)
}

/// Build the current lookup from everything stored
pub fn load_lookup(conn: &Connection, defaults: &HierarchyDefaults) -> Result<HierarchyLookup> {
    let rows = load_hierarchy_rows(conn)?;
    Ok(HierarchyLookup::build(&rows, defaults))
}

/// Spending total for one (project, category, sub-category)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HierarchySpending {
    pub project: String,
    pub category: String,
    pub sub_category: String,
    pub expense_count: i64,
    pub total_amount: f64,
}

pub fn spending_by_hierarchy(conn: &Connection) -> Result<Vec<HierarchySpending>> {
    let mut stmt = conn.prepare(
        "SELECT project, category, sub_category, COUNT(*), SUM(amount)
         FROM expenses
         GROUP BY project, category, sub_category
         ORDER BY SUM(amount) DESC, project, category, sub_category",
    )?;

    let totals = stmt
        .query_map([], |row| {
            Ok(HierarchySpending {
                project: row.get(0)?,
                category: row.get(1)?,
                sub_category: row.get(2)?,
                expense_count: row.get(3)?,
                total_amount: row.get(4)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(totals)
}
