// 📥 Spreadsheet Import - CSV exports of the expense sheet
// Headers may be English or Chinese. Imported triples are normalized but not
// coerced: imported history extends the known-good taxonomy.

use anyhow::{Context, Result};
use csv::StringRecord;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::{info, warn};

use crate::expense::{
    parse_amount_text, parse_expense_date, Expense, ExpenseSource, AMOUNT_KEYS, DATE_KEYS,
    DESCRIPTION_KEYS,
};
use crate::taxonomy::row::{canonical_key, CATEGORY_KEYS, PROJECT_KEYS, SUB_CATEGORY_KEYS};
use crate::taxonomy::{normalize_hierarchy_row, HierarchyDefaults, RawHierarchyRow};

// ============================================================================
// IMPORT REPORT
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedRow {
    /// 1-based line in the file (header is line 1)
    pub line: u64,
    pub reason: String,
}

#[derive(Debug, Clone, Default)]
pub struct ImportReport {
    pub expenses: Vec<Expense>,
    pub skipped: Vec<SkippedRow>,
}

// ============================================================================
// COLUMN MAPPING
// ============================================================================

#[derive(Debug, Default)]
struct Columns {
    date: Option<usize>,
    amount: Option<usize>,
    description: Option<usize>,
    project: Option<usize>,
    category: Option<usize>,
    sub_category: Option<usize>,
}

impl Columns {
    fn from_headers(headers: &StringRecord) -> Self {
        let position = |keys: &[&str]| {
            headers
                .iter()
                .position(|header| keys.contains(&canonical_key(header.trim()).as_str()))
        };

        Columns {
            date: position(DATE_KEYS),
            amount: position(AMOUNT_KEYS),
            description: position(DESCRIPTION_KEYS),
            project: position(PROJECT_KEYS),
            category: position(CATEGORY_KEYS),
            sub_category: position(SUB_CATEGORY_KEYS),
        }
    }
}

fn cell(record: &StringRecord, column: Option<usize>) -> Option<&str> {
    column.and_then(|index| record.get(index))
}

/// 1-based line of the first non-blank byte at or after `offset`.
///
/// A record's byte position points just past the previous record, before
/// any blank lines the reader skipped.
fn line_at(data: &[u8], offset: u64) -> u64 {
    let start = usize::try_from(offset).map_or(data.len(), |o| o.min(data.len()));
    let first = data[start..]
        .iter()
        .position(|b| !matches!(b, b'\r' | b'\n'))
        .map_or(data.len(), |i| start + i);

    data[..first].iter().filter(|&&b| b == b'\n').count() as u64 + 1
}

// ============================================================================
// IMPORT
// ============================================================================

/// Import every row of a CSV file. Unreadable files fail; bad rows are
/// skipped and reported.
pub fn import_csv(path: &Path, defaults: &HierarchyDefaults) -> Result<ImportReport> {
    let file = File::open(path).with_context(|| format!("Failed to open CSV file: {:?}", path))?;

    let report = import_from_reader(file, defaults)?;

    info!(
        file = %path.display(),
        imported = report.expenses.len(),
        skipped = report.skipped.len(),
        "spreadsheet import finished"
    );

    Ok(report)
}

/// Import CSV text from any byte source. The input is read whole so skipped
/// rows can be reported by their line in the file.
pub fn import_from_reader<R: Read>(mut input: R, defaults: &HierarchyDefaults) -> Result<ImportReport> {
    let mut data = Vec::new();
    input
        .read_to_end(&mut data)
        .context("Failed to read CSV input")?;

    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(data.as_slice());

    let headers = reader.headers().context("Failed to read CSV headers")?.clone();
    let columns = Columns::from_headers(&headers);

    if columns.amount.is_none() {
        anyhow::bail!("CSV has no amount column (expected one of: amount, 金额)");
    }
    if columns.date.is_none() {
        anyhow::bail!("CSV has no date column (expected one of: date, 日期)");
    }

    let mut report = ImportReport::default();

    for result in reader.records() {
        let record = result.context("Failed to read CSV record")?;
        let line = line_at(&data, record.position().map_or(0, |pos| pos.byte()));

        match parse_record(&record, &columns, defaults) {
            Ok(expense) => report.expenses.push(expense),
            Err(reason) => {
                warn!(line, reason = %reason, "import row skipped");
                report.skipped.push(SkippedRow { line, reason });
            }
        }
    }

    Ok(report)
}

fn parse_record(
    record: &StringRecord,
    columns: &Columns,
    defaults: &HierarchyDefaults,
) -> std::result::Result<Expense, String> {
    let amount_text = cell(record, columns.amount).unwrap_or("");
    let amount = parse_amount_text(amount_text)
        .ok_or_else(|| format!("invalid amount: {:?}", amount_text))?;

    let date = match cell(record, columns.date).map(str::trim) {
        Some(text) if !text.is_empty() => {
            parse_expense_date(text).ok_or_else(|| format!("invalid date: {:?}", text))?
        }
        _ => return Err("missing date".to_string()),
    };

    let raw = RawHierarchyRow {
        project: cell(record, columns.project).map(str::to_string),
        category: cell(record, columns.category).map(str::to_string),
        sub_category: cell(record, columns.sub_category).map(str::to_string),
    };
    let hierarchy = normalize_hierarchy_row(&raw, defaults);

    let description = cell(record, columns.description).unwrap_or("");

    Ok(Expense::new(date, amount, description, hierarchy, ExpenseSource::Import))
}

// ============================================================================
// TESTS
// ============================================================================
