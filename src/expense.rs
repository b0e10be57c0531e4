// 💸 Expense Records + AI Candidates
// The AI parser proposes candidates; their triples are untrusted and must be
// resolved against the current lookup before anything is shown or saved.

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::borrow::Cow;
use tracing::debug;

use crate::taxonomy::row::{is_hierarchy_key, object_field, scalar_text};
use crate::taxonomy::{HierarchyFields, HierarchyLookup, HierarchyRow, ResolutionStatus};

/// Accepted spellings for the non-hierarchy fields (compared after key canonicalization)
pub(crate) const DATE_KEYS: &[&str] = &["date", "日期"];
pub(crate) const AMOUNT_KEYS: &[&str] = &["amount", "金额"];
pub(crate) const DESCRIPTION_KEYS: &[&str] = &["description", "描述", "note", "备注", "remark"];

// ============================================================================
// EXPENSE SOURCE
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpenseSource {
    /// Entered by hand in the record form
    Manual,

    /// Proposed by the speech/text parser and accepted
    Ai,

    /// Loaded from a spreadsheet export
    Import,
}

impl ExpenseSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExpenseSource::Manual => "manual",
            ExpenseSource::Ai => "ai",
            ExpenseSource::Import => "import",
        }
    }

    /// Unknown stored values read back as Manual
    pub fn from_str_lossy(value: &str) -> Self {
        match value {
            "ai" => ExpenseSource::Ai,
            "import" => ExpenseSource::Import,
            _ => ExpenseSource::Manual,
        }
    }
}

// ============================================================================
// EXPENSE
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expense {
    /// Stable identity (UUID v4)
    pub id: String,
    pub date: NaiveDate,
    pub amount: f64,
    pub description: String,
    pub project: String,
    pub category: String,
    pub sub_category: String,
    pub source: ExpenseSource,
    pub created_at: DateTime<Utc>,
}

impl Expense {
    pub fn new(
        date: NaiveDate,
        amount: f64,
        description: &str,
        hierarchy: HierarchyRow,
        source: ExpenseSource,
    ) -> Self {
        Expense {
            id: uuid::Uuid::new_v4().to_string(),
            date,
            amount,
            description: description.trim().to_string(),
            project: hierarchy.project,
            category: hierarchy.category,
            sub_category: hierarchy.sub_category,
            source,
            created_at: Utc::now(),
        }
    }

    pub fn hierarchy(&self) -> HierarchyRow {
        HierarchyRow::new(&self.project, &self.category, &self.sub_category)
    }

    /// Duplicate-detection hash. Identity is `id`; this only spots re-imports.
    pub fn compute_idempotency_hash(&self) -> String {
        let mut hasher = Sha256::new();
        for part in [
            self.date.to_string(),
            format!("{:.2}", self.amount),
            self.description.clone(),
            self.project.clone(),
            self.category.clone(),
            self.sub_category.clone(),
        ] {
            hasher.update(part.as_bytes());
            hasher.update([0x1fu8]);
        }
        format!("{:x}", hasher.finalize())
    }
}

impl HierarchyFields for Expense {
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

// ============================================================================
// FIELD PARSING
// ============================================================================

/// Supports YYYY-MM-DD, YYYY/MM/DD, YYYY.MM.DD, YYYY年MM月DD日 and MM/DD/YYYY
pub fn parse_expense_date(text: &str) -> Option<NaiveDate> {
    const FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%Y.%m.%d", "%Y年%m月%d日", "%m/%d/%Y"];

    let trimmed = text.trim();
    FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(trimmed, format).ok())
}

/// Amount text with currency decorations: "¥45.50", "1,200元", " 30 "
pub fn parse_amount_text(text: &str) -> Option<f64> {
    let cleaned: String = text
        .chars()
        .filter(|c| !c.is_whitespace() && !matches!(c, '¥' | '￥' | '$' | ',' | '，' | '元'))
        .collect();

    cleaned.parse::<f64>().ok().filter(|amount| amount.is_finite())
}

pub fn parse_amount(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64().filter(|amount| amount.is_finite()),
        Value::String(s) => parse_amount_text(s),
        _ => None,
    }
}

// ============================================================================
// AI CANDIDATE
// ============================================================================

/// One record proposed by the AI parser.
///
/// The triple is kept raw; every other field passes through untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Value")]
pub struct ExpenseCandidate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub_category: Option<String>,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl From<Value> for ExpenseCandidate {
    fn from(value: Value) -> Self {
        let project = value.raw_project().map(Cow::into_owned);
        let category = value.raw_category().map(Cow::into_owned);
        let sub_category = value.raw_sub_category().map(Cow::into_owned);

        let fields = match value {
            Value::Object(map) => map
                .into_iter()
                .filter(|(key, _)| !is_hierarchy_key(key))
                .collect(),
            _ => Map::new(),
        };

        ExpenseCandidate {
            project,
            category,
            sub_category,
            fields,
        }
    }
}

impl HierarchyFields for ExpenseCandidate {
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
// SANITIZED CANDIDATE
// ============================================================================

/// A candidate whose triple has been resolved onto known labels
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SanitizedCandidate {
    pub row: HierarchyRow,
    pub status: ResolutionStatus,
    pub fields: Map<String, Value>,
}

impl SanitizedCandidate {
    /// Convert to a storable expense. Needs a usable amount; a missing date
    /// means today (UTC).
    pub fn into_expense(self, source: ExpenseSource) -> Result<Expense> {
        let amount_value = object_field(&self.fields, AMOUNT_KEYS)
            .ok_or_else(|| anyhow!("Candidate has no amount field"))?;
        let amount = parse_amount(amount_value)
            .with_context(|| format!("Unparseable candidate amount: {}", amount_value))?;

        let date = match object_field(&self.fields, DATE_KEYS) {
            None | Some(Value::Null) => Utc::now().date_naive(),
            Some(value) => scalar_text(value)
                .and_then(|text| parse_expense_date(&text))
                .with_context(|| format!("Unparseable candidate date: {}", value))?,
        };

        let description = object_field(&self.fields, DESCRIPTION_KEYS)
            .and_then(scalar_text)
            .unwrap_or_default();

        Ok(Expense::new(date, amount, &description, self.row, source))
    }
}

/// Resolve one candidate's triple against the lookup
pub fn sanitize_candidate(candidate: ExpenseCandidate, lookup: &HierarchyLookup) -> SanitizedCandidate {
    let resolution = lookup.resolve(&candidate);

    if !resolution.is_exact() {
        debug!(
            proposed_project = ?candidate.project,
            proposed_category = ?candidate.category,
            proposed_sub_category = ?candidate.sub_category,
            resolved = %resolution.row.path_string(),
            "candidate hierarchy coerced"
        );
    }

    SanitizedCandidate {
        row: resolution.row,
        status: resolution.status,
        fields: candidate.fields,
    }
}

pub fn sanitize_candidates(
    candidates: Vec<ExpenseCandidate>,
    lookup: &HierarchyLookup,
) -> Vec<SanitizedCandidate> {
    candidates
        .into_iter()
        .map(|candidate| sanitize_candidate(candidate, lookup))
        .collect()
}

// ============================================================================
// TESTS
// ============================================================================
