// Expense Taxonomy - Web Server
// REST API over the taxonomy snapshot and the expense store

use anyhow::{Context, Result};
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use rusqlite::Connection;
use serde::Serialize;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tower_http::cors::CorsLayer;
use tracing::{error, info};

use expense_taxonomy::{
    get_all_expenses, init_tracing, insert_expenses, load_hierarchy_rows, load_lookup,
    normalize_hierarchy_row, sanitize_candidates, setup_database, spending_by_hierarchy,
    AppConfig, Expense, ExpenseCandidate, ExpenseSource, HierarchyLookup, HierarchyRow,
    HierarchySpending, HierarchyStore, Resolution, SanitizedCandidate,
};

/// Shared application state
#[derive(Clone)]
struct AppState {
    db: Arc<Mutex<Connection>>,
    taxonomy: Arc<HierarchyStore>,
}

impl AppState {
    fn db(&self) -> MutexGuard<'_, Connection> {
        self.db.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// API Response wrapper
#[derive(Serialize)]
struct ApiResponse<T> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    fn ok(data: T) -> Response {
        (
            StatusCode::OK,
            Json(Self {
                success: true,
                data: Some(data),
                error: None,
            }),
        )
            .into_response()
    }
}

fn failure(status: StatusCode, message: String) -> Response {
    (
        status,
        Json(ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(message),
        }),
    )
        .into_response()
}

fn internal_error(context: &str, err: anyhow::Error) -> Response {
    error!(error = %format!("{:#}", err), "{}", context);
    failure(StatusCode::INTERNAL_SERVER_ERROR, format!("{}: {}", context, err))
}

// ============================================================================
// Response types
// ============================================================================

#[derive(Serialize)]
struct CategoryNode {
    name: String,
    sub_categories: Vec<String>,
}

#[derive(Serialize)]
struct ProjectNode {
    name: String,
    categories: Vec<CategoryNode>,
}

#[derive(Serialize)]
struct TaxonomyResponse {
    defaults: HierarchyRow,
    projects: Vec<ProjectNode>,
}

impl From<&HierarchyLookup> for TaxonomyResponse {
    fn from(lookup: &HierarchyLookup) -> Self {
        let projects = lookup
            .projects()
            .into_iter()
            .map(|project| ProjectNode {
                name: project.to_string(),
                categories: lookup
                    .categories_for(project)
                    .into_iter()
                    .map(|category| CategoryNode {
                        name: category.to_string(),
                        sub_categories: lookup
                            .sub_categories_for(project, category)
                            .into_iter()
                            .map(str::to_string)
                            .collect(),
                    })
                    .collect(),
            })
            .collect();

        TaxonomyResponse {
            defaults: lookup.defaults().default_row(),
            projects,
        }
    }
}

#[derive(Serialize)]
struct CheckResponse {
    allowed: bool,
    row: HierarchyRow,
}

#[derive(Serialize)]
struct SaveResponse {
    inserted: usize,
    candidates: Vec<SanitizedCandidate>,
}

fn candidates_from(value: Value) -> Vec<ExpenseCandidate> {
    match value {
        Value::Array(items) => items.into_iter().map(ExpenseCandidate::from).collect(),
        other => vec![ExpenseCandidate::from(other)],
    }
}

// ============================================================================
// API Handlers
// ============================================================================

/// GET /api/health - Health check
async fn health_check() -> Response {
    ApiResponse::ok("OK")
}

/// GET /api/taxonomy - Known labels as a project → category → sub-category tree
async fn get_taxonomy(State(state): State<AppState>) -> Response {
    let lookup = state.taxonomy.current();
    ApiResponse::ok(TaxonomyResponse::from(lookup.as_ref()))
}

/// POST /api/taxonomy/check - Exact membership of one triple
async fn check_triple(State(state): State<AppState>, Json(body): Json<Value>) -> Response {
    let lookup = state.taxonomy.current();
    ApiResponse::ok(CheckResponse {
        allowed: lookup.is_allowed(&body),
        row: normalize_hierarchy_row(&body, lookup.defaults()),
    })
}

/// POST /api/taxonomy/coerce - Nearest known triple
async fn coerce_triple(State(state): State<AppState>, Json(body): Json<Value>) -> Response {
    let resolution: Resolution = state.taxonomy.current().resolve(&body);
    ApiResponse::ok(resolution)
}

/// POST /api/candidates - Sanitize AI candidates without saving
async fn preview_candidates(State(state): State<AppState>, Json(body): Json<Value>) -> Response {
    let lookup = state.taxonomy.current();
    ApiResponse::ok(sanitize_candidates(candidates_from(body), &lookup))
}

/// POST /api/expenses - Sanitize, save, and refresh the taxonomy snapshot
async fn create_expenses(State(state): State<AppState>, Json(body): Json<Value>) -> Response {
    let lookup = state.taxonomy.current();
    let sanitized = sanitize_candidates(candidates_from(body), &lookup);

    let mut expenses: Vec<Expense> = Vec::with_capacity(sanitized.len());
    for (index, candidate) in sanitized.iter().enumerate() {
        match candidate.clone().into_expense(ExpenseSource::Ai) {
            Ok(expense) => expenses.push(expense),
            Err(err) => {
                return failure(
                    StatusCode::BAD_REQUEST,
                    format!("Candidate #{} cannot be saved: {:#}", index + 1, err),
                )
            }
        }
    }

    let conn = state.db();
    let inserted = match insert_expenses(&conn, &expenses) {
        Ok(inserted) => inserted,
        Err(err) => return internal_error("Failed to save expenses", err),
    };

    match load_hierarchy_rows(&conn) {
        Ok(rows) => {
            state.taxonomy.rebuild(&rows);
        }
        Err(err) => return internal_error("Failed to reload taxonomy", err),
    }

    ApiResponse::ok(SaveResponse {
        inserted,
        candidates: sanitized,
    })
}

/// GET /api/expenses - All stored expenses, newest first
async fn get_expenses(State(state): State<AppState>) -> Response {
    let conn = state.db();
    match get_all_expenses(&conn) {
        Ok(expenses) => ApiResponse::ok(expenses),
        Err(err) => internal_error("Failed to load expenses", err),
    }
}

/// GET /api/summary - Spending per triple
async fn get_summary(State(state): State<AppState>) -> Response {
    let conn = state.db();
    match spending_by_hierarchy(&conn) {
        Ok(totals) => ApiResponse::<Vec<HierarchySpending>>::ok(totals),
        Err(err) => internal_error("Failed to compute summary", err),
    }
}

// ============================================================================
// Main Server
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let config_path = std::env::var_os("EXPENSE_CONFIG").map(PathBuf::from);
    let config = AppConfig::load(config_path.as_deref())?;
    init_tracing(&config.log_filter);

    let conn = Connection::open(&config.database_path)
        .with_context(|| format!("Failed to open database: {:?}", config.database_path))?;
    setup_database(&conn)?;

    let lookup = load_lookup(&conn, &config.defaults)?;
    info!(db = ?config.database_path, triples = lookup.len(), "taxonomy loaded");

    let state = AppState {
        db: Arc::new(Mutex::new(conn)),
        taxonomy: Arc::new(HierarchyStore::new(lookup)),
    };

    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route("/taxonomy", get(get_taxonomy))
        .route("/taxonomy/check", post(check_triple))
        .route("/taxonomy/coerce", post(coerce_triple))
        .route("/candidates", post(preview_candidates))
        .route("/expenses", get(get_expenses).post(create_expenses))
        .route("/summary", get(get_summary))
        .with_state(state);

    let app = Router::new()
        .nest("/api", api_routes)
        .layer(CorsLayer::permissive());

    let addr = std::env::var("EXPENSE_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    info!(%addr, "server listening");

    axum::serve(listener, app).await.context("Server error")?;

    Ok(())
}
