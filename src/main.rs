use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use rusqlite::Connection;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};

use expense_taxonomy::{
    add_curated_hierarchy_row, import_csv, init_tracing, insert_expenses, load_lookup,
    sanitize_candidates, setup_database, spending_by_hierarchy, verify_count, AppConfig,
    ExpenseCandidate, ExpenseSource, HierarchyLookup, RawHierarchyRow, ResolutionStatus,
};

#[derive(Parser)]
#[command(name = "expense-taxonomy", version, about = "Expense records with a controlled category taxonomy")]
struct Cli {
    /// JSON config file (database path, default labels, log filter)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// SQLite database, overrides the config file
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Import a CSV export of the expense sheet
    Import { csv: PathBuf },

    /// List known projects, categories and sub-categories
    Taxonomy,

    /// Is this exact triple allowed?
    Check(TripleArgs),

    /// Map a triple onto the nearest known labels
    Coerce(TripleArgs),

    /// Resolve AI-proposed candidates from a JSON file (object or array)
    Sanitize {
        candidates: PathBuf,

        /// Store the sanitized candidates as expenses
        #[arg(long)]
        save: bool,
    },

    /// Approve a new triple so it becomes part of the taxonomy
    Curate(TripleArgs),

    /// Spending totals per triple
    Summary,
}

#[derive(Args)]
struct TripleArgs {
    project: String,
    #[arg(default_value = "")]
    category: String,
    #[arg(default_value = "")]
    sub_category: String,
}

impl TripleArgs {
    fn raw(&self) -> RawHierarchyRow {
        RawHierarchyRow::new(&self.project, &self.category, &self.sub_category)
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = AppConfig::load(cli.config.as_deref())?;
    if let Some(db) = cli.db {
        config.database_path = db;
    }
    init_tracing(&config.log_filter);

    let conn = Connection::open(&config.database_path)
        .with_context(|| format!("Failed to open database: {:?}", config.database_path))?;
    setup_database(&conn)?;

    match cli.command {
        Command::Import { csv } => run_import(&conn, &config, &csv),
        Command::Taxonomy => run_taxonomy(&load_lookup(&conn, &config.defaults)?),
        Command::Check(triple) => {
            let lookup = load_lookup(&conn, &config.defaults)?;
            let allowed = lookup.is_allowed(&triple.raw());
            println!("{}", if allowed { "✓ allowed" } else { "✗ not allowed" });
            Ok(())
        }
        Command::Coerce(triple) => {
            let lookup = load_lookup(&conn, &config.defaults)?;
            let resolution = lookup.resolve(&triple.raw());
            println!("{}", serde_json::to_string_pretty(&resolution)?);
            Ok(())
        }
        Command::Sanitize { candidates, save } => run_sanitize(&conn, &config, &candidates, save),
        Command::Curate(triple) => {
            let row = expense_taxonomy::normalize_hierarchy_row(&triple.raw(), &config.defaults);
            if add_curated_hierarchy_row(&conn, &row)? {
                println!("✓ Added {}", row.path_string());
            } else {
                println!("✓ Already known: {}", row.path_string());
            }
            Ok(())
        }
        Command::Summary => {
            for total in spending_by_hierarchy(&conn)? {
                println!(
                    "{:>12.2}  {:>4}  {} / {} / {}",
                    total.total_amount,
                    total.expense_count,
                    total.project,
                    total.category,
                    total.sub_category
                );
            }
            Ok(())
        }
    }
}

fn run_import(conn: &Connection, config: &AppConfig, csv: &Path) -> Result<()> {
    println!("📂 Loading CSV...");
    let report = import_csv(csv, &config.defaults)?;
    println!("✓ Parsed {} expenses", report.expenses.len());

    for skipped in &report.skipped {
        println!("  ⚠ line {}: {}", skipped.line, skipped.reason);
    }

    println!("\n💾 Inserting expenses...");
    let inserted = insert_expenses(conn, &report.expenses)?;
    let count = verify_count(conn)?;

    println!("✓ Inserted {} new expenses", inserted);
    println!("✓ Database contains {} expenses", count);

    Ok(())
}

fn run_taxonomy(lookup: &HierarchyLookup) -> Result<()> {
    for project in lookup.projects() {
        println!("{}", project);
        for category in lookup.categories_for(project) {
            println!("  {}", category);
            for sub_category in lookup.sub_categories_for(project, category) {
                println!("    {}", sub_category);
            }
        }
    }
    Ok(())
}

fn run_sanitize(conn: &Connection, config: &AppConfig, path: &Path, save: bool) -> Result<()> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read candidates file: {:?}", path))?;
    let value: Value = serde_json::from_str(&content).context("Failed to parse candidates JSON")?;

    let candidates: Vec<ExpenseCandidate> = match value {
        Value::Array(items) => items.into_iter().map(ExpenseCandidate::from).collect(),
        other => vec![ExpenseCandidate::from(other)],
    };

    let lookup = load_lookup(conn, &config.defaults)?;
    let sanitized = sanitize_candidates(candidates, &lookup);

    for candidate in &sanitized {
        let marker = match candidate.status {
            ResolutionStatus::Exact => "✓",
            ResolutionStatus::Coerced(_) => "↺",
        };
        println!("{} {}  {}", marker, candidate.row.path_string(), Value::Object(candidate.fields.clone()));
    }

    if save {
        let expenses = sanitized
            .into_iter()
            .enumerate()
            .map(|(index, candidate)| {
                candidate
                    .into_expense(ExpenseSource::Ai)
                    .with_context(|| format!("Candidate #{} cannot be saved", index + 1))
            })
            .collect::<Result<Vec<_>>>()?;

        let inserted = insert_expenses(conn, &expenses)?;
        println!("\n✓ Saved {} expenses", inserted);
    }

    Ok(())
}
