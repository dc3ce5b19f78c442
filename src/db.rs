use std::path::Path;

use anyhow::Result;
use rusqlite::Connection;

use crate::model::{ExtractionStats, ProductRecord};

pub fn connect(path: &str) -> Result<Connection> {
    if let Some(parent) = Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let conn = Connection::open(path)?;
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS runs (
            id                   INTEGER PRIMARY KEY,
            dispensary           TEXT NOT NULL,
            started_at           TEXT NOT NULL,
            finished_at          TEXT,
            duration_seconds     REAL,
            total_products       INTEGER NOT NULL DEFAULT 0,
            successful           INTEGER NOT NULL DEFAULT 0,
            failed               INTEGER NOT NULL DEFAULT 0,
            duplicates           INTEGER NOT NULL DEFAULT 0,
            filtered_out         INTEGER NOT NULL DEFAULT 0,
            categories_processed INTEGER NOT NULL DEFAULT 0,
            status               TEXT NOT NULL CHECK(status IN ('completed','failed','cancelled')),
            error                TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_runs_dispensary ON runs(dispensary);

        CREATE TABLE IF NOT EXISTS products (
            id            INTEGER PRIMARY KEY,
            run_id        INTEGER NOT NULL REFERENCES runs(id),
            dispensary    TEXT NOT NULL,
            product_name  TEXT NOT NULL,
            category      TEXT NOT NULL,
            brand         TEXT,
            strain_type   TEXT,
            thc_percent   TEXT,
            thc_numeric   REAL,
            cbd_percent   TEXT,
            cbd_numeric   REAL,
            size_weight   TEXT,
            price         REAL,
            price_raw     TEXT,
            stock_status  TEXT NOT NULL,
            product_url   TEXT,
            captured_at   TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_products_run ON products(run_id);
        CREATE INDEX IF NOT EXISTS idx_products_dispensary ON products(dispensary, category);

        CREATE TABLE IF NOT EXISTS category_reports (
            id             INTEGER PRIMARY KEY,
            run_id         INTEGER NOT NULL REFERENCES runs(id),
            category       TEXT NOT NULL,
            entries_found  INTEGER NOT NULL,
            extracted      INTEGER NOT NULL,
            failed         INTEGER NOT NULL,
            duplicates     INTEGER NOT NULL,
            filtered_out   INTEGER NOT NULL,
            kept           INTEGER NOT NULL,
            scroll_outcome TEXT,
            error          TEXT,
            UNIQUE(run_id, category)
        );
        ",
    )?;
    Ok(())
}

// ── Runs ──

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Completed,
    Failed,
    Cancelled,
}

impl RunStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
            RunStatus::Cancelled => "cancelled",
        }
    }
}

/// Persist one finalized run with its kept records and category reports.
pub fn save_run(
    conn: &Connection,
    stats: &ExtractionStats,
    records: &[ProductRecord],
    status: RunStatus,
    error: Option<&str>,
) -> Result<i64> {
    let tx = conn.unchecked_transaction()?;
    let run_id;
    {
        tx.execute(
            "INSERT INTO runs
             (dispensary, started_at, finished_at, duration_seconds, total_products, successful,
              failed, duplicates, filtered_out, categories_processed, status, error)
             VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12)",
            rusqlite::params![
                stats.dispensary,
                stats.start_time.to_rfc3339(),
                stats.end_time.map(|t| t.to_rfc3339()),
                stats.duration_seconds,
                stats.total_products as i64,
                stats.successful_extractions as i64,
                stats.failed_extractions as i64,
                stats.duplicates_skipped as i64,
                stats.filtered_out as i64,
                stats.categories_processed as i64,
                status.as_str(),
                error,
            ],
        )?;
        run_id = tx.last_insert_rowid();

        let mut p_stmt = tx.prepare(
            "INSERT INTO products
             (run_id, dispensary, product_name, category, brand, strain_type, thc_percent,
              thc_numeric, cbd_percent, cbd_numeric, size_weight, price, price_raw,
              stock_status, product_url, captured_at)
             VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16)",
        )?;
        for r in records {
            p_stmt.execute(rusqlite::params![
                run_id,
                stats.dispensary,
                r.name,
                r.category.slug(),
                r.brand,
                r.strain_type.map(|s| s.as_str()),
                r.thc_percent,
                r.thc_numeric,
                r.cbd_percent,
                r.cbd_numeric,
                r.size_weight,
                r.price,
                r.price_raw,
                r.stock_status.as_str(),
                r.product_url,
                r.date_captured_utc.to_rfc3339(),
            ])?;
        }

        let mut c_stmt = tx.prepare(
            "INSERT OR REPLACE INTO category_reports
             (run_id, category, entries_found, extracted, failed, duplicates, filtered_out,
              kept, scroll_outcome, error)
             VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10)",
        )?;
        for c in &stats.categories {
            c_stmt.execute(rusqlite::params![
                run_id,
                c.category.slug(),
                c.entries_found as i64,
                c.extracted as i64,
                c.failed as i64,
                c.duplicates as i64,
                c.filtered_out as i64,
                c.kept as i64,
                c.scroll_outcome.map(|s| s.as_str()),
                c.error,
            ])?;
        }
    }
    tx.commit()?;
    Ok(run_id)
}

// ── Overview ──

pub struct OverviewRow {
    pub dispensary: String,
    pub name: String,
    pub category: String,
    pub brand: String,
    pub strain_type: String,
    pub thc_percent: String,
    pub price: Option<f64>,
    pub stock_status: String,
}

/// Products from each dispensary's most recent run that stored any.
pub fn fetch_overview(
    conn: &Connection,
    dispensary: Option<&str>,
    category: Option<&str>,
    limit: usize,
) -> Result<Vec<OverviewRow>> {
    let mut conditions =
        vec!["run_id IN (SELECT MAX(run_id) FROM products GROUP BY dispensary)".to_string()];
    let mut params: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();

    if let Some(d) = dispensary {
        conditions.push(format!("dispensary = ?{}", params.len() + 1));
        params.push(Box::new(d.to_string()));
    }
    if let Some(c) = category {
        conditions.push(format!("category = ?{}", params.len() + 1));
        params.push(Box::new(c.to_string()));
    }

    let sql = format!(
        "SELECT dispensary, product_name, category, COALESCE(brand,''),
                COALESCE(strain_type,''), COALESCE(thc_percent,''), price, stock_status
         FROM products
         WHERE {}
         ORDER BY dispensary, category, product_name
         LIMIT {}",
        conditions.join(" AND "),
        limit
    );

    let mut stmt = conn.prepare(&sql)?;
    let param_refs: Vec<&dyn rusqlite::types::ToSql> = params.iter().map(|p| p.as_ref()).collect();
    let rows = stmt
        .query_map(param_refs.as_slice(), |row| {
            Ok(OverviewRow {
                dispensary: row.get(0)?,
                name: row.get(1)?,
                category: row.get(2)?,
                brand: row.get(3)?,
                strain_type: row.get(4)?,
                thc_percent: row.get(5)?,
                price: row.get(6)?,
                stock_status: row.get(7)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

// ── Stats ──

pub struct Stats {
    pub runs: usize,
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
    pub dispensaries: usize,
    pub products: usize,
    pub failed_entries: usize,
    pub last_run: Option<String>,
}

pub fn get_stats(conn: &Connection) -> Result<Stats> {
    let count_status = |status: RunStatus| -> rusqlite::Result<usize> {
        conn.query_row(
            "SELECT COUNT(*) FROM runs WHERE status = ?1",
            [status.as_str()],
            |r| r.get(0),
        )
    };
    let runs: usize = conn.query_row("SELECT COUNT(*) FROM runs", [], |r| r.get(0))?;
    let dispensaries: usize =
        conn.query_row("SELECT COUNT(DISTINCT dispensary) FROM runs", [], |r| r.get(0))?;
    let products: usize = conn.query_row("SELECT COUNT(*) FROM products", [], |r| r.get(0))?;
    let failed_entries: usize =
        conn.query_row("SELECT COALESCE(SUM(failed), 0) FROM runs", [], |r| r.get(0))?;
    let last_run: Option<String> =
        conn.query_row("SELECT MAX(started_at) FROM runs", [], |r| r.get(0))?;
    Ok(Stats {
        runs,
        completed: count_status(RunStatus::Completed)?,
        failed: count_status(RunStatus::Failed)?,
        cancelled: count_status(RunStatus::Cancelled)?,
        dispensaries,
        products,
        failed_entries,
        last_run,
    })
}
