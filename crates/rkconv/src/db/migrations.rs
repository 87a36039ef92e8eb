//! Ordered schema changes. Applied versions are recorded in
//! `schema_migrations`; each pending step runs in its own transaction.

use log::info;
use rusqlite::{params, Connection};

use super::error::DatabaseError;

struct Step {
    version: u32,
    name: &'static str,
    sql: &'static str,
}

const STEPS: &[Step] = &[Step {
    version: 1,
    name: "create_jobs",
    sql: include_str!("sql/001_create_jobs.sql"),
}];

const CREATE_LEDGER: &str = "CREATE TABLE IF NOT EXISTS schema_migrations (
    version    INTEGER PRIMARY KEY,
    name       TEXT NOT NULL,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
)";

/// Highest applied version, 0 for a fresh database.
pub fn current_version(conn: &Connection) -> Result<u32, DatabaseError> {
    conn.execute_batch(CREATE_LEDGER)?;
    let version = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
        [],
        |row| row.get(0),
    )?;
    Ok(version)
}

/// Applies every step newer than the recorded version. Returns how many ran.
pub fn apply_pending(conn: &mut Connection) -> Result<usize, DatabaseError> {
    let from = current_version(conn)?;
    let mut applied = 0;

    for step in STEPS.iter().filter(|step| step.version > from) {
        let failed = |e: rusqlite::Error| DatabaseError::Migration {
            version: step.version,
            reason: e.to_string(),
        };

        let tx = conn.transaction()?;
        tx.execute_batch(step.sql).map_err(failed)?;
        tx.execute(
            "INSERT INTO schema_migrations (version, name) VALUES (?1, ?2)",
            params![step.version, step.name],
        )?;
        tx.commit().map_err(failed)?;

        info!("Applied journal migration {} ({})", step.version, step.name);
        applied += 1;
    }
    Ok(applied)
}
