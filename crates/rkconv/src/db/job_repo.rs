//! Terminal job states stored in the `jobs` table.
//!
//! The scalar columns exist for querying; `state_json` is the source of
//! truth when a row is turned back into a [`JobState`].

use chrono::Utc;
use rusqlite::{params, Row};

use super::{Database, DatabaseError};
use crate::job::{JobState, JobStatus};

const COLUMNS: &str = "id, model_name, model_kind, status, priority, progress, error, \
     result_path, created_at, started_at, completed_at, state_json, updated_at";

#[derive(Debug, Clone)]
pub struct JobRow {
    pub id: String,
    pub model_name: String,
    pub model_kind: Option<String>,
    pub status: String,
    pub priority: i64,
    pub progress: i64,
    pub error: Option<String>,
    pub result_path: Option<String>,
    pub created_at: String,
    pub started_at: Option<String>,
    pub completed_at: Option<String>,
    pub state_json: String,
    pub updated_at: String,
}

impl JobRow {
    /// Reads a row selected with [`COLUMNS`], in that order.
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            model_name: row.get(1)?,
            model_kind: row.get(2)?,
            status: row.get(3)?,
            priority: row.get(4)?,
            progress: row.get(5)?,
            error: row.get(6)?,
            result_path: row.get(7)?,
            created_at: row.get(8)?,
            started_at: row.get(9)?,
            completed_at: row.get(10)?,
            state_json: row.get(11)?,
            updated_at: row.get(12)?,
        })
    }

    pub fn from_state(state: &JobState) -> Result<Self, DatabaseError> {
        let rfc3339 = |t: &chrono::DateTime<Utc>| t.to_rfc3339();
        Ok(Self {
            id: state.id().to_owned(),
            model_name: state.job.model_name.clone(),
            model_kind: state.job.model_kind.map(|kind| kind.as_str().to_owned()),
            status: state.status.as_str().to_owned(),
            priority: state.job.priority.into(),
            progress: state.progress.into(),
            error: state.error_message.clone(),
            result_path: state
                .result_path
                .as_deref()
                .map(|path| path.display().to_string()),
            created_at: rfc3339(&state.created_at),
            started_at: state.started_at.as_ref().map(rfc3339),
            completed_at: state.completed_at.as_ref().map(rfc3339),
            state_json: serde_json::to_string(state)?,
            updated_at: rfc3339(&Utc::now()),
        })
    }

    /// Decodes `state_json`. Restored states are always historical.
    pub fn to_state(&self) -> Result<JobState, DatabaseError> {
        let mut state: JobState = serde_json::from_str(&self.state_json)?;
        state.is_historical = true;
        Ok(state)
    }
}

/// Writes `row`, overwriting whatever was stored under the same id.
pub fn upsert(db: &Database, row: &JobRow) -> Result<(), DatabaseError> {
    let sql = format!(
        "INSERT OR REPLACE INTO jobs ({COLUMNS}) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)"
    );
    db.with_conn(|conn| {
        conn.execute(
            &sql,
            params![
                row.id,
                row.model_name,
                row.model_kind,
                row.status,
                row.priority,
                row.progress,
                row.error,
                row.result_path,
                row.created_at,
                row.started_at,
                row.completed_at,
                row.state_json,
                row.updated_at,
            ],
        )?;
        Ok(())
    })
}

pub fn record_state(db: &Database, state: &JobState) -> Result<(), DatabaseError> {
    upsert(db, &JobRow::from_state(state)?)
}

/// Completed, failed and cancelled rows in creation order.
pub fn list_terminal(db: &Database) -> Result<Vec<JobRow>, DatabaseError> {
    let sql = format!(
        "SELECT {COLUMNS} FROM jobs WHERE status IN (?1, ?2, ?3) ORDER BY created_at"
    );
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(&sql)?;
        let terminal = [JobStatus::Completed, JobStatus::Failed, JobStatus::Cancelled];
        let rows = stmt
            .query_map(
                params![terminal[0].as_str(), terminal[1].as_str(), terminal[2].as_str()],
                JobRow::read,
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    })
}

pub fn count_by_status(db: &Database, status: JobStatus) -> Result<u64, DatabaseError> {
    db.with_conn(|conn| {
        let count = conn.query_row(
            "SELECT COUNT(*) FROM jobs WHERE status = ?1",
            [status.as_str()],
            |row| row.get::<_, i64>(0),
        )?;
        Ok(count.max(0) as u64)
    })
}
