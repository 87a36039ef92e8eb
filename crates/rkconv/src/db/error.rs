use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Cannot create journal directory '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Journal migration {version} failed: {reason}")]
    Migration { version: u32, reason: String },

    /// A stored job state could not be encoded or decoded.
    #[error("Invalid stored job state: {0}")]
    Serialization(#[from] serde_json::Error),
}
