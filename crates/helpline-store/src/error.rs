use thiserror::Error;

/// Everything that can go wrong inside the ticket store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The row a caller asked for is not in the database. Maps to a 404 at
    /// the API layer.
    #[error("Record not found")]
    NotFound,

    /// Error reported by SQLite itself.
    #[error("SQLite failure: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// The attachments column held something other than valid JSON.
    #[error("Corrupt stored JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// A schema migration did not apply cleanly.
    #[error("Migration failed: {0}")]
    Migration(String),

    /// No platform data directory to put the database file in.
    #[error("Could not determine application data directory")]
    NoDataDir,

    /// Filesystem trouble while preparing the database location.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Shorthand used by every store operation.
pub type Result<T> = std::result::Result<T, StoreError>;
