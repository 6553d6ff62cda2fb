//! Store trait and error types

use thiserror::Error;

/// Errors that can occur during coordination store operations
///
/// Every one of these is fatal to the run that observes it.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("store mutex poisoned")]
    Poisoned,
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Hash-of-hashes store interface
///
/// `db` is a namespace (one of the run's [`super::RunDbs`] names), `field`
/// a key within it. Implementations must make each operation atomic, and
/// [`KvStore::hset_if_wider`] atomic as a whole: it is the check-and-set
/// the media pipeline serializes width dedup through.
pub trait KvStore: Send + Sync {
    /// Sets a single field
    fn hset(&self, db: &str, field: &str, value: &str) -> StoreResult<()>;

    /// Sets many fields of one database in a single transaction
    fn hmset(&self, db: &str, entries: &[(String, String)]) -> StoreResult<()>;

    /// Reads a field
    fn hget(&self, db: &str, field: &str) -> StoreResult<Option<String>>;

    /// Lists all fields of a database
    fn hkeys(&self, db: &str) -> StoreResult<Vec<String>>;

    /// Tests whether a field exists
    fn hexists(&self, db: &str, field: &str) -> StoreResult<bool>;

    /// Deletes a field
    fn hdel(&self, db: &str, field: &str) -> StoreResult<()>;

    /// Drops whole databases
    fn del(&self, dbs: &[String]) -> StoreResult<()>;

    /// Stores `width` under `field` iff it exceeds the stored value
    ///
    /// Returns `true` when the write happened (no previous value, or the
    /// new width is strictly greater).
    fn hset_if_wider(&self, db: &str, field: &str, width: u32) -> StoreResult<bool>;
}
