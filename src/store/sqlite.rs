//! SQLite-backed coordination store
//!
//! A single `kv` table keyed by `(db, field)` backs all of a run's
//! namespaces. The connection sits behind a mutex; operations are short and
//! never block on anything but SQLite itself.

use crate::store::traits::{KvStore, StoreError, StoreResult};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Mutex;

/// SQLite store backend
pub struct SqliteKv {
    conn: Mutex<Connection>,
}

impl SqliteKv {
    /// Opens (or creates) the store at the given path
    pub fn open(path: &Path) -> StoreResult<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
        ",
        )?;
        Self::initialize(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Creates an in-memory store (for testing)
    #[cfg(test)]
    pub fn open_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::initialize(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize(conn: &Connection) -> StoreResult<()> {
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS kv (
                db    TEXT NOT NULL,
                field TEXT NOT NULL,
                value TEXT NOT NULL,
                PRIMARY KEY (db, field)
            ) WITHOUT ROWID;
        ",
        )?;
        Ok(())
    }

    fn lock(&self) -> StoreResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }

    /// Number of fields across all databases (used to decide whether the
    /// backing file can be removed at teardown)
    pub fn total_fields(&self) -> StoreResult<u64> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM kv", [], |row| row.get(0))?;
        Ok(count as u64)
    }
}

impl KvStore for SqliteKv {
    fn hset(&self, db: &str, field: &str, value: &str) -> StoreResult<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT OR REPLACE INTO kv (db, field, value) VALUES (?1, ?2, ?3)",
            params![db, field, value],
        )?;
        Ok(())
    }

    fn hmset(&self, db: &str, entries: &[(String, String)]) -> StoreResult<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        {
            let mut stmt =
                tx.prepare("INSERT OR REPLACE INTO kv (db, field, value) VALUES (?1, ?2, ?3)")?;
            for (field, value) in entries {
                stmt.execute(params![db, field, value])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn hget(&self, db: &str, field: &str) -> StoreResult<Option<String>> {
        let conn = self.lock()?;
        let value = conn
            .query_row(
                "SELECT value FROM kv WHERE db = ?1 AND field = ?2",
                params![db, field],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    fn hkeys(&self, db: &str) -> StoreResult<Vec<String>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT field FROM kv WHERE db = ?1 ORDER BY field")?;
        let keys = stmt
            .query_map(params![db], |row| row.get(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(keys)
    }

    fn hexists(&self, db: &str, field: &str) -> StoreResult<bool> {
        Ok(self.hget(db, field)?.is_some())
    }

    fn hdel(&self, db: &str, field: &str) -> StoreResult<()> {
        let conn = self.lock()?;
        conn.execute(
            "DELETE FROM kv WHERE db = ?1 AND field = ?2",
            params![db, field],
        )?;
        Ok(())
    }

    fn del(&self, dbs: &[String]) -> StoreResult<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare("DELETE FROM kv WHERE db = ?1")?;
            for db in dbs {
                stmt.execute(params![db])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn hset_if_wider(&self, db: &str, field: &str, width: u32) -> StoreResult<bool> {
        let conn = self.lock()?;
        // Single statement, so the check and the write cannot interleave
        // with another worker's.
        let changed = conn.execute(
            "INSERT INTO kv (db, field, value) VALUES (?1, ?2, ?3)
             ON CONFLICT (db, field) DO UPDATE SET value = excluded.value
             WHERE CAST(excluded.value AS INTEGER) > CAST(kv.value AS INTEGER)",
            params![db, field, width.to_string()],
        )?;
        Ok(changed > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hset_hget_roundtrip() {
        let store = SqliteKv::open_in_memory().unwrap();
        store.hset("run_r", "Paris", "Capital_of_France").unwrap();
        assert_eq!(
            store.hget("run_r", "Paris").unwrap(),
            Some("Capital_of_France".to_string())
        );
    }

    #[test]
    fn test_hget_missing() {
        let store = SqliteKv::open_in_memory().unwrap();
        assert_eq!(store.hget("run_r", "absent").unwrap(), None);
    }

    #[test]
    fn test_hset_overwrites() {
        let store = SqliteKv::open_in_memory().unwrap();
        store.hset("run_d", "t", "1").unwrap();
        store.hset("run_d", "t", "2").unwrap();
        assert_eq!(store.hget("run_d", "t").unwrap(), Some("2".to_string()));
    }

    #[test]
    fn test_hmset_and_hkeys() {
        let store = SqliteKv::open_in_memory().unwrap();
        let entries = vec![
            ("b".to_string(), "2".to_string()),
            ("a".to_string(), "1".to_string()),
        ];
        store.hmset("run_d", &entries).unwrap();

        let keys = store.hkeys("run_d").unwrap();
        assert_eq!(keys, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_databases_are_isolated() {
        let store = SqliteKv::open_in_memory().unwrap();
        store.hset("run_r", "k", "redirect").unwrap();
        store.hset("run_m", "k", "120").unwrap();

        assert_eq!(store.hget("run_r", "k").unwrap(), Some("redirect".into()));
        assert_eq!(store.hget("run_m", "k").unwrap(), Some("120".into()));
    }

    #[test]
    fn test_hexists_and_hdel() {
        let store = SqliteKv::open_in_memory().unwrap();
        store.hset("run_c", "img.png", "300").unwrap();
        assert!(store.hexists("run_c", "img.png").unwrap());

        store.hdel("run_c", "img.png").unwrap();
        assert!(!store.hexists("run_c", "img.png").unwrap());
    }

    #[test]
    fn test_del_drops_whole_databases() {
        let store = SqliteKv::open_in_memory().unwrap();
        store.hset("run_r", "a", "1").unwrap();
        store.hset("run_d", "b", "2").unwrap();
        store.hset("other_r", "c", "3").unwrap();

        store
            .del(&["run_r".to_string(), "run_d".to_string()])
            .unwrap();

        assert!(store.hkeys("run_r").unwrap().is_empty());
        assert!(store.hkeys("run_d").unwrap().is_empty());
        assert_eq!(store.hkeys("other_r").unwrap().len(), 1);
    }

    #[test]
    fn test_hset_if_wider_first_write_wins() {
        let store = SqliteKv::open_in_memory().unwrap();
        assert!(store.hset_if_wider("run_m", "img.jpg", 120).unwrap());
        assert_eq!(store.hget("run_m", "img.jpg").unwrap(), Some("120".into()));
    }

    #[test]
    fn test_hset_if_wider_narrower_is_rejected() {
        let store = SqliteKv::open_in_memory().unwrap();
        store.hset_if_wider("run_m", "img.jpg", 300).unwrap();
        assert!(!store.hset_if_wider("run_m", "img.jpg", 120).unwrap());
        assert_eq!(store.hget("run_m", "img.jpg").unwrap(), Some("300".into()));
    }

    #[test]
    fn test_hset_if_wider_upgrade() {
        let store = SqliteKv::open_in_memory().unwrap();
        store.hset_if_wider("run_m", "img.jpg", 120).unwrap();
        assert!(store.hset_if_wider("run_m", "img.jpg", 300).unwrap());
        assert_eq!(store.hget("run_m", "img.jpg").unwrap(), Some("300".into()));
    }

    #[test]
    fn test_total_fields() {
        let store = SqliteKv::open_in_memory().unwrap();
        assert_eq!(store.total_fields().unwrap(), 0);
        store.hset("a", "x", "1").unwrap();
        store.hset("b", "y", "2").unwrap();
        assert_eq!(store.total_fields().unwrap(), 2);
    }
}
