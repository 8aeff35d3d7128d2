use anyhow::Result;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use std::path::Path;

pub type DbPool = Pool<SqliteConnectionManager>;

/// Open the SQLite pool and run the idempotent schema migration.
pub fn init_pool<P: AsRef<Path>>(path: P) -> Result<DbPool> {
    let manager = SqliteConnectionManager::file(path);
    let pool = Pool::new(manager)?;
    pool.get()?.execute_batch(SCHEMA)?;
    Ok(pool)
}

pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS messages (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  semester_id INTEGER NOT NULL,
  sender_id TEXT NOT NULL,
  sender_name TEXT NOT NULL,
  text TEXT NOT NULL,
  temp_id TEXT,
  created_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS messages_by_room
  ON messages (semester_id, created_at DESC, id DESC);
"#;

#[cfg(test)]
pub(crate) fn memory_pool() -> DbPool {
    // A single connection keeps every test statement on the same
    // in-memory database.
    let manager = SqliteConnectionManager::memory();
    let pool = Pool::builder().max_size(1).build(manager).unwrap();
    pool.get().unwrap().execute_batch(SCHEMA).unwrap();
    pool
}
