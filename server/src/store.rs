use crate::db::DbPool;
use rusqlite::params;
use semchat_protocol::{ChatMessage, SemesterId, UserRef};
use std::time::Duration;
use time::OffsetDateTime;

/// Upper bound on a single history page.
const MAX_PAGE_SIZE: usize = 200;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Pool exhausted, database gone or the write itself failed. A message
    /// is either fully persisted with an id, or not persisted at all.
    #[error("store unavailable: {0}")]
    Unavailable(String),
    /// The bounded persistence window elapsed.
    #[error("store timed out")]
    Timeout,
}

/// Append-only message persistence, one row per chat message, partitioned
/// by semester. No update or delete paths exist.
#[derive(Clone)]
pub struct MessageStore {
    pool: DbPool,
    timeout: Duration,
}

impl MessageStore {
    pub fn new(pool: DbPool, timeout: Duration) -> Self {
        Self { pool, timeout }
    }

    /// Persist a new message, assigning its id and timestamp.
    pub async fn append(
        &self,
        semester: SemesterId,
        sender: UserRef,
        text: String,
        temp_id: Option<String>,
    ) -> Result<ChatMessage, StoreError> {
        let pool = self.pool.clone();
        let task = tokio::task::spawn_blocking(move || {
            append_blocking(&pool, semester, sender, text, temp_id)
        });
        match tokio::time::timeout(self.timeout, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join)) => Err(StoreError::Unavailable(join.to_string())),
            Err(_) => Err(StoreError::Timeout),
        }
    }

    /// One page of a room's history, newest first. Page 0 is always the
    /// live tail of the conversation; page N is the N-th older batch.
    pub async fn list_recent(
        &self,
        semester: SemesterId,
        page: usize,
        page_size: usize,
    ) -> Result<Vec<ChatMessage>, StoreError> {
        let pool = self.pool.clone();
        let task =
            tokio::task::spawn_blocking(move || list_blocking(&pool, semester, page, page_size));
        match tokio::time::timeout(self.timeout, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join)) => Err(StoreError::Unavailable(join.to_string())),
            Err(_) => Err(StoreError::Timeout),
        }
    }
}

fn append_blocking(
    pool: &DbPool,
    semester: SemesterId,
    sender: UserRef,
    text: String,
    temp_id: Option<String>,
) -> Result<ChatMessage, StoreError> {
    let conn = pool
        .get()
        .map_err(|e| StoreError::Unavailable(e.to_string()))?;
    let created_at = OffsetDateTime::now_utc().unix_timestamp();
    conn.execute(
        "INSERT INTO messages (semester_id, sender_id, sender_name, text, temp_id, created_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![semester.0, sender.id, sender.name, text, temp_id, created_at],
    )
    .map_err(|e| StoreError::Unavailable(e.to_string()))?;
    let id = conn.last_insert_rowid();
    Ok(ChatMessage {
        id,
        semester_id: semester.0,
        sender,
        text,
        temp_id,
        created_at,
    })
}

fn list_blocking(
    pool: &DbPool,
    semester: SemesterId,
    page: usize,
    page_size: usize,
) -> Result<Vec<ChatMessage>, StoreError> {
    let conn = pool
        .get()
        .map_err(|e| StoreError::Unavailable(e.to_string()))?;
    let limit = page_size.min(MAX_PAGE_SIZE);
    let offset = page.saturating_mul(limit);
    let mut stmt = conn
        .prepare(
            "SELECT id, sender_id, sender_name, text, temp_id, created_at FROM messages \
             WHERE semester_id = ?1 ORDER BY created_at DESC, id DESC LIMIT ?2 OFFSET ?3",
        )
        .map_err(|e| StoreError::Unavailable(e.to_string()))?;
    let rows = stmt
        .query_map(params![semester.0, limit as i64, offset as i64], |row| {
            Ok(ChatMessage {
                id: row.get(0)?,
                semester_id: semester.0,
                sender: UserRef {
                    id: row.get(1)?,
                    name: row.get(2)?,
                },
                text: row.get(3)?,
                temp_id: row.get(4)?,
                created_at: row.get(5)?,
            })
        })
        .map_err(|e| StoreError::Unavailable(e.to_string()))?;
    let mut messages = Vec::new();
    for row in rows {
        messages.push(row.map_err(|e| StoreError::Unavailable(e.to_string()))?);
    }
    Ok(messages)
}
