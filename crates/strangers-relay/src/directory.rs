//! User directory: persistent per-user records (push token, presence,
//! current session) keyed by the client's stable user id.
//!
//! The relay only ever touches the directory from blocking tasks spawned
//! off the session path, so a slow disk never delays a chat frame.

use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use rusqlite::{Connection, OptionalExtension, Row, params};
use strangers_core::{SessionId, UserId, UserPatch};
use tracing::info;

use crate::error::Result;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRecord {
    pub user_id: UserId,
    pub push_token: Option<String>,
    pub is_online: bool,
    pub current_session_id: Option<SessionId>,
    /// Milliseconds since the Unix epoch of the last write.
    pub last_seen: i64,
}

pub trait UserDirectory: Send + Sync {
    /// Create or update a record. Fields left `None` in `patch` are kept.
    fn upsert(&self, user: &UserId, patch: &UserPatch) -> Result<()>;

    fn find(&self, user: &UserId) -> Result<Option<UserRecord>>;
}

/// User directory backed by SQLite.
pub struct SqliteDirectory {
    conn: Mutex<Connection>,
}

impl SqliteDirectory {
    /// Open or create the database at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;

        // Enable WAL mode for better concurrent read/write performance.
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS users (
                user_id            TEXT PRIMARY KEY,
                push_token         TEXT,
                is_online          INTEGER NOT NULL DEFAULT 0,
                current_session_id TEXT,
                last_seen          INTEGER NOT NULL
            );",
        )?;

        info!("User directory opened at {}", path.display());
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl UserDirectory for SqliteDirectory {
    fn upsert(&self, user: &UserId, patch: &UserPatch) -> Result<()> {
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as i64;
        let set_session = patch.current_session_id.is_some();
        let session = patch
            .current_session_id
            .as_ref()
            .and_then(|s| s.as_ref())
            .map(SessionId::as_str);

        self.conn().execute(
            "INSERT INTO users (user_id, push_token, is_online, current_session_id, last_seen)
             VALUES (?1, ?2, COALESCE(?3, 0), ?5, ?6)
             ON CONFLICT(user_id) DO UPDATE SET
                push_token = COALESCE(?2, push_token),
                is_online = COALESCE(?3, is_online),
                current_session_id = CASE WHEN ?4 THEN ?5 ELSE current_session_id END,
                last_seen = ?6",
            params![
                user.as_str(),
                patch.push_token.as_deref(),
                patch.is_online,
                set_session,
                session,
                now,
            ],
        )?;
        Ok(())
    }

    fn find(&self, user: &UserId) -> Result<Option<UserRecord>> {
        let record = self
            .conn()
            .query_row(
                "SELECT user_id, push_token, is_online, current_session_id, last_seen
                 FROM users WHERE user_id = ?1",
                params![user.as_str()],
                record_from_row,
            )
            .optional()?;
        Ok(record)
    }
}

fn record_from_row(row: &Row<'_>) -> rusqlite::Result<UserRecord> {
    Ok(UserRecord {
        user_id: UserId::new(row.get::<_, String>(0)?),
        push_token: row.get(1)?,
        is_online: row.get(2)?,
        current_session_id: row.get::<_, Option<String>>(3)?.map(SessionId::new),
        last_seen: row.get(4)?,
    })
}
