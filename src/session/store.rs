//! Durable transcript storage.
//!
//! One SQLite database holds every session and its append-only message
//! log. The database is opened once per process and guarded by a mutex;
//! write-ahead logging keeps appends cheap and crash-safe. Deleting a
//! session cascades to its messages.

use rusqlite::{params, Connection};
use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;

use crate::config::config_dir;
use crate::error::{MmcodeError, Result};
use crate::models::{Message, ToolCall};

pub const DEFAULT_SESSION_NAME: &str = "New Session";

const TITLE_CAP: usize = 50;

#[derive(Debug, Clone)]
pub struct Session {
    pub id: String,
    pub name: String,
    pub model: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone)]
pub struct StoredMessage {
    pub id: i64,
    pub session_id: String,
    pub role: String,
    pub content: String,
    pub tool_calls: Option<String>,
    pub tool_call_id: Option<String>,
    pub name: Option<String>,
    pub created_at: String,
}

impl StoredMessage {
    /// Rebuild the wire message this row was persisted from. Tool-call
    /// JSON that no longer parses is dropped rather than sent broken.
    pub fn to_message(&self) -> Message {
        let tool_calls = self
            .tool_calls
            .as_deref()
            .and_then(|raw| serde_json::from_str::<Vec<ToolCall>>(raw).ok())
            .filter(|calls| !calls.is_empty());
        Message {
            role: self.role.clone(),
            content: Some(self.content.clone()),
            reasoning_details: None,
            tool_calls,
            tool_call_id: self.tool_call_id.clone(),
            name: self.name.clone(),
        }
    }
}

pub struct SessionStore {
    conn: Mutex<Connection>,
}

impl SessionStore {
    /// Open (or create) the sessions database under ~/.mmcode.
    pub fn open() -> Result<Self> {
        let dir = config_dir();
        if !dir.exists() {
            fs::create_dir_all(&dir)?;
        }
        Self::open_at(dir.join("sessions.db"))
    }

    /// Open the database at a specific path (used by tests).
    pub fn open_at(path: PathBuf) -> Result<Self> {
        let conn = Connection::open(path)?;
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn init_schema(conn: &Connection) -> Result<()> {
        conn.execute_batch("PRAGMA journal_mode = WAL; PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS sessions (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                model TEXT NOT NULL,
                created_at TEXT NOT NULL DEFAULT (datetime('now')),
                updated_at TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE TABLE IF NOT EXISTS messages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                session_id TEXT NOT NULL,
                role TEXT NOT NULL,
                content TEXT NOT NULL DEFAULT '',
                tool_calls TEXT,
                tool_call_id TEXT,
                name TEXT,
                created_at TEXT NOT NULL DEFAULT (datetime('now')),
                FOREIGN KEY (session_id) REFERENCES sessions(id) ON DELETE CASCADE
            );",
        )?;
        Ok(())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| MmcodeError::SessionError(format!("store lock poisoned: {}", e)))
    }

    pub fn create_session(&self, model: &str) -> Result<Session> {
        let conn = self.lock()?;
        let id = uuid::Uuid::new_v4().to_string();
        conn.execute(
            "INSERT INTO sessions (id, name, model) VALUES (?1, ?2, ?3)",
            params![id, DEFAULT_SESSION_NAME, model],
        )?;
        let session = conn.query_row(
            "SELECT id, name, model, created_at, updated_at FROM sessions WHERE id = ?1",
            params![id],
            row_to_session,
        )?;
        Ok(session)
    }

    pub fn get_session(&self, id: &str) -> Result<Option<Session>> {
        let conn = self.lock()?;
        let session = conn
            .query_row(
                "SELECT id, name, model, created_at, updated_at FROM sessions WHERE id = ?1",
                params![id],
                row_to_session,
            )
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(other),
            })?;
        Ok(session)
    }

    pub fn rename_session(&self, id: &str, name: &str) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "UPDATE sessions SET name = ?1, updated_at = datetime('now') WHERE id = ?2",
            params![name, id],
        )?;
        Ok(())
    }

    /// First-message titling: while the session still carries the
    /// synthetic default name, retitle it from the user's first message
    /// (50 chars, newlines collapsed to spaces). Later calls are no-ops,
    /// so the rename happens exactly once per session.
    pub fn maybe_title_session(&self, id: &str, first_message: &str) -> Result<()> {
        let current = match self.get_session(id)? {
            Some(s) => s,
            None => return Ok(()),
        };
        if current.name != DEFAULT_SESSION_NAME {
            return Ok(());
        }
        let title: String = first_message
            .replace('\n', " ")
            .trim()
            .chars()
            .take(TITLE_CAP)
            .collect();
        if title.is_empty() {
            return Ok(());
        }
        self.rename_session(id, &title)
    }

    pub fn list_sessions(&self) -> Result<Vec<Session>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, name, model, created_at, updated_at FROM sessions ORDER BY updated_at DESC",
        )?;
        let sessions = stmt
            .query_map([], row_to_session)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(sessions)
    }

    pub fn delete_session(&self, id: &str) -> Result<()> {
        let conn = self.lock()?;
        conn.execute("DELETE FROM sessions WHERE id = ?1", params![id])?;
        Ok(())
    }

    /// Append one message and touch the session's updated_at.
    /// Returns the new message's row id.
    pub fn save_message(
        &self,
        session_id: &str,
        role: &str,
        content: &str,
        tool_calls: Option<&str>,
        tool_call_id: Option<&str>,
        name: Option<&str>,
    ) -> Result<i64> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO messages (session_id, role, content, tool_calls, tool_call_id, name)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![session_id, role, content, tool_calls, tool_call_id, name],
        )?;
        let row_id = conn.last_insert_rowid();
        conn.execute(
            "UPDATE sessions SET updated_at = datetime('now') WHERE id = ?1",
            params![session_id],
        )?;
        Ok(row_id)
    }

    pub fn session_messages(&self, session_id: &str) -> Result<Vec<StoredMessage>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, session_id, role, content, tool_calls, tool_call_id, name, created_at
             FROM messages WHERE session_id = ?1 ORDER BY id ASC",
        )?;
        let messages = stmt
            .query_map(params![session_id], |row| {
                Ok(StoredMessage {
                    id: row.get(0)?,
                    session_id: row.get(1)?,
                    role: row.get(2)?,
                    content: row.get(3)?,
                    tool_calls: row.get(4)?,
                    tool_call_id: row.get(5)?,
                    name: row.get(6)?,
                    created_at: row.get(7)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(messages)
    }
}

fn row_to_session(row: &rusqlite::Row<'_>) -> rusqlite::Result<Session> {
    Ok(Session {
        id: row.get(0)?,
        name: row.get(1)?,
        model: row.get(2)?,
        created_at: row.get(3)?,
        updated_at: row.get(4)?,
    })
}
