//! SQLite-backed document store for thoughts.

use chrono::DateTime;
use happy_thoughts_types::*;
use rusqlite::Result as SqliteResult;
use rusqlite::types::Type;
use std::sync::{Mutex, MutexGuard};

pub struct Db {
    conn: Mutex<rusqlite::Connection>,
}

impl Db {
    pub fn open(path: &str) -> SqliteResult<Self> {
        let conn = if path == ":memory:" {
            rusqlite::Connection::open_in_memory()?
        } else {
            rusqlite::Connection::open(path)?
        };
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        create_tables(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, rusqlite::Connection>, String> {
        self.conn
            .lock()
            .map_err(|e| format!("Database lock poisoned: {}", e))
    }

    /// Inserts a validated thought under a freshly generated id.
    pub fn create_thought(&self, new: &NewThought) -> Result<Thought, String> {
        let conn = self.conn()?;
        let id = ThoughtId::generate();
        conn.execute(
            "INSERT INTO thoughts (id, message, hearts, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![
                id.to_hex(),
                new.message(),
                new.hearts(),
                new.created_at().timestamp_millis()
            ],
        )
        .map_err(|e| format!("Failed to insert thought: {}", e))?;

        Ok(Thought {
            id,
            message: new.message().to_string(),
            hearts: new.hearts(),
            created_at: new.created_at(),
        })
    }

    /// Newest thoughts first, at most `limit` of them.
    pub fn list_recent(&self, limit: usize) -> Result<Vec<Thought>, String> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT id, message, hearts, created_at
                 FROM thoughts
                 ORDER BY created_at DESC, seq DESC
                 LIMIT ?1",
            )
            .map_err(|e| format!("Failed to prepare query: {}", e))?;

        let thoughts = stmt
            .query_map(rusqlite::params![limit as i64], row_to_thought)
            .map_err(|e| format!("Failed to query: {}", e))?
            .collect::<SqliteResult<Vec<_>>>()
            .map_err(|e| format!("Failed to read thought: {}", e))?;
        Ok(thoughts)
    }

    /// Adds one heart and returns the updated thought, or `None` when the
    /// id is unknown. Increment and read-back are a single statement.
    ///
    /// A thought already at `i64::MAX` hearts is left untouched and reported
    /// as an error; SQLite would otherwise store the overflow as REAL.
    pub fn like_thought(&self, id: &ThoughtId) -> Result<Option<Thought>, String> {
        let conn = self.conn()?;
        let result = conn.query_row(
            "UPDATE thoughts
             SET hearts = hearts + 1
             WHERE id = ?1 AND hearts < ?2
             RETURNING id, message, hearts, created_at",
            rusqlite::params![id.to_hex(), i64::MAX],
            row_to_thought,
        );
        match result {
            Ok(thought) => Ok(Some(thought)),
            Err(rusqlite::Error::QueryReturnedNoRows) => {
                let exists: bool = conn
                    .query_row(
                        "SELECT EXISTS(SELECT 1 FROM thoughts WHERE id = ?1)",
                        rusqlite::params![id.to_hex()],
                        |r| r.get(0),
                    )
                    .map_err(|e| format!("Failed to look up thought: {}", e))?;
                if exists {
                    Err(format!("Thought {} is at the maximum heart count", id))
                } else {
                    Ok(None)
                }
            }
            Err(e) => Err(format!("Failed to like thought: {}", e)),
        }
    }

    pub fn count_thoughts(&self) -> Result<i64, String> {
        let conn = self.conn()?;
        conn.query_row("SELECT COUNT(*) FROM thoughts", [], |r| r.get(0))
            .map_err(|e| format!("Failed to count thoughts: {}", e))
    }

    /// Runs raw SQL against the store, for tests that need a broken table.
    #[cfg(test)]
    pub fn execute_batch(&self, sql: &str) -> Result<(), String> {
        self.conn()?
            .execute_batch(sql)
            .map_err(|e| format!("Failed to execute batch: {}", e))
    }
}

fn create_tables(conn: &rusqlite::Connection) -> SqliteResult<()> {
    // message bounds are enforced by CreateThoughtRequest::validate
    conn.execute(
        "CREATE TABLE IF NOT EXISTS thoughts (
            seq INTEGER PRIMARY KEY AUTOINCREMENT,
            id TEXT NOT NULL UNIQUE,
            message TEXT NOT NULL,
            hearts INTEGER NOT NULL DEFAULT 0,
            created_at INTEGER NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_thoughts_created_at
         ON thoughts(created_at DESC)",
        [],
    )?;
    Ok(())
}

fn row_to_thought(row: &rusqlite::Row) -> rusqlite::Result<Thought> {
    let raw_id: String = row.get(0)?;
    let id = ThoughtId::parse(&raw_id).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            0,
            Type::Text,
            format!("invalid thought id: {}", raw_id).into(),
        )
    })?;
    let millis: i64 = row.get(3)?;
    let created_at = DateTime::from_timestamp_millis(millis).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            3,
            Type::Integer,
            format!("timestamp out of range: {}", millis).into(),
        )
    })?;
    Ok(Thought {
        id,
        message: row.get(1)?,
        hearts: row.get(2)?,
        created_at,
    })
}
