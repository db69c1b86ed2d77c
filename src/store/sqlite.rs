//! SQLite-backed store: one table per stream.

use super::{stream_table_name, validate_stream_name, Store};
use crate::error::Result;
use crate::types::{Message, MessageInput, Timestamp};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OpenFlags};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

/// DSN selecting a private in-memory database.
pub const MEMORY_DSN: &str = ":memory:";

/// How long a statement waits on a locked database file.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// SQLite-backed store.
///
/// Each stream lives in its own `tablebus_stream_<name>` table whose
/// `AUTOINCREMENT` key supplies message IDs, so IDs are never reused even
/// after reclamation empties a table. Stream names are also recorded in a
/// registry table so they can be enumerated after a restart.
pub struct SqliteStore {
    dsn: String,
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open a store from a DSN: `:memory:`, a `file:` URI, or a filesystem path.
    pub fn open(dsn: &str) -> Result<Self> {
        let conn = if dsn == MEMORY_DSN {
            Connection::open_in_memory()?
        } else if dsn.starts_with("file:") {
            Connection::open_with_flags(
                dsn,
                OpenFlags::SQLITE_OPEN_READ_WRITE
                    | OpenFlags::SQLITE_OPEN_CREATE
                    | OpenFlags::SQLITE_OPEN_URI,
            )?
        } else {
            if let Some(parent) = Path::new(dsn).parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)?;
                }
            }
            Connection::open(dsn)?
        };

        Self::configure_connection(&conn, dsn)?;
        Self::init_schema(&conn)?;
        info!(dsn = %dsn, "opened sqlite store");

        Ok(Self {
            dsn: dsn.to_string(),
            conn: Mutex::new(conn),
        })
    }

    /// The DSN this store was opened with.
    pub fn dsn(&self) -> &str {
        &self.dsn
    }

    fn configure_connection(conn: &Connection, dsn: &str) -> Result<()> {
        conn.busy_timeout(BUSY_TIMEOUT)?;
        if dsn != MEMORY_DSN {
            let _mode: String =
                conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
            conn.pragma_update(None, "synchronous", "NORMAL")?;
        }
        Ok(())
    }

    fn init_schema(conn: &Connection) -> Result<()> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS tablebus_streams (
                name TEXT PRIMARY KEY,
                table_name TEXT NOT NULL,
                created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
            )",
            [],
        )?;
        Ok(())
    }
}

impl Store for SqliteStore {
    fn create_stream(&self, stream: &str) -> Result<()> {
        validate_stream_name(stream)?;
        let table = stream_table_name(stream);

        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        tx.execute(
            &format!(
                "CREATE TABLE IF NOT EXISTS \"{table}\" (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    ts INTEGER NOT NULL,
                    created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
                    data BLOB
                )"
            ),
            [],
        )?;
        tx.execute(
            &format!("CREATE INDEX IF NOT EXISTS \"{table}_ts\" ON \"{table}\" (ts)"),
            [],
        )?;
        tx.execute(
            "INSERT OR IGNORE INTO tablebus_streams (name, table_name) VALUES (?1, ?2)",
            params![stream, table],
        )?;
        tx.commit()?;
        Ok(())
    }

    fn stream_exists(&self, stream: &str) -> Result<bool> {
        let conn = self.conn.lock();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM tablebus_streams WHERE name = ?1",
            params![stream],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    fn list_streams(&self) -> Result<Vec<String>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT name FROM tablebus_streams ORDER BY name")?;
        let names = stmt
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(names)
    }

    fn put_messages(&self, stream: &str, batch: &[MessageInput]) -> Result<Vec<Message>> {
        let table = stream_table_name(stream);
        let sql = format!("INSERT INTO \"{table}\" (ts, data) VALUES (?1, ?2)");

        let mut conn = self.conn.lock();
        // Dropping the transaction without commit rolls the whole batch back.
        let tx = conn.transaction()?;
        let mut written = Vec::with_capacity(batch.len());
        {
            let mut stmt = tx.prepare_cached(&sql)?;
            for input in batch {
                let ts = input.ts.unwrap_or_else(Timestamp::now);
                stmt.execute(params![ts.0, input.data])?;
                written.push(Message {
                    id: tx.last_insert_rowid(),
                    ts,
                    data: input.data.clone(),
                });
            }
        }
        tx.commit()?;
        debug!(stream = %stream, count = written.len(), "committed batch");
        Ok(written)
    }

    fn fetch_messages(
        &self,
        stream: &str,
        after: i64,
        limit: usize,
    ) -> Result<(Vec<Message>, i64)> {
        let table = stream_table_name(stream);
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT id, ts, data FROM \"{table}\" WHERE id > ?1 ORDER BY id LIMIT ?2"
        ))?;
        let messages = stmt
            .query_map(params![after, limit as i64], |row| {
                Ok(Message {
                    id: row.get(0)?,
                    ts: Timestamp(row.get(1)?),
                    data: row.get::<_, Option<Vec<u8>>>(2)?.unwrap_or_default(),
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        let max = messages.last().map(|m| m.id).unwrap_or(0);
        Ok((messages, max))
    }

    fn min_max_id(&self, stream: &str) -> Result<(i64, i64)> {
        let table = stream_table_name(stream);
        let conn = self.conn.lock();
        let bounds = conn.query_row(
            &format!("SELECT IFNULL(MIN(id), 0), IFNULL(MAX(id), 0) FROM \"{table}\""),
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        Ok(bounds)
    }

    fn newest_window_start(&self, stream: &str, count: usize) -> Result<Option<i64>> {
        if count == 0 {
            return Ok(None);
        }
        let table = stream_table_name(stream);
        let conn = self.conn.lock();
        let start = conn.query_row(
            &format!(
                "SELECT MIN(t.id) FROM (
                    SELECT id FROM \"{table}\" ORDER BY id DESC LIMIT ?1
                ) AS t"
            ),
            params![count as i64],
            |row| row.get::<_, Option<i64>>(0),
        )?;
        Ok(start)
    }

    fn delete_before(&self, stream: &str, boundary: i64, limit: usize) -> Result<usize> {
        let table = stream_table_name(stream);
        let conn = self.conn.lock();
        let deleted = conn.execute(
            &format!(
                "DELETE FROM \"{table}\" WHERE id IN (
                    SELECT id FROM \"{table}\" WHERE id < ?1 ORDER BY id LIMIT ?2
                )"
            ),
            params![boundary, limit as i64],
        )?;
        Ok(deleted)
    }
}
