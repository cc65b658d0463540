//! Query history kept in a local SQLite database.
//!
//! Writes go through [`HistoryWriter`], which owns the connection on a
//! background thread so the caller never waits on disk. Records are
//! append-only; there is no update or delete path.

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection};
use shared::{HistoryRecord, HistorySink};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread;
use std::time::Duration;

/// How long shutdown waits for queued writes by default.
pub const DEFAULT_FLUSH_GRACE: Duration = Duration::from_secs(2);

pub struct HistoryStore {
    conn: Connection,
    db_path: PathBuf,
}

impl HistoryStore {
    /// Open (or create) the database at `db_path`.
    pub fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create directory {:?}", parent))?;
            }
        }

        let conn = Connection::open(db_path)
            .with_context(|| format!("Failed to open database {:?}", db_path))?;
        Self::init_schema(&conn)?;

        Ok(Self {
            conn,
            db_path: db_path.to_path_buf(),
        })
    }

    fn init_schema(conn: &Connection) -> Result<()> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS command_history (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                input TEXT NOT NULL,
                response TEXT NOT NULL,
                timestamp DATETIME DEFAULT CURRENT_TIMESTAMP
            )",
            [],
        )
        .context("Failed to create table")?;
        Ok(())
    }

    pub fn append(&self, input: &str, response: &str) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO command_history (input, response) VALUES (?1, ?2)",
                params![input, response],
            )
            .context("Failed to store command")?;
        Ok(())
    }

    pub fn count(&self) -> Result<usize> {
        let n: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM command_history", [], |row| row.get(0))?;
        Ok(n as usize)
    }

    /// Most recent `limit` records, oldest first.
    pub fn recent(&self, limit: usize) -> Result<Vec<HistoryRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, input, response, timestamp FROM (
                SELECT id, input, response, timestamp FROM command_history
                ORDER BY id DESC LIMIT ?1
             ) ORDER BY id ASC",
        )?;
        let records = stmt
            .query_map(params![limit as i64], |row| {
                let stamp: String = row.get(3)?;
                Ok(HistoryRecord {
                    id: row.get(0)?,
                    input: row.get(1)?,
                    response: row.get(2)?,
                    timestamp: parse_timestamp(&stamp),
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(records)
    }

    pub fn path(&self) -> &Path {
        &self.db_path
    }
}

/// SQLite `CURRENT_TIMESTAMP` is UTC in `YYYY-MM-DD HH:MM:SS` form.
fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
        .map(|naive| naive.and_utc())
        .unwrap_or_else(|_| Utc::now())
}

struct Entry {
    input: String,
    response: String,
}

/// Fire-and-forget front end for [`HistoryStore`].
pub struct HistoryWriter {
    tx: Mutex<Option<Sender<Entry>>>,
    done: Mutex<Option<Receiver<()>>>,
}

impl HistoryWriter {
    /// Move the store onto a background thread and start accepting records.
    pub fn spawn(store: HistoryStore) -> Self {
        let (tx, rx) = mpsc::channel::<Entry>();
        let (done_tx, done_rx) = mpsc::channel();

        thread::Builder::new()
            .name("history-writer".into())
            .spawn(move || {
                for entry in rx {
                    if let Err(e) = store.append(&entry.input, &entry.response) {
                        tracing::warn!("History write failed: {:#}", e);
                    }
                }
                let _ = done_tx.send(());
            })
            .map(|_| ())
            .unwrap_or_else(|e| tracing::warn!("Could not start history writer: {}", e));

        Self {
            tx: Mutex::new(Some(tx)),
            done: Mutex::new(Some(done_rx)),
        }
    }

    /// Stop accepting records and wait up to `grace` for the queue to drain.
    /// Returns false if the grace period ran out first.
    pub fn shutdown(&self, grace: Duration) -> bool {
        self.tx.lock().take();
        let Some(done) = self.done.lock().take() else {
            return true;
        };
        match done.recv_timeout(grace) {
            Ok(()) => true,
            // The thread never started or already went away.
            Err(RecvTimeoutError::Disconnected) => true,
            Err(RecvTimeoutError::Timeout) => {
                tracing::warn!("History writes still pending after {:?}", grace);
                false
            }
        }
    }
}

impl HistorySink for HistoryWriter {
    fn record(&self, input: &str, response: &str) {
        let guard = self.tx.lock();
        let Some(tx) = guard.as_ref() else {
            tracing::debug!("History writer already shut down, dropping record");
            return;
        };
        let entry = Entry {
            input: input.to_string(),
            response: response.to_string(),
        };
        if tx.send(entry).is_err() {
            tracing::warn!("History writer is gone, dropping record");
        }
    }
}

impl Drop for HistoryWriter {
    fn drop(&mut self) {
        self.shutdown(DEFAULT_FLUSH_GRACE);
    }
}
