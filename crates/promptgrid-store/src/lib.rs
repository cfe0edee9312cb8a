use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use promptgrid_types::EvaluationResult;

/// SQLite history of evaluation runs. The most recent run is the "latest results".
#[derive(Debug, Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredRun {
    pub id: i64,
    pub created_at: DateTime<Utc>,
    pub description: Option<String>,
    pub result: EvaluationResult,
}

impl Store {
    /// Open a store at the given path (e.g., ".promptgrid/results.db")
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_URI,
        )?;

        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };

        store.init_schema()?;
        Ok(store)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("store connection lock poisoned"))
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.lock()?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS runs (
                id INTEGER PRIMARY KEY,
                created_at TEXT NOT NULL,
                description TEXT,
                stats TEXT NOT NULL,
                result TEXT NOT NULL
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS cells (
                id INTEGER PRIMARY KEY,
                run_id INTEGER NOT NULL,
                test_index INTEGER NOT NULL,
                provider_id TEXT NOT NULL,
                prompt TEXT NOT NULL,
                output TEXT,
                error TEXT,
                success BOOLEAN NOT NULL,
                tokens_total INTEGER,
                FOREIGN KEY(run_id) REFERENCES runs(id)
            )",
            [],
        )?;

        Ok(())
    }

    /// Save a full evaluation result as a new run and return its id.
    pub fn save_run(&self, description: Option<&str>, result: &EvaluationResult) -> Result<i64> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        tx.execute(
            "INSERT INTO runs (created_at, description, stats, result) VALUES (?1, ?2, ?3, ?4)",
            params![
                Utc::now().to_rfc3339(),
                description,
                serde_json::to_string(&result.stats)?,
                serde_json::to_string(result)?,
            ],
        )?;
        let run_id = tx.last_insert_rowid();

        for cell in &result.results {
            tx.execute(
                "INSERT INTO cells (run_id, test_index, provider_id, prompt, output, error, success, tokens_total)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    run_id,
                    cell.test_index as i64,
                    cell.provider_id,
                    cell.prompt.raw,
                    cell.response.output_text(),
                    cell.response.error_text(),
                    cell.success,
                    cell.response.token_usage().map(|u| u.total as i64),
                ],
            )?;
        }

        tx.commit()?;
        Ok(run_id)
    }

    /// The most recently saved run, if any.
    pub fn latest_run(&self) -> Result<Option<StoredRun>> {
        let conn = self.lock()?;
        let row = conn
            .query_row(
                "SELECT id, created_at, description, result FROM runs ORDER BY id DESC LIMIT 1",
                [],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, Option<String>>(2)?,
                        row.get::<_, String>(3)?,
                    ))
                },
            )
            .optional()?;

        let Some((id, created_at, description, result)) = row else {
            return Ok(None);
        };

        Ok(Some(StoredRun {
            id,
            created_at: DateTime::parse_from_rfc3339(&created_at)?.with_timezone(&Utc),
            description,
            result: serde_json::from_str(&result)?,
        }))
    }
}
