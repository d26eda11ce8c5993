//! SQLite persistence for scheduled jobs.
//!
//! One connection in WAL mode, not shared with any other store. Every
//! query runs on the blocking pool so the scheduler loop never stalls
//! the runtime.
//!
//! Table:
//! ```sql
//! jobs(id PK, name UNIQUE, prompt, trigger TEXT, next_run INT,
//!      last_run INT, active INT, use_tools INT, created_at INT)
//! ```

use std::{
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};

use rusqlite::Connection;

use crate::core::ArcError;

use super::job::{Job, Trigger};

pub struct SchedulerStore {
    conn: Arc<Mutex<Option<Connection>>>,
    path: PathBuf,
}

impl SchedulerStore {
    pub fn new(path: &Path) -> Self {
        Self {
            conn: Arc::new(Mutex::new(None)),
            path: path.to_path_buf(),
        }
    }

    /// Open the database, enable WAL, create the schema, and apply the
    /// `use_tools` migration for databases that predate the column.
    pub async fn initialize(&self) -> Result<(), ArcError> {
        let path = self.path.clone();
        let conn_slot = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || -> Result<(), ArcError> {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let conn = Connection::open(&path)?;
            conn.pragma_update(None, "journal_mode", "WAL")?;
            conn.execute(
                "CREATE TABLE IF NOT EXISTS jobs (
                    id         TEXT PRIMARY KEY,
                    name       TEXT UNIQUE NOT NULL,
                    prompt     TEXT NOT NULL,
                    trigger    TEXT NOT NULL,
                    next_run   INTEGER NOT NULL DEFAULT 0,
                    last_run   INTEGER NOT NULL DEFAULT 0,
                    active     INTEGER NOT NULL DEFAULT 1,
                    use_tools  INTEGER NOT NULL DEFAULT 0,
                    created_at INTEGER NOT NULL
                )",
                [],
            )?;
            // Older databases lack use_tools; the error just means the
            // column already exists.
            let _ = conn.execute(
                "ALTER TABLE jobs ADD COLUMN use_tools INTEGER NOT NULL DEFAULT 0",
                [],
            );
            *conn_slot.lock().unwrap_or_else(|e| e.into_inner()) = Some(conn);
            Ok(())
        })
        .await
        .map_err(|e| ArcError::Storage(e.to_string()))?
    }

    // ── CRUD ─────────────────────────────────────────────────────────────────

    /// Insert or update a job.
    pub async fn save(&self, job: &Job) -> Result<(), ArcError> {
        let job = job.clone();
        self.with_conn(move |conn| {
            let trigger = serde_json::to_string(&job.trigger)
                .map_err(|e| ArcError::Storage(e.to_string()))?;
            conn.execute(
                "INSERT INTO jobs (id, name, prompt, trigger, next_run, last_run, active, use_tools, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                 ON CONFLICT(id) DO UPDATE SET
                     name=excluded.name, prompt=excluded.prompt,
                     trigger=excluded.trigger, next_run=excluded.next_run,
                     last_run=excluded.last_run, active=excluded.active,
                     use_tools=excluded.use_tools",
                rusqlite::params![
                    job.id,
                    job.name,
                    job.prompt,
                    trigger,
                    job.next_run,
                    job.last_run,
                    job.active as i64,
                    job.use_tools as i64,
                    job.created_at,
                ],
            )?;
            Ok(())
        })
        .await
    }

    pub async fn get_all(&self, active_only: bool) -> Result<Vec<Job>, ArcError> {
        self.with_conn(move |conn| {
            let sql = if active_only {
                "SELECT * FROM jobs WHERE active=1 ORDER BY created_at ASC"
            } else {
                "SELECT * FROM jobs ORDER BY created_at ASC"
            };
            let mut stmt = conn.prepare(sql)?;
            let jobs = stmt
                .query_map([], row_to_job)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(jobs)
        })
        .await
    }

    /// Active jobs with `0 < next_run <= now`.
    pub async fn get_due_jobs(&self, now: i64) -> Result<Vec<Job>, ArcError> {
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT * FROM jobs WHERE active=1 AND next_run > 0 AND next_run <= ?1",
            )?;
            let jobs = stmt
                .query_map([now], row_to_job)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(jobs)
        })
        .await
    }

    /// Update `next_run` / `last_run` after a fire. `next_run = 0`
    /// deactivates the job.
    pub async fn update_after_run(&self, job_id: &str, next_run: i64, last_run: i64) -> Result<(), ArcError> {
        let job_id = job_id.to_string();
        self.with_conn(move |conn| {
            let active = i64::from(next_run > 0);
            conn.execute(
                "UPDATE jobs SET next_run=?1, last_run=?2, active=?3 WHERE id=?4",
                rusqlite::params![next_run, last_run, active, job_id],
            )?;
            Ok(())
        })
        .await
    }

    pub async fn delete(&self, job_id: &str) -> Result<bool, ArcError> {
        let job_id = job_id.to_string();
        self.with_conn(move |conn| {
            let n = conn.execute("DELETE FROM jobs WHERE id=?1", [job_id])?;
            Ok(n > 0)
        })
        .await
    }

    pub async fn get_by_name(&self, name: &str) -> Result<Option<Job>, ArcError> {
        let name = name.to_string();
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare("SELECT * FROM jobs WHERE name=?1")?;
            let mut rows = stmt.query_map([name], row_to_job)?;
            match rows.next() {
                Some(job) => Ok(Some(job?)),
                None => Ok(None),
            }
        })
        .await
    }

    pub async fn close(&self) {
        let conn_slot = Arc::clone(&self.conn);
        let _ = tokio::task::spawn_blocking(move || {
            if let Some(conn) = conn_slot.lock().unwrap_or_else(|e| e.into_inner()).take() {
                let _ = conn.close();
            }
        })
        .await;
    }

    // ── Internals ────────────────────────────────────────────────────────────

    async fn with_conn<T, F>(&self, f: F) -> Result<T, ArcError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, ArcError> + Send + 'static,
    {
        let conn_slot = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let guard = conn_slot.lock().unwrap_or_else(|e| e.into_inner());
            let conn = guard
                .as_ref()
                .ok_or_else(|| ArcError::Storage("scheduler store not initialised".into()))?;
            f(conn)
        })
        .await
        .map_err(|e| ArcError::Storage(e.to_string()))?
    }
}

fn row_to_job(row: &rusqlite::Row<'_>) -> rusqlite::Result<Job> {
    let trigger_json: String = row.get("trigger")?;
    let trigger: Trigger = serde_json::from_str(&trigger_json).unwrap_or(Trigger::Interval { seconds: 3600 });
    Ok(Job {
        id: row.get("id")?,
        name: row.get("name")?,
        prompt: row.get("prompt")?,
        trigger,
        next_run: row.get("next_run")?,
        last_run: row.get("last_run")?,
        active: row.get::<_, i64>("active")? != 0,
        use_tools: row.get::<_, i64>("use_tools")? != 0,
        created_at: row.get("created_at")?,
    })
}

// ─── Tests ────────────────────────────────────────────────────────────────────
