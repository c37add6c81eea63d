//! SQLite-backed job store.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension};

use super::{JobCounts, JobFilter, JobState, JobStore, QueueError, TriageJob};

const INTERRUPTED_EXHAUSTED: &str = "interrupted on final attempt";

const JOB_COLUMNS: &str = "id, ticket_id, attempts_made, max_attempts, state, available_at, last_error, created_at, updated_at, finished_at";

/// SQLite-backed job store.
pub struct SqliteJobStore {
    conn: Mutex<Connection>,
}

impl SqliteJobStore {
    /// Open (or create) the job table in the database at `path`.
    pub fn new(path: &Path) -> Result<Self, QueueError> {
        let conn = Connection::open(path).map_err(|e| QueueError::Database(e.to_string()))?;
        conn.busy_timeout(Duration::from_secs(5))
            .map_err(|e| QueueError::Database(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory job store (useful for testing).
    pub fn in_memory() -> Result<Self, QueueError> {
        let conn =
            Connection::open_in_memory().map_err(|e| QueueError::Database(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), QueueError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS triage_jobs (
                id TEXT PRIMARY KEY,
                ticket_id TEXT NOT NULL,
                attempts_made INTEGER NOT NULL DEFAULT 0,
                max_attempts INTEGER NOT NULL,
                state TEXT NOT NULL,
                available_at TEXT NOT NULL,
                last_error TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                finished_at TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_triage_jobs_due ON triage_jobs(state, available_at);
            CREATE INDEX IF NOT EXISTS idx_triage_jobs_ticket_id ON triage_jobs(ticket_id);
            "#,
        )
        .map_err(|e| QueueError::Database(e.to_string()))?;

        Ok(())
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, QueueError> {
        self.conn
            .lock()
            .map_err(|_| QueueError::Database("connection mutex poisoned".to_string()))
    }

    fn timestamp(value: DateTime<Utc>) -> String {
        value.to_rfc3339_opts(SecondsFormat::Micros, true)
    }

    fn parse_timestamp(idx: usize, value: &str) -> rusqlite::Result<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(value)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
    }

    fn row_to_job(row: &rusqlite::Row) -> rusqlite::Result<TriageJob> {
        let state: String = row.get(4)?;
        let available_at: String = row.get(5)?;
        let created_at: String = row.get(7)?;
        let updated_at: String = row.get(8)?;
        let finished_at: Option<String> = row.get(9)?;

        Ok(TriageJob {
            id: row.get(0)?,
            ticket_id: row.get(1)?,
            attempts_made: row.get(2)?,
            max_attempts: row.get(3)?,
            state: state
                .parse::<JobState>()
                .map_err(|e| rusqlite::Error::FromSqlConversionFailure(4, Type::Text, e.into()))?,
            available_at: Self::parse_timestamp(5, &available_at)?,
            last_error: row.get(6)?,
            created_at: Self::parse_timestamp(7, &created_at)?,
            updated_at: Self::parse_timestamp(8, &updated_at)?,
            finished_at: finished_at
                .map(|f| Self::parse_timestamp(9, &f))
                .transpose()?,
        })
    }

    fn select_by_id(conn: &Connection, id: &str) -> Result<Option<TriageJob>, QueueError> {
        conn.query_row(
            &format!("SELECT {} FROM triage_jobs WHERE id = ?", JOB_COLUMNS),
            params![id],
            Self::row_to_job,
        )
        .optional()
        .map_err(|e| QueueError::Database(e.to_string()))
    }

    fn update_returning(
        conn: &Connection,
        sql: &str,
        params: &[&dyn rusqlite::ToSql],
    ) -> Result<Vec<TriageJob>, QueueError> {
        let mut stmt = conn
            .prepare(sql)
            .map_err(|e| QueueError::Database(e.to_string()))?;
        let rows = stmt
            .query_map(params, Self::row_to_job)
            .map_err(|e| QueueError::Database(e.to_string()))?;

        let mut jobs = Vec::new();
        for row_result in rows {
            jobs.push(row_result.map_err(|e| QueueError::Database(e.to_string()))?);
        }
        Ok(jobs)
    }

    /// Run an UPDATE that must hit exactly one row.
    fn update_one(
        conn: &Connection,
        id: &str,
        sql: &str,
        params: &[&dyn rusqlite::ToSql],
    ) -> Result<(), QueueError> {
        let affected = conn
            .execute(sql, params)
            .map_err(|e| QueueError::Database(e.to_string()))?;
        if affected == 0 {
            return Err(QueueError::NotFound(id.to_string()));
        }
        Ok(())
    }
}

impl JobStore for SqliteJobStore {
    fn insert(
        &self,
        ticket_id: &str,
        max_attempts: u32,
        available_at: DateTime<Utc>,
    ) -> Result<TriageJob, QueueError> {
        let conn = self.conn()?;

        let id = uuid::Uuid::new_v4().to_string();
        let now = Self::timestamp(Utc::now());

        conn.execute(
            "INSERT INTO triage_jobs (id, ticket_id, attempts_made, max_attempts, state, available_at, created_at, updated_at) VALUES (?, ?, 0, ?, ?, ?, ?, ?)",
            params![
                id,
                ticket_id,
                max_attempts,
                JobState::Waiting.as_str(),
                Self::timestamp(available_at),
                now,
                now,
            ],
        )
        .map_err(|e| QueueError::Database(e.to_string()))?;

        Self::select_by_id(&conn, &id)?.ok_or(QueueError::NotFound(id))
    }

    fn claim_next(&self, now: DateTime<Utc>) -> Result<Option<TriageJob>, QueueError> {
        let conn = self.conn()?;
        let now = Self::timestamp(now);

        conn.query_row(
            &format!(
                "UPDATE triage_jobs SET state = 'active', attempts_made = attempts_made + 1, updated_at = ?1 \
                 WHERE id = (SELECT id FROM triage_jobs WHERE state = 'waiting' AND available_at <= ?1 \
                             ORDER BY available_at ASC, created_at ASC LIMIT 1) \
                 RETURNING {}",
                JOB_COLUMNS
            ),
            params![now],
            Self::row_to_job,
        )
        .optional()
        .map_err(|e| QueueError::Database(e.to_string()))
    }

    fn next_due_at(&self) -> Result<Option<DateTime<Utc>>, QueueError> {
        let conn = self.conn()?;

        let due: Option<String> = conn
            .query_row(
                "SELECT MIN(available_at) FROM triage_jobs WHERE state = 'waiting'",
                [],
                |row| row.get(0),
            )
            .map_err(|e| QueueError::Database(e.to_string()))?;

        due.map(|d| Self::parse_timestamp(0, &d))
            .transpose()
            .map_err(|e| QueueError::Database(e.to_string()))
    }

    fn mark_completed(&self, id: &str, now: DateTime<Utc>) -> Result<(), QueueError> {
        let conn = self.conn()?;
        let now = Self::timestamp(now);
        Self::update_one(
            &conn,
            id,
            "UPDATE triage_jobs SET state = 'completed', updated_at = ?1, finished_at = ?1 WHERE id = ?2",
            params![now, id],
        )
    }

    fn schedule_retry(
        &self,
        id: &str,
        available_at: DateTime<Utc>,
        error: &str,
    ) -> Result<(), QueueError> {
        let conn = self.conn()?;
        let now = Self::timestamp(Utc::now());
        let available_at = Self::timestamp(available_at);
        Self::update_one(
            &conn,
            id,
            "UPDATE triage_jobs SET state = 'waiting', available_at = ?1, last_error = ?2, updated_at = ?3 WHERE id = ?4",
            params![available_at, error, now, id],
        )
    }

    fn mark_failed(&self, id: &str, error: &str, now: DateTime<Utc>) -> Result<(), QueueError> {
        let conn = self.conn()?;
        let now = Self::timestamp(now);
        Self::update_one(
            &conn,
            id,
            "UPDATE triage_jobs SET state = 'failed', last_error = ?1, updated_at = ?2, finished_at = ?2 WHERE id = ?3",
            params![error, now, id],
        )
    }

    fn requeue_active(&self, now: DateTime<Utc>) -> Result<Vec<TriageJob>, QueueError> {
        let conn = self.conn()?;
        let now = Self::timestamp(now);

        let mut jobs = Self::update_returning(
            &conn,
            &format!(
                "UPDATE triage_jobs SET state = 'failed', last_error = ?2, updated_at = ?1, finished_at = ?1 \
                 WHERE state = 'active' AND attempts_made >= max_attempts RETURNING {}",
                JOB_COLUMNS
            ),
            params![now, INTERRUPTED_EXHAUSTED],
        )?;
        jobs.extend(Self::update_returning(
            &conn,
            &format!(
                "UPDATE triage_jobs SET state = 'waiting', available_at = ?1, updated_at = ?1 \
                 WHERE state = 'active' RETURNING {}",
                JOB_COLUMNS
            ),
            params![now],
        )?);
        Ok(jobs)
    }

    fn purge_completed(&self, older_than: DateTime<Utc>, keep: usize) -> Result<usize, QueueError> {
        let conn = self.conn()?;
        let keep = i64::try_from(keep).unwrap_or(i64::MAX);

        conn.execute(
            "DELETE FROM triage_jobs WHERE state = 'completed' AND (finished_at < ?1 OR id NOT IN \
             (SELECT id FROM triage_jobs WHERE state = 'completed' ORDER BY finished_at DESC LIMIT ?2))",
            params![Self::timestamp(older_than), keep],
        )
        .map_err(|e| QueueError::Database(e.to_string()))
    }

    fn get(&self, id: &str) -> Result<Option<TriageJob>, QueueError> {
        let conn = self.conn()?;
        Self::select_by_id(&conn, id)
    }

    fn list(&self, filter: &JobFilter) -> Result<Vec<TriageJob>, QueueError> {
        let conn = self.conn()?;

        let mut conditions = Vec::new();
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(state) = filter.state {
            conditions.push("state = ?");
            params.push(Box::new(state.as_str()));
        }
        if let Some(ref ticket_id) = filter.ticket_id {
            conditions.push("ticket_id = ?");
            params.push(Box::new(ticket_id.clone()));
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        params.push(Box::new(filter.limit));
        params.push(Box::new(filter.offset));

        let sql = format!(
            "SELECT {} FROM triage_jobs {} ORDER BY updated_at DESC LIMIT ? OFFSET ?",
            JOB_COLUMNS, where_clause
        );

        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| QueueError::Database(e.to_string()))?;

        let param_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();

        let rows = stmt
            .query_map(param_refs.as_slice(), Self::row_to_job)
            .map_err(|e| QueueError::Database(e.to_string()))?;

        let mut jobs = Vec::new();
        for row_result in rows {
            jobs.push(row_result.map_err(|e| QueueError::Database(e.to_string()))?);
        }
        Ok(jobs)
    }

    fn counts(&self) -> Result<JobCounts, QueueError> {
        let conn = self.conn()?;

        let mut stmt = conn
            .prepare("SELECT state, COUNT(*) FROM triage_jobs GROUP BY state")
            .map_err(|e| QueueError::Database(e.to_string()))?;

        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))
            .map_err(|e| QueueError::Database(e.to_string()))?;

        let mut counts = JobCounts::default();
        for row_result in rows {
            let (state, count) = row_result.map_err(|e| QueueError::Database(e.to_string()))?;
            match state.parse::<JobState>() {
                Ok(JobState::Waiting) => counts.waiting = count,
                Ok(JobState::Active) => counts.active = count,
                Ok(JobState::Completed) => counts.completed = count,
                Ok(JobState::Failed) => counts.failed = count,
                Err(e) => return Err(QueueError::Database(e)),
            }
        }
        Ok(counts)
    }

    fn has_open_job(&self, ticket_id: &str) -> Result<bool, QueueError> {
        let conn = self.conn()?;

        conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM triage_jobs WHERE ticket_id = ? AND state IN ('waiting', 'active'))",
            params![ticket_id],
            |row| row.get(0),
        )
        .map_err(|e| QueueError::Database(e.to_string()))
    }
}
