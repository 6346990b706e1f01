//! Job repository — the durable queue behind the processing pipeline.
//!
//! A job row is never deleted: terminal rows stay behind as the audit
//! trail and become eligible again only through an explicit requeue.

use chrono::Utc;
use rusqlite::{params, OptionalExtension, Row};

use super::media_repo::{self, MediaMeta};
use super::{Database, DatabaseError};

/// A job row from the database.
#[derive(Debug, Clone, PartialEq)]
pub struct JobRecord {
    pub id: i64,
    pub media_id: i64,
    pub enqueued_at: String,
    pub dequeued: bool,
    pub finished: bool,
    pub errored: bool,
    pub error_text: Option<String>,
}

impl JobRecord {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            media_id: row.get("media_id")?,
            enqueued_at: row.get("enqueued_at")?,
            dequeued: row.get("dequeued")?,
            finished: row.get("finished")?,
            errored: row.get("errored")?,
            error_text: row.get("error_text")?,
        })
    }

    /// Claimed by a worker but not yet finished or errored.
    pub fn is_in_flight(&self) -> bool {
        self.dequeued && !self.finished && !self.errored
    }

    /// Finished or errored.
    pub fn is_terminal(&self) -> bool {
        self.finished || self.errored
    }
}

const JOB_COLUMNS: &str = "id, media_id, enqueued_at, dequeued, finished, errored, error_text";

/// Creates a new job in queued state. Whether `media_id` references an
/// existing media row is the caller's responsibility.
pub fn enqueue(db: &Database, media_id: i64) -> Result<JobRecord, DatabaseError> {
    db.with_conn(|conn| {
        let enqueued_at = Utc::now().to_rfc3339();
        conn.execute(
            "INSERT INTO jobs (media_id, enqueued_at) VALUES (?1, ?2)",
            params![media_id, enqueued_at],
        )?;
        let id = conn.last_insert_rowid();
        Ok(JobRecord {
            id,
            media_id,
            enqueued_at,
            dequeued: false,
            finished: false,
            errored: false,
            error_text: None,
        })
    })
}

/// Atomically claims the oldest queued job, or returns `None` when no
/// eligible job exists.
///
/// The claim is a single UPDATE with a subselect, executed while holding
/// the connection mutex: two concurrent callers can never claim the same
/// row.
pub fn dequeue_one(db: &Database) -> Result<Option<JobRecord>, DatabaseError> {
    db.with_conn(|conn| {
        let row = conn
            .query_row(
                &format!(
                    "UPDATE jobs SET dequeued = 1
                     WHERE id = (SELECT id FROM jobs WHERE dequeued = 0 ORDER BY id LIMIT 1)
                     RETURNING {JOB_COLUMNS}"
                ),
                [],
                JobRecord::from_row,
            )
            .optional()?;
        Ok(row)
    })
}

/// Records the outcome of a processing run and, on success, persists the
/// extracted metadata — all in one transaction.
///
/// Idempotent: the job columns are pure writes and the metadata lands as
/// an upsert, so replaying the same result reproduces the same terminal
/// state.
pub fn apply_result(
    db: &Database,
    job_id: i64,
    success: bool,
    message: &str,
    media_id: i64,
    meta: Option<&MediaMeta>,
) -> Result<(), DatabaseError> {
    db.with_tx(|tx| {
        let error_text = if success { None } else { Some(message) };
        let updated = tx.execute(
            "UPDATE jobs SET dequeued = 1, finished = ?2, errored = ?3, error_text = ?4
             WHERE id = ?1",
            params![job_id, success, !success, error_text],
        )?;
        if updated == 0 {
            return Err(DatabaseError::JobNotFound(job_id));
        }
        if let Some(meta) = meta {
            media_repo::upsert_meta(tx, media_id, meta)?;
        }
        Ok(())
    })
}

/// Resets a job to queued state so it becomes eligible for dequeue again.
///
/// Refuses a job that is currently in flight unless `force` is passed —
/// forcing one risks a second worker picking it up while the first is
/// still running.
pub fn requeue(db: &Database, job_id: i64, force: bool) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        let job = conn
            .query_row(
                &format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = ?1"),
                params![job_id],
                JobRecord::from_row,
            )
            .optional()?
            .ok_or(DatabaseError::JobNotFound(job_id))?;

        if job.is_in_flight() {
            if !force {
                return Err(DatabaseError::JobInFlight(job_id));
            }
            log::warn!("Force-requeueing in-flight job {}", job_id);
        }

        conn.execute(
            "UPDATE jobs SET dequeued = 0, finished = 0, errored = 0, error_text = NULL
             WHERE id = ?1",
            params![job_id],
        )?;
        Ok(())
    })
}

/// Resets every terminal (finished or errored) job to queued state.
/// In-flight and still-queued jobs are untouched. Returns the number of
/// jobs reset.
pub fn requeue_all(db: &Database) -> Result<usize, DatabaseError> {
    db.with_conn(|conn| {
        let reset = conn.execute(
            "UPDATE jobs SET dequeued = 0, finished = 0, errored = 0, error_text = NULL
             WHERE finished = 1 OR errored = 1",
            [],
        )?;
        Ok(reset)
    })
}

/// Finds a job by its id.
pub fn find_by_id(db: &Database, job_id: i64) -> Result<Option<JobRecord>, DatabaseError> {
    db.with_conn(|conn| {
        let row = conn
            .query_row(
                &format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = ?1"),
                params![job_id],
                JobRecord::from_row,
            )
            .optional()?;
        Ok(row)
    })
}

/// Lists queued and in-flight jobs, oldest first. The ops surface uses
/// this to show what the pipeline is working on.
pub fn list_active(db: &Database) -> Result<Vec<JobRecord>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(&format!(
            "SELECT {JOB_COLUMNS} FROM jobs
             WHERE finished = 0 AND errored = 0
             ORDER BY id"
        ))?;
        let rows: Vec<JobRecord> = stmt
            .query_map([], JobRecord::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

/// Per-state job counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct QueueCounts {
    pub queued: u64,
    pub in_flight: u64,
    pub finished: u64,
    pub errored: u64,
}

/// Counts jobs by lifecycle state.
pub fn count_by_state(db: &Database) -> Result<QueueCounts, DatabaseError> {
    db.with_conn(|conn| {
        conn.query_row(
            "SELECT
                 COUNT(*) FILTER (WHERE dequeued = 0),
                 COUNT(*) FILTER (WHERE dequeued = 1 AND finished = 0 AND errored = 0),
                 COUNT(*) FILTER (WHERE finished = 1),
                 COUNT(*) FILTER (WHERE errored = 1)
             FROM jobs",
            [],
            |r| {
                Ok(QueueCounts {
                    queued: r.get(0)?,
                    in_flight: r.get(1)?,
                    finished: r.get(2)?,
                    errored: r.get(3)?,
                })
            },
        )
        .map_err(DatabaseError::Sqlite)
    })
}
