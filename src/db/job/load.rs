use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use log::info;
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::job::handle::JobHandle;
use crate::job::spec::JobSpec;
use crate::job::state::JobState;
use crate::scheduler::response::JobId;

/// A job handle read back from the database, with the spec it was submitted from
#[derive(Debug)]
pub struct StoredJob {
    pub record_id: i64,
    pub spec: JobSpec,
    pub handle: JobHandle,
}

/// Raw column values, deserialised after the statement finishes
struct JobRow {
    record_id: i64,
    spec: String,
    scheduler_id: Option<String>,
    state: String,
    remote_script_path: Option<String>,
    submitted_at: Option<String>,
}

static COLUMNS: &str = "record_id, spec, scheduler_id, state, remote_script_path, submitted_at";

fn read_row(row: &Row) -> rusqlite::Result<JobRow> {
    Ok(JobRow {
        record_id: row.get(0)?,
        spec: row.get(1)?,
        scheduler_id: row.get(2)?,
        state: row.get(3)?,
        remote_script_path: row.get(4)?,
        submitted_at: row.get(5)?,
    })
}

/// The latest job stored under a scheduler id
///
/// Scheduler ids are recycled eventually, so older rows with the same id belong to earlier jobs.
pub fn load_job(conn: &Connection, id: &JobId) -> Result<Option<(JobSpec, JobHandle)>> {
    let row = conn
        .query_row(
            &format!("SELECT {COLUMNS} FROM job WHERE scheduler_id = ?1 ORDER BY record_id DESC LIMIT 1"),
            params![id.as_str()],
            read_row,
        )
        .optional()?;

    match row {
        Some(row) => {
            info!("Loaded job {id} from db");
            let stored = deserialise(row)?;
            Ok(Some((stored.spec, stored.handle)))
        }
        None => Ok(None),
    }
}

/// All stored jobs in insertion order, optionally only those in `state`
pub fn load_jobs(conn: &Connection, state: Option<JobState>) -> Result<Vec<StoredJob>> {
    let mut stmt = match state {
        Some(_) => conn.prepare(&format!("SELECT {COLUMNS} FROM job WHERE state = ?1 ORDER BY record_id"))?,
        None => conn.prepare(&format!("SELECT {COLUMNS} FROM job ORDER BY record_id"))?,
    };
    let rows = match state {
        Some(state) => stmt.query_map(params![state.as_str()], read_row)?,
        None => stmt.query_map([], read_row)?,
    };

    let mut raw: Vec<JobRow> = Vec::new();
    for row in rows {
        raw.push(row?);
    }
    raw.into_iter().map(deserialise).collect()
}

fn deserialise(row: JobRow) -> Result<StoredJob> {
    let spec: JobSpec = serde_json::from_str(&row.spec)
        .with_context(|| format!("Stored spec of record {} is not valid", row.record_id))?;
    let state: JobState = row.state.parse().map_err(|err: String| anyhow!(err))?;
    let submitted_at = match row.submitted_at {
        Some(text) => Some(DateTime::parse_from_rfc3339(&text)?.with_timezone(&Utc)),
        None => None,
    };
    let handle = JobHandle::restore(
        &spec,
        row.scheduler_id.map(JobId::new),
        state,
        row.remote_script_path.map(PathBuf::from),
        submitted_at,
    )
    .map_err(|err| anyhow!("Record {} is inconsistent: {err}", row.record_id))?;

    Ok(StoredJob { record_id: row.record_id, spec, handle })
}
