use log::info;
use rusqlite::{params, Connection};

use crate::job::handle::JobHandle;
use crate::job::spec::JobSpec;
use crate::job::state::JobState;

impl JobHandle {
    /// Record a submission attempt, returns the new row id
    pub fn insert(&self, conn: &Connection, spec: &JobSpec) -> anyhow::Result<i64> {
        if self.state() == JobState::Submitting {
            anyhow::bail!("a submission in flight can't be stored");
        }
        let spec_json = serde_json::to_string(spec)?;
        info!("Storing job {} with state {}", self.job_name(), self.state());
        conn.execute(
            "INSERT INTO job (scheduler_id, job_name, remote_work_dir, remote_script_path, state, submitted_at, spec)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                self.id().map(|id| id.as_str()),
                self.job_name(),
                self.remote_work_dir().display().to_string(),
                self.remote_script_path().map(|path| path.display().to_string()),
                self.state().as_str(),
                self.submitted_at().map(|at| at.to_rfc3339()),
                spec_json,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Write back the state of a job that already has a scheduler id
    ///
    /// Only the latest row with that id is touched, earlier rows are older jobs the scheduler
    /// gave the same id.
    pub fn update(&self, conn: &Connection) -> anyhow::Result<()> {
        let id = match self.id() {
            Some(id) => id,
            None => anyhow::bail!("job {} has no scheduler id to update", self.job_name()),
        };
        let state = self.state();
        info!("Updating {id} with state {state}");
        let rows = conn.execute(
            "UPDATE job SET state = ?1
             WHERE record_id = (SELECT MAX(record_id) FROM job WHERE scheduler_id = ?2)",
            params![state.as_str(), id.as_str()],
        )?;
        if rows == 0 {
            anyhow::bail!("no stored job with scheduler id {id}");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use chrono::Utc;

    use super::*;
    use crate::db::job::load::load_job;
    use crate::db::open::open_db;
    use crate::job::spec::ScriptSource;
    use crate::scheduler::response::JobId;

    fn spec() -> JobSpec {
        JobSpec::new("/w", "base", ScriptSource::Local(PathBuf::from("run.sh"))).with_job_name("job")
    }

    #[test]
    fn test_insert_then_update() {
        let dir = tempfile::tempdir().unwrap();
        let conn = open_db(&dir.path().join("gridjob.db")).unwrap();
        let spec = spec();

        let mut handle = JobHandle::new(&spec);
        handle.begin_submit();
        handle.set_remote_script(PathBuf::from("/w/run.sh"));
        handle.mark_submitted(JobId::new("77"), Utc::now());
        handle.insert(&conn, &spec).unwrap();

        handle.mark_completed();
        handle.update(&conn).unwrap();

        let (_, stored) = load_job(&conn, &JobId::new("77")).unwrap().unwrap();
        assert_eq!(stored.state(), JobState::Completed);
    }

    #[test]
    fn test_update_touches_latest_row_only() {
        let dir = tempfile::tempdir().unwrap();
        let conn = open_db(&dir.path().join("gridjob.db")).unwrap();
        let spec = spec();

        let mut earlier = JobHandle::new(&spec);
        earlier.begin_submit();
        earlier.mark_submitted(JobId::new("9"), Utc::now());
        let first = earlier.insert(&conn, &spec).unwrap();

        let mut recycled = JobHandle::new(&spec);
        recycled.begin_submit();
        recycled.mark_submitted(JobId::new("9"), Utc::now());
        recycled.insert(&conn, &spec).unwrap();
        recycled.mark_completed();
        recycled.update(&conn).unwrap();

        let state: String = conn
            .query_row("SELECT state FROM job WHERE record_id = ?1", params![first], |row| row.get(0))
            .unwrap();
        assert_eq!(state, "submitted");
        let (_, latest) = load_job(&conn, &JobId::new("9")).unwrap().unwrap();
        assert_eq!(latest.state(), JobState::Completed);
    }

    #[test]
    fn test_failed_attempts_are_kept() {
        let dir = tempfile::tempdir().unwrap();
        let conn = open_db(&dir.path().join("gridjob.db")).unwrap();
        let spec = spec();

        let mut handle = JobHandle::new(&spec);
        handle.begin_submit();
        handle.mark_failed();
        let first = handle.insert(&conn, &spec).unwrap();
        let second = handle.insert(&conn, &spec).unwrap();
        assert_ne!(first, second);
        assert!(handle.update(&conn).is_err());
    }

    #[test]
    fn test_submitting_is_not_stored() {
        let dir = tempfile::tempdir().unwrap();
        let conn = open_db(&dir.path().join("gridjob.db")).unwrap();
        let spec = spec();
        let mut handle = JobHandle::new(&spec);
        handle.begin_submit();
        assert!(handle.insert(&conn, &spec).is_err());
    }
}
