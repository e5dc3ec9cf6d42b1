use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use crate::job::spec::JobSpec;
use crate::job::state::JobState;
use crate::scheduler::response::JobId;

/// A submitted (or attempted) job
///
/// The scheduler id is present exactly when the state is `Submitted` or `Completed`. A failed
/// handle keeps whatever it collected before failing, e.g. the uploaded script path, so the
/// caller can see how far submission got.
#[derive(Debug, Clone, PartialEq)]
pub struct JobHandle {
    id: Option<JobId>,
    state: JobState,
    job_name: String,
    remote_work_dir: PathBuf,
    remote_script_path: Option<PathBuf>,
    submitted_at: Option<DateTime<Utc>>,
}

impl JobHandle {
    /// An empty handle for a job that hasn't been submitted yet
    pub fn new(spec: &JobSpec) -> Self {
        JobHandle {
            id: None,
            state: JobState::Unsubmitted,
            job_name: spec.job_name.clone(),
            remote_work_dir: spec.remote_work_dir.clone(),
            remote_script_path: None,
            submitted_at: None,
        }
    }

    /// Rebuild a handle from stored fields, rejecting combinations a live handle can't reach
    pub fn restore(
        spec: &JobSpec,
        id: Option<JobId>,
        state: JobState,
        remote_script_path: Option<PathBuf>,
        submitted_at: Option<DateTime<Utc>>,
    ) -> Result<Self, String> {
        if state == JobState::Submitting {
            return Err("a submission in flight can't be restored".to_string());
        }
        if state.has_id() != id.is_some() {
            return Err(format!("state {state} is inconsistent with id {id:?}"));
        }
        Ok(JobHandle {
            id,
            state,
            job_name: spec.job_name.clone(),
            remote_work_dir: spec.remote_work_dir.clone(),
            remote_script_path,
            submitted_at,
        })
    }

    pub fn id(&self) -> Option<&JobId> {
        self.id.as_ref()
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    pub fn job_name(&self) -> &str {
        &self.job_name
    }

    pub fn remote_work_dir(&self) -> &Path {
        &self.remote_work_dir
    }

    pub fn remote_script_path(&self) -> Option<&Path> {
        self.remote_script_path.as_deref()
    }

    pub fn submitted_at(&self) -> Option<DateTime<Utc>> {
        self.submitted_at
    }

    /// True for the scheduler's stdout/stderr files of this job, including per-task files
    ///
    /// The scheduler names them `<job name>.o<id>` and `<job name>.e<id>`, and appends
    /// `.<task>` for array jobs.
    pub fn is_std_stream(&self, file_name: &str) -> bool {
        let id = match &self.id {
            Some(id) => id,
            None => return false,
        };
        ["o", "e"].iter().any(|stream| {
            let prefix = format!("{}.{}{}", self.job_name, stream, id);
            match file_name.strip_prefix(prefix.as_str()) {
                Some(rest) => rest.is_empty() || rest.starts_with('.'),
                None => false,
            }
        })
    }

    pub(crate) fn begin_submit(&mut self) {
        debug_assert_eq!(self.state, JobState::Unsubmitted);
        self.state = JobState::Submitting;
    }

    /// Back out of a submission that failed before touching the remote host
    pub(crate) fn abandon_submit(&mut self) {
        self.state = JobState::Unsubmitted;
    }

    pub(crate) fn set_remote_script(&mut self, path: PathBuf) {
        self.remote_script_path = Some(path);
    }

    pub(crate) fn mark_submitted(&mut self, id: JobId, at: DateTime<Utc>) {
        self.id = Some(id);
        self.submitted_at = Some(at);
        self.state = JobState::Submitted;
    }

    pub(crate) fn mark_failed(&mut self) {
        debug_assert!(self.id.is_none());
        self.state = JobState::Failed;
    }

    pub(crate) fn mark_completed(&mut self) {
        debug_assert!(self.id.is_some());
        self.state = JobState::Completed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::spec::ScriptSource;

    fn spec() -> JobSpec {
        JobSpec::new("/scratch/run", "base", ScriptSource::Local(PathBuf::from("run.sh"))).with_job_name("job")
    }

    fn submitted() -> JobHandle {
        let mut handle = JobHandle::new(&spec());
        handle.begin_submit();
        handle.mark_submitted(JobId::new("123456"), Utc::now());
        handle
    }

    #[test]
    fn test_new_handle_is_empty() {
        let handle = JobHandle::new(&spec());
        assert_eq!(handle.state(), JobState::Unsubmitted);
        assert!(handle.id().is_none());
        assert!(handle.remote_script_path().is_none());
        assert!(handle.submitted_at().is_none());
        assert_eq!(handle.job_name(), "job");
    }

    #[test]
    fn test_std_stream_names() {
        let handle = submitted();
        assert!(handle.is_std_stream("job.o123456"));
        assert!(handle.is_std_stream("job.e123456"));
        assert!(handle.is_std_stream("job.o123456.7"));
        assert!(!handle.is_std_stream("job.o1234567"));
        assert!(!handle.is_std_stream("other.o123456"));
        assert!(!handle.is_std_stream("result1.txt"));
        assert!(!JobHandle::new(&spec()).is_std_stream("job.o123456"));
    }

    #[test]
    fn test_restore_checks_invariant() {
        let spec = spec();
        assert!(JobHandle::restore(&spec, None, JobState::Submitted, None, None).is_err());
        assert!(JobHandle::restore(&spec, Some(JobId::new("1")), JobState::Failed, None, None).is_err());
        assert!(JobHandle::restore(&spec, None, JobState::Submitting, None, None).is_err());

        let restored = JobHandle::restore(&spec, Some(JobId::new("1")), JobState::Completed, None, None).unwrap();
        assert_eq!(restored.state(), JobState::Completed);
        assert_eq!(restored.id().map(JobId::as_str), Some("1"));
    }
}
