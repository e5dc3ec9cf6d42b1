use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::error::JobError;

/// Where the job script lives before submission
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScriptSource {
    /// A script on this machine, uploaded into the remote working directory
    Local(PathBuf),
    /// A script that is already executable on the cluster, used as-is
    Remote(PathBuf),
}

impl ScriptSource {
    pub fn path(&self) -> &Path {
        match self {
            ScriptSource::Local(path) | ScriptSource::Remote(path) => path,
        }
    }

    /// Final path segment, which is also the script's name once uploaded
    pub fn file_name(&self) -> Option<&str> {
        self.path().file_name().and_then(|name| name.to_str())
    }
}

/// Everything the scheduler needs to know to run a job
///
/// Built once by the caller and never modified afterwards. Defaults follow the cluster's
/// usual small job: one task, two hours, 3 GB of memory.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct JobSpec {
    /// Must already exist on the remote host, checked before anything is uploaded
    pub remote_work_dir: PathBuf,
    /// Execution environment activated before the script runs
    pub environment_name: String,
    pub script: ScriptSource,
    /// Passed through to the script space-joined, without quoting
    pub script_args: Vec<String>,
    /// Array job cardinality, tasks are numbered 1..=task_count
    pub task_count: u32,
    pub time_limit: Duration,
    pub memory_limit_gb: f64,
    /// Opaque key=value scheduler resource tags, rendered in this order
    pub hardware_constraints: Vec<String>,
    pub job_name: String,
}

impl JobSpec {
    pub fn new(remote_work_dir: impl Into<PathBuf>, environment_name: impl Into<String>, script: ScriptSource) -> Self {
        JobSpec {
            remote_work_dir: remote_work_dir.into(),
            environment_name: environment_name.into(),
            script,
            script_args: Vec::new(),
            task_count: 1,
            time_limit: Duration::from_secs(2 * 60 * 60),
            memory_limit_gb: 3.0,
            hardware_constraints: Vec::new(),
            job_name: generate_job_name(),
        }
    }

    pub fn with_job_name(mut self, job_name: impl Into<String>) -> Self {
        self.job_name = job_name.into();
        self
    }

    pub fn with_script_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.script_args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_task_count(mut self, task_count: u32) -> Self {
        self.task_count = task_count;
        self
    }

    pub fn with_time_limit(mut self, time_limit: Duration) -> Self {
        self.time_limit = time_limit;
        self
    }

    pub fn with_memory_limit_gb(mut self, memory_limit_gb: f64) -> Self {
        self.memory_limit_gb = memory_limit_gb;
        self
    }

    pub fn with_hardware_constraints<I, S>(mut self, constraints: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.hardware_constraints = constraints.into_iter().map(Into::into).collect();
        self
    }

    /// Where the script is executed from on the remote host
    ///
    /// Local scripts are uploaded under their own file name into the working directory, so the
    /// path is known before the upload happens.
    pub fn remote_script_path(&self) -> Result<PathBuf, JobError> {
        match &self.script {
            ScriptSource::Local(local) => {
                let name = local.file_name().ok_or_else(|| {
                    JobError::InvalidSpec(format!("script path {} has no file name", local.display()))
                })?;
                Ok(self.remote_work_dir.join(name))
            }
            ScriptSource::Remote(remote) => Ok(remote.clone()),
        }
    }

    /// Check everything that can be checked without touching the remote host
    pub fn validate(&self) -> Result<(), JobError> {
        if self.task_count < 1 {
            return Err(JobError::InvalidSpec("task count must be at least 1".to_string()));
        }
        if !(self.memory_limit_gb.is_finite() && self.memory_limit_gb > 0.0) {
            return Err(JobError::InvalidSpec(format!(
                "memory limit must be a positive number of GB, got {}",
                self.memory_limit_gb
            )));
        }
        if self.time_limit.as_secs() == 0 {
            return Err(JobError::InvalidSpec("time limit must be at least one second".to_string()));
        }
        validate_job_name(&self.job_name)?;
        if self.environment_name.is_empty() || self.environment_name.contains(char::is_whitespace) {
            return Err(JobError::InvalidSpec(format!(
                "environment name {:?} must be non-empty without whitespace",
                self.environment_name
            )));
        }
        if self.script.file_name().is_none() {
            return Err(JobError::InvalidSpec(format!(
                "script path {} has no file name",
                self.script.path().display()
            )));
        }
        Ok(())
    }
}

/// Job names become a bare word in the submission command and a prefix of the output files
///
/// Only ASCII letters, digits, `_`, `-` and `.` are accepted, and the name can't start with a
/// digit (the scheduler would read it as a job id).
pub fn validate_job_name(name: &str) -> Result<(), JobError> {
    let first = match name.chars().next() {
        Some(c) => c,
        None => return Err(JobError::InvalidSpec("job name is empty".to_string())),
    };
    if first.is_ascii_digit() {
        return Err(JobError::InvalidSpec(format!("job name {name:?} starts with a digit")));
    }
    if let Some(bad) = name
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.')))
    {
        return Err(JobError::InvalidSpec(format!(
            "job name {name:?} contains forbidden character {bad:?}"
        )));
    }
    Ok(())
}

/// Default job name, unique to the second
pub fn generate_job_name() -> String {
    format!("job_{}", Utc::now().format("%Y%m%d%H%M%S"))
}

/// Parse a `HH:MM:SS` time limit, hours may exceed 24
pub fn parse_time_limit(value: &str) -> Result<Duration, JobError> {
    let invalid = || JobError::InvalidSpec(format!("time limit {value:?} is not HH:MM:SS"));
    let parts: Vec<&str> = value.trim().split(':').collect();
    if parts.len() != 3 {
        return Err(invalid());
    }
    let mut fields = [0u64; 3];
    for (field, part) in fields.iter_mut().zip(&parts) {
        *field = part.parse().map_err(|_| invalid())?;
    }
    let [hours, minutes, seconds] = fields;
    if minutes >= 60 || seconds >= 60 {
        return Err(invalid());
    }
    Ok(Duration::from_secs(hours * 3600 + minutes * 60 + seconds))
}

/// Render a time limit as `HH:MM:SS`, sub-second precision is dropped
pub fn format_time_limit(limit: Duration) -> String {
    let total = limit.as_secs();
    format!("{:02}:{:02}:{:02}", total / 3600, (total / 60) % 60, total % 60)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec() -> JobSpec {
        JobSpec::new("/wynton/home/me/run", "base", ScriptSource::Local(PathBuf::from("scripts/run.py")))
            .with_job_name("fold")
    }

    #[test]
    fn test_defaults() {
        let spec = JobSpec::new("/tmp", "base", ScriptSource::Remote(PathBuf::from("/opt/run.sh")));
        assert_eq!(spec.task_count, 1);
        assert_eq!(spec.time_limit, Duration::from_secs(7200));
        assert_eq!(spec.memory_limit_gb, 3.0);
        assert!(spec.job_name.starts_with("job_"));
        assert!(spec.validate().is_ok());
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(matches!(spec().with_task_count(0).validate(), Err(JobError::InvalidSpec(_))));
        assert!(matches!(spec().with_memory_limit_gb(0.0).validate(), Err(JobError::InvalidSpec(_))));
        assert!(matches!(spec().with_memory_limit_gb(f64::NAN).validate(), Err(JobError::InvalidSpec(_))));
        assert!(matches!(spec().with_time_limit(Duration::ZERO).validate(), Err(JobError::InvalidSpec(_))));

        let mut no_env = spec();
        no_env.environment_name = "my env".to_string();
        assert!(no_env.validate().is_err());
    }

    #[test]
    fn test_job_names() {
        assert!(validate_job_name("fold_2.v1-a").is_ok());
        for bad in ["", "two words", "a;rm", "x$(id)", "tab\tname", "9lives", "out>file", "a/b"] {
            assert!(validate_job_name(bad).is_err(), "{bad:?} should be rejected");
        }
    }

    #[test]
    fn test_time_limits() {
        assert_eq!(parse_time_limit("02:00:00").unwrap(), Duration::from_secs(7200));
        assert_eq!(parse_time_limit("36:05:09").unwrap(), Duration::from_secs(36 * 3600 + 309));
        assert!(parse_time_limit("2h").is_err());
        assert!(parse_time_limit("01:60:00").is_err());
        assert_eq!(format_time_limit(Duration::from_secs(36 * 3600 + 309)), "36:05:09");
        assert_eq!(format_time_limit(Duration::from_secs(59)), "00:00:59");
    }

    #[test]
    fn test_remote_script_path() {
        assert_eq!(spec().remote_script_path().unwrap(), PathBuf::from("/wynton/home/me/run/run.py"));
        let remote = JobSpec { script: ScriptSource::Remote(PathBuf::from("/opt/run.sh")), ..spec() };
        assert_eq!(remote.remote_script_path().unwrap(), PathBuf::from("/opt/run.sh"));
    }

    #[test]
    fn test_script_file_name() {
        assert_eq!(spec().script.file_name(), Some("run.py"));
        assert_eq!(ScriptSource::Remote(PathBuf::from("/")).file_name(), None);
    }
}
