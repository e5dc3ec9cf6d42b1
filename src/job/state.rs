use std::fmt;
use std::str::FromStr;

/// Where a job is in its lifecycle
///
/// `Unsubmitted -> Submitting -> Submitted -> Completed`, with `Failed` reachable from any
/// non-terminal state. `Submitting` only exists while a submit call is in flight and is never
/// written to the database.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum JobState {
    Unsubmitted,
    Submitting,
    Submitted,
    Failed,
    Completed,
}

impl JobState {
    /// db column values are lower case
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Unsubmitted => "unsubmitted",
            JobState::Submitting => "submitting",
            JobState::Submitted => "submitted",
            JobState::Failed => "failed",
            JobState::Completed => "completed",
        }
    }

    /// States in which the scheduler has assigned an identifier
    pub fn has_id(&self) -> bool {
        matches!(self, JobState::Submitted | JobState::Completed)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for JobState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unsubmitted" => Ok(JobState::Unsubmitted),
            "submitting" => Ok(JobState::Submitting),
            "submitted" => Ok(JobState::Submitted),
            "failed" => Ok(JobState::Failed),
            "completed" => Ok(JobState::Completed),
            other => Err(format!("unknown job state {other}")),
        }
    }
}
