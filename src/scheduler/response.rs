use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier the scheduler assigns to a submitted job
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    pub fn new(id: impl Into<String>) -> Self {
        JobId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Pull the job identifier out of the submission acknowledgment
///
/// The scheduler answers with a line like
///
/// ```text
/// Your job 123456 ("fold") has been submitted
/// Your job-array 123456.1-420:1 ("fold") has been submitted
/// ```
///
/// The identifier is the third whitespace-separated token of the first line that has one.
/// Array jobs append their task range after a dot, which is dropped: the queue and the output
/// file names only use the base identifier.
pub fn parse_job_id(stdout: &str) -> Option<JobId> {
    stdout
        .lines()
        .find_map(|line| line.split_whitespace().nth(2))
        .map(|token| token.split('.').next().unwrap_or(token))
        .filter(|id| !id.is_empty())
        .map(JobId::new)
}
