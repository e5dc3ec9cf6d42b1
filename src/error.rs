use std::path::PathBuf;

use thiserror::Error;

use crate::job::state::JobState;
use crate::remote::channel::ChannelError;
use crate::scheduler::response::JobId;

/// Every way a job operation can fail
///
/// Variants are ordered roughly by how far a submission got before failing. `InvalidSpec` and
/// `PathNotFound` are raised before anything is written to the remote host; the others may
/// leave remote state behind, which the job handle records.
#[derive(Debug, Error)]
pub enum JobError {
    /// Caller-supplied job data failed validation
    #[error("Invalid job spec: {0}")]
    InvalidSpec(String),

    /// Remote working directory is missing or not a directory
    #[error("Remote path not found or not a directory: {}", .0.display())]
    PathNotFound(PathBuf),

    /// Upload or download failed, `transferred` lists files completed before the failure
    #[error("Transfer of {} failed after {} file(s): {reason}", path.display(), transferred.len())]
    TransferFailed {
        path: PathBuf,
        reason: String,
        transferred: Vec<String>,
    },

    /// The scheduler refused the command and said why on standard error
    #[error("Scheduler rejected `{command}`: {stderr}")]
    SchedulerRejected { command: String, stderr: String },

    /// The scheduler answered with output that doesn't carry a job identifier
    #[error("Unparseable scheduler response to `{command}`: {stdout:?}")]
    UnparseableResponse { command: String, stdout: String },

    /// Submit was called on a handle that already left the unsubmitted state
    #[error("Job already submitted (state {state}, id {id:?})")]
    AlreadySubmitted { state: JobState, id: Option<JobId> },

    /// Outputs were requested before the job was seen to finish
    #[error("Job not finished (state {0})")]
    JobNotFinished(JobState),

    /// Poll or cancel on a handle that never reached the scheduler
    #[error("Job was never submitted (state {0})")]
    NotSubmitted(JobState),

    /// The channel itself failed while running a command
    #[error(transparent)]
    Channel(#[from] ChannelError),

    /// The submission template couldn't be rendered
    #[error("Can't render submission command: {0}")]
    Render(#[from] tinytemplate::error::Error),
}

impl JobError {
    /// Errors raised before any remote side effect, safe to retry after fixing the input
    pub fn is_precondition(&self) -> bool {
        matches!(self, Self::InvalidSpec(_) | Self::PathNotFound(_))
    }
}
