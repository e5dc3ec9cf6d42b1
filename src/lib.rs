//! Submit and track batch jobs on a remote grid engine cluster
//!
//! A [`JobOrchestrator`] drives one job through submit, poll and retrieve over a
//! [`RemoteChannel`]. The scheduler is external: only the text of its commands and
//! responses is produced and consumed here.

/// Errors raised by job submission and tracking
pub mod error;
/// Immutable job descriptions and the mutable handle a submission produces
pub mod job;
/// Remote execution channel: the capability trait, its configuration and an ssh adapter
pub mod remote;
/// Text contracts of the grid scheduler (submission command, responses, queue status)
pub mod scheduler;
/// Coordinates channel, formatter and handle across the job lifecycle
pub mod orchestrator;
/// Job handles are optionally persisted to a SQLite database
pub mod db;

pub use error::JobError;
pub use job::handle::JobHandle;
pub use job::spec::{JobSpec, ScriptSource};
pub use job::state::JobState;
pub use orchestrator::JobOrchestrator;
pub use remote::channel::{CommandOutput, RemoteChannel, RemoteFileKind};
pub use remote::config::ClusterConfig;
pub use remote::ssh::SshChannel;
pub use scheduler::submission::SubmissionFormatter;
