//! Text contracts of the grid scheduler
//!
//! The scheduler is only ever talked to through shell commands. Everything that produces or
//! reads that text lives here so the fragile parts can be tested without a cluster.

/// Render a job spec into a `qsub` command with an inline job script
pub mod submission;
/// Read the job identifier out of the scheduler's acknowledgment
pub mod response;
/// Queue status and cancellation commands
pub mod status;
