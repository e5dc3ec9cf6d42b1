//! Drive one job through submit, poll and retrieve
//!
//! Submission is a sequence of remote steps that can each fail independently: the working
//! directory check, the script upload, the `qsub` call and the parsing of its answer. The
//! orchestrator runs them in order and leaves the [`JobHandle`] describing exactly how far it
//! got. Nothing is ever retried here: a retried `qsub` could queue the same job twice, so
//! retry decisions belong to the caller.

use std::fs;
use std::path::Path;
use std::thread;
use std::time::Duration;

use chrono::Utc;
use log::{debug, info, warn};

use crate::error::JobError;
use crate::job::handle::JobHandle;
use crate::job::spec::{JobSpec, ScriptSource};
use crate::job::state::JobState;
use crate::remote::channel::{ChannelError, CommandOutput, RemoteChannel, RemoteFileKind};
use crate::remote::ssh::shell_quote;
use crate::scheduler::response::{parse_job_id, JobId};
use crate::scheduler::status::{cancel_command, find_entry, parse_queue, STATUS_COMMAND};
use crate::scheduler::submission::SubmissionFormatter;

/// Owns the channel, spec and handle of a single job
///
/// One orchestrator per job. The submit guard stops the same instance from submitting twice
/// but does nothing across instances or processes; to run many jobs concurrently, give each
/// its own orchestrator and its own channel.
pub struct JobOrchestrator<C: RemoteChannel> {
    channel: C,
    spec: JobSpec,
    handle: JobHandle,
    formatter: SubmissionFormatter,
}

impl<C: RemoteChannel> JobOrchestrator<C> {
    pub fn new(channel: C, spec: JobSpec) -> Self {
        let handle = JobHandle::new(&spec);
        JobOrchestrator { channel, spec, handle, formatter: SubmissionFormatter::new() }
    }

    /// Pick up a job submitted earlier, e.g. one loaded from the database
    pub fn resume(channel: C, spec: JobSpec, handle: JobHandle) -> Self {
        JobOrchestrator { channel, spec, handle, formatter: SubmissionFormatter::new() }
    }

    pub fn handle(&self) -> &JobHandle {
        &self.handle
    }

    pub fn spec(&self) -> &JobSpec {
        &self.spec
    }

    pub fn channel(&self) -> &C {
        &self.channel
    }

    pub fn into_parts(self) -> (C, JobSpec, JobHandle) {
        (self.channel, self.spec, self.handle)
    }

    /// The submission command this job would run, without touching the remote host
    pub fn render(&self) -> Result<String, JobError> {
        let script = self.spec.remote_script_path()?;
        self.formatter.format(&self.spec, &self.spec.remote_work_dir, &script)
    }

    /// Submit the job to the scheduler
    ///
    /// Local validation and the remote working directory check happen first and leave the
    /// handle `Unsubmitted` on failure. Once the script upload starts, any failure leaves it
    /// `Failed` with whatever was created so far still recorded.
    pub fn submit(&mut self) -> Result<&JobHandle, JobError> {
        if self.handle.state() != JobState::Unsubmitted {
            return Err(JobError::AlreadySubmitted {
                state: self.handle.state(),
                id: self.handle.id().cloned(),
            });
        }
        // the remote script path is fixed before upload, so the whole command can be rendered
        // and validated before anything changes on the remote host
        let command = self.render()?;

        self.handle.begin_submit();
        if let Err(err) = self.check_preconditions() {
            self.handle.abandon_submit();
            return Err(err);
        }

        match self.stage_and_submit(&command) {
            Ok(id) => {
                info!("Job {} submitted with id {id}", self.spec.job_name);
                self.handle.mark_submitted(id, Utc::now());
                Ok(&self.handle)
            }
            Err(err) => {
                warn!("Submission of {} failed: {err}", self.spec.job_name);
                self.handle.mark_failed();
                Err(err)
            }
        }
    }

    fn check_preconditions(&mut self) -> Result<(), JobError> {
        let work_dir = &self.spec.remote_work_dir;
        info!("Checking remote working directory {}", work_dir.display());
        if self.channel.metadata(work_dir)? != Some(RemoteFileKind::Directory) {
            return Err(JobError::PathNotFound(work_dir.clone()));
        }
        if let ScriptSource::Remote(script) = &self.spec.script {
            if self.channel.metadata(script)? != Some(RemoteFileKind::File) {
                return Err(JobError::PathNotFound(script.clone()));
            }
        }
        Ok(())
    }

    fn stage_and_submit(&mut self, command: &str) -> Result<JobId, JobError> {
        let remote_script = self.spec.remote_script_path()?;
        if let ScriptSource::Local(local) = &self.spec.script {
            info!("Uploading {} to {}", local.display(), remote_script.display());
            self.channel
                .upload(local, &remote_script)
                .map_err(|err| transfer_failed(&remote_script, err, Vec::new()))?;
            self.handle.set_remote_script(remote_script.clone());

            let chmod = format!("chmod +x {}", shell_quote(&remote_script));
            let output = self
                .channel
                .run(&chmod)
                .map_err(|err| transfer_failed(&remote_script, err, Vec::new()))?;
            if !output.success() {
                return Err(JobError::TransferFailed {
                    path: remote_script,
                    reason: format!("can't make script executable: {}", output.stderr.trim()),
                    transferred: Vec::new(),
                });
            }
        } else {
            self.handle.set_remote_script(remote_script);
        }

        info!("Submitting {} to the scheduler", self.spec.job_name);
        let output = self.channel.run(command)?;
        interpret_submission(command, &output)
    }

    /// Ask the scheduler whether the job is still queued
    ///
    /// A job missing from the queue is reported `Completed`. The queue can't tell a job that
    /// finished cleanly from one that failed or was deleted, so neither can this.
    pub fn poll(&mut self) -> Result<JobState, JobError> {
        let id = match (self.handle.state(), self.handle.id()) {
            (JobState::Completed, _) => return Ok(JobState::Completed),
            (JobState::Submitted, Some(id)) => id.clone(),
            (state, _) => return Err(JobError::NotSubmitted(state)),
        };

        let output = self.channel.run(STATUS_COMMAND)?;
        if !output.success() {
            return Err(JobError::SchedulerRejected {
                command: STATUS_COMMAND.to_string(),
                stderr: output.stderr,
            });
        }

        let entries = parse_queue(&output.stdout);
        match find_entry(&entries, &id) {
            Some(entry) => debug!("Job {id} is still queued (state {})", entry.state),
            None => {
                info!("Job {id} is no longer queued, marking completed");
                self.handle.mark_completed();
            }
        }
        Ok(self.handle.state())
    }

    /// Poll until the job leaves the queue, sleeping `interval` between polls
    pub fn wait(&mut self, interval: Duration) -> Result<JobState, JobError> {
        loop {
            if self.poll()? == JobState::Completed {
                return Ok(JobState::Completed);
            }
            thread::sleep(interval);
        }
    }

    /// Ask the scheduler to delete the job
    ///
    /// The handle stays `Submitted`; the next poll sees the job gone and marks it completed.
    pub fn cancel(&mut self) -> Result<(), JobError> {
        let id = match (self.handle.state(), self.handle.id()) {
            (JobState::Completed, Some(id)) => {
                info!("Job {id} already finished, nothing to cancel");
                return Ok(());
            }
            (JobState::Submitted, Some(id)) => id.clone(),
            (state, _) => return Err(JobError::NotSubmitted(state)),
        };

        let command = cancel_command(&id);
        info!("Cancelling job {id}");
        let output = self.channel.run(&command)?;
        if !output.success() {
            return Err(JobError::SchedulerRejected { command, stderr: output.stderr });
        }
        Ok(())
    }

    /// Download everything the job left in its working directory
    ///
    /// The uploaded script is skipped, and so are the scheduler's stdout/stderr files unless
    /// `include_std_streams` is set. Files are downloaded one at a time into `local_dir`
    /// (created if missing); the first failure stops the batch and the error lists what was
    /// already transferred.
    pub fn retrieve_outputs(&mut self, local_dir: &Path, include_std_streams: bool) -> Result<Vec<String>, JobError> {
        if self.handle.state() != JobState::Completed {
            return Err(JobError::JobNotFinished(self.handle.state()));
        }

        fs::create_dir_all(local_dir).map_err(|err| JobError::TransferFailed {
            path: local_dir.to_path_buf(),
            reason: err.to_string(),
            transferred: Vec::new(),
        })?;

        let work_dir = self.handle.remote_work_dir().to_path_buf();
        info!("Listing outputs in {}", work_dir.display());
        let entries = self
            .channel
            .list_dir(&work_dir)
            .map_err(|err| transfer_failed(&work_dir, err, Vec::new()))?;

        let uploaded_script = match &self.spec.script {
            ScriptSource::Local(_) => self.spec.script.file_name(),
            ScriptSource::Remote(_) => None,
        };
        let pending: Vec<String> = entries
            .into_iter()
            .filter(|name| Some(name.as_str()) != uploaded_script)
            .filter(|name| include_std_streams || !self.handle.is_std_stream(name))
            .collect();
        info!("{} file(s) to download", pending.len());

        let mut transferred = Vec::with_capacity(pending.len());
        for name in pending {
            let remote = work_dir.join(&name);
            if let Err(err) = self.channel.download(&remote, &local_dir.join(&name)) {
                warn!("Download of {} failed after {} file(s)", remote.display(), transferred.len());
                return Err(transfer_failed(&remote, err, transferred));
            }
            transferred.push(name);
        }
        Ok(transferred)
    }
}

/// Turn the scheduler's answer to a submission into a job id
///
/// Rejection (only stderr) and a broken contract (nothing usable on stdout) are kept apart:
/// the first usually means the job definition is wrong, the second that something is off with
/// the scheduler or the connection.
fn interpret_submission(command: &str, output: &CommandOutput) -> Result<JobId, JobError> {
    let stderr = output.stderr.trim();
    if output.stdout.trim().is_empty() {
        if !stderr.is_empty() {
            return Err(JobError::SchedulerRejected {
                command: command.to_string(),
                stderr: output.stderr.clone(),
            });
        }
        return Err(JobError::UnparseableResponse {
            command: command.to_string(),
            stdout: output.stdout.clone(),
        });
    }

    match parse_job_id(&output.stdout) {
        Some(id) => {
            if !stderr.is_empty() || !output.success() {
                warn!("Scheduler accepted job {id} but reported (exit {}): {stderr}", output.exit_status);
            }
            Ok(id)
        }
        None if !output.success() && !stderr.is_empty() => Err(JobError::SchedulerRejected {
            command: command.to_string(),
            stderr: output.stderr.clone(),
        }),
        None => Err(JobError::UnparseableResponse {
            command: command.to_string(),
            stdout: output.stdout.clone(),
        }),
    }
}

fn transfer_failed(path: &Path, err: ChannelError, transferred: Vec<String>) -> JobError {
    JobError::TransferFailed {
        path: path.to_path_buf(),
        reason: err.to_string(),
        transferred,
    }
}
