use std::path::Path;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("Can't connect to {host}: {reason}")]
    Connect { host: String, reason: String },

    #[error("Remote command `{command}` exited with {status}: {stderr}")]
    CommandFailed { command: String, status: i32, stderr: String },

    #[error("Channel I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum RemoteFileKind {
    File,
    Directory,
}

/// Captured result of a remote command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_status: i32,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_status == 0
    }
}

/// Operations the orchestrator needs from a connection to the cluster
///
/// Methods take `&mut self`: a remote shell session isn't safe to share between concurrent
/// commands, so a channel belongs to one job at a time. All calls block until the remote side
/// answers; timeouts are the implementation's business.
pub trait RemoteChannel {
    /// `None` if nothing exists at `path`
    fn metadata(&mut self, path: &Path) -> Result<Option<RemoteFileKind>, ChannelError>;

    /// Names (not paths) of the entries directly inside `dir`
    fn list_dir(&mut self, dir: &Path) -> Result<Vec<String>, ChannelError>;

    fn upload(&mut self, local: &Path, remote: &Path) -> Result<(), ChannelError>;

    fn download(&mut self, remote: &Path, local: &Path) -> Result<(), ChannelError>;

    /// Run a command through the remote login shell
    ///
    /// A non-zero exit status is reported in the output, not as an error.
    fn run(&mut self, command: &str) -> Result<CommandOutput, ChannelError>;

    fn exists(&mut self, path: &Path) -> Result<bool, ChannelError> {
        Ok(self.metadata(path)?.is_some())
    }
}
