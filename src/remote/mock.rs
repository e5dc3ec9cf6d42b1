//! Scripted in-memory channel for tests

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use crate::remote::channel::{ChannelError, CommandOutput, RemoteChannel, RemoteFileKind};

/// Answers scheduler commands from canned outputs and records every call
#[derive(Debug, Default)]
pub(crate) struct MockChannel {
    pub dirs: HashSet<PathBuf>,
    pub files: HashSet<PathBuf>,
    pub listings: HashMap<PathBuf, Vec<String>>,
    pub qsub: CommandOutput,
    pub qstat: CommandOutput,
    pub qdel: CommandOutput,
    pub chmod: CommandOutput,
    pub fail_upload: bool,
    /// The connection drops on every call
    pub disconnected: bool,
    /// Commands, by first word, that fail as if the connection dropped
    pub drop_commands: HashSet<String>,
    /// Remote file names whose download fails
    pub fail_downloads: HashSet<String>,

    pub uploads: Vec<(PathBuf, PathBuf)>,
    pub downloads: Vec<PathBuf>,
    pub commands: Vec<String>,
}

impl MockChannel {
    pub fn with_dir(dir: &str) -> Self {
        let mut mock = MockChannel::default();
        mock.dirs.insert(PathBuf::from(dir));
        mock
    }

    pub fn accepting(dir: &str, stdout: &str) -> Self {
        let mut mock = MockChannel::with_dir(dir);
        mock.qsub = out(stdout, "", 0);
        mock
    }

    pub fn qsub_commands(&self) -> Vec<&String> {
        self.commands.iter().filter(|c| c.starts_with("qsub")).collect()
    }
}

pub(crate) fn out(stdout: &str, stderr: &str, exit_status: i32) -> CommandOutput {
    CommandOutput {
        stdout: stdout.to_string(),
        stderr: stderr.to_string(),
        exit_status,
    }
}

fn broken_pipe() -> ChannelError {
    ChannelError::Io(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "connection closed"))
}

impl RemoteChannel for MockChannel {
    fn metadata(&mut self, path: &Path) -> Result<Option<RemoteFileKind>, ChannelError> {
        if self.disconnected {
            return Err(broken_pipe());
        }
        if self.dirs.contains(path) {
            Ok(Some(RemoteFileKind::Directory))
        } else if self.files.contains(path) {
            Ok(Some(RemoteFileKind::File))
        } else {
            Ok(None)
        }
    }

    fn list_dir(&mut self, dir: &Path) -> Result<Vec<String>, ChannelError> {
        Ok(self.listings.get(dir).cloned().unwrap_or_default())
    }

    fn upload(&mut self, local: &Path, remote: &Path) -> Result<(), ChannelError> {
        if self.fail_upload {
            return Err(ChannelError::CommandFailed {
                command: "scp".to_string(),
                status: 1,
                stderr: "Permission denied".to_string(),
            });
        }
        self.uploads.push((local.to_path_buf(), remote.to_path_buf()));
        self.files.insert(remote.to_path_buf());
        Ok(())
    }

    fn download(&mut self, remote: &Path, _local: &Path) -> Result<(), ChannelError> {
        let name = remote.file_name().and_then(|n| n.to_str()).unwrap_or_default();
        if self.fail_downloads.contains(name) {
            return Err(ChannelError::CommandFailed {
                command: "scp".to_string(),
                status: 1,
                stderr: "Connection reset".to_string(),
            });
        }
        self.downloads.push(remote.to_path_buf());
        Ok(())
    }

    fn run(&mut self, command: &str) -> Result<CommandOutput, ChannelError> {
        self.commands.push(command.to_string());
        let program = command.split_whitespace().next().unwrap_or_default();
        if self.disconnected || self.drop_commands.contains(program) {
            return Err(broken_pipe());
        }
        let output = match program {
            "qsub" => self.qsub.clone(),
            "qstat" => self.qstat.clone(),
            "qdel" => self.qdel.clone(),
            "chmod" => self.chmod.clone(),
            _ => CommandOutput::default(),
        };
        Ok(output)
    }
}
