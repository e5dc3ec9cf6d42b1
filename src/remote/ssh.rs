use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::{self, Command, Output};
use std::sync::atomic::{AtomicUsize, Ordering};

use log::{debug, info, warn};

use crate::remote::channel::{ChannelError, CommandOutput, RemoteChannel, RemoteFileKind};
use crate::remote::config::ClusterConfig;

/// A channel backed by the system `ssh` and `scp` binaries
///
/// `connect` starts an ssh control master in the background; every later command and copy is
/// multiplexed over its socket, so a job's whole lifecycle uses one authenticated connection.
/// The master is shut down when the channel is dropped. Every channel owns its own master, also
/// when several channels reach the same host, so dropping one never cuts off another.
pub struct SshChannel {
    config: ClusterConfig,
    control_path: PathBuf,
}

impl SshChannel {
    pub fn connect(config: ClusterConfig) -> Result<Self, ChannelError> {
        config.validate().map_err(|err| ChannelError::Connect {
            host: config.host.clone(),
            reason: err.to_string(),
        })?;
        let control_path = control_path(&config);

        info!("Connecting to {} port {}", config.destination(), config.port);
        let mut master = Command::new("ssh");
        master
            .args(["-M", "-f", "-N", "-o", "ControlPersist=yes"])
            .args(common_options(&config, &control_path))
            .arg("-p")
            .arg(config.port.to_string())
            .arg(config.destination());
        debug!("{:?}", &master);

        let output = master.output()?;
        if !output.status.success() {
            return Err(ChannelError::Connect {
                host: config.host.clone(),
                reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        info!("Connected, control socket {}", control_path.display());
        Ok(SshChannel { config, control_path })
    }

    fn common_options(&self) -> Vec<OsString> {
        common_options(&self.config, &self.control_path)
    }

    fn ssh(&self) -> Command {
        let mut ssh = Command::new("ssh");
        ssh.args(self.common_options())
            .arg("-p")
            .arg(self.config.port.to_string())
            .arg(self.config.destination());
        ssh
    }

    fn scp(&self) -> Command {
        let mut scp = Command::new("scp");
        scp.args(["-q", "-r"])
            .args(self.common_options())
            .arg("-P")
            .arg(self.config.port.to_string());
        scp
    }

    fn remote_spec(&self, path: &Path) -> String {
        format!("{}:{}", self.config.destination(), path.display())
    }

    /// Like `run`, but a non-zero exit status is an error
    fn run_checked(&mut self, command: &str) -> Result<CommandOutput, ChannelError> {
        let output = self.run(command)?;
        if !output.success() {
            return Err(ChannelError::CommandFailed {
                command: command.to_string(),
                status: output.exit_status,
                stderr: output.stderr.trim().to_string(),
            });
        }
        Ok(output)
    }

    fn copy(&self, from: &str, to: &str) -> Result<(), ChannelError> {
        let mut scp = self.scp();
        scp.arg(from).arg(to);
        debug!("{:?}", &scp);
        let output = scp.output()?;
        let captured = capture(output);
        if !captured.success() {
            return Err(ChannelError::CommandFailed {
                command: format!("scp {from} {to}"),
                status: captured.exit_status,
                stderr: captured.stderr.trim().to_string(),
            });
        }
        Ok(())
    }
}

impl RemoteChannel for SshChannel {
    fn metadata(&mut self, path: &Path) -> Result<Option<RemoteFileKind>, ChannelError> {
        let quoted = shell_quote(path);
        let command = format!(
            "if [ -d {quoted} ]; then echo directory; elif [ -e {quoted} ]; then echo file; fi"
        );
        let output = self.run_checked(&command)?;
        Ok(match output.stdout.trim() {
            "directory" => Some(RemoteFileKind::Directory),
            "file" => Some(RemoteFileKind::File),
            _ => None,
        })
    }

    fn list_dir(&mut self, dir: &Path) -> Result<Vec<String>, ChannelError> {
        let output = self.run_checked(&format!("ls -1A {}", shell_quote(dir)))?;
        Ok(output
            .stdout
            .lines()
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect())
    }

    fn upload(&mut self, local: &Path, remote: &Path) -> Result<(), ChannelError> {
        debug!("scp {} -> {}", local.display(), remote.display());
        self.copy(&local.display().to_string(), &self.remote_spec(remote))
    }

    fn download(&mut self, remote: &Path, local: &Path) -> Result<(), ChannelError> {
        debug!("scp {} -> {}", remote.display(), local.display());
        self.copy(&self.remote_spec(remote), &local.display().to_string())
    }

    fn run(&mut self, command: &str) -> Result<CommandOutput, ChannelError> {
        let mut ssh = self.ssh();
        ssh.arg(command);
        debug!("Running remote command: {command}");
        Ok(capture(ssh.output()?))
    }
}

impl Drop for SshChannel {
    fn drop(&mut self) {
        let result = Command::new("ssh")
            .args(self.common_options())
            .args(["-O", "exit"])
            .arg(self.config.destination())
            .output();
        match result {
            Ok(output) if output.status.success() => debug!("Closed control connection"),
            Ok(output) => warn!(
                "Control connection didn't close cleanly: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            ),
            Err(err) => warn!("Can't close control connection: {err}"),
        }
    }
}

/// Channels created by this process so far
static CHANNELS: AtomicUsize = AtomicUsize::new(0);

/// Control socket unique to one channel: process id plus a per-process counter
fn control_path(config: &ClusterConfig) -> PathBuf {
    let control_dir = config.control_dir.clone().unwrap_or_else(std::env::temp_dir);
    let n = CHANNELS.fetch_add(1, Ordering::Relaxed);
    control_dir.join(format!("gridjob-{}-{}-{n}.sock", config.host, process::id()))
}

/// Options shared by the control master, commands and copies
fn common_options(config: &ClusterConfig, control_path: &Path) -> Vec<OsString> {
    let mut control = OsString::from("ControlPath=");
    control.push(control_path);
    let mut options: Vec<OsString> = vec![
        "-o".into(),
        "BatchMode=yes".into(),
        "-o".into(),
        format!("ConnectTimeout={}", config.connect_timeout_secs).into(),
        "-o".into(),
        control,
    ];
    if let Some(identity) = &config.identity_file {
        options.push("-i".into());
        options.push(identity.into());
    }
    options
}

/// Processes killed by a signal report exit status -1
fn capture(output: Output) -> CommandOutput {
    CommandOutput {
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        exit_status: output.status.code().unwrap_or(-1),
    }
}

/// Single-quote a path for the remote POSIX shell
pub fn shell_quote(path: &Path) -> String {
    format!("'{}'", path.display().to_string().replace('\'', r"'\''"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_control_paths_are_per_channel() {
        let mut config = ClusterConfig::new("log1.example.org", "me");
        config.control_dir = Some(PathBuf::from("/run/gridjob"));
        let first = control_path(&config);
        let second = control_path(&config);
        assert_ne!(first, second);
        assert!(first.starts_with("/run/gridjob"));
        let name = first.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with(&format!("gridjob-log1.example.org-{}-", process::id())));
    }

    #[test]
    fn test_shell_quote() {
        assert_eq!(shell_quote(Path::new("/scratch/run")), "'/scratch/run'");
        assert_eq!(shell_quote(Path::new("/a b/it's")), r"'/a b/it'\''s'");
    }

    #[test]
    fn test_capture_keeps_streams() {
        let output = Command::new("sh")
            .args(["-c", "echo out; echo err >&2; exit 3"])
            .output()
            .unwrap();
        let captured = capture(output);
        assert_eq!(captured.stdout, "out\n");
        assert_eq!(captured.stderr, "err\n");
        assert_eq!(captured.exit_status, 3);
        assert!(!captured.success());
    }
}
