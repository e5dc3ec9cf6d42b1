use std::path::Path;

use log::debug;
use serde::Serialize;
use tinytemplate::TinyTemplate;

use crate::error::JobError;
use crate::job::spec::{format_time_limit, JobSpec};

/// included submission template
static QSUB: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/data/templates/qsub.txt"));

/// Renders a job spec into the scheduler's submission command
///
/// The command is a single `qsub` line followed by an inline job script (a quoted heredoc, so
/// the remote shell doesn't expand anything in it). Rendering is a pure function of its inputs:
/// the same spec and paths always produce byte-identical text.
///
/// Resource options encoded on the command line:
/// - working directory (`-wd`), so the job doesn't start in the login shell's home
/// - job name (`-N`)
/// - array task range `1-N` (`-t`)
/// - time limit (`-l h_rt`)
/// - memory limit (`-l mem_free`)
/// - stdout and stderr directory (`-o`, `-e`)
/// - hardware constraints, one `-l` each, in the caller's order
pub struct SubmissionFormatter {
    template: &'static str,
}

/// Rendering context for the submission template
#[derive(Serialize)]
struct SubmissionContext {
    name: String,
    task_count: u32,
    time_limit: String,
    memory: String,
    work_dir: String,
    environment: String,
    script: String,
    constraints: Vec<String>,
    args: Vec<String>,
}

impl Default for SubmissionFormatter {
    fn default() -> Self {
        SubmissionFormatter { template: QSUB }
    }
}

impl SubmissionFormatter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn format(&self, spec: &JobSpec, remote_work_dir: &Path, remote_script_path: &Path) -> Result<String, JobError> {
        spec.validate()?;
        let work_dir = bare_word(remote_work_dir, "remote working directory")?;
        let script = bare_word(remote_script_path, "remote script path")?;
        for constraint in &spec.hardware_constraints {
            validate_constraint(constraint)?;
        }

        let mut tt = TinyTemplate::new();
        tt.set_default_formatter(&tinytemplate::format_unescaped);
        tt.add_template("qsub", self.template)?;

        let context = SubmissionContext {
            name: spec.job_name.clone(),
            task_count: spec.task_count,
            time_limit: format_time_limit(spec.time_limit),
            memory: format_memory(spec.memory_limit_gb),
            work_dir,
            environment: spec.environment_name.clone(),
            script,
            constraints: spec.hardware_constraints.clone(),
            args: spec.script_args.clone(),
        };
        let command = tt.render("qsub", &context)?;
        debug!("Rendered submission command:\n{command}");
        Ok(command)
    }
}

/// Memory in the scheduler's unit suffix: whole gigabytes as `G`, anything else in megabytes
pub fn format_memory(gb: f64) -> String {
    if gb.fract() == 0.0 {
        format!("{}G", gb as u64)
    } else {
        format!("{}M", (gb * 1024.0).ceil() as u64)
    }
}

/// Hardware constraints are `-l` resource requests: `key=value` with the value possibly a list
/// or a wildcard pattern, e.g. `arch=lx-amd64` or `hostname=n1*,n2*`
fn validate_constraint(constraint: &str) -> Result<(), JobError> {
    if constraint.is_empty() {
        return Err(JobError::InvalidSpec("hardware constraint is empty".to_string()));
    }
    if let Some(bad) = constraint
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '_' | '=' | '.' | ',' | ':' | '*' | '-')))
    {
        return Err(JobError::InvalidSpec(format!(
            "hardware constraint {constraint:?} contains forbidden character {bad:?}"
        )));
    }
    Ok(())
}

/// Paths are spliced into the command unquoted, so only characters the shell reads literally
/// are accepted
fn bare_word(path: &Path, what: &str) -> Result<String, JobError> {
    let text = path
        .to_str()
        .ok_or_else(|| JobError::InvalidSpec(format!("{what} {} is not valid UTF-8", path.display())))?;
    if text.is_empty() {
        return Err(JobError::InvalidSpec(format!("{what} is empty")));
    }
    if let Some(bad) = text
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '/' | '_' | '-' | '.' | '+' | ',' | ':' | '@' | '%')))
    {
        return Err(JobError::InvalidSpec(format!("{what} {text:?} contains forbidden character {bad:?}")));
    }
    Ok(text.to_string())
}
