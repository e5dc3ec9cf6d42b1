use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use log::{info, warn};
use rusqlite::Connection;

use gridjob::db::job::load::{load_job, load_jobs};
use gridjob::db::open::open_db;
use gridjob::job::spec::parse_time_limit;
use gridjob::scheduler::response::JobId;
use gridjob::{ClusterConfig, JobOrchestrator, JobSpec, JobState, ScriptSource, SshChannel, SubmissionFormatter};

#[derive(Parser, Debug)]
#[command(author, version, about = "Submit and track grid engine jobs on a remote cluster")]
struct Cli {
    /// Cluster connection settings (JSON)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// SQLite database of submitted jobs
    #[arg(long, default_value = "gridjob.db", global = true)]
    db: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Upload a script and submit it as an array job
    Submit(SubmitArgs),
    /// Check once whether a job is still queued
    Poll { id: String },
    /// Poll until a job leaves the queue
    Wait {
        id: String,
        /// Seconds between polls
        #[arg(long, default_value_t = 60)]
        interval: u64,
    },
    /// Download a finished job's outputs
    Retrieve {
        id: String,
        dest: PathBuf,
        /// Also download the scheduler's stdout/stderr files
        #[arg(long)]
        include_std_streams: bool,
    },
    /// Delete a job from the scheduler's queue
    Cancel { id: String },
    /// Show stored jobs
    List {
        /// Only jobs still submitted
        #[arg(long)]
        active: bool,
    },
}

#[derive(Args, Debug)]
struct SubmitArgs {
    /// Remote directory the job runs in and writes outputs to (must exist)
    work_dir: PathBuf,
    /// Conda environment to run the script in
    env: String,
    /// Job script, uploaded to the working directory unless --remote-script is set
    script: PathBuf,
    /// Arguments passed to the job script, space separated
    #[arg(short = 'A', long, default_value = "", allow_hyphen_values = true)]
    script_args: String,
    /// The name for the job
    #[arg(short = 'N', long)]
    job_name: Option<String>,
    /// The number of array tasks
    #[arg(short = 'n', long, default_value_t = 1)]
    n_tasks: u32,
    /// Time allocation, HH:MM:SS
    #[arg(short = 't', long, default_value = "02:00:00")]
    time_allocation: String,
    /// Memory allocation in GB
    #[arg(short = 'm', long, default_value_t = 3.0)]
    memory_allocation: f64,
    /// Hardware requirements, e.g. arch=x86_64,avx2=1
    #[arg(short = 'B', long, value_delimiter = ',')]
    hardware_requirements: Vec<String>,
    /// The script is already on the cluster at this path
    #[arg(long)]
    remote_script: bool,
    /// Print the submission command without connecting
    #[arg(long)]
    dry_run: bool,
}

fn main() -> Result<()> {
    env_logger::init();
    info!("terve! starting up :)");

    let cli = Cli::parse();
    match cli.command {
        Commands::Submit(args) => submit(cli.config.as_deref(), &cli.db, args),
        Commands::Poll { id } => poll(cli.config.as_deref(), &cli.db, &JobId::new(id), None),
        Commands::Wait { id, interval } => poll(
            cli.config.as_deref(),
            &cli.db,
            &JobId::new(id),
            Some(Duration::from_secs(interval)),
        ),
        Commands::Retrieve { id, dest, include_std_streams } => {
            retrieve(cli.config.as_deref(), &cli.db, &JobId::new(id), &dest, include_std_streams)
        }
        Commands::Cancel { id } => cancel(cli.config.as_deref(), &cli.db, &JobId::new(id)),
        Commands::List { active } => list(&cli.db, active),
    }
}

fn build_spec(args: &SubmitArgs) -> Result<JobSpec> {
    let script = match args.remote_script {
        true => ScriptSource::Remote(args.script.clone()),
        false => ScriptSource::Local(args.script.clone()),
    };
    let mut spec = JobSpec::new(&args.work_dir, &args.env, script)
        .with_script_args(args.script_args.split_whitespace())
        .with_task_count(args.n_tasks)
        .with_time_limit(parse_time_limit(&args.time_allocation)?)
        .with_memory_limit_gb(args.memory_allocation)
        .with_hardware_constraints(
            args.hardware_requirements
                .iter()
                .map(|item| item.trim())
                .filter(|item| !item.is_empty()),
        );
    if let Some(name) = &args.job_name {
        spec = spec.with_job_name(name);
    }
    Ok(spec)
}

fn connect(config: Option<&Path>) -> Result<SshChannel> {
    let path = config.context("--config is required to reach the cluster")?;
    let config = ClusterConfig::load(path)?;
    Ok(SshChannel::connect(config)?)
}

fn submit(config: Option<&Path>, db: &Path, args: SubmitArgs) -> Result<()> {
    let spec = build_spec(&args)?;

    if args.dry_run {
        info!("--dry-run set, printing submission command only");
        let command = SubmissionFormatter::new().format(&spec, &spec.remote_work_dir, &spec.remote_script_path()?)?;
        println!("{command}");
        return Ok(());
    }

    let conn = open_db(db)?;
    let mut orchestrator = JobOrchestrator::new(connect(config)?, spec);
    let result = orchestrator.submit().map(|handle| handle.id().cloned());
    if let Err(err) = &result {
        if err.is_precondition() {
            warn!("Nothing was changed on the cluster, fix the job and submit again");
        }
    }

    let id = match result {
        Ok(Some(id)) => id,
        Ok(None) => bail!("scheduler accepted the job without an id"),
        Err(err) => {
            // failed attempts are stored too, they record what was left on the cluster
            let handle = orchestrator.handle();
            if handle.state() != JobState::Unsubmitted {
                if let Err(db_err) = handle.insert(&conn, orchestrator.spec()) {
                    warn!("Can't store the failed attempt: {db_err:#}");
                }
            }
            return Err(err.into());
        }
    };

    // the id is shown even if storing fails
    println!("{id}");
    orchestrator
        .handle()
        .insert(&conn, orchestrator.spec())
        .with_context(|| format!("job {id} was submitted but couldn't be stored"))?;
    Ok(())
}

fn resume(config: Option<&Path>, conn: &Connection, id: &JobId) -> Result<JobOrchestrator<SshChannel>> {
    let (spec, handle) = load_job(conn, id)?.with_context(|| format!("No stored job with id {id}"))?;
    Ok(JobOrchestrator::resume(connect(config)?, spec, handle))
}

fn poll(config: Option<&Path>, db: &Path, id: &JobId, interval: Option<Duration>) -> Result<()> {
    let conn = open_db(db)?;
    let mut orchestrator = resume(config, &conn, id)?;
    let state = match interval {
        Some(interval) => orchestrator.wait(interval)?,
        None => orchestrator.poll()?,
    };
    orchestrator.handle().update(&conn)?;
    println!("{id} {state}");
    Ok(())
}

fn retrieve(config: Option<&Path>, db: &Path, id: &JobId, dest: &Path, include_std_streams: bool) -> Result<()> {
    let conn = open_db(db)?;
    let mut orchestrator = resume(config, &conn, id)?;
    if orchestrator.handle().state() == JobState::Submitted {
        orchestrator.poll()?;
        orchestrator.handle().update(&conn)?;
    }

    match orchestrator.retrieve_outputs(dest, include_std_streams) {
        Ok(files) => {
            for file in files {
                println!("{}", dest.join(file).display());
            }
            Ok(())
        }
        Err(gridjob::JobError::TransferFailed { path, reason, transferred }) => {
            for file in &transferred {
                println!("{}", dest.join(file).display());
            }
            warn!("{} file(s) transferred before the failure", transferred.len());
            bail!("Download of {} failed: {reason}", path.display())
        }
        Err(err) => Err(err.into()),
    }
}

fn cancel(config: Option<&Path>, db: &Path, id: &JobId) -> Result<()> {
    let conn = open_db(db)?;
    let mut orchestrator = resume(config, &conn, id)?;
    orchestrator.cancel()?;
    println!("{id} cancel requested");
    Ok(())
}

fn list(db: &Path, active: bool) -> Result<()> {
    let conn = open_db(db)?;
    let filter = active.then_some(JobState::Submitted);
    for job in load_jobs(&conn, filter)? {
        let handle = &job.handle;
        println!(
            "{}\t{}\t{}\t{}\t{}",
            handle.id().map(|id| id.to_string()).unwrap_or_else(|| "-".to_string()),
            handle.job_name(),
            handle.state(),
            handle.submitted_at().map(|at| at.to_rfc3339()).unwrap_or_else(|| "-".to_string()),
            handle.remote_work_dir().display(),
        );
    }
    Ok(())
}
