//! Sumi-Sweep main entry point
//!
//! This is the command-line interface for creating, advancing and inspecting
//! resumable crawl jobs.

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use sumi_sweep::bus::{ContinueCrawl, MessageBus, SqliteMessageBus};
use sumi_sweep::config::{load_config_with_hash, Config};
use sumi_sweep::crawler::{build_http_client, EngineSettings, HttpEngine, SessionFactory};
use sumi_sweep::index::SqliteIndexSink;
use sumi_sweep::job::{Caller, JobId};
use sumi_sweep::output::{print_job, print_job_list, report_path};
use sumi_sweep::storage::{open_storage, SharedStorage};
use sumi_sweep::worker::META_OBSERVERS;
use sumi_sweep::{CrawlWorker, Jobs, WindowOutcome};
use tracing_subscriber::EnvFilter;

/// Sumi-Sweep: resumable, observer-driven site sweeps
///
/// Crawls the published sites of the configuration in short windows,
/// auditing link health and indexing pages. Each window is started by a
/// queued continuation message, so a sweep survives process restarts.
#[derive(Parser, Debug)]
#[command(name = "sumi-sweep")]
#[command(version = "1.0.0")]
#[command(about = "Resumable, observer-driven site sweeps", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose", global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create a crawl job and queue its first window
    Create {
        /// Observers to attach (defaults to the configured list)
        #[arg(long, value_delimiter = ',')]
        observers: Option<Vec<String>>,

        /// Make the job visible to everyone
        #[arg(long)]
        public: bool,

        /// Create the job on behalf of this user instead of the system
        #[arg(long, value_name = "ID")]
        user: Option<String>,
    },

    /// Run one window per queued continuation message
    Work {
        /// Stop after this many messages
        #[arg(long, value_name = "N")]
        max_messages: Option<u32>,
    },

    /// Run one window for a job right away
    Resume {
        #[arg(value_name = "JOB_ID")]
        job_id: String,
    },

    /// List new and pending jobs visible to a user
    List {
        #[arg(long, value_name = "ID")]
        user: Option<String>,
    },

    /// Show a job's status, progress, warnings and observer results
    Show {
        #[arg(value_name = "JOB_ID")]
        job_id: String,
    },

    /// Print the path of a job's crawl report
    Report {
        #[arg(value_name = "JOB_ID")]
        job_id: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("Failed to load {}", cli.config.display()))?;
    tracing::debug!("Configuration loaded (hash: {})", config_hash);

    let storage = SharedStorage::new(
        open_storage(Path::new(&config.output.database_path))
            .with_context(|| format!("Failed to open {}", config.output.database_path))?,
    );

    match cli.command {
        Command::Create {
            observers,
            public,
            user,
        } => handle_create(&config, storage, observers, public, user),
        Command::Work { max_messages } => {
            let worker = build_worker(config, config_hash, storage)?;
            let handled = worker.drain(max_messages).await?;
            println!("Handled {} continuation message(s)", handled);
            Ok(())
        }
        Command::Resume { job_id } => {
            let job_id = JobId::parse(&job_id)?;
            let worker = build_worker(config, config_hash, storage)?;
            match worker.resume(job_id).await? {
                WindowOutcome::Skipped => println!("Nothing to do for job {}", job_id),
                WindowOutcome::Pending { progress } => {
                    println!("Job {} is pending at {:.1}%", job_id, progress)
                }
                WindowOutcome::Completed => println!("Job {} completed", job_id),
            }
            Ok(())
        }
        Command::List { user } => {
            let jobs = Jobs::new(storage, user.map(Caller::new));
            print_job_list(&jobs.find_my_new_or_pending()?);
            Ok(())
        }
        Command::Show { job_id } => {
            let job_id = JobId::parse(&job_id)?;
            match Jobs::system(storage).get_by_uuid(job_id)? {
                Some(job) => print_job(&job),
                None => bail!("Job {} not found", job_id),
            }
            Ok(())
        }
        Command::Report { job_id } => {
            let job_id = JobId::parse(&job_id)?;
            let path = report_path(Path::new(&config.output.report_dir), &job_id.to_string());
            if !path.exists() {
                bail!("No report for job {} (is it completed?)", job_id);
            }
            println!("{}", path.display());
            Ok(())
        }
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("sumi_sweep=info,warn"),
            1 => EnvFilter::new("sumi_sweep=debug,info"),
            2 => EnvFilter::new("sumi_sweep=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Wires the engine, index sink and message bus into a worker
fn build_worker(
    config: Config,
    config_hash: String,
    storage: SharedStorage,
) -> anyhow::Result<CrawlWorker> {
    let client = build_http_client(&config.user_agent, config.crawler.request_timeout_secs)
        .context("Failed to build HTTP client")?;

    let engine = HttpEngine::new(
        client,
        storage.clone(),
        EngineSettings {
            max_concurrent_requests: config.crawler.max_concurrent_requests,
            max_depth: config.crawler.max_depth,
            config_hash,
        },
    );

    let config = Arc::new(config);
    let factory = SessionFactory::new(
        config.clone(),
        Arc::new(engine),
        Arc::new(SqliteIndexSink::new(storage.clone())),
    );
    let bus = Arc::new(SqliteMessageBus::new(storage.clone()));

    Ok(CrawlWorker::new(Jobs::system(storage), factory, bus, &config))
}

/// Creates a crawl job and dispatches its first continuation
fn handle_create(
    config: &Config,
    storage: SharedStorage,
    observers: Option<Vec<String>>,
    public: bool,
    user: Option<String>,
) -> anyhow::Result<()> {
    let requested = observers.unwrap_or_else(|| config.observers.enabled.clone());
    let names = SessionFactory::resolve_observer_names(&requested)?;

    let jobs = Jobs::new(storage.clone(), user.map(Caller::new));
    let mut job = jobs
        .create_job("crawl")?
        .with_metadata(META_OBSERVERS, Value::from(names));
    if public {
        job = job.with_public(true)?;
    }
    jobs.persist(&job)?;

    SqliteMessageBus::new(storage)
        .dispatch(ContinueCrawl::new(job.id()))
        .context("Job created but its first window could not be queued")?;

    tracing::info!(job = %job.id(), "Queued crawl job");
    println!("{}", job.id());
    Ok(())
}
