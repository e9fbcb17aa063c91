//! Command-line interface for sttq.
//!
//! Provides commands for running the worker loop, pulling a single task,
//! publishing and collecting results, and feeding new tasks into the queue.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::{info, warn};

use crate::adapters::{BilibiliClient, VideoLookup, VideoMetadataProvider};
use crate::config::QueueConfig;
use crate::core::selector::list_visible_files;
use crate::core::{
    collect, default_batch_name, enqueue, pending_count, publish_pending, retry, take_next,
    Collaborators, DriveOptions, Driver, DurationMode, QueueError, QueueRepository, RunLock,
    Selection, SelectionPolicy, WorkList,
};
use crate::domain::{Disposition, Task};

/// sttq - git-backed queue for video transcription jobs
#[derive(Parser, Debug)]
#[command(name = "sttq")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Config file (defaults to ./config.json)
    #[arg(short, long, global = true, env = "STTQ_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Pull, process and publish tasks until the queue drains or the cap is hit
    Run {
        /// Skip videos longer than this many seconds (0 = no limit)
        #[arg(short, long)]
        max_duration: Option<u64>,

        /// Maximum pull/process/publish iterations (0 = until drained)
        #[arg(short, long)]
        iterations: Option<u32>,

        /// Task selection policy
        #[arg(short, long, value_enum, default_value = "fifo")]
        policy: PolicyArg,

        /// Duration bound in seconds for the duration policies
        #[arg(short, long)]
        limit: Option<u64>,

        /// Do not collect the outbox when the run ends
        #[arg(long)]
        no_collect: bool,
    },

    /// Take one task from the queue into the local work list
    Pull {
        /// Task selection policy
        #[arg(short, long, value_enum, default_value = "fifo")]
        policy: PolicyArg,

        /// Duration bound in seconds for the duration policies
        #[arg(short, long)]
        limit: Option<u64>,
    },

    /// Publish result files left in the output directory
    Publish,

    /// Move processed results out of the queue into a local directory
    Collect {
        /// Destination directory (defaults to collect_directory)
        #[arg(short, long)]
        dest: Option<PathBuf>,
    },

    /// Add tasks to the queue as a new batch file
    Enqueue {
        /// Task lines (video URLs or JSON objects)
        lines: Vec<String>,

        /// Read task lines from a file (defaults to bv_list_file)
        #[arg(short, long)]
        file: Option<PathBuf>,

        /// Batch file name (defaults to a timestamp)
        #[arg(short, long)]
        batch: Option<String>,

        /// Look up metadata and enqueue JSON tasks
        #[arg(short, long)]
        resolve: bool,
    },

    /// Show pending tasks and results
    Status,

    /// Show resolved configuration (debug)
    Config,
}

/// Selection policy for CLI (maps to SelectionPolicy)
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum PolicyArg {
    /// First task of the first batch file
    Fifo,

    /// First task shorter than --limit
    LessThan,

    /// First task longer than --limit, else the first task
    BetterGreaterThan,
}

impl PolicyArg {
    /// Combine with the `--limit` flag
    pub fn with_limit(self, limit: Option<u64>) -> Result<SelectionPolicy> {
        let mode = match self {
            PolicyArg::Fifo => return Ok(SelectionPolicy::Fifo),
            PolicyArg::LessThan => DurationMode::LessThan,
            PolicyArg::BetterGreaterThan => DurationMode::BetterGreaterThan,
        };
        let limit = limit.context("--limit is required for duration policies")?;
        Ok(SelectionPolicy::DurationBounded { limit, mode })
    }
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(self) -> Result<()> {
        let config = QueueConfig::load(self.config.as_deref())?;

        match self.command {
            Commands::Run {
                max_duration,
                iterations,
                policy,
                limit,
                no_collect,
            } => {
                let mut options = DriveOptions::from_config(&config);
                options.policy = policy.with_limit(limit)?;
                if let Some(max_duration) = max_duration {
                    options.max_duration = max_duration;
                }
                if let Some(iterations) = iterations {
                    options.max_iterations = iterations;
                }
                if no_collect {
                    options.collect_on_drain = false;
                }
                run_worker(&config, &options).await
            }
            Commands::Pull { policy, limit } => pull(&config, policy.with_limit(limit)?).await,
            Commands::Publish => publish_results(&config).await,
            Commands::Collect { dest } => {
                let dest = dest.unwrap_or_else(|| config.collect_directory.clone());
                collect_results(&config, &dest).await
            }
            Commands::Enqueue {
                lines,
                file,
                batch,
                resolve,
            } => enqueue_tasks(&config, lines, file, batch, resolve).await,
            Commands::Status => show_status(&config).await,
            Commands::Config => show_config(&config),
        }
    }
}

/// Open the queue clone described by the config
async fn open_repository(config: &QueueConfig) -> Result<QueueRepository> {
    let repo = QueueRepository::open(&config.queue_directory)
        .await
        .with_context(|| {
            format!(
                "Failed to open queue repository: {}",
                config.queue_directory.display()
            )
        })?;
    Ok(repo
        .with_id(config.commit_id())
        .with_git_timeout(config.git_timeout()))
}

/// Run the worker loop
async fn run_worker(config: &QueueConfig, options: &DriveOptions) -> Result<()> {
    let repo = open_repository(config).await?;
    let collaborators = Collaborators::from_config(config)?;
    let mut driver = Driver::new(config, repo, collaborators);

    let report = driver.run(options).await?;

    eprintln!();
    eprintln!("[Run finished after {} iterations]", report.iterations);
    for disposition in Disposition::ALL {
        let count = report.count(disposition);
        if count > 0 {
            eprintln!("   {:<9} {}", disposition, count);
        }
    }
    eprintln!("   Published: {}", report.published);
    eprintln!("   Collected: {}", report.collected);
    if report.drained {
        eprintln!("   Queue drained");
    }
    if let Some(pending) = report.unmatched {
        eprintln!("   {} tasks left, none under the duration bound", pending);
    }
    Ok(())
}

/// Take a single task; exits with 1 when nothing was selected
async fn pull(config: &QueueConfig, policy: SelectionPolicy) -> Result<()> {
    let repo = open_repository(config).await?;
    let _lock = RunLock::acquire(&config.temp_directory)?;
    let worklist = WorkList::new(&config.dst_file);

    match take_next(&repo, &config.sync_retry, &policy, &worklist).await? {
        Selection::Selected { task, .. } => {
            println!("{}", task.line());
            eprintln!("[Appended to {}]", worklist.path().display());
            Ok(())
        }
        Selection::NoMatch { pending } => {
            eprintln!("No task matches the policy ({} pending)", pending);
            std::process::exit(1);
        }
        Selection::QueueEmpty => {
            eprintln!("Queue is empty");
            std::process::exit(1);
        }
    }
}

async fn publish_results(config: &QueueConfig) -> Result<()> {
    let repo = open_repository(config).await?;
    let count = publish_pending(&repo, &config.sync_retry, &config.output_directory).await?;
    eprintln!("[Published {} files]", count);
    Ok(())
}

async fn collect_results(config: &QueueConfig, dest: &Path) -> Result<()> {
    let repo = open_repository(config).await?;
    let files = collect(&repo, &config.sync_retry, dest).await?;
    for file in &files {
        println!("{}", file.display());
    }
    eprintln!("[Collected {} files into {}]", files.len(), dest.display());
    Ok(())
}

/// Gather task lines from arguments and/or a file
fn read_task_lines(
    config: &QueueConfig,
    lines: Vec<String>,
    file: Option<PathBuf>,
) -> Result<Vec<Task>> {
    let file = match file {
        Some(file) => Some(file),
        None if lines.is_empty() => Some(
            config
                .bv_list_file
                .clone()
                .context("No task lines given and bv_list_file is not configured")?,
        ),
        None => None,
    };

    let mut tasks: Vec<Task> = lines.iter().filter_map(|l| Task::parse_line(l)).collect();
    if let Some(file) = file {
        let content = std::fs::read_to_string(&file)
            .with_context(|| format!("Failed to read task file: {}", file.display()))?;
        tasks.extend(content.lines().filter_map(Task::parse_line));
    }
    Ok(tasks)
}

/// Replace raw lines by JSON tasks carrying looked-up metadata.
///
/// Videos that cannot be downloaded are dropped; lookups that keep failing
/// leave the raw line in place.
async fn resolve_tasks(config: &QueueConfig, tasks: Vec<Task>) -> Result<Vec<Task>> {
    let client = BilibiliClient::with_api_base(config.api_base.clone(), config.network_timeout())?;
    let mut resolved = Vec::with_capacity(tasks.len());

    for task in tasks {
        if task.metadata().is_some_and(|m| m.cid.is_some()) {
            resolved.push(task);
            continue;
        }
        let Some(bvid) = task.bvid() else {
            warn!(line = %task.line(), "No video id, enqueueing line as is");
            resolved.push(task);
            continue;
        };

        let client = &client;
        let id = bvid.as_str();
        let lookup = retry(&config.retry, &format!("look up {}", bvid), move || async move {
            client.get_video(id).await.map_err(QueueError::from)
        })
        .await;

        match lookup {
            Ok(VideoLookup::Found(metadata)) => {
                info!(%bvid, title = ?metadata.title, "Resolved");
                resolved.push(Task::from_metadata(metadata)?);
            }
            Ok(VideoLookup::Pending(reason)) => {
                warn!(%bvid, %reason, "Video under review, enqueueing raw line");
                resolved.push(task);
            }
            Ok(VideoLookup::NotFound(reason)) | Ok(VideoLookup::Forbidden(reason)) => {
                warn!(%bvid, %reason, "Skipping video");
            }
            Err(e) => {
                warn!(%bvid, error = %e, "Lookup failed, enqueueing raw line");
                resolved.push(task);
            }
        }
    }

    Ok(resolved)
}

async fn enqueue_tasks(
    config: &QueueConfig,
    lines: Vec<String>,
    file: Option<PathBuf>,
    batch: Option<String>,
    resolve: bool,
) -> Result<()> {
    let mut tasks = read_task_lines(config, lines, file)?;
    if resolve {
        tasks = resolve_tasks(config, tasks).await?;
    }
    if tasks.is_empty() {
        eprintln!("No tasks to enqueue");
        return Ok(());
    }

    let repo = open_repository(config).await?;
    let batch = batch.unwrap_or_else(default_batch_name);
    let count = enqueue(&repo, &config.sync_retry, &tasks, &batch).await?;
    eprintln!("[Enqueued {} tasks into {}]", count, batch);
    Ok(())
}

async fn show_status(config: &QueueConfig) -> Result<()> {
    let repo = open_repository(config).await?;
    repo.sync_with_retry(&config.sync_retry).await?;

    let pending = pending_count(&repo.inbox())?;
    let batches = list_visible_files(&repo.inbox())?.len();
    let results = list_visible_files(&repo.outbox())?.len();
    let local = WorkList::new(&config.dst_file).pending()?.len();
    let unpublished = list_visible_files(&config.output_directory)?.len();

    println!("Queue:       {}", repo.workdir().display());
    println!("  Pending tasks:     {} (in {} batch files)", pending, batches);
    println!("  Results in outbox: {}", results);
    println!();
    println!("Local:");
    println!("  Work list:         {} ({} tasks)", config.dst_file.display(), local);
    println!("  Unpublished files: {}", unpublished);
    Ok(())
}

/// Show the resolved configuration (for debugging)
fn show_config(config: &QueueConfig) -> Result<()> {
    println!(
        "Config file: {}",
        config
            .config_file
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(none - using defaults)".to_string())
    );
    println!(
        "Commit id:   {}",
        config.commit_id().unwrap_or_else(|| "(none)".to_string())
    );
    println!("Dispositions: {}", config.disposition_dir().display());
    println!();
    println!(
        "{}",
        serde_json::to_string_pretty(config).context("Failed to serialize config")?
    );
    Ok(())
}
