use batchmix::builder::BatchFile;
use batchmix::domain::{TaskEvent, TaskState};
use batchmix::planner::{CombinationIndex, CombinationPlanner, PoolSource, SortConfig, UsageLedger};
use batchmix::scheduler::{ConcurrencyConfig, Scheduler, SchedulerHandle};
use batchmix::system::{CpuInfo, HostSampler};
use clap::Parser;
use colored::*;
use eyre::{Context, Result, bail};
use log::info;
use serde::Serialize;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

mod cli;
mod config;

use cli::Cli;
use cli::commands::Commands;
use config::Config;

/// Gap between the two host samples of `stats`
const STATS_SAMPLE_INTERVAL: Duration = Duration::from_millis(500);

fn setup_logging(default_level: &str) -> Result<()> {
    // Create log directory
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("batchmix")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    let log_file = log_dir.join("batchmix.log");

    // Setup env_logger with file output
    let target = Box::new(
        fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_file)
            .context("Failed to open log file")?,
    );

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .target(env_logger::Target::Pipe(target))
        .init();

    info!("Logging initialized, writing to: {}", log_file.display());
    Ok(())
}

fn run_application(cli: &Cli, config: &Config) -> Result<()> {
    info!("Starting application");

    if cli.is_verbose() {
        println!("{}", "Verbose mode enabled".yellow());
    }

    match &cli.command {
        Commands::Plan {
            pools,
            count,
            sort,
            descending,
        } => handle_plan_command(pools, *count, sort, *descending),
        Commands::Run { batch, jobs, threads } => {
            let runtime = tokio::runtime::Runtime::new().context("Failed to start runtime")?;
            runtime.block_on(handle_run_command(batch, *jobs, *threads, config, cli.is_verbose()))
        }
        Commands::Stats => handle_stats_command(),
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PlanReport<'a> {
    pool_sizes: &'a [usize],
    max_combinations: u128,
    combinations: &'a [CombinationIndex],
    files: Vec<Vec<PathBuf>>,
    ledger: &'a UsageLedger,
}

fn handle_plan_command(pools_path: &Path, count: usize, sort: &[usize], descending: bool) -> Result<()> {
    info!("Planning {} combinations from {}", count, pools_path.display());

    let content = fs::read_to_string(pools_path).context("Failed to read pools file")?;
    let sources: Vec<PoolSource> = serde_yaml::from_str(&content).context("Failed to parse pools file")?;
    let pools = sources
        .iter()
        .map(PoolSource::resolve)
        .collect::<batchmix::Result<Vec<_>>>()
        .context("Failed to resolve pools")?;

    let sort = (!sort.is_empty()).then(|| SortConfig::by(sort.to_vec()).with_ascending(!descending));
    let planner = CombinationPlanner::for_pools(&pools);
    let plan = planner.plan(count, sort.as_ref()).context("Planning failed")?;

    let files = plan
        .combinations
        .iter()
        .map(|tuple| {
            tuple
                .iter()
                .zip(&pools)
                .filter_map(|(&index, pool)| pool.get(index).cloned())
                .collect()
        })
        .collect();

    let report = PlanReport {
        pool_sizes: planner.pool_sizes(),
        max_combinations: planner.max_combinations(),
        combinations: &plan.combinations,
        files,
        ledger: &plan.ledger,
    };
    println!("{}", serde_json::to_string_pretty(&report).context("Failed to serialize plan")?);
    Ok(())
}

async fn handle_run_command(
    batch_path: &Path,
    jobs: Option<usize>,
    threads: Option<u32>,
    config: &Config,
    verbose: bool,
) -> Result<()> {
    info!("Running batch: {}", batch_path.display());

    let base = config.concurrency();
    let concurrency = ConcurrencyConfig::new(
        jobs.unwrap_or(base.max_concurrent_tasks),
        threads.unwrap_or(base.threads_per_task),
    );

    let batch = BatchFile::load(batch_path).context("Failed to load batch file")?;
    let prepared = batch
        .prepare(config.retry.max_retry, concurrency.threads_per_task)
        .context("Failed to prepare batch")?;

    if prepared.tasks.is_empty() {
        println!("{}", "No jobs planned (a pool is empty or count is 0)".yellow());
        return Ok(());
    }

    println!(
        "{} {} jobs over pools {:?} ({} distinct combinations), {} at a time",
        "Planned:".green(),
        prepared.tasks.len(),
        prepared.pool_sizes,
        prepared.max_combinations,
        concurrency.max_concurrent_tasks
    );

    let scheduler = Scheduler::new(Arc::new(config.process_engine()))
        .with_concurrency(concurrency)
        .with_retry(config.retry_policy())
        .with_kill_grace(config.kill_grace())
        .spawn();

    let names: HashMap<String, String> = prepared
        .tasks
        .iter()
        .map(|task| (task.id.clone(), task.name.clone()))
        .collect();
    let total = prepared.tasks.len();

    // Subscribe before submitting so no event is missed
    let events = scheduler.subscribe(None);
    scheduler.submit_all(prepared.tasks).await.context("Failed to submit jobs")?;

    stream_events(&scheduler, events, &names, total, verbose).await?;

    scheduler.wait_idle().await.context("Scheduler stopped unexpectedly")?;
    let stats = scheduler.stats().await.context("Failed to read scheduler stats")?;
    scheduler.shutdown().await.context("Failed to stop scheduler")?;

    let summary = stats.summary;
    println!(
        "{} {} completed, {} failed, {} cancelled of {}",
        "Summary:".green(),
        summary.completed.to_string().green(),
        summary.failed.to_string().red(),
        summary.cancelled.to_string().yellow(),
        summary.total
    );

    if summary.failed > 0 {
        bail!("{} of {} jobs failed", summary.failed, summary.total);
    }
    Ok(())
}

async fn stream_events(
    scheduler: &SchedulerHandle,
    mut events: batchmix::events::EventStream,
    names: &HashMap<String, String>,
    total: usize,
    verbose: bool,
) -> Result<()> {
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let mut finished = 0;
    while finished < total {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else { break };
                if event.is_terminal() {
                    finished += 1;
                }
                print_event(&event, names, verbose);
            }
            _ = &mut ctrl_c => {
                println!("{}", "Interrupted, cancelling remaining jobs...".yellow());
                scheduler.shutdown().await.context("Failed to stop scheduler")?;
                bail!("Interrupted after {} of {} jobs", finished, total);
            }
        }
    }
    Ok(())
}

fn print_event(event: &TaskEvent, names: &HashMap<String, String>, verbose: bool) {
    let name = names
        .get(event.task_id())
        .map(String::as_str)
        .unwrap_or_else(|| event.task_id());

    match event {
        TaskEvent::Started { attempt, .. } if *attempt > 1 => {
            println!("{} {} (attempt {})", "Started:".cyan(), name, attempt);
        }
        TaskEvent::Started { .. } => println!("{} {}", "Started:".cyan(), name),
        TaskEvent::Updated { task } if task.state == TaskState::Queued && task.attempts > 0 => {
            let error = task.last_error.as_deref().unwrap_or("unknown error");
            println!("{} {}: {}", "Retrying:".yellow(), name, error);
        }
        TaskEvent::Progress { progress, .. } if verbose => {
            println!("  {} {:.0}%", name.dimmed(), progress);
        }
        TaskEvent::Log { log, .. } if verbose => println!("  {} {}", name.dimmed(), log.dimmed()),
        TaskEvent::Completed { outputs, .. } => {
            println!("{} {}", "Completed:".green(), name);
            for output in outputs {
                println!("  {}", output);
            }
        }
        TaskEvent::Failed { error, .. } => println!("{} {}: {}", "Failed:".red(), name, error),
        TaskEvent::Cancelled { .. } => println!("{} {}", "Cancelled:".yellow(), name),
        _ => {}
    }
}

fn handle_stats_command() -> Result<()> {
    info!("Sampling host stats");

    let mut sampler = HostSampler::new();
    sampler.sample();
    std::thread::sleep(STATS_SAMPLE_INTERVAL);
    let stats = sampler.sample();
    let cpu = CpuInfo::detect();

    println!("{} {}", "Cores:".green(), cpu.cores);
    println!("{} {:.1}%", "CPU:".green(), stats.cpu.usage);
    for (core, usage) in stats.cpu.per_core_usage.iter().enumerate() {
        println!("  cpu{:<3} {:>5.1}%", core, usage);
    }
    println!(
        "{} {:.1}% ({} / {} MiB)",
        "Memory:".green(),
        stats.memory.used_percent,
        stats.memory.used_bytes / (1024 * 1024),
        stats.memory.total_bytes / (1024 * 1024)
    );
    Ok(())
}

fn main() -> Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Load configuration
    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;

    // The config's log level is the default filter; RUST_LOG still wins
    let level = config.log_level.clone().unwrap_or_else(|| "info".to_string());
    setup_logging(&level).context("Failed to setup logging")?;

    info!("Starting with config from: {:?}", cli.config);

    // Run the main application logic
    run_application(&cli, &config).context("Application failed")?;

    Ok(())
}
