//! Group-Harvest main entry point
//!
//! This is the command-line control surface for the collector: it wires the
//! coordinator, the message bus and the log sink together, starts or resumes
//! a run, and prints progress until the run settles.

use anyhow::{anyhow, Context};
use clap::Parser;
use group_harvest::bus::{
    CollectionEvent, Command, CommandReply, EventStream, MessageBus, Responder, Subscription,
    DEFAULT_STREAM_CAPACITY,
};
use group_harvest::collector::{
    build_http_client, BurstCooldownPolicy, BusExtractor, CollectionCoordinator, ControlService,
    HtmlPageScript, HttpBrowser, TabOptions,
};
use group_harvest::config::{load_config_with_hash, Config};
use group_harvest::logging::{BusLogLayer, LogSink};
use group_harvest::model::{LogEntry, RunStatus};
use group_harvest::output::{load_report, print_logs, print_report, write_csv};
use group_harvest::storage::{open_storage, RunStore};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

/// How long the control surface waits for a command reply
const COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

/// Group-Harvest: a paced collector for group pages
///
/// Group-Harvest visits a queue of group pages one background tab at a time,
/// extracts posts and comments, and checkpoints progress after every group so
/// an interrupted run picks up where it left off.
#[derive(Parser, Debug)]
#[command(name = "group-harvest")]
#[command(version = "0.1.0")]
#[command(about = "A paced collector for group pages", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Resume an interrupted run and fail if there is none
    #[arg(long, conflicts_with = "fresh")]
    resume: bool,

    /// Start a fresh run, discarding any interrupted one
    #[arg(long, conflicts_with = "resume")]
    fresh: bool,

    /// Synthesize records instead of visiting pages
    #[arg(long)]
    simulate: bool,

    /// Validate config and show what would be collected without collecting
    #[arg(long, conflicts_with_all = ["status", "export", "logs"])]
    dry_run: bool,

    /// Show the stored run and exit
    #[arg(long, conflicts_with_all = ["dry_run", "export", "logs"])]
    status: bool,

    /// Write the stored records to the configured CSV path and exit
    #[arg(long, conflicts_with_all = ["dry_run", "status", "logs"])]
    export: bool,

    /// Print the persisted log and exit
    #[arg(long, conflicts_with_all = ["dry_run", "status", "export"])]
    logs: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let (bus, responder) = MessageBus::new(DEFAULT_STREAM_CAPACITY);

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet, bus.logs().clone());

    // Load and validate configuration
    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = match load_config_with_hash(&cli.config) {
        Ok((cfg, hash)) => {
            tracing::info!("Configuration loaded successfully (hash: {})", hash);
            (cfg, hash)
        }
        Err(e) => {
            tracing::error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    if cli.dry_run {
        return handle_dry_run(&config);
    }

    let store = RunStore::new(
        open_storage(Path::new(&config.storage.database_path))
            .with_context(|| format!("opening {}", config.storage.database_path))?,
    );

    if cli.status {
        handle_status(&config, &store).await
    } else if cli.export {
        handle_export(&config, &store).await
    } else if cli.logs {
        handle_logs(&config, &store).await
    } else {
        handle_collect(&cli, config, config_hash, store, bus, responder).await
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
///
/// Besides the terminal output, every event is published on the bus log
/// stream so the log sink can persist it.
fn setup_logging(verbose: u8, quiet: bool, logs: EventStream<LogEntry>) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("group_harvest=info,warn"),
            1 => EnvFilter::new("group_harvest=debug,info"),
            2 => EnvFilter::new("group_harvest=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_thread_ids(false)
                .with_file(false),
        )
        .with(BusLogLayer::new(logs, "coordinator"))
        .init();
}

/// Handles the --dry-run mode: validates config and shows what would be collected
fn handle_dry_run(config: &Config) -> anyhow::Result<()> {
    let targets = config.targets()?;
    let settings = config.settings();

    println!("=== Group-Harvest Dry Run ===\n");

    println!("Collection:");
    println!("  Posts per target: {}", settings.items_per_target);
    println!("  Include comments: {}", settings.include_secondary);
    println!("  Simulated data: {}", settings.use_simulated_data);

    println!("\nPacing:");
    if config.rate_limit.cooldown_every == 0 {
        println!("  Cooldown: disabled");
    } else {
        println!(
            "  Cooldown every {} targets: {}-{}ms",
            config.rate_limit.cooldown_every,
            config.rate_limit.cooldown_min_ms,
            config.rate_limit.cooldown_max_ms
        );
    }
    println!(
        "  Delay between targets: {}-{}ms",
        config.rate_limit.short_delay_min_ms, config.rate_limit.short_delay_max_ms
    );

    println!("\nTabs:");
    println!("  Load timeout: {}ms", config.tab.load_timeout_ms);
    println!("  Settle delay: {}ms", config.tab.settle_delay_ms);
    println!("  Extraction timeout: {}ms", config.tab.extraction_timeout_ms);

    println!("\nUser Agent:");
    println!("  {}", config.user_agent.header_value());

    println!("\nStorage:");
    println!("  Database: {}", config.storage.database_path);
    println!("  Log capacity: {}", config.storage.log_capacity);
    println!("  CSV export: {}", config.output.csv_path);

    println!("\nTargets ({}):", targets.len());
    for target in &targets {
        println!("  - {} [{}] {}", target.name, target.id, target.url);
    }

    println!("\n✓ Configuration is valid");
    println!("✓ Would collect from {} targets", targets.len());

    Ok(())
}

/// Handles the --status mode: shows the stored run
async fn handle_status(config: &Config, store: &RunStore) -> anyhow::Result<()> {
    println!("Database: {}\n", config.storage.database_path);

    match load_report(store).await? {
        Some(report) => print_report(&report),
        None => println!("No collection run stored yet"),
    }

    Ok(())
}

/// Handles the --export mode: writes the stored records as CSV
async fn handle_export(config: &Config, store: &RunStore) -> anyhow::Result<()> {
    let run = store
        .load_run()
        .await?
        .ok_or_else(|| anyhow!("No collection run stored yet"))?;

    if run.records().is_empty() {
        println!("No records to export");
        return Ok(());
    }

    let path = Path::new(&config.output.csv_path);
    let bytes = write_csv(path, run.records())?;
    println!(
        "✓ Exported {} records ({} bytes) to: {}",
        run.records().len(),
        bytes,
        path.display()
    );

    Ok(())
}

/// Handles the --logs mode: prints the persisted log ring
async fn handle_logs(config: &Config, store: &RunStore) -> anyhow::Result<()> {
    let sink = LogSink::restore(store.clone(), config.storage.log_capacity).await?;
    print_logs(&sink.entries());
    Ok(())
}

/// Handles the main collection operation
async fn handle_collect(
    cli: &Cli,
    config: Config,
    config_hash: String,
    store: RunStore,
    bus: MessageBus,
    responder: Responder<Command, CommandReply>,
) -> anyhow::Result<()> {
    let sink = LogSink::restore(store.clone(), config.storage.log_capacity).await?;
    let sink_task = tokio::spawn(sink.clone().run(bus.logs().subscribe()));

    let client = build_http_client(&config.user_agent)?;
    let browser = Arc::new(HttpBrowser::new(client, Arc::new(HtmlPageScript::new())));
    let extractor = Arc::new(BusExtractor::new(config.tab.extraction_timeout()));

    let coordinator =
        CollectionCoordinator::builder(browser, extractor, store, bus.events().clone())
            .rate_limit(BurstCooldownPolicy::from(&config.rate_limit))
            .tab_options(TabOptions::from(&config.tab))
            .config_hash(config_hash)
            .restore()
            .await;

    let resumable = coordinator.snapshot().is_resumable();
    tokio::spawn(ControlService::new(coordinator.clone(), sink.clone()).serve(responder));

    let command = if cli.resume {
        if !resumable {
            return Err(anyhow!("There is no interrupted run to resume"));
        }
        Command::Resume
    } else if resumable && !cli.fresh {
        tracing::info!("Resuming interrupted run (use --fresh to start over)");
        Command::Resume
    } else {
        let mut settings = config.settings();
        settings.use_simulated_data |= cli.simulate;
        let targets = config.targets()?;
        tracing::info!("Queueing {} targets", targets.len());
        Command::StartCollection { targets, settings }
    };

    // Subscribe before sending so no event of this run is missed
    let events = bus.events().subscribe();
    match bus.send(&command, COMMAND_TIMEOUT).await? {
        CommandReply::Ack(ack) if ack.accepted => {}
        CommandReply::Ack(ack) => {
            return Err(anyhow!(
                "Collection not accepted: {}",
                ack.reason.unwrap_or_default()
            ))
        }
        other => return Err(anyhow!("Unexpected reply: {:?}", other)),
    }

    let outcome = watch_run(&bus, events).await;

    let run = coordinator.snapshot();
    if run.status() == RunStatus::Completed && !run.records().is_empty() {
        let path = Path::new(&config.output.csv_path);
        write_csv(path, run.records())?;
        println!("✓ Records exported to: {}", path.display());
    }

    sink.flush().await?;
    sink_task.abort();

    match outcome? {
        RunStatus::Failed => Err(anyhow!("Collection run failed")),
        RunStatus::Idle => {
            println!(
                "Run stopped at target {}/{}; run again to resume",
                run.cursor(),
                run.queue().len()
            );
            Ok(())
        }
        _ => Ok(()),
    }
}

/// Prints run events until the run settles; Ctrl-C requests a stop
async fn watch_run(
    bus: &MessageBus,
    mut events: Subscription<CollectionEvent>,
) -> anyhow::Result<RunStatus> {
    let mut stop_sent = false;

    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c(), if !stop_sent => {
                signal?;
                stop_sent = true;
                println!("\nStopping after the current target...");
                if let CommandReply::Ack(ack) = bus.send(&Command::StopCollection, COMMAND_TIMEOUT).await? {
                    if !ack.accepted {
                        tracing::warn!("Stop not accepted: {}", ack.reason.unwrap_or_default());
                    }
                }
            }
            event = events.recv() => {
                let Some(event) = event else {
                    return Err(anyhow!("Event stream closed before the run settled"));
                };
                match event {
                    CollectionEvent::Progress { target_index, total, target_name, percent } => {
                        println!("[{}/{}] {:>3}% {}", target_index + 1, total, percent, target_name);
                    }
                    CollectionEvent::ItemFailed { target_id, error_message } => {
                        println!("  ✗ {}: {}", target_id, error_message);
                    }
                    CollectionEvent::Completed { records, failed_items } => {
                        println!(
                            "\n✓ Collection completed: {} records, {} targets failed",
                            records.len(),
                            failed_items
                        );
                        return Ok(RunStatus::Completed);
                    }
                    CollectionEvent::Failed { error_message } => {
                        println!("\n✗ Collection failed: {}", error_message);
                        return Ok(RunStatus::Failed);
                    }
                    CollectionEvent::StatusChanged { status: RunStatus::Idle } => {
                        return Ok(RunStatus::Idle);
                    }
                    CollectionEvent::StatusChanged { .. } => {}
                }
            }
        }
    }
}
