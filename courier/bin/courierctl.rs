//! Command-line utility for managing a running courier instance
//!
//! Talks to the daemon over its control socket:
//! - Queue inspection (list, stats) and removal of tracked messages
//! - Manual reconciliation passes and queue bootstrap
//! - Liveness and status checks

#![allow(clippy::single_match_else)]

use std::time::Duration;

use clap::{Parser, Subcommand};
use courier_control::{
    ControlClient, DEFAULT_CONTROL_SOCKET, QueueCommand, Request, RequestCommand, ResponseData,
    ResponsePayload, SystemCommand,
};
use courier_reconcile::{PassOutcome, QueueStats};

/// Command-line utility for managing courier
#[derive(Parser, Debug)]
#[command(name = "courierctl")]
#[command(about = "Manage a running courier instance", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to the control socket
    #[arg(short = 'c', long, default_value = DEFAULT_CONTROL_SOCKET)]
    control_socket: String,

    /// Request timeout in seconds
    #[arg(long, default_value = "30")]
    timeout: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Reconciliation queue management
    Queue {
        #[command(subcommand)]
        action: QueueAction,
    },
    /// System status and health
    System {
        #[command(subcommand)]
        action: SystemAction,
    },
}

#[derive(Subcommand, Debug)]
enum SystemAction {
    /// Check if courier is responding
    Ping,
    /// Get system status
    Status,
}

#[derive(Subcommand, Debug)]
enum QueueAction {
    /// List tracked messages in priority order
    List,
    /// Show queue statistics
    Stats {
        /// Continuously update statistics
        #[arg(long)]
        watch: bool,

        /// Update interval in seconds (for watch mode)
        #[arg(long, default_value = "2")]
        interval: u64,
    },
    /// Stop tracking a message
    Remove {
        /// External id of the message
        external_id: String,
    },
    /// Run a reconciliation pass now
    ProcessNow,
    /// Seed the queue from the record store
    Bootstrap,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();
    let client = check_control_socket(&cli.control_socket)?
        .with_timeout(Duration::from_secs(cli.timeout));

    match cli.command {
        Commands::System { action } => handle_system_command(&client, action).await,
        Commands::Queue {
            action: QueueAction::Stats { watch: true, interval },
        } => watch_stats(&client, interval).await,
        Commands::Queue { action } => handle_queue_command(&client, action).await,
    }
}

/// Check control socket connectivity and return client
fn check_control_socket(socket_path: &str) -> anyhow::Result<ControlClient> {
    let client = ControlClient::new(socket_path);

    if let Err(e) = client.check_socket_exists() {
        anyhow::bail!(
            "Cannot connect to courier control socket at {socket_path}.\n\
             Error: {e}\n\
             \n\
             Is courier running?\n\
             You can configure the socket path with --control-socket or in courier.config.ron"
        );
    }

    Ok(client)
}

async fn send(client: &ControlClient, command: RequestCommand) -> anyhow::Result<ResponsePayload> {
    Ok(client.send_request(Request::new(command)).await?.payload)
}

async fn handle_system_command(client: &ControlClient, action: SystemAction) -> anyhow::Result<()> {
    let command = match action {
        SystemAction::Ping => SystemCommand::Ping,
        SystemAction::Status => SystemCommand::Status,
    };

    match send(client, RequestCommand::System(command)).await? {
        ResponsePayload::Ok => println!("✓ Pong! courier is responding"),
        ResponsePayload::Data(data) => match *data {
            ResponseData::SystemStatus(status) => {
                println!("=== courier status ===\n");
                println!("Version:     {}", status.version);
                println!("Uptime:      {}", format_duration(status.uptime_secs));
                println!("Queue size:  {} task(s)", status.queue_size);
                println!("Scheduler:   {:?}", status.scheduler);
            }
            other => println!("Unexpected response for system command: {other:?}"),
        },
        ResponsePayload::Error(err) => anyhow::bail!("Server error: {err}"),
    }

    Ok(())
}

async fn handle_queue_command(client: &ControlClient, action: QueueAction) -> anyhow::Result<()> {
    let command = match action {
        QueueAction::List => QueueCommand::List,
        QueueAction::Stats { .. } => QueueCommand::Stats,
        QueueAction::Remove { external_id } => QueueCommand::Remove { external_id },
        QueueAction::ProcessNow => QueueCommand::ProcessNow,
        QueueAction::Bootstrap => QueueCommand::Bootstrap,
    };

    match send(client, RequestCommand::Queue(command)).await? {
        ResponsePayload::Ok => println!("✓ Command completed successfully"),
        ResponsePayload::Data(data) => match *data {
            ResponseData::QueueList(tasks) => {
                if tasks.is_empty() {
                    println!("Queue is empty");
                } else {
                    for task in &tasks {
                        println!("{task}");
                    }
                    println!("Total: {} task(s)", tasks.len());
                }
            }
            ResponseData::QueueStats(stats) => print_stats(&stats),
            ResponseData::Pass(outcome) => print_pass(&outcome),
            ResponseData::Bootstrapped(added) => {
                println!("✓ Bootstrapped {added} task(s) from the record store");
            }
            ResponseData::Message(message) => println!("{message}"),
            ResponseData::SystemStatus(status) => {
                println!("Unexpected response for queue command: {status:?}");
            }
        },
        ResponsePayload::Error(err) => anyhow::bail!("Server error: {err}"),
    }

    Ok(())
}

async fn watch_stats(client: &ControlClient, interval: u64) -> anyhow::Result<()> {
    let mut ticker = tokio::time::interval(Duration::from_secs(interval.max(1)));

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let payload = send(client, RequestCommand::Queue(QueueCommand::Stats)).await?;
                if let ResponsePayload::Data(data) = payload
                    && let ResponseData::QueueStats(stats) = *data
                {
                    print!("\x1B[2J\x1B[H");
                    print_stats(&stats);
                }
            }
            _ = tokio::signal::ctrl_c() => return Ok(()),
        }
    }
}

fn print_stats(stats: &QueueStats) {
    println!("=== Queue statistics ===\n");
    println!("Total:            {}", stats.total);
    println!(
        "Oldest task:      {}",
        stats
            .oldest_age_secs
            .map_or_else(|| "-".to_string(), format_duration)
    );
    println!("Max retry count:  {}", stats.max_retry_count);

    if !stats.by_priority.is_empty() {
        println!("\nBy priority:");
        for (priority, count) in &stats.by_priority {
            println!("  {priority:>2}: {count}");
        }
    }
}

fn print_pass(outcome: &PassOutcome) {
    match outcome.report() {
        Some(report) => {
            println!("✓ Pass completed");
            println!("  Queried:   {}", report.queried);
            println!("  Delivered: {}", report.delivered);
            println!("  Failed:    {}", report.failed);
            println!("  Exhausted: {}", report.exhausted);
            println!("  Retried:   {}", report.retried);
            println!("  Deferred:  {}", report.deferred);
            println!("  Dropped:   {}", report.dropped);
            println!("  Skipped:   {}", report.skipped);
        }
        None => println!("A pass is already running; nothing was done"),
    }
}

/// Format duration in human-readable form
fn format_duration(secs: u64) -> String {
    if secs < 60 {
        format!("{secs}s")
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else if secs < 86400 {
        format!("{}h {}m", secs / 3600, (secs % 3600) / 60)
    } else {
        format!("{}d {}h", secs / 86400, (secs % 86400) / 3600)
    }
}
