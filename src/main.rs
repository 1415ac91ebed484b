use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use taskmaster::config::{ServerConfig, WorkerConfig};
use taskmaster::node::Node;
use taskmaster::shutdown::install_shutdown_handler;
use taskmaster::worker::status::run_status_page;
use taskmaster::worker::{CommandSpec, GrpcTaskSource, WorkerAgent};

#[derive(Parser, Debug)]
#[command(name = "taskmaster")]
#[command(version)]
#[command(about = "A lease-based task queue with keep-alive workers")]
#[command(propagate_version = true)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Start the scheduler
    Server(ServerArgs),

    /// Start a worker that pulls tasks from one group
    Worker(WorkerArgs),

    /// Task management commands
    Task {
        #[command(flatten)]
        client: ClientArgs,

        #[command(subcommand)]
        command: TaskCommands,
    },
}

// =============================================================================
// Server Arguments
// =============================================================================

#[derive(Parser, Debug)]
struct ServerArgs {
    /// Port to listen on for gRPC
    #[arg(long, default_value = "50051")]
    port: u16,

    /// Port for the status dashboard (optional)
    #[arg(long)]
    dashboard_port: Option<u16>,

    /// Directory holding one snapshot file per group
    #[arg(long, default_value = "snapshots")]
    snapshot_dir: PathBuf,

    /// Seconds between snapshot writes of changed groups
    #[arg(long, default_value = "30", value_parser = clap::value_parser!(u64).range(1..))]
    snapshot_interval_secs: u64,

    /// Lease granted when a worker does not ask for one, in seconds
    #[arg(long, default_value = "3600")]
    default_lease_secs: u64,
}

// =============================================================================
// Worker Arguments
// =============================================================================

#[derive(Parser, Debug)]
struct WorkerArgs {
    /// Scheduler address
    #[arg(long, short = 'a', default_value = "http://127.0.0.1:50051")]
    addr: String,

    /// Group this worker is assigned to
    #[arg(long, default_value = "default")]
    group: String,

    /// Lease requested per task; refreshed every period while the task runs
    #[arg(long, default_value = "60", value_parser = clap::value_parser!(u64).range(1..))]
    lease_secs: u64,

    /// Upper bound on a single task execution
    #[arg(long, default_value = "3600")]
    task_timeout_secs: u64,

    /// Sleep after an empty query or a failed task
    #[arg(long, default_value = "30")]
    retry_interval_secs: u64,

    /// Port for the worker status page (optional)
    #[arg(long)]
    status_port: Option<u16>,
}

// =============================================================================
// Client Arguments
// =============================================================================

#[derive(Parser, Debug)]
struct ClientArgs {
    /// Scheduler address
    #[arg(long, short = 'a', default_value = "http://127.0.0.1:50051")]
    addr: String,

    /// Output format
    #[arg(long, short = 'o', default_value = "table")]
    output: OutputFormat,
}

#[derive(Debug, Clone, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

#[derive(clap::Subcommand, Debug)]
enum TaskCommands {
    /// Insert a command into a group
    Insert {
        /// Target group
        #[arg(long, short = 'g', default_value = "default")]
        group: String,

        /// Program to run
        base: String,

        /// Program arguments
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },
}

#[derive(Serialize)]
struct TaskInsertOutput {
    group: String,
    id: String,
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
}

// =============================================================================
// Command Handlers
// =============================================================================

async fn run_server(args: ServerArgs) -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let listen_addr: SocketAddr = format!("0.0.0.0:{}", args.port).parse()?;
    let dashboard_addr: Option<SocketAddr> = match args.dashboard_port {
        Some(p) => Some(format!("0.0.0.0:{}", p).parse()?),
        None => None,
    };

    let mut config = ServerConfig::new(listen_addr, args.snapshot_dir)
        .with_snapshot_interval(Duration::from_secs(args.snapshot_interval_secs))
        .with_default_lease(Duration::from_secs(args.default_lease_secs));
    if let Some(addr) = dashboard_addr {
        config = config.with_dashboard(addr);
    }

    tracing::info!(
        listen_addr = %config.listen_addr,
        dashboard_addr = ?config.dashboard_addr,
        snapshot_dir = %config.snapshot_dir.display(),
        snapshot_interval_secs = args.snapshot_interval_secs,
        "Starting taskmaster server"
    );

    let shutdown = install_shutdown_handler();
    let node = Node::new(config, shutdown).await?;
    node.run().await?;
    Ok(())
}

async fn run_worker(args: WorkerArgs) -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let status_addr: Option<SocketAddr> = match args.status_port {
        Some(p) => Some(format!("0.0.0.0:{}", p).parse()?),
        None => None,
    };
    let config = WorkerConfig {
        server_addr: args.addr,
        group: args.group,
        lease_duration: Duration::from_secs(args.lease_secs),
        task_timeout: Duration::from_secs(args.task_timeout_secs),
        retry_interval: Duration::from_secs(args.retry_interval_secs),
        status_addr,
        ..WorkerConfig::default()
    };

    tracing::info!(
        server_addr = %config.server_addr,
        group = %config.group,
        lease_secs = args.lease_secs,
        "Starting taskmaster worker"
    );

    let shutdown = install_shutdown_handler();
    let source = GrpcTaskSource::connect(&config.server_addr).await?;
    let agent = WorkerAgent::new(Arc::new(source), config.clone());

    if let Some(addr) = config.status_addr {
        let stats = agent.stats();
        let token = shutdown.clone();
        tokio::spawn(async move {
            run_status_page(addr, stats, token).await;
        });
    }

    agent.run(shutdown).await;
    Ok(())
}

async fn handle_task_insert(
    client: &ClientArgs,
    group: String,
    base: String,
    args: Vec<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let payload = CommandSpec::new(base, args).encode()?;
    let source = GrpcTaskSource::connect(&client.addr).await?;

    match source.insert(&group, payload).await {
        Ok(id) => match client.output {
            OutputFormat::Json => {
                let output = TaskInsertOutput { group, id };
                println!("{}", serde_json::to_string_pretty(&output)?);
            }
            OutputFormat::Table => {
                println!("Task is successfully committed with ID `{}`.", id);
            }
        },
        Err(e) => {
            eprintln!("Error: task insert failed: {}", e);
            std::process::exit(1);
        }
    }
    Ok(())
}

// =============================================================================
// Main Entry Point
// =============================================================================

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    match args.command {
        Commands::Server(server_args) => {
            run_server(server_args).await?;
        }
        Commands::Worker(worker_args) => {
            run_worker(worker_args).await?;
        }
        Commands::Task { client, command } => match command {
            TaskCommands::Insert { group, base, args } => {
                handle_task_insert(&client, group, base, args).await?;
            }
        },
    }

    Ok(())
}
