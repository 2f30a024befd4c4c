//! canopy-node: edge sync daemon for IoT cultivation units
//!
//! Runs on the gateway next to the broker and provides:
//! - Control parameter sync (remote config → device commands)
//! - Dual-cadence telemetry pull scheduling
//! - Store-and-forward telemetry upload with backlog retry
//!
//! Device traffic is bridged over stdin/stdout as JSON lines; logs go to
//! stderr.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::io::BufReader;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use canopy_node::api::create_router;
use canopy_node::config::Config;
use canopy_node::forward::ForwardSyncer;
use canopy_node::node::Node;
use canopy_node::storage::OutboxStore;
use canopy_node::sync::ConfigCollection;
use canopy_node::transport::feed::PollingChangeFeed;
use canopy_node::transport::http::HttpDocumentStore;
use canopy_node::transport::memory::MemoryRemoteStore;
use canopy_node::transport::stdio::{read_inbound, LinePublisher};
use canopy_node::transport::RemoteStore;

#[derive(Parser)]
#[command(name = "canopy-node")]
#[command(about = "Edge sync daemon for IoT cultivation units")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "canopy-node.toml")]
    config: String,

    /// Data directory
    #[arg(short, long, env = "CANOPY_DATA_DIR")]
    data_dir: Option<String>,

    /// Node ID (overrides config file)
    #[arg(long, env = "CANOPY_NODE_ID")]
    node_id: Option<String>,

    /// One-shot maintenance command instead of running the daemon
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Print the number of records waiting for upload
    Pending,
    /// Push the whole backlog to the remote store once
    Sweep,
}

fn main() -> anyhow::Result<()> {
    // stdout carries bridge traffic
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("canopy_node=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to build runtime")?;
    let result = runtime.block_on(run(cli));
    // A pending stdin read parks a blocking thread; don't wait on it at exit
    runtime.shutdown_timeout(Duration::from_secs(1));
    result
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    info!("Starting canopy-node");
    info!("Config file: {}", cli.config);

    let config = load_config(&cli)?;

    info!("Node ID: {}", config.node.id);
    info!("Data dir: {}", config.node.data_dir.display());

    let outbox_dir = config.outbox_dir();
    let outbox = Arc::new(
        OutboxStore::open(&outbox_dir)
            .with_context(|| format!("failed to open outbox in {}", outbox_dir.display()))?,
    );
    let remote = build_remote(&config)?;

    match cli.command {
        Some(Command::Pending) => {
            let counts = outbox.pending_counts()?;
            println!("{}", serde_json::to_string_pretty(&counts)?);
            Ok(())
        }
        Some(Command::Sweep) => {
            let forwarder = ForwardSyncer::new(
                outbox,
                remote,
                config.remote.telemetry_collections(),
                config.outbox.backlog_interval(),
            );
            let report = forwarder.sweep().await;
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
        None => run_daemon(config, outbox, remote).await,
    }
}

fn load_config(cli: &Cli) -> anyhow::Result<Config> {
    // Load or create default config
    let mut config = if std::path::Path::new(&cli.config).exists() {
        let content = std::fs::read_to_string(&cli.config)
            .with_context(|| format!("failed to read {}", cli.config))?;
        toml::from_str(&content).with_context(|| format!("invalid config {}", cli.config))?
    } else {
        info!("Config file not found, using defaults");
        Config::default()
    };

    // Apply CLI overrides
    if let Some(node_id) = &cli.node_id {
        config.node.id = node_id.clone();
    }
    if let Some(data_dir) = &cli.data_dir {
        config.node.data_dir = PathBuf::from(data_dir);
    }

    Ok(config)
}

fn build_remote(config: &Config) -> anyhow::Result<Arc<dyn RemoteStore>> {
    match &config.remote.base_url {
        Some(base_url) => {
            let store = HttpDocumentStore::new(base_url, config.remote.request_timeout())?;
            info!(base_url = %base_url, "Using remote document store");
            Ok(Arc::new(store))
        }
        None => {
            warn!("No remote.base_url configured, running against an in-memory store");
            Ok(Arc::new(MemoryRemoteStore::new()))
        }
    }
}

async fn run_daemon(
    config: Config,
    outbox: Arc<OutboxStore>,
    remote: Arc<dyn RemoteStore>,
) -> anyhow::Result<()> {
    let publisher = Arc::new(LinePublisher::stdout());
    let node = Arc::new(Node::new(&config, outbox, publisher, remote.clone()));

    // --- Cold start, then change feed ---
    // Runs beside the node loop so telemetry is buffered while the remote
    // store is still unreachable at boot.
    let (change_tx, change_rx) = mpsc::channel(256);
    {
        let node = node.clone();
        let collections = vec![
            (config.remote.control_collection.clone(), ConfigCollection::Controls),
            (config.remote.log_collection.clone(), ConfigCollection::LogIntervals),
        ];
        let poll_interval = config.remote.poll_interval();
        tokio::spawn(async move {
            let cold = match node.cold_start_with_retry().await {
                Some(cold) => cold,
                None => return,
            };

            let mut feed = PollingChangeFeed::new(remote, collections, poll_interval);
            feed.prime(ConfigCollection::Controls, &cold.controls);
            feed.prime(ConfigCollection::LogIntervals, &cold.logs);
            feed.run(change_tx, node.subscribe_shutdown()).await;
        });
    }

    // --- Telemetry bridge ---
    let (inbound_tx, inbound_rx) = mpsc::channel(256);
    tokio::spawn(read_inbound(
        BufReader::new(tokio::io::stdin()),
        inbound_tx,
        node.subscribe_shutdown(),
    ));

    // --- Status API ---
    if config.api.enabled {
        let addr = SocketAddr::from(([0, 0, 0, 0], config.api.http_port));
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .with_context(|| format!("failed to bind {}", addr))?;
        info!("Status API listening on http://{}", addr);

        let app = create_router(node.clone());
        let mut shutdown_rx = node.subscribe_shutdown();
        tokio::spawn(async move {
            let serve = axum::serve(listener, app).with_graceful_shutdown(async move {
                while !*shutdown_rx.borrow_and_update() {
                    if shutdown_rx.changed().await.is_err() {
                        break;
                    }
                }
            });
            if let Err(e) = serve.await {
                error!(error = %e, "Status API failed");
            }
        });
    }

    {
        let node = node.clone();
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => info!("Shutdown requested"),
                Err(e) => error!(error = %e, "Failed to listen for ctrl-c"),
            }
            node.shutdown();
        });
    }

    node.run(change_rx, inbound_rx).await;
    Ok(())
}
