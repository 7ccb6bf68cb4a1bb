//! canaryd — the Kafka canary daemon.
//!
//! # Usage
//!
//! ```text
//! canaryd run --config /etc/canary/canary.toml --bootstrap-servers kafka:9092
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::net::TcpListener;
use tracing::info;

use canary_core::DaemonConfig;
use canaryd::kafka::{KafkaConnector, run_consumer, run_producer};
use canaryd::service::until_signal;
use canaryd::{CanaryService, LogFormat, init_tracing};

#[derive(Parser)]
#[command(name = "canaryd", about = "Kafka canary daemon")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the canary against a cluster.
    Run {
        /// TOML configuration file. Defaults apply when omitted.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Overrides `api.listen`.
        #[arg(long)]
        listen: Option<SocketAddr>,

        /// Overrides `kafka.bootstrap_servers`.
        #[arg(long)]
        bootstrap_servers: Option<String>,

        #[arg(long, value_enum, default_value = "text")]
        log_format: LogFormat,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Run {
            config,
            listen,
            bootstrap_servers,
            log_format,
        } => {
            init_tracing(log_format)?;

            let mut config = match config {
                Some(path) => DaemonConfig::from_file(&path)?,
                None => DaemonConfig::default(),
            };
            if let Some(listen) = listen {
                config.api.listen = listen;
            }
            if let Some(servers) = bootstrap_servers {
                config.kafka.bootstrap_servers = servers;
            }
            config.validate()?;

            run(config).await
        }
    }
}

async fn run(config: DaemonConfig) -> anyhow::Result<()> {
    info!(
        topic = %config.canary.topic,
        bootstrap_servers = %config.kafka.bootstrap_servers,
        "canary daemon starting"
    );

    let connector = Arc::new(KafkaConnector::new(
        config.kafka.clone(),
        config.canary.reconcile_timeout,
    ));
    let mut running = CanaryService::new(config.canary.clone(), connector).start();

    let producer = run_producer(
        config.kafka.clone(),
        config.canary.topic.clone(),
        running.counters(),
        running.assignments(),
        running.shutdown_signal(),
    );
    running.spawn_worker("producer", producer);

    let consumer = run_consumer(
        config.kafka.clone(),
        config.canary.topic.clone(),
        running.counters(),
        running.shutdown_signal(),
    );
    running.spawn_worker("consumer", consumer);

    let listener = TcpListener::bind(config.api.listen).await?;
    running
        .serve(listener, until_signal(tokio::signal::ctrl_c()))
        .await
}
