/// # xray-pipeline CLI
///
/// Process wiring for the three pipeline roles:
/// - `produce`: read a batch file and publish one message per device
/// - `consume`: bind the queue and persist every delivery as a signal
/// - `serve`: the consumer plus the signals HTTP API in one process
///
/// All pipeline logic lives in `xray-pipeline-core`; this module only resolves configuration,
/// constructs the broker and storage handles, and injects them.
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use xray_pipeline_core::consume::{Consumer, ConsumerConfig};
use xray_pipeline_core::produce::{load_batch, FileBatchSource, Producer, ProducerConfig};
use xray_pipeline_core::service::SignalService;

use crate::broker::NatsBroker;
use crate::http;
use crate::load_config::{load_config, AppConfig};
use crate::store::open_store;

/// CLI for the x-ray signal ingestion pipeline.
#[derive(Parser)]
#[clap(
    name = "xray-pipeline",
    version,
    about = "Publish x-ray device readings and persist them as signals"
)]
pub struct Cli {
    /// Optional YAML config file; environment variables override its values
    #[clap(long, global = true)]
    pub config: Option<PathBuf>,

    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Publish every device reading in a batch file to the exchange
    Produce {
        /// Path to the batch JSON file
        #[clap(long)]
        source: Option<PathBuf>,
    },
    /// Consume the queue and store each message as a signal
    Consume,
    /// Run the consumer and the signals HTTP API
    Serve {
        /// Port for the HTTP API
        #[clap(long)]
        port: Option<u16>,
    },
}

/// Async CLI entrypoint, used by `main` and integration tests.
pub async fn run(cli: Cli) -> Result<()> {
    let mut config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Produce { source } => {
            if let Some(source) = source {
                config.source_path = source;
            }
            info!(command = "produce", source = ?config.source_path, "Starting producer");
            produce(&config).await
        }
        Commands::Consume => {
            info!(command = "consume", queue = %config.queue, "Starting consumer");
            consume(&config, shutdown_on_ctrl_c()).await
        }
        Commands::Serve { port } => {
            if let Some(port) = port {
                config.port = port;
            }
            info!(command = "serve", port = config.port, "Starting consumer and API");
            serve(&config, shutdown_on_ctrl_c()).await
        }
    }
}

async fn produce(config: &AppConfig) -> Result<()> {
    let source = FileBatchSource::new(&config.source_path);
    let batch = load_batch(&source)
        .await
        .with_context(|| format!("Failed to load batch from {:?}", config.source_path))?;

    // An empty batch needs no broker.
    if batch.is_empty() {
        warn!(source = ?config.source_path, "[PRODUCE] No data found in batch; nothing to publish");
        return Ok(());
    }

    let broker = connect_broker(config).await?;
    let producer = Producer::new(
        Arc::new(broker.publisher()),
        ProducerConfig {
            exchange: config.exchange.clone(),
            routing_key: config.queue.clone(),
        },
    );

    let report = producer.publish_batch(&batch).await?;
    info!(
        published = report.published.len(),
        exchange = %config.exchange,
        "[PRODUCE] Batch published"
    );
    Ok(())
}

async fn consume(config: &AppConfig, shutdown: CancellationToken) -> Result<()> {
    let store = open_store(&config.storage_uri, config.storage_pool_size).await?;
    let broker = connect_broker(config).await?;
    let deliveries = broker.subscribe(&config.queue).await?;

    let consumer = Consumer::new(store, consumer_config(config));
    consumer.run(deliveries, shutdown).await;
    Ok(())
}

async fn serve(config: &AppConfig, shutdown: CancellationToken) -> Result<()> {
    let store = open_store(&config.storage_uri, config.storage_pool_size).await?;
    let service = SignalService::new(store.clone());

    let broker = connect_broker(config).await?;
    let deliveries = broker.subscribe(&config.queue).await?;
    let consumer = Consumer::new(store, consumer_config(config));

    let consumer_shutdown = shutdown.clone();
    let consuming = async move {
        consumer.run(deliveries, consumer_shutdown.clone()).await;
        // The API is of little use once deliveries stop arriving.
        consumer_shutdown.cancel();
        Ok::<(), anyhow::Error>(())
    };

    tokio::try_join!(http::serve(service, config.port, shutdown), consuming)?;
    Ok(())
}

async fn connect_broker(config: &AppConfig) -> Result<NatsBroker> {
    NatsBroker::connect(
        &config.broker_url,
        &config.exchange,
        Duration::from_secs(config.broker_timeout_secs),
    )
    .await
}

fn consumer_config(config: &AppConfig) -> ConsumerConfig {
    ConsumerConfig {
        queue: config.queue.clone(),
        concurrency: config.consumer_concurrency,
    }
}

fn shutdown_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl-C, shutting down");
            trigger.cancel();
        }
    });
    token
}
