//! Batch producer: splits a `deviceId -> reading` batch into one message per device and
//! publishes each one to the broker channel.
//!
//! # Responsibilities
//! - Decode the whole batch before publishing anything, so a decode failure publishes nothing
//! - Publish sequentially, one message per device, awaiting each broker acknowledgement
//! - Fail fast: the first publish error aborts the run (earlier publishes are not rolled back)
//!
//! # Navigation
//! - Entrypoints: [`Producer::produce`], [`load_batch`], [`Producer::publish_batch`]
//! - Batch source used by the CLI: [`FileBatchSource`]

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::{debug, error, info, warn};

use crate::contract::{BatchSource, Message, Publisher, RawReading};
use crate::error::ProduceError;

/// Decoded batch in source document order, which is also the publish order.
pub type Batch = Vec<(String, RawReading)>;

/// Where published messages are addressed.
#[derive(Debug, Clone)]
pub struct ProducerConfig {
    pub exchange: String,
    pub routing_key: String,
}

#[derive(Debug, Default)]
pub struct ProduceReport {
    /// Device ids in the order they were published.
    pub published: Vec<String>,
}

/// Reads a batch from a JSON file on disk.
#[derive(Debug, Clone)]
pub struct FileBatchSource {
    path: PathBuf,
}

impl FileBatchSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }
}

#[async_trait]
impl BatchSource for FileBatchSource {
    async fn read_batch(&self) -> std::io::Result<Vec<u8>> {
        debug!(path = %self.path.display(), "[PRODUCE] Reading batch file");
        tokio::fs::read(&self.path).await
    }
}

/// Read and decode the batch as one atomic unit.
pub async fn load_batch(source: &dyn BatchSource) -> Result<Batch, ProduceError> {
    info!("[PRODUCE] Reading batch source");

    let raw = source.read_batch().await.map_err(|e| {
        error!(error = ?e, "[PRODUCE][ERROR] Failed to read batch source");
        ProduceError::SourceRead(e)
    })?;

    let decode_failed = |e: serde_json::Error| {
        error!(error = %e, size_bytes = raw.len(), "[PRODUCE][ERROR] Failed to decode batch source");
        ProduceError::SourceDecode(e)
    };

    let document: Map<String, Value> = serde_json::from_slice(&raw).map_err(decode_failed)?;

    let mut batch = Batch::with_capacity(document.len());
    for (device_id, value) in document {
        if device_id.is_empty() {
            error!("[PRODUCE][ERROR] Batch source contains an empty deviceId");
            return Err(ProduceError::EmptyDeviceId);
        }
        let reading: RawReading = serde_json::from_value(value).map_err(decode_failed)?;
        batch.push((device_id, reading));
    }

    debug!(devices = batch.len(), "[PRODUCE] Batch decoded");
    Ok(batch)
}

pub struct Producer {
    publisher: Arc<dyn Publisher>,
    config: ProducerConfig,
}

impl Producer {
    pub fn new(publisher: Arc<dyn Publisher>, config: ProducerConfig) -> Self {
        Self { publisher, config }
    }

    /// Load the batch from `source` and publish it.
    pub async fn produce(&self, source: &dyn BatchSource) -> Result<ProduceReport, ProduceError> {
        let batch = load_batch(source).await?;
        self.publish_batch(&batch).await
    }

    /// Publish one single-key message per device in the batch.
    pub async fn publish_batch(&self, batch: &Batch) -> Result<ProduceReport, ProduceError> {
        if batch.is_empty() {
            warn!("[PRODUCE] No device records found in batch; nothing to publish");
            return Ok(ProduceReport::default());
        }

        info!(
            devices = batch.len(),
            exchange = %self.config.exchange,
            routing_key = %self.config.routing_key,
            "[PRODUCE] Found device records to publish"
        );

        let mut report = ProduceReport::default();

        for (device_id, reading) in batch {
            let message = Message::new(device_id.clone(), reading.clone());
            let payload = serde_json::to_vec(&message).map_err(|source| ProduceError::Encode {
                device_id: device_id.clone(),
                source,
            })?;

            info!(device_id = %device_id, size_bytes = payload.len(), "[PRODUCE] Publishing data for device");

            if let Err(e) = self
                .publisher
                .publish(&self.config.exchange, &self.config.routing_key, payload)
                .await
            {
                error!(
                    device_id = %device_id,
                    published = report.published.len(),
                    error = %e,
                    "[PRODUCE][ERROR] Publish failed; aborting remaining devices"
                );
                return Err(ProduceError::Publish(e));
            }

            report.published.push(device_id.clone());
        }

        info!(published = report.published.len(), "[PRODUCE] All data published successfully");
        Ok(report)
    }
}
