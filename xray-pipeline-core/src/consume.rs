//! Channel consumer: turns each delivery into a persisted signal and never lets one message's
//! failure stop the subscription.
//!
//! Every delivery goes `WAITING -> PROCESSING -> WAITING`. Processing failures (malformed body,
//! storage errors, even a panic inside a store backend) are logged with their failure class and
//! the message is dropped. The delivery is settled either way; there is no retry and no
//! dead-letter channel.

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use futures::{FutureExt, Stream, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::contract::{Inbound, SignalRecord, SignalStore};
use crate::error::{BrokerError, ConsumeError, TransformError};
use crate::transform::{parse_message, transform};

const PREVIEW_BYTES: usize = 256;

#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    /// Queue the consumer is bound to; used for log context.
    pub queue: String,
    /// Maximum number of deliveries processed at the same time.
    pub concurrency: usize,
}

/// Result of receiving a single delivery.
#[derive(Debug)]
pub enum Outcome {
    Stored(SignalRecord),
    Dropped(ConsumeError),
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ConsumeSummary {
    pub stored: usize,
    pub dropped: usize,
    pub receive_errors: usize,
}

pub struct Consumer {
    store: Arc<dyn SignalStore>,
    config: ConsumerConfig,
}

impl Consumer {
    pub fn new(store: Arc<dyn SignalStore>, config: ConsumerConfig) -> Self {
        Self { store, config }
    }

    /// Handle one delivery body. Never fails: errors are logged and reported as
    /// [`Outcome::Dropped`].
    pub async fn receive(&self, payload: &[u8]) -> Outcome {
        info!(
            queue = %self.config.queue,
            size_bytes = payload.len(),
            "[CONSUME] Received new x-ray message"
        );

        let result = match AssertUnwindSafe(self.process(payload)).catch_unwind().await {
            Ok(result) => result,
            Err(panic) => Err(ConsumeError::Panicked(panic_message(panic.as_ref()))),
        };

        match result {
            Ok(record) => {
                info!(
                    id = %record.id,
                    device_id = %record.device_id,
                    data_length = record.data_length,
                    data_volume = record.data_volume,
                    "[CONSUME] Successfully processed and saved x-ray data"
                );
                Outcome::Stored(record)
            }
            Err(e) => {
                error!(
                    queue = %self.config.queue,
                    kind = e.kind(),
                    error = %e,
                    payload_preview = %preview(payload),
                    "[CONSUME][ERROR] Failed to process x-ray message; dropping it"
                );
                Outcome::Dropped(e)
            }
        }
    }

    async fn process(&self, payload: &[u8]) -> Result<SignalRecord, ConsumeError> {
        let message = parse_message(payload).map_err(TransformError::from)?;
        let signal = transform(&message)?;

        debug!(
            device_id = %signal.device_id,
            data_length = signal.data_length,
            data_volume = signal.data_volume,
            "[CONSUME] Processing data for device"
        );

        Ok(self.store.create(signal).await?)
    }

    /// Drive the subscription until the delivery stream ends or `shutdown` is cancelled.
    pub async fn run<S, M>(&self, deliveries: S, shutdown: CancellationToken) -> ConsumeSummary
    where
        S: Stream<Item = Result<M, BrokerError>>,
        M: Inbound,
    {
        info!(
            queue = %self.config.queue,
            concurrency = self.config.concurrency,
            "[CONSUME] Starting consumer loop"
        );

        let stored = AtomicUsize::new(0);
        let dropped = AtomicUsize::new(0);
        let receive_errors = AtomicUsize::new(0);
        let (stored_ref, dropped_ref, errors_ref) = (&stored, &dropped, &receive_errors);

        let limit = self.config.concurrency.max(1);
        let work = deliveries.for_each_concurrent(limit, |delivery| async move {
            match delivery {
                Ok(message) => {
                    match self.receive(message.payload()).await {
                        Outcome::Stored(_) => stored_ref.fetch_add(1, Ordering::Relaxed),
                        Outcome::Dropped(_) => dropped_ref.fetch_add(1, Ordering::Relaxed),
                    };
                    if let Err(e) = message.settle().await {
                        warn!(error = %e, "[CONSUME] Failed to settle delivery");
                    }
                }
                Err(e) => {
                    errors_ref.fetch_add(1, Ordering::Relaxed);
                    warn!(error = %e, "[CONSUME] Error receiving delivery from channel");
                }
            }
        });

        // Cancellation drops in-flight deliveries unsettled; the broker redelivers them.
        tokio::select! {
            _ = shutdown.cancelled() => {
                info!("[CONSUME] Received shutdown signal, stopping consumer");
            }
            _ = work => {
                info!("[CONSUME] Delivery stream closed");
            }
        }

        let summary = ConsumeSummary {
            stored: stored.load(Ordering::Relaxed),
            dropped: dropped.load(Ordering::Relaxed),
            receive_errors: receive_errors.load(Ordering::Relaxed),
        };
        info!(?summary, "[CONSUME] Consumer stopped");
        summary
    }
}

fn preview(payload: &[u8]) -> String {
    let end = payload.len().min(PREVIEW_BYTES);
    let mut text = String::from_utf8_lossy(&payload[..end]).into_owned();
    if payload.len() > PREVIEW_BYTES {
        text.push_str("...");
    }
    text
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
