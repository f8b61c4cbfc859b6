//! NATS JetStream binding for the broker channel.
//!
//! The exchange maps to a JetStream stream capturing `<exchange>.>`, a routing key to the subject
//! suffix, and a queue to a durable pull consumer filtering `<exchange>.<queue>`.

use std::time::Duration;

use anyhow::{Context, Result};
use async_nats::jetstream::{self, consumer::pull, consumer::AckPolicy, stream::Config as StreamConfig};
use async_trait::async_trait;
use futures::{Stream, StreamExt};
use tracing::{debug, info};

use xray_pipeline_core::contract::{Inbound, Publisher};
use xray_pipeline_core::error::{BrokerError, PublishError};

pub struct NatsBroker {
    jetstream: jetstream::Context,
    exchange: String,
}

impl NatsBroker {
    /// Connect and make sure the exchange's stream exists.
    pub async fn connect(url: &str, exchange: &str, timeout: Duration) -> Result<Self> {
        info!(url, ?timeout, "[BROKER] Connecting to NATS");

        let client = async_nats::ConnectOptions::new()
            .connection_timeout(timeout)
            .request_timeout(Some(timeout))
            .connect(url)
            .await
            .with_context(|| format!("Failed to connect to NATS at {url}"))?;

        let broker = Self {
            jetstream: jetstream::new(client),
            exchange: exchange.to_string(),
        };
        broker.ensure_exchange().await?;

        info!(url, exchange, "[BROKER] Connected");
        Ok(broker)
    }

    async fn ensure_exchange(&self) -> Result<()> {
        let config = StreamConfig {
            name: self.exchange.clone(),
            subjects: vec![format!("{}.>", self.exchange)],
            description: Some("x-ray device readings".to_string()),
            ..Default::default()
        };

        self.jetstream
            .get_or_create_stream(config)
            .await
            .with_context(|| format!("Failed to declare exchange '{}'", self.exchange))?;

        debug!(exchange = %self.exchange, "[BROKER] Exchange declared");
        Ok(())
    }

    pub fn publisher(&self) -> NatsPublisher {
        NatsPublisher {
            jetstream: self.jetstream.clone(),
        }
    }

    /// Bind a durable consumer for `queue` and stream its deliveries.
    pub async fn subscribe(
        &self,
        queue: &str,
    ) -> Result<impl Stream<Item = Result<NatsDelivery, BrokerError>>> {
        let stream = self
            .jetstream
            .get_stream(&self.exchange)
            .await
            .with_context(|| format!("Exchange '{}' is not declared", self.exchange))?;

        let filter_subject = format!("{}.{}", self.exchange, queue);
        let consumer = stream
            .get_or_create_consumer(
                queue,
                pull::Config {
                    durable_name: Some(queue.to_string()),
                    filter_subject: filter_subject.clone(),
                    ack_policy: AckPolicy::Explicit,
                    ..Default::default()
                },
            )
            .await
            .with_context(|| format!("Failed to bind queue '{queue}'"))?;

        let messages = consumer
            .messages()
            .await
            .with_context(|| format!("Failed to open delivery stream for '{queue}'"))?;

        info!(queue, subject = %filter_subject, "[BROKER] Subscribed");

        Ok(messages.map(|delivery| {
            delivery
                .map(NatsDelivery)
                .map_err(|e| BrokerError::Receive(e.to_string()))
        }))
    }
}

#[derive(Clone)]
pub struct NatsPublisher {
    jetstream: jetstream::Context,
}

#[async_trait]
impl Publisher for NatsPublisher {
    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        payload: Vec<u8>,
    ) -> Result<(), PublishError> {
        let subject = format!("{exchange}.{routing_key}");
        debug!(subject = %subject, size_bytes = payload.len(), "[BROKER] Publishing");

        let ack = self
            .jetstream
            .publish(subject.clone(), payload.into())
            .await
            .map_err(|e| PublishError::Unavailable(e.to_string()))?;

        ack.await.map_err(|e| PublishError::Rejected {
            subject: subject.clone(),
            detail: e.to_string(),
        })?;

        debug!(subject = %subject, "[BROKER] Publish acknowledged");
        Ok(())
    }
}

/// A JetStream message received on a queue.
pub struct NatsDelivery(jetstream::Message);

#[async_trait]
impl Inbound for NatsDelivery {
    fn payload(&self) -> &[u8] {
        &self.0.payload
    }

    async fn settle(&self) -> Result<(), BrokerError> {
        self.0
            .ack()
            .await
            .map_err(|e| BrokerError::Settle(e.to_string()))
    }
}
