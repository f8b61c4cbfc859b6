//! # contract: data model and collaborator interfaces
//!
//! Plain data types that flow through the pipeline, and the traits behind which the broker
//! channel, the batch source and the storage backend sit.
//!
//! ## Mocking & Testing
//! - The collaborator traits are annotated for `mockall`; mocks are exported with the default
//!   `test-export-mocks` feature so integration tests and dependent crates can use them.
//!
//! ## Adding a backend
//! - Implement [`SignalStore`] for a new document store, or [`Publisher`] + [`Inbound`] for a new
//!   broker. Map backend failures onto the variants in [`crate::error`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use uuid::Uuid;

#[cfg(any(test, feature = "test-export-mocks"))]
use mockall::automock;

use crate::error::{BrokerError, PublishError, StoreError};

/// One device reading as emitted by the device: sample rows plus the epoch-millisecond time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawReading {
    pub data: Vec<serde_json::Value>,
    pub time: i64,
}

/// Wire unit: exactly one `deviceId -> RawReading` entry.
///
/// Serializes as a single-key JSON object. Decoding goes through
/// [`crate::transform::parse_message`], which validates the one-key invariant.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub device_id: String,
    pub reading: RawReading,
}

impl Message {
    pub fn new(device_id: impl Into<String>, reading: RawReading) -> Self {
        Self {
            device_id: device_id.into(),
            reading,
        }
    }
}

impl Serialize for Message {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(1))?;
        map.serialize_entry(&self.device_id, &self.reading)?;
        map.end()
    }
}

/// A persisted signal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignalRecord {
    pub id: Uuid,
    pub device_id: String,
    pub time: DateTime<Utc>,
    /// Number of sample rows in the reading.
    pub data_length: i64,
    /// Size in bytes of the canonically encoded reading.
    pub data_volume: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Shape accepted by [`SignalStore::create`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewSignal {
    pub device_id: String,
    pub time: DateTime<Utc>,
    pub data_length: i64,
    pub data_volume: i64,
}

/// Partial update; `None` leaves the stored field untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SignalPatch {
    pub device_id: Option<String>,
    pub time: Option<DateTime<Utc>>,
    pub data_length: Option<i64>,
    pub data_volume: Option<i64>,
}

impl SignalPatch {
    /// Applies the provided fields to `record` and bumps `updated_at`.
    pub fn apply_to(self, record: &mut SignalRecord, now: DateTime<Utc>) {
        if let Some(device_id) = self.device_id {
            record.device_id = device_id;
        }
        if let Some(time) = self.time {
            record.time = time;
        }
        if let Some(data_length) = self.data_length {
            record.data_length = data_length;
        }
        if let Some(data_volume) = self.data_volume {
            record.data_volume = data_volume;
        }
        record.updated_at = now;
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeleteConfirmation {
    pub deleted: bool,
    pub id: Uuid,
}

/// Storage collaborator owning the lifecycle of persisted signals.
///
/// Listing operations return records newest-first (by `created_at`).
/// `update_by_id` and `delete_by_id` return `Ok(None)` when no record has the given id.
/// Implementations must be safe under concurrent use from independent messages.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait SignalStore: Send + Sync {
    async fn create(&self, signal: NewSignal) -> Result<SignalRecord, StoreError>;

    async fn find_all(&self) -> Result<Vec<SignalRecord>, StoreError>;

    async fn find_by_device(&self, device_id: &str) -> Result<Vec<SignalRecord>, StoreError>;

    async fn update_by_id(
        &self,
        id: Uuid,
        patch: SignalPatch,
    ) -> Result<Option<SignalRecord>, StoreError>;

    async fn delete_by_id(&self, id: Uuid) -> Result<Option<SignalRecord>, StoreError>;
}

/// Publishing side of the broker channel.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Publish one message body and wait for the broker acknowledgement.
    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        payload: Vec<u8>,
    ) -> Result<(), PublishError>;
}

/// Where the producer reads its batch from (a file in production).
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait BatchSource: Send + Sync {
    /// Read the whole batch as raw bytes. Decoding happens in the producer.
    async fn read_batch(&self) -> std::io::Result<Vec<u8>>;
}

/// One delivery pulled off the broker channel.
#[async_trait]
pub trait Inbound: Send + Sync {
    fn payload(&self) -> &[u8];

    /// Settle the delivery so the broker does not hand it out again.
    async fn settle(&self) -> Result<(), BrokerError>;
}
