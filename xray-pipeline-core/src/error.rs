//! Error taxonomy for the ingestion pipeline.
//!
//! Errors raised inside the consumer never leave the message boundary; they are logged and the
//! message is dropped. Producer errors propagate to the caller. Service errors are translated to
//! user-visible responses by the API layer.

use thiserror::Error;

/// Why an incoming message could not be turned into a typed [`crate::contract::Message`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MalformedReason {
    InvalidJson(String),
    NotAnObject,
    MissingDeviceId,
    MultipleDeviceIds(usize),
    EmptyDeviceId,
    InvalidReading { device_id: String, detail: String },
    TimeOutOfRange { device_id: String, time: i64 },
}

impl MalformedReason {
    /// Stable short code, used as a structured log field.
    pub fn code(&self) -> &'static str {
        match self {
            MalformedReason::InvalidJson(_) => "invalid_json",
            MalformedReason::NotAnObject => "not_an_object",
            MalformedReason::MissingDeviceId => "missing_device_id",
            MalformedReason::MultipleDeviceIds(_) => "multiple_device_ids",
            MalformedReason::EmptyDeviceId => "empty_device_id",
            MalformedReason::InvalidReading { .. } => "invalid_reading",
            MalformedReason::TimeOutOfRange { .. } => "time_out_of_range",
        }
    }
}

impl std::fmt::Display for MalformedReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MalformedReason::InvalidJson(e) => write!(f, "payload is not valid JSON: {e}"),
            MalformedReason::NotAnObject => write!(f, "payload is not a JSON object"),
            MalformedReason::MissingDeviceId => write!(f, "missing deviceId"),
            MalformedReason::MultipleDeviceIds(n) => {
                write!(f, "expected exactly one deviceId, found {n}")
            }
            MalformedReason::EmptyDeviceId => write!(f, "deviceId is empty"),
            MalformedReason::InvalidReading { device_id, detail } => {
                write!(f, "reading for device {device_id} has the wrong shape: {detail}")
            }
            MalformedReason::TimeOutOfRange { device_id, time } => {
                write!(f, "reading for device {device_id} has an out-of-range time {time}")
            }
        }
    }
}

#[derive(Debug, Error)]
pub enum TransformError {
    #[error("malformed message: {0}")]
    MalformedMessage(MalformedReason),

    #[error("failed to encode reading: {0}")]
    Encode(#[from] serde_json::Error),
}

impl From<MalformedReason> for TransformError {
    fn from(reason: MalformedReason) -> Self {
        TransformError::MalformedMessage(reason)
    }
}

/// Failures reported by a [`crate::contract::SignalStore`] backend.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    #[error("storage write failed: {0}")]
    WriteFailed(String),

    #[error("storage read failed: {0}")]
    ReadFailed(String),
}

/// Failures reported by a [`crate::contract::Publisher`] backend.
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("broker unavailable: {0}")]
    Unavailable(String),

    #[error("broker rejected publish to {subject}: {detail}")]
    Rejected { subject: String, detail: String },
}

/// Channel-level failures while receiving or settling deliveries.
#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("failed to receive delivery: {0}")]
    Receive(String),

    #[error("failed to settle delivery: {0}")]
    Settle(String),
}

#[derive(Debug, Error)]
pub enum ProduceError {
    #[error("failed to read batch source: {0}")]
    SourceRead(#[source] std::io::Error),

    #[error("failed to decode batch source: {0}")]
    SourceDecode(#[source] serde_json::Error),

    #[error("batch source contains an empty deviceId")]
    EmptyDeviceId,

    #[error("failed to encode message for device {device_id}: {source}")]
    Encode {
        device_id: String,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Publish(#[from] PublishError),
}

/// Per-message failure inside the consumer. Never propagated past the receive boundary.
#[derive(Debug, Error)]
pub enum ConsumeError {
    #[error(transparent)]
    Transform(#[from] TransformError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("message processing panicked: {0}")]
    Panicked(String),
}

impl ConsumeError {
    /// Failure class, logged alongside the error description.
    pub fn kind(&self) -> &'static str {
        match self {
            ConsumeError::Transform(TransformError::MalformedMessage(_)) => "malformed_message",
            ConsumeError::Transform(TransformError::Encode(_)) => "encode_failed",
            ConsumeError::Store(StoreError::Unavailable(_)) => "storage_unavailable",
            ConsumeError::Store(StoreError::WriteFailed(_)) => "storage_write_failed",
            ConsumeError::Store(StoreError::ReadFailed(_)) => "storage_read_failed",
            ConsumeError::Panicked(_) => "panicked",
        }
    }
}

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("{0}")]
    NotFound(String),

    #[error("invalid input: {0}")]
    Invalid(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type ServiceResult<T> = Result<T, ServiceError>;
