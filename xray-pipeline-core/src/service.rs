//! Query/mutation surface over the signal store.
//!
//! Thin delegation: validation of user-supplied shapes, id parsing and translation of
//! "no such record" into [`ServiceError::NotFound`].

use std::sync::Arc;

use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::contract::{DeleteConfirmation, NewSignal, SignalPatch, SignalRecord, SignalStore};
use crate::error::{ServiceError, ServiceResult};

#[derive(Clone)]
pub struct SignalService {
    store: Arc<dyn SignalStore>,
}

impl SignalService {
    pub fn new(store: Arc<dyn SignalStore>) -> Self {
        Self { store }
    }

    /// All signals, newest first.
    pub async fn list_all(&self) -> ServiceResult<Vec<SignalRecord>> {
        Ok(self.store.find_all().await?)
    }

    /// All signals for one device, newest first. Fails with `NotFound` when there are none.
    #[instrument(skip(self))]
    pub async fn find_by_device(&self, device_id: &str) -> ServiceResult<Vec<SignalRecord>> {
        if device_id.is_empty() {
            return Err(ServiceError::Invalid("device id must not be empty".into()));
        }

        let signals = self.store.find_by_device(device_id).await?;
        if signals.is_empty() {
            debug!("[API] No signals for device");
            return Err(ServiceError::NotFound(format!(
                "No signals found for deviceId: {device_id}"
            )));
        }
        Ok(signals)
    }

    /// Create a signal from an explicit, user-supplied shape (nothing is derived).
    pub async fn create(&self, signal: NewSignal) -> ServiceResult<SignalRecord> {
        validate_new(&signal)?;
        info!(device_id = %signal.device_id, "[API] Creating new signal manually");
        Ok(self.store.create(signal).await?)
    }

    #[instrument(skip(self, patch))]
    pub async fn update(&self, id: &str, patch: SignalPatch) -> ServiceResult<SignalRecord> {
        validate_patch(&patch)?;
        let uuid = parse_id(id)?;

        match self.store.update_by_id(uuid, patch).await? {
            Some(record) => {
                info!("[API] Updated signal");
                Ok(record)
            }
            None => Err(not_found(id)),
        }
    }

    #[instrument(skip(self))]
    pub async fn delete(&self, id: &str) -> ServiceResult<DeleteConfirmation> {
        let uuid = parse_id(id)?;

        match self.store.delete_by_id(uuid).await? {
            Some(_) => {
                info!("[API] Deleted signal");
                Ok(DeleteConfirmation {
                    deleted: true,
                    id: uuid,
                })
            }
            None => Err(not_found(id)),
        }
    }
}

// A malformed id cannot match any stored record.
fn parse_id(id: &str) -> ServiceResult<Uuid> {
    Uuid::parse_str(id).map_err(|_| not_found(id))
}

fn not_found(id: &str) -> ServiceError {
    debug!(id, "[API] Signal not found");
    ServiceError::NotFound(format!("Signal with ID \"{id}\" not found"))
}

fn validate_new(signal: &NewSignal) -> ServiceResult<()> {
    if signal.device_id.is_empty() {
        return Err(ServiceError::Invalid("deviceId must not be empty".into()));
    }
    positive("dataLength", signal.data_length)?;
    positive("dataVolume", signal.data_volume)
}

fn validate_patch(patch: &SignalPatch) -> ServiceResult<()> {
    if matches!(patch.device_id.as_deref(), Some("")) {
        return Err(ServiceError::Invalid("deviceId must not be empty".into()));
    }
    if let Some(value) = patch.data_length {
        positive("dataLength", value)?;
    }
    if let Some(value) = patch.data_volume {
        positive("dataVolume", value)?;
    }
    Ok(())
}

fn positive(field: &str, value: i64) -> ServiceResult<()> {
    if value <= 0 {
        return Err(ServiceError::Invalid(format!(
            "{field} must be a positive number"
        )));
    }
    Ok(())
}
