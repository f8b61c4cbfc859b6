//! PostgreSQL implementation of [`SignalStore`], pooled with deadpool.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use deadpool_postgres::{Config, ManagerConfig, Pool, PoolConfig, RecyclingMethod, Runtime};
use tokio_postgres::{NoTls, Row};
use tracing::{debug, info, instrument};
use uuid::Uuid;

use xray_pipeline_core::contract::{NewSignal, SignalPatch, SignalRecord, SignalStore};
use xray_pipeline_core::error::StoreError;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS signals (
    seq         BIGSERIAL,
    id          UUID PRIMARY KEY,
    device_id   TEXT NOT NULL,
    signal_time TIMESTAMPTZ NOT NULL,
    data_length BIGINT NOT NULL,
    data_volume BIGINT NOT NULL,
    created_at  TIMESTAMPTZ NOT NULL,
    updated_at  TIMESTAMPTZ NOT NULL
);
CREATE INDEX IF NOT EXISTS signals_device_id_idx ON signals (device_id);
";

const COLUMNS: &str = "id, device_id, signal_time, data_length, data_volume, created_at, updated_at";

#[derive(Clone)]
pub struct PostgresSignalStore {
    pool: Pool,
}

impl PostgresSignalStore {
    /// Build the pool and make sure the `signals` table exists.
    pub async fn connect(url: &str, max_pool_size: usize) -> Result<Self> {
        let mut cfg = Config::new();
        cfg.url = Some(url.to_string());
        cfg.manager = Some(ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        });
        cfg.pool = Some(PoolConfig::new(max_pool_size.max(1)));

        let pool = cfg
            .create_pool(Some(Runtime::Tokio1), NoTls)
            .context("Failed to create PostgreSQL pool")?;

        let store = Self { pool };
        store.migrate().await?;
        info!(max_pool_size, "[STORE] PostgreSQL signal store ready");
        Ok(store)
    }

    async fn migrate(&self) -> Result<()> {
        let client = self
            .pool
            .get()
            .await
            .context("Failed to acquire PostgreSQL connection")?;
        client
            .batch_execute(SCHEMA)
            .await
            .context("Failed to bootstrap signals schema")?;
        debug!("[STORE] Schema bootstrap complete");
        Ok(())
    }

    async fn client(&self) -> Result<deadpool_postgres::Client, StoreError> {
        self.pool
            .get()
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))
    }
}

fn record_from_row(row: &Row) -> Result<SignalRecord, StoreError> {
    let read = |e: tokio_postgres::Error| StoreError::ReadFailed(e.to_string());
    Ok(SignalRecord {
        id: row.try_get("id").map_err(read)?,
        device_id: row.try_get("device_id").map_err(read)?,
        time: row.try_get("signal_time").map_err(read)?,
        data_length: row.try_get("data_length").map_err(read)?,
        data_volume: row.try_get("data_volume").map_err(read)?,
        created_at: row.try_get("created_at").map_err(read)?,
        updated_at: row.try_get("updated_at").map_err(read)?,
    })
}

fn records_from_rows(rows: &[Row]) -> Result<Vec<SignalRecord>, StoreError> {
    rows.iter().map(record_from_row).collect()
}

#[async_trait]
impl SignalStore for PostgresSignalStore {
    #[instrument(skip(self, signal), fields(device_id = %signal.device_id))]
    async fn create(&self, signal: NewSignal) -> Result<SignalRecord, StoreError> {
        let client = self.client().await?;
        let id = Uuid::new_v4();
        let now: DateTime<Utc> = Utc::now();

        let row = client
            .query_one(
                &format!(
                    "INSERT INTO signals (id, device_id, signal_time, data_length, data_volume, created_at, updated_at)
                     VALUES ($1, $2, $3, $4, $5, $6, $6)
                     RETURNING {COLUMNS}"
                ),
                &[
                    &id,
                    &signal.device_id,
                    &signal.time,
                    &signal.data_length,
                    &signal.data_volume,
                    &now,
                ],
            )
            .await
            .map_err(|e| StoreError::WriteFailed(e.to_string()))?;

        debug!(%id, "[STORE] Inserted signal");
        record_from_row(&row)
    }

    async fn find_all(&self) -> Result<Vec<SignalRecord>, StoreError> {
        let client = self.client().await?;
        let rows = client
            .query(
                &format!("SELECT {COLUMNS} FROM signals ORDER BY created_at DESC, seq DESC"),
                &[],
            )
            .await
            .map_err(|e| StoreError::ReadFailed(e.to_string()))?;
        records_from_rows(&rows)
    }

    async fn find_by_device(&self, device_id: &str) -> Result<Vec<SignalRecord>, StoreError> {
        let client = self.client().await?;
        let rows = client
            .query(
                &format!(
                    "SELECT {COLUMNS} FROM signals WHERE device_id = $1 ORDER BY created_at DESC, seq DESC"
                ),
                &[&device_id],
            )
            .await
            .map_err(|e| StoreError::ReadFailed(e.to_string()))?;
        records_from_rows(&rows)
    }

    #[instrument(skip(self, patch))]
    async fn update_by_id(
        &self,
        id: Uuid,
        patch: SignalPatch,
    ) -> Result<Option<SignalRecord>, StoreError> {
        let client = self.client().await?;
        let now: DateTime<Utc> = Utc::now();

        let row = client
            .query_opt(
                &format!(
                    "UPDATE signals SET
                        device_id   = COALESCE($2, device_id),
                        signal_time = COALESCE($3, signal_time),
                        data_length = COALESCE($4, data_length),
                        data_volume = COALESCE($5, data_volume),
                        updated_at  = $6
                     WHERE id = $1
                     RETURNING {COLUMNS}"
                ),
                &[
                    &id,
                    &patch.device_id,
                    &patch.time,
                    &patch.data_length,
                    &patch.data_volume,
                    &now,
                ],
            )
            .await
            .map_err(|e| StoreError::WriteFailed(e.to_string()))?;

        row.as_ref().map(record_from_row).transpose()
    }

    #[instrument(skip(self))]
    async fn delete_by_id(&self, id: Uuid) -> Result<Option<SignalRecord>, StoreError> {
        let client = self.client().await?;
        let row = client
            .query_opt(
                &format!("DELETE FROM signals WHERE id = $1 RETURNING {COLUMNS}"),
                &[&id],
            )
            .await
            .map_err(|e| StoreError::WriteFailed(e.to_string()))?;

        row.as_ref().map(record_from_row).transpose()
    }
}
