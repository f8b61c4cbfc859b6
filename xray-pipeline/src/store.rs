use std::sync::Arc;

use anyhow::{bail, Result};
use tracing::info;

use xray_pipeline_core::contract::SignalStore;
use xray_pipeline_core::memory::InMemorySignalStore;

use crate::postgres::PostgresSignalStore;

/// Which backend a storage URI selects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    Memory,
    Postgres,
}

impl StoreKind {
    pub fn from_uri(uri: &str) -> Result<Self> {
        let scheme = uri.split_once("://").map(|(scheme, _)| scheme);
        match scheme {
            Some("memory") => Ok(StoreKind::Memory),
            Some("postgres") | Some("postgresql") => Ok(StoreKind::Postgres),
            _ => bail!("Unsupported storage URI '{uri}': expected memory://, postgres:// or postgresql://"),
        }
    }
}

/// Acquire the storage handle shared by the consumer and the HTTP API.
pub async fn open_store(uri: &str, pool_size: usize) -> Result<Arc<dyn SignalStore>> {
    match StoreKind::from_uri(uri)? {
        StoreKind::Memory => {
            info!("[STORE] Using in-memory signal store");
            Ok(Arc::new(InMemorySignalStore::new()))
        }
        StoreKind::Postgres => Ok(Arc::new(PostgresSignalStore::connect(uri, pool_size).await?)),
    }
}
