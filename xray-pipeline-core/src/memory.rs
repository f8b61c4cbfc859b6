//! In-memory [`SignalStore`] for local runs (`memory://`) and tests.
//!
//! Records live in a `HashMap` behind a `tokio` `RwLock`; listings are sorted newest-first on read.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::contract::{NewSignal, SignalPatch, SignalRecord, SignalStore};
use crate::error::StoreError;

struct Entry {
    // Insertion order, breaks ties between records created in the same instant.
    seq: u64,
    record: SignalRecord,
}

#[derive(Default)]
struct Inner {
    next_seq: u64,
    entries: HashMap<Uuid, Entry>,
}

/// In-memory implementation of `SignalStore`, used for local development and tests.
#[derive(Default)]
pub struct InMemorySignalStore {
    inner: RwLock<Inner>,
}

impl InMemorySignalStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    async fn collect_newest_first<F>(&self, keep: F) -> Vec<SignalRecord>
    where
        F: Fn(&SignalRecord) -> bool,
    {
        let inner = self.inner.read().await;
        let mut entries: Vec<&Entry> = inner.entries.values().filter(|e| keep(&e.record)).collect();
        entries.sort_by(|a, b| {
            b.record
                .created_at
                .cmp(&a.record.created_at)
                .then(b.seq.cmp(&a.seq))
        });
        entries.into_iter().map(|e| e.record.clone()).collect()
    }
}

#[async_trait]
impl SignalStore for InMemorySignalStore {
    async fn create(&self, signal: NewSignal) -> Result<SignalRecord, StoreError> {
        let now = Utc::now();
        let record = SignalRecord {
            id: Uuid::new_v4(),
            device_id: signal.device_id,
            time: signal.time,
            data_length: signal.data_length,
            data_volume: signal.data_volume,
            created_at: now,
            updated_at: now,
        };

        let mut inner = self.inner.write().await;
        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.entries.insert(
            record.id,
            Entry {
                seq,
                record: record.clone(),
            },
        );
        Ok(record)
    }

    async fn find_all(&self) -> Result<Vec<SignalRecord>, StoreError> {
        Ok(self.collect_newest_first(|_| true).await)
    }

    async fn find_by_device(&self, device_id: &str) -> Result<Vec<SignalRecord>, StoreError> {
        Ok(self
            .collect_newest_first(|record| record.device_id == device_id)
            .await)
    }

    async fn update_by_id(
        &self,
        id: Uuid,
        patch: SignalPatch,
    ) -> Result<Option<SignalRecord>, StoreError> {
        let mut inner = self.inner.write().await;
        Ok(inner.entries.get_mut(&id).map(|entry| {
            patch.apply_to(&mut entry.record, Utc::now());
            entry.record.clone()
        }))
    }

    async fn delete_by_id(&self, id: Uuid) -> Result<Option<SignalRecord>, StoreError> {
        let mut inner = self.inner.write().await;
        Ok(inner.entries.remove(&id).map(|entry| entry.record))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn new_signal(device_id: &str, data_length: i64) -> NewSignal {
        NewSignal {
            device_id: device_id.to_string(),
            time: Utc.timestamp_millis_opt(1_697_323_080_000).unwrap(),
            data_length,
            data_volume: 100,
        }
    }

    #[tokio::test]
    async fn lists_newest_first() {
        let store = InMemorySignalStore::new();
        let first = store.create(new_signal("a", 1)).await.unwrap();
        let second = store.create(new_signal("b", 2)).await.unwrap();
        let third = store.create(new_signal("a", 3)).await.unwrap();

        let ids: Vec<Uuid> = store.find_all().await.unwrap().iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![third.id, second.id, first.id]);

        let for_a: Vec<Uuid> = store
            .find_by_device("a")
            .await
            .unwrap()
            .iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(for_a, vec![third.id, first.id]);
    }

    #[tokio::test]
    async fn update_merges_only_provided_fields() {
        let store = InMemorySignalStore::new();
        let created = store.create(new_signal("a", 1)).await.unwrap();

        let patch = SignalPatch {
            data_length: Some(20),
            ..Default::default()
        };
        let updated = store.update_by_id(created.id, patch).await.unwrap().unwrap();

        assert_eq!(updated.data_length, 20);
        assert_eq!(updated.device_id, "a");
        assert_eq!(updated.data_volume, 100);
        assert_eq!(updated.created_at, created.created_at);
        assert!(updated.updated_at >= created.updated_at);
    }

    #[tokio::test]
    async fn update_and_delete_of_unknown_id_return_none() {
        let store = InMemorySignalStore::new();
        let id = Uuid::new_v4();
        assert!(store
            .update_by_id(id, SignalPatch::default())
            .await
            .unwrap()
            .is_none());
        assert!(store.delete_by_id(id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn delete_removes_record() {
        let store = InMemorySignalStore::new();
        let created = store.create(new_signal("a", 1)).await.unwrap();

        let removed = store.delete_by_id(created.id).await.unwrap();
        assert_eq!(removed.map(|r| r.id), Some(created.id));
        assert!(store.is_empty().await);
    }
}
