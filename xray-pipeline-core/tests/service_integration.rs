use std::sync::Arc;

use chrono::{TimeZone, Utc};
use uuid::Uuid;

use xray_pipeline_core::contract::{MockSignalStore, NewSignal, SignalPatch, SignalRecord};
use xray_pipeline_core::error::{ServiceError, StoreError};
use xray_pipeline_core::memory::InMemorySignalStore;
use xray_pipeline_core::service::SignalService;

fn new_signal(device_id: &str) -> NewSignal {
    NewSignal {
        device_id: device_id.to_string(),
        time: Utc.timestamp_millis_opt(1_697_323_080_000).unwrap(),
        data_length: 2,
        data_volume: 120,
    }
}

fn record(id: Uuid, device_id: &str) -> SignalRecord {
    let now = Utc::now();
    SignalRecord {
        id,
        device_id: device_id.to_string(),
        time: Utc.timestamp_millis_opt(1_697_323_080_000).unwrap(),
        data_length: 2,
        data_volume: 120,
        created_at: now,
        updated_at: now,
    }
}

#[tokio::test]
async fn test_find_by_device_with_no_records_is_not_found() {
    let mut store = MockSignalStore::new();
    store
        .expect_find_by_device()
        .withf(|device_id: &str| device_id == "ghost")
        .times(1)
        .returning(|_| Ok(Vec::new()));

    let service = SignalService::new(Arc::new(store));
    let err = service.find_by_device("ghost").await.unwrap_err();

    match err {
        ServiceError::NotFound(message) => {
            assert_eq!(message, "No signals found for deviceId: ghost")
        }
        other => panic!("expected NotFound, got {other:?}"),
    }
}

#[tokio::test]
async fn test_find_by_device_returns_newest_first() {
    let store = Arc::new(InMemorySignalStore::new());
    let service = SignalService::new(store.clone());

    let older = service.create(new_signal("dev-1")).await.unwrap();
    service.create(new_signal("dev-2")).await.unwrap();
    let newer = service.create(new_signal("dev-1")).await.unwrap();

    let found = service.find_by_device("dev-1").await.unwrap();
    let ids: Vec<Uuid> = found.iter().map(|r| r.id).collect();
    assert_eq!(ids, vec![newer.id, older.id]);

    assert_eq!(service.list_all().await.unwrap().len(), 3);
}

#[tokio::test]
async fn test_update_of_missing_record_is_not_found() {
    let id = Uuid::new_v4();
    let mut store = MockSignalStore::new();
    store
        .expect_update_by_id()
        .withf(move |candidate: &Uuid, _patch: &SignalPatch| *candidate == id)
        .times(1)
        .returning(|_, _| Ok(None));

    let service = SignalService::new(Arc::new(store));
    let patch = SignalPatch {
        data_length: Some(5),
        ..Default::default()
    };
    let err = service.update(&id.to_string(), patch).await.unwrap_err();

    match err {
        ServiceError::NotFound(message) => {
            assert_eq!(message, format!("Signal with ID \"{id}\" not found"))
        }
        other => panic!("expected NotFound, got {other:?}"),
    }
}

#[tokio::test]
async fn test_update_merges_patch_into_existing_record() {
    let store = Arc::new(InMemorySignalStore::new());
    let service = SignalService::new(store);
    let created = service.create(new_signal("dev-1")).await.unwrap();

    let patch = SignalPatch {
        device_id: Some("dev-renamed".to_string()),
        ..Default::default()
    };
    let updated = service
        .update(&created.id.to_string(), patch)
        .await
        .unwrap();

    assert_eq!(updated.id, created.id);
    assert_eq!(updated.device_id, "dev-renamed");
    assert_eq!(updated.data_length, created.data_length);
}

#[tokio::test]
async fn test_delete_returns_confirmation_with_id() {
    let id = Uuid::new_v4();
    let mut store = MockSignalStore::new();
    store
        .expect_delete_by_id()
        .times(1)
        .returning(move |candidate| Ok(Some(record(candidate, "dev-1"))));

    let service = SignalService::new(Arc::new(store));
    let confirmation = service.delete(&id.to_string()).await.unwrap();

    assert!(confirmation.deleted);
    assert_eq!(confirmation.id, id);
}

#[tokio::test]
async fn test_delete_of_missing_record_is_not_found() {
    let mut store = MockSignalStore::new();
    store
        .expect_delete_by_id()
        .times(1)
        .returning(|_| Ok(None));

    let service = SignalService::new(Arc::new(store));
    let err = service.delete(&Uuid::new_v4().to_string()).await.unwrap_err();

    assert!(matches!(err, ServiceError::NotFound(_)));
}

#[tokio::test]
async fn test_malformed_id_is_not_found_without_storage_call() {
    let mut store = MockSignalStore::new();
    store.expect_update_by_id().never();
    store.expect_delete_by_id().never();

    let service = SignalService::new(Arc::new(store));

    let err = service.delete("not-a-uuid").await.unwrap_err();
    assert!(matches!(err, ServiceError::NotFound(ref m) if m.contains("not-a-uuid")));

    let err = service
        .update("not-a-uuid", SignalPatch::default())
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::NotFound(_)));
}

#[tokio::test]
async fn test_create_rejects_invalid_shapes_without_storage_call() {
    let mut store = MockSignalStore::new();
    store.expect_create().never();
    let service = SignalService::new(Arc::new(store));

    let mut empty_device = new_signal("");
    empty_device.device_id.clear();
    assert!(matches!(
        service.create(empty_device).await,
        Err(ServiceError::Invalid(_))
    ));

    let mut zero_length = new_signal("dev-1");
    zero_length.data_length = 0;
    assert!(matches!(
        service.create(zero_length).await,
        Err(ServiceError::Invalid(ref m)) if m.contains("dataLength")
    ));

    let mut negative_volume = new_signal("dev-1");
    negative_volume.data_volume = -1;
    assert!(matches!(
        service.create(negative_volume).await,
        Err(ServiceError::Invalid(ref m)) if m.contains("dataVolume")
    ));
}

#[tokio::test]
async fn test_storage_errors_surface_as_store_errors() {
    let mut store = MockSignalStore::new();
    store
        .expect_find_all()
        .times(1)
        .returning(|| Err(StoreError::Unavailable("pool timed out".to_string())));

    let service = SignalService::new(Arc::new(store));
    let err = service.list_all().await.unwrap_err();

    assert!(matches!(err, ServiceError::Store(StoreError::Unavailable(_))));
}
