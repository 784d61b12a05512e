use super::*;
use crate::pipeline::PipelineError;
use intake_core::path::FieldPath;
use intake_model::{Inspection, InspectionId, InspectionKind, InspectionStatus, Vehicle};
use intake_store::MemoryStore;
use serde_json::json;
use std::sync::atomic::Ordering;
use std::time::Duration;

struct Fixture {
    store: Arc<MemoryStore>,
    state: AppState,
}

fn fixture() -> Fixture {
    let store = Arc::new(MemoryStore::default());
    let state = AppState::new(store.clone());
    Fixture { store, state }
}

async fn seeded_inspection(fx: &Fixture) -> Inspection {
    let vehicle = Vehicle::check_in("AB-1234").expect("vehicle");
    fx.store.create_vehicle(&vehicle).await.expect("create vehicle");
    let inspection = Inspection::start(
        vehicle.id.clone(),
        "inspector-1".to_string(),
        InspectionKind::Entry,
    );
    fx.store
        .create_inspection(&inspection)
        .await
        .expect("create inspection");
    inspection
}

fn path(raw: &str) -> FieldPath {
    FieldPath::parse(raw).expect("valid path")
}

#[tokio::test]
async fn patch_persists_caches_and_broadcasts() {
    let fx = fixture();
    let inspection = seeded_inspection(&fx).await;
    let (guard, mut rx) = fx.state.hub.register();
    fx.state.hub.subscribe(guard.id(), inspection.id.clone());

    let event = fx
        .state
        .pipeline
        .apply_update(
            &inspection.id,
            &path("exterior.paintCondition"),
            json!("good"),
            "inspector-1",
        )
        .await
        .expect("patch applies");

    assert_eq!(event.inspection_id, inspection.id);
    assert_eq!(event.path, "exterior.paintCondition");
    assert_eq!(event.value, json!("good"));
    assert_eq!(event.actor_id, "inspector-1");

    let stored = fx
        .store
        .load_inspection(&inspection.id)
        .await
        .expect("load");
    assert_eq!(
        stored.data,
        json!({"exterior": {"paintCondition": "good"}})
    );
    assert!(stored.updated_at >= inspection.updated_at);

    let cached = fx.state.cache.get(&inspection.id).await.expect("cached");
    assert_eq!(cached, stored.data);

    let pushed = rx.try_recv().expect("subscriber notified");
    let intake_api::ws::ServerMessage::InspectionUpdate { data } = pushed;
    assert_eq!(data, event);
    assert_eq!(
        fx.state.pipeline.metrics.patches_applied.load(Ordering::Relaxed),
        1
    );
}

#[tokio::test]
async fn sequential_patches_arrive_in_persisted_order() {
    let fx = fixture();
    let inspection = seeded_inspection(&fx).await;
    let (guard, mut rx) = fx.state.hub.register();
    fx.state.hub.subscribe(guard.id(), inspection.id.clone());

    for (field_path, value) in [
        ("exterior.paintCondition", json!("good")),
        ("exterior.photos.count", json!(4)),
    ] {
        fx.state
            .pipeline
            .apply_update(&inspection.id, &path(field_path), value, "inspector-1")
            .await
            .expect("patch applies");
    }

    let first = rx.try_recv().expect("first event");
    let second = rx.try_recv().expect("second event");
    let intake_api::ws::ServerMessage::InspectionUpdate { data: first } = first;
    let intake_api::ws::ServerMessage::InspectionUpdate { data: second } = second;
    assert_eq!(first.path, "exterior.paintCondition");
    assert_eq!(second.path, "exterior.photos.count");

    let stored = fx
        .store
        .load_inspection(&inspection.id)
        .await
        .expect("load");
    assert_eq!(
        stored.data["exterior"],
        json!({"paintCondition": "good", "photos": {"count": 4}})
    );
}

#[tokio::test]
async fn patch_unknown_inspection_is_not_found_and_creates_nothing() {
    let fx = fixture();
    let id = InspectionId::parse("does-not-exist").expect("id");
    let err = fx
        .state
        .pipeline
        .apply_update(&id, &path("a.b"), json!(1), "inspector-1")
        .await
        .expect_err("absent inspection");
    assert!(matches!(err, PipelineError::NotFound { entity: "inspection", .. }));
    assert!(fx
        .store
        .list_inspections(None)
        .await
        .expect("list")
        .is_empty());
    assert_eq!(fx.state.cache.get(&id).await, None);
}

#[tokio::test]
async fn patch_closed_inspection_is_refused() {
    let fx = fixture();
    let inspection = seeded_inspection(&fx).await;
    fx.state
        .pipeline
        .update_status(&inspection.id, InspectionStatus::Completed, None)
        .await
        .expect("complete");

    let err = fx
        .state
        .pipeline
        .apply_update(&inspection.id, &path("a"), json!(1), "inspector-1")
        .await
        .expect_err("closed inspection");
    assert_eq!(err, PipelineError::Closed);
    assert_eq!(
        fx.state.pipeline.metrics.patches_rejected.load(Ordering::Relaxed),
        1
    );
}

#[tokio::test]
async fn path_conflict_leaves_document_unchanged() {
    let fx = fixture();
    let inspection = seeded_inspection(&fx).await;
    fx.state
        .pipeline
        .apply_update(&inspection.id, &path("mileage"), json!(42), "inspector-1")
        .await
        .expect("patch applies");

    let err = fx
        .state
        .pipeline
        .apply_update(
            &inspection.id,
            &path("mileage.reading"),
            json!(43),
            "inspector-1",
        )
        .await
        .expect_err("scalar prefix");
    assert_eq!(
        err,
        PipelineError::PathConflict {
            at: "mileage".to_string()
        }
    );
    let stored = fx
        .store
        .load_inspection(&inspection.id)
        .await
        .expect("load");
    assert_eq!(stored.data, json!({"mileage": 42}));
}

#[tokio::test]
async fn concurrent_patches_to_sibling_paths_both_survive() {
    let fx = fixture();
    let inspection = seeded_inspection(&fx).await;

    let mut joins = Vec::new();
    for (field_path, value) in [
        ("exterior.paintCondition", json!("good")),
        ("exterior.photos.count", json!(4)),
        ("interior.seats", json!("worn")),
        ("interior.odometer", json!(120_000)),
    ] {
        let pipeline = Arc::clone(&fx.state.pipeline);
        let id = inspection.id.clone();
        joins.push(tokio::spawn(async move {
            pipeline
                .apply_update(&id, &path(field_path), value, "inspector-1")
                .await
        }));
    }
    for join in joins {
        join.await.expect("join").expect("patch applies");
    }

    let stored = fx
        .store
        .load_inspection(&inspection.id)
        .await
        .expect("load");
    assert_eq!(
        stored.data,
        json!({
            "exterior": {"paintCondition": "good", "photos": {"count": 4}},
            "interior": {"seats": "worn", "odometer": 120_000},
        })
    );
}

#[tokio::test]
async fn save_failure_aborts_cache_refresh_and_broadcast() {
    let fx = fixture();
    let inspection = seeded_inspection(&fx).await;
    let (guard, mut rx) = fx.state.hub.register();
    fx.state.hub.subscribe(guard.id(), inspection.id.clone());

    fx.store.fail_saves.store(true, Ordering::Relaxed);
    let err = fx
        .state
        .pipeline
        .apply_update(&inspection.id, &path("a"), json!(1), "inspector-1")
        .await
        .expect_err("storage failure");
    assert!(matches!(err, PipelineError::Storage(_)));
    assert_eq!(fx.state.cache.get(&inspection.id).await, None);
    assert!(rx.try_recv().is_err(), "no broadcast after failed save");
}

#[tokio::test]
async fn start_inspection_requires_an_existing_vehicle() {
    let fx = fixture();
    let err = fx
        .state
        .pipeline
        .start_inspection(
            intake_model::VehicleId::generate(),
            "inspector-1".to_string(),
            InspectionKind::Entry,
        )
        .await
        .expect_err("unknown vehicle");
    assert!(matches!(err, PipelineError::NotFound { entity: "vehicle", .. }));
}

#[tokio::test]
async fn load_data_backfills_the_cache() {
    let fx = fixture();
    let inspection = seeded_inspection(&fx).await;
    assert_eq!(fx.state.cache.get(&inspection.id).await, None);

    let data = fx
        .state
        .pipeline
        .load_data(&inspection.id)
        .await
        .expect("load data");
    assert_eq!(data, json!({}));
    assert_eq!(fx.state.cache.get(&inspection.id).await, Some(json!({})));
}

#[tokio::test]
async fn delete_drops_the_cache_entry() {
    let fx = fixture();
    let inspection = seeded_inspection(&fx).await;
    fx.state
        .pipeline
        .apply_update(&inspection.id, &path("a"), json!(1), "inspector-1")
        .await
        .expect("patch applies");
    assert!(fx.state.cache.get(&inspection.id).await.is_some());

    fx.state
        .pipeline
        .delete_inspection(&inspection.id)
        .await
        .expect("delete");
    assert_eq!(fx.state.cache.get(&inspection.id).await, None);
    assert!(fx
        .store
        .load_inspection(&inspection.id)
        .await
        .expect_err("deleted")
        .is_not_found());
}

#[tokio::test]
async fn status_regression_is_an_invalid_transition() {
    let fx = fixture();
    let inspection = seeded_inspection(&fx).await;
    fx.state
        .pipeline
        .update_status(&inspection.id, InspectionStatus::Completed, None)
        .await
        .expect("complete");
    let err = fx
        .state
        .pipeline
        .update_status(&inspection.id, InspectionStatus::Draft, None)
        .await
        .expect_err("backwards");
    assert!(matches!(err, PipelineError::InvalidTransition(_)));
}

#[tokio::test]
async fn completion_timestamp_is_stable_across_resends() {
    let fx = fixture();
    let inspection = seeded_inspection(&fx).await;
    let completed = fx
        .state
        .pipeline
        .update_status(&inspection.id, InspectionStatus::Completed, None)
        .await
        .expect("complete");
    let stamped = completed.completed_at.expect("completed_at");

    tokio::time::sleep(Duration::from_millis(5)).await;
    let resent = fx
        .state
        .pipeline
        .update_status(&inspection.id, InspectionStatus::Completed, None)
        .await
        .expect("resend");
    assert_eq!(resent.completed_at, Some(stamped));
}
