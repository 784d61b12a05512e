//! The write pipeline for inspection documents: per-document lock, load,
//! patch, save, cache refresh, broadcast. Each step is async I/O; a failure
//! aborts the remaining steps with no compensating rollback.

use crate::cache::DocumentCache;
use crate::live::LiveHub;
use chrono::{DateTime, Utc};
use intake_core::document::{apply_patch, PatchError};
use intake_core::path::FieldPath;
use intake_model::{
    Inspection, InspectionId, InspectionKind, InspectionStatus, UpdateEvent, VehicleId,
};
use intake_store::{IntakeStore, StoreError};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt::{Display, Formatter};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum PipelineError {
    NotFound { entity: &'static str, id: String },
    Closed,
    PathConflict { at: String },
    InvalidTransition(String),
    Storage(StoreError),
}

impl Display for PipelineError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound { entity, id } => write!(f, "{entity} {id} not found"),
            Self::Closed => write!(f, "inspection is closed to edits"),
            Self::PathConflict { at } => {
                write!(f, "path conflict: `{at}` holds a non-mapping value")
            }
            Self::InvalidTransition(reason) => write!(f, "{reason}"),
            Self::Storage(e) => write!(f, "storage failure: {e}"),
        }
    }
}

impl std::error::Error for PipelineError {}

fn store_error(entity: &'static str, id: &str, e: StoreError) -> PipelineError {
    if e.is_not_found() {
        PipelineError::NotFound {
            entity,
            id: id.to_string(),
        }
    } else {
        PipelineError::Storage(e)
    }
}

#[derive(Default)]
pub struct PipelineMetrics {
    pub patches_applied: AtomicU64,
    pub patches_rejected: AtomicU64,
}

/// Owns every write to inspection documents. The lock arena (one mutex per
/// inspection id) serializes the load-modify-save sequence per document, so
/// concurrent patches to sibling paths cannot stomp each other; patches to
/// distinct documents never contend.
pub struct UpdatePipeline {
    store: Arc<dyn IntakeStore>,
    cache: Arc<DocumentCache>,
    hub: Arc<LiveHub>,
    locks: Mutex<HashMap<InspectionId, Arc<Mutex<()>>>>,
    pub metrics: Arc<PipelineMetrics>,
}

impl UpdatePipeline {
    #[must_use]
    pub fn new(
        store: Arc<dyn IntakeStore>,
        cache: Arc<DocumentCache>,
        hub: Arc<LiveHub>,
    ) -> Arc<Self> {
        Arc::new(Self {
            store,
            cache,
            hub,
            locks: Mutex::new(HashMap::new()),
            metrics: Arc::new(PipelineMetrics::default()),
        })
    }

    async fn document_lock(&self, id: &InspectionId) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        Arc::clone(
            locks
                .entry(id.clone())
                .or_insert_with(|| Arc::new(Mutex::new(()))),
        )
    }

    /// Starts an inspection for an existing vehicle.
    pub async fn start_inspection(
        &self,
        vehicle_id: VehicleId,
        inspector_id: String,
        kind: InspectionKind,
    ) -> Result<Inspection, PipelineError> {
        self.store
            .load_vehicle(&vehicle_id)
            .await
            .map_err(|e| store_error("vehicle", vehicle_id.as_str(), e))?;
        let inspection = Inspection::start(vehicle_id, inspector_id, kind);
        self.store
            .create_inspection(&inspection)
            .await
            .map_err(PipelineError::Storage)?;
        self.cache.put(&inspection.id, &inspection.data).await;
        info!(inspection_id = %inspection.id, kind = %inspection.kind, "inspection started");
        Ok(inspection)
    }

    /// Applies one `(path, value)` patch: load, patch, save, refresh the
    /// cache entry, then broadcast to subscribers. The returned event is the
    /// acknowledgment sent back to the HTTP caller.
    pub async fn apply_update(
        &self,
        id: &InspectionId,
        path: &FieldPath,
        value: Value,
        actor_id: &str,
    ) -> Result<UpdateEvent, PipelineError> {
        let lock = self.document_lock(id).await;
        let _guard = lock.lock().await;

        let mut inspection = self
            .store
            .load_inspection(id)
            .await
            .map_err(|e| store_error("inspection", id.as_str(), e))?;
        if !inspection.can_edit() {
            self.metrics.patches_rejected.fetch_add(1, Ordering::Relaxed);
            return Err(PipelineError::Closed);
        }
        if let Err(e) = apply_patch(&mut inspection.data, path, value.clone()) {
            self.metrics.patches_rejected.fetch_add(1, Ordering::Relaxed);
            return Err(match e {
                PatchError::Conflict { at } => PipelineError::PathConflict { at },
                PatchError::NotAnObject => PipelineError::PathConflict {
                    at: String::new(),
                },
            });
        }
        inspection.updated_at = Utc::now();
        self.store
            .save_inspection(&inspection)
            .await
            .map_err(|e| store_error("inspection", id.as_str(), e))?;

        self.cache.put(id, &inspection.data).await;

        let event = UpdateEvent {
            inspection_id: id.clone(),
            path: path.as_str().to_string(),
            value,
            timestamp: inspection.updated_at,
            actor_id: actor_id.to_string(),
        };
        let delivered = self.hub.broadcast(&event);
        self.metrics.patches_applied.fetch_add(1, Ordering::Relaxed);
        debug!(
            inspection_id = %id,
            path = %path,
            delivered,
            "patch persisted and broadcast"
        );
        Ok(event)
    }

    /// Moves the lifecycle forward. Runs under the document lock so a status
    /// write cannot clobber a concurrent patch's `data`.
    pub async fn update_status(
        &self,
        id: &InspectionId,
        status: InspectionStatus,
        completed_at: Option<DateTime<Utc>>,
    ) -> Result<Inspection, PipelineError> {
        let lock = self.document_lock(id).await;
        let _guard = lock.lock().await;

        let mut inspection = self
            .store
            .load_inspection(id)
            .await
            .map_err(|e| store_error("inspection", id.as_str(), e))?;
        inspection
            .transition(status, completed_at)
            .map_err(|e| PipelineError::InvalidTransition(e.to_string()))?;
        self.store
            .save_inspection(&inspection)
            .await
            .map_err(|e| store_error("inspection", id.as_str(), e))?;
        info!(inspection_id = %id, status = %inspection.status, "inspection status updated");
        Ok(inspection)
    }

    /// Administrative delete. Outside the synchronization core but it must
    /// still hold the document lock and drop the cache entry.
    pub async fn delete_inspection(&self, id: &InspectionId) -> Result<(), PipelineError> {
        let lock = self.document_lock(id).await;
        {
            let _guard = lock.lock().await;
            self.store
                .delete_inspection(id)
                .await
                .map_err(|e| store_error("inspection", id.as_str(), e))?;
            self.cache.remove(id).await;
        }
        self.locks.lock().await.remove(id);
        info!(inspection_id = %id, "inspection deleted");
        Ok(())
    }

    /// Fast-path content read: cache first, store on miss, backfilling the
    /// cache entry. The store remains authoritative.
    pub async fn load_data(&self, id: &InspectionId) -> Result<Value, PipelineError> {
        if let Some(data) = self.cache.get(id).await {
            return Ok(data);
        }
        let inspection = self
            .store
            .load_inspection(id)
            .await
            .map_err(|e| store_error("inspection", id.as_str(), e))?;
        self.cache.put(id, &inspection.data).await;
        Ok(inspection.data)
    }
}
