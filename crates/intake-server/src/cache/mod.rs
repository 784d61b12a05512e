//! Fast-path cache for inspection content: an in-process TTL map, optionally
//! mirrored to Redis. Entries expire by TTL only; the write pipeline
//! refreshes the entry after every persisted patch.

use intake_model::InspectionId;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::warn;

pub mod redis_mirror;

pub use redis_mirror::{RedisMirror, RedisPolicy};

#[derive(Clone)]
struct CacheEntry {
    data: Value,
    stored_at: Instant,
}

#[derive(Default)]
pub struct CacheMetrics {
    pub hits: AtomicU64,
    pub misses: AtomicU64,
    pub mirror_fallbacks: AtomicU64,
}

pub struct DocumentCache {
    ttl: Duration,
    entries: Mutex<HashMap<InspectionId, CacheEntry>>,
    mirror: Option<RedisMirror>,
    pub metrics: Arc<CacheMetrics>,
}

impl DocumentCache {
    #[must_use]
    pub fn new(ttl: Duration, mirror: Option<RedisMirror>) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
            mirror,
            metrics: Arc::new(CacheMetrics::default()),
        }
    }

    /// Unconditionally overwrites the entry for `id`. Mirror failures are
    /// counted and logged; the caller never sees them.
    pub async fn put(&self, id: &InspectionId, data: &Value) {
        {
            let mut entries = self.entries.lock().await;
            entries.retain(|_, v| v.stored_at.elapsed() <= self.ttl);
            entries.insert(
                id.clone(),
                CacheEntry {
                    data: data.clone(),
                    stored_at: Instant::now(),
                },
            );
        }
        if let Some(mirror) = &self.mirror {
            let payload = data.to_string();
            if let Err(e) = mirror
                .set_document(id.as_str(), &payload, self.ttl.as_secs())
                .await
            {
                self.metrics.mirror_fallbacks.fetch_add(1, Ordering::Relaxed);
                warn!(inspection_id = %id, "cache mirror write failed: {e}");
            }
        }
    }

    /// Returns the cached content, or `None` when absent or past expiry. A
    /// local miss falls back to the mirror and backfills on a mirror hit.
    pub async fn get(&self, id: &InspectionId) -> Option<Value> {
        {
            let mut entries = self.entries.lock().await;
            entries.retain(|_, v| v.stored_at.elapsed() <= self.ttl);
            if let Some(entry) = entries.get(id) {
                self.metrics.hits.fetch_add(1, Ordering::Relaxed);
                return Some(entry.data.clone());
            }
        }
        if let Some(mirror) = &self.mirror {
            match mirror.get_document(id.as_str()).await {
                Ok(Some(raw)) => match serde_json::from_str::<Value>(&raw) {
                    Ok(data) => {
                        let mut entries = self.entries.lock().await;
                        entries.insert(
                            id.clone(),
                            CacheEntry {
                                data: data.clone(),
                                stored_at: Instant::now(),
                            },
                        );
                        self.metrics.hits.fetch_add(1, Ordering::Relaxed);
                        return Some(data);
                    }
                    Err(e) => {
                        warn!(inspection_id = %id, "cache mirror entry unreadable: {e}");
                    }
                },
                Ok(None) => {}
                Err(e) => {
                    self.metrics.mirror_fallbacks.fetch_add(1, Ordering::Relaxed);
                    warn!(inspection_id = %id, "cache mirror read failed: {e}");
                }
            }
        }
        self.metrics.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    /// Drops the entry for `id`, locally and in the mirror. Used when an
    /// inspection is deleted; TTL handles everything else.
    pub async fn remove(&self, id: &InspectionId) {
        self.entries.lock().await.remove(id);
        if let Some(mirror) = &self.mirror {
            if let Err(e) = mirror.del_document(id.as_str()).await {
                self.metrics.mirror_fallbacks.fetch_add(1, Ordering::Relaxed);
                warn!(inspection_id = %id, "cache mirror delete failed: {e}");
            }
        }
    }
}
