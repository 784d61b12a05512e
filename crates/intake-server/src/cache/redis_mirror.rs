use redis::AsyncCommands;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::time::timeout;

#[derive(Clone, Debug)]
pub struct RedisPolicy {
    pub timeout: Duration,
    pub retry_attempts: usize,
    pub breaker_failure_threshold: u32,
    pub breaker_open_duration: Duration,
}

impl Default for RedisPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(50),
            retry_attempts: 2,
            breaker_failure_threshold: 8,
            breaker_open_duration: Duration::from_millis(3000),
        }
    }
}

#[derive(Default)]
struct BreakerState {
    failure_count: u32,
    open_until: Option<Instant>,
}

#[derive(Default)]
pub struct MirrorMetrics {
    pub hits: AtomicU64,
    pub misses: AtomicU64,
    pub read_fallbacks: AtomicU64,
    pub write_fallbacks: AtomicU64,
    pub breaker_open_total: AtomicU64,
    pub breaker_reject_total: AtomicU64,
}

/// Write-through mirror of the fast-path cache in Redis. Strictly advisory:
/// every failure is swallowed by the caller after being counted here, and a
/// breaker keeps a dead Redis from adding latency to the patch pipeline.
#[derive(Clone)]
pub struct RedisMirror {
    client: redis::Client,
    prefix: String,
    policy: RedisPolicy,
    breaker: Arc<Mutex<BreakerState>>,
    pub metrics: Arc<MirrorMetrics>,
}

impl RedisMirror {
    pub fn new(url: &str, prefix: &str, policy: RedisPolicy) -> Result<Self, String> {
        let client = redis::Client::open(url).map_err(|e| e.to_string())?;
        Ok(Self {
            client,
            prefix: prefix.to_string(),
            policy,
            breaker: Arc::new(Mutex::new(BreakerState::default())),
            metrics: Arc::new(MirrorMetrics::default()),
        })
    }

    fn document_key(&self, id: &str) -> String {
        if self.prefix.is_empty() {
            format!("inspection:{id}")
        } else {
            format!("{}:inspection:{id}", self.prefix)
        }
    }

    async fn breaker_check(&self) -> Result<(), String> {
        let lock = self.breaker.lock().await;
        if let Some(until) = lock.open_until {
            if Instant::now() < until {
                self.metrics
                    .breaker_reject_total
                    .fetch_add(1, Ordering::Relaxed);
                return Err("redis breaker open".to_string());
            }
        }
        Ok(())
    }

    async fn record_failure(&self, fallback_counter: &AtomicU64, msg: String) -> String {
        fallback_counter.fetch_add(1, Ordering::Relaxed);
        let mut lock = self.breaker.lock().await;
        lock.failure_count += 1;
        if lock.failure_count >= self.policy.breaker_failure_threshold {
            lock.open_until = Some(Instant::now() + self.policy.breaker_open_duration);
            self.metrics
                .breaker_open_total
                .fetch_add(1, Ordering::Relaxed);
        }
        msg
    }

    async fn record_success(&self) {
        let mut lock = self.breaker.lock().await;
        lock.failure_count = 0;
        lock.open_until = None;
    }

    async fn with_retry<T, Fut, F>(&self, mut op: F) -> Result<T, String>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, String>>,
    {
        let attempts = self.policy.retry_attempts.max(1);
        let mut last = None;
        for i in 0..attempts {
            match timeout(self.policy.timeout, op()).await {
                Ok(Ok(v)) => return Ok(v),
                Ok(Err(e)) => last = Some(e),
                Err(_) => last = Some("redis timeout".to_string()),
            }
            if i + 1 < attempts {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        }
        Err(last.unwrap_or_else(|| "redis failure".to_string()))
    }

    pub async fn get_document(&self, id: &str) -> Result<Option<String>, String> {
        self.breaker_check().await?;
        let key = self.document_key(id);
        let this = self.clone();
        let result = self
            .with_retry(move || {
                let this = this.clone();
                let key = key.clone();
                async move {
                    let mut conn = this
                        .client
                        .get_multiplexed_async_connection()
                        .await
                        .map_err(|e| e.to_string())?;
                    conn.get(key).await.map_err(|e| e.to_string())
                }
            })
            .await;
        match result {
            Ok(Some(v)) => {
                self.metrics.hits.fetch_add(1, Ordering::Relaxed);
                self.record_success().await;
                Ok(Some(v))
            }
            Ok(None) => {
                self.metrics.misses.fetch_add(1, Ordering::Relaxed);
                self.record_success().await;
                Ok(None)
            }
            Err(e) => Err(self.record_failure(&self.metrics.read_fallbacks, e).await),
        }
    }

    pub async fn set_document(&self, id: &str, payload: &str, ttl_secs: u64) -> Result<(), String> {
        self.breaker_check().await?;
        let key = self.document_key(id);
        let payload = payload.to_string();
        let this = self.clone();
        let result = self
            .with_retry(move || {
                let this = this.clone();
                let key = key.clone();
                let payload = payload.clone();
                async move {
                    let mut conn = this
                        .client
                        .get_multiplexed_async_connection()
                        .await
                        .map_err(|e| e.to_string())?;
                    let _: () = conn
                        .set_ex(key, payload, ttl_secs.max(1))
                        .await
                        .map_err(|e| e.to_string())?;
                    Ok(())
                }
            })
            .await;
        match result {
            Ok(()) => {
                self.record_success().await;
                Ok(())
            }
            Err(e) => Err(self.record_failure(&self.metrics.write_fallbacks, e).await),
        }
    }

    pub async fn del_document(&self, id: &str) -> Result<(), String> {
        self.breaker_check().await?;
        let key = self.document_key(id);
        let this = self.clone();
        let result = self
            .with_retry(move || {
                let this = this.clone();
                let key = key.clone();
                async move {
                    let mut conn = this
                        .client
                        .get_multiplexed_async_connection()
                        .await
                        .map_err(|e| e.to_string())?;
                    let _: () = conn.del(key).await.map_err(|e| e.to_string())?;
                    Ok(())
                }
            })
            .await;
        match result {
            Ok(()) => {
                self.record_success().await;
                Ok(())
            }
            Err(e) => Err(self.record_failure(&self.metrics.write_fallbacks, e).await),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_format_matches_wire_contract() {
        let mirror = RedisMirror::new("redis://127.0.0.1:1/", "", RedisPolicy::default())
            .expect("client");
        assert_eq!(mirror.document_key("abc"), "inspection:abc");
        let prefixed = RedisMirror::new("redis://127.0.0.1:1/", "intake", RedisPolicy::default())
            .expect("client");
        assert_eq!(prefixed.document_key("abc"), "intake:inspection:abc");
    }

    #[tokio::test]
    async fn unreachable_redis_trips_the_breaker() {
        let policy = RedisPolicy {
            timeout: Duration::from_millis(10),
            retry_attempts: 1,
            breaker_failure_threshold: 2,
            breaker_open_duration: Duration::from_secs(60),
        };
        let mirror =
            RedisMirror::new("redis://127.0.0.1:1/", "intake", policy).expect("client");
        assert!(mirror.set_document("a", "{}", 60).await.is_err());
        assert!(mirror.set_document("a", "{}", 60).await.is_err());
        // Third attempt is rejected by the open breaker without touching the network.
        assert!(mirror.set_document("a", "{}", 60).await.is_err());
        assert_eq!(mirror.metrics.breaker_reject_total.load(Ordering::Relaxed), 1);
    }
}
