//! In-process request metrics and the plaintext rendering served from
//! `/metrics`.

use crate::AppState;
use axum::http::StatusCode;
use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::atomic::Ordering;
use std::time::Duration;
use tokio::sync::Mutex;

const METRIC_SUBSYSTEM: &str = "intake";
const METRIC_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Default)]
pub struct RequestMetrics {
    counts: Mutex<HashMap<(String, u16), u64>>,
    latency_ns: Mutex<HashMap<String, Vec<u64>>>,
}

impl RequestMetrics {
    pub(crate) async fn observe_request(&self, route: &str, status: StatusCode, latency: Duration) {
        let mut counts = self.counts.lock().await;
        *counts
            .entry((route.to_string(), status.as_u16()))
            .or_insert(0) += 1;
        drop(counts);
        let mut latency_map = self.latency_ns.lock().await;
        latency_map
            .entry(route.to_string())
            .or_insert_with(Vec::new)
            .push(latency.as_nanos() as u64);
    }
}

fn percentile_ns(values: &[u64], pct: f64) -> u64 {
    if values.is_empty() {
        return 0;
    }
    let mut v = values.to_vec();
    v.sort_unstable();
    let idx = ((v.len() as f64 - 1.0) * pct).round() as usize;
    v[idx]
}

pub(crate) async fn render_metrics(state: &AppState) -> String {
    let mut body = String::new();
    let labels = format!("subsystem=\"{METRIC_SUBSYSTEM}\",version=\"{METRIC_VERSION}\"");

    {
        let counts = state.metrics.counts.lock().await;
        let mut entries: Vec<_> = counts.iter().collect();
        entries.sort_by(|a, b| a.0.cmp(b.0));
        for ((route, status), count) in entries {
            let _ = writeln!(
                body,
                "intake_requests_total{{{labels},route=\"{route}\",status=\"{status}\"}} {count}"
            );
        }
    }
    {
        let latency = state.metrics.latency_ns.lock().await;
        let mut entries: Vec<_> = latency.iter().collect();
        entries.sort_by(|a, b| a.0.cmp(b.0));
        for (route, samples) in entries {
            let _ = writeln!(
                body,
                "intake_request_latency_p50_ns{{{labels},route=\"{route}\"}} {}",
                percentile_ns(samples, 0.50)
            );
            let _ = writeln!(
                body,
                "intake_request_latency_p95_ns{{{labels},route=\"{route}\"}} {}",
                percentile_ns(samples, 0.95)
            );
        }
    }

    let cache = &state.cache.metrics;
    let _ = writeln!(
        body,
        "intake_cache_hits_total{{{labels}}} {}",
        cache.hits.load(Ordering::Relaxed)
    );
    let _ = writeln!(
        body,
        "intake_cache_misses_total{{{labels}}} {}",
        cache.misses.load(Ordering::Relaxed)
    );
    let _ = writeln!(
        body,
        "intake_cache_mirror_fallbacks_total{{{labels}}} {}",
        cache.mirror_fallbacks.load(Ordering::Relaxed)
    );

    let pipeline = &state.pipeline.metrics;
    let _ = writeln!(
        body,
        "intake_patches_applied_total{{{labels}}} {}",
        pipeline.patches_applied.load(Ordering::Relaxed)
    );
    let _ = writeln!(
        body,
        "intake_patches_rejected_total{{{labels}}} {}",
        pipeline.patches_rejected.load(Ordering::Relaxed)
    );

    let live = &state.hub.metrics;
    let _ = writeln!(
        body,
        "intake_live_connections{{{labels}}} {}",
        live.connected.load(Ordering::Relaxed)
    );
    let _ = writeln!(
        body,
        "intake_live_subscribe_total{{{labels}}} {}",
        live.subscribe_total.load(Ordering::Relaxed)
    );
    let _ = writeln!(
        body,
        "intake_live_delivered_total{{{labels}}} {}",
        live.delivered_total.load(Ordering::Relaxed)
    );
    let _ = writeln!(
        body,
        "intake_live_dropped_total{{{labels}}} {}",
        live.dropped_total.load(Ordering::Relaxed)
    );

    body
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percentile_handles_small_samples() {
        assert_eq!(percentile_ns(&[], 0.95), 0);
        assert_eq!(percentile_ns(&[7], 0.95), 7);
        assert_eq!(percentile_ns(&[1, 100], 0.50), 100);
        assert_eq!(percentile_ns(&[1, 2, 100], 0.50), 2);
    }
}
