//! Live-connection registry and broadcast hub. Connections register on open
//! and hold an RAII guard that deregisters them on drop, so the registry can
//! never leak a closed connection. Broadcast delivers to exactly the
//! connections subscribed to the event's inspection.

use intake_api::ws::ServerMessage;
use intake_model::{InspectionId, UpdateEvent};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;
use tracing::debug;

pub mod socket;

struct Connection {
    sender: mpsc::Sender<ServerMessage>,
    subscription: Option<InspectionId>,
}

#[derive(Default)]
pub struct LiveMetrics {
    pub connected: AtomicU64,
    pub subscribe_total: AtomicU64,
    pub delivered_total: AtomicU64,
    pub dropped_total: AtomicU64,
}

pub struct LiveHub {
    connections: Mutex<HashMap<u64, Connection>>,
    next_id: AtomicU64,
    send_buffer: usize,
    pub metrics: Arc<LiveMetrics>,
}

impl LiveHub {
    #[must_use]
    pub fn new(send_buffer: usize) -> Arc<Self> {
        Arc::new(Self {
            connections: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            send_buffer: send_buffer.max(1),
            metrics: Arc::new(LiveMetrics::default()),
        })
    }

    fn lock_connections(&self) -> MutexGuard<'_, HashMap<u64, Connection>> {
        self.connections
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers a live connection. The returned guard deregisters on drop;
    /// the receiver is the connection's outbound message stream.
    pub fn register(self: &Arc<Self>) -> (ConnectionGuard, mpsc::Receiver<ServerMessage>) {
        let (sender, receiver) = mpsc::channel(self.send_buffer);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.lock_connections().insert(
            id,
            Connection {
                sender,
                subscription: None,
            },
        );
        self.metrics.connected.fetch_add(1, Ordering::Relaxed);
        (
            ConnectionGuard {
                hub: Arc::clone(self),
                id,
            },
            receiver,
        )
    }

    /// Tags a connection with the inspection it is viewing. Re-subscribing
    /// replaces the previous tag.
    pub fn subscribe(&self, connection_id: u64, inspection_id: InspectionId) {
        let mut connections = self.lock_connections();
        if let Some(connection) = connections.get_mut(&connection_id) {
            connection.subscription = Some(inspection_id);
            self.metrics.subscribe_total.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Fans an update event out to every connection subscribed to its
    /// inspection. Best-effort, at most once: a connection with a full
    /// outbound buffer misses the event, and nothing is retried or replayed.
    pub fn broadcast(&self, event: &UpdateEvent) -> usize {
        let connections = self.lock_connections();
        let mut delivered = 0;
        for connection in connections.values() {
            if connection.subscription.as_ref() != Some(&event.inspection_id) {
                continue;
            }
            let message = ServerMessage::InspectionUpdate {
                data: event.clone(),
            };
            match connection.sender.try_send(message) {
                Ok(()) => {
                    delivered += 1;
                    self.metrics.delivered_total.fetch_add(1, Ordering::Relaxed);
                }
                Err(_) => {
                    self.metrics.dropped_total.fetch_add(1, Ordering::Relaxed);
                }
            }
        }
        delivered
    }

    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.lock_connections().len()
    }

    fn deregister(&self, connection_id: u64) {
        if self.lock_connections().remove(&connection_id).is_some() {
            self.metrics.connected.fetch_sub(1, Ordering::Relaxed);
            debug!(connection_id, "live connection deregistered");
        }
    }
}

/// Scoped registration: dropping the guard removes the connection from the
/// hub, whatever path the socket task exits through.
pub struct ConnectionGuard {
    hub: Arc<LiveHub>,
    id: u64,
}

impl ConnectionGuard {
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.hub.deregister(self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;

    fn event(id: &str) -> UpdateEvent {
        UpdateEvent {
            inspection_id: InspectionId::parse(id).expect("id"),
            path: "exterior.notes".to_string(),
            value: json!("ok"),
            timestamp: Utc::now(),
            actor_id: "u-1".to_string(),
        }
    }

    #[tokio::test]
    async fn broadcast_reaches_only_matching_subscribers() {
        let hub = LiveHub::new(8);
        let (watcher, mut watcher_rx) = hub.register();
        let (bystander, mut bystander_rx) = hub.register();
        let (unsubscribed, mut unsubscribed_rx) = hub.register();
        hub.subscribe(watcher.id(), InspectionId::parse("i-1").expect("id"));
        hub.subscribe(bystander.id(), InspectionId::parse("i-2").expect("id"));

        let delivered = hub.broadcast(&event("i-1"));
        assert_eq!(delivered, 1);
        let received = watcher_rx.try_recv().expect("watcher receives");
        let ServerMessage::InspectionUpdate { data } = received;
        assert_eq!(data.path, "exterior.notes");
        assert!(bystander_rx.try_recv().is_err());
        assert!(unsubscribed_rx.try_recv().is_err());
        drop(unsubscribed);
    }

    #[tokio::test]
    async fn each_subscriber_receives_exactly_once() {
        let hub = LiveHub::new(8);
        let mut receivers = Vec::new();
        let mut guards = Vec::new();
        for _ in 0..3 {
            let (guard, rx) = hub.register();
            hub.subscribe(guard.id(), InspectionId::parse("i-1").expect("id"));
            guards.push(guard);
            receivers.push(rx);
        }
        assert_eq!(hub.broadcast(&event("i-1")), 3);
        for rx in &mut receivers {
            rx.try_recv().expect("one event");
            assert!(rx.try_recv().is_err(), "no duplicate delivery");
        }
    }

    #[tokio::test]
    async fn dropping_the_guard_deregisters() {
        let hub = LiveHub::new(8);
        let (guard, _rx) = hub.register();
        assert_eq!(hub.connection_count(), 1);
        drop(guard);
        assert_eq!(hub.connection_count(), 0);
        assert_eq!(hub.metrics.connected.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn full_buffer_drops_the_event_silently() {
        let hub = LiveHub::new(1);
        let (guard, _rx) = hub.register();
        hub.subscribe(guard.id(), InspectionId::parse("i-1").expect("id"));
        assert_eq!(hub.broadcast(&event("i-1")), 1);
        // Buffer of one is now full; the second broadcast is dropped.
        assert_eq!(hub.broadcast(&event("i-1")), 0);
        assert_eq!(hub.metrics.dropped_total.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn resubscribing_replaces_the_tag() {
        let hub = LiveHub::new(8);
        let (guard, mut rx) = hub.register();
        hub.subscribe(guard.id(), InspectionId::parse("i-1").expect("id"));
        hub.subscribe(guard.id(), InspectionId::parse("i-2").expect("id"));
        assert_eq!(hub.broadcast(&event("i-1")), 0);
        assert_eq!(hub.broadcast(&event("i-2")), 1);
        rx.try_recv().expect("event for new subscription");
    }
}
