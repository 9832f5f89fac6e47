//! Fan-out of execution events to live subscribers: bounded ring
//! history, heartbeats, stale-connection reaping (§4.4).

pub mod error;
mod history;

pub use error::EventBusError;

use crate::domain::{ExecutionEvent, ExecutionEventStatus};
use chrono::{DateTime, Utc};
use history::EventHistoryRing;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

/// A message delivered to one live subscription.
#[derive(Debug, Clone)]
pub enum BusMessage {
    Activity(ExecutionEvent),
    Heartbeat { timestamp: DateTime<Utc> },
    Error { message: String },
}

/// A live subscription handed back to the transport layer (SSE
/// handler); dropping the receiver implicitly unsubscribes.
pub struct Subscription {
    pub id: Uuid,
    pub receiver: mpsc::Receiver<BusMessage>,
}

#[derive(Debug, Clone)]
pub struct EventBusConfig {
    pub heartbeat_interval_ms: u64,
    pub history_max: usize,
    pub max_emitters_per_process: usize,
    pub retention_ms: i64,
    /// Bounded channel capacity per subscriber; a full channel is
    /// treated the same as a closed one (back-pressure disconnect).
    pub subscriber_channel_capacity: usize,
}

impl Default for EventBusConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_ms: 25_000,
            history_max: 200,
            max_emitters_per_process: 16,
            retention_ms: 600_000,
            subscriber_channel_capacity: 256,
        }
    }
}

struct StreamState {
    history: EventHistoryRing,
    subscribers: HashMap<Uuid, mpsc::Sender<BusMessage>>,
    start_times: HashMap<String, DateTime<Utc>>,
    last_event_at: DateTime<Utc>,
}

impl StreamState {
    fn new(history_max: usize) -> Self {
        Self {
            history: EventHistoryRing::new(history_max),
            subscribers: HashMap::new(),
            start_times: HashMap::new(),
            last_event_at: Utc::now(),
        }
    }
}

/// Multiplexes per-step execution events to subscribers of a target
/// process/route id. Each id owns its own bounded history ring and
/// subscriber list, guarded by its own lock so publish to one stream
/// never blocks another (§5 "EventBus state uses per-process-id
/// guarded structures").
pub struct EventBus {
    config: EventBusConfig,
    streams: parking_lot::RwLock<HashMap<String, Arc<parking_lot::Mutex<StreamState>>>>,
}

impl EventBus {
    pub fn new(config: EventBusConfig) -> Arc<Self> {
        Arc::new(Self { config, streams: parking_lot::RwLock::new(HashMap::new()) })
    }

    fn stream_for(&self, target_id: &str) -> Arc<parking_lot::Mutex<StreamState>> {
        if let Some(stream) = self.streams.read().get(target_id) {
            return Arc::clone(stream);
        }
        let mut streams = self.streams.write();
        Arc::clone(
            streams
                .entry(target_id.to_string())
                .or_insert_with(|| Arc::new(parking_lot::Mutex::new(StreamState::new(self.config.history_max)))),
        )
    }

    /// Replays history in insertion order, then attaches a live
    /// subscription and sends a startup heartbeat. Enforces
    /// `max_emitters_per_process`: exceeding it returns a subscription
    /// that is already completed after a single `error` message.
    pub fn subscribe(&self, target_id: &str) -> Subscription {
        let stream = self.stream_for(target_id);
        let mut inner = stream.lock();

        if inner.subscribers.len() >= self.config.max_emitters_per_process {
            let (tx, rx) = mpsc::channel(1);
            let _ = tx.try_send(BusMessage::Error {
                message: format!("subscription limit reached for process {target_id}"),
            });
            drop(tx);
            return Subscription { id: Uuid::new_v4(), receiver: rx };
        }

        let (tx, rx) = mpsc::channel(self.config.subscriber_channel_capacity);
        for event in inner.history.replay() {
            let _ = tx.try_send(BusMessage::Activity(event.clone()));
        }

        let id = Uuid::new_v4();
        let _ = tx.try_send(BusMessage::Heartbeat { timestamp: Utc::now() });
        inner.subscribers.insert(id, tx);
        Subscription { id, receiver: rx }
    }

    pub fn unsubscribe(&self, target_id: &str, subscription_id: Uuid) {
        if let Some(stream) = self.streams.read().get(target_id) {
            stream.lock().subscribers.remove(&subscription_id);
        }
    }

    /// Publishes one event to its target stream. Stamps `durationMs` on
    /// `STARTED`/`COMPLETED`|`FAILED` pairs by recording the start
    /// timestamp per `(processId, activityId)` and computing elapsed
    /// time on the matching end event (§4.4 "Event enrichment").
    /// Subscriptions whose channel is full or closed are dropped
    /// (§4.4 "Back-pressure").
    pub fn publish(&self, mut event: ExecutionEvent) {
        let target_id = event.target_id().to_string();
        let stream = self.stream_for(&target_id);
        let mut inner = stream.lock();

        match event.status {
            ExecutionEventStatus::Started => {
                inner.start_times.insert(event.task_id.clone(), event.timestamp);
            }
            ExecutionEventStatus::Completed | ExecutionEventStatus::Failed => {
                if let Some(start) = inner.start_times.remove(&event.task_id) {
                    let elapsed = (event.timestamp - start).num_milliseconds().max(0) as u64;
                    event.duration_ms = Some(elapsed);
                }
            }
        }

        inner.last_event_at = Utc::now();
        inner.history.push(event.clone());

        inner.subscribers.retain(|_, sender| sender.try_send(BusMessage::Activity(event.clone())).is_ok());
    }

    /// Sends a heartbeat to every live subscription of every stream,
    /// reaping any whose channel rejects the send, then sweeps
    /// quiescent streams whose most recent event is older than
    /// `retention_ms` and that currently have no live subscriptions
    /// (§4.4 "Heartbeats", "Retention").
    pub fn sweep(&self) {
        let now = Utc::now();
        let keys: Vec<String> = self.streams.read().keys().cloned().collect();
        let mut to_tombstone = Vec::new();

        for key in &keys {
            let stream = match self.streams.read().get(key).cloned() {
                Some(s) => s,
                None => continue,
            };
            let mut inner = stream.lock();
            inner.subscribers.retain(|_, sender| sender.try_send(BusMessage::Heartbeat { timestamp: now }).is_ok());

            let quiescent = inner.subscribers.is_empty()
                && (now - inner.last_event_at).num_milliseconds() > self.config.retention_ms;
            if quiescent {
                to_tombstone.push(key.clone());
            }
        }

        if !to_tombstone.is_empty() {
            let mut streams = self.streams.write();
            for key in to_tombstone {
                streams.remove(&key);
            }
        }
    }

    /// Spawns the background heartbeat/retention task. Holds only a
    /// `Weak` so the bus's own drop (process shutdown teardown, §5)
    /// stops the loop rather than keeping it alive forever.
    pub fn spawn_background_tasks(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let weak = Arc::downgrade(self);
        let interval_ms = self.config.heartbeat_interval_ms;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(std::time::Duration::from_millis(interval_ms));
            loop {
                ticker.tick().await;
                match weak.upgrade() {
                    Some(bus) => bus.sweep(),
                    None => break,
                }
            }
        })
    }

    /// Explicit teardown: drop every live subscription. Called on
    /// process shutdown per §5's "close all subscriptions" step.
    pub fn shutdown(&self) {
        self.streams.write().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ExecutionEventKind;

    fn started(route: &str, task: &str) -> ExecutionEvent {
        ExecutionEvent::started(route, "log", task)
    }

    #[tokio::test]
    async fn subscribe_replays_history_then_live_events() {
        let bus = EventBus::new(EventBusConfig::default());
        bus.publish(started("t1::r1", "n1"));

        let mut sub = bus.subscribe("t1::r1");
        let first = sub.receiver.recv().await.unwrap();
        assert!(matches!(first, BusMessage::Activity(_)));
        let second = sub.receiver.recv().await.unwrap();
        assert!(matches!(second, BusMessage::Heartbeat { .. }));

        bus.publish(started("t1::r1", "n2"));
        let third = sub.receiver.recv().await.unwrap();
        match third {
            BusMessage::Activity(e) => assert_eq!(e.task_id, "n2"),
            _ => panic!("expected activity"),
        }
    }

    #[tokio::test]
    async fn subscription_cap_completes_new_subscriber_with_error() {
        let config = EventBusConfig { max_emitters_per_process: 1, ..Default::default() };
        let bus = EventBus::new(config);
        let _first = bus.subscribe("t1::r1");
        let mut second = bus.subscribe("t1::r1");

        let msg = second.receiver.recv().await.unwrap();
        assert!(matches!(msg, BusMessage::Error { .. }));
        assert!(second.receiver.recv().await.is_none());
    }

    #[tokio::test]
    async fn duration_is_stamped_on_completion() {
        let bus = EventBus::new(EventBusConfig::default());
        let mut sub = bus.subscribe("t1::r1");

        bus.publish(started("t1::r1", "n1"));
        let start_event = match sub.receiver.recv().await.unwrap() {
            BusMessage::Activity(e) => e,
            _ => panic!(),
        };
        assert_eq!(start_event.status, ExecutionEventStatus::Started);

        let completed = start_event.completed(None, None, 0);
        bus.publish(completed);

        let completion = match sub.receiver.recv().await.unwrap() {
            BusMessage::Activity(e) => e,
            _ => panic!(),
        };
        assert_eq!(completion.kind, ExecutionEventKind::RouteNode);
        assert!(completion.duration_ms.is_some());
    }

    #[test]
    fn sweep_tombstones_quiescent_streams_without_subscribers() {
        let bus = EventBus::new(EventBusConfig { retention_ms: -1, ..Default::default() });
        bus.publish(started("t1::r1", "n1"));
        bus.sweep();
        assert!(!bus.streams.read().contains_key("t1::r1"));
    }
}
