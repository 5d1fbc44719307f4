//! Progress events — the executor's observable stream.
//!
//! A broadcast-style bus built on flume channels: every subscriber receives
//! every event published after it subscribed. Publication happens under the
//! bus lock, so observers see one serialized stream even though dispatches
//! run concurrently.

use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

use crate::gates::FinalVerdict;
use wf_core::types::Profile;

// ---------------------------------------------------------------------------
// ProgressEvent
// ---------------------------------------------------------------------------

/// Outcome label carried by completion events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateStatus {
    Passed,
    Failed,
}

/// One progress event with its structured payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ProgressEvent {
    WaveStarted {
        wave: usize,
        intent_count: usize,
    },
    WaveCompleted {
        wave: usize,
        status: GateStatus,
        score: f64,
        duration_ms: u64,
    },
    IntentStarted {
        intent_id: String,
        profile: Profile,
        model: String,
        wave: usize,
    },
    IntentCompleted {
        intent_id: String,
        status: GateStatus,
        score: f64,
        attempt: u32,
    },
    IntentRetried {
        intent_id: String,
        attempt: u32,
        model: String,
        reason: String,
    },
    IntentEscalated {
        intent_id: String,
        from_model: String,
        to_model: String,
        attempt: u32,
    },
    IntentHumanReview {
        intent_id: String,
        attempts: u32,
        last_error: Option<String>,
    },
    ExecutionCompleted {
        verdict: FinalVerdict,
        passed: usize,
        failed: usize,
        human_review: usize,
    },
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Thread-safe broadcast bus; clones share the subscriber list.
#[derive(Clone, Default)]
pub struct EventBus {
    inner: Arc<Mutex<Vec<flume::Sender<ProgressEvent>>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new subscriber. It receives every event published from
    /// this point forward.
    pub fn subscribe(&self) -> flume::Receiver<ProgressEvent> {
        let (tx, rx) = flume::unbounded();
        let mut senders = self.inner.lock().expect("event bus lock poisoned");
        senders.push(tx);
        rx
    }

    /// Publish an event to all subscribers; disconnected receivers are
    /// pruned as a side effect.
    pub fn publish(&self, event: ProgressEvent) {
        let mut senders = self.inner.lock().expect("event bus lock poisoned");
        senders.retain(|tx| tx.send(event.clone()).is_ok());
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.lock().expect("event bus lock poisoned").len()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscribers_receive_published_events() {
        let bus = EventBus::new();
        let rx = bus.subscribe();
        bus.publish(ProgressEvent::WaveStarted {
            wave: 0,
            intent_count: 3,
        });
        assert_eq!(
            rx.try_recv().unwrap(),
            ProgressEvent::WaveStarted {
                wave: 0,
                intent_count: 3
            }
        );
    }

    #[test]
    fn late_subscribers_miss_earlier_events() {
        let bus = EventBus::new();
        bus.publish(ProgressEvent::WaveStarted {
            wave: 0,
            intent_count: 1,
        });
        let rx = bus.subscribe();
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn dropped_subscribers_are_pruned() {
        let bus = EventBus::new();
        let rx = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 1);
        drop(rx);
        bus.publish(ProgressEvent::WaveStarted {
            wave: 0,
            intent_count: 1,
        });
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn events_serialize_with_tag() {
        let event = ProgressEvent::IntentEscalated {
            intent_id: "t1".into(),
            from_model: "small".into(),
            to_model: "large".into(),
            attempt: 3,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "intent_escalated");
        assert_eq!(json["from_model"], "small");
        let back: ProgressEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn clones_share_subscribers() {
        let bus = EventBus::new();
        let rx = bus.subscribe();
        let clone = bus.clone();
        clone.publish(ProgressEvent::ExecutionCompleted {
            verdict: FinalVerdict::Ship,
            passed: 2,
            failed: 0,
            human_review: 0,
        });
        assert!(rx.try_recv().is_ok());
    }
}
