//! Change notifications pushed by the backend.
//!
//! A [`Subscription`] is a cancellable stream of [`RealtimeMessage`]s fed by a
//! background task. [`event`] turns messages into structured change events
//! and decides which lists need to be fetched again.

pub mod event;

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::{AbortHandle, JoinHandle};

pub use event::{refresh_for, ChangeEvent, ChangeKind, RefreshPlan};

/// Buffer between the feeding task and the consumer.
pub const SUBSCRIPTION_BUFFER: usize = 64;

/// One push from the backend, as `{events: [...], channels: [...], payload}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RealtimeMessage {
    #[serde(default)]
    pub events: Vec<String>,
    #[serde(default)]
    pub channels: Vec<String>,
    /// Backend-formatted send time; older servers send unix seconds.
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub timestamp: serde_json::Value,
    #[serde(default)]
    pub payload: serde_json::Value,
}

/// Cancels a [`Subscription`] from elsewhere (e.g. at sign-out).
///
/// After `cancel` returns the subscription yields no further messages, even
/// ones already buffered.
#[derive(Debug, Clone)]
pub struct SubscriptionHandle {
    closed: Arc<AtomicBool>,
    task: AbortHandle,
}

impl SubscriptionHandle {
    pub fn cancel(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.task.abort();
    }

    pub fn is_cancelled(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Stream of messages for a set of channels. Dropping it unsubscribes.
#[derive(Debug)]
pub struct Subscription {
    channels: Vec<String>,
    rx: mpsc::Receiver<RealtimeMessage>,
    handle: SubscriptionHandle,
}

impl Subscription {
    /// Wrap the receiving end of a feeding task. The task owns the sender;
    /// aborting it closes the stream.
    pub fn new(
        channels: Vec<String>,
        rx: mpsc::Receiver<RealtimeMessage>,
        task: JoinHandle<()>,
    ) -> Self {
        Self {
            channels,
            rx,
            handle: SubscriptionHandle {
                closed: Arc::new(AtomicBool::new(false)),
                task: task.abort_handle(),
            },
        }
    }

    pub fn channels(&self) -> &[String] {
        &self.channels
    }

    pub fn handle(&self) -> SubscriptionHandle {
        self.handle.clone()
    }

    pub fn is_active(&self) -> bool {
        !self.handle.is_cancelled()
    }

    /// Next message, or `None` once cancelled or the feed ended.
    pub async fn recv(&mut self) -> Option<RealtimeMessage> {
        if self.handle.is_cancelled() {
            return None;
        }
        let msg = self.rx.recv().await;
        if self.handle.is_cancelled() {
            return None;
        }
        msg
    }

    pub fn cancel(&mut self) {
        self.handle.cancel();
        self.rx.close();
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.handle.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(event: &str) -> RealtimeMessage {
        RealtimeMessage {
            events: vec![event.to_string()],
            channels: vec!["documents".to_string()],
            timestamp: serde_json::Value::Null,
            payload: serde_json::Value::Null,
        }
    }

    #[tokio::test]
    async fn test_cancel_stops_buffered_messages() {
        let (tx, rx) = mpsc::channel(4);
        let task = tokio::spawn(async move {
            let _ = tx.send(message("a")).await;
            let _ = tx.send(message("b")).await;
            std::future::pending::<()>().await;
        });
        let mut sub = Subscription::new(vec!["documents".into()], rx, task);

        assert_eq!(sub.recv().await.unwrap().events, vec!["a"]);
        let handle = sub.handle();
        handle.cancel();
        assert!(sub.recv().await.is_none());
        assert!(!sub.is_active());
    }

    #[tokio::test]
    async fn test_stream_ends_when_feed_stops() {
        let (tx, rx) = mpsc::channel(4);
        let task = tokio::spawn(async move {
            let _ = tx.send(message("only")).await;
        });
        let mut sub = Subscription::new(vec![], rx, task);
        assert!(sub.recv().await.is_some());
        assert!(sub.recv().await.is_none());
    }

    #[test]
    fn test_message_from_wire() {
        let msg: RealtimeMessage = serde_json::from_value(serde_json::json!({
            "events": ["databases.*.collections.*.documents.*.create"],
            "channels": ["databases.db.collections.habits.documents"],
            "timestamp": "2026-10-16T08:00:00.000+00:00",
            "payload": {"$id": "h1"}
        }))
        .unwrap();
        assert_eq!(msg.payload["$id"], "h1");
        assert!(msg.timestamp.is_string());
    }
}
