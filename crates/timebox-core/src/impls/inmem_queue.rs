//! In-memory MessageQueue for tests and local runs.

use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use rand::Rng;
use rand::distributions::Alphanumeric;
use serde_json::Value;
use tokio::sync::Mutex;

use crate::domain::{DeleteFailure, Message, MessageHandle, QueueError};
use crate::ports::MessageQueue;

struct StoredMessage {
    id: String,
    receipt: String,
    body: Value,
    in_flight: bool,
    deleted: bool,
}

#[derive(Default)]
struct State {
    messages: Vec<StoredMessage>,
    delete_call_sizes: Vec<usize>,
    delete_failure: Option<String>,
}

/// Single-process queue with delivery-order receive, in-flight marking and
/// tombstone deletes.
///
/// Design:
/// - `receive` hands out messages in publish order, marks them in flight and
///   issues a fresh receipt per delivery. In-flight messages stay invisible
///   until [`reset_in_flight`](Self::reset_in_flight), which stands in for
///   the transport's visibility timeout.
/// - `delete_batch` tombstones instead of removing, so "was this deleted"
///   stays answerable in assertions.
/// - Call counters and per-call delete sizes are recorded for tests.
pub struct InMemoryMessageQueue {
    state: Mutex<State>,
    receive_calls: AtomicU32,
    delete_calls: AtomicU32,
}

impl InMemoryMessageQueue {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
            receive_calls: AtomicU32::new(0),
            delete_calls: AtomicU32::new(0),
        }
    }

    /// Append a message; returns the handle it will be delivered under.
    pub async fn publish(&self, body: Value) -> MessageHandle {
        let mut state = self.state.lock().await;
        let stored = StoredMessage {
            id: ulid::Ulid::new().to_string(),
            receipt: random_receipt(),
            body,
            in_flight: false,
            deleted: false,
        };
        let handle = MessageHandle::new(stored.id.clone(), stored.receipt.clone());
        state.messages.push(stored);
        handle
    }

    /// Make every undeleted message visible again, like an elapsed
    /// visibility timeout.
    pub async fn reset_in_flight(&self) {
        let mut state = self.state.lock().await;
        for message in state.messages.iter_mut().filter(|m| !m.deleted) {
            message.in_flight = false;
        }
    }

    /// Bodies of the messages a `receive` could currently return.
    pub async fn available(&self) -> Vec<Value> {
        let state = self.state.lock().await;
        state
            .messages
            .iter()
            .filter(|m| !m.deleted && !m.in_flight)
            .map(|m| m.body.clone())
            .collect()
    }

    pub fn receive_calls(&self) -> u32 {
        self.receive_calls.load(Ordering::SeqCst)
    }

    pub fn delete_calls(&self) -> u32 {
        self.delete_calls.load(Ordering::SeqCst)
    }

    /// Sizes of the individual `delete_batch` calls, in call order.
    pub async fn delete_call_sizes(&self) -> Vec<usize> {
        self.state.lock().await.delete_call_sizes.clone()
    }

    /// Make every subsequent delete report its entries as failed.
    #[cfg(test)]
    pub async fn inject_delete_failure(&self, reason: &str) {
        self.state.lock().await.delete_failure = Some(reason.to_string());
    }
}

impl Default for InMemoryMessageQueue {
    fn default() -> Self {
        Self::new()
    }
}

fn random_receipt() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(16)
        .map(char::from)
        .collect()
}

#[async_trait]
impl MessageQueue for InMemoryMessageQueue {
    async fn receive(&self, max_messages: usize) -> Result<Vec<Message>, QueueError> {
        self.receive_calls.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock().await;
        let mut delivered = Vec::new();
        for message in state
            .messages
            .iter_mut()
            .filter(|m| !m.deleted && !m.in_flight)
            .take(max_messages)
        {
            message.in_flight = true;
            message.receipt = random_receipt();
            delivered.push(Message::new(
                MessageHandle::new(message.id.clone(), message.receipt.clone()),
                message.body.clone(),
            ));
        }
        Ok(delivered)
    }

    async fn delete_batch(
        &self,
        handles: &[MessageHandle],
    ) -> Result<Vec<DeleteFailure>, QueueError> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock().await;
        let len = handles.len();
        state.delete_call_sizes.push(len);

        if let Some(reason) = state.delete_failure.clone() {
            return Ok(handles
                .iter()
                .map(|h| DeleteFailure {
                    id: h.id.clone(),
                    reason: reason.clone(),
                })
                .collect());
        }

        let mut failed = Vec::new();
        for handle in handles {
            let found = state
                .messages
                .iter_mut()
                .find(|m| m.id == handle.id && !m.deleted);
            match found {
                Some(message) if message.receipt == handle.receipt => {
                    message.deleted = true;
                }
                Some(_) => failed.push(DeleteFailure {
                    id: handle.id.clone(),
                    reason: "stale receipt".to_string(),
                }),
                None => failed.push(DeleteFailure {
                    id: handle.id.clone(),
                    reason: "unknown message id".to_string(),
                }),
            }
        }
        Ok(failed)
    }
}
