//! Progress event types and the in-process progress bus
//!
//! Producers (the episode generation pipeline) report each stage transition
//! with [`ProgressBus::emit`]. Consumers (live status streams) register a
//! [`Listener`] for one job id and receive every event emitted for that id
//! after they subscribed.
//!
//! Delivery is at-most-once and best-effort:
//! - no history is kept, so late subscribers miss earlier events
//! - an event emitted for a job with no listeners is dropped
//! - a failing or full listener loses the event, siblings are unaffected

mod listener;
mod step;

pub use listener::{CallbackSink, DeliveryError, Listener, ListenerId, ProgressSink};
pub use step::ProgressStep;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

use crate::time::now_millis;

/// One state transition of one job
///
/// Serializes with keys in the order `step`, `data`, `ts`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub step: ProgressStep,
    /// Step-specific payload, never interpreted by the bus
    pub data: Value,
    /// Creation time in milliseconds since the Unix epoch
    pub ts: i64,
}

impl ProgressEvent {
    /// Create an event stamped with the current time
    pub fn new(step: impl Into<ProgressStep>, data: Value) -> Self {
        Self {
            step: step.into(),
            data,
            ts: now_millis(),
        }
    }

    /// Connection greeting sent first on every progress stream
    pub fn connecting() -> Self {
        Self::new(ProgressStep::Connecting, json!({}))
    }

    pub fn to_json(&self) -> crate::Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

type Registry = HashMap<String, Vec<Listener>>;

/// In-process fan-out of progress events keyed by job id
///
/// Constructed once at startup and handed to producers and the stream
/// endpoint; clones share the same registry.
///
/// A single mutex guards the registry and `emit` delivers while holding it.
/// This gives every job id one global emission order, and once
/// `unsubscribe` returns the listener is never invoked again. Listeners
/// must therefore be non-blocking (see [`ProgressSink`]).
///
/// # Examples
///
/// ```
/// use podgen_common::events::{Listener, ProgressBus};
/// use serde_json::json;
///
/// let bus = ProgressBus::new();
/// let (tx, mut rx) = tokio::sync::mpsc::channel(16);
/// let listener = Listener::channel(tx);
///
/// bus.subscribe("ep-1", listener.clone());
/// bus.emit("ep-1", "script", json!({"progress": 50}));
///
/// let event = rx.try_recv().unwrap();
/// assert_eq!(event.step.as_str(), "script");
///
/// bus.unsubscribe("ep-1", &listener);
/// assert_eq!(bus.subscriber_count("ep-1"), 0);
/// ```
#[derive(Clone, Default)]
pub struct ProgressBus {
    registry: Arc<Mutex<Registry>>,
}

impl ProgressBus {
    pub fn new() -> Self {
        Self::default()
    }

    fn registry(&self) -> MutexGuard<'_, Registry> {
        // Listener panics are caught before they can poison the lock, so
        // the map is always consistent even if a guard was dropped mid-panic
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Emit an event to every listener currently subscribed to `job_id`
    ///
    /// Listeners are invoked in registration order and all receive the same
    /// `ts`. Never fails and never waits on a consumer. Failures are logged
    /// after the registry lock is released.
    pub fn emit(&self, job_id: &str, step: impl Into<ProgressStep>, data: Value) {
        let mut failures = Vec::new();
        let outcome = {
            let registry = self.registry();
            let outcome = match registry.get(job_id) {
                Some(listeners) => {
                    let event = ProgressEvent::new(step, data);
                    for listener in listeners {
                        if let Err(e) = listener.deliver(&event) {
                            failures.push((listener.id(), e));
                        }
                    }
                    Some((event, listeners.len()))
                }
                None => None,
            };
            outcome
        };

        let Some((event, delivered)) = outcome else {
            trace!(job_id, "No subscribers, progress event dropped");
            return;
        };

        for (listener, error) in failures {
            match error {
                DeliveryError::Closed => {
                    debug!(job_id, %listener, "Listener receiver closed, event dropped");
                }
                e => {
                    warn!(job_id, %listener, step = %event.step, "Progress delivery failed: {}", e);
                }
            }
        }
        trace!(job_id, step = %event.step, listeners = delivered, "Progress event delivered");
    }

    /// Producer-facing emit; missing data becomes an empty object
    pub fn emit_progress(&self, job_id: &str, step: impl Into<ProgressStep>, data: Option<Value>) {
        self.emit(job_id, step, data.unwrap_or_else(|| json!({})));
    }

    /// Register `listener` for all future events of `job_id`
    ///
    /// No deduplication: registering the same handle twice doubles its
    /// deliveries.
    pub fn subscribe(&self, job_id: &str, listener: Listener) {
        let subscribers = {
            let mut registry = self.registry();
            let listeners = registry.entry(job_id.to_string()).or_default();
            listeners.push(listener);
            listeners.len()
        };
        debug!(job_id, subscribers, "Progress listener subscribed");
    }

    /// Remove one registration of `listener` for `job_id`
    ///
    /// Unknown registrations are ignored. The job entry is dropped once its
    /// last listener is gone.
    pub fn unsubscribe(&self, job_id: &str, listener: &Listener) {
        let remaining = {
            let mut registry = self.registry();
            let Some(listeners) = registry.get_mut(job_id) else {
                return;
            };

            let removed = match listeners.iter().position(|l| l == listener) {
                Some(position) => {
                    listeners.remove(position);
                    true
                }
                None => false,
            };
            let remaining = listeners.len();
            if remaining == 0 {
                registry.remove(job_id);
            }
            removed.then_some(remaining)
        };

        if let Some(subscribers) = remaining {
            debug!(job_id, subscribers, "Progress listener unsubscribed");
        }
    }

    /// Create a bounded channel listener and subscribe it
    ///
    /// Returns the handle (needed to unsubscribe) and the receiving end.
    pub fn subscribe_channel(
        &self,
        job_id: &str,
        capacity: usize,
    ) -> (Listener, mpsc::Receiver<ProgressEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let listener = Listener::channel(tx);
        self.subscribe(job_id, listener.clone());
        (listener, rx)
    }

    /// Number of registrations for `job_id`
    pub fn subscriber_count(&self, job_id: &str) -> usize {
        self.registry().get(job_id).map_or(0, Vec::len)
    }

    /// Number of job ids with at least one listener
    pub fn active_jobs(&self) -> usize {
        self.registry().len()
    }
}
