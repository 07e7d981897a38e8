//! Listener handles registered with the progress bus

use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use uuid::Uuid;

use super::ProgressEvent;

/// Why a single delivery to a single listener failed
///
/// Delivery errors never leave the bus. They are logged and the event is
/// lost for that listener only.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DeliveryError {
    /// Subscriber queue is at capacity; the event is dropped for it
    #[error("subscriber queue is full")]
    Full,

    /// Receiving side has gone away
    #[error("subscriber has disconnected")]
    Closed,

    /// Callback listener refused the event
    #[error("listener rejected event: {0}")]
    Rejected(String),

    /// Callback listener panicked
    #[error("listener panicked during delivery")]
    Panicked,
}

/// Destination for progress events
///
/// Implementations are invoked while the bus holds its registry lock, so
/// `deliver` must return promptly and must not call back into the bus.
pub trait ProgressSink: Send + Sync {
    fn deliver(&self, event: &ProgressEvent) -> Result<(), DeliveryError>;
}

/// Channel sink: hands the event to a per-subscriber queue without waiting
impl ProgressSink for mpsc::Sender<ProgressEvent> {
    fn deliver(&self, event: &ProgressEvent) -> Result<(), DeliveryError> {
        self.try_send(event.clone()).map_err(|e| match e {
            TrySendError::Full(_) => DeliveryError::Full,
            TrySendError::Closed(_) => DeliveryError::Closed,
        })
    }
}

/// Adapts a closure into a sink
pub struct CallbackSink<F>(F);

impl<F> ProgressSink for CallbackSink<F>
where
    F: Fn(&ProgressEvent) -> Result<(), DeliveryError> + Send + Sync,
{
    fn deliver(&self, event: &ProgressEvent) -> Result<(), DeliveryError> {
        (self.0)(event)
    }
}

/// Identity of a listener handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(Uuid);

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Handle registered with [`ProgressBus::subscribe`](super::ProgressBus::subscribe)
///
/// Clones share the same identity, and `unsubscribe` matches on that
/// identity. Subscribing one handle twice registers it twice and it then
/// receives every event twice; each `unsubscribe` removes one registration.
#[derive(Clone)]
pub struct Listener {
    id: ListenerId,
    sink: Arc<dyn ProgressSink>,
}

impl Listener {
    pub fn new(sink: impl ProgressSink + 'static) -> Self {
        Self {
            id: ListenerId(Uuid::new_v4()),
            sink: Arc::new(sink),
        }
    }

    /// Listener feeding a bounded channel
    pub fn channel(tx: mpsc::Sender<ProgressEvent>) -> Self {
        Self::new(tx)
    }

    /// Listener invoking `f` for each event
    pub fn callback<F>(f: F) -> Self
    where
        F: Fn(&ProgressEvent) -> Result<(), DeliveryError> + Send + Sync + 'static,
    {
        Self::new(CallbackSink(f))
    }

    pub fn id(&self) -> ListenerId {
        self.id
    }

    /// Deliver one event, converting a panic in the sink into an error
    pub(crate) fn deliver(&self, event: &ProgressEvent) -> Result<(), DeliveryError> {
        catch_unwind(AssertUnwindSafe(|| self.sink.deliver(event)))
            .unwrap_or(Err(DeliveryError::Panicked))
    }
}

impl PartialEq for Listener {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Listener {}

impl fmt::Debug for Listener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listener").field("id", &self.id).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ProgressStep;
    use serde_json::json;

    fn sample_event() -> ProgressEvent {
        ProgressEvent::new(ProgressStep::Script, json!({"progress": 10}))
    }

    #[test]
    fn test_clones_share_identity() {
        let (tx, _rx) = mpsc::channel(4);
        let listener = Listener::channel(tx);
        let copy = listener.clone();
        assert_eq!(listener, copy);
        assert_eq!(listener.id(), copy.id());
    }

    #[test]
    fn test_distinct_handles_differ() {
        let a = Listener::callback(|_| Ok(()));
        let b = Listener::callback(|_| Ok(()));
        assert_ne!(a, b);
    }

    #[test]
    fn test_channel_sink_reports_full_and_closed() {
        let (tx, rx) = mpsc::channel(1);
        let listener = Listener::channel(tx);

        assert_eq!(listener.deliver(&sample_event()), Ok(()));
        assert_eq!(listener.deliver(&sample_event()), Err(DeliveryError::Full));

        drop(rx);
        assert_eq!(listener.deliver(&sample_event()), Err(DeliveryError::Closed));
    }

    #[test]
    fn test_panicking_callback_becomes_error() {
        let listener = Listener::callback(|_| panic!("boom"));
        assert_eq!(listener.deliver(&sample_event()), Err(DeliveryError::Panicked));
    }
}
