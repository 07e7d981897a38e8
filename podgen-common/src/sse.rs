//! Server-Sent Events (SSE) utilities
//!
//! Bridges one progress-bus subscription to one SSE response. Each bus event
//! becomes a single `data: <json>\n\n` frame; the first frame is always a
//! locally generated `connecting` greeting that never passes through the bus.
//!
//! Connection lifecycle: `Open -> Streaming -> Closed`. The subscription is
//! registered before the stream is handed to the HTTP layer, so nothing
//! emitted between the greeting and the first bus event can be missed.
//! Dropping the stream (client disconnect) unsubscribes.

use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::{Stream, StreamExt};
use std::convert::Infallible;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::events::{Listener, ProgressBus, ProgressEvent};

/// Per-stream tuning shared by every connection of a service
#[derive(Debug, Clone)]
pub struct StreamOptions {
    /// Interval between keep-alive comment frames
    pub keepalive: Duration,
    /// Events buffered per connection before further events are dropped
    pub subscriber_capacity: usize,
    /// End the stream after forwarding a terminal step (`ready`/`error`)
    pub close_on_terminal: bool,
}

impl Default for StreamOptions {
    fn default() -> Self {
        Self {
            keepalive: Duration::from_secs(15),
            subscriber_capacity: 256,
            close_on_terminal: false,
        }
    }
}

/// Lifecycle of one streaming connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Subscribed, greeting not yet sent
    Open,
    /// Greeting sent, forwarding bus events
    Streaming,
    /// Unsubscribed; terminal
    Closed,
}

/// One connection's registration on the progress bus
///
/// Unsubscribes exactly once, on [`close`](Self::close) or on drop,
/// whichever comes first.
pub struct ProgressSubscription {
    bus: ProgressBus,
    job_id: String,
    listener: Option<Listener>,
    state: ConnectionState,
}

impl ProgressSubscription {
    /// Subscribe a bounded channel listener for `job_id`
    pub fn open(
        bus: &ProgressBus,
        job_id: impl Into<String>,
        capacity: usize,
    ) -> (Self, mpsc::Receiver<ProgressEvent>) {
        let job_id = job_id.into();
        let (listener, rx) = bus.subscribe_channel(&job_id, capacity);
        let subscription = Self {
            bus: bus.clone(),
            job_id,
            listener: Some(listener),
            state: ConnectionState::Open,
        };
        (subscription, rx)
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    fn mark_streaming(&mut self) {
        if self.state == ConnectionState::Open {
            self.state = ConnectionState::Streaming;
        }
    }

    /// Unsubscribe from the bus; later calls are no-ops
    pub fn close(&mut self) {
        if let Some(listener) = self.listener.take() {
            self.bus.unsubscribe(&self.job_id, &listener);
            self.state = ConnectionState::Closed;
            debug!(job_id = %self.job_id, "Progress subscription closed");
        }
    }
}

impl Drop for ProgressSubscription {
    fn drop(&mut self) {
        self.close();
    }
}

/// Convert a progress event into an SSE frame carrying only a `data` field
pub fn progress_frame(event: &ProgressEvent) -> crate::Result<Event> {
    Ok(Event::default().data(event.to_json()?))
}

enum Next {
    Forward(ProgressEvent),
    Shutdown,
    Disconnected,
}

/// Events delivered to one subscription, greeting first
///
/// Ends when `shutdown` is cancelled, when the subscription's channel is
/// closed, or after a terminal step if `close_on_terminal` is set. The
/// subscription is moved into the stream so dropping the stream releases it.
pub fn progress_event_stream(
    mut subscription: ProgressSubscription,
    mut rx: mpsc::Receiver<ProgressEvent>,
    shutdown: CancellationToken,
    close_on_terminal: bool,
) -> impl Stream<Item = ProgressEvent> {
    async_stream::stream! {
        yield ProgressEvent::connecting();
        subscription.mark_streaming();
        debug!(job_id = %subscription.job_id(), "SSE: Progress stream started");

        loop {
            let next = tokio::select! {
                _ = shutdown.cancelled() => Next::Shutdown,
                received = rx.recv() => match received {
                    Some(event) => Next::Forward(event),
                    // The subscription's listener owns a sender until close,
                    // so this only fires if the bus ever drops listeners itself
                    None => Next::Disconnected,
                },
            };

            match next {
                Next::Forward(event) => {
                    let terminal = event.step.is_terminal().then(|| event.step.clone());
                    yield event;
                    if let Some(step) = terminal.filter(|_| close_on_terminal) {
                        debug!(job_id = %subscription.job_id(), %step, "SSE: Terminal step forwarded, closing stream");
                        break;
                    }
                }
                Next::Shutdown => {
                    debug!(job_id = %subscription.job_id(), "SSE: Server shutting down, closing stream");
                    break;
                }
                Next::Disconnected => break,
            }
        }

        subscription.close();
    }
}

/// Map progress events to SSE frames, skipping any that fail to serialize
pub fn progress_sse_frames(
    events: impl Stream<Item = ProgressEvent>,
) -> impl Stream<Item = Result<Event, Infallible>> {
    events.filter_map(|event| async move {
        match progress_frame(&event) {
            Ok(frame) => Some(Ok(frame)),
            Err(e) => {
                warn!(step = %event.step, "SSE: Failed to serialize progress event: {}", e);
                None
            }
        }
    })
}

/// Build the SSE response for a progress stream
///
/// # Example
/// ```rust,ignore
/// pub async fn progress_stream(
///     State(state): State<AppState>,
///     Path(job_id): Path<String>,
/// ) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
///     podgen_common::sse::create_progress_sse_stream(
///         &state.bus, job_id, &state.stream_options, state.shutdown.clone())
/// }
/// ```
pub fn create_progress_sse_stream(
    bus: &ProgressBus,
    job_id: impl Into<String>,
    options: &StreamOptions,
    shutdown: CancellationToken,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let (subscription, rx) = ProgressSubscription::open(bus, job_id, options.subscriber_capacity);
    info!(
        job_id = %subscription.job_id(),
        subscribers = bus.subscriber_count(subscription.job_id()),
        "New SSE client connected to progress events"
    );

    let events = progress_event_stream(subscription, rx, shutdown, options.close_on_terminal);
    let stream = progress_sse_frames(events);

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(options.keepalive)
            .text("heartbeat"),
    )
}
