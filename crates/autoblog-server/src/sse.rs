//! GET /autopilot/events: autopilot state as Server-Sent Events.

use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::Stream;
use tokio::sync::mpsc;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{debug, warn};

use autoblog_autopilot::Autopilot;
use autoblog_types::JobState;

use crate::AppState;
use crate::auth::Authorized;

/// Streams the current state first, then one `state` event per change.
/// The subscription lives as long as the client stays connected.
pub async fn autopilot_events(
    _auth: Authorized,
    State(state): State<Arc<AppState>>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let (tx, rx) = mpsc::unbounded_channel::<JobState>();
    let subscription = state.autopilot.subscribe(Arc::new(move |job: &JobState| {
        // A closed channel means the client is gone; the stream drop unsubscribes.
        let _ = tx.send(job.clone());
    }));

    let initial = match state.autopilot.status().await {
        Ok(job) => Some(job),
        Err(e) => {
            warn!("Failed to read autopilot state for event stream: {e}");
            None
        }
    };
    debug!("Autopilot event stream opened");

    let events = tokio_stream::iter(initial)
        .chain(UnboundedReceiverStream::new(rx))
        .map(move |job| {
            let _subscription = &subscription;
            Ok(state_event(&job))
        });

    Sse::new(events).keep_alive(KeepAlive::default())
}

fn state_event(job: &JobState) -> Event {
    Event::default()
        .event("state")
        .json_data(job)
        .unwrap_or_else(|e| Event::default().event("error").data(e.to_string()))
}
