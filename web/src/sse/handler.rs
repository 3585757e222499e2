use crate::error::Error;
use crate::extractors::{connected_user::ConnectedUser, device::ConnectingDevice};
use async_stream::stream;
use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use delivery::message::EventType;
use delivery::{Attached, ConnectionId, Envelope, Router};
use futures::Stream;
use log::*;
use service::AppState;
use std::convert::Infallible;
use std::sync::Arc;

/// Detaches the connection when the response stream is dropped, whether it
/// ended or the client went away, and tells the user's other devices.
struct DetachGuard {
    router: Arc<Router>,
    connection_id: ConnectionId,
}

impl Drop for DetachGuard {
    fn drop(&mut self) {
        debug!("SSE connection {} closed", self.connection_id);
        let Some(handle) = self.router.registry().get(self.connection_id) else {
            return;
        };
        if !self.router.registry().detach(&handle) {
            return;
        }
        // Drop can run outside a runtime, e.g. during shutdown.
        if let Ok(runtime) = tokio::runtime::Handle::try_current() {
            let router = self.router.clone();
            runtime.spawn(async move {
                if let Err(e) = router.announce_presence(&handle, false).await {
                    warn!("Failed to announce {} going offline: {}", handle.id(), e);
                }
            });
        }
    }
}

/// SSE handler that attaches one device connection and streams every
/// envelope routed to it. Anything queued while the user was offline is
/// replayed onto this connection first; envelopes routed during the replay
/// wait until it finishes.
pub(crate) async fn sse_handler(
    ConnectedUser(user_id): ConnectedUser,
    ConnectingDevice(device_class): ConnectingDevice,
    State(app_state): State<AppState>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, Error> {
    let Attached {
        handle,
        mut receiver,
    } = app_state
        .registry
        .attach_replaying(&user_id, device_class)?;
    info!(
        "SSE connection {} established for user {} ({}), {} user(s) online",
        handle.id(),
        user_id,
        device_class,
        app_state.registry.user_count()
    );

    let guard = DetachGuard {
        router: app_state.router.clone(),
        connection_id: handle.id(),
    };

    let router = app_state.router.clone();
    tokio::spawn(async move {
        if let Err(e) = router.catch_up(&handle).await {
            error!(
                "Offline catch-up for connection {} of user {} failed: {}",
                handle.id(),
                handle.user_id(),
                e
            );
        }
        if let Err(e) = router.announce_presence(&handle, true).await {
            warn!("Failed to announce {} coming online: {}", handle.id(), e);
        }
    });

    // The registry owns the only long-lived sender, so the stream ends once
    // the router detaches this connection.
    let stream = stream! {
        let _guard = guard;
        while let Some(envelope) = receiver.recv().await {
            match to_event(&envelope) {
                Ok(event) => yield Ok(event),
                Err(e) => warn!(
                    "Dropping {} envelope for user {} that failed to serialize: {}",
                    envelope.kind.event_type(),
                    envelope.target_user_id,
                    e
                ),
            }
        }
    };

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

fn to_event(envelope: &Envelope) -> Result<Event, axum::Error> {
    Event::default()
        .event(envelope.kind.event_type())
        .json_data(envelope)
}
