use std::fmt::Display;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use futures::{Sink, SinkExt, Stream, StreamExt};
use meshvault_core::retry::RetryPolicy;
use meshvault_core::types::JobId;
use meshvault_pipeline::JobObserver;
use serde::Deserialize;
use serde_json::Value;

use crate::error::AppResult;
use crate::handlers::jobs::authorize;
use crate::middleware::auth::AuthUser;
use crate::state::AppState;
use crate::ws::messages;

/// Query parameters accepted on the upgrade request.
#[derive(Debug, Default, Deserialize)]
pub struct WsParams {
    /// Access token for clients that cannot set an `Authorization` header.
    pub token: Option<String>,
}

/// GET /api/v1/jobs/{id}/ws
///
/// Authenticates, opens a [`JobObserver`] on the job and upgrades. Errors
/// (401, 403, 404) are returned as ordinary HTTP responses before the
/// upgrade.
pub async fn job_ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Path(job_id): Path<JobId>,
    Query(params): Query<WsParams>,
    headers: HeaderMap,
) -> AppResult<impl IntoResponse> {
    let auth = AuthUser::authenticate(&headers, params.token.as_deref(), &state.config.jwt)?;

    let observer =
        JobObserver::open(state.store.clone(), job_id, &RetryPolicy::default()).await?;
    authorize(observer.current(), &auth, "observe")?;

    Ok(ws.on_upgrade(move |socket| stream_job(socket, observer)))
}

/// Forward observer events to the socket until the job finishes, is
/// deleted, or the client goes away.
async fn stream_job(socket: WebSocket, observer: JobObserver) {
    let job_id = observer.job_id();
    tracing::info!(job_id = %job_id, "Job stream connected");

    let (sink, stream) = socket.split();
    forward_job(sink, stream, observer).await;

    tracing::info!(job_id = %job_id, "Job stream disconnected");
}

/// The socket loop over any frame sink and inbound stream.
///
/// The first frame is a snapshot of the job as read on open. A job that is
/// already terminal gets the snapshot and an immediate close.
async fn forward_job<S, R, E>(mut sink: S, mut stream: R, mut observer: JobObserver)
where
    S: Sink<Message> + Unpin,
    S::Error: Display,
    R: Stream<Item = Result<Message, E>> + Unpin,
    E: Display,
{
    let job_id = observer.job_id();

    let mut open = send_json(&mut sink, &messages::snapshot(observer.current())).await;
    if observer.current().is_terminal() {
        open = false;
    }

    while open {
        tokio::select! {
            event = observer.next_event() => match event {
                Some(event) => {
                    open = send_json(&mut sink, &messages::event(&event)).await
                        && !event.is_terminal();
                }
                None => open = false,
            },
            inbound = stream.next() => match inbound {
                Some(Ok(Message::Close(_))) | None => open = false,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::debug!(job_id = %job_id, error = %e, "WebSocket receive error");
                    open = false;
                }
            },
        }
    }

    observer.close();
    let _ = sink.send(Message::Close(None)).await;
}

/// Send one JSON frame. Returns `false` once the sink is closed.
async fn send_json<S>(sink: &mut S, frame: &Value) -> bool
where
    S: Sink<Message> + Unpin,
    S::Error: Display,
{
    match sink.send(Message::Text(frame.to_string().into())).await {
        Ok(()) => true,
        Err(e) => {
            tracing::debug!(error = %e, "WebSocket sink closed");
            false
        }
    }
}
