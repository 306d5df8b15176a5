use std::sync::Arc;

use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::ws::{close_code, CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::{IntoResponse, Response};
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use sitepress_core::job::JobStatus;
use sitepress_events::JobEvent;
use sitepress_worker::subscription::TIMEOUT_MESSAGE;
use sitepress_worker::{Frame, JobSubscription};

use crate::error::{AppError, AppResult};
use crate::state::AppState;
use crate::ws::manager::WsManager;

/// Close reason sent after the terminal frame.
const COMPLETED_REASON: &str = "Job completed";

/// Close reason sent when the job record vanished mid-stream.
const GONE_REASON: &str = "Job no longer available";

#[derive(Debug, Deserialize)]
pub struct WsParams {
    #[serde(rename = "jobId")]
    pub job_id: Option<String>,
}

/// Status frame pushed to the client.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StatusFrame<'a> {
    job_id: &'a str,
    status: JobStatus,
    progress: u8,
    message: &'a str,
}

impl<'a> From<&'a JobEvent> for StatusFrame<'a> {
    fn from(event: &'a JobEvent) -> Self {
        Self {
            job_id: &event.job_id,
            status: event.status,
            progress: event.progress,
            message: &event.message,
        }
    }
}

/// HTTP handler that upgrades the connection to a job status WebSocket.
///
/// The job is looked up before the upgrade so a missing `jobId` answers 400
/// and an unknown job answers 404 as plain HTTP errors.
pub async fn ws_handler(
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
    State(state): State<AppState>,
    Query(params): Query<WsParams>,
) -> AppResult<Response> {
    let job_id = params
        .job_id
        .filter(|id| !id.is_empty())
        .ok_or_else(|| AppError::BadRequest("Missing jobId query parameter".to_string()))?;

    let subscription = state.builds.subscribe(&job_id).await?;

    let ws = match ws {
        Ok(ws) => ws,
        Err(rejection) => return Ok(rejection.into_response()),
    };

    Ok(ws.on_upgrade(move |socket| handle_socket(socket, subscription, state.ws_manager)))
}

/// Manage a single status connection after upgrade.
///
/// The sender task forwards the subscription's frames and any control
/// messages from `WsManager`; the current task drains inbound messages until
/// either side closes.
async fn handle_socket(
    socket: WebSocket,
    mut subscription: JobSubscription,
    ws_manager: Arc<WsManager>,
) {
    let conn_id = uuid::Uuid::new_v4().to_string();
    let job_id = subscription.job_id().to_string();

    let mut rx = ws_manager.add(conn_id.clone(), job_id.clone()).await;
    let subscribers = ws_manager.subscriber_count(&job_id).await;
    tracing::info!(conn_id = %conn_id, job_id = %job_id, subscribers, "WebSocket connected");

    let (mut sink, mut stream) = socket.split();

    let sender_conn_id = conn_id.clone();
    let mut send_task = tokio::spawn(async move {
        loop {
            tokio::select! {
                control = rx.recv() => {
                    let Some(msg) = control else { break };
                    let closing = matches!(msg, Message::Close(_));
                    if sink.send(msg).await.is_err() || closing {
                        break;
                    }
                }
                frame = subscription.next() => {
                    let Some(frame) = frame else {
                        let _ = sink.send(close(close_code::ERROR, GONE_REASON)).await;
                        break;
                    };
                    if let Err(e) = sink.send(status_message(frame.event())).await {
                        tracing::debug!(conn_id = %sender_conn_id, error = %e, "WebSocket sink closed");
                        break;
                    }
                    match frame {
                        Frame::Update(_) => {}
                        Frame::Final(_) => {
                            let _ = sink.send(close(close_code::NORMAL, COMPLETED_REASON)).await;
                            break;
                        }
                        Frame::TimedOut(_) => {
                            let _ = sink.send(close(close_code::ERROR, TIMEOUT_MESSAGE)).await;
                            break;
                        }
                    }
                }
            }
        }
    });

    loop {
        tokio::select! {
            _ = &mut send_task => break,
            inbound = stream.next() => match inbound {
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(Message::Pong(_))) => {
                    tracing::trace!(conn_id = %conn_id, "Pong received");
                }
                // Clients have nothing to say on a status channel.
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::debug!(conn_id = %conn_id, error = %e, "WebSocket receive error");
                    break;
                }
            },
        }
    }

    ws_manager.remove(&conn_id).await;
    send_task.abort();
    tracing::info!(conn_id = %conn_id, job_id = %job_id, "WebSocket disconnected");
}

fn status_message(event: &JobEvent) -> Message {
    let frame = StatusFrame::from(event);
    match serde_json::to_string(&frame) {
        Ok(text) => Message::Text(text.into()),
        Err(e) => {
            tracing::error!(job_id = %event.job_id, error = %e, "Failed to encode status frame");
            close(close_code::ERROR, "Failed to encode status frame")
        }
    }
}

fn close(code: u16, reason: &'static str) -> Message {
    Message::Close(Some(CloseFrame {
        code,
        reason: reason.into(),
    }))
}
