// Live channel endpoints - WebSocket sessions and the chunked HTTP fallback
use crate::application::session_manager::{Session, SessionOutput};
use crate::domain::dashboard::{DashboardSchema, DataBinding};
use crate::domain::metric::{FrameErrorCode, StreamFrame};
use crate::infrastructure::chunked_frames::chunked_frame_stream;
use crate::presentation::app_state::AppState;
use crate::presentation::error::ApiError;
use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade, close_code};
use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use std::sync::Arc;

#[derive(Debug, Default, Deserialize)]
pub struct LiveQuery {
    /// Comma separated topic list
    pub topics: Option<String>,
    pub interval: Option<u64>,
}

/// A binding and the id its frames are tagged with.
pub type Attachment = (String, DataBinding);

impl LiveQuery {
    /// Ad-hoc subscriptions are tagged with their topic.
    pub fn bindings(&self) -> Vec<Attachment> {
        self.topics
            .as_deref()
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(|t| (t.to_string(), DataBinding::stream(t, self.interval)))
            .collect()
    }
}

/// Client to server messages on an open channel
#[derive(Debug, PartialEq, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum ClientCommand {
    Subscribe {
        topic: String,
        #[serde(default)]
        interval: Option<u64>,
        /// Defaults to the topic
        #[serde(default)]
        binding: Option<String>,
    },
    Unsubscribe {
        #[serde(default)]
        binding: Option<String>,
        #[serde(default)]
        topic: Option<String>,
    },
}

/// `/ws/data?topics=a,b&interval=1000`
pub async fn ws_data(
    ws: WebSocketUpgrade,
    Query(query): Query<LiveQuery>,
    State(state): State<Arc<AppState>>,
) -> Response {
    let bindings = query.bindings();
    ws.on_upgrade(move |socket| serve_socket(socket, state, bindings))
}

/// `/ws/data/{topic}`, one topic per connection
pub async fn ws_topic(
    ws: WebSocketUpgrade,
    Path(topic): Path<String>,
    Query(query): Query<LiveQuery>,
    State(state): State<Arc<AppState>>,
) -> Response {
    let bindings = vec![(topic.clone(), DataBinding::stream(topic, query.interval))];
    ws.on_upgrade(move |socket| serve_socket(socket, state, bindings))
}

/// `/api/screens/{code}/live`, every stream-mode widget of a dashboard
pub async fn ws_screen(
    ws: WebSocketUpgrade,
    Path(code): Path<String>,
    State(state): State<Arc<AppState>>,
) -> Result<Response, ApiError> {
    let schema = state
        .dashboard_service
        .get_by_code(&code)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("dashboard `{}`", code)))?;

    let bindings = screen_bindings(&schema);
    Ok(ws.on_upgrade(move |socket| serve_socket(socket, state, bindings)))
}

/// Stream-mode widgets of a dashboard, each tagged with its widget id.
pub fn screen_bindings(schema: &DashboardSchema) -> Vec<Attachment> {
    schema
        .stream_bindings()
        .map(|(widget, binding)| {
            tracing::debug!(code = %schema.code, widget = %widget, topic = ?binding.source(), "live widget");
            (widget.to_string(), binding.clone())
        })
        .collect()
}

/// `/api/stream?topics=a,b`, length-prefixed frames over a chunked body
pub async fn stream_chunked(
    Query(query): Query<LiveQuery>,
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
) -> Response {
    let compress = headers
        .get("accept-encoding")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.contains("br"))
        .unwrap_or(false);

    let (mut session, output) = state.sessions.open();
    attach_all(&mut session, &query.bindings());

    let shutdown = session.cancel_token();
    let frames = output.into_stream();
    // The session lives as long as the body; hyper drops the body when the
    // client goes away.
    let stream = async_stream::stream! {
        let session = session;
        let mut frames = std::pin::pin!(frames);
        loop {
            let next = tokio::select! {
                _ = shutdown.cancelled() => None,
                frame = frames.next() => frame,
            };
            match next {
                Some(frame) => yield frame,
                None => break,
            }
        }
        session.close().await;
    };

    match chunked_frame_stream(stream, compress) {
        Ok(response) => response,
        Err(status) => status.into_response(),
    }
}

async fn serve_socket(socket: WebSocket, state: Arc<AppState>, bindings: Vec<Attachment>) {
    let (mut session, output) = state.sessions.open();
    attach_all(&mut session, &bindings);
    run_socket(socket, session, output).await;
}

/// Subscribe each binding; failures are reported per subscription.
pub fn attach_all(session: &mut Session, bindings: &[Attachment]) {
    for (id, binding) in bindings {
        let _ = session.subscribe_as(id.as_str(), binding);
    }
}

/// Apply one client text message to the session.
pub fn apply_command(session: &mut Session, text: &str) {
    match serde_json::from_str::<ClientCommand>(text) {
        Ok(ClientCommand::Subscribe { topic, interval, binding }) => {
            let id = binding.unwrap_or_else(|| topic.clone());
            let _ = session.subscribe_as(id, &DataBinding::stream(topic, interval));
        }
        Ok(ClientCommand::Unsubscribe { binding, topic }) => match binding.or(topic) {
            Some(id) => {
                if !session.unsubscribe(&id) {
                    session.notify(StreamFrame::error(
                        Some(&id),
                        None,
                        FrameErrorCode::BadRequest,
                        "not subscribed",
                    ));
                }
            }
            None => session.notify(StreamFrame::error(
                None,
                None,
                FrameErrorCode::BadRequest,
                "unsubscribe needs a binding or topic",
            )),
        },
        Err(e) => {
            tracing::debug!(session = session.id(), "bad client command: {}", e);
            session.notify(StreamFrame::error(
                None,
                None,
                FrameErrorCode::BadRequest,
                format!("invalid command: {}", e),
            ));
        }
    }
}

async fn run_socket(socket: WebSocket, mut session: Session, output: SessionOutput) {
    let (mut sink, mut incoming) = socket.split();
    let mut frames = std::pin::pin!(output.into_stream());
    let shutdown = session.cancel_token();

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                let _ = sink
                    .send(Message::Close(Some(CloseFrame {
                        code: close_code::AWAY,
                        reason: "server shutting down".into(),
                    })))
                    .await;
                break;
            }
            frame = frames.next() => {
                let Some(frame) = frame else { break };
                let text = match serde_json::to_string(&frame) {
                    Ok(text) => text,
                    Err(e) => {
                        tracing::warn!(session = session.id(), "unencodable frame: {}", e);
                        continue;
                    }
                };
                if let Err(e) = sink.send(Message::Text(text)).await {
                    tracing::debug!(session = session.id(), "channel write failed: {}", e);
                    break;
                }
            }
            message = incoming.next() => match message {
                Some(Ok(Message::Text(text))) => apply_command(&mut session, &text),
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::debug!(session = session.id(), "channel read failed: {}", e);
                    break;
                }
            },
        }
    }

    tracing::debug!(
        session = session.id(),
        state = ?session.state(),
        bindings = ?session.bindings().collect::<Vec<_>>(),
        "closing live channel"
    );
    session.close().await;
}
