use axum::{
    extract::{
        ws::{Message as WsMessage, WebSocket, WebSocketUpgrade},
        State,
    },
    http::HeaderMap,
    response::IntoResponse,
};
use liveservice_common::protocol::stomp::{
    decode_frame, encode_frame, Command, Inbound, StompFrame, HEART_BEAT_HEADER,
    PROTOCOL_VERSION, RECEIPT_HEADER, RECEIPT_ID_HEADER, STOMP_SUBPROTOCOLS, VERSION_HEADER,
};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::LiveSocketState;
use crate::error::{current_request_id, request_id_from_headers_or_generate, with_request_id_scope};
use crate::registry::SessionId;
use crate::stomp::{HandlerError, Message};
use crate::validation::{check_ws_frame_size, MAX_WS_FRAME_BYTES};

/// Transport-level keepalive. STOMP heart-beating is negotiated off.
const PING_INTERVAL: Duration = Duration::from_secs(25);

/// Frames to write back after one inbound text message, and whether the
/// socket closes afterwards.
#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct Reply {
    pub frames: Vec<String>,
    pub close: bool,
}

impl Reply {
    fn none() -> Self {
        Self::default()
    }

    fn frame(frame: &StompFrame) -> Self {
        Self { frames: vec![encode_frame(frame)], close: false }
    }

    fn fatal(message: &str) -> Self {
        Self { frames: vec![encode_frame(&StompFrame::error(message))], close: true }
    }

    fn then_close(mut self) -> Self {
        self.close = true;
        self
    }
}

pub async fn ws_upgrade(
    State(state): State<LiveSocketState>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let request_id = request_id_from_headers_or_generate(&headers);
    ws.protocols(STOMP_SUBPROTOCOLS)
        .max_message_size(MAX_WS_FRAME_BYTES)
        .on_upgrade(move |socket| with_request_id_scope(request_id, handle_socket(state, socket)))
}

async fn handle_socket(state: LiveSocketState, mut socket: WebSocket) {
    let session_id = SessionId::generate();
    let request_id = current_request_id().unwrap_or_else(|| "unknown".to_string());
    debug!(session_id = %session_id, request_id = %request_id, "socket opened");

    let (outbound_sender, mut outbound_receiver) = mpsc::unbounded_channel::<String>();
    state.outbox.register(session_id.clone(), outbound_sender);

    let mut ping_interval = tokio::time::interval(PING_INTERVAL);
    ping_interval.reset();
    let mut connected = false;

    loop {
        tokio::select! {
            _ = ping_interval.tick() => {
                if socket.send(WsMessage::Ping(vec![].into())).await.is_err() {
                    break;
                }
            }
            maybe_outbound = outbound_receiver.recv() => {
                let Some(payload) = maybe_outbound else {
                    break;
                };
                if socket.send(WsMessage::Text(payload.into())).await.is_err() {
                    break;
                }
            }
            maybe_message = socket.recv() => {
                let raw = match maybe_message {
                    Some(Ok(WsMessage::Text(raw))) => raw,
                    Some(Ok(WsMessage::Close(_))) | None => break,
                    Some(Ok(_)) => continue,
                    Some(Err(error)) => {
                        debug!(session_id = %session_id, error = %error, "socket read failed");
                        break;
                    }
                };

                let reply = process_text(&state, &session_id, &mut connected, raw.as_str());
                let mut send_failed = false;
                for frame in reply.frames {
                    if socket.send(WsMessage::Text(frame.into())).await.is_err() {
                        send_failed = true;
                        break;
                    }
                }
                if send_failed {
                    break;
                }
                if reply.close {
                    let _ = socket.send(WsMessage::Close(None)).await;
                    break;
                }
            }
        }
    }

    close_session(&state, &session_id);
}

/// Applies one inbound text message to the session.
pub(crate) fn process_text(
    state: &LiveSocketState,
    session_id: &SessionId,
    connected: &mut bool,
    raw: &str,
) -> Reply {
    if let Err(reason) = check_ws_frame_size(raw) {
        return Reply::fatal(&reason);
    }

    let frame = match decode_frame(raw) {
        Ok(Inbound::Heartbeat) => {
            let heartbeat = Message::without_frame(session_id.clone());
            return match state.interceptor.intercept(&heartbeat) {
                Ok(_) => Reply::none(),
                Err(error) => rejected(session_id, error),
            };
        }
        Ok(Inbound::Frame(frame)) => frame,
        Err(error) => {
            warn!(session_id = %session_id, error = %error, "malformed STOMP frame");
            return Reply::fatal("malformed frame");
        }
    };

    let frame = match frame.command() {
        command @ (Command::Connect | Command::Stomp) if *connected => {
            warn!(session_id = %session_id, %command, "repeated CONNECT");
            return Reply::fatal("already connected");
        }
        Command::Stomp => as_connect(&frame),
        Command::Connect => frame,
        command if !*connected => {
            warn!(session_id = %session_id, %command, "frame before CONNECT");
            return Reply::fatal("CONNECT required");
        }
        _ => frame,
    };

    state.metrics.record_inbound_frame(frame.command().as_str());
    let message = Message::new(session_id.clone(), frame);
    if let Err(error) = state.interceptor.intercept(&message) {
        return rejected(session_id, error);
    }

    match message.command() {
        Some(Command::Connect) => {
            *connected = true;
            state.metrics.set_connected_sessions(state.connections.session_count());
            Reply::frame(&connected_frame())
        }
        Some(Command::Disconnect) => {
            let reply = match message.first_native_header(RECEIPT_HEADER) {
                Some(receipt) => Reply::frame(
                    &StompFrame::new(Command::Receipt).with_header(RECEIPT_ID_HEADER, receipt),
                ),
                None => Reply::none(),
            };
            reply.then_close()
        }
        Some(Command::Error) => Reply::none().then_close(),
        _ => Reply::none(),
    }
}

fn rejected(session_id: &SessionId, error: HandlerError) -> Reply {
    match error {
        HandlerError::InvalidAccessToken(_) => {
            debug!(session_id = %session_id, "closing session after rejected token");
            Reply::fatal("invalid access token")
        }
    }
}

/// Tears down everything the session owns once its socket is gone.
fn close_session(state: &LiveSocketState, session_id: &SessionId) {
    let disconnect = Message::new(session_id.clone(), StompFrame::new(Command::Disconnect));
    if let Err(error) = state.interceptor.intercept(&disconnect) {
        warn!(session_id = %session_id, error = %error, "synthetic DISCONNECT failed");
    }
    state.outbox.unregister(session_id);
    let dropped = state.pending.drop_session(session_id);

    state.metrics.set_connected_sessions(state.connections.session_count());
    state.metrics.set_pending_deliveries(state.pending.len());
    info!(session_id = %session_id, dropped_pending = dropped, "socket closed");
}

fn connected_frame() -> StompFrame {
    StompFrame::new(Command::Connected)
        .with_header(VERSION_HEADER, PROTOCOL_VERSION)
        .with_header(HEART_BEAT_HEADER, "0,0")
}

/// STOMP 1.2 clients may open with `STOMP` instead of `CONNECT`.
fn as_connect(frame: &StompFrame) -> StompFrame {
    frame
        .headers()
        .iter()
        .fold(StompFrame::new(Command::Connect), |connect, (name, value)| {
            connect.with_header(name, value)
        })
}
