//! WebSocket endpoints for transcript-room subscribers (spec §4.2).
//!
//! Adapted from the teacher's node WebSocket handler (`node_ws`/
//! `handle_socket`/`token_eq`): bearer auth via a negotiated subprotocol,
//! checked with the same constant-time digest comparison, and a
//! writer/reader split per connection.

use axum::extract::ws::{CloseFrame, Message, WebSocket};
use axum::extract::{Path, State, WebSocketUpgrade};
use axum::http::{header, HeaderMap};
use axum::response::IntoResponse;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use reflector_domain::model::EventName;

use crate::event_bus::{transcript_room, user_room};
use crate::state::AppState;

/// Close code for unauthenticated connects (spec §4.2 "defined application
/// close code").
const CLOSE_UNAUTHENTICATED: u16 = 4401;

/// Constant-time token comparison via SHA-256 digest; hashing normalizes
/// lengths so `ct_eq` always compares 32 bytes.
fn token_eq(a: &str, b: &str) -> bool {
    let ha = Sha256::digest(a.as_bytes());
    let hb = Sha256::digest(b.as_bytes());
    ha.ct_eq(&hb).into()
}

/// Splits the `Sec-WebSocket-Protocol` header into the offered protocol
/// list. Clients carry the bearer token as the second entry:
/// `Sec-WebSocket-Protocol: bearer, <token>`.
fn offered_protocols(headers: &HeaderMap) -> Vec<String> {
    headers
        .get(header::SEC_WEBSOCKET_PROTOCOL)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.split(',').map(|s| s.trim().to_string()).collect())
        .unwrap_or_default()
}

fn authorize(state: &AppState, headers: &HeaderMap) -> (bool, Option<String>) {
    let offered = offered_protocols(headers);
    let provided = offered.get(1).map(String::as_str).unwrap_or("");
    let authorized = match &state.ws_token {
        Some(expected) => token_eq(provided, expected),
        None => true,
    };
    (authorized, offered.into_iter().next())
}

async fn close_unauthenticated(mut socket: WebSocket) {
    let _ = socket
        .send(Message::Close(Some(CloseFrame {
            code: CLOSE_UNAUTHENTICATED,
            reason: "unauthenticated".into(),
        })))
        .await;
}

/// `GET /v1/transcripts/:id/ws` — subscribe to one transcript's room.
///
/// On connect, replays the transcript's historical events except
/// `TRANSCRIPT`/`STATUS` (too chatty) and except all-but-last `DAG_STATUS`,
/// then switches to live delivery (spec §4.2).
pub async fn transcript_ws(
    ws: WebSocketUpgrade,
    headers: HeaderMap,
    State(state): State<AppState>,
    Path(transcript_id): Path<String>,
) -> impl IntoResponse {
    let (authorized, chosen_protocol) = authorize(&state, &headers);
    let ws = match chosen_protocol {
        Some(protocol) => ws.protocols([protocol]),
        None => ws,
    };
    ws.on_upgrade(move |socket| async move {
        if !authorized {
            close_unauthenticated(socket).await;
            return;
        }
        handle_transcript_socket(socket, state, transcript_id).await;
    })
}

/// `GET /v1/users/:id/ws` — subscribe to one user's personal room (the
/// `STATUS`/`FINAL_TITLE`/`DURATION` republish target, spec §4.1). No
/// replay: the store keeps no per-user event log, only live fan-out.
pub async fn user_ws(
    ws: WebSocketUpgrade,
    headers: HeaderMap,
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> impl IntoResponse {
    let (authorized, chosen_protocol) = authorize(&state, &headers);
    let ws = match chosen_protocol {
        Some(protocol) => ws.protocols([protocol]),
        None => ws,
    };
    ws.on_upgrade(move |socket| async move {
        if !authorized {
            close_unauthenticated(socket).await;
            return;
        }
        handle_live_only_socket(socket, state, user_room(&user_id)).await;
    })
}

async fn handle_transcript_socket(socket: WebSocket, state: AppState, transcript_id: String) {
    let room_id = transcript_room(&transcript_id);
    let (mut sink, stream) = socket.split();

    if let Some(transcript) = state.store.get_by_id(&transcript_id) {
        for event in &transcript.events {
            if matches!(event.event_name, EventName::Transcript | EventName::Status) {
                continue;
            }
            if send_event(&mut sink, event).await.is_err() {
                return;
            }
        }
        if let Some(last_dag_status) = state.bus.last_dag_status(&room_id) {
            if send_event(&mut sink, &last_dag_status).await.is_err() {
                return;
            }
        }
    }

    run_live_loop(sink, stream, &state, room_id).await;
}

async fn handle_live_only_socket(socket: WebSocket, state: AppState, room_id: String) {
    let (sink, stream) = socket.split();
    run_live_loop(sink, stream, &state, room_id).await;
}

async fn run_live_loop(
    mut sink: SplitSink<WebSocket, Message>,
    mut stream: SplitStream<WebSocket>,
    state: &AppState,
    room_id: String,
) {
    let mut subscription = state.bus.subscribe(room_id.clone());

    loop {
        tokio::select! {
            event = subscription.receiver.recv() => {
                match event {
                    Some(event) => {
                        if send_event(&mut sink, &event).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
            inbound = stream.next() => {
                match inbound {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {} // clients don't send anything meaningful; ignore.
                    Some(Err(_)) => break,
                }
            }
        }
    }

    state.bus.unsubscribe(&subscription.room_id, subscription.id);
}

async fn send_event(
    sink: &mut SplitSink<WebSocket, Message>,
    event: &reflector_domain::model::TranscriptEvent,
) -> Result<(), ()> {
    let json = serde_json::to_string(event).map_err(|_| ())?;
    sink.send(Message::Text(json)).await.map_err(|_| ())
}
