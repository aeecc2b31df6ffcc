//! Control channel: a WebSocket per client feeding key levels into the
//! shared control state. Clients that arrive before the engine is up get
//! periodic loading notices until a bounded budget runs out.

use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::controls::ControlState;
use crate::lifecycle::ReadyOutcome;
use crate::registry::CloseSignal;
use crate::AppState;

// WebSocket close codes: server error / service overloaded, try again later.
const CLOSE_INTERNAL_ERROR: u16 = 1011;
const CLOSE_TRY_AGAIN_LATER: u16 = 1013;

#[derive(Debug, Deserialize)]
struct ControlMessage {
    key: String,
    #[serde(rename = "type")]
    kind: String,
}

#[derive(Debug, Serialize)]
struct StatusNotice {
    status: &'static str,
}

pub async fn ws_control_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_control_socket(socket, state))
}

async fn handle_control_socket(mut socket: WebSocket, state: AppState) {
    state.coordinator.ensure_started();

    let (conn_id, mut closer) = state.registry.register();
    info!(
        "control channel connected: id={}, total={}",
        conn_id,
        state.registry.len()
    );

    if !await_engine_with_notices(&mut socket, &state, &mut closer).await {
        state.registry.unregister(conn_id);
        info!("control channel closed before engine ready: id={conn_id}");
        return;
    }

    let controls = state.coordinator.controls();
    loop {
        tokio::select! {
            _ = closer.recv() => {
                // Force-closed (teardown / reload). Interrupts a blocked
                // read rather than waiting for the peer.
                let _ = socket.send(Message::Close(None)).await;
                break;
            }
            message = socket.recv() => {
                match message {
                    Some(Ok(Message::Text(text))) => apply_control_message(&controls, text.as_str()),
                    Some(Ok(Message::Ping(payload))) => {
                        if socket.send(Message::Pong(payload)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(err)) => {
                        // Channel I/O failure is just a disconnect.
                        info!("control channel receive error: id={conn_id}, {err}");
                        break;
                    }
                }
            }
        }
    }

    state.registry.unregister(conn_id);
    // Release everything this channel may have pressed so no input stays
    // stuck active against the simulation.
    controls.reset_all();
    info!("control channel disconnected: id={conn_id}");
}

/// Wait for the engine, sending `{"status":"loading"}` at the notice
/// interval. Returns `false` when the channel should be torn down: budget
/// exhausted, construction failed, force-closed, or the peer went away.
async fn await_engine_with_notices(
    socket: &mut WebSocket,
    state: &AppState,
    closer: &mut CloseSignal,
) -> bool {
    let mut notices = 0u32;
    loop {
        tokio::select! {
            _ = closer.recv() => {
                let _ = socket.send(Message::Close(None)).await;
                return false;
            }
            outcome = state
                .coordinator
                .await_ready(state.config.loading_notice_interval) =>
            {
                match outcome {
                    ReadyOutcome::Ready => return true,
                    ReadyOutcome::TimedOut => {
                        notices += 1;
                        if notices > state.config.loading_notice_budget {
                            warn!("engine still loading after {notices} notices; giving up");
                            let _ = socket
                                .send(Message::Close(Some(CloseFrame {
                                    code: CLOSE_TRY_AGAIN_LATER,
                                    reason: "engine is still loading".into(),
                                })))
                                .await;
                            return false;
                        }
                        if send_status(socket, "loading").await.is_err() {
                            return false;
                        }
                    }
                    ReadyOutcome::Failed(reason) => {
                        warn!("control channel rejected: {reason}");
                        let _ = socket
                            .send(Message::Close(Some(CloseFrame {
                                code: CLOSE_INTERNAL_ERROR,
                                reason: reason.into(),
                            })))
                            .await;
                        return false;
                    }
                }
            }
        }
    }
}

fn apply_control_message(controls: &ControlState, text: &str) {
    match serde_json::from_str::<ControlMessage>(text) {
        // Anything other than "down" is treated as a release.
        Ok(message) => controls.set(&message.key, message.kind == "down"),
        Err(err) => warn!("ignoring malformed control message: {err}"),
    }
}

async fn send_status(socket: &mut WebSocket, status: &'static str) -> Result<(), axum::Error> {
    let text = match serde_json::to_string(&StatusNotice { status }) {
        Ok(text) => text,
        Err(err) => {
            warn!("failed to serialize status notice: {err}");
            return Ok(());
        }
    };
    socket.send(Message::Text(text.into())).await
}
