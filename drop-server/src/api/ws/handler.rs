//! WebSocket handler
//!
//! 每个连接订阅一个受众频道，把 [`BusMessage`] 序列化为 JSON 文本帧推送给客户端。
//! 客户端发来的文本帧被忽略 (只读推送)。

use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use shared::message::{Audience, BusMessage};
use tokio::sync::broadcast::error::RecvError;

use crate::auth::Actor;
use crate::core::ServerState;

/// GET /api/ws/public
pub async fn public_ws(
    State(state): State<ServerState>,
    actor: Actor,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_connection(socket, state, Audience::Public, actor))
}

/// GET /api/ws/admin
pub async fn admin_ws(
    State(state): State<ServerState>,
    actor: Actor,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_connection(socket, state, Audience::Admin, actor))
}

async fn handle_connection(socket: WebSocket, state: ServerState, audience: Audience, actor: Actor) {
    // 先订阅再 split，避免握手后的第一条消息丢失
    let mut rx = state.message_bus.subscribe(audience);
    let (mut ws_sink, mut ws_stream) = socket.split();

    tracing::info!(%audience, actor_id = ?actor.id, "WebSocket connected");

    loop {
        tokio::select! {
            msg = ws_stream.next() => {
                match msg {
                    Some(Ok(Message::Ping(data))) => {
                        let _ = ws_sink.send(Message::Pong(data)).await;
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        tracing::info!(%audience, actor_id = ?actor.id, "WebSocket disconnected");
                        break;
                    }
                    Some(Err(e)) => {
                        tracing::warn!(%audience, "WebSocket error: {e}");
                        break;
                    }
                    _ => {} // Text, Binary, Pong: ignore
                }
            }

            received = rx.recv() => {
                match received {
                    Ok(bus_msg) => {
                        if push(&mut ws_sink, &bus_msg).await.is_err() {
                            tracing::warn!(%audience, "Failed to push message via WS");
                            break;
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(%audience, skipped, "WebSocket subscriber lagged, messages dropped");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        }
    }

    // Close frame (best-effort)
    let _ = ws_sink.close().await;
}

async fn push<S>(ws_sink: &mut S, msg: &BusMessage) -> Result<(), axum::Error>
where
    S: futures::Sink<Message, Error = axum::Error> + Unpin,
{
    match serde_json::to_string(msg) {
        Ok(json) => ws_sink.send(Message::Text(json.into())).await,
        Err(e) => {
            tracing::error!(message_id = %msg.id, "Failed to serialize bus message: {e}");
            Ok(())
        }
    }
}
