use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing::debug;

use crate::app_state::AppState;
use crate::services::realtime::RealtimeBroadcaster;
use crate::utils::jwt::verify_token;

#[derive(Deserialize)]
pub struct WsQuery {
    token: String,
}

/// WebSocket 订阅。浏览器无法自定义握手头，令牌走查询参数
pub async fn ws_handler(
    State(state): State<AppState>,
    Query(query): Query<WsQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    let claims = match verify_token(&query.token, state.settings.jwt_secret.as_bytes()) {
        Ok(claims) => claims,
        Err(_) => return StatusCode::UNAUTHORIZED.into_response(),
    };

    let user_id = match claims.user_id() {
        Some(id) => id,
        None => return StatusCode::UNAUTHORIZED.into_response(),
    };

    let realtime = state.realtime.clone();
    ws.on_upgrade(move |socket| handle_socket(socket, user_id, realtime))
}

async fn handle_socket(mut socket: WebSocket, user_id: i64, realtime: Arc<RealtimeBroadcaster>) {
    let mut rx = realtime.subscribe();

    loop {
        tokio::select! {
            event = rx.recv() => match event {
                Ok(event) if event.user_id == user_id => {
                    let text = match serde_json::to_string(&event) {
                        Ok(text) => text,
                        Err(_) => continue,
                    };
                    if socket.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    debug!("WebSocket subscriber for user {} lagged, skipped {}", user_id, skipped);
                }
                Err(RecvError::Closed) => break,
            },
            message = socket.recv() => match message {
                // 客户端消息只用于保活，内容忽略
                Some(Ok(_)) => {}
                _ => break,
            },
        }
    }

    debug!("WebSocket connection closed for user {}", user_id);
}
