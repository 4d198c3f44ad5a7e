//! WebSocket notification channel.

use std::sync::Arc;

use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Path, Query, State, WebSocketUpgrade};
use axum::response::{IntoResponse, Response};
use futures::{SinkExt, StreamExt};
use tracing::{debug, info, warn};

use rsvphub_core::error::AppError;
use rsvphub_core::result::AppResult;
use rsvphub_core::types::id::UserId;
use rsvphub_realtime::{ConnectionHandle, InboundMessage, OutboundMessage, PushChannel};

use crate::error::ApiError;
use crate::state::AppState;

/// Query parameters for the upgrade request.
#[derive(Debug, serde::Deserialize)]
pub struct WsQuery {
    /// JWT access token.
    pub token: Option<String>,
}

/// GET /ws/notifications/{user_id}?token={jwt}
///
/// The token is checked before the upgrade is looked at, so an
/// unauthenticated client gets 401/403 rather than an upgrade error.
pub async fn ws_notifications(
    State(state): State<AppState>,
    Path(user_id): Path<UserId>,
    Query(query): Query<WsQuery>,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    if let Err(e) = authorize(&state, user_id, query.token.as_deref()).await {
        return ApiError::from(e).into_response();
    }

    match ws {
        Ok(ws) => ws.on_upgrade(move |socket| handle_socket(state, user_id, socket)),
        Err(rejection) => rejection.into_response(),
    }
}

async fn authorize(state: &AppState, user_id: UserId, token: Option<&str>) -> AppResult<()> {
    let token = token
        .filter(|t| !t.is_empty())
        .ok_or_else(|| AppError::authentication("Missing access token"))?;
    let claims = state.jwt_decoder.decode_access_token(token).await?;
    if claims.user_id() != user_id {
        warn!(%user_id, token_user = %claims.user_id(), "Notification channel user mismatch");
        return Err(AppError::authorization(
            "Token does not belong to the requested user",
        ));
    }
    Ok(())
}

/// Runs one established socket until either side closes it.
async fn handle_socket(state: AppState, user_id: UserId, socket: WebSocket) {
    let (handle, mut outbound_rx) =
        ConnectionHandle::new(user_id, state.config.realtime.channel_buffer_size);
    let handle = Arc::new(handle);
    let conn_id = handle.id;

    state.registry.connect(user_id, handle.clone()).await;
    info!(%conn_id, %user_id, "Notification channel opened");

    let (mut ws_tx, mut ws_rx) = socket.split();

    let writer = {
        let handle = handle.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    msg = outbound_rx.recv() => {
                        let Some(msg) = msg else { break };
                        let text = match msg.to_json() {
                            Ok(text) => text,
                            Err(e) => {
                                warn!(%conn_id, error = %e, "Failed to encode push message");
                                continue;
                            }
                        };
                        if ws_tx.send(Message::Text(text.into())).await.is_err() {
                            break;
                        }
                    }
                    _ = handle.closed() => {
                        let _ = ws_tx.send(Message::Close(None)).await;
                        break;
                    }
                }
            }
            handle.close().await;
        })
    };

    loop {
        let frame = tokio::select! {
            frame = ws_rx.next() => frame,
            _ = handle.closed() => break,
        };
        match frame {
            Some(Ok(Message::Text(text))) => handle_inbound(&handle, text.as_str()).await,
            Some(Ok(Message::Close(_))) | None => break,
            Some(Ok(_)) => {}
            Some(Err(e)) => {
                warn!(%conn_id, error = %e, "Notification channel error");
                break;
            }
        }
    }

    state.registry.disconnect(user_id, conn_id).await;
    handle.close().await;
    if let Err(e) = writer.await {
        warn!(%conn_id, error = %e, "Notification writer task failed");
    }

    info!(%conn_id, %user_id, "Notification channel closed");
}

async fn handle_inbound(handle: &ConnectionHandle, text: &str) {
    let reply = match serde_json::from_str::<InboundMessage>(text) {
        Ok(InboundMessage::Ping) => OutboundMessage::Pong,
        Err(e) => {
            debug!(conn_id = %handle.id, error = %e, "Unrecognized client message");
            OutboundMessage::Error {
                code: "INVALID_MESSAGE".to_string(),
                message: "Expected a message such as {\"type\":\"ping\"}".to_string(),
            }
        }
    };
    if let Err(e) = handle.send(&reply).await {
        debug!(conn_id = %handle.id, error = %e, "Reply dropped");
    }
}
