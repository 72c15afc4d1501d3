//! WebSocket chat. One socket is one conversation keyed by the user id.

use axum::{
    extract::{
        Path, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::{ApiError, AppState};

#[derive(Debug, Deserialize)]
struct ClientMessage {
    message: String,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum ServerMessage {
    Reply {
        response: String,
        is_onboarding: bool,
        timestamp: String,
    },
    Error {
        error: String,
    },
}

pub(super) async fn ws_handler(
    ws: WebSocketUpgrade,
    Path(user_id): Path<String>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    info!(user_id = %user_id, "Chat client connecting");
    ws.on_upgrade(move |socket| handle_chat_socket(socket, user_id, state))
}

async fn handle_chat_socket(mut socket: WebSocket, user_id: String, state: AppState) {
    info!(user_id = %user_id, "Chat client connected");

    loop {
        let reply = match socket.recv().await {
            Some(Ok(Message::Text(text))) => match serde_json::from_str::<ClientMessage>(&text) {
                Ok(msg) => run_turn(&state, &user_id, &msg.message).await,
                Err(e) => {
                    debug!(error = %e, text = %text, "Invalid JSON from chat client");
                    ServerMessage::Error {
                        error: "Expected {\"message\": \"...\"}".to_string(),
                    }
                }
            },
            Some(Ok(Message::Ping(data))) => {
                if socket.send(Message::Pong(data)).await.is_err() {
                    break;
                }
                continue;
            }
            Some(Ok(Message::Close(_))) | None => {
                info!(user_id = %user_id, "Chat client disconnected");
                break;
            }
            Some(Err(e)) => {
                warn!(error = %e, "Chat WebSocket error");
                break;
            }
            _ => continue,
        };

        let Ok(json) = serde_json::to_string(&reply) else {
            continue;
        };
        if socket.send(Message::Text(json.into())).await.is_err() {
            debug!(user_id = %user_id, "Chat client disconnected during send");
            break;
        }
    }

    info!(user_id = %user_id, "Chat connection closed");
}

async fn run_turn(state: &AppState, user_id: &str, message: &str) -> ServerMessage {
    match state
        .orchestrator
        .turn(Some(user_id), user_id, message)
        .await
    {
        Ok(result) => ServerMessage::Reply {
            response: result.response_text,
            is_onboarding: result.is_onboarding,
            timestamp: chrono::Utc::now().to_rfc3339(),
        },
        Err(e) => {
            let error = match ApiError::from(e) {
                ApiError::BadRequest(m) | ApiError::NotFound(m) => m,
                ApiError::Upstream(m) | ApiError::Internal(m) => {
                    warn!(user_id, error = %m, "Chat turn failed");
                    "Internal server error".to_string()
                }
            };
            ServerMessage::Error { error }
        }
    }
}
