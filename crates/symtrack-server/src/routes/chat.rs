use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::sse::{Event, KeepAlive, Sse},
    routing::{get, post},
    Json, Router,
};
use futures_core::Stream;
use serde::Deserialize;
use symtrack_core::{ChannelTransport, ClientConnection, DomainError};
use symtrack_schema::HealthChatResponse;
use uuid::Uuid;

use crate::routes::require_user_id;
use crate::state::AppState;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub message: String,
    #[serde(default)]
    pub conversation_id: Option<Uuid>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/message", post(post_message))
        .route("/stream", get(event_stream))
}

async fn post_message(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<ChatRequest>,
) -> Result<Json<HealthChatResponse>, StatusCode> {
    let user_id = require_user_id(&headers)?;
    if request.message.trim().is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }

    // Wire the turn to the user's live SSE stream if one is open;
    // otherwise events are only accumulated for persistence.
    let connection = match state.streams.sender_for(user_id).await {
        Some(tx) => Arc::new(ClientConnection::new(Box::new(ChannelTransport::new(tx)))),
        None => Arc::new(ClientConnection::detached()),
    };

    let response = state
        .orchestrator
        .process_message(user_id, &request.message, request.conversation_id, connection)
        .await
        .map_err(|e| {
            let status = error_status(&e);
            if status == StatusCode::INTERNAL_SERVER_ERROR {
                tracing::error!("chat turn failed: {e:#}");
            }
            status
        })?;

    Ok(Json(response))
}

/// Domain precondition failures are the caller's problem, not a server
/// fault; everything else is a 500.
fn error_status(error: &anyhow::Error) -> StatusCode {
    match error.downcast_ref::<DomainError>() {
        Some(DomainError::ConversationNotFound(_)) => StatusCode::NOT_FOUND,
        Some(_) => StatusCode::BAD_REQUEST,
        None => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

async fn event_stream(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, StatusCode> {
    let user_id = require_user_id(&headers)?;
    let mut rx = state.streams.subscribe(user_id).await;

    let stream = async_stream::stream! {
        while let Some(event) = rx.recv().await {
            match serde_json::to_string(&event) {
                Ok(json) => yield Ok(Event::default().data(json)),
                Err(e) => tracing::warn!("failed to serialize status event: {e}"),
            }
        }
    };

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_conversation_maps_to_not_found() {
        let err = anyhow::Error::from(DomainError::ConversationNotFound(Uuid::new_v4()));
        assert_eq!(error_status(&err), StatusCode::NOT_FOUND);
    }

    #[test]
    fn other_domain_errors_map_to_bad_request() {
        let err = anyhow::Error::from(DomainError::NoActiveConversation);
        assert_eq!(error_status(&err), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn unexpected_errors_map_to_server_fault() {
        let err = anyhow::anyhow!("database unavailable");
        assert_eq!(error_status(&err), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
