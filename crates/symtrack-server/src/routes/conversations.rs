use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    routing::{delete, get},
    Json, Router,
};
use symtrack_schema::ChatMessage;
use uuid::Uuid;

use crate::routes::require_user_id;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/{id}/messages", get(get_messages))
        .route("/{id}", delete(delete_conversation))
}

async fn get_messages(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<ChatMessage>>, StatusCode> {
    let user_id = require_user_id(&headers)?;
    owned_conversation(&state, id, user_id).await?;

    let messages = state.store.conversation_messages(id).await.map_err(|e| {
        tracing::error!("failed to load messages: {e:#}");
        StatusCode::INTERNAL_SERVER_ERROR
    })?;
    Ok(Json(messages))
}

async fn delete_conversation(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    let user_id = require_user_id(&headers)?;
    owned_conversation(&state, id, user_id).await?;

    let deleted = state.store.delete_conversation(id).await.map_err(|e| {
        tracing::error!("failed to delete conversation: {e:#}");
        StatusCode::INTERNAL_SERVER_ERROR
    })?;
    if !deleted {
        return Err(StatusCode::NOT_FOUND);
    }
    Ok(Json(serde_json::json!({ "status": "deleted", "id": id })))
}

async fn owned_conversation(
    state: &AppState,
    id: Uuid,
    user_id: Uuid,
) -> Result<(), StatusCode> {
    let conversation = state
        .store
        .get_conversation(id)
        .await
        .map_err(|e| {
            tracing::error!("failed to load conversation: {e:#}");
            StatusCode::INTERNAL_SERVER_ERROR
        })?
        .ok_or(StatusCode::NOT_FOUND)?;
    if conversation.user_id != user_id {
        return Err(StatusCode::NOT_FOUND);
    }
    Ok(())
}
