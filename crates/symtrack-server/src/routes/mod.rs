pub mod assessments;
pub mod chat;
pub mod conversations;
pub mod episodes;
pub mod symptoms;

use axum::http::{HeaderMap, StatusCode};
use axum::Router;
use uuid::Uuid;

use crate::state::AppState;

pub fn api_router() -> Router<AppState> {
    Router::new()
        .nest("/chat", chat::router())
        .nest("/episodes", episodes::router())
        .nest("/symptoms", symptoms::router())
        .nest("/assessments", assessments::router())
        .nest("/conversations", conversations::router())
}

/// Caller identity comes from the `x-user-id` header; a missing or
/// malformed value is a 400.
pub(crate) fn require_user_id(headers: &HeaderMap) -> Result<Uuid, StatusCode> {
    headers
        .get("x-user-id")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| Uuid::parse_str(v).ok())
        .ok_or(StatusCode::BAD_REQUEST)
}
