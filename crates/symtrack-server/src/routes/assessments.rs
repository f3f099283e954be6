use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    routing::get,
    Json, Router,
};
use symtrack_schema::Assessment;
use uuid::Uuid;

use crate::routes::require_user_id;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_assessments))
        .route("/{id}", get(get_assessment))
}

async fn list_assessments(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<Assessment>>, StatusCode> {
    let user_id = require_user_id(&headers)?;
    let assessments = state.store.list_assessments(user_id).await.map_err(|e| {
        tracing::error!("failed to list assessments: {e:#}");
        StatusCode::INTERNAL_SERVER_ERROR
    })?;
    Ok(Json(assessments))
}

async fn get_assessment(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Json<Assessment>, StatusCode> {
    let user_id = require_user_id(&headers)?;
    let assessment = state
        .store
        .get_assessment(id)
        .await
        .map_err(|e| {
            tracing::error!("failed to load assessment: {e:#}");
            StatusCode::INTERNAL_SERVER_ERROR
        })?
        .filter(|a| a.user_id == user_id)
        .ok_or(StatusCode::NOT_FOUND)?;
    Ok(Json(assessment))
}
