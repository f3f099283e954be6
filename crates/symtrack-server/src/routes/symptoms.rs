use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::get,
    Json, Router,
};
use symtrack_schema::Symptom;

use crate::routes::require_user_id;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/", get(list_symptoms))
}

async fn list_symptoms(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<Symptom>>, StatusCode> {
    let user_id = require_user_id(&headers)?;
    let symptoms = state.store.list_symptoms(user_id).await.map_err(|e| {
        tracing::error!("failed to list symptoms: {e:#}");
        StatusCode::INTERNAL_SERVER_ERROR
    })?;
    Ok(Json(symptoms))
}
