use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use symtrack_schema::Episode;
use uuid::Uuid;

use crate::routes::require_user_id;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct EpisodeQuery {
    /// Restrict to one symptom's history instead of the active set.
    pub symptom: Option<String>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_episodes))
        .route("/{id}", get(get_episode))
}

async fn list_episodes(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<EpisodeQuery>,
) -> Result<Json<Vec<Episode>>, StatusCode> {
    let user_id = require_user_id(&headers)?;
    let episodes = match query.symptom {
        Some(name) => state.store.episodes_for_symptom(user_id, &name).await,
        None => state.store.active_episodes(user_id).await,
    }
    .map_err(|e| {
        tracing::error!("failed to list episodes: {e:#}");
        StatusCode::INTERNAL_SERVER_ERROR
    })?;
    Ok(Json(episodes))
}

async fn get_episode(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Json<Episode>, StatusCode> {
    let user_id = require_user_id(&headers)?;
    let episode = state
        .store
        .get_episode(id)
        .await
        .map_err(|e| {
            tracing::error!("failed to load episode: {e:#}");
            StatusCode::INTERNAL_SERVER_ERROR
        })?
        .filter(|e| e.user_id == user_id)
        .ok_or(StatusCode::NOT_FOUND)?;
    Ok(Json(episode))
}
