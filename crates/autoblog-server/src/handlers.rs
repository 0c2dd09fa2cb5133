//! Route handlers.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use serde_json::{Value, json};
use tracing::info;

use autoblog_autopilot::Autopilot;
use autoblog_types::{BlogPost, GenerationSettings, JobState};

use crate::AppState;
use crate::auth::Authorized;
use crate::error::{ApiError, ApiResult};

/// GET /health: simple HTTP health check.
pub async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// GET /posts: every post, newest first.
pub async fn list_posts(State(state): State<Arc<AppState>>) -> ApiResult<Json<Vec<BlogPost>>> {
    Ok(Json(state.storage.list_posts().await?))
}

/// GET /posts/{id}
pub async fn get_post(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<BlogPost>> {
    state
        .storage
        .get_post(&id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("post {id} not found")))
}

/// POST /posts: insert or replace a post.
pub async fn create_post(
    _auth: Authorized,
    State(state): State<Arc<AppState>>,
    Json(post): Json<BlogPost>,
) -> ApiResult<(StatusCode, Json<BlogPost>)> {
    if post.id.trim().is_empty() {
        return Err(ApiError::BadRequest("post id is required".into()));
    }
    state.storage.upsert_post(&post).await?;
    info!(post_id = %post.id, "Post saved");
    Ok((StatusCode::CREATED, Json(post)))
}

/// PUT /posts/{id}
pub async fn update_post(
    _auth: Authorized,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(post): Json<BlogPost>,
) -> ApiResult<Json<BlogPost>> {
    if post.id != id {
        return Err(ApiError::BadRequest(format!(
            "post id {} does not match path id {id}",
            post.id
        )));
    }
    state.storage.upsert_post(&post).await?;
    info!(post_id = %post.id, "Post updated");
    Ok(Json(post))
}

/// DELETE /posts/{id}
pub async fn delete_post(
    _auth: Authorized,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    if !state.storage.delete_post(&id).await? {
        return Err(ApiError::NotFound(format!("post {id} not found")));
    }
    info!(post_id = %id, "Post deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// GET /settings: stored generation settings, or `null`.
pub async fn get_settings(
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<Option<GenerationSettings>>> {
    Ok(Json(state.storage.load_settings().await?))
}

/// POST /settings
pub async fn save_settings(
    _auth: Authorized,
    State(state): State<Arc<AppState>>,
    Json(settings): Json<GenerationSettings>,
) -> ApiResult<Json<GenerationSettings>> {
    state.storage.save_settings(&settings).await?;
    Ok(Json(settings))
}

/// POST /autopilot/start: store the settings and start the scheduler.
pub async fn start_autopilot(
    _auth: Authorized,
    State(state): State<Arc<AppState>>,
    Json(settings): Json<GenerationSettings>,
) -> ApiResult<Json<JobState>> {
    if settings.articles_per_day == 0 {
        return Err(ApiError::BadRequest(
            "articles_per_day must be at least 1".into(),
        ));
    }
    let previous_run = state.autopilot.status().await?.run_id;
    let started = state.autopilot.start(settings).await?;
    if started.run_id != previous_run {
        state.storage.save_settings(&started.settings).await?;
    } else {
        info!("Autopilot already running, stored settings left unchanged");
    }
    Ok(Json(started))
}

/// POST /autopilot/stop
pub async fn stop_autopilot(
    _auth: Authorized,
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<JobState>> {
    Ok(Json(state.autopilot.stop().await?))
}

/// POST /autopilot/run: one job now, outside the schedule.
pub async fn run_autopilot(
    _auth: Authorized,
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<JobState>> {
    Ok(Json(state.autopilot.run_now().await?))
}

/// GET /autopilot/status
pub async fn autopilot_status(
    _auth: Authorized,
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<JobState>> {
    Ok(Json(state.autopilot.status().await?))
}
