use crate::db::read_snapshot;
use crate::error::PollError;
use crate::startup::AppState;
use axum::{
    extract::{Extension, Json, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CastVoteRequest {
    pub option_id: i32,
}

#[derive(Debug, Serialize)]
pub struct VoteResponse {
    pub message: String,
}

/// Current question and tallies, read straight from the store.
pub async fn get_poll(
    Extension(app_state): Extension<AppState>,
) -> Result<impl IntoResponse, PollError> {
    let snapshot = read_snapshot(app_state.store.as_ref(), &app_state.question)
        .await
        .map_err(|e| {
            error!("Failed to read poll: {}", e);
            PollError::from(e)
        })?;

    Ok((StatusCode::OK, Json(snapshot)))
}

/// Counts one vote, then pushes the new tallies to live subscribers on a
/// detached task. The response does not wait for that push.
pub async fn vote_on_poll(
    Extension(app_state): Extension<AppState>,
    payload: Result<Json<CastVoteRequest>, JsonRejection>,
) -> Result<impl IntoResponse, PollError> {
    let Json(payload) = payload.map_err(|rejection| {
        warn!("Rejected vote payload: {}", rejection);
        PollError::InvalidRequest
    })?;

    app_state
        .store
        .increment(payload.option_id)
        .await
        .map_err(|e| {
            warn!(option_id = payload.option_id, "Vote not counted: {}", e);
            PollError::from(e)
        })?;

    info!(option_id = payload.option_id, "Vote recorded");
    app_state.broadcaster.spawn_broadcast();

    let response = VoteResponse {
        message: "Vote recorded successfully".to_string(),
    };
    Ok((StatusCode::OK, Json(response)))
}
