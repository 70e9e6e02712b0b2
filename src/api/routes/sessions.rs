use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::api::{error::ApiError, state::AppState};
use crate::application::{SessionSettings, SessionSummary};
use crate::domain::Turn;

#[derive(Debug, Deserialize)]
pub struct UpdateSettingsRequest {
    pub notation: Option<String>,
    pub subject: Option<String>,
}

pub async fn create_session(
    State(state): State<AppState>,
) -> Result<(StatusCode, Json<SessionSummary>), ApiError> {
    let summary = state.verifier.create_session().await?;
    Ok((StatusCode::CREATED, Json(summary)))
}

pub async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionSummary>, ApiError> {
    Ok(Json(state.verifier.summary(id).await?))
}

pub async fn update_settings(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateSettingsRequest>,
) -> Result<Json<SessionSummary>, ApiError> {
    let settings = SessionSettings {
        notation: request.notation,
        subject: request.subject,
    };
    Ok(Json(state.verifier.configure(id, settings).await?))
}

pub async fn get_history(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<Turn>>, ApiError> {
    Ok(Json(state.verifier.history(id).await?))
}

pub async fn reset_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionSummary>, ApiError> {
    Ok(Json(state.verifier.reset(id).await?))
}
