use axum::extract::rejection::QueryRejection;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::{Form, Json};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::auth::{CurrentUser, RegisterRequest, TokenRequest, TokenResponse, User};
use super::AppState;
use crate::build_info;
use crate::error::{PredictorError, Result};
use crate::service::{IndicatorSnapshot, PredictionResponse, TrainingSummary};

pub const DEFAULT_TRAINING_DAYS: u32 = 30;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub model_loaded: bool,
}

#[derive(Debug, Deserialize)]
pub struct TrainParams {
    pub days: Option<u32>,
}

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: build_info::version(),
        model_loaded: state.service.is_model_loaded(),
    })
}

pub async fn register(
    State(state): State<AppState>,
    Json(request): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<User>)> {
    let users = state.users.clone();
    let user = tokio::task::spawn_blocking(move || users.register(request)).await??;
    Ok((StatusCode::CREATED, Json(user)))
}

pub async fn token(
    State(state): State<AppState>,
    Form(request): Form<TokenRequest>,
) -> Result<Json<TokenResponse>> {
    let users = state.users.clone();
    let user =
        tokio::task::spawn_blocking(move || users.authenticate(&request.username, &request.password))
            .await??;
    Ok(Json(state.tokens.issue(&user.username)?))
}

pub async fn me(CurrentUser(user): CurrentUser) -> Json<User> {
    Json(user)
}

pub async fn train(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    params: std::result::Result<Query<TrainParams>, QueryRejection>,
) -> Result<Json<TrainingSummary>> {
    let Query(params) = params.map_err(|e| PredictorError::validation(e.body_text()))?;
    let days = params.days.unwrap_or(DEFAULT_TRAINING_DAYS);
    info!(user = %user.username, days, "training requested");
    Ok(Json(state.service.train(days).await?))
}

pub async fn predict(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(timeframe): Path<String>,
) -> Result<Json<PredictionResponse>> {
    info!(user = %user.username, %timeframe, "prediction requested");
    Ok(Json(state.service.predict_by_label(&timeframe).await?))
}

pub async fn current_indicators(
    State(state): State<AppState>,
    CurrentUser(_): CurrentUser,
) -> Result<Json<IndicatorSnapshot>> {
    Ok(Json(state.service.current_indicators().await?))
}
