use axum::{extract::State, http::StatusCode, response::{IntoResponse, Response}, Json};
use serde_json::json;

use crate::app_state::AppState;
use crate::models::user::{LoginRequest, SendCodeRequest};

pub async fn send_code(
    State(state): State<AppState>,
    Json(request): Json<SendCodeRequest>,
) -> Response {
    match state.auth.send_code(request).await {
        Ok(()) => (StatusCode::OK, Json(json!({ "success": true }))).into_response(),
        Err(e) => e.into_response(),
    }
}

pub async fn login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> Response {
    match state.auth.login(request).await {
        Ok(response) => {
            (StatusCode::OK, Json(json!({ "success": true, "data": response }))).into_response()
        }
        Err(e) => e.into_response(),
    }
}
