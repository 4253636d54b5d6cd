use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Extension, Json,
};
use serde_json::json;

use crate::app_state::AppState;
use crate::error::ApiError;
use crate::models::user::{RedeemInviteRequest, UserPreferences};
use crate::utils::jwt::Claims;

fn claims_user_id(claims: &Claims) -> Result<i64, ApiError> {
    claims
        .user_id()
        .ok_or_else(|| ApiError::Auth("非法令牌".to_string()))
}

pub async fn get_preferences(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Response {
    let user_id = match claims_user_id(&claims) {
        Ok(id) => id,
        Err(e) => return e.into_response(),
    };

    match state.users.find_by_id(user_id).await {
        Ok(Some(user)) => {
            (StatusCode::OK, Json(json!({ "success": true, "data": user.preferences }))).into_response()
        }
        Ok(None) => ApiError::NotFound("用户不存在".to_string()).into_response(),
        Err(e) => e.into_response(),
    }
}

pub async fn put_preferences(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(preferences): Json<UserPreferences>,
) -> Response {
    let user_id = match claims_user_id(&claims) {
        Ok(id) => id,
        Err(e) => return e.into_response(),
    };

    if preferences.spice_level > 5 {
        return ApiError::Validation("辣度等级范围为 0-5".to_string()).into_response();
    }

    match state.users.update_preferences(user_id, &preferences).await {
        Ok(()) => (StatusCode::OK, Json(json!({ "success": true, "data": preferences }))).into_response(),
        Err(e) => e.into_response(),
    }
}

pub async fn invite_stats(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Response {
    let user_id = match claims_user_id(&claims) {
        Ok(id) => id,
        Err(e) => return e.into_response(),
    };

    match state.invites.stats(user_id).await {
        Ok(stats) => (StatusCode::OK, Json(json!({ "success": true, "data": stats }))).into_response(),
        Err(e) => e.into_response(),
    }
}

pub async fn redeem_invite(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(request): Json<RedeemInviteRequest>,
) -> Response {
    let user_id = match claims_user_id(&claims) {
        Ok(id) => id,
        Err(e) => return e.into_response(),
    };

    match state.invites.redeem(user_id, &request.invite_code).await {
        Ok(()) => (StatusCode::OK, Json(json!({ "success": true }))).into_response(),
        Err(e) => e.into_response(),
    }
}
