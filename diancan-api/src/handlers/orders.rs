use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Extension, Json,
};
use serde::Deserialize;
use serde_json::json;

use crate::app_state::AppState;
use crate::error::ApiError;
use crate::models::order::CreateOrderRequest;
use crate::utils::jwt::Claims;

fn claims_user_id(claims: &Claims) -> Result<i64, ApiError> {
    claims
        .user_id()
        .ok_or_else(|| ApiError::Auth("非法令牌".to_string()))
}

pub async fn create_order(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(request): Json<CreateOrderRequest>,
) -> Response {
    let user_id = match claims_user_id(&claims) {
        Ok(id) => id,
        Err(e) => return e.into_response(),
    };

    match state.orders.create_order(user_id, request).await {
        Ok(order) => (StatusCode::OK, Json(json!({ "success": true, "data": order }))).into_response(),
        Err(e) => e.into_response(),
    }
}

#[derive(Deserialize)]
pub struct ListQuery {
    limit: Option<i64>,
}

pub async fn list_orders(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<ListQuery>,
) -> Response {
    let user_id = match claims_user_id(&claims) {
        Ok(id) => id,
        Err(e) => return e.into_response(),
    };

    match state.orders.list_orders(user_id, query.limit.unwrap_or(20)).await {
        Ok(orders) => (StatusCode::OK, Json(json!({ "success": true, "data": orders }))).into_response(),
        Err(e) => e.into_response(),
    }
}

pub async fn get_order(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(order_id): Path<String>,
) -> Response {
    let user_id = match claims_user_id(&claims) {
        Ok(id) => id,
        Err(e) => return e.into_response(),
    };

    match state.orders.get_order(&order_id, user_id).await {
        Ok(order) => (StatusCode::OK, Json(json!({ "success": true, "data": order }))).into_response(),
        Err(e) => e.into_response(),
    }
}

pub async fn submit_order(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(order_id): Path<String>,
) -> Response {
    let user_id = match claims_user_id(&claims) {
        Ok(id) => id,
        Err(e) => return e.into_response(),
    };

    match state.orders.submit_order(&order_id, user_id).await {
        Ok(order) => (StatusCode::OK, Json(json!({ "success": true, "data": order }))).into_response(),
        Err(e) => e.into_response(),
    }
}

pub async fn update_order_status(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(order_id): Path<String>,
    Json(request): Json<crate::models::order::UpdateOrderStatusRequest>,
) -> Response {
    let user_id = match claims_user_id(&claims) {
        Ok(id) => id,
        Err(e) => return e.into_response(),
    };

    match state.orders.update_status(&order_id, user_id, request.status).await {
        Ok(order) => (StatusCode::OK, Json(json!({ "success": true, "data": order }))).into_response(),
        Err(e) => e.into_response(),
    }
}

pub async fn cancel_order(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(order_id): Path<String>,
) -> Response {
    let user_id = match claims_user_id(&claims) {
        Ok(id) => id,
        Err(e) => return e.into_response(),
    };

    match state.orders.cancel_order(&order_id, user_id).await {
        Ok(order) => (StatusCode::OK, Json(json!({ "success": true, "data": order }))).into_response(),
        Err(e) => e.into_response(),
    }
}
