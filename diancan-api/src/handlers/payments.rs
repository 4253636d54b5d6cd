use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Extension, Json,
};
use serde_json::json;
use tracing::info;

use crate::app_state::AppState;
use crate::error::ApiError;
use crate::models::enums::PayProvider;
use crate::models::payment::{BatchRefundRequest, CreatePaymentRequest, RefundPaymentRequest};
use crate::providers::WebhookRequest;
use crate::utils::jwt::Claims;

fn claims_user_id(claims: &Claims) -> Result<i64, ApiError> {
    claims
        .user_id()
        .ok_or_else(|| ApiError::Auth("非法令牌".to_string()))
}

pub async fn create_payment(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(request): Json<CreatePaymentRequest>,
) -> Response {
    let user_id = match claims_user_id(&claims) {
        Ok(id) => id,
        Err(e) => return e.into_response(),
    };

    match state.payments.create_payment(request, Some(user_id)).await {
        Ok(response) => {
            (StatusCode::OK, Json(json!({ "success": true, "data": response }))).into_response()
        }
        Err(e) => e.into_response(),
    }
}

pub async fn query_payment(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(payment_id): Path<String>,
) -> Response {
    let user_id = match claims_user_id(&claims) {
        Ok(id) => id,
        Err(e) => return e.into_response(),
    };

    match state.payments.query_payment_status(&payment_id, Some(user_id)).await {
        Ok(response) => {
            (StatusCode::OK, Json(json!({ "success": true, "data": response }))).into_response()
        }
        Err(e) => e.into_response(),
    }
}

pub async fn payment_events(
    State(state): State<AppState>,
    Path(payment_id): Path<String>,
) -> Response {
    match state.payments.payment_events(&payment_id).await {
        Ok(events) => (StatusCode::OK, Json(json!({ "success": true, "data": events }))).into_response(),
        Err(e) => e.into_response(),
    }
}

pub async fn refund_payment(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(payment_id): Path<String>,
    Json(request): Json<RefundPaymentRequest>,
) -> Response {
    let user_id = match claims_user_id(&claims) {
        Ok(id) => id,
        Err(e) => return e.into_response(),
    };

    match state.payments.refund_payment(&payment_id, request, Some(user_id)).await {
        Ok(response) => {
            (StatusCode::OK, Json(json!({ "success": true, "data": response }))).into_response()
        }
        Err(e) => e.into_response(),
    }
}

pub async fn batch_refund(
    State(state): State<AppState>,
    Json(request): Json<BatchRefundRequest>,
) -> Response {
    let response = state.payments.batch_refund(request).await;
    (StatusCode::OK, Json(json!({ "success": true, "data": response }))).into_response()
}

fn webhook_request(headers: &HeaderMap, body: String) -> WebhookRequest {
    let headers = headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_string(), v.to_string()))
        })
        .collect();

    WebhookRequest { headers, body }
}

/// 支付宝异步通知。应答是协议约定的字面量："success" / "failure"
pub async fn webhook_alipay(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> Response {
    info!("Received Alipay payment notification");

    let request = webhook_request(&headers, body);
    let outcome = state.payments.handle_webhook(PayProvider::Alipay, &request).await;

    if outcome.is_acked() {
        (StatusCode::OK, "success").into_response()
    } else {
        (StatusCode::OK, "failure").into_response()
    }
}

/// 微信异步通知。应答是协议约定的 JSON 信封，失败用 400
pub async fn webhook_wechat(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> Response {
    info!("Received Wechat payment notification");

    let request = webhook_request(&headers, body);
    let outcome = state.payments.handle_webhook(PayProvider::Wechatpay, &request).await;

    if outcome.is_acked() {
        (StatusCode::OK, Json(json!({ "code": "SUCCESS", "message": "成功" }))).into_response()
    } else {
        (StatusCode::BAD_REQUEST, Json(json!({ "code": "FAIL", "message": "失败" }))).into_response()
    }
}
