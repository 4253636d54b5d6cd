use axum::{
    http::StatusCode,
    middleware,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde_json::json;

use crate::app_state::AppState;

pub mod auth;
pub mod orders;
pub mod payments;
pub mod users;
pub mod ws;

pub async fn health() -> impl IntoResponse {
    (StatusCode::OK, Json(json!({ "status": "healthy" })))
}

pub fn router(state: AppState) -> Router {
    // 渠道回调与登录不走鉴权
    let public = Router::new()
        .route("/api/v1/auth/code", post(auth::send_code))
        .route("/api/v1/auth/login", post(auth::login))
        .route("/payments/webhook/alipay", post(payments::webhook_alipay))
        .route("/payments/webhook/wechatpay", post(payments::webhook_wechat))
        .route("/api/v1/ws", get(ws::ws_handler));

    let protected = Router::new()
        .route("/api/v1/orders", post(orders::create_order).get(orders::list_orders))
        .route("/api/v1/orders/{id}", get(orders::get_order))
        .route("/api/v1/orders/{id}/submit", post(orders::submit_order))
        .route("/api/v1/orders/{id}/cancel", post(orders::cancel_order))
        .route("/api/v1/orders/{id}/status", post(orders::update_order_status))
        .route("/api/v1/payments", post(payments::create_payment))
        .route("/api/v1/payments/{id}", get(payments::query_payment))
        .route("/api/v1/payments/{id}/events", get(payments::payment_events))
        .route("/api/v1/payments/{id}/refund", post(payments::refund_payment))
        .route("/api/v1/payments/refund/batch", post(payments::batch_refund))
        .route(
            "/api/v1/users/preferences",
            get(users::get_preferences).put(users::put_preferences),
        )
        .route("/api/v1/invites/stats", get(users::invite_stats))
        .route("/api/v1/invites/redeem", post(users::redeem_invite))
        .route_layer(middleware::from_fn_with_state(state.clone(), crate::middleware::auth::require_auth));

    Router::new()
        .route("/health", get(health))
        .merge(public)
        .merge(protected)
        .with_state(state)
}
