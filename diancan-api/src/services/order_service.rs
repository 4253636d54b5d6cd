use std::sync::Arc;

use chrono::Utc;
use rand::Rng;
use tracing::info;

use crate::error::{ApiError, ApiResult};
use crate::models::enums::OrderStatus;
use crate::models::order::{can_transition, CreateOrderRequest, Order};
use crate::repository::OrderRepository;
use crate::services::realtime::RealtimeBroadcaster;

pub struct OrderService {
    orders: Arc<dyn OrderRepository>,
    realtime: Arc<RealtimeBroadcaster>,
}

impl OrderService {
    pub fn new(orders: Arc<dyn OrderRepository>, realtime: Arc<RealtimeBroadcaster>) -> Self {
        Self { orders, realtime }
    }

    fn generate_order_no() -> String {
        let seq: u32 = rand::rng().random_range(0..1_000_000);
        format!("{}{:06}", Utc::now().format("%Y%m%d%H%M%S"), seq)
    }

    pub async fn create_order(&self, user_id: i64, request: CreateOrderRequest) -> ApiResult<Order> {
        if request.items.is_empty() {
            return Err(ApiError::Validation("订单至少需要一个菜品".to_string()));
        }
        if request.items.iter().any(|i| i.price <= 0.0 || i.quantity == 0) {
            return Err(ApiError::Validation("菜品价格和数量必须大于0".to_string()));
        }

        let order = Order::new(
            user_id,
            Self::generate_order_no(),
            request.items,
            request.address,
            request.remark,
        );
        self.orders.insert(&order).await?;

        info!("Created order {} for user {}", order.order_no, user_id);
        Ok(order)
    }

    pub async fn get_order(&self, order_id: &str, caller_user_id: i64) -> ApiResult<Order> {
        let order = self
            .orders
            .find_by_id(order_id)
            .await?
            .ok_or_else(|| ApiError::NotFound(format!("订单不存在: {order_id}")))?;

        if order.user_id != caller_user_id {
            return Err(ApiError::Forbidden("无权查看该订单".to_string()));
        }

        Ok(order)
    }

    pub async fn list_orders(&self, user_id: i64, limit: i64) -> ApiResult<Vec<Order>> {
        self.orders.list_by_user(user_id, limit.clamp(1, 100)).await
    }

    pub async fn submit_order(&self, order_id: &str, caller_user_id: i64) -> ApiResult<Order> {
        self.transition(order_id, caller_user_id, OrderStatus::Submitted).await
    }

    pub async fn cancel_order(&self, order_id: &str, caller_user_id: i64) -> ApiResult<Order> {
        self.transition(order_id, caller_user_id, OrderStatus::Cancelled).await
    }

    pub async fn update_status(&self, order_id: &str, caller_user_id: i64, status: OrderStatus) -> ApiResult<Order> {
        self.transition(order_id, caller_user_id, status).await
    }

    async fn transition(&self, order_id: &str, caller_user_id: i64, to: OrderStatus) -> ApiResult<Order> {
        let mut order = self.get_order(order_id, caller_user_id).await?;

        if !can_transition(order.status, to) {
            return Err(ApiError::Conflict(format!(
                "订单状态不允许从 {} 变更为 {}",
                order.status, to
            )));
        }

        self.orders.update_status(&order.id, to).await?;
        order.status = to;

        self.realtime.broadcast_order_status_changed(
            &order.id,
            order.user_id,
            serde_json::json!({ "status": to }),
        );

        Ok(order)
    }
}
