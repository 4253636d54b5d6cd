use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::enums::{OrderPaymentStatus, OrderStatus};
use crate::models::payment::normalize_amount;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderItem {
    pub name: String,
    pub price: f64,
    pub quantity: u32,
    pub remark: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: String,
    pub order_no: String,
    pub user_id: i64,
    pub status: OrderStatus,
    pub payment_status: OrderPaymentStatus,
    pub amount: f64,
    pub currency: String,
    pub items: Vec<OrderItem>,
    pub address: Option<String>,
    pub remark: Option<String>,
    /// 完成该订单支付的支付单
    pub payment_id: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    pub fn new(user_id: i64, order_no: String, items: Vec<OrderItem>, address: Option<String>, remark: Option<String>) -> Self {
        let amount = normalize_amount(
            items
                .iter()
                .map(|i| i.price * f64::from(i.quantity))
                .sum::<f64>(),
        );
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            order_no,
            user_id,
            status: OrderStatus::Draft,
            payment_status: OrderPaymentStatus::Unpaid,
            amount,
            currency: "CNY".to_string(),
            items,
            address,
            remark,
            payment_id: None,
            paid_at: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// 订单状态机：合法的前向转换表
pub fn can_transition(from: OrderStatus, to: OrderStatus) -> bool {
    use OrderStatus::*;
    matches!(
        (from, to),
        (Draft, Submitted)
            | (Submitted, Processing)
            | (Processing, Delivering)
            | (Delivering, Completed)
            | (Draft, Cancelled)
            | (Submitted, Cancelled)
    )
}

// ---- 请求/响应 DTO ----

#[derive(Debug, Clone, Deserialize)]
pub struct CreateOrderRequest {
    pub items: Vec<OrderItem>,
    pub address: Option<String>,
    pub remark: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateOrderStatusRequest {
    pub status: OrderStatus,
}
