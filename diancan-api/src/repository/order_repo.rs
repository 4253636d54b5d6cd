use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{MySqlPool, Row};

use crate::error::{ApiError, ApiResult};
use crate::models::enums::{OrderPaymentStatus, OrderStatus};
use crate::models::order::{Order, OrderItem};

#[async_trait]
pub trait OrderRepository: Send + Sync {
    async fn insert(&self, order: &Order) -> ApiResult<()>;
    async fn find_by_id(&self, id: &str) -> ApiResult<Option<Order>>;
    async fn list_by_user(&self, user_id: i64, limit: i64) -> ApiResult<Vec<Order>>;
    async fn update_status(&self, id: &str, status: OrderStatus) -> ApiResult<()>;
    /// 发起支付时标记待支付；已支付的订单不允许回退
    async fn set_payment_pending(&self, id: &str) -> ApiResult<()>;
}

pub struct MySqlOrderRepository {
    pool: MySqlPool,
}

impl MySqlOrderRepository {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

pub(crate) fn row_to_order(row: &sqlx::mysql::MySqlRow) -> ApiResult<Order> {
    let status_str: String = row.try_get("status")?;
    let payment_status_str: String = row.try_get("payment_status")?;
    let items_str: String = row.try_get("items")?;

    let items: Vec<OrderItem> = serde_json::from_str(&items_str)
        .map_err(|e| ApiError::Internal(format!("订单菜品反序列化失败: {e}")))?;

    Ok(Order {
        id: row.try_get("id")?,
        order_no: row.try_get("order_no")?,
        user_id: row.try_get("user_id")?,
        status: OrderStatus::from_str(&status_str)
            .map_err(|_| ApiError::Internal(format!("非法订单状态: {status_str}")))?,
        payment_status: OrderPaymentStatus::from_str(&payment_status_str)
            .map_err(|_| ApiError::Internal(format!("非法支付状态: {payment_status_str}")))?,
        amount: row.try_get("amount")?,
        currency: row.try_get("currency")?,
        items,
        address: row.try_get("address")?,
        remark: row.try_get("remark")?,
        payment_id: row.try_get("payment_id")?,
        paid_at: row.try_get::<Option<DateTime<Utc>>, _>("paid_at")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

#[async_trait]
impl OrderRepository for MySqlOrderRepository {
    async fn insert(&self, order: &Order) -> ApiResult<()> {
        let items = serde_json::to_string(&order.items)
            .map_err(|e| ApiError::Internal(e.to_string()))?;

        sqlx::query(
            r#"
            INSERT INTO orders
            (id, order_no, user_id, status, payment_status, amount, currency, items,
             address, remark, payment_id, paid_at, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&order.id)
        .bind(&order.order_no)
        .bind(order.user_id)
        .bind(order.status.to_string())
        .bind(order.payment_status.to_string())
        .bind(order.amount)
        .bind(&order.currency)
        .bind(items)
        .bind(&order.address)
        .bind(&order.remark)
        .bind(&order.payment_id)
        .bind(order.paid_at)
        .bind(order.created_at)
        .bind(order.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> ApiResult<Option<Order>> {
        let row = sqlx::query("SELECT * FROM orders WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_order).transpose()
    }

    async fn list_by_user(&self, user_id: i64, limit: i64) -> ApiResult<Vec<Order>> {
        let rows = sqlx::query("SELECT * FROM orders WHERE user_id = ? ORDER BY created_at DESC LIMIT ?")
            .bind(user_id)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(row_to_order).collect()
    }

    async fn update_status(&self, id: &str, status: OrderStatus) -> ApiResult<()> {
        sqlx::query("UPDATE orders SET status = ?, updated_at = ? WHERE id = ?")
            .bind(status.to_string())
            .bind(Utc::now())
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn set_payment_pending(&self, id: &str) -> ApiResult<()> {
        // WHERE 条件保证 paid 不被回退
        sqlx::query(
            r#"
            UPDATE orders SET payment_status = ?, updated_at = ?
            WHERE id = ? AND payment_status IN (?, ?)
            "#,
        )
        .bind(OrderPaymentStatus::PendingPayment.to_string())
        .bind(Utc::now())
        .bind(id)
        .bind(OrderPaymentStatus::Unpaid.to_string())
        .bind(OrderPaymentStatus::PendingPayment.to_string())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
