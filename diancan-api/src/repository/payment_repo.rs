use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{MySqlPool, Row};

use crate::error::{ApiError, ApiResult};
use crate::models::enums::{OrderPaymentStatus, PayMethod, PayProvider, PaymentEventType, PaymentStatus};
use crate::models::payment::{
    NewPaymentEvent, Payment, PaymentEventRecord, ProviderArtifact, RefundLedger,
};

/// 支付成功转换：支付单 + 订单 + 流水在一个事务内落库
#[derive(Debug, Clone)]
pub struct PaymentSuccessUpdate {
    pub payment_id: String,
    pub order_id: String,
    pub transaction_id: Option<String>,
    pub paid_at: DateTime<Utc>,
    pub event: NewPaymentEvent,
}

/// 退款落账：支付单台账 + 订单支付状态 + 流水在一个事务内落库
#[derive(Debug, Clone)]
pub struct RefundUpdate {
    pub payment_id: String,
    pub order_id: String,
    pub ledger: RefundLedger,
    pub payment_status: PaymentStatus,
    pub order_payment_status: OrderPaymentStatus,
    pub refunded_at: Option<DateTime<Utc>>,
    pub event: NewPaymentEvent,
}

#[async_trait]
pub trait PaymentRepository: Send + Sync {
    async fn insert(&self, payment: &Payment) -> ApiResult<()>;
    async fn find_by_id(&self, id: &str) -> ApiResult<Option<Payment>>;
    async fn find_by_out_trade_no(&self, out_trade_no: &str) -> ApiResult<Option<Payment>>;
    async fn find_by_idempotency_key(&self, key: &str) -> ApiResult<Option<Payment>>;
    async fn set_artifact(&self, id: &str, artifact: &ProviderArtifact) -> ApiResult<()>;
    async fn mark_failed(&self, id: &str, message: &str, event: Option<NewPaymentEvent>) -> ApiResult<()>;
    async fn mark_succeeded(&self, update: &PaymentSuccessUpdate) -> ApiResult<()>;
    async fn apply_refund(&self, update: &RefundUpdate) -> ApiResult<()>;
    async fn append_event(&self, event: &NewPaymentEvent) -> ApiResult<()>;
    async fn events_for_payment(&self, payment_id: &str) -> ApiResult<Vec<PaymentEventRecord>>;
}

pub struct MySqlPaymentRepository {
    pool: MySqlPool,
}

impl MySqlPaymentRepository {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

fn row_to_payment(row: &sqlx::mysql::MySqlRow) -> ApiResult<Payment> {
    let provider_str: String = row.try_get("provider")?;
    let method_str: String = row.try_get("method")?;
    let status_str: String = row.try_get("status")?;

    let artifact: Option<ProviderArtifact> = row
        .try_get::<Option<String>, _>("artifact")?
        .map(|s| serde_json::from_str(&s))
        .transpose()
        .map_err(|e| ApiError::Internal(format!("支付产物反序列化失败: {e}")))?;

    let history = row
        .try_get::<Option<String>, _>("refund_history")?
        .map(|s| serde_json::from_str(&s))
        .transpose()
        .map_err(|e| ApiError::Internal(format!("退款明细反序列化失败: {e}")))?
        .unwrap_or_default();

    Ok(Payment {
        id: row.try_get("id")?,
        order_id: row.try_get("order_id")?,
        provider: PayProvider::from_str(&provider_str)
            .map_err(|_| ApiError::Internal(format!("非法支付渠道: {provider_str}")))?,
        method: PayMethod::from_str(&method_str)
            .map_err(|_| ApiError::Internal(format!("非法支付方式: {method_str}")))?,
        status: PaymentStatus::from_str(&status_str)
            .map_err(|_| ApiError::Internal(format!("非法支付状态: {status_str}")))?,
        amount: row.try_get("amount")?,
        currency: row.try_get("currency")?,
        out_trade_no: row.try_get("out_trade_no")?,
        transaction_id: row.try_get("transaction_id")?,
        idempotency_key: row.try_get("idempotency_key")?,
        artifact,
        refunds: RefundLedger {
            total: row.try_get("refund_total")?,
            history,
        },
        error_message: row.try_get("error_message")?,
        paid_at: row.try_get::<Option<DateTime<Utc>>, _>("paid_at")?,
        refunded_at: row.try_get::<Option<DateTime<Utc>>, _>("refunded_at")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

async fn insert_event_tx(
    tx: &mut sqlx::Transaction<'_, sqlx::MySql>,
    event: &NewPaymentEvent,
) -> ApiResult<()> {
    sqlx::query(
        r#"
        INSERT INTO payment_events (payment_id, order_id, event_type, payload, created_at)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(&event.payment_id)
    .bind(&event.order_id)
    .bind(event.event_type.to_string())
    .bind(event.payload.to_string())
    .bind(Utc::now())
    .execute(&mut **tx)
    .await?;

    Ok(())
}

#[async_trait]
impl PaymentRepository for MySqlPaymentRepository {
    async fn insert(&self, payment: &Payment) -> ApiResult<()> {
        let artifact = payment
            .artifact
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| ApiError::Internal(e.to_string()))?;
        let history = serde_json::to_string(&payment.refunds.history)
            .map_err(|e| ApiError::Internal(e.to_string()))?;

        sqlx::query(
            r#"
            INSERT INTO payments
            (id, order_id, provider, method, status, amount, currency, out_trade_no,
             transaction_id, idempotency_key, artifact, refund_total, refund_history,
             error_message, paid_at, refunded_at, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&payment.id)
        .bind(&payment.order_id)
        .bind(payment.provider.to_string())
        .bind(payment.method.to_string())
        .bind(payment.status.to_string())
        .bind(payment.amount)
        .bind(&payment.currency)
        .bind(&payment.out_trade_no)
        .bind(&payment.transaction_id)
        .bind(&payment.idempotency_key)
        .bind(artifact)
        .bind(payment.refunds.total)
        .bind(history)
        .bind(&payment.error_message)
        .bind(payment.paid_at)
        .bind(payment.refunded_at)
        .bind(payment.created_at)
        .bind(payment.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> ApiResult<Option<Payment>> {
        let row = sqlx::query("SELECT * FROM payments WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_payment).transpose()
    }

    async fn find_by_out_trade_no(&self, out_trade_no: &str) -> ApiResult<Option<Payment>> {
        let row = sqlx::query("SELECT * FROM payments WHERE out_trade_no = ?")
            .bind(out_trade_no)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_payment).transpose()
    }

    async fn find_by_idempotency_key(&self, key: &str) -> ApiResult<Option<Payment>> {
        let row = sqlx::query("SELECT * FROM payments WHERE idempotency_key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_payment).transpose()
    }

    async fn set_artifact(&self, id: &str, artifact: &ProviderArtifact) -> ApiResult<()> {
        let artifact = serde_json::to_string(artifact)
            .map_err(|e| ApiError::Internal(e.to_string()))?;

        sqlx::query("UPDATE payments SET artifact = ?, updated_at = ? WHERE id = ?")
            .bind(artifact)
            .bind(Utc::now())
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn mark_failed(&self, id: &str, message: &str, event: Option<NewPaymentEvent>) -> ApiResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("UPDATE payments SET status = ?, error_message = ?, updated_at = ? WHERE id = ?")
            .bind(PaymentStatus::Failed.to_string())
            .bind(message)
            .bind(Utc::now())
            .bind(id)
            .execute(&mut *tx)
            .await?;

        if let Some(event) = &event {
            insert_event_tx(&mut tx, event).await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn mark_succeeded(&self, update: &PaymentSuccessUpdate) -> ApiResult<()> {
        // 支付单、订单、流水要么全部落库要么全部回滚
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "UPDATE payments SET status = ?, transaction_id = ?, paid_at = ?, updated_at = ? WHERE id = ?",
        )
        .bind(PaymentStatus::Succeeded.to_string())
        .bind(&update.transaction_id)
        .bind(update.paid_at)
        .bind(Utc::now())
        .bind(&update.payment_id)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "UPDATE orders SET payment_status = ?, paid_at = ?, payment_id = ?, updated_at = ? WHERE id = ?",
        )
        .bind(OrderPaymentStatus::Paid.to_string())
        .bind(update.paid_at)
        .bind(&update.payment_id)
        .bind(Utc::now())
        .bind(&update.order_id)
        .execute(&mut *tx)
        .await?;

        insert_event_tx(&mut tx, &update.event).await?;

        tx.commit().await?;
        Ok(())
    }

    async fn apply_refund(&self, update: &RefundUpdate) -> ApiResult<()> {
        let history = serde_json::to_string(&update.ledger.history)
            .map_err(|e| ApiError::Internal(e.to_string()))?;

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            UPDATE payments
            SET status = ?, refund_total = ?, refund_history = ?, refunded_at = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(update.payment_status.to_string())
        .bind(update.ledger.total)
        .bind(history)
        .bind(update.refunded_at)
        .bind(Utc::now())
        .bind(&update.payment_id)
        .execute(&mut *tx)
        .await?;

        sqlx::query("UPDATE orders SET payment_status = ?, updated_at = ? WHERE id = ?")
            .bind(update.order_payment_status.to_string())
            .bind(Utc::now())
            .bind(&update.order_id)
            .execute(&mut *tx)
            .await?;

        insert_event_tx(&mut tx, &update.event).await?;

        tx.commit().await?;
        Ok(())
    }

    async fn append_event(&self, event: &NewPaymentEvent) -> ApiResult<()> {
        sqlx::query(
            r#"
            INSERT INTO payment_events (payment_id, order_id, event_type, payload, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&event.payment_id)
        .bind(&event.order_id)
        .bind(event.event_type.to_string())
        .bind(event.payload.to_string())
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn events_for_payment(&self, payment_id: &str) -> ApiResult<Vec<PaymentEventRecord>> {
        let rows = sqlx::query(
            "SELECT * FROM payment_events WHERE payment_id = ? ORDER BY id ASC",
        )
        .bind(payment_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let event_type_str: String = row.try_get("event_type")?;
                let payload_str: Option<String> = row.try_get("payload")?;

                Ok(PaymentEventRecord {
                    id: row.try_get("id")?,
                    payment_id: row.try_get("payment_id")?,
                    order_id: row.try_get("order_id")?,
                    event_type: PaymentEventType::from_str(&event_type_str)
                        .map_err(|_| ApiError::Internal(format!("非法事件类型: {event_type_str}")))?,
                    payload: payload_str
                        .map(|s| serde_json::from_str(&s).unwrap_or(serde_json::Value::Null))
                        .unwrap_or(serde_json::Value::Null),
                    created_at: row.try_get("created_at")?,
                })
            })
            .collect()
    }
}
