use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::enums::{PayMethod, PayProvider, PaymentEventType, PaymentStatus};

/// 金额比较精度，避免浮点累加误差误判
pub const AMOUNT_EPSILON: f64 = 1e-6;

/// 金额规整到两位小数，渠道侧对精度敏感
pub fn normalize_amount(amount: f64) -> f64 {
    (amount * 100.0).round() / 100.0
}

/// 渠道下单产物：H5跳转链接 / 扫码二维码 / JSAPI预支付单
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProviderArtifact {
    H5 { h5_url: String },
    Qr { qr_code: String },
    Jsapi { prepay_id: String },
}

/// 退款台账：累计金额 + 逐笔明细，挂在支付单上
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RefundLedger {
    pub total: f64,
    pub history: Vec<RefundEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefundEntry {
    pub amount: f64,
    pub reason: Option<String>,
    pub time: DateTime<Utc>,
    pub provider_refund_id: Option<String>,
}

impl RefundLedger {
    pub fn remaining(&self, payment_amount: f64) -> f64 {
        payment_amount - self.total
    }

    pub fn is_full(&self, payment_amount: f64) -> bool {
        self.total >= payment_amount - AMOUNT_EPSILON
    }

    /// 追加一笔退款，返回追加后的台账
    pub fn with_entry(&self, entry: RefundEntry) -> Self {
        let mut next = self.clone();
        next.total += entry.amount;
        next.history.push(entry);
        next
    }
}

/// 一次支付尝试，一条记录；out_trade_no 是与渠道对账的关联键，创建后不可变
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payment {
    pub id: String,
    pub order_id: String,
    pub provider: PayProvider,
    pub method: PayMethod,
    pub status: PaymentStatus,
    pub amount: f64,
    pub currency: String,
    pub out_trade_no: String,
    pub transaction_id: Option<String>,
    pub idempotency_key: Option<String>,
    pub artifact: Option<ProviderArtifact>,
    pub refunds: RefundLedger,
    pub error_message: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    pub refunded_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Payment {
    pub fn new(
        order_id: String,
        provider: PayProvider,
        method: PayMethod,
        amount: f64,
        currency: String,
        out_trade_no: String,
        idempotency_key: Option<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            order_id,
            provider,
            method,
            status: PaymentStatus::Created,
            amount,
            currency,
            out_trade_no,
            transaction_id: None,
            idempotency_key,
            artifact: None,
            refunds: RefundLedger::default(),
            error_message: None,
            paid_at: None,
            refunded_at: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// 支付流水（追加写），原始报文留档用于审计与排查
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentEventRecord {
    pub id: Option<i64>,
    pub payment_id: String,
    pub order_id: String,
    pub event_type: PaymentEventType,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewPaymentEvent {
    pub payment_id: String,
    pub order_id: String,
    pub event_type: PaymentEventType,
    pub payload: serde_json::Value,
}

// ---- 请求/响应 DTO ----

#[derive(Debug, Clone, Deserialize)]
pub struct CreatePaymentRequest {
    pub order_id: String,
    pub provider: PayProvider,
    pub amount: f64,
    pub method: Option<PayMethod>,
    pub idempotency_key: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreatePaymentResponse {
    pub payment_id: String,
    pub out_trade_no: String,
    pub status: PaymentStatus,
    pub artifact: Option<ProviderArtifact>,
    /// 命中幂等（订单已支付或幂等键重复）时为 true
    pub reused: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RefundPaymentRequest {
    pub amount: Option<f64>,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RefundPaymentResponse {
    pub payment_id: String,
    pub status: PaymentStatus,
    pub refund_total: f64,
    pub full: bool,
    pub provider_refund_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BatchRefundRequest {
    pub payment_ids: Vec<String>,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchRefundItem {
    pub payment_id: String,
    pub success: bool,
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchRefundResponse {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub results: Vec<BatchRefundItem>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PaymentStatusResponse {
    pub payment_id: String,
    pub status: PaymentStatus,
    pub transaction_id: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    pub refund_total: f64,
}
