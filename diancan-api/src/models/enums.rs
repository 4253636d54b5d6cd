use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter, EnumString};

/// 支付渠道
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, EnumIter)]
#[serde(rename_all = "snake_case")]
pub enum PayProvider {
    #[strum(serialize = "alipay")]
    Alipay,
    #[strum(serialize = "wechatpay")]
    Wechatpay,
}

/// 支付方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
pub enum PayMethod {
    #[strum(serialize = "h5")]
    H5,
    #[strum(serialize = "jsapi")]
    Jsapi,
    #[strum(serialize = "native")]
    Native,
}

/// 支付单状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    #[strum(serialize = "created")]
    Created,
    #[strum(serialize = "pending")]
    Pending,
    #[strum(serialize = "succeeded")]
    Succeeded,
    #[strum(serialize = "failed")]
    Failed,
    #[strum(serialize = "refunded")]
    Refunded,
    #[strum(serialize = "partial_refunded")]
    PartialRefunded,
}

impl PaymentStatus {
    /// 正向支付流程的终态，退款是 succeeded 之后唯一的后续转换
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Succeeded | Self::Failed | Self::Refunded | Self::PartialRefunded
        )
    }
}

/// 订单状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    #[strum(serialize = "draft")]
    Draft,
    #[strum(serialize = "submitted")]
    Submitted,
    #[strum(serialize = "processing")]
    Processing,
    #[strum(serialize = "delivering")]
    Delivering,
    #[strum(serialize = "completed")]
    Completed,
    #[strum(serialize = "cancelled")]
    Cancelled,
}

/// 订单的支付状态，除退款外单向推进，不允许从 paid 回退
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
pub enum OrderPaymentStatus {
    #[strum(serialize = "unpaid")]
    Unpaid,
    #[strum(serialize = "pending_payment")]
    PendingPayment,
    #[strum(serialize = "paid")]
    Paid,
    #[strum(serialize = "partial_refunded")]
    PartialRefunded,
    #[strum(serialize = "refunded")]
    Refunded,
}

/// 支付流水事件类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
pub enum PaymentEventType {
    #[strum(serialize = "notify")]
    Notify,
    #[strum(serialize = "wechat_notify")]
    WechatNotify,
    #[strum(serialize = "refund")]
    Refund,
    #[strum(serialize = "order_paid_notified")]
    OrderPaidNotified,
    #[strum(serialize = "gateway_request")]
    GatewayRequest,
    #[strum(serialize = "payment_success")]
    PaymentSuccess,
}
