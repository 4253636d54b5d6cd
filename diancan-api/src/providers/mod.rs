use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::{ApiError, ApiResult};
use crate::models::enums::{PayMethod, PayProvider, PaymentStatus};
use crate::models::payment::ProviderArtifact;

pub mod alipay;
pub mod wechat;

/// 渠道下单上下文
#[derive(Debug, Clone)]
pub struct PaymentContext {
    pub out_trade_no: String,
    pub amount: f64,
    pub currency: String,
    pub subject: String,
    pub method: PayMethod,
    pub client_ip: Option<String>,
    /// jsapi 方式需要的用户 openid
    pub payer_openid: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CreatedPayment {
    pub artifact: ProviderArtifact,
    pub raw: serde_json::Value,
}

/// 渠道侧查单结果，trade_state 保留渠道原始词汇，由映射表翻译
#[derive(Debug, Clone)]
pub struct ProviderTradeQuery {
    pub trade_state: String,
    pub transaction_id: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    pub raw: serde_json::Value,
}

#[derive(Debug, Clone)]
pub struct ProviderRefundRequest {
    pub out_trade_no: String,
    pub refund_request_no: String,
    pub payment_amount: f64,
    pub refund_amount: f64,
    pub reason: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ProviderRefundResult {
    pub provider_refund_id: Option<String>,
    pub raw: serde_json::Value,
}

/// 原始回调请求，header + body 原样传入适配器验签
#[derive(Debug, Clone, Default)]
pub struct WebhookRequest {
    pub headers: HashMap<String, String>,
    pub body: String,
}

/// 验签通过后的回调内容
#[derive(Debug, Clone)]
pub struct WebhookNotification {
    pub out_trade_no: String,
    pub transaction_id: Option<String>,
    pub trade_state: String,
    pub paid_at: Option<DateTime<Utc>>,
    pub raw: serde_json::Value,
}

/// 支付渠道适配器。每个渠道实现一次，编排层按枚举选择，不做字符串分支
#[async_trait]
pub trait PaymentProvider: Send + Sync {
    fn name(&self) -> PayProvider;

    /// 渠道下单，返回 H5 链接 / 二维码 / 预支付单
    async fn create_payment(&self, ctx: &PaymentContext) -> ApiResult<CreatedPayment>;

    /// 主动查单（回调未达时的兜底）
    async fn query_by_out_trade_no(&self, out_trade_no: &str) -> ApiResult<ProviderTradeQuery>;

    async fn refund(&self, req: &ProviderRefundRequest) -> ApiResult<ProviderRefundResult>;

    /// 验签并解析回调，失败即拒绝，不产生任何状态变更
    fn verify_webhook(&self, req: &WebhookRequest) -> ApiResult<WebhookNotification>;
}

pub struct ProviderRegistry {
    providers: HashMap<PayProvider, Arc<dyn PaymentProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self { providers: HashMap::new() }
    }

    pub fn register(mut self, provider: Arc<dyn PaymentProvider>) -> Self {
        self.providers.insert(provider.name(), provider);
        self
    }

    pub fn get(&self, provider: PayProvider) -> ApiResult<Arc<dyn PaymentProvider>> {
        self.providers
            .get(&provider)
            .cloned()
            .ok_or_else(|| ApiError::Validation(format!("不支持的支付渠道: {provider}")))
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// 支付宝交易状态 -> 内部状态。未识别的词保持当前状态不变
pub fn map_alipay_trade_status(trade_status: &str, current: PaymentStatus) -> PaymentStatus {
    match trade_status {
        "WAIT_BUYER_PAY" => PaymentStatus::Created,
        "TRADE_CLOSED" => PaymentStatus::Failed,
        "TRADE_SUCCESS" | "TRADE_FINISHED" => PaymentStatus::Succeeded,
        _ => current,
    }
}

/// 微信交易状态 -> 内部状态。未识别的词保持当前状态不变
pub fn map_wechat_trade_state(trade_state: &str, current: PaymentStatus) -> PaymentStatus {
    match trade_state {
        "NOTPAY" => PaymentStatus::Created,
        "USERPAYING" => PaymentStatus::Pending,
        "SUCCESS" => PaymentStatus::Succeeded,
        "CLOSED" | "REVOKED" | "PAYERROR" => PaymentStatus::Failed,
        "REFUND" => PaymentStatus::Refunded,
        _ => current,
    }
}

pub fn map_trade_state(provider: PayProvider, trade_state: &str, current: PaymentStatus) -> PaymentStatus {
    match provider {
        PayProvider::Alipay => map_alipay_trade_status(trade_state, current),
        PayProvider::Wechatpay => map_wechat_trade_state(trade_state, current),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("WAIT_BUYER_PAY", PaymentStatus::Created)]
    #[case("TRADE_CLOSED", PaymentStatus::Failed)]
    #[case("TRADE_SUCCESS", PaymentStatus::Succeeded)]
    #[case("TRADE_FINISHED", PaymentStatus::Succeeded)]
    fn test_alipay_mapping(#[case] state: &str, #[case] expected: PaymentStatus) {
        assert_eq!(map_alipay_trade_status(state, PaymentStatus::Created), expected);
    }

    #[rstest]
    #[case("NOTPAY", PaymentStatus::Created)]
    #[case("USERPAYING", PaymentStatus::Pending)]
    #[case("SUCCESS", PaymentStatus::Succeeded)]
    #[case("CLOSED", PaymentStatus::Failed)]
    #[case("REVOKED", PaymentStatus::Failed)]
    #[case("PAYERROR", PaymentStatus::Failed)]
    #[case("REFUND", PaymentStatus::Refunded)]
    fn test_wechat_mapping(#[case] state: &str, #[case] expected: PaymentStatus) {
        assert_eq!(map_wechat_trade_state(state, PaymentStatus::Created), expected);
    }

    #[test]
    fn test_unknown_state_keeps_current() {
        // 未识别状态不改变当前值，且同一输入永远映射到同一结果
        assert_eq!(
            map_alipay_trade_status("SOMETHING_NEW", PaymentStatus::Pending),
            PaymentStatus::Pending
        );
        assert_eq!(
            map_wechat_trade_state("ACCEPT", PaymentStatus::Created),
            PaymentStatus::Created
        );
        for _ in 0..3 {
            assert_eq!(
                map_wechat_trade_state("SUCCESS", PaymentStatus::Pending),
                PaymentStatus::Succeeded
            );
        }
    }

    #[test]
    fn test_registry_rejects_unregistered() {
        let registry = ProviderRegistry::new();
        assert!(registry.get(PayProvider::Alipay).is_err());
    }
}
