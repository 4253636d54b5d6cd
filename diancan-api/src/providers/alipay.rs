use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as B64, Engine as _};
use chrono::Utc;
use openssl::hash::MessageDigest;
use openssl::pkey::PKey;
use openssl::rsa::Rsa;
use openssl::sign::{Signer, Verifier};
use reqwest::Client;
use tracing::info;

use crate::config::settings::AlipaySettings;
use crate::error::{ApiError, ApiResult};
use crate::models::enums::{PayMethod, PayProvider};
use crate::models::payment::ProviderArtifact;
use crate::providers::{
    CreatedPayment, PaymentContext, PaymentProvider, ProviderRefundRequest, ProviderRefundResult,
    ProviderTradeQuery, WebhookNotification, WebhookRequest,
};

#[derive(Debug, Clone)]
pub struct AlipayProvider {
    client: Client,
    app_id: String,
    private_key: String,
    alipay_public_key: String,
    gateway_url: String,
    notify_url: String,
    return_url: String,
}

impl AlipayProvider {
    pub fn new(settings: &AlipaySettings, notify_url: String, return_url: String, timeout: Duration) -> Self {
        Self {
            client: Client::builder()
                .timeout(timeout)
                .build()
                .unwrap_or_default(),
            app_id: settings.app_id.clone(),
            private_key: settings.private_key.clone(),
            alipay_public_key: settings.public_key.clone(),
            gateway_url: settings.gateway_url.clone(),
            notify_url,
            return_url,
        }
    }

    // 按字典序拼接待签名串，sign/sign_type 不参与
    fn sign_content(params: &HashMap<String, String>) -> String {
        let mut sorted_keys: Vec<&String> = params.keys().collect();
        sorted_keys.sort();

        let mut content = String::new();
        for key in sorted_keys {
            if let Some(value) = params.get(key) {
                if !value.is_empty() && key != "sign" && key != "sign_type" {
                    if !content.is_empty() {
                        content.push('&');
                    }
                    content.push_str(&format!("{}={}", key, value));
                }
            }
        }
        content
    }

    // RSA2 签名
    pub(crate) fn generate_sign(&self, params: &HashMap<String, String>) -> ApiResult<String> {
        let content = Self::sign_content(params);

        let rsa = Rsa::private_key_from_pem(self.private_key.as_bytes())?;
        let pkey = PKey::from_rsa(rsa)?;

        let mut signer = Signer::new(MessageDigest::sha256(), &pkey)?;
        signer.update(content.as_bytes())?;
        let signature = signer.sign_to_vec()?;

        Ok(B64.encode(signature))
    }

    // RSA2 验签
    pub(crate) fn verify_sign(&self, params: &HashMap<String, String>, sign: &str) -> ApiResult<bool> {
        let content = Self::sign_content(params);

        let rsa = Rsa::public_key_from_pem(self.alipay_public_key.as_bytes())?;
        let pkey = PKey::from_rsa(rsa)?;

        let mut verifier = Verifier::new(MessageDigest::sha256(), &pkey)?;
        verifier.update(content.as_bytes())?;

        let sign_bytes = B64
            .decode(sign)
            .map_err(|e| ApiError::SignatureInvalid(e.to_string()))?;

        Ok(verifier.verify(&sign_bytes)?)
    }

    // 构建公共请求参数
    fn build_common_params(&self, method: &str) -> HashMap<String, String> {
        let mut params = HashMap::new();
        params.insert("app_id".to_string(), self.app_id.clone());
        params.insert("method".to_string(), method.to_string());
        params.insert("format".to_string(), "JSON".to_string());
        params.insert("charset".to_string(), "utf-8".to_string());
        params.insert("sign_type".to_string(), "RSA2".to_string());
        params.insert(
            "timestamp".to_string(),
            Utc::now().format("%Y-%m-%d %H:%M:%S").to_string(),
        );
        params.insert("version".to_string(), "1.0".to_string());

        params
    }

    // 发送请求到支付宝网关并解出业务响应节点
    async fn send_request(
        &self,
        mut params: HashMap<String, String>,
        response_key: &str,
    ) -> ApiResult<serde_json::Value> {
        let sign = self.generate_sign(&params)?;
        params.insert("sign".to_string(), sign);

        let response = self
            .client
            .post(&self.gateway_url)
            .form(&params)
            .send()
            .await
            .map_err(|e| ApiError::Provider(e.to_string()))?;

        let response_text = response
            .text()
            .await
            .map_err(|e| ApiError::Provider(e.to_string()))?;

        let response_json: serde_json::Value = serde_json::from_str(&response_text)
            .map_err(|e| ApiError::Provider(format!("响应解析失败: {e}")))?;

        let response_data = response_json
            .get(response_key)
            .cloned()
            .ok_or_else(|| ApiError::Provider(format!("响应缺少 {response_key} 节点")))?;

        let code = response_data["code"].as_str().unwrap_or("");
        if code != "10000" {
            let sub_msg = response_data["sub_msg"]
                .as_str()
                .or_else(|| response_data["msg"].as_str())
                .unwrap_or("未知错误");
            return Err(ApiError::Provider(sub_msg.to_string()));
        }

        Ok(response_data)
    }

    // wap 支付是浏览器跳转，不走网关请求，直接拼出带签名的跳转链接
    fn build_wap_url(&self, ctx: &PaymentContext) -> ApiResult<String> {
        let mut params = self.build_common_params("alipay.trade.wap.pay");
        params.insert("notify_url".to_string(), self.notify_url.clone());
        params.insert("return_url".to_string(), self.return_url.clone());

        let biz_content = serde_json::json!({
            "out_trade_no": ctx.out_trade_no,
            "total_amount": format!("{:.2}", ctx.amount),
            "subject": ctx.subject,
            "product_code": "QUICK_WAP_WAY",
        });
        params.insert("biz_content".to_string(), biz_content.to_string());

        let sign = self.generate_sign(&params)?;
        params.insert("sign".to_string(), sign);

        let query = serde_urlencoded::to_string(&params)
            .map_err(|e| ApiError::Internal(e.to_string()))?;

        Ok(format!("{}?{}", self.gateway_url, query))
    }

    fn parse_pay_date(value: Option<&str>) -> Option<chrono::DateTime<Utc>> {
        value.and_then(|t| {
            chrono::NaiveDateTime::parse_from_str(t, "%Y-%m-%d %H:%M:%S")
                .ok()
                .map(|dt| chrono::DateTime::<Utc>::from_naive_utc_and_offset(dt, Utc))
        })
    }
}

#[async_trait]
impl PaymentProvider for AlipayProvider {
    fn name(&self) -> PayProvider {
        PayProvider::Alipay
    }

    async fn create_payment(&self, ctx: &PaymentContext) -> ApiResult<CreatedPayment> {
        info!("Creating Alipay payment for out_trade_no: {}", ctx.out_trade_no);

        match ctx.method {
            PayMethod::H5 => {
                let h5_url = self.build_wap_url(ctx)?;
                Ok(CreatedPayment {
                    artifact: ProviderArtifact::H5 { h5_url },
                    raw: serde_json::json!({"method": "alipay.trade.wap.pay"}),
                })
            }
            PayMethod::Native => {
                let mut params = self.build_common_params("alipay.trade.precreate");
                params.insert("notify_url".to_string(), self.notify_url.clone());

                let biz_content = serde_json::json!({
                    "out_trade_no": ctx.out_trade_no,
                    "total_amount": format!("{:.2}", ctx.amount),
                    "subject": ctx.subject,
                });
                params.insert("biz_content".to_string(), biz_content.to_string());

                let data = self
                    .send_request(params, "alipay_trade_precreate_response")
                    .await?;

                let qr_code = data["qr_code"]
                    .as_str()
                    .ok_or_else(|| ApiError::Provider("响应缺少 qr_code".to_string()))?
                    .to_string();

                Ok(CreatedPayment {
                    artifact: ProviderArtifact::Qr { qr_code },
                    raw: data,
                })
            }
            PayMethod::Jsapi => Err(ApiError::Validation(
                "支付宝渠道不支持 jsapi 方式".to_string(),
            )),
        }
    }

    async fn query_by_out_trade_no(&self, out_trade_no: &str) -> ApiResult<ProviderTradeQuery> {
        info!("Querying Alipay trade status for out_trade_no: {}", out_trade_no);

        let mut params = self.build_common_params("alipay.trade.query");
        let biz_content = serde_json::json!({ "out_trade_no": out_trade_no });
        params.insert("biz_content".to_string(), biz_content.to_string());

        let data = self
            .send_request(params, "alipay_trade_query_response")
            .await?;

        let trade_state = data["trade_status"].as_str().unwrap_or("").to_string();
        let transaction_id = data["trade_no"].as_str().map(|s| s.to_string());
        let paid_at = Self::parse_pay_date(data["send_pay_date"].as_str());

        Ok(ProviderTradeQuery {
            trade_state,
            transaction_id,
            paid_at,
            raw: data,
        })
    }

    async fn refund(&self, req: &ProviderRefundRequest) -> ApiResult<ProviderRefundResult> {
        info!(
            "Creating Alipay refund for out_trade_no: {}, request_no: {}",
            req.out_trade_no, req.refund_request_no
        );

        let mut params = self.build_common_params("alipay.trade.refund");
        let biz_content = serde_json::json!({
            "out_trade_no": req.out_trade_no,
            "refund_amount": format!("{:.2}", req.refund_amount),
            "out_request_no": req.refund_request_no,
            "refund_reason": req.reason.clone().unwrap_or_else(|| "用户退款".to_string()),
        });
        params.insert("biz_content".to_string(), biz_content.to_string());

        let data = self
            .send_request(params, "alipay_trade_refund_response")
            .await?;

        let provider_refund_id = data["trade_no"].as_str().map(|s| s.to_string());

        Ok(ProviderRefundResult {
            provider_refund_id,
            raw: data,
        })
    }

    fn verify_webhook(&self, req: &WebhookRequest) -> ApiResult<WebhookNotification> {
        // 异步通知是 form 编码
        let params: HashMap<String, String> = serde_urlencoded::from_str(&req.body)
            .map_err(|e| ApiError::SignatureInvalid(format!("通知数据解析失败: {e}")))?;

        let sign = params
            .get("sign")
            .ok_or_else(|| ApiError::SignatureInvalid("通知缺少签名".to_string()))?;

        if !self.verify_sign(&params, sign)? {
            return Err(ApiError::SignatureInvalid("支付宝通知验签失败".to_string()));
        }

        let app_id = params
            .get("app_id")
            .ok_or_else(|| ApiError::SignatureInvalid("通知缺少 app_id".to_string()))?;
        if app_id != &self.app_id {
            return Err(ApiError::SignatureInvalid("app_id 不匹配".to_string()));
        }

        let out_trade_no = params
            .get("out_trade_no")
            .ok_or_else(|| ApiError::SignatureInvalid("通知缺少 out_trade_no".to_string()))?
            .clone();

        let trade_state = params.get("trade_status").cloned().unwrap_or_default();
        let transaction_id = params.get("trade_no").cloned();
        let paid_at = Self::parse_pay_date(params.get("gmt_payment").map(|s| s.as_str()));

        let raw = serde_json::to_value(&params).unwrap_or_default();

        Ok(WebhookNotification {
            out_trade_no,
            transaction_id,
            trade_state,
            paid_at,
            raw,
        })
    }
}
