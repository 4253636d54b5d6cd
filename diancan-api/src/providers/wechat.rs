use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as B64, Engine as _};
use chrono::Utc;
use openssl::hash::MessageDigest;
use openssl::pkey::PKey;
use openssl::rsa::Rsa;
use openssl::sign::{Signer, Verifier};
use openssl::symm::{decrypt_aead, Cipher};
use reqwest::Client;
use tracing::info;
use uuid::Uuid;

use crate::config::settings::WechatSettings;
use crate::error::{ApiError, ApiResult};
use crate::models::enums::{PayMethod, PayProvider};
use crate::models::payment::ProviderArtifact;
use crate::providers::{
    CreatedPayment, PaymentContext, PaymentProvider, ProviderRefundRequest, ProviderRefundResult,
    ProviderTradeQuery, WebhookNotification, WebhookRequest,
};

/// 微信金额单位是分
pub(crate) fn to_fen(amount: f64) -> i64 {
    (amount * 100.0).round() as i64
}

#[derive(Debug, Clone)]
pub struct WechatPayProvider {
    client: Client,
    mch_id: String,
    app_id: String,
    serial_no: String,
    private_key: String,
    platform_public_key: String,
    api_v3_key: String,
    base_url: String,
    notify_url: String,
}

impl WechatPayProvider {
    pub fn new(settings: &WechatSettings, notify_url: String, timeout: Duration) -> Self {
        Self {
            client: Client::builder()
                .timeout(timeout)
                .build()
                .unwrap_or_default(),
            mch_id: settings.mch_id.clone(),
            app_id: settings.app_id.clone(),
            serial_no: settings.serial_no.clone(),
            private_key: settings.private_key.clone(),
            platform_public_key: settings.platform_public_key.clone(),
            api_v3_key: settings.api_v3_key.clone(),
            base_url: settings.base_url.clone(),
            notify_url,
        }
    }

    // v3 请求签名，生成 Authorization 头
    pub(crate) fn build_authorization(
        &self,
        method: &str,
        path_with_query: &str,
        body: &str,
    ) -> ApiResult<String> {
        let timestamp = Utc::now().timestamp();
        let nonce = Uuid::new_v4().simple().to_string();

        let message = format!("{method}\n{path_with_query}\n{timestamp}\n{nonce}\n{body}\n");

        let rsa = Rsa::private_key_from_pem(self.private_key.as_bytes())?;
        let pkey = PKey::from_rsa(rsa)?;
        let mut signer = Signer::new(MessageDigest::sha256(), &pkey)?;
        signer.update(message.as_bytes())?;
        let signature = B64.encode(signer.sign_to_vec()?);

        Ok(format!(
            "WECHATPAY2-SHA256-RSA2048 mchid=\"{}\",nonce_str=\"{}\",signature=\"{}\",timestamp=\"{}\",serial_no=\"{}\"",
            self.mch_id, nonce, signature, timestamp, self.serial_no
        ))
    }

    async fn post_json(&self, path: &str, body: &serde_json::Value) -> ApiResult<serde_json::Value> {
        let body_text = body.to_string();
        let authorization = self.build_authorization("POST", path, &body_text)?;

        let response = self
            .client
            .post(format!("{}{}", self.base_url, path))
            .header("Authorization", authorization)
            .header("Accept", "application/json")
            .header("Content-Type", "application/json")
            .body(body_text)
            .send()
            .await
            .map_err(|e| ApiError::Provider(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| ApiError::Provider(e.to_string()))?;

        let json: serde_json::Value = if text.is_empty() {
            serde_json::json!({})
        } else {
            serde_json::from_str(&text).map_err(|e| ApiError::Provider(format!("响应解析失败: {e}")))?
        };

        if !status.is_success() {
            let message = json["message"].as_str().unwrap_or("未知错误");
            return Err(ApiError::Provider(format!("{}: {}", status.as_u16(), message)));
        }

        Ok(json)
    }

    async fn get_json(&self, path_with_query: &str) -> ApiResult<serde_json::Value> {
        let authorization = self.build_authorization("GET", path_with_query, "")?;

        let response = self
            .client
            .get(format!("{}{}", self.base_url, path_with_query))
            .header("Authorization", authorization)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| ApiError::Provider(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| ApiError::Provider(e.to_string()))?;

        let json: serde_json::Value = serde_json::from_str(&text)
            .map_err(|e| ApiError::Provider(format!("响应解析失败: {e}")))?;

        if !status.is_success() {
            let message = json["message"].as_str().unwrap_or("未知错误");
            return Err(ApiError::Provider(format!("{}: {}", status.as_u16(), message)));
        }

        Ok(json)
    }

    fn header<'a>(req: &'a WebhookRequest, name: &str) -> Option<&'a str> {
        req.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    // 平台证书验签：timestamp\n nonce\n body\n
    fn verify_notify_signature(&self, timestamp: &str, nonce: &str, body: &str, signature: &str) -> ApiResult<bool> {
        let message = format!("{timestamp}\n{nonce}\n{body}\n");

        let rsa = Rsa::public_key_from_pem(self.platform_public_key.as_bytes())?;
        let pkey = PKey::from_rsa(rsa)?;
        let mut verifier = Verifier::new(MessageDigest::sha256(), &pkey)?;
        verifier.update(message.as_bytes())?;

        let sign_bytes = B64
            .decode(signature)
            .map_err(|e| ApiError::SignatureInvalid(e.to_string()))?;

        Ok(verifier.verify(&sign_bytes)?)
    }

    // APIv3 密钥解密回调 resource（AES-256-GCM，密文末尾16字节是校验标签）
    pub(crate) fn decrypt_resource(
        &self,
        ciphertext_b64: &str,
        nonce: &str,
        associated_data: &str,
    ) -> ApiResult<serde_json::Value> {
        let ciphertext = B64
            .decode(ciphertext_b64)
            .map_err(|e| ApiError::Crypto(e.to_string()))?;

        if ciphertext.len() < 16 {
            return Err(ApiError::Crypto("回调密文长度不足".to_string()));
        }
        let (data, tag) = ciphertext.split_at(ciphertext.len() - 16);

        let plaintext = decrypt_aead(
            Cipher::aes_256_gcm(),
            self.api_v3_key.as_bytes(),
            Some(nonce.as_bytes()),
            associated_data.as_bytes(),
            data,
            tag,
        )
        .map_err(|e| ApiError::Crypto(format!("回调资源解密失败: {e}")))?;

        serde_json::from_slice(&plaintext).map_err(|e| ApiError::Crypto(format!("解密内容解析失败: {e}")))
    }
}

#[async_trait]
impl PaymentProvider for WechatPayProvider {
    fn name(&self) -> PayProvider {
        PayProvider::Wechatpay
    }

    async fn create_payment(&self, ctx: &PaymentContext) -> ApiResult<CreatedPayment> {
        info!("Creating Wechat payment for out_trade_no: {}", ctx.out_trade_no);

        let mut body = serde_json::json!({
            "appid": self.app_id,
            "mchid": self.mch_id,
            "description": ctx.subject,
            "out_trade_no": ctx.out_trade_no,
            "notify_url": self.notify_url,
            "amount": {
                "total": to_fen(ctx.amount),
                "currency": ctx.currency,
            },
        });

        match ctx.method {
            PayMethod::H5 => {
                body["scene_info"] = serde_json::json!({
                    "payer_client_ip": ctx.client_ip.clone().unwrap_or_else(|| "127.0.0.1".to_string()),
                    "h5_info": { "type": "Wap" },
                });

                let data = self.post_json("/v3/pay/transactions/h5", &body).await?;
                let h5_url = data["h5_url"]
                    .as_str()
                    .ok_or_else(|| ApiError::Provider("响应缺少 h5_url".to_string()))?
                    .to_string();

                Ok(CreatedPayment { artifact: ProviderArtifact::H5 { h5_url }, raw: data })
            }
            PayMethod::Native => {
                let data = self.post_json("/v3/pay/transactions/native", &body).await?;
                let qr_code = data["code_url"]
                    .as_str()
                    .ok_or_else(|| ApiError::Provider("响应缺少 code_url".to_string()))?
                    .to_string();

                Ok(CreatedPayment { artifact: ProviderArtifact::Qr { qr_code }, raw: data })
            }
            PayMethod::Jsapi => {
                let openid = ctx
                    .payer_openid
                    .clone()
                    .ok_or_else(|| ApiError::Validation("jsapi 方式需要 openid".to_string()))?;
                body["payer"] = serde_json::json!({ "openid": openid });

                let data = self.post_json("/v3/pay/transactions/jsapi", &body).await?;
                let prepay_id = data["prepay_id"]
                    .as_str()
                    .ok_or_else(|| ApiError::Provider("响应缺少 prepay_id".to_string()))?
                    .to_string();

                Ok(CreatedPayment { artifact: ProviderArtifact::Jsapi { prepay_id }, raw: data })
            }
        }
    }

    async fn query_by_out_trade_no(&self, out_trade_no: &str) -> ApiResult<ProviderTradeQuery> {
        info!("Querying Wechat trade state for out_trade_no: {}", out_trade_no);

        let path = format!(
            "/v3/pay/transactions/out-trade-no/{}?mchid={}",
            out_trade_no, self.mch_id
        );
        let data = self.get_json(&path).await?;

        let trade_state = data["trade_state"].as_str().unwrap_or("").to_string();
        let transaction_id = data["transaction_id"].as_str().map(|s| s.to_string());
        let paid_at = data["success_time"].as_str().and_then(|t| {
            chrono::DateTime::parse_from_rfc3339(t)
                .ok()
                .map(|dt| dt.with_timezone(&Utc))
        });

        Ok(ProviderTradeQuery { trade_state, transaction_id, paid_at, raw: data })
    }

    async fn refund(&self, req: &ProviderRefundRequest) -> ApiResult<ProviderRefundResult> {
        info!(
            "Creating Wechat refund for out_trade_no: {}, request_no: {}",
            req.out_trade_no, req.refund_request_no
        );

        let body = serde_json::json!({
            "out_trade_no": req.out_trade_no,
            "out_refund_no": req.refund_request_no,
            "reason": req.reason.clone().unwrap_or_else(|| "用户退款".to_string()),
            "notify_url": self.notify_url,
            "amount": {
                "refund": to_fen(req.refund_amount),
                "total": to_fen(req.payment_amount),
                "currency": "CNY",
            },
        });

        let data = self.post_json("/v3/refund/domestic/refunds", &body).await?;
        let provider_refund_id = data["refund_id"].as_str().map(|s| s.to_string());

        Ok(ProviderRefundResult { provider_refund_id, raw: data })
    }

    fn verify_webhook(&self, req: &WebhookRequest) -> ApiResult<WebhookNotification> {
        let timestamp = Self::header(req, "Wechatpay-Timestamp")
            .ok_or_else(|| ApiError::SignatureInvalid("通知缺少 Wechatpay-Timestamp".to_string()))?;
        let nonce = Self::header(req, "Wechatpay-Nonce")
            .ok_or_else(|| ApiError::SignatureInvalid("通知缺少 Wechatpay-Nonce".to_string()))?;
        let signature = Self::header(req, "Wechatpay-Signature")
            .ok_or_else(|| ApiError::SignatureInvalid("通知缺少 Wechatpay-Signature".to_string()))?;

        if !self.verify_notify_signature(timestamp, nonce, &req.body, signature)? {
            return Err(ApiError::SignatureInvalid("微信通知验签失败".to_string()));
        }

        let envelope: serde_json::Value = serde_json::from_str(&req.body)
            .map_err(|e| ApiError::SignatureInvalid(format!("通知数据解析失败: {e}")))?;

        let resource = &envelope["resource"];
        let ciphertext = resource["ciphertext"]
            .as_str()
            .ok_or_else(|| ApiError::SignatureInvalid("通知缺少 resource.ciphertext".to_string()))?;
        let resource_nonce = resource["nonce"]
            .as_str()
            .ok_or_else(|| ApiError::SignatureInvalid("通知缺少 resource.nonce".to_string()))?;
        let associated_data = resource["associated_data"].as_str().unwrap_or("");

        let decrypted = self.decrypt_resource(ciphertext, resource_nonce, associated_data)?;

        let out_trade_no = decrypted["out_trade_no"]
            .as_str()
            .ok_or_else(|| ApiError::SignatureInvalid("通知缺少 out_trade_no".to_string()))?
            .to_string();
        let transaction_id = decrypted["transaction_id"].as_str().map(|s| s.to_string());
        let trade_state = decrypted["trade_state"].as_str().unwrap_or("").to_string();
        let paid_at = decrypted["success_time"].as_str().and_then(|t| {
            chrono::DateTime::parse_from_rfc3339(t)
                .ok()
                .map(|dt| dt.with_timezone(&Utc))
        });

        Ok(WebhookNotification {
            out_trade_no,
            transaction_id,
            trade_state,
            paid_at,
            raw: decrypted,
        })
    }
}
