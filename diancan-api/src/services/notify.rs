use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::info;

/// 支付成功后的业务通知。尽力而为：失败只记日志，不重试、不影响支付主流程
#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    async fn dispatch_order_paid(&self, order_id: &str) -> anyhow::Result<()>;
}

pub struct HttpNotificationDispatcher {
    client: Client,
    callback_url: Option<String>,
}

impl HttpNotificationDispatcher {
    pub fn new(callback_url: Option<String>, timeout: Duration) -> Self {
        Self {
            client: Client::builder()
                .timeout(timeout)
                .build()
                .unwrap_or_default(),
            callback_url,
        }
    }
}

#[async_trait]
impl NotificationDispatcher for HttpNotificationDispatcher {
    async fn dispatch_order_paid(&self, order_id: &str) -> anyhow::Result<()> {
        info!("Dispatching order paid notification for order: {}", order_id);

        if let Some(url) = &self.callback_url {
            self.client
                .post(url)
                .json(&serde_json::json!({
                    "event": "order.paid",
                    "order_id": order_id,
                    "time": chrono::Utc::now().to_rfc3339(),
                }))
                .send()
                .await?
                .error_for_status()?;
        }

        Ok(())
    }
}
