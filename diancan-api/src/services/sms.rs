use async_trait::async_trait;
use tracing::info;

/// 短信发送。具体服务商接入不在本仓库范围内，默认实现只打日志
#[async_trait]
pub trait SmsSender: Send + Sync {
    async fn send_code(&self, phone: &str, code: &str) -> anyhow::Result<()>;
}

pub struct LogSmsSender;

#[async_trait]
impl SmsSender for LogSmsSender {
    async fn send_code(&self, phone: &str, code: &str) -> anyhow::Result<()> {
        info!("Sending verification code {} to {}", code, phone);
        Ok(())
    }
}
