use serde::Serialize;
use tokio::sync::broadcast;
use tracing::debug;

/// 推送给订阅端的实时事件
#[derive(Debug, Clone, Serialize)]
pub struct RealtimeEvent {
    /// 事件归属用户，连接按此过滤
    pub user_id: i64,
    pub topic: String,
    pub payload: serde_json::Value,
}

/// 进程内广播。订阅者掉线或堆积时事件被丢弃，推送不保证可达
pub struct RealtimeBroadcaster {
    tx: broadcast::Sender<RealtimeEvent>,
}

impl RealtimeBroadcaster {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RealtimeEvent> {
        self.tx.subscribe()
    }

    pub fn broadcast_payment_updated(&self, order_id: &str, user_id: i64, payload: serde_json::Value) {
        self.publish(RealtimeEvent {
            user_id,
            topic: "payment.updated".to_string(),
            payload: serde_json::json!({ "order_id": order_id, "data": payload }),
        });
    }

    pub fn broadcast_order_status_changed(&self, order_id: &str, user_id: i64, payload: serde_json::Value) {
        self.publish(RealtimeEvent {
            user_id,
            topic: "order.status_changed".to_string(),
            payload: serde_json::json!({ "order_id": order_id, "data": payload }),
        });
    }

    fn publish(&self, event: RealtimeEvent) {
        // 没有订阅者时 send 返回 Err，属正常情况
        if self.tx.send(event).is_err() {
            debug!("No realtime subscribers, event dropped");
        }
    }
}
