use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;

use diancan_api::error::{ApiError, ApiResult};
use diancan_api::models::enums::{OrderPaymentStatus, OrderStatus, PayProvider, PaymentStatus};
use diancan_api::models::order::{Order, OrderItem};
use diancan_api::models::payment::{
    NewPaymentEvent, Payment, PaymentEventRecord, ProviderArtifact,
};
use diancan_api::models::user::{User, UserPreferences};
use diancan_api::providers::{
    CreatedPayment, PaymentContext, PaymentProvider, ProviderRefundRequest, ProviderRefundResult,
    ProviderRegistry, ProviderTradeQuery, WebhookNotification, WebhookRequest,
};
use diancan_api::repository::{
    OrderRepository, PaymentRepository, PaymentSuccessUpdate, RefundUpdate, UserRepository,
};
use diancan_api::services::notify::NotificationDispatcher;
use diancan_api::services::payment_service::PaymentsService;
use diancan_api::services::realtime::RealtimeBroadcaster;

// ---- 内存订单仓储 ----

#[derive(Default)]
pub struct MemoryOrderRepo {
    pub orders: Mutex<HashMap<String, Order>>,
}

impl MemoryOrderRepo {
    pub fn seed(&self, order: Order) {
        self.orders.lock().unwrap().insert(order.id.clone(), order);
    }

    pub fn get(&self, id: &str) -> Option<Order> {
        self.orders.lock().unwrap().get(id).cloned()
    }
}

#[async_trait]
impl OrderRepository for MemoryOrderRepo {
    async fn insert(&self, order: &Order) -> ApiResult<()> {
        self.seed(order.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> ApiResult<Option<Order>> {
        Ok(self.get(id))
    }

    async fn list_by_user(&self, user_id: i64, _limit: i64) -> ApiResult<Vec<Order>> {
        Ok(self
            .orders
            .lock()
            .unwrap()
            .values()
            .filter(|o| o.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn update_status(&self, id: &str, status: OrderStatus) -> ApiResult<()> {
        if let Some(order) = self.orders.lock().unwrap().get_mut(id) {
            order.status = status;
        }
        Ok(())
    }

    async fn set_payment_pending(&self, id: &str) -> ApiResult<()> {
        if let Some(order) = self.orders.lock().unwrap().get_mut(id) {
            if matches!(
                order.payment_status,
                OrderPaymentStatus::Unpaid | OrderPaymentStatus::PendingPayment
            ) {
                order.payment_status = OrderPaymentStatus::PendingPayment;
            }
        }
        Ok(())
    }
}

// ---- 内存支付仓储：与 MySQL 实现一致，成功/退款转换原子更新支付单+订单+流水 ----

pub struct MemoryPaymentRepo {
    pub payments: Mutex<HashMap<String, Payment>>,
    pub events: Mutex<Vec<PaymentEventRecord>>,
    orders: Arc<MemoryOrderRepo>,
}

impl MemoryPaymentRepo {
    pub fn new(orders: Arc<MemoryOrderRepo>) -> Self {
        Self {
            payments: Mutex::new(HashMap::new()),
            events: Mutex::new(Vec::new()),
            orders,
        }
    }

    pub fn get(&self, id: &str) -> Option<Payment> {
        self.payments.lock().unwrap().get(id).cloned()
    }

    pub fn count(&self) -> usize {
        self.payments.lock().unwrap().len()
    }

    pub fn events_of_type(&self, event_type: diancan_api::models::enums::PaymentEventType) -> usize {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.event_type == event_type)
            .count()
    }

    fn push_event(&self, event: &NewPaymentEvent) {
        let mut events = self.events.lock().unwrap();
        let id = events.len() as i64 + 1;
        events.push(PaymentEventRecord {
            id: Some(id),
            payment_id: event.payment_id.clone(),
            order_id: event.order_id.clone(),
            event_type: event.event_type,
            payload: event.payload.clone(),
            created_at: Utc::now(),
        });
    }
}

#[async_trait]
impl PaymentRepository for MemoryPaymentRepo {
    async fn insert(&self, payment: &Payment) -> ApiResult<()> {
        self.payments
            .lock()
            .unwrap()
            .insert(payment.id.clone(), payment.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> ApiResult<Option<Payment>> {
        Ok(self.get(id))
    }

    async fn find_by_out_trade_no(&self, out_trade_no: &str) -> ApiResult<Option<Payment>> {
        Ok(self
            .payments
            .lock()
            .unwrap()
            .values()
            .find(|p| p.out_trade_no == out_trade_no)
            .cloned())
    }

    async fn find_by_idempotency_key(&self, key: &str) -> ApiResult<Option<Payment>> {
        Ok(self
            .payments
            .lock()
            .unwrap()
            .values()
            .find(|p| p.idempotency_key.as_deref() == Some(key))
            .cloned())
    }

    async fn set_artifact(&self, id: &str, artifact: &ProviderArtifact) -> ApiResult<()> {
        if let Some(payment) = self.payments.lock().unwrap().get_mut(id) {
            payment.artifact = Some(artifact.clone());
        }
        Ok(())
    }

    async fn mark_failed(&self, id: &str, message: &str, event: Option<NewPaymentEvent>) -> ApiResult<()> {
        if let Some(payment) = self.payments.lock().unwrap().get_mut(id) {
            payment.status = PaymentStatus::Failed;
            payment.error_message = Some(message.to_string());
        }
        if let Some(event) = &event {
            self.push_event(event);
        }
        Ok(())
    }

    async fn mark_succeeded(&self, update: &PaymentSuccessUpdate) -> ApiResult<()> {
        {
            let mut payments = self.payments.lock().unwrap();
            let payment = payments
                .get_mut(&update.payment_id)
                .ok_or_else(|| ApiError::NotFound(update.payment_id.clone()))?;
            payment.status = PaymentStatus::Succeeded;
            payment.transaction_id = update.transaction_id.clone();
            payment.paid_at = Some(update.paid_at);
        }
        {
            let mut orders = self.orders.orders.lock().unwrap();
            let order = orders
                .get_mut(&update.order_id)
                .ok_or_else(|| ApiError::NotFound(update.order_id.clone()))?;
            order.payment_status = OrderPaymentStatus::Paid;
            order.paid_at = Some(update.paid_at);
            order.payment_id = Some(update.payment_id.clone());
        }
        self.push_event(&update.event);
        Ok(())
    }

    async fn apply_refund(&self, update: &RefundUpdate) -> ApiResult<()> {
        {
            let mut payments = self.payments.lock().unwrap();
            let payment = payments
                .get_mut(&update.payment_id)
                .ok_or_else(|| ApiError::NotFound(update.payment_id.clone()))?;
            payment.status = update.payment_status;
            payment.refunds = update.ledger.clone();
            payment.refunded_at = update.refunded_at;
        }
        {
            let mut orders = self.orders.orders.lock().unwrap();
            let order = orders
                .get_mut(&update.order_id)
                .ok_or_else(|| ApiError::NotFound(update.order_id.clone()))?;
            order.payment_status = update.order_payment_status;
        }
        self.push_event(&update.event);
        Ok(())
    }

    async fn append_event(&self, event: &NewPaymentEvent) -> ApiResult<()> {
        self.push_event(event);
        Ok(())
    }

    async fn events_for_payment(&self, payment_id: &str) -> ApiResult<Vec<PaymentEventRecord>> {
        Ok(self
            .events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.payment_id == payment_id)
            .cloned()
            .collect())
    }
}

// ---- 内存用户仓储 ----

#[derive(Default)]
pub struct MemoryUserRepo {
    pub users: Mutex<Vec<User>>,
}

#[async_trait]
impl UserRepository for MemoryUserRepo {
    async fn find_by_id(&self, id: i64) -> ApiResult<Option<User>> {
        Ok(self.users.lock().unwrap().iter().find(|u| u.id == id).cloned())
    }

    async fn find_by_phone(&self, phone: &str) -> ApiResult<Option<User>> {
        Ok(self.users.lock().unwrap().iter().find(|u| u.phone == phone).cloned())
    }

    async fn find_by_invite_code(&self, code: &str) -> ApiResult<Option<User>> {
        Ok(self
            .users
            .lock()
            .unwrap()
            .iter()
            .find(|u| u.invite_code == code)
            .cloned())
    }

    async fn insert(&self, phone: &str, nickname: &str, invite_code: &str) -> ApiResult<User> {
        let mut users = self.users.lock().unwrap();
        let user = User {
            id: users.len() as i64 + 1,
            phone: phone.to_string(),
            nickname: nickname.to_string(),
            invite_code: invite_code.to_string(),
            invited_by: None,
            preferences: UserPreferences::default(),
            created_at: Utc::now(),
        };
        users.push(user.clone());
        Ok(user)
    }

    async fn update_preferences(&self, user_id: i64, prefs: &UserPreferences) -> ApiResult<()> {
        if let Some(user) = self.users.lock().unwrap().iter_mut().find(|u| u.id == user_id) {
            user.preferences = prefs.clone();
        }
        Ok(())
    }

    async fn bind_inviter(&self, user_id: i64, inviter_id: i64, _reward: f64) -> ApiResult<()> {
        if let Some(user) = self.users.lock().unwrap().iter_mut().find(|u| u.id == user_id) {
            user.invited_by = Some(inviter_id);
        }
        Ok(())
    }

    async fn invite_stats(&self, inviter_id: i64) -> ApiResult<(i64, f64)> {
        let count = self
            .users
            .lock()
            .unwrap()
            .iter()
            .filter(|u| u.invited_by == Some(inviter_id))
            .count() as i64;
        Ok((count, count as f64 * 5.0))
    }
}

// ---- 渠道假实现：回调体为明文 JSON，sig 字段模拟验签 ----

pub struct FakeProvider {
    name: PayProvider,
    pub query_state: Mutex<String>,
    pub fail_create: AtomicBool,
    pub fail_refund: AtomicBool,
    refund_seq: AtomicUsize,
}

impl FakeProvider {
    pub fn new(name: PayProvider) -> Self {
        Self {
            name,
            query_state: Mutex::new("WAIT_BUYER_PAY".to_string()),
            fail_create: AtomicBool::new(false),
            fail_refund: AtomicBool::new(false),
            refund_seq: AtomicUsize::new(0),
        }
    }

    pub fn set_query_state(&self, state: &str) {
        *self.query_state.lock().unwrap() = state.to_string();
    }
}

#[async_trait]
impl PaymentProvider for FakeProvider {
    fn name(&self) -> PayProvider {
        self.name
    }

    async fn create_payment(&self, ctx: &PaymentContext) -> ApiResult<CreatedPayment> {
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(ApiError::Provider("渠道系统繁忙".to_string()));
        }
        Ok(CreatedPayment {
            artifact: ProviderArtifact::H5 {
                h5_url: format!("https://pay.example.com/h5?out_trade_no={}", ctx.out_trade_no),
            },
            raw: serde_json::json!({}),
        })
    }

    async fn query_by_out_trade_no(&self, _out_trade_no: &str) -> ApiResult<ProviderTradeQuery> {
        let trade_state = self.query_state.lock().unwrap().clone();
        Ok(ProviderTradeQuery {
            trade_state: trade_state.clone(),
            transaction_id: Some("tx-query-001".to_string()),
            paid_at: Some(Utc::now()),
            raw: serde_json::json!({ "trade_state": trade_state }),
        })
    }

    async fn refund(&self, req: &ProviderRefundRequest) -> ApiResult<ProviderRefundResult> {
        if self.fail_refund.load(Ordering::SeqCst) {
            return Err(ApiError::Provider("余额不足".to_string()));
        }
        let seq = self.refund_seq.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(ProviderRefundResult {
            provider_refund_id: Some(format!("refund-{seq}")),
            raw: serde_json::json!({ "out_refund_no": req.refund_request_no }),
        })
    }

    fn verify_webhook(&self, req: &WebhookRequest) -> ApiResult<WebhookNotification> {
        let payload: serde_json::Value = serde_json::from_str(&req.body)
            .map_err(|e| ApiError::SignatureInvalid(e.to_string()))?;

        if payload["sig"].as_str() == Some("bad") {
            return Err(ApiError::SignatureInvalid("验签失败".to_string()));
        }

        let out_trade_no = payload["out_trade_no"]
            .as_str()
            .ok_or_else(|| ApiError::SignatureInvalid("缺少 out_trade_no".to_string()))?
            .to_string();

        Ok(WebhookNotification {
            out_trade_no,
            transaction_id: payload["transaction_id"].as_str().map(|s| s.to_string()),
            trade_state: payload["trade_state"].as_str().unwrap_or("").to_string(),
            paid_at: None,
            raw: payload,
        })
    }
}

// ---- 内存验证码存储 ----

#[derive(Default)]
pub struct MemoryCodeStore {
    pub codes: Mutex<HashMap<String, String>>,
    throttled: Mutex<HashMap<String, bool>>,
}

#[async_trait]
impl diancan_api::cache::CodeStore for MemoryCodeStore {
    async fn set_code(&self, phone: &str, code: &str, _ttl: u64) -> ApiResult<()> {
        self.codes.lock().unwrap().insert(phone.to_string(), code.to_string());
        Ok(())
    }

    async fn get_code(&self, phone: &str) -> ApiResult<Option<String>> {
        Ok(self.codes.lock().unwrap().get(phone).cloned())
    }

    async fn delete_code(&self, phone: &str) -> ApiResult<()> {
        self.codes.lock().unwrap().remove(phone);
        Ok(())
    }

    async fn try_throttle(&self, phone: &str, _interval: u64) -> ApiResult<bool> {
        let mut throttled = self.throttled.lock().unwrap();
        Ok(throttled.insert(phone.to_string(), true).is_none())
    }
}

// ---- 计数通知器 ----

#[derive(Default)]
pub struct CountingNotifier {
    pub dispatched: AtomicUsize,
}

#[async_trait]
impl NotificationDispatcher for CountingNotifier {
    async fn dispatch_order_paid(&self, _order_id: &str) -> anyhow::Result<()> {
        self.dispatched.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// ---- 组装 ----

pub struct TestHarness {
    pub service: PaymentsService,
    pub orders: Arc<MemoryOrderRepo>,
    pub payments: Arc<MemoryPaymentRepo>,
    pub provider: Arc<FakeProvider>,
    pub notifier: Arc<CountingNotifier>,
}

pub fn harness(provider_name: PayProvider) -> TestHarness {
    let orders = Arc::new(MemoryOrderRepo::default());
    let payments = Arc::new(MemoryPaymentRepo::new(orders.clone()));
    let provider = Arc::new(FakeProvider::new(provider_name));
    let notifier = Arc::new(CountingNotifier::default());

    let registry = Arc::new(ProviderRegistry::new().register(provider.clone()));

    let service = PaymentsService::new(
        orders.clone(),
        payments.clone(),
        registry,
        notifier.clone(),
        Arc::new(RealtimeBroadcaster::new(64)),
    );

    TestHarness { service, orders, payments, provider, notifier }
}

pub fn submitted_order(user_id: i64, amount: f64) -> Order {
    let mut order = Order::new(
        user_id,
        "20250101120000123456".to_string(),
        vec![OrderItem {
            name: "黄焖鸡米饭".to_string(),
            price: amount,
            quantity: 1,
            remark: None,
        }],
        Some("高新区天府三街".to_string()),
        None,
    );
    order.status = OrderStatus::Submitted;
    order
}

/// 等待 fire-and-forget 的通知任务跑完
pub async fn settle() {
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
}
