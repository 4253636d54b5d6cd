use std::sync::Arc;

use chrono::{DateTime, Utc};
use rand::Rng;
use tracing::{error, info, warn};

use crate::error::{ApiError, ApiResult};
use crate::models::enums::{OrderPaymentStatus, PayMethod, PayProvider, PaymentEventType, PaymentStatus};
use crate::models::order::Order;
use crate::models::payment::{
    normalize_amount, BatchRefundItem, BatchRefundRequest, BatchRefundResponse,
    CreatePaymentRequest, CreatePaymentResponse, NewPaymentEvent, Payment,
    PaymentStatusResponse, RefundEntry, RefundPaymentRequest, RefundPaymentResponse,
    AMOUNT_EPSILON,
};
use crate::providers::{
    map_trade_state, PaymentContext, ProviderRefundRequest, ProviderRegistry, WebhookRequest,
};
use crate::repository::{OrderRepository, PaymentRepository, PaymentSuccessUpdate, RefundUpdate};
use crate::services::notify::NotificationDispatcher;
use crate::services::realtime::RealtimeBroadcaster;

/// 回调处理结果，handler 据此拼渠道要求的协议应答
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookOutcome {
    Acked,
    Rejected,
}

impl WebhookOutcome {
    pub fn is_acked(&self) -> bool {
        matches!(self, Self::Acked)
    }
}

/// 支付编排：状态机唯一的写入口。调用渠道适配器，落支付单/订单/流水，
/// 并在成功转换后触发通知与推送
pub struct PaymentsService {
    orders: Arc<dyn OrderRepository>,
    payments: Arc<dyn PaymentRepository>,
    providers: Arc<ProviderRegistry>,
    notifier: Arc<dyn NotificationDispatcher>,
    realtime: Arc<RealtimeBroadcaster>,
}

impl PaymentsService {
    pub fn new(
        orders: Arc<dyn OrderRepository>,
        payments: Arc<dyn PaymentRepository>,
        providers: Arc<ProviderRegistry>,
        notifier: Arc<dyn NotificationDispatcher>,
        realtime: Arc<RealtimeBroadcaster>,
    ) -> Self {
        Self { orders, payments, providers, notifier, realtime }
    }

    pub async fn create_payment(
        &self,
        request: CreatePaymentRequest,
        caller_user_id: Option<i64>,
    ) -> ApiResult<CreatePaymentResponse> {
        // 1. 校验订单与归属
        let order = self
            .orders
            .find_by_id(&request.order_id)
            .await?
            .ok_or_else(|| ApiError::NotFound(format!("订单不存在: {}", request.order_id)))?;

        if let Some(caller) = caller_user_id {
            if caller != order.user_id {
                return Err(ApiError::Forbidden("无权操作该订单".to_string()));
            }
        }

        if request.amount <= 0.0 {
            return Err(ApiError::Validation("支付金额必须大于0".to_string()));
        }

        // 2. 订单已支付：幂等返回已有支付单
        if order.payment_status == OrderPaymentStatus::Paid {
            return self.reuse_existing(&order).await;
        }

        // 3. 幂等键命中：返回已有支付单，不重复下单
        if let Some(key) = &request.idempotency_key {
            if let Some(existing) = self.payments.find_by_idempotency_key(key).await? {
                info!("Idempotency key hit, reusing payment {}", existing.id);
                return Ok(reused_response(&existing));
            }
        }

        let method = request.method.unwrap_or(PayMethod::H5);
        let amount = normalize_amount(request.amount);

        // 4. 商户单号：订单号派生；同一订单重复发起时加随机后缀避免撞号
        let mut out_trade_no = format!("OD{}", order.order_no);
        if self.payments.find_by_out_trade_no(&out_trade_no).await?.is_some() {
            let suffix: u32 = rand::rng().random_range(100000..1000000);
            out_trade_no = format!("OD{}{}", order.order_no, suffix);
        }

        // 5. 落支付单并标记订单待支付
        let payment = Payment::new(
            order.id.clone(),
            request.provider,
            method,
            amount,
            order.currency.clone(),
            out_trade_no.clone(),
            request.idempotency_key.clone(),
        );
        self.payments.insert(&payment).await?;
        self.orders.set_payment_pending(&order.id).await?;

        self.payments
            .append_event(&NewPaymentEvent {
                payment_id: payment.id.clone(),
                order_id: order.id.clone(),
                event_type: PaymentEventType::GatewayRequest,
                payload: serde_json::json!({
                    "provider": request.provider,
                    "method": method,
                    "amount": amount,
                    "out_trade_no": out_trade_no,
                }),
            })
            .await?;

        // 6. 渠道下单。失败落在支付单上，以结果值上报，不向调用方抛异常
        let adapter = self.providers.get(request.provider)?;
        let ctx = PaymentContext {
            out_trade_no: out_trade_no.clone(),
            amount,
            currency: order.currency.clone(),
            subject: format!("点餐订单 {}", order.order_no),
            method,
            client_ip: None,
            payer_openid: None,
        };

        match adapter.create_payment(&ctx).await {
            Ok(created) => {
                self.payments.set_artifact(&payment.id, &created.artifact).await?;

                Ok(CreatePaymentResponse {
                    payment_id: payment.id,
                    out_trade_no,
                    status: PaymentStatus::Created,
                    artifact: Some(created.artifact),
                    reused: false,
                })
            }
            Err(e) => {
                let message = e.to_string();
                warn!("Provider dispatch failed for payment {}: {}", payment.id, message);
                self.payments.mark_failed(&payment.id, &message, None).await?;
                Err(ApiError::Provider(message))
            }
        }
    }

    async fn reuse_existing(&self, order: &Order) -> ApiResult<CreatePaymentResponse> {
        let payment_id = order
            .payment_id
            .clone()
            .ok_or_else(|| ApiError::Internal("订单已支付但缺少支付单指针".to_string()))?;

        let payment = self
            .payments
            .find_by_id(&payment_id)
            .await?
            .ok_or_else(|| ApiError::Internal(format!("支付单不存在: {payment_id}")))?;

        Ok(reused_response(&payment))
    }

    /// 渠道异步通知入口。验签失败 / 找不到支付单都拒绝且不产生任何写入
    pub async fn handle_webhook(&self, provider: PayProvider, request: &WebhookRequest) -> WebhookOutcome {
        let adapter = match self.providers.get(provider) {
            Ok(adapter) => adapter,
            Err(e) => {
                error!("Webhook for unregistered provider {}: {}", provider, e);
                return WebhookOutcome::Rejected;
            }
        };

        let note = match adapter.verify_webhook(request) {
            Ok(note) => note,
            Err(e) => {
                warn!("Webhook verification failed for {}: {}", provider, e);
                return WebhookOutcome::Rejected;
            }
        };

        let payment = match self.payments.find_by_out_trade_no(&note.out_trade_no).await {
            Ok(Some(payment)) => payment,
            Ok(None) => {
                warn!("Webhook for unknown out_trade_no: {}", note.out_trade_no);
                return WebhookOutcome::Rejected;
            }
            Err(e) => {
                error!("Webhook lookup failed: {}", e);
                return WebhookOutcome::Rejected;
            }
        };

        // 重复投递：已成功的支付直接应答，连流水也不再追加，避免渠道重试刷日志
        if payment.status == PaymentStatus::Succeeded {
            info!("Duplicate webhook for succeeded payment {}, ack only", payment.id);
            return WebhookOutcome::Acked;
        }

        let event_type = match provider {
            PayProvider::Alipay => PaymentEventType::Notify,
            PayProvider::Wechatpay => PaymentEventType::WechatNotify,
        };
        let mapped = map_trade_state(provider, &note.trade_state, payment.status);

        let result = if mapped == PaymentStatus::Succeeded && !payment.status.is_terminal() {
            self.transition_to_succeeded(
                &payment,
                note.transaction_id.clone(),
                note.paid_at,
                event_type,
                note.raw.clone(),
            )
            .await
        } else if mapped == PaymentStatus::Failed && !payment.status.is_terminal() {
            self.payments
                .mark_failed(
                    &payment.id,
                    &format!("渠道通知失败状态: {}", note.trade_state),
                    Some(NewPaymentEvent {
                        payment_id: payment.id.clone(),
                        order_id: payment.order_id.clone(),
                        event_type,
                        payload: note.raw.clone(),
                    }),
                )
                .await
        } else {
            // 中间状态或终态支付上的迟到通知：只留流水
            self.payments
                .append_event(&NewPaymentEvent {
                    payment_id: payment.id.clone(),
                    order_id: payment.order_id.clone(),
                    event_type,
                    payload: note.raw.clone(),
                })
                .await
        };

        match result {
            Ok(()) => WebhookOutcome::Acked,
            Err(e) => {
                error!("Webhook processing failed for payment {}: {}", payment.id, e);
                WebhookOutcome::Rejected
            }
        }
    }

    /// 回调未达时的主动查单兜底。终态直接返回缓存，否则查渠道并按映射表收敛，
    /// 成功转换与回调路径走同一条原子落库逻辑
    pub async fn query_payment_status(
        &self,
        payment_id: &str,
        caller_user_id: Option<i64>,
    ) -> ApiResult<PaymentStatusResponse> {
        let payment = self
            .payments
            .find_by_id(payment_id)
            .await?
            .ok_or_else(|| ApiError::NotFound(format!("支付单不存在: {payment_id}")))?;

        let order = self
            .orders
            .find_by_id(&payment.order_id)
            .await?
            .ok_or_else(|| ApiError::NotFound(format!("订单不存在: {}", payment.order_id)))?;

        if let Some(caller) = caller_user_id {
            if caller != order.user_id {
                return Err(ApiError::Forbidden("无权操作该订单".to_string()));
            }
        }

        if payment.status.is_terminal() {
            return Ok(status_response(&payment, payment.status));
        }

        let adapter = self.providers.get(payment.provider)?;
        let query = adapter.query_by_out_trade_no(&payment.out_trade_no).await?;
        let mapped = map_trade_state(payment.provider, &query.trade_state, payment.status);

        if mapped == PaymentStatus::Succeeded {
            self.transition_to_succeeded(
                &payment,
                query.transaction_id.clone(),
                query.paid_at,
                PaymentEventType::PaymentSuccess,
                query.raw.clone(),
            )
            .await?;

            let mut response = status_response(&payment, PaymentStatus::Succeeded);
            response.transaction_id = query.transaction_id;
            response.paid_at = Some(query.paid_at.unwrap_or_else(Utc::now));
            return Ok(response);
        }

        if mapped == PaymentStatus::Failed {
            self.payments
                .mark_failed(&payment.id, &format!("渠道查单失败状态: {}", query.trade_state), None)
                .await?;
            return Ok(status_response(&payment, PaymentStatus::Failed));
        }

        Ok(status_response(&payment, mapped))
    }

    pub async fn refund_payment(
        &self,
        payment_id: &str,
        request: RefundPaymentRequest,
        caller_user_id: Option<i64>,
    ) -> ApiResult<RefundPaymentResponse> {
        // 1. 校验支付单、订单与归属
        let payment = self
            .payments
            .find_by_id(payment_id)
            .await?
            .ok_or_else(|| ApiError::NotFound(format!("支付单不存在: {payment_id}")))?;

        let order = self
            .orders
            .find_by_id(&payment.order_id)
            .await?
            .ok_or_else(|| ApiError::NotFound(format!("订单不存在: {}", payment.order_id)))?;

        if let Some(caller) = caller_user_id {
            if caller != order.user_id {
                return Err(ApiError::Forbidden("无权操作该订单".to_string()));
            }
        }

        // 2. 仅成功或部分退款状态可退
        if !matches!(payment.status, PaymentStatus::Succeeded | PaymentStatus::PartialRefunded) {
            return Err(ApiError::NotRefundable(payment_id.to_string()));
        }

        let remaining = payment.refunds.remaining(payment.amount);
        if remaining <= AMOUNT_EPSILON {
            return Err(ApiError::AlreadyRefunded(payment_id.to_string()));
        }

        // 3. 默认退剩余全额；金额规整到两位小数再报渠道
        let requested = normalize_amount(request.amount.unwrap_or(remaining));
        if requested <= 0.0 {
            return Err(ApiError::Validation("退款金额必须大于0".to_string()));
        }
        if requested > remaining + AMOUNT_EPSILON {
            return Err(ApiError::ExceedsRemaining(format!(
                "申请 {requested:.2}, 可退 {remaining:.2}"
            )));
        }

        // 4. 渠道退款，失败以结果值上报
        let refund_request_no = format!("{}R{}", payment.out_trade_no, payment.refunds.history.len() + 1);
        let adapter = self.providers.get(payment.provider)?;
        let result = adapter
            .refund(&ProviderRefundRequest {
                out_trade_no: payment.out_trade_no.clone(),
                refund_request_no,
                payment_amount: payment.amount,
                refund_amount: requested,
                reason: request.reason.clone(),
            })
            .await?;

        // 5. 累计台账并原子落库
        let ledger = payment.refunds.with_entry(RefundEntry {
            amount: requested,
            reason: request.reason.clone(),
            time: Utc::now(),
            provider_refund_id: result.provider_refund_id.clone(),
        });
        let is_full = ledger.is_full(payment.amount);

        let (status, order_status) = if is_full {
            (PaymentStatus::Refunded, OrderPaymentStatus::Refunded)
        } else {
            (PaymentStatus::PartialRefunded, OrderPaymentStatus::PartialRefunded)
        };

        let refund_total = ledger.total;
        let update = RefundUpdate {
            payment_id: payment.id.clone(),
            order_id: order.id.clone(),
            ledger,
            payment_status: status,
            order_payment_status: order_status,
            refunded_at: is_full.then(Utc::now),
            event: NewPaymentEvent {
                payment_id: payment.id.clone(),
                order_id: order.id.clone(),
                event_type: PaymentEventType::Refund,
                payload: serde_json::json!({
                    "amount": requested,
                    "reason": request.reason,
                    "refund_total": refund_total,
                    "provider_refund_id": result.provider_refund_id,
                    "raw": result.raw,
                }),
            },
        };
        self.payments.apply_refund(&update).await?;

        self.realtime.broadcast_payment_updated(
            &order.id,
            order.user_id,
            serde_json::json!({ "payment_id": payment.id, "status": status, "refund_total": refund_total }),
        );

        Ok(RefundPaymentResponse {
            payment_id: payment.id,
            status,
            refund_total,
            full: is_full,
            provider_refund_id: result.provider_refund_id,
        })
    }

    /// 管理侧批量退款：逐单执行，单笔失败不中断，汇总每单结果
    pub async fn batch_refund(&self, request: BatchRefundRequest) -> BatchRefundResponse {
        let mut results = Vec::with_capacity(request.payment_ids.len());
        let mut succeeded = 0usize;

        for payment_id in &request.payment_ids {
            let item = match self
                .refund_payment(
                    payment_id,
                    RefundPaymentRequest { amount: None, reason: request.reason.clone() },
                    None,
                )
                .await
            {
                Ok(_) => {
                    succeeded += 1;
                    BatchRefundItem { payment_id: payment_id.clone(), success: true, message: None }
                }
                Err(e) => BatchRefundItem {
                    payment_id: payment_id.clone(),
                    success: false,
                    message: Some(e.to_string()),
                },
            };
            results.push(item);
        }

        BatchRefundResponse {
            total: request.payment_ids.len(),
            succeeded,
            failed: request.payment_ids.len() - succeeded,
            results,
        }
    }

    pub async fn payment_events(&self, payment_id: &str) -> ApiResult<Vec<crate::models::payment::PaymentEventRecord>> {
        self.payments.events_for_payment(payment_id).await
    }

    // 成功转换：支付单 + 订单 + 流水单事务落库，再触发尽力而为的通知与推送
    async fn transition_to_succeeded(
        &self,
        payment: &Payment,
        transaction_id: Option<String>,
        paid_at: Option<DateTime<Utc>>,
        event_type: PaymentEventType,
        raw: serde_json::Value,
    ) -> ApiResult<()> {
        let order = self
            .orders
            .find_by_id(&payment.order_id)
            .await?
            .ok_or_else(|| ApiError::NotFound(format!("订单不存在: {}", payment.order_id)))?;

        let paid_at = paid_at.unwrap_or_else(Utc::now);

        self.payments
            .mark_succeeded(&PaymentSuccessUpdate {
                payment_id: payment.id.clone(),
                order_id: order.id.clone(),
                transaction_id,
                paid_at,
                event: NewPaymentEvent {
                    payment_id: payment.id.clone(),
                    order_id: order.id.clone(),
                    event_type,
                    payload: raw,
                },
            })
            .await?;

        info!("Payment {} succeeded, order {} marked paid", payment.id, order.id);

        self.dispatch_order_paid(order.id.clone(), payment.id.clone());
        self.realtime.broadcast_payment_updated(
            &order.id,
            order.user_id,
            serde_json::json!({ "payment_id": payment.id, "status": PaymentStatus::Succeeded }),
        );

        Ok(())
    }

    // 通知失败只记日志，绝不回滚或阻塞支付转换
    fn dispatch_order_paid(&self, order_id: String, payment_id: String) {
        let notifier = self.notifier.clone();
        let payments = self.payments.clone();

        tokio::spawn(async move {
            match notifier.dispatch_order_paid(&order_id).await {
                Ok(()) => {
                    let _ = payments
                        .append_event(&NewPaymentEvent {
                            payment_id: payment_id.clone(),
                            order_id: order_id.clone(),
                            event_type: PaymentEventType::OrderPaidNotified,
                            payload: serde_json::json!({ "order_id": order_id }),
                        })
                        .await;
                }
                Err(e) => {
                    warn!("Order paid notification failed for {}: {}", order_id, e);
                }
            }
        });
    }
}

fn reused_response(payment: &Payment) -> CreatePaymentResponse {
    CreatePaymentResponse {
        payment_id: payment.id.clone(),
        out_trade_no: payment.out_trade_no.clone(),
        status: payment.status,
        artifact: payment.artifact.clone(),
        reused: true,
    }
}

fn status_response(payment: &Payment, status: PaymentStatus) -> PaymentStatusResponse {
    PaymentStatusResponse {
        payment_id: payment.id.clone(),
        status,
        transaction_id: payment.transaction_id.clone(),
        paid_at: payment.paid_at,
        refund_total: payment.refunds.total,
    }
}
