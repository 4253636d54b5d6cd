use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::http::StatusCode;
use axum::response::IntoResponse;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use diancan_api::app_state::AppState;
use diancan_api::cache::{init_redis, RedisCodeStore};
use diancan_api::config::AppSettings;
use diancan_api::providers::alipay::AlipayProvider;
use diancan_api::providers::wechat::WechatPayProvider;
use diancan_api::providers::ProviderRegistry;
use diancan_api::repository::{
    MySqlOrderRepository, MySqlPaymentRepository, MySqlUserRepository, OrderRepository,
    PaymentRepository, UserRepository,
};
use diancan_api::services::auth_service::AuthService;
use diancan_api::services::invite_service::InviteService;
use diancan_api::services::notify::HttpNotificationDispatcher;
use diancan_api::services::order_service::OrderService;
use diancan_api::services::payment_service::PaymentsService;
use diancan_api::services::realtime::RealtimeBroadcaster;
use diancan_api::services::sms::LogSmsSender;
use diancan_api::{db, handlers};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // 设置日志
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "diancan_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // 加载配置
    let settings = Arc::new(AppSettings::from_env());
    let provider_timeout = Duration::from_secs(settings.provider_timeout_seconds);

    // 初始化数据库连接池
    let pool = db::create_pool(&settings.database_url).await?;
    db::init_db(&pool).await?;

    // 初始化 Redis
    let redis = init_redis(&settings.redis_url).await?;

    // 仓储
    let orders: Arc<dyn OrderRepository> = Arc::new(MySqlOrderRepository::new(pool.clone()));
    let payments_repo: Arc<dyn PaymentRepository> = Arc::new(MySqlPaymentRepository::new(pool.clone()));
    let users: Arc<dyn UserRepository> = Arc::new(MySqlUserRepository::new(pool.clone()));

    // 渠道适配器
    let registry = Arc::new(
        ProviderRegistry::new()
            .register(Arc::new(AlipayProvider::new(
                &settings.alipay,
                settings.alipay_notify_url(),
                settings.return_url.clone(),
                provider_timeout,
            )))
            .register(Arc::new(WechatPayProvider::new(
                &settings.wechat,
                settings.wechat_notify_url(),
                provider_timeout,
            ))),
    );

    // 服务装配
    let realtime = Arc::new(RealtimeBroadcaster::new(256));
    let notifier = Arc::new(HttpNotificationDispatcher::new(
        settings.order_paid_callback_url.clone(),
        provider_timeout,
    ));

    let payments = Arc::new(PaymentsService::new(
        orders.clone(),
        payments_repo,
        registry,
        notifier,
        realtime.clone(),
    ));

    let invites = Arc::new(InviteService::new(users.clone()));
    let auth = Arc::new(AuthService::new(
        users.clone(),
        Arc::new(RedisCodeStore::new(redis)),
        Arc::new(LogSmsSender),
        invites.clone(),
        settings.jwt_secret.clone(),
        settings.jwt_ttl_seconds,
        settings.sms_code_ttl_seconds,
        settings.sms_resend_interval_seconds,
    ));
    let order_service = Arc::new(OrderService::new(orders, realtime.clone()));

    let state = AppState {
        settings: settings.clone(),
        payments,
        orders: order_service,
        auth,
        invites,
        users,
        realtime,
    };

    // 构建路由
    let app = handlers::router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .fallback(handler_404);

    let addr = SocketAddr::from(([0, 0, 0, 0], settings.server_port));
    tracing::info!("diancan-api listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service()).await?;

    Ok(())
}

async fn handler_404() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, "nothing to see here")
}
