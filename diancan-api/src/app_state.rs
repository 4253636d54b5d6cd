use std::sync::Arc;

use crate::config::AppSettings;
use crate::repository::UserRepository;
use crate::services::auth_service::AuthService;
use crate::services::invite_service::InviteService;
use crate::services::order_service::OrderService;
use crate::services::payment_service::PaymentsService;
use crate::services::realtime::RealtimeBroadcaster;

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<AppSettings>,
    pub payments: Arc<PaymentsService>,
    pub orders: Arc<OrderService>,
    pub auth: Arc<AuthService>,
    pub invites: Arc<InviteService>,
    pub users: Arc<dyn UserRepository>,
    pub realtime: Arc<RealtimeBroadcaster>,
}
