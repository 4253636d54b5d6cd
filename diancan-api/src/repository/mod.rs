pub mod order_repo;
pub mod payment_repo;
pub mod user_repo;

pub use order_repo::{MySqlOrderRepository, OrderRepository};
pub use payment_repo::{MySqlPaymentRepository, PaymentRepository, PaymentSuccessUpdate, RefundUpdate};
pub use user_repo::{MySqlUserRepository, UserRepository};
