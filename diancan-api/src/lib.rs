pub mod app_state;
pub mod cache;
pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod providers;
pub mod repository;
pub mod services;
pub mod utils;

pub use app_state::AppState;
pub use error::{ApiError, ApiResult};
