use sqlx::{mysql::MySqlPoolOptions, MySqlPool};

pub async fn create_pool(database_url: &str) -> anyhow::Result<MySqlPool> {
    let pool = MySqlPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await?;

    Ok(pool)
}

// 初始化数据库表
pub async fn init_db(pool: &MySqlPool) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS users (
            id BIGINT AUTO_INCREMENT PRIMARY KEY,
            phone VARCHAR(20) NOT NULL UNIQUE,
            nickname VARCHAR(64) NOT NULL,
            invite_code VARCHAR(16) NOT NULL UNIQUE,
            invited_by BIGINT,
            preferences JSON,
            created_at TIMESTAMP NOT NULL,
            INDEX idx_invited_by (invited_by)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS orders (
            id VARCHAR(64) PRIMARY KEY,
            order_no VARCHAR(32) NOT NULL UNIQUE,
            user_id BIGINT NOT NULL,
            status VARCHAR(20) NOT NULL,
            payment_status VARCHAR(20) NOT NULL,
            amount DOUBLE NOT NULL,
            currency VARCHAR(10) NOT NULL DEFAULT 'CNY',
            items JSON NOT NULL,
            address VARCHAR(500),
            remark VARCHAR(500),
            payment_id VARCHAR(64),
            paid_at TIMESTAMP NULL,
            created_at TIMESTAMP NOT NULL,
            updated_at TIMESTAMP NOT NULL,
            INDEX idx_user_id (user_id),
            INDEX idx_status (status)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS payments (
            id VARCHAR(64) PRIMARY KEY,
            order_id VARCHAR(64) NOT NULL,
            provider VARCHAR(20) NOT NULL,
            method VARCHAR(20) NOT NULL,
            status VARCHAR(20) NOT NULL,
            amount DOUBLE NOT NULL,
            currency VARCHAR(10) NOT NULL DEFAULT 'CNY',
            out_trade_no VARCHAR(64) NOT NULL UNIQUE,
            transaction_id VARCHAR(64),
            idempotency_key VARCHAR(64) UNIQUE,
            artifact JSON,
            refund_total DOUBLE NOT NULL DEFAULT 0,
            refund_history JSON,
            error_message VARCHAR(1000),
            paid_at TIMESTAMP NULL,
            refunded_at TIMESTAMP NULL,
            created_at TIMESTAMP NOT NULL,
            updated_at TIMESTAMP NOT NULL,
            INDEX idx_order_id (order_id),
            INDEX idx_status (status)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // 支付流水，只追加，原始报文留档
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS payment_events (
            id BIGINT AUTO_INCREMENT PRIMARY KEY,
            payment_id VARCHAR(64) NOT NULL,
            order_id VARCHAR(64) NOT NULL,
            event_type VARCHAR(32) NOT NULL,
            payload JSON,
            created_at TIMESTAMP NOT NULL,
            INDEX idx_payment_id (payment_id),
            INDEX idx_event_type (event_type)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS invite_records (
            id BIGINT AUTO_INCREMENT PRIMARY KEY,
            inviter_id BIGINT NOT NULL,
            invitee_id BIGINT NOT NULL UNIQUE,
            reward DOUBLE NOT NULL DEFAULT 0,
            created_at TIMESTAMP NOT NULL,
            INDEX idx_inviter_id (inviter_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
