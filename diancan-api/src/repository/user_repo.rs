use async_trait::async_trait;
use chrono::Utc;
use sqlx::{MySqlPool, Row};

use crate::error::{ApiError, ApiResult};
use crate::models::user::{User, UserPreferences};

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn find_by_id(&self, id: i64) -> ApiResult<Option<User>>;
    async fn find_by_phone(&self, phone: &str) -> ApiResult<Option<User>>;
    async fn find_by_invite_code(&self, code: &str) -> ApiResult<Option<User>>;
    async fn insert(&self, phone: &str, nickname: &str, invite_code: &str) -> ApiResult<User>;
    async fn update_preferences(&self, user_id: i64, prefs: &UserPreferences) -> ApiResult<()>;
    /// 绑定邀请关系并记一笔奖励，同一事务
    async fn bind_inviter(&self, user_id: i64, inviter_id: i64, reward: f64) -> ApiResult<()>;
    async fn invite_stats(&self, inviter_id: i64) -> ApiResult<(i64, f64)>;
}

pub struct MySqlUserRepository {
    pool: MySqlPool,
}

impl MySqlUserRepository {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

fn row_to_user(row: &sqlx::mysql::MySqlRow) -> ApiResult<User> {
    let preferences = row
        .try_get::<Option<String>, _>("preferences")?
        .map(|s| serde_json::from_str(&s))
        .transpose()
        .map_err(|e| ApiError::Internal(format!("用户偏好反序列化失败: {e}")))?
        .unwrap_or_default();

    Ok(User {
        id: row.try_get("id")?,
        phone: row.try_get("phone")?,
        nickname: row.try_get("nickname")?,
        invite_code: row.try_get("invite_code")?,
        invited_by: row.try_get("invited_by")?,
        preferences,
        created_at: row.try_get("created_at")?,
    })
}

#[async_trait]
impl UserRepository for MySqlUserRepository {
    async fn find_by_id(&self, id: i64) -> ApiResult<Option<User>> {
        let row = sqlx::query("SELECT * FROM users WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_user).transpose()
    }

    async fn find_by_phone(&self, phone: &str) -> ApiResult<Option<User>> {
        let row = sqlx::query("SELECT * FROM users WHERE phone = ?")
            .bind(phone)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_user).transpose()
    }

    async fn find_by_invite_code(&self, code: &str) -> ApiResult<Option<User>> {
        let row = sqlx::query("SELECT * FROM users WHERE invite_code = ?")
            .bind(code)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_user).transpose()
    }

    async fn insert(&self, phone: &str, nickname: &str, invite_code: &str) -> ApiResult<User> {
        let now = Utc::now();
        let preferences = UserPreferences::default();
        let prefs_json = serde_json::to_string(&preferences)
            .map_err(|e| ApiError::Internal(e.to_string()))?;

        let result = sqlx::query(
            r#"
            INSERT INTO users (phone, nickname, invite_code, invited_by, preferences, created_at)
            VALUES (?, ?, ?, NULL, ?, ?)
            "#,
        )
        .bind(phone)
        .bind(nickname)
        .bind(invite_code)
        .bind(prefs_json)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(User {
            id: result.last_insert_id() as i64,
            phone: phone.to_string(),
            nickname: nickname.to_string(),
            invite_code: invite_code.to_string(),
            invited_by: None,
            preferences,
            created_at: now,
        })
    }

    async fn update_preferences(&self, user_id: i64, prefs: &UserPreferences) -> ApiResult<()> {
        let prefs_json = serde_json::to_string(prefs)
            .map_err(|e| ApiError::Internal(e.to_string()))?;

        sqlx::query("UPDATE users SET preferences = ? WHERE id = ?")
            .bind(prefs_json)
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn bind_inviter(&self, user_id: i64, inviter_id: i64, reward: f64) -> ApiResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("UPDATE users SET invited_by = ? WHERE id = ? AND invited_by IS NULL")
            .bind(inviter_id)
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            "INSERT INTO invite_records (inviter_id, invitee_id, reward, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(inviter_id)
        .bind(user_id)
        .bind(reward)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn invite_stats(&self, inviter_id: i64) -> ApiResult<(i64, f64)> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS cnt, COALESCE(SUM(reward), 0) AS reward_total FROM invite_records WHERE inviter_id = ?",
        )
        .bind(inviter_id)
        .fetch_one(&self.pool)
        .await?;

        let count: i64 = row.try_get("cnt")?;
        let reward_total: f64 = row.try_get("reward_total")?;

        Ok((count, reward_total))
    }
}
