use std::sync::Arc;

use sha2::{Digest, Sha256};
use tracing::info;

use crate::error::{ApiError, ApiResult};
use crate::models::user::InviteStats;
use crate::repository::UserRepository;

/// 邀请奖励（元/人）
const INVITE_REWARD: f64 = 5.0;

const CODE_CHARSET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
const CODE_LEN: usize = 6;

pub struct InviteService {
    users: Arc<dyn UserRepository>,
}

impl InviteService {
    pub fn new(users: Arc<dyn UserRepository>) -> Self {
        Self { users }
    }

    /// 从手机号确定性派生邀请码，去掉易混淆字符
    pub fn generate_code(&self, seed: &str) -> String {
        let digest = Sha256::digest(seed.as_bytes());
        digest
            .iter()
            .take(CODE_LEN)
            .map(|b| CODE_CHARSET[*b as usize % CODE_CHARSET.len()] as char)
            .collect()
    }

    pub async fn redeem(&self, user_id: i64, code: &str) -> ApiResult<()> {
        let inviter = self
            .users
            .find_by_invite_code(code)
            .await?
            .ok_or_else(|| ApiError::NotFound(format!("邀请码无效: {code}")))?;

        if inviter.id == user_id {
            return Err(ApiError::Validation("不能使用自己的邀请码".to_string()));
        }

        let user = self
            .users
            .find_by_id(user_id)
            .await?
            .ok_or_else(|| ApiError::NotFound("用户不存在".to_string()))?;

        if user.invited_by.is_some() {
            return Err(ApiError::Conflict("已绑定过邀请关系".to_string()));
        }

        self.users.bind_inviter(user_id, inviter.id, INVITE_REWARD).await?;
        info!("User {} redeemed invite code of user {}", user_id, inviter.id);

        Ok(())
    }

    pub async fn stats(&self, user_id: i64) -> ApiResult<InviteStats> {
        let user = self
            .users
            .find_by_id(user_id)
            .await?
            .ok_or_else(|| ApiError::NotFound("用户不存在".to_string()))?;

        let (invitee_count, reward_total) = self.users.invite_stats(user_id).await?;

        Ok(InviteStats {
            invite_code: user.invite_code,
            invitee_count,
            reward_total,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NoopRepo;

    #[async_trait::async_trait]
    impl UserRepository for NoopRepo {
        async fn find_by_id(&self, _id: i64) -> ApiResult<Option<crate::models::user::User>> {
            Ok(None)
        }
        async fn find_by_phone(&self, _phone: &str) -> ApiResult<Option<crate::models::user::User>> {
            Ok(None)
        }
        async fn find_by_invite_code(&self, _code: &str) -> ApiResult<Option<crate::models::user::User>> {
            Ok(None)
        }
        async fn insert(&self, _phone: &str, _nickname: &str, _invite_code: &str) -> ApiResult<crate::models::user::User> {
            Err(ApiError::Internal("noop".to_string()))
        }
        async fn update_preferences(&self, _user_id: i64, _prefs: &crate::models::user::UserPreferences) -> ApiResult<()> {
            Ok(())
        }
        async fn bind_inviter(&self, _user_id: i64, _inviter_id: i64, _reward: f64) -> ApiResult<()> {
            Ok(())
        }
        async fn invite_stats(&self, _inviter_id: i64) -> ApiResult<(i64, f64)> {
            Ok((0, 0.0))
        }
    }

    #[test]
    fn test_generate_code_deterministic() {
        let svc = InviteService::new(Arc::new(NoopRepo));
        let a = svc.generate_code("13800138000");
        let b = svc.generate_code("13800138000");
        let c = svc.generate_code("13900139000");

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), CODE_LEN);
        // 不含易混淆字符
        assert!(!a.contains('O') && !a.contains('0') && !a.contains('I') && !a.contains('1'));
    }

    #[tokio::test]
    async fn test_redeem_unknown_code() {
        let svc = InviteService::new(Arc::new(NoopRepo));
        let result = svc.redeem(1, "ABCDEF").await;
        assert!(matches!(result, Err(ApiError::NotFound(_))));
    }
}
