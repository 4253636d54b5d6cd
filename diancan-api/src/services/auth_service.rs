use std::sync::Arc;

use rand::Rng;
use tracing::info;

use crate::cache::CodeStore;
use crate::error::{ApiError, ApiResult};
use crate::models::user::{LoginRequest, LoginResponse, SendCodeRequest};
use crate::repository::UserRepository;
use crate::services::invite_service::InviteService;
use crate::services::sms::SmsSender;
use crate::utils::jwt;

fn valid_phone(phone: &str) -> bool {
    phone.len() == 11 && phone.starts_with('1') && phone.chars().all(|c| c.is_ascii_digit())
}

pub struct AuthService {
    users: Arc<dyn UserRepository>,
    codes: Arc<dyn CodeStore>,
    sms: Arc<dyn SmsSender>,
    invites: Arc<InviteService>,
    jwt_secret: String,
    jwt_ttl_seconds: i64,
    code_ttl_seconds: u64,
    resend_interval_seconds: u64,
}

impl AuthService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        users: Arc<dyn UserRepository>,
        codes: Arc<dyn CodeStore>,
        sms: Arc<dyn SmsSender>,
        invites: Arc<InviteService>,
        jwt_secret: String,
        jwt_ttl_seconds: i64,
        code_ttl_seconds: u64,
        resend_interval_seconds: u64,
    ) -> Self {
        Self {
            users,
            codes,
            sms,
            invites,
            jwt_secret,
            jwt_ttl_seconds,
            code_ttl_seconds,
            resend_interval_seconds,
        }
    }

    pub async fn send_code(&self, request: SendCodeRequest) -> ApiResult<()> {
        if !valid_phone(&request.phone) {
            return Err(ApiError::Validation("手机号格式不正确".to_string()));
        }

        if !self
            .codes
            .try_throttle(&request.phone, self.resend_interval_seconds)
            .await?
        {
            return Err(ApiError::Validation("验证码发送过于频繁，请稍后再试".to_string()));
        }

        let code = format!("{:06}", rand::rng().random_range(0..1_000_000u32));
        self.codes
            .set_code(&request.phone, &code, self.code_ttl_seconds)
            .await?;

        self.sms
            .send_code(&request.phone, &code)
            .await
            .map_err(|e| ApiError::Internal(format!("短信发送失败: {e}")))?;

        Ok(())
    }

    pub async fn login(&self, request: LoginRequest) -> ApiResult<LoginResponse> {
        if !valid_phone(&request.phone) {
            return Err(ApiError::Validation("手机号格式不正确".to_string()));
        }

        // 验证码单次有效，校验通过即删除
        let stored = self
            .codes
            .get_code(&request.phone)
            .await?
            .ok_or_else(|| ApiError::Auth("验证码已过期或未发送".to_string()))?;

        if stored != request.code {
            return Err(ApiError::Auth("验证码错误".to_string()));
        }
        self.codes.delete_code(&request.phone).await?;

        let (user, is_new_user) = match self.users.find_by_phone(&request.phone).await? {
            Some(user) => (user, false),
            None => {
                let nickname = format!("用户{}", &request.phone[request.phone.len() - 4..]);
                let invite_code = self.invites.generate_code(&request.phone);
                let user = self.users.insert(&request.phone, &nickname, &invite_code).await?;
                info!("Registered new user {} for phone {}", user.id, request.phone);
                (user, true)
            }
        };

        // 新注册用户可在登录时带邀请码
        let user = if is_new_user {
            if let Some(code) = &request.invite_code {
                self.invites.redeem(user.id, code).await?;
                self.users
                    .find_by_id(user.id)
                    .await?
                    .ok_or_else(|| ApiError::Internal("用户不存在".to_string()))?
            } else {
                user
            }
        } else {
            user
        };

        let token = jwt::generate_token(user.id, self.jwt_secret.as_bytes(), self.jwt_ttl_seconds)
            .map_err(|e| ApiError::Internal(format!("令牌签发失败: {e}")))?;

        Ok(LoginResponse { token, user, is_new_user })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::user::{User, UserPreferences};
    use async_trait::async_trait;
    use chrono::Utc;
    use std::collections::HashMap;
    use std::sync::Mutex;

    struct MemoryCodeStore {
        codes: Mutex<HashMap<String, String>>,
        throttled: Mutex<HashMap<String, bool>>,
    }

    impl MemoryCodeStore {
        fn new() -> Self {
            Self {
                codes: Mutex::new(HashMap::new()),
                throttled: Mutex::new(HashMap::new()),
            }
        }
    }

    #[async_trait]
    impl CodeStore for MemoryCodeStore {
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

    struct MemoryUserRepo {
        users: Mutex<Vec<User>>,
    }

    impl MemoryUserRepo {
        fn new() -> Self {
            Self { users: Mutex::new(Vec::new()) }
        }
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
            Ok(self.users.lock().unwrap().iter().find(|u| u.invite_code == code).cloned())
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
            let mut users = self.users.lock().unwrap();
            if let Some(user) = users.iter_mut().find(|u| u.id == user_id) {
                user.preferences = prefs.clone();
            }
            Ok(())
        }

        async fn bind_inviter(&self, user_id: i64, inviter_id: i64, _reward: f64) -> ApiResult<()> {
            let mut users = self.users.lock().unwrap();
            if let Some(user) = users.iter_mut().find(|u| u.id == user_id) {
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

    fn auth_service() -> AuthService {
        let users: Arc<dyn UserRepository> = Arc::new(MemoryUserRepo::new());
        let invites = Arc::new(InviteService::new(users.clone()));
        AuthService::new(
            users,
            Arc::new(MemoryCodeStore::new()),
            Arc::new(crate::services::sms::LogSmsSender),
            invites,
            "test-secret".to_string(),
            3600,
            300,
            60,
        )
    }

    #[tokio::test]
    async fn test_send_code_rejects_bad_phone() {
        let svc = auth_service();
        let result = svc.send_code(SendCodeRequest { phone: "12345".to_string() }).await;
        assert!(matches!(result, Err(ApiError::Validation(_))));
    }

    #[tokio::test]
    async fn test_send_code_throttles_resend() {
        let svc = auth_service();
        svc.send_code(SendCodeRequest { phone: "13800138000".to_string() }).await.unwrap();

        let result = svc.send_code(SendCodeRequest { phone: "13800138000".to_string() }).await;
        assert!(matches!(result, Err(ApiError::Validation(_))));
    }

    #[tokio::test]
    async fn test_login_with_correct_code_registers_user() {
        let svc = auth_service();
        let phone = "13800138000".to_string();
        svc.codes.set_code(&phone, "123456", 300).await.unwrap();

        let response = svc
            .login(LoginRequest { phone: phone.clone(), code: "123456".to_string(), invite_code: None })
            .await
            .unwrap();

        assert!(response.is_new_user);
        assert!(!response.token.is_empty());
        assert_eq!(response.user.phone, phone);

        // 验证码单次有效
        let retry = svc
            .login(LoginRequest { phone, code: "123456".to_string(), invite_code: None })
            .await;
        assert!(matches!(retry, Err(ApiError::Auth(_))));
    }

    #[tokio::test]
    async fn test_login_rejects_wrong_code() {
        let svc = auth_service();
        let phone = "13800138000".to_string();
        svc.codes.set_code(&phone, "123456", 300).await.unwrap();

        let result = svc
            .login(LoginRequest { phone, code: "000000".to_string(), invite_code: None })
            .await;
        assert!(matches!(result, Err(ApiError::Auth(_))));
    }

    #[tokio::test]
    async fn test_login_with_invite_code_binds_inviter() {
        let svc = auth_service();

        // 先注册邀请人
        svc.codes.set_code("13800138000", "111111", 300).await.unwrap();
        let inviter = svc
            .login(LoginRequest {
                phone: "13800138000".to_string(),
                code: "111111".to_string(),
                invite_code: None,
            })
            .await
            .unwrap();

        // 新用户带邀请码注册
        svc.codes.set_code("13900139000", "222222", 300).await.unwrap();
        let invitee = svc
            .login(LoginRequest {
                phone: "13900139000".to_string(),
                code: "222222".to_string(),
                invite_code: Some(inviter.user.invite_code.clone()),
            })
            .await
            .unwrap();

        assert_eq!(invitee.user.invited_by, Some(inviter.user.id));
    }
}
