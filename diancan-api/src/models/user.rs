use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 用户偏好，users 表上的 JSON 列，结构化读写
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserPreferences {
    /// 饮食忌口，如 "no_cilantro" / "vegetarian"
    pub dietary: Vec<String>,
    /// 辣度 0-5
    pub spice_level: u8,
    pub default_address: Option<String>,
    pub notify_promotions: bool,
}

impl Default for UserPreferences {
    fn default() -> Self {
        Self {
            dietary: Vec::new(),
            spice_level: 0,
            default_address: None,
            notify_promotions: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub phone: String,
    pub nickname: String,
    pub invite_code: String,
    pub invited_by: Option<i64>,
    pub preferences: UserPreferences,
    pub created_at: DateTime<Utc>,
}

// ---- 请求/响应 DTO ----

#[derive(Debug, Clone, Deserialize)]
pub struct SendCodeRequest {
    pub phone: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginRequest {
    pub phone: String,
    pub code: String,
    /// 新用户注册时可携带邀请码
    pub invite_code: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub user: User,
    pub is_new_user: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RedeemInviteRequest {
    pub invite_code: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct InviteStats {
    pub invite_code: String,
    pub invitee_count: i64,
    pub reward_total: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preferences_default() {
        let prefs = UserPreferences::default();
        assert!(prefs.dietary.is_empty());
        assert_eq!(prefs.spice_level, 0);
        assert!(prefs.notify_promotions);
    }

    #[test]
    fn test_preferences_partial_json() {
        // 缺省字段走默认值，老客户端提交的半结构也能读
        let prefs: UserPreferences = serde_json::from_str(r#"{"spice_level": 3}"#).unwrap();
        assert_eq!(prefs.spice_level, 3);
        assert!(prefs.dietary.is_empty());
    }
}
