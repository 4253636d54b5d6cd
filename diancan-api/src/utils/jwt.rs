use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: String,    // 用户 ID
    pub exp: usize,     // 过期时间
    pub iat: usize,     // 签发时间
}

impl Claims {
    pub fn user_id(&self) -> Option<i64> {
        self.sub.parse().ok()
    }
}

pub fn generate_token(user_id: i64, secret: &[u8], expiration: i64) -> Result<String, jsonwebtoken::errors::Error> {
    let now = Utc::now();
    let expires_at = now + Duration::seconds(expiration);

    let claims = Claims {
        sub: user_id.to_string(),
        exp: expires_at.timestamp() as usize,
        iat: now.timestamp() as usize,
    };

    encode(&Header::default(), &claims, &EncodingKey::from_secret(secret))
}

pub fn verify_token(token: &str, secret: &[u8]) -> Result<Claims, jsonwebtoken::errors::Error> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret),
        &Validation::default(),
    )?;

    Ok(token_data.claims)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_roundtrip() {
        let secret = b"test-secret";
        let token = generate_token(42, secret, 3600).unwrap();

        let claims = verify_token(&token, secret).unwrap();
        assert_eq!(claims.user_id(), Some(42));
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let token = generate_token(42, b"secret-a", 3600).unwrap();
        assert!(verify_token(&token, b"secret-b").is_err());
    }

    #[test]
    fn test_expired_token_rejected() {
        let token = generate_token(42, b"secret", -60).unwrap();
        assert!(verify_token(&token, b"secret").is_err());
    }
}
