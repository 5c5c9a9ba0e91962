use anyhow::Result;
use chrono::{Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: String, // session owner
    pub exp: usize,
    pub jti: String,
}

/// Issues an HS256 session token for `subject`, valid for `ttl_hours`.
pub fn create_session_token(subject: &str, secret: &str, ttl_hours: i64) -> Result<String> {
    let expiration = Utc::now()
        .checked_add_signed(Duration::hours(ttl_hours))
        .ok_or_else(|| anyhow::anyhow!("session lifetime out of range"))?
        .timestamp();

    let claims = Claims {
        sub: subject.to_owned(),
        exp: expiration as usize,
        jti: uuid::Uuid::new_v4().to_string(),
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_ref()),
    )?;

    Ok(token)
}

pub fn validate_session_token(token: &str, secret: &str) -> Result<Claims> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_ref()),
        &Validation::default(),
    )?;

    Ok(token_data.claims)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_token_cycle() {
        let secret = "test_secret";
        let token = create_session_token("editor_1", secret, 24).unwrap();
        let claims = validate_session_token(&token, secret).unwrap();
        assert_eq!(claims.sub, "editor_1");
        assert!(!claims.jti.is_empty());
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let token = create_session_token("editor_1", "one", 24).unwrap();
        assert!(validate_session_token(&token, "two").is_err());
    }

    #[test]
    fn test_expired_token_rejected() {
        let token = create_session_token("editor_1", "secret", -2).unwrap();
        assert!(validate_session_token(&token, "secret").is_err());
    }
}
