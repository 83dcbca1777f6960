//! HS256 access tokens carrying the user id and role.

use crate::models::Role;
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Claims embedded in every token.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Claims {
    /// Subject: the user's id.
    pub sub: Uuid,
    pub role: Role,
    /// Expiration time (UTC Unix timestamp).
    pub exp: i64,
    /// Issued-at time (UTC Unix timestamp).
    pub iat: i64,
}

#[derive(Debug, Clone)]
pub struct JwtConfig {
    /// HMAC-SHA256 secret used to sign and verify tokens.
    pub secret: String,
    /// Lifetime of tokens issued under `/users/*`.
    pub standard_expiry_hours: i64,
    /// Lifetime of tokens issued under `/auth/*`.
    pub short_expiry_hours: i64,
}

/// Which of the two configured lifetimes a token gets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenLifetime {
    Standard,
    Short,
}

impl JwtConfig {
    pub fn lifetime(&self, lifetime: TokenLifetime) -> Duration {
        match lifetime {
            TokenLifetime::Standard => Duration::hours(self.standard_expiry_hours),
            TokenLifetime::Short => Duration::hours(self.short_expiry_hours),
        }
    }
}

pub fn generate_token(
    user_id: Uuid,
    role: Role,
    lifetime: TokenLifetime,
    config: &JwtConfig,
) -> Result<String, jsonwebtoken::errors::Error> {
    let now = Utc::now();
    let claims = Claims {
        sub: user_id,
        role,
        exp: (now + config.lifetime(lifetime)).timestamp(),
        iat: now.timestamp(),
    };

    encode(
        &Header::default(), // HS256
        &claims,
        &EncodingKey::from_secret(config.secret.as_bytes()),
    )
}

/// Checks the signature and expiry and returns the claims.
pub fn validate_token(token: &str, config: &JwtConfig) -> Result<Claims, jsonwebtoken::errors::Error> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(config.secret.as_bytes()),
        &Validation::default(),
    )?;
    Ok(token_data.claims)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> JwtConfig {
        JwtConfig {
            secret: "test-secret-that-is-long-enough-for-hmac".to_string(),
            standard_expiry_hours: 168,
            short_expiry_hours: 24,
        }
    }

    #[test]
    fn issued_token_validates_with_its_lifetime() {
        let config = test_config();
        let user_id = Uuid::new_v4();

        let token = generate_token(user_id, Role::Admin, TokenLifetime::Standard, &config).unwrap();
        let claims = validate_token(&token, &config).unwrap();
        assert_eq!(claims.sub, user_id);
        assert_eq!(claims.role, Role::Admin);
        assert_eq!(claims.exp - claims.iat, 168 * 3600);

        let token = generate_token(user_id, Role::User, TokenLifetime::Short, &config).unwrap();
        let claims = validate_token(&token, &config).unwrap();
        assert_eq!(claims.exp - claims.iat, 24 * 3600);
    }

    #[test]
    fn expired_token_fails() {
        let config = test_config();
        // Well past the default 60-second leeway.
        let now = Utc::now().timestamp();
        let claims = Claims {
            sub: Uuid::new_v4(),
            role: Role::User,
            exp: now - 300,
            iat: now - 600,
        };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(config.secret.as_bytes()),
        )
        .unwrap();

        assert!(validate_token(&token, &config).is_err());
    }

    #[test]
    fn other_secret_fails() {
        let token = generate_token(Uuid::new_v4(), Role::User, TokenLifetime::Short, &test_config()).unwrap();
        let other = JwtConfig { secret: "secret-bravo".to_string(), ..test_config() };
        assert!(validate_token(&token, &other).is_err());
    }
}
