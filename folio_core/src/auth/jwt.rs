use crate::auth::models::{JwtClaims, User};
use crate::config::AuthConfig;
use crate::error::AppError;
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation};

pub struct JwtService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    token_expiry: Duration,
}

impl JwtService {
    pub fn new(secret: &str, expiry_hours: u64) -> Result<Self, AppError> {
        if secret.len() < 32 {
            return Err(AppError::BadRequest(
                "JWT secret must be at least 32 characters long".to_string(),
            ));
        }

        Ok(Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            token_expiry: Duration::hours(expiry_hours as i64),
        })
    }

    pub fn from_config(config: &AuthConfig) -> Result<Self, AppError> {
        Self::new(&config.jwt_secret, config.jwt_expiration_hours)
    }

    pub fn generate_token(&self, user: &User) -> Result<String, AppError> {
        let now = Utc::now();
        let claims = JwtClaims {
            sub: user.id.to_string(),
            username: user.username.clone(),
            role: user.role.clone(),
            exp: (now + self.token_expiry).timestamp() as usize,
            iat: now.timestamp() as usize,
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| AppError::Other(anyhow::anyhow!("Failed to generate token: {}", e)))
    }

    /// Any failure here is a bad credential, not a missing one.
    pub fn validate_token(&self, token: &str) -> Result<JwtClaims, AppError> {
        let validation = Validation::new(Algorithm::HS256);

        decode::<JwtClaims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => AppError::InvalidToken("Token has expired".to_string()),
                _ => AppError::InvalidToken(format!("Token validation failed: {}", e)),
            })
    }

    pub fn expiry_seconds(&self) -> i64 {
        self.token_expiry.num_seconds()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "d85735aadb9a3e089ae7a06f417ed32080376f24";

    fn user(role: &str) -> User {
        User {
            id: 1,
            username: "admin".to_string(),
            email: "admin@example.com".to_string(),
            password_hash: "hash".to_string(),
            role: role.to_string(),
            full_name: None,
            is_active: true,
            created_at: Utc::now(),
            last_login: None,
        }
    }

    #[test]
    fn test_rejects_short_secret() {
        assert!(JwtService::new("short", 24).is_err());
    }

    #[test]
    fn test_token_round_trip() {
        let jwt = JwtService::new(SECRET, 24).unwrap();
        let token = jwt.generate_token(&user("admin")).unwrap();

        let claims = jwt.validate_token(&token).unwrap();
        assert_eq!(claims.user_id(), Some(1));
        assert_eq!(claims.username, "admin");
        assert_eq!(claims.role, "admin");
        assert_eq!(claims.exp - claims.iat, 24 * 3600);
        assert_eq!(jwt.expiry_seconds(), 24 * 3600);
    }

    #[test]
    fn test_foreign_signature_is_invalid_token() {
        let issuer = JwtService::new(SECRET, 24).unwrap();
        let other = JwtService::new("another-secret-that-is-long-enough-123", 24).unwrap();
        let token = issuer.generate_token(&user("editor")).unwrap();

        assert!(matches!(other.validate_token(&token), Err(AppError::InvalidToken(_))));
        assert!(matches!(issuer.validate_token("garbage"), Err(AppError::InvalidToken(_))));
    }

    #[test]
    fn test_expired_token_is_invalid() {
        let jwt = JwtService::new(SECRET, 24).unwrap();
        let past = Utc::now() - Duration::hours(2);
        let claims = JwtClaims {
            sub: "1".to_string(),
            username: "admin".to_string(),
            role: "admin".to_string(),
            exp: past.timestamp() as usize,
            iat: (past - Duration::hours(1)).timestamp() as usize,
        };
        let token = encode(&Header::new(Algorithm::HS256), &claims, &EncodingKey::from_secret(SECRET.as_bytes())).unwrap();

        match jwt.validate_token(&token) {
            Err(AppError::InvalidToken(msg)) => assert!(msg.contains("expired")),
            other => panic!("expected expired token, got {:?}", other.map(|c| c.sub)),
        }
    }
}
