//! JWT token creation.
//!
//! Issuance endpoints live outside this repository. The encoder exists for
//! tests and tooling that need valid tokens and is gated behind `test-util`.

use chrono::{Duration, Utc};
use jsonwebtoken::{EncodingKey, Header, encode};
use uuid::Uuid;

use rsvphub_core::config::AuthConfig;
use rsvphub_core::error::AppError;
use rsvphub_core::types::id::UserId;
use rsvphub_entity::user::UserRole;

use super::claims::{Claims, TokenType};

/// Creates signed JWT access and refresh tokens.
#[derive(Clone)]
pub struct JwtEncoder {
    encoding_key: EncodingKey,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl std::fmt::Debug for JwtEncoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtEncoder")
            .field("access_ttl", &self.access_ttl)
            .field("refresh_ttl", &self.refresh_ttl)
            .finish_non_exhaustive()
    }
}

/// Result of a successful token pair generation.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
}

impl JwtEncoder {
    /// Creates a new encoder from auth configuration.
    pub fn new(config: &AuthConfig) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(config.jwt_secret.as_bytes()),
            access_ttl: Duration::minutes(i64::try_from(config.access_ttl_minutes).unwrap_or(60)),
            refresh_ttl: Duration::days(i64::try_from(config.refresh_ttl_days).unwrap_or(7)),
        }
    }

    /// Generates a new access + refresh token pair for the given user.
    pub fn generate_token_pair(&self, user_id: UserId, role: UserRole) -> Result<TokenPair, AppError> {
        Ok(TokenPair {
            access_token: self.sign(user_id, role, TokenType::Access, self.access_ttl)?,
            refresh_token: self.sign(user_id, role, TokenType::Refresh, self.refresh_ttl)?,
            token_type: "bearer".to_string(),
        })
    }

    /// Generates a standalone access token.
    pub fn generate_access_token(&self, user_id: UserId, role: UserRole) -> Result<String, AppError> {
        self.sign(user_id, role, TokenType::Access, self.access_ttl)
    }

    /// Signs claims valid for `ttl` from now. A negative `ttl` yields an
    /// already-expired token.
    pub fn sign(
        &self,
        user_id: UserId,
        role: UserRole,
        token_type: TokenType,
        ttl: Duration,
    ) -> Result<String, AppError> {
        let now = Utc::now();
        let claims = Claims {
            sub: user_id,
            role,
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
            jti: Uuid::new_v4().to_string(),
            token_type,
        };
        encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|e| AppError::internal(format!("Failed to encode token: {e}")))
    }
}
