//! JWT token validation and revocation.

use std::sync::Arc;
use std::time::Duration;

use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use tracing::{debug, warn};

use rsvphub_cache::keys;
use rsvphub_core::config::AuthConfig;
use rsvphub_core::error::AppError;
use rsvphub_core::traits::CacheProvider;

use super::claims::{Claims, TokenType};

/// Shortest blocklist entry written on revocation.
const MIN_REVOCATION_TTL: Duration = Duration::from_secs(60);

/// Validates JWT tokens and checks the revocation blocklist.
#[derive(Clone)]
pub struct JwtDecoder {
    decoding_key: DecodingKey,
    validation: Validation,
    cache: Arc<dyn CacheProvider>,
}

impl std::fmt::Debug for JwtDecoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtDecoder")
            .field("validation", &self.validation)
            .finish_non_exhaustive()
    }
}

impl JwtDecoder {
    /// Creates a new decoder from auth configuration.
    pub fn new(config: &AuthConfig, cache: Arc<dyn CacheProvider>) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.leeway = 5;

        Self {
            decoding_key: DecodingKey::from_secret(config.jwt_secret.as_bytes()),
            validation,
            cache,
        }
    }

    /// Decodes and validates an access token string.
    ///
    /// Checks:
    /// 1. Signature validity
    /// 2. Expiration
    /// 3. Token type is Access
    /// 4. JTI not revoked
    pub async fn decode_access_token(&self, token: &str) -> Result<Claims, AppError> {
        self.decode_typed(token, TokenType::Access).await
    }

    /// Decodes and validates a refresh token string.
    #[cfg(any(test, feature = "test-util"))]
    pub async fn decode_refresh_token(&self, token: &str) -> Result<Claims, AppError> {
        self.decode_typed(token, TokenType::Refresh).await
    }

    /// Revoke a token for the rest of its lifetime.
    pub async fn revoke(&self, claims: &Claims) -> Result<(), AppError> {
        let ttl = Duration::from_secs(claims.remaining_ttl_seconds()).max(MIN_REVOCATION_TTL);
        self.cache
            .set(&keys::revoked_token(&claims.jti), "revoked", ttl)
            .await
            .map_err(|e| AppError::internal(format!("Failed to revoke token: {e}")))?;
        debug!(user_id = %claims.sub, jti = %claims.jti, "Token revoked");
        Ok(())
    }

    async fn decode_typed(&self, token: &str, expected: TokenType) -> Result<Claims, AppError> {
        let claims = self.decode_token(token)?;

        if claims.token_type != expected {
            return Err(AppError::authentication(match expected {
                TokenType::Access => "Invalid token type: expected access token",
                TokenType::Refresh => "Invalid token type: expected refresh token",
            }));
        }

        self.check_blocklist(&claims.jti).await?;
        Ok(claims)
    }

    fn decode_token(&self, token: &str) -> Result<Claims, AppError> {
        let token_data =
            decode::<Claims>(token, &self.decoding_key, &self.validation).map_err(|e| {
                match e.kind() {
                    jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
                        AppError::authentication("Token has expired")
                    }
                    jsonwebtoken::errors::ErrorKind::InvalidToken => {
                        AppError::authentication("Invalid token format")
                    }
                    jsonwebtoken::errors::ErrorKind::InvalidSignature => {
                        AppError::authentication("Invalid token signature")
                    }
                    _ => AppError::authentication(format!("Token validation failed: {e}")),
                }
            })?;

        Ok(token_data.claims)
    }

    /// Reject revoked tokens. An unreachable cache does not lock users out.
    async fn check_blocklist(&self, jti: &str) -> Result<(), AppError> {
        match self.cache.exists(&keys::revoked_token(jti)).await {
            Ok(true) => Err(AppError::authentication("Token has been revoked")),
            Ok(false) => Ok(()),
            Err(e) => {
                warn!(jti, error = %e, "Revocation check unavailable, accepting token");
                Ok(())
            }
        }
    }
}
