use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::SecurityError;
use tessera_core::config::JwtConfig;

/// Seconds before expiry at which the pipeline mints a replacement token.
pub const REFRESH_WINDOW_SECS: i64 = 10 * 60;

/// Access token payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub user_id: String,
    pub auth_token_id: String,
    #[serde(default)]
    pub is_admin: bool,
    #[serde(default)]
    pub roles: Vec<String>,
    pub exp: i64,
    pub iat: i64,
}

/// HS256 codec over the configured shared secret.
pub struct TokenCodec {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl_secs: u64,
}

impl TokenCodec {
    pub fn new(secret: &str, ttl_secs: u64) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl_secs,
        }
    }

    pub fn from_config(config: &JwtConfig) -> Self {
        Self::new(&config.secret, config.token_ttl_secs)
    }

    /// Mint a fresh token for the given identity.
    pub fn sign(
        &self,
        user_id: &str,
        auth_token_id: &str,
        is_admin: bool,
        roles: Vec<String>,
    ) -> Result<String, SecurityError> {
        let now = Utc::now().timestamp();
        self.sign_claims(&Claims {
            user_id: user_id.to_string(),
            auth_token_id: auth_token_id.to_string(),
            is_admin,
            roles,
            iat: now,
            exp: now + self.ttl_secs as i64,
        })
    }

    /// Encode pre-built claims (the caller controls `iat`/`exp`).
    pub fn sign_claims(&self, claims: &Claims) -> Result<String, SecurityError> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding)
            .map_err(|e| SecurityError::SignFailed(e.to_string()))
    }

    /// Validate a token and return its claims.
    pub fn verify(&self, token: &str) -> Result<Claims, SecurityError> {
        let validation = Validation::new(Algorithm::HS256);
        decode::<Claims>(token, &self.decoding, &validation)
            .map(|data| data.claims)
            .map_err(|e| {
                let err = match e.kind() {
                    jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
                        SecurityError::TokenExpired
                    }
                    _ => SecurityError::InvalidToken(e.to_string()),
                };
                warn!(error = %err, "token validation failed");
                err
            })
    }

    /// Obtain a replacement access token for near-expiry refresh.
    ///
    /// Re-mints over the same identity and `auth_token_id` with a fresh
    /// validity window; the caller keeps serving the request under the old
    /// (still valid) token.
    pub fn refresh(&self, claims: &Claims) -> Result<String, SecurityError> {
        self.sign(
            &claims.user_id,
            &claims.auth_token_id,
            claims.is_admin,
            claims.roles.clone(),
        )
    }

    /// Whether the token expires within `window_secs` from now.
    pub fn expires_within(claims: &Claims, window_secs: i64) -> bool {
        claims.exp - Utc::now().timestamp() < window_secs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn codec() -> TokenCodec {
        TokenCodec::new("test-secret", 7200)
    }

    #[test]
    fn sign_verify_round_trip() {
        let codec = codec();
        let token = codec
            .sign("u1", "tok-1", false, vec!["admin".to_string()])
            .unwrap();
        let claims = codec.verify(&token).unwrap();
        assert_eq!(claims.user_id, "u1");
        assert_eq!(claims.auth_token_id, "tok-1");
        assert_eq!(claims.roles, vec!["admin"]);
        assert!(!claims.is_admin);
        assert!(claims.exp > claims.iat);
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let token = codec().sign("u1", "tok-1", false, Vec::new()).unwrap();
        let other = TokenCodec::new("other-secret", 7200);
        assert!(matches!(
            other.verify(&token),
            Err(SecurityError::InvalidToken(_))
        ));
    }

    #[test]
    fn expired_token_is_reported_as_expired() {
        let codec = codec();
        let now = Utc::now().timestamp();
        // Past the default validation leeway.
        let token = codec
            .sign_claims(&Claims {
                user_id: "u1".to_string(),
                auth_token_id: "tok-1".to_string(),
                is_admin: false,
                roles: Vec::new(),
                iat: now - 7200,
                exp: now - 600,
            })
            .unwrap();
        assert!(matches!(codec.verify(&token), Err(SecurityError::TokenExpired)));
    }

    #[test]
    fn garbage_is_invalid() {
        assert!(matches!(
            codec().verify("not-a-token"),
            Err(SecurityError::InvalidToken(_))
        ));
    }

    #[test]
    fn refresh_keeps_identity_and_extends_expiry() {
        let codec = codec();
        let now = Utc::now().timestamp();
        let old = Claims {
            user_id: "u1".to_string(),
            auth_token_id: "tok-1".to_string(),
            is_admin: true,
            roles: vec!["admin".to_string()],
            iat: now - 7000,
            exp: now + 300,
        };
        assert!(TokenCodec::expires_within(&old, REFRESH_WINDOW_SECS));

        let refreshed = codec.refresh(&old).unwrap();
        let claims = codec.verify(&refreshed).unwrap();
        assert_eq!(claims.user_id, "u1");
        assert_eq!(claims.auth_token_id, "tok-1");
        assert!(claims.is_admin);
        assert!(claims.exp > old.exp);
        assert!(!TokenCodec::expires_within(&claims, REFRESH_WINDOW_SECS));
    }
}
