use tessera_core::AppError;

/// Token handling errors.
///
/// The pipeline never leaks parsing detail to clients; every variant
/// surfaces as the same `Unauthorized` envelope with "token invalid".
#[derive(Debug)]
pub enum SecurityError {
    /// The token is malformed or its signature does not verify.
    InvalidToken(String),
    /// The token's `exp` claim is in the past.
    TokenExpired,
    /// Minting a token failed.
    SignFailed(String),
}

impl std::fmt::Display for SecurityError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SecurityError::InvalidToken(msg) => write!(f, "invalid token: {msg}"),
            SecurityError::TokenExpired => write!(f, "token expired"),
            SecurityError::SignFailed(msg) => write!(f, "token signing failed: {msg}"),
        }
    }
}

impl std::error::Error for SecurityError {}

impl SecurityError {
    /// The message clients see.
    pub fn public_message(&self) -> &'static str {
        "token invalid"
    }
}

impl From<SecurityError> for AppError {
    fn from(err: SecurityError) -> Self {
        match err {
            SecurityError::SignFailed(msg) => AppError::internal(msg),
            other => AppError::unauthorized(other.public_message()),
        }
    }
}
