use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

/// Unified error type for the connections-auth service.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    // ── Auth Errors ─────────────────────────────────────────────────────
    #[error("Authentication required")]
    Unauthorized,

    /// Credentials were rejected. The message is deliberately generic.
    #[error("Authentication failed")]
    CredentialsSignin,

    #[error("Invalid token: {0}")]
    InvalidToken(String),

    #[error("Token expired")]
    TokenExpired,

    #[error("Invalid state parameter")]
    InvalidState,

    // ── Request Errors ──────────────────────────────────────────────────
    #[error("{0} not found")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    // ── Provider Errors ─────────────────────────────────────────────────
    #[error("OAuth provider error: {0}")]
    ProviderError(String),

    #[error("Provider {0} not found")]
    ProviderNotFound(String),

    #[error("OAuth flow error: {0}")]
    FlowError(String),

    // ── Account linking ─────────────────────────────────────────────────
    #[error("Account linking failed: {0}")]
    Linking(String),

    // ── Internal ────────────────────────────────────────────────────────
    #[error("Crypto error: {0}")]
    CryptoError(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AuthError {
    /// Short machine-readable code, also used as the `error` query value
    /// on sign-in page redirects.
    pub fn code(&self) -> &'static str {
        match self {
            AuthError::Unauthorized => "unauthorized",
            AuthError::CredentialsSignin => "credentials_signin",
            AuthError::InvalidToken(_) => "invalid_token",
            AuthError::TokenExpired => "token_expired",
            AuthError::InvalidState => "invalid_state",
            AuthError::NotFound(_) => "not_found",
            AuthError::BadRequest(_) => "bad_request",
            AuthError::ProviderError(_) => "provider_error",
            AuthError::ProviderNotFound(_) => "provider_not_found",
            AuthError::FlowError(_) => "oauth_callback",
            AuthError::Linking(_) => "account_link_failed",
            AuthError::CryptoError(_) => "crypto_error",
            AuthError::Internal(_) => "internal_error",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            AuthError::Unauthorized
            | AuthError::CredentialsSignin
            | AuthError::InvalidToken(_)
            | AuthError::TokenExpired => StatusCode::UNAUTHORIZED,
            AuthError::InvalidState | AuthError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AuthError::NotFound(_) | AuthError::ProviderNotFound(_) => StatusCode::NOT_FOUND,
            AuthError::ProviderError(_) | AuthError::FlowError(_) | AuthError::Linking(_) => {
                StatusCode::BAD_GATEWAY
            }
            AuthError::CryptoError(_) | AuthError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl From<jsonwebtoken::errors::Error> for AuthError {
    fn from(e: jsonwebtoken::errors::Error) -> Self {
        match e.kind() {
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::TokenExpired,
            _ => AuthError::InvalidToken(e.to_string()),
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status();

        // Internal details stay in the logs.
        let message = match &self {
            AuthError::CryptoError(_) | AuthError::Internal(_) => {
                tracing::error!("{self}");
                "Internal error".to_string()
            }
            _ => self.to_string(),
        };

        let body = json!({
            "error": {
                "code": self.code(),
                "message": message,
            }
        });

        (status, axum::Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credentials_denial_is_generic() {
        let err = AuthError::CredentialsSignin;
        assert_eq!(err.to_string(), "Authentication failed");
        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn expired_jwt_maps_to_token_expired() {
        let err: AuthError =
            jsonwebtoken::errors::Error::from(jsonwebtoken::errors::ErrorKind::ExpiredSignature)
                .into();
        assert!(matches!(err, AuthError::TokenExpired));
    }
}
