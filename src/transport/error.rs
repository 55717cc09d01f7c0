use crate::auth::AuthError;
use crate::query_ids::QueryIdNotFound;

/// Failures surfaced by [`super::RateLimitedTransport`].
///
/// Retryable conditions (429, network errors, 5xx, a single 404) are handled
/// inside the transport and only show up here once their budget is spent.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ApiError {
    #[error("rate limited by upstream, gave up after {attempts} retries")]
    RateLimitExceeded { attempts: u32 },

    #[error(transparent)]
    QueryIdNotFound(#[from] QueryIdNotFound),

    #[error("credentials rejected: {0}")]
    CredentialsExpired(String),

    #[error("upstream refused {operation} (HTTP 403)")]
    Forbidden { operation: String },

    #[error("network failure for {operation} after {attempts} retries: {message}")]
    TransientNetwork {
        operation: String,
        attempts: u32,
        message: String,
    },

    #[error("{operation} still returns 404 after refreshing its identifier")]
    StaleQueryId { operation: String },

    #[error("HTTP {status} for {operation}")]
    Http { operation: String, status: u16 },

    #[error("invalid response for {operation}: {reason}")]
    InvalidResponse { operation: String, reason: String },

    #[error("invalid request URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::CredentialsExpired(msg) => ApiError::CredentialsExpired(msg),
        }
    }
}

impl ApiError {
    /// Account-level failures that must stop every loop, not just the
    /// current request.
    pub fn halts_run(&self) -> bool {
        matches!(
            self,
            ApiError::Forbidden { .. } | ApiError::CredentialsExpired(_)
        )
    }

    /// Whether a later run may succeed without outside intervention.
    pub fn is_retryable_later(&self) -> bool {
        matches!(
            self,
            ApiError::RateLimitExceeded { .. }
                | ApiError::TransientNetwork { .. }
                | ApiError::StaleQueryId { .. }
                | ApiError::QueryIdNotFound(_)
        )
    }
}
