use thiserror::Error;

/// Failures surfaced by the authenticated client. An expired access token is
/// never surfaced directly: it is absorbed by the refresh-and-replay cycle or
/// converted into `RefreshFailed`.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The refresh endpoint rejected or errored; fanned out to every request
    /// queued behind the failed cycle.
    #[error("session refresh failed: {message}")]
    RefreshFailed {
        status: Option<u16>,
        message: String,
    },

    /// A 401 without the expiry code, surfaced in server contexts where the
    /// caller owns redirect and cookie-clearing policy.
    #[error("authentication token error")]
    AuthToken,

    /// A 401 without the expiry code, surfaced in live contexts after the
    /// session has been invalidated locally.
    #[error("unauthorized: {code}")]
    Unauthorized { code: String, message: String },

    /// No refresh token is available; treated exactly like a failed refresh.
    #[error("refresh token missing from credential store")]
    MissingRefreshToken,

    /// Transport-level failure, passed through unchanged and never retried.
    #[error("request failed: {0}")]
    Network(#[from] reqwest::Error),

    /// Non-success status on an endpoint that expects a typed body.
    #[error("server error {status}: {message}")]
    Status { status: u16, message: String },

    /// Response body did not match the expected shape.
    #[error("invalid response body: {0}")]
    Decode(#[from] serde_json::Error),

    /// The client was built with an unusable configuration.
    #[error("invalid configuration: {0}")]
    Configuration(String),
}

impl ApiError {
    pub fn is_auth_token_error(&self) -> bool {
        matches!(self, Self::AuthToken)
    }

    pub fn is_refresh_failure(&self) -> bool {
        matches!(self, Self::RefreshFailed { .. } | Self::MissingRefreshToken)
    }
}
