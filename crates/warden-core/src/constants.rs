/// Credential store key for the access token.
pub const TOKEN_KEY: &str = "warden.token";
/// Credential store key for the refresh token.
pub const REFRESH_TOKEN_KEY: &str = "warden.refreshToken";

/// Failure code the server attaches to a 401 caused by an expired access token.
pub const TOKEN_EXPIRED_CODE: &str = "token.expired";

/// Leeway applied when judging a token's expiry locally: a token within this
/// many seconds of expiring is treated as already expired, absorbing clock
/// drift and request latency.
pub const TOKEN_EXPIRY_SKEW_SECONDS: i64 = 30;

pub const SESSIONS_PATH: &str = "/sessions";
pub const REFRESH_PATH: &str = "/refresh";
pub const ME_PATH: &str = "/me";

/// Route of the unauthenticated entry point.
pub const ENTRY_PATH: &str = "/";
/// Route users land on when authenticated but lacking a required claim.
pub const DEFAULT_AUTHENTICATED_PATH: &str = "/dashboard";

/// How long persisted credentials live in the store (30 days).
pub const SESSION_MAX_AGE_SECONDS: u64 = 60 * 60 * 24 * 30;
pub const COOKIE_PATH: &str = "/";
