use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use chrono::{DateTime, Duration, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::constants::TOKEN_EXPIRY_SKEW_SECONDS;

/// Claims carried in the access token payload. Decoded client-side for route
/// guarding only; signature verification stays on the server.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct TokenClaims {
    #[serde(default)]
    pub sub: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub permissions: Vec<String>,
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(default)]
    pub exp: Option<i64>,
}

impl TokenClaims {
    #[must_use]
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.exp.and_then(|exp| DateTime::from_timestamp(exp, 0))
    }

    /// Whether the token is expired at `now`, with the standard skew applied.
    /// Tokens without an `exp` claim never expire locally.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at()
            .is_some_and(|expires_at| now + Duration::seconds(TOKEN_EXPIRY_SKEW_SECONDS) >= expires_at)
    }
}

/// Decodes the payload segment of a JWT without verifying its signature.
/// Returns `None` for anything that is not a well-formed token.
#[must_use]
pub fn decode_claims(token: &str) -> Option<TokenClaims> {
    let payload = token.split('.').nth(1)?;
    let bytes = URL_SAFE_NO_PAD.decode(payload).ok()?;
    serde_json::from_slice(&bytes).ok()
}

/// Checks decoded claims against route requirements: every listed permission
/// must be present, and at least one listed role must match. Empty
/// requirement lists always pass.
#[must_use]
pub fn validate_user_access(
    claims: &TokenClaims,
    required_permissions: &[String],
    required_roles: &[String],
) -> bool {
    let has_permissions = required_permissions
        .iter()
        .all(|permission| claims.permissions.contains(permission));
    let has_role = required_roles.is_empty()
        || required_roles.iter().any(|role| claims.roles.contains(role));
    has_permissions && has_role
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn encode_token(payload: serde_json::Value) -> String {
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
        let body = URL_SAFE_NO_PAD.encode(payload.to_string().as_bytes());
        format!("{header}.{body}.signature")
    }

    #[test]
    fn decodes_payload_claims() {
        let token = encode_token(json!({
            "email": "user@example.com",
            "permissions": ["metrics.list"],
            "roles": ["administrator"],
            "exp": 1_900_000_000u64,
        }));
        let claims = decode_claims(&token).expect("claims");
        assert_eq!(claims.email.as_deref(), Some("user@example.com"));
        assert_eq!(claims.permissions, vec!["metrics.list".to_string()]);
        assert!(claims.expires_at().is_some());
        assert!(!claims.is_expired(Utc::now()));
    }

    #[test]
    fn rejects_malformed_tokens() {
        assert!(decode_claims("").is_none());
        assert!(decode_claims("not-a-jwt").is_none());
        assert!(decode_claims("a.!!!.c").is_none());
        // Valid base64 but not a JSON object.
        let garbage = format!("h.{}.s", URL_SAFE_NO_PAD.encode(b"[1,2,3"));
        assert!(decode_claims(&garbage).is_none());
    }

    #[test]
    fn access_requires_all_permissions_and_any_role() {
        let claims = TokenClaims {
            permissions: vec!["users.list".into(), "users.create".into()],
            roles: vec!["editor".into()],
            ..TokenClaims::default()
        };
        assert!(validate_user_access(&claims, &[], &[]));
        assert!(validate_user_access(
            &claims,
            &["users.list".into()],
            &["editor".into(), "administrator".into()],
        ));
        assert!(!validate_user_access(&claims, &["metrics.list".into()], &[]));
        assert!(!validate_user_access(&claims, &[], &["administrator".into()]));
    }

    #[test]
    fn expired_token_is_detected() {
        let claims = TokenClaims {
            exp: Some(0),
            ..TokenClaims::default()
        };
        assert!(claims.is_expired(Utc::now()));
    }

    #[test]
    fn expiry_within_the_skew_window_counts_as_expired() {
        let now = Utc::now();
        let nearly = TokenClaims {
            exp: Some((now + Duration::seconds(TOKEN_EXPIRY_SKEW_SECONDS - 5)).timestamp()),
            ..TokenClaims::default()
        };
        assert!(nearly.is_expired(now));

        let comfortably = TokenClaims {
            exp: Some((now + Duration::seconds(TOKEN_EXPIRY_SKEW_SECONDS + 60)).timestamp()),
            ..TokenClaims::default()
        };
        assert!(!comfortably.is_expired(now));
    }
}
