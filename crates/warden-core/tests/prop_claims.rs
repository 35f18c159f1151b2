use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use proptest::prelude::*;
use warden_core::{decode_claims, validate_user_access, TokenClaims};

proptest! {
    // Whatever arrives in the token string, decoding must never panic and
    // must only succeed on structurally valid payloads.
    #[test]
    fn decode_never_panics(token in ".{0,256}") {
        let _ = decode_claims(&token);
    }

    #[test]
    fn decode_roundtrips_json_payloads(
        email in "[a-z]{1,12}@[a-z]{1,8}\\.com",
        permissions in proptest::collection::vec("[a-z.]{1,16}", 0..4),
    ) {
        let payload =
            serde_json::json!({ "email": email.clone(), "permissions": permissions.clone() });
        let token = format!(
            "h.{}.s",
            URL_SAFE_NO_PAD.encode(payload.to_string().as_bytes())
        );
        let claims = decode_claims(&token).expect("valid payload must decode");
        prop_assert_eq!(claims.email.as_deref(), Some(email.as_str()));
        prop_assert_eq!(claims.permissions, permissions);
    }

    // Requiring a permission the user does not hold always denies access.
    #[test]
    fn missing_permission_denies(
        held in proptest::collection::vec("[a-m.]{1,12}", 0..4),
        required in "[n-z]{1,12}",
    ) {
        let claims = TokenClaims { permissions: held, ..TokenClaims::default() };
        prop_assert!(!validate_user_access(&claims, &[required], &[]));
    }
}
