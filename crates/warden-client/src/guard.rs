//! Server-side route guarding: decides, before a page's data loader runs,
//! whether the request may proceed or must be redirected. Pure decisions over
//! the per-request credential store; the host owns the actual redirect.

use warden_core::{
    decode_claims, validate_user_access, DEFAULT_AUTHENTICATED_PATH, ENTRY_PATH, TOKEN_KEY,
};

use crate::store::{self, CredentialStore};

/// Claim requirements for a guarded route. Empty lists only require a token.
#[derive(Debug, Clone, Default)]
pub struct GuardOptions {
    pub permissions: Vec<String>,
    pub roles: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardDecision {
    Proceed,
    Redirect { destination: String },
}

impl GuardDecision {
    fn redirect(destination: &str) -> Self {
        Self::Redirect {
            destination: destination.to_string(),
        }
    }
}

/// Guard for authenticated routes: no token redirects to the entry point;
/// a token lacking a required permission or role redirects to the default
/// authenticated page.
pub fn guard_session(store: &dyn CredentialStore, options: &GuardOptions) -> GuardDecision {
    let Some(token) = store.get(TOKEN_KEY) else {
        return GuardDecision::redirect(ENTRY_PATH);
    };
    if options.permissions.is_empty() && options.roles.is_empty() {
        return GuardDecision::Proceed;
    }
    let Some(claims) = decode_claims(&token) else {
        return GuardDecision::redirect(DEFAULT_AUTHENTICATED_PATH);
    };
    if validate_user_access(&claims, &options.permissions, &options.roles) {
        GuardDecision::Proceed
    } else {
        GuardDecision::redirect(DEFAULT_AUTHENTICATED_PATH)
    }
}

/// Guard for guest-only routes (sign-in page): an authenticated visitor is
/// sent to the default authenticated page.
pub fn guard_guest(store: &dyn CredentialStore) -> GuardDecision {
    if store.get(TOKEN_KEY).is_some() {
        GuardDecision::redirect(DEFAULT_AUTHENTICATED_PATH)
    } else {
        GuardDecision::Proceed
    }
}

/// Recovery when a data loader surfaces an authentication token error from
/// the client: clear the per-request credentials and send the visitor back to
/// the entry point.
pub fn recover_auth_error(store: &dyn CredentialStore) -> GuardDecision {
    store::clear_tokens(store);
    GuardDecision::redirect(ENTRY_PATH)
}
