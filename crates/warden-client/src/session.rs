//! Session lifecycle on top of the authenticated client: sign-in, identity
//! lookup, restore-on-startup and sign-out.

use tracing::{debug, warn};

use warden_core::{MeResponse, Session, SignInRequest, TokenPair, User, ME_PATH, SESSIONS_PATH};

use crate::client::{AuthClient, ContextMode, RequestSpec};
use crate::errors::ApiError;
use crate::store;

impl AuthClient {
    /// Authenticates with the session endpoint and persists the returned
    /// credential pair. The returned `Session` carries both the pair and the
    /// identity established by it.
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<Session, ApiError> {
        let body = serde_json::to_value(SignInRequest {
            email: email.to_string(),
            password: password.to_string(),
        })?;
        let granted: warden_core::SignInResponse = self
            .execute_json(RequestSpec::post(SESSIONS_PATH).json(body))
            .await?;

        let tokens = TokenPair::new(granted.access_token, granted.refresh_token);
        store::store_token_pair(self.store().as_ref(), &tokens);
        self.broadcaster().rearm();
        debug!(%email, "signed in");

        Ok(Session {
            tokens,
            user: User {
                email: email.to_string(),
                permissions: granted.permissions,
                roles: granted.roles,
            },
        })
    }

    /// Fetches the authenticated identity through the interceptor, so an
    /// expired token is refreshed transparently on the way.
    pub async fn me(&self) -> Result<User, ApiError> {
        let me: MeResponse = self.execute_json(RequestSpec::get(ME_PATH)).await?;
        Ok(User {
            email: me.email,
            permissions: me.permissions,
            roles: me.roles,
        })
    }

    /// Rebuilds the session from persisted credentials on startup. The pair
    /// is re-read after the identity call because that call may itself have
    /// refreshed it. Any failure to re-establish identity invalidates the
    /// session in a live context.
    pub async fn restore(&self) -> Option<Session> {
        store::access_token(self.store().as_ref())?;
        match self.me().await {
            Ok(user) => {
                let tokens = store::load_token_pair(self.store().as_ref())?;
                Some(Session { tokens, user })
            }
            Err(error) => {
                warn!(%error, "session restore failed");
                if self.context() == ContextMode::Live {
                    self.broadcaster().invalidate();
                }
                None
            }
        }
    }

    pub fn sign_out(&self) {
        self.broadcaster().invalidate();
    }
}
