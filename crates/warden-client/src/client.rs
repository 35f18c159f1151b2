use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use reqwest::{header, Client, ClientBuilder, Method, StatusCode};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use warden_core::{
    decode_claims, ApiErrorBody, RefreshRequest, RefreshResponse, TokenPair, REFRESH_PATH,
    TOKEN_EXPIRED_CODE,
};

use crate::broadcast::{InProcessPort, MessagePort, Navigator, NoopNavigator, SessionBroadcaster};
use crate::errors::ApiError;
use crate::refresh::RefreshCoordinator;
use crate::store::{self, CredentialStore, MemoryCredentialStore};

/// Whether this client lives in a context that owns the session (a browser
/// tab with navigation) or a short-lived per-request server context that must
/// not perform side-effecting invalidation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextMode {
    Live,
    Server,
}

/// Everything needed to issue a call, and to re-issue it after a refresh.
#[derive(Debug, Clone)]
pub struct RequestSpec {
    pub method: Method,
    pub path: String,
    pub body: Option<serde_json::Value>,
}

impl RequestSpec {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            body: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    #[must_use]
    pub fn json(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }
}

/// A settled response. Non-auth failures pass through here unchanged; the
/// caller decides what a 500 means for it.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: StatusCode,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Typed view of a response, decided once at the HTTP boundary.
enum Disposition {
    Pass(HttpResponse),
    Expired,
    Unauthorized { code: String, message: String },
}

/// Why a refresh cycle failed; fanned out to every queued waiter.
enum RefreshFailure {
    MissingToken,
    Status(u16, String),
    Transport(String),
    TimedOut,
}

impl RefreshFailure {
    fn to_api_error(&self) -> ApiError {
        match self {
            Self::MissingToken => ApiError::MissingRefreshToken,
            Self::Status(status, message) => ApiError::RefreshFailed {
                status: Some(*status),
                message: message.clone(),
            },
            Self::Transport(message) => ApiError::RefreshFailed {
                status: None,
                message: message.clone(),
            },
            Self::TimedOut => ApiError::RefreshFailed {
                status: None,
                message: "refresh request timed out".to_string(),
            },
        }
    }
}

/// Authenticated API client. Attaches the current access token to every
/// outbound call, refreshes it single-flight when the server reports expiry
/// and replays the calls that failed in the meantime, in arrival order.
///
/// Cloning is cheap; clones share the credential store, the broadcaster and
/// the refresh cycle. Two independently built clients share nothing.
#[derive(Clone)]
pub struct AuthClient {
    http: Client,
    base_url: String,
    context: ContextMode,
    store: Arc<dyn CredentialStore>,
    broadcaster: Arc<SessionBroadcaster>,
    refresh: Arc<RefreshCoordinator>,
    refresh_timeout: Option<Duration>,
}

impl AuthClient {
    pub fn builder() -> AuthClientBuilder {
        AuthClientBuilder::default()
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn context(&self) -> ContextMode {
        self.context
    }

    pub fn store(&self) -> &Arc<dyn CredentialStore> {
        &self.store
    }

    pub fn broadcaster(&self) -> &Arc<SessionBroadcaster> {
        &self.broadcaster
    }

    /// Issues a call with the current credential attached. On an expired
    /// token the call suspends until the owning refresh cycle settles it; on
    /// any other unauthorized failure the session is invalidated (live) or a
    /// typed token error is surfaced (server).
    pub async fn execute(&self, spec: RequestSpec) -> Result<HttpResponse, ApiError> {
        let token = store::access_token(self.store.as_ref());
        // A token already at or past its expiry would only buy a stale-token
        // round trip; refresh it up front. Opaque tokens go out as-is.
        if let Some(claims) = token.as_deref().and_then(decode_claims) {
            if claims.is_expired(Utc::now()) {
                debug!("access token expired locally; refreshing before send");
                return self.await_replay(spec).await;
            }
        }
        let response = self.send_raw(&spec, token.as_deref()).await?;
        match Self::classify(response).await? {
            Disposition::Pass(response) => Ok(response),
            Disposition::Expired => self.await_replay(spec).await,
            Disposition::Unauthorized { code, message } => match self.context {
                ContextMode::Live => {
                    warn!(%code, "unauthorized response; invalidating session");
                    self.broadcaster.invalidate();
                    Err(ApiError::Unauthorized { code, message })
                }
                ContextMode::Server => Err(ApiError::AuthToken),
            },
        }
    }

    /// `execute` plus JSON decoding; non-success statuses become typed errors.
    pub async fn execute_json<T: DeserializeOwned>(
        &self,
        spec: RequestSpec,
    ) -> Result<T, ApiError> {
        let response = self.execute(spec).await?;
        if !response.status.is_success() {
            return Err(ApiError::Status {
                status: response.status.as_u16(),
                message: response.text(),
            });
        }
        Ok(response.json()?)
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn send_raw(
        &self,
        spec: &RequestSpec,
        bearer: Option<&str>,
    ) -> Result<reqwest::Response, reqwest::Error> {
        let mut request = self
            .http
            .request(spec.method.clone(), self.endpoint(&spec.path));
        if let Some(token) = bearer {
            request = request.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        if let Some(body) = &spec.body {
            request = request.json(body);
        }
        request.send().await
    }

    /// The one place that inspects failure shapes: everything downstream
    /// works with the typed disposition.
    async fn classify(response: reqwest::Response) -> Result<Disposition, ApiError> {
        let status = response.status();
        let body = response.bytes().await?.to_vec();
        if status != StatusCode::UNAUTHORIZED {
            return Ok(Disposition::Pass(HttpResponse { status, body }));
        }
        let error: ApiErrorBody = serde_json::from_slice(&body).unwrap_or_default();
        if error.code.as_deref() == Some(TOKEN_EXPIRED_CODE) {
            return Ok(Disposition::Expired);
        }
        Ok(Disposition::Unauthorized {
            code: error.code.unwrap_or_else(|| "unauthorized".to_string()),
            message: error.message.unwrap_or_default(),
        })
    }

    /// Suspends the caller until the in-flight refresh cycle settles its
    /// request. The elected driver hands the cycle to a detached task, so a
    /// caller dropped mid-wait (a timeout around `execute`, a losing select
    /// arm) never leaves the flag set or the queue unsettled; the cycle
    /// outlives every individual waiter.
    async fn await_replay(&self, spec: RequestSpec) -> Result<HttpResponse, ApiError> {
        let (rx, drive) = self.refresh.enqueue(spec);
        if drive {
            let driver = self.clone();
            tokio::spawn(async move { driver.drive_refresh().await });
        }
        rx.await.map_err(|_| ApiError::RefreshFailed {
            status: None,
            message: "refresh cycle dropped before settling".to_string(),
        })?
    }

    /// Runs one refresh cycle to completion: a single refresh call, then the
    /// whole queue is drained at once, entirely replayed in arrival order or
    /// entirely rejected. Replays bypass `classify`, so a request already
    /// past the interceptor is never re-enqueued.
    async fn drive_refresh(&self) {
        let outcome = self.perform_refresh().await;
        let drained = self.refresh.complete();
        match outcome {
            Ok(access_token) => {
                debug!(replaying = drained.len(), "refresh succeeded");
                for pending in drained {
                    let settlement = self.replay(&pending.spec, &access_token).await;
                    pending.settle(settlement);
                }
            }
            Err(failure) => {
                warn!(
                    rejecting = drained.len(),
                    error = %failure.to_api_error(),
                    "refresh failed"
                );
                for pending in drained {
                    pending.settle(Err(failure.to_api_error()));
                }
                if self.context == ContextMode::Live {
                    self.broadcaster.invalidate();
                }
            }
        }
    }

    async fn perform_refresh(&self) -> Result<String, RefreshFailure> {
        let Some(refresh_token) = store::refresh_token(self.store.as_ref()) else {
            return Err(RefreshFailure::MissingToken);
        };
        let request = self
            .http
            .post(self.endpoint(REFRESH_PATH))
            .json(&RefreshRequest { refresh_token });

        let sent = match self.refresh_timeout {
            Some(limit) => match tokio::time::timeout(limit, request.send()).await {
                Ok(sent) => sent,
                Err(_) => return Err(RefreshFailure::TimedOut),
            },
            None => request.send().await,
        };
        let response = sent.map_err(|err| RefreshFailure::Transport(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_else(|_| status.to_string());
            return Err(RefreshFailure::Status(status.as_u16(), message));
        }
        let tokens: RefreshResponse = response
            .json()
            .await
            .map_err(|err| RefreshFailure::Transport(err.to_string()))?;
        store::store_token_pair(
            self.store.as_ref(),
            &TokenPair {
                access_token: tokens.access_token.clone(),
                refresh_token: tokens.refresh_token,
            },
        );
        debug!("session tokens refreshed");
        Ok(tokens.access_token)
    }

    async fn replay(&self, spec: &RequestSpec, access_token: &str) -> Result<HttpResponse, ApiError> {
        let response = self.send_raw(spec, Some(access_token)).await?;
        let status = response.status();
        let body = response.bytes().await?.to_vec();
        Ok(HttpResponse { status, body })
    }
}

/// Builder for `AuthClient`.
pub struct AuthClientBuilder {
    base_url: Option<String>,
    context: ContextMode,
    store: Option<Arc<dyn CredentialStore>>,
    port: Option<Arc<dyn MessagePort>>,
    navigator: Option<Arc<dyn Navigator>>,
    refresh_timeout: Option<Duration>,
}

impl Default for AuthClientBuilder {
    fn default() -> Self {
        Self {
            base_url: None,
            context: ContextMode::Live,
            store: None,
            port: None,
            navigator: None,
            refresh_timeout: None,
        }
    }
}

impl AuthClientBuilder {
    #[must_use]
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    #[must_use]
    pub fn context(mut self, context: ContextMode) -> Self {
        self.context = context;
        self
    }

    #[must_use]
    pub fn store(mut self, store: Arc<dyn CredentialStore>) -> Self {
        self.store = Some(store);
        self
    }

    #[must_use]
    pub fn message_port(mut self, port: Arc<dyn MessagePort>) -> Self {
        self.port = Some(port);
        self
    }

    #[must_use]
    pub fn navigator(mut self, navigator: Arc<dyn Navigator>) -> Self {
        self.navigator = Some(navigator);
        self
    }

    /// Upper bound on the refresh network call. Without one, a hung refresh
    /// stalls every queued request until the transport gives up.
    #[must_use]
    pub fn refresh_timeout(mut self, timeout: Duration) -> Self {
        self.refresh_timeout = Some(timeout);
        self
    }

    pub fn build(self) -> Result<AuthClient, ApiError> {
        let base_url = self
            .base_url
            .ok_or_else(|| ApiError::Configuration("base_url is required".to_string()))?;
        let base_url = base_url.trim_end_matches('/').to_string();

        let store = self
            .store
            .unwrap_or_else(|| Arc::new(MemoryCredentialStore::new()));
        let port = self.port.unwrap_or_else(|| Arc::new(InProcessPort::new()));
        let navigator = self.navigator.unwrap_or_else(|| Arc::new(NoopNavigator));

        let broadcaster = SessionBroadcaster::new(store.clone(), port, navigator);
        if self.context == ContextMode::Live {
            broadcaster.attach();
        }

        let http = ClientBuilder::new().build()?;
        Ok(AuthClient {
            http,
            base_url,
            context: self.context,
            store,
            broadcaster,
            refresh: Arc::new(RefreshCoordinator::new()),
            refresh_timeout: self.refresh_timeout,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::store_token_pair;
    use serde_json::json;

    fn client_for(url: &str, store: Arc<dyn CredentialStore>) -> AuthClient {
        AuthClient::builder()
            .base_url(url)
            .store(store)
            .build()
            .expect("client")
    }

    #[tokio::test]
    async fn non_auth_failures_pass_through_unchanged() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/reports")
            .with_status(500)
            .with_body("boom")
            .create_async()
            .await;

        let store = Arc::new(MemoryCredentialStore::new());
        store_token_pair(store.as_ref(), &TokenPair::new("T1", "R1"));
        let client = client_for(&server.url(), store);

        let response = client
            .execute(RequestSpec::get("/reports"))
            .await
            .expect("passes through");
        assert_eq!(response.status.as_u16(), 500);
        assert_eq!(response.text(), "boom");
    }

    #[tokio::test]
    async fn bearer_header_comes_from_the_store() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/reports")
            .match_header("authorization", "Bearer T1")
            .with_status(200)
            .with_body("ok")
            .create_async()
            .await;

        let store = Arc::new(MemoryCredentialStore::new());
        store_token_pair(store.as_ref(), &TokenPair::new("T1", "R1"));
        let client = client_for(&server.url(), store);

        client
            .execute(RequestSpec::get("/reports"))
            .await
            .expect("authorized");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn server_context_surfaces_token_error_without_side_effects() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/reports")
            .with_status(401)
            .with_body(json!({ "code": "token.invalid" }).to_string())
            .create_async()
            .await;

        let store = Arc::new(MemoryCredentialStore::new());
        store_token_pair(store.as_ref(), &TokenPair::new("T1", "R1"));
        let client = AuthClient::builder()
            .base_url(server.url())
            .context(ContextMode::Server)
            .store(store.clone())
            .build()
            .expect("client");

        let error = client
            .execute(RequestSpec::get("/reports"))
            .await
            .expect_err("token error");
        assert!(error.is_auth_token_error());
        // The caller owns the redirect and cookie-clearing policy here.
        assert_eq!(store.get("warden.token").as_deref(), Some("T1"));
        assert_eq!(store.get("warden.refreshToken").as_deref(), Some("R1"));
    }

    #[tokio::test]
    async fn refresh_call_honors_the_configured_timeout() {
        // A listener that accepts and then never answers.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind");
        let addr = listener.local_addr().expect("addr");
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });

        let store = Arc::new(MemoryCredentialStore::new());
        store_token_pair(store.as_ref(), &TokenPair::new("T1", "R1"));
        let client = AuthClient::builder()
            .base_url(format!("http://{addr}"))
            .store(store)
            .refresh_timeout(Duration::from_millis(100))
            .build()
            .expect("client");

        let failure = client
            .perform_refresh()
            .await
            .expect_err("must time out");
        assert!(matches!(failure, RefreshFailure::TimedOut));
    }

    #[tokio::test]
    async fn missing_refresh_token_fails_the_cycle_immediately() {
        let store = Arc::new(MemoryCredentialStore::new());
        let client = client_for("http://localhost:1", store);
        let failure = client
            .perform_refresh()
            .await
            .expect_err("nothing to refresh with");
        assert!(matches!(failure, RefreshFailure::MissingToken));
    }
}
