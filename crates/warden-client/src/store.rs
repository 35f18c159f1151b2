use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use tracing::debug;

use warden_core::{TokenPair, COOKIE_PATH, REFRESH_TOKEN_KEY, SESSION_MAX_AGE_SECONDS, TOKEN_KEY};

/// Persistence attributes for stored credentials.
#[derive(Debug, Clone)]
pub struct CookieOptions {
    pub max_age: Duration,
    pub path: String,
}

impl Default for CookieOptions {
    fn default() -> Self {
        Self {
            max_age: Duration::from_secs(SESSION_MAX_AGE_SECONDS),
            path: COOKIE_PATH.to_string(),
        }
    }
}

/// Key-value credential storage shared by a live client context and
/// short-lived per-request server contexts. Implementations wrap whatever
/// backing medium the host environment provides (cookie jar, keychain,
/// request headers); the session core only ever sees this trait.
pub trait CredentialStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str, options: &CookieOptions);
    fn destroy(&self, key: &str);
}

/// In-memory store. Cloning shares the backing map, so one map can serve as
/// the "browser" visible to several clients in tests and single-process use.
#[derive(Debug, Default, Clone)]
pub struct MemoryCredentialStore {
    entries: Arc<RwLock<HashMap<String, String>>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries
            .read()
            .ok()
            .and_then(|entries| entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str, _options: &CookieOptions) {
        if let Ok(mut entries) = self.entries.write() {
            entries.insert(key.to_string(), value.to_string());
        }
    }

    fn destroy(&self, key: &str) {
        if let Ok(mut entries) = self.entries.write() {
            entries.remove(key);
        }
    }
}

/// Persists both tokens of a pair together. This is the only write path for
/// credentials besides sign-in, keeping the both-or-neither invariant.
pub fn store_token_pair(store: &dyn CredentialStore, pair: &TokenPair) {
    let options = CookieOptions::default();
    store.set(TOKEN_KEY, &pair.access_token, &options);
    store.set(REFRESH_TOKEN_KEY, &pair.refresh_token, &options);
    debug!("stored session token pair");
}

/// Loads the pair only when both halves are present; a partially written
/// store reads as signed out.
pub fn load_token_pair(store: &dyn CredentialStore) -> Option<TokenPair> {
    let access_token = store.get(TOKEN_KEY)?;
    let refresh_token = store.get(REFRESH_TOKEN_KEY)?;
    Some(TokenPair {
        access_token,
        refresh_token,
    })
}

pub fn access_token(store: &dyn CredentialStore) -> Option<String> {
    store.get(TOKEN_KEY)
}

pub fn refresh_token(store: &dyn CredentialStore) -> Option<String> {
    store.get(REFRESH_TOKEN_KEY)
}

pub fn clear_tokens(store: &dyn CredentialStore) {
    store.destroy(TOKEN_KEY);
    store.destroy(REFRESH_TOKEN_KEY);
}
