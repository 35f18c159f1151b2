use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tracing::{debug, warn};

use warden_core::ENTRY_PATH;

use crate::store::{self, CredentialStore};

/// Events exchanged between execution contexts viewing the same session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    SignedOut,
}

pub type EventHandler = Box<dyn Fn(SessionEvent) + Send + Sync>;

/// One-way, fire-and-forget messaging between contexts (other tabs, windows).
/// The session core depends only on this capability; hosts supply whatever
/// transport they have.
pub trait MessagePort: Send + Sync {
    fn publish(&self, event: SessionEvent);
    fn subscribe(&self, handler: EventHandler);
}

/// Delivers published events synchronously to every subscribed handler in the
/// same process, including the publisher's own subscription.
#[derive(Default)]
pub struct InProcessPort {
    handlers: Mutex<Vec<EventHandler>>,
}

impl InProcessPort {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MessagePort for InProcessPort {
    fn publish(&self, event: SessionEvent) {
        let handlers = match self.handlers.lock() {
            Ok(handlers) => handlers,
            Err(_) => return,
        };
        for handler in handlers.iter() {
            handler(event);
        }
    }

    fn subscribe(&self, handler: EventHandler) {
        if let Ok(mut handlers) = self.handlers.lock() {
            handlers.push(handler);
        }
    }
}

/// Navigation capability of a live context.
pub trait Navigator: Send + Sync {
    fn navigate(&self, path: &str);
}

/// Used where no navigation exists (tests, embedding hosts that route on
/// their own).
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopNavigator;

impl Navigator for NoopNavigator {
    fn navigate(&self, _path: &str) {}
}

/// Clears the session locally and tells every other context sharing it to do
/// the same. At-most-once per receiver; no acknowledgements.
pub struct SessionBroadcaster {
    store: Arc<dyn CredentialStore>,
    port: Arc<dyn MessagePort>,
    navigator: Arc<dyn Navigator>,
    signed_out: AtomicBool,
}

impl SessionBroadcaster {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        port: Arc<dyn MessagePort>,
        navigator: Arc<dyn Navigator>,
    ) -> Arc<Self> {
        Arc::new(Self {
            store,
            port,
            navigator,
            signed_out: AtomicBool::new(false),
        })
    }

    /// Subscribes this context to sign-out events from its peers. A context
    /// that both publishes and receives its own event treats the echo as a
    /// no-op.
    pub fn attach(self: &Arc<Self>) {
        let broadcaster = Arc::clone(self);
        self.port.subscribe(Box::new(move |event| {
            if event == SessionEvent::SignedOut {
                broadcaster.handle_remote_sign_out();
            }
        }));
    }

    /// Destroys both credentials, broadcasts one `SignedOut` event and
    /// navigates to the entry point. Safe to call repeatedly: the store ends
    /// up empty either way, and the broadcast and navigation fire only once.
    pub fn invalidate(&self) {
        store::clear_tokens(self.store.as_ref());
        if self.signed_out.swap(true, Ordering::SeqCst) {
            debug!("session already invalidated");
            return;
        }
        warn!("session invalidated; broadcasting sign-out");
        self.port.publish(SessionEvent::SignedOut);
        self.navigator.navigate(ENTRY_PATH);
    }

    /// Re-arms the once-guard after a fresh sign-in so the next sign-out
    /// broadcasts and navigates again.
    pub(crate) fn rearm(&self) {
        self.signed_out.store(false, Ordering::SeqCst);
    }

    fn handle_remote_sign_out(&self) {
        store::clear_tokens(self.store.as_ref());
        if self.signed_out.swap(true, Ordering::SeqCst) {
            return;
        }
        debug!("received sign-out broadcast; clearing local session");
        self.navigator.navigate(ENTRY_PATH);
    }
}
