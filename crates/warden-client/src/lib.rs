#![allow(clippy::pedantic)]
#![allow(clippy::nursery)]
#![deny(clippy::unwrap_used)]
#![allow(clippy::missing_errors_doc)]

pub mod broadcast;
pub mod client;
pub mod errors;
pub mod guard;
mod refresh;
pub mod session;
pub mod store;

pub use crate::broadcast::{
    InProcessPort, MessagePort, Navigator, NoopNavigator, SessionBroadcaster, SessionEvent,
};
pub use crate::client::{AuthClient, AuthClientBuilder, ContextMode, HttpResponse, RequestSpec};
pub use crate::errors::ApiError;
pub use crate::guard::{guard_guest, guard_session, recover_auth_error, GuardDecision, GuardOptions};
pub use crate::store::{CookieOptions, CredentialStore, MemoryCredentialStore};
