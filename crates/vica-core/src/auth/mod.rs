//! Authentication module for signing in and keeping the session.
//!
//! This module provides:
//! - `TokenStore`: the single durable slot for the session token, with
//!   memory, file and OS keychain backends
//! - `IdentityProvider`: federated sign-in, with a browser/loopback flow
//! - `BearerAuth` / `SessionGuard`: the session interceptors for `ApiClient`
//! - `AuthService`: credential sign-in, sign-up and federated sign-in
//!
//! Tokens have no local expiry; a 401 from the backend ends the session.

pub mod keychain;
pub mod loopback;
pub mod provider;
pub mod service;
pub mod session;
pub mod store;

pub use keychain::KeychainTokenStore;
pub use loopback::{Launcher, LoopbackProvider};
pub use provider::{IdentityAssertion, IdentityProvider, ProviderError};
pub use service::{AuthError, AuthResponse, AuthService};
pub use session::{BearerAuth, Navigator, SessionGuard, LOGIN_PATH};
pub use store::{FileTokenStore, MemoryTokenStore, StoreError, TokenStore};
