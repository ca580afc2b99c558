//! Session interceptors for the shared `ApiClient`.
//!
//! `BearerAuth` attaches the stored token to every request; `SessionGuard`
//! drops the session and sends the user back to sign-in when the backend
//! answers 401.

use std::sync::Arc;

use reqwest::header::{HeaderValue, AUTHORIZATION};
use reqwest::StatusCode;
use tracing::{debug, info, warn};

use super::store::TokenStore;
use crate::api::{ApiError, RequestContext, RequestInterceptor, ResponseAction, ResponseInterceptor};

/// Sign-in entry point the client is sent to when the session is invalid
pub const LOGIN_PATH: &str = "/login";

/// Where the front end goes when the session ends
pub trait Navigator: Send + Sync {
    fn redirect(&self, path: &str);
}

/// Adds `Authorization: Bearer <token>` when a token is stored
pub struct BearerAuth {
    store: Arc<dyn TokenStore>,
}

impl BearerAuth {
    pub fn new(store: Arc<dyn TokenStore>) -> Self {
        Self { store }
    }
}

impl RequestInterceptor for BearerAuth {
    fn on_request(&self, request: &mut RequestContext) {
        let token = match self.store.get() {
            Ok(Some(token)) => token,
            Ok(None) => return,
            Err(e) => {
                warn!(error = %e, "Could not read session token; sending request without it");
                return;
            }
        };

        match HeaderValue::from_str(&format!("Bearer {}", token)) {
            Ok(mut value) => {
                value.set_sensitive(true);
                request.headers.insert(AUTHORIZATION, value);
            }
            Err(e) => warn!(error = %e, "Stored session token is not a valid header value"),
        }
    }
}

/// Ends the session on 401: clears the store and redirects to sign-in
pub struct SessionGuard {
    store: Arc<dyn TokenStore>,
    navigator: Arc<dyn Navigator>,
    login_path: String,
}

impl SessionGuard {
    pub fn new(store: Arc<dyn TokenStore>, navigator: Arc<dyn Navigator>) -> Self {
        Self {
            store,
            navigator,
            login_path: LOGIN_PATH.to_string(),
        }
    }

    pub fn with_login_path(mut self, login_path: impl Into<String>) -> Self {
        self.login_path = login_path.into();
        self
    }
}

impl ResponseInterceptor for SessionGuard {
    fn on_response(&self, request: &RequestContext, status: StatusCode) -> ResponseAction {
        if status != StatusCode::UNAUTHORIZED {
            return ResponseAction::Continue;
        }

        info!(path = %request.path, "Backend rejected the session; signing out");
        if let Err(e) = self.store.clear() {
            warn!(error = %e, "Failed to clear session token");
        }
        debug!(to = %self.login_path, "Redirecting to sign-in");
        self.navigator.redirect(&self.login_path);

        ResponseAction::Halt(ApiError::SessionExpired)
    }
}

/// Navigator that records redirects instead of performing them
#[cfg(test)]
#[derive(Default)]
pub(crate) struct RecordingNavigator {
    redirects: std::sync::Mutex<Vec<String>>,
}

#[cfg(test)]
impl RecordingNavigator {
    pub(crate) fn redirects(&self) -> Vec<String> {
        self.redirects.lock().unwrap().clone()
    }
}

#[cfg(test)]
impl Navigator for RecordingNavigator {
    fn redirect(&self, path: &str) {
        self.redirects.lock().unwrap().push(path.to_string());
    }
}
