//! Browser-based federated sign-in with a loopback callback.
//!
//! The hosted sign-in page runs the provider popup and then redirects the
//! browser to `http://127.0.0.1:<port>/callback` with either `id_token` or
//! `error`, echoing back the `state` it was given.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::Html,
    routing::get,
    Router,
};
use futures::future::BoxFuture;
use rand::{distributions::Alphanumeric, Rng};
use reqwest::Url;
use serde::Deserialize;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use super::provider::{IdentityAssertion, IdentityProvider, ProviderError};
use crate::config::ProviderConfig;

const CALLBACK_PATH: &str = "/callback";

/// Length of the random `state` nonce
const STATE_LENGTH: usize = 32;

const SUCCESS_PAGE: &str = "<!DOCTYPE html><html><head><title>VICA</title></head>\
<body><p>Signed in. You can close this window.</p></body></html>";

const FAILURE_PAGE: &str = "<!DOCTYPE html><html><head><title>VICA</title></head>\
<body><p>Sign-in did not complete. You can close this window.</p></body></html>";

/// Opens the sign-in URL for the user, typically in a browser
pub type Launcher = Arc<dyn Fn(&str) -> std::io::Result<()> + Send + Sync>;

type Outcome = Result<IdentityAssertion, ProviderError>;

struct CallbackState {
    expected_state: String,
    outcome_tx: Mutex<Option<oneshot::Sender<Outcome>>>,
}

#[derive(Debug, Deserialize)]
struct CallbackParams {
    state: Option<String>,
    id_token: Option<String>,
    error: Option<String>,
}

pub struct LoopbackProvider {
    sign_in_url: Option<String>,
    callback_port: u16,
    timeout: Duration,
    launcher: Launcher,
}

impl LoopbackProvider {
    pub fn new(config: &ProviderConfig, launcher: Launcher) -> Self {
        Self {
            sign_in_url: config.sign_in_url.clone(),
            callback_port: config.callback_port,
            timeout: Duration::from_secs(config.timeout_secs),
            launcher,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn random_state() -> String {
        rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(STATE_LENGTH)
            .map(char::from)
            .collect()
    }

    async fn run(&self) -> Outcome {
        let sign_in_url = self.sign_in_url.as_deref().ok_or_else(|| {
            ProviderError::Unavailable("no identity provider sign-in URL configured".to_string())
        })?;
        let mut url = Url::parse(sign_in_url).map_err(|e| {
            ProviderError::Unavailable(format!("invalid sign-in URL {}: {}", sign_in_url, e))
        })?;

        let addr = SocketAddr::from(([127, 0, 0, 1], self.callback_port));
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            ProviderError::Unavailable(format!("failed to bind callback listener on {}: {}", addr, e))
        })?;
        let port = listener
            .local_addr()
            .map_err(|e| ProviderError::Unavailable(e.to_string()))?
            .port();

        let state = Self::random_state();
        let redirect_uri = format!("http://127.0.0.1:{}{}", port, CALLBACK_PATH);
        url.query_pairs_mut()
            .append_pair("redirect_uri", &redirect_uri)
            .append_pair("state", &state);

        let (outcome_tx, outcome_rx) = oneshot::channel();
        let shared = Arc::new(CallbackState {
            expected_state: state,
            outcome_tx: Mutex::new(Some(outcome_tx)),
        });
        let app = Router::new()
            .route(CALLBACK_PATH, get(callback_handler))
            .with_state(shared);

        let server = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                warn!(error = %e, "Callback server stopped");
            }
        });
        debug!(port, "Callback server listening");

        info!("Opening identity provider sign-in page");
        if let Err(e) = (self.launcher)(url.as_str()) {
            warn!(error = %e, url = %url, "Failed to open sign-in page; open it manually");
        }

        let received = tokio::time::timeout(self.timeout, outcome_rx).await;
        server.abort();

        match received {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Err(ProviderError::Unavailable(
                "callback channel closed unexpectedly".to_string(),
            )),
            Err(_) => Err(ProviderError::Timeout(self.timeout.as_secs())),
        }
    }
}

impl IdentityProvider for LoopbackProvider {
    fn sign_in_federated(&self) -> BoxFuture<'_, Outcome> {
        Box::pin(self.run())
    }
}

async fn callback_handler(
    State(shared): State<Arc<CallbackState>>,
    Query(params): Query<CallbackParams>,
) -> (StatusCode, Html<&'static str>) {
    if params.state.as_deref() != Some(shared.expected_state.as_str()) {
        warn!("Ignoring sign-in callback with unexpected state");
        return (StatusCode::BAD_REQUEST, Html(FAILURE_PAGE));
    }

    let outcome = match (params.id_token, params.error) {
        (_, Some(error)) => Err(ProviderError::Cancelled(error)),
        (Some(token), None) if !token.is_empty() => Ok(IdentityAssertion::new(token)),
        _ => Err(ProviderError::InvalidResponse(
            "callback carried neither id_token nor error".to_string(),
        )),
    };
    let succeeded = outcome.is_ok();

    let sender = shared
        .outcome_tx
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .take();
    match sender {
        Some(tx) => {
            if tx.send(outcome).is_err() {
                debug!("Sign-in flow already finished");
            }
        }
        None => debug!("Duplicate sign-in callback ignored"),
    }

    if succeeded {
        (StatusCode::OK, Html(SUCCESS_PAGE))
    } else {
        (StatusCode::OK, Html(FAILURE_PAGE))
    }
}
