use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use super::provider::{IdentityProvider, ProviderError};
use super::session::{BearerAuth, Navigator, SessionGuard};
use super::store::{StoreError, TokenStore};
use crate::api::{ApiClient, ApiError};

/// Prefix of the backend's authentication routes
const AUTH_PREFIX: &str = "/vica/auths";

/// Shown when the backend gave no usable message
const GENERIC_FAILURE_MESSAGE: &str = "Sign-in failed. Please try again.";

#[derive(Error, Debug)]
pub enum AuthError {
    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("Failed to store session token: {0}")]
    Store(#[from] StoreError),
}

impl AuthError {
    /// Text for the user: the backend's own message when it sent one
    pub fn user_message(&self) -> String {
        match self {
            AuthError::Api(ApiError::SessionExpired) => {
                "Your session has expired. Please sign in again.".to_string()
            }
            AuthError::Api(ApiError::NetworkError(_)) => {
                "Unable to reach the server. Check your connection.".to_string()
            }
            AuthError::Api(api) => api
                .backend_message()
                .map(str::to_string)
                .unwrap_or_else(|| GENERIC_FAILURE_MESSAGE.to_string()),
            AuthError::Provider(ProviderError::Cancelled(_)) => {
                "Federated sign-in was cancelled.".to_string()
            }
            AuthError::Provider(_) => {
                "Federated sign-in failed. Please try again.".to_string()
            }
            AuthError::Store(_) => GENERIC_FAILURE_MESSAGE.to_string(),
        }
    }

    /// True when the session guard has already signed the user out
    pub fn is_session_expired(&self) -> bool {
        matches!(self, AuthError::Api(ApiError::SessionExpired))
    }
}

/// Body returned by the sign-in, sign-up and federated exchange endpoints.
///
/// Built leniently from whatever JSON the backend sends: a profile field of an
/// unexpected type stays in `extra` instead of failing the call, so an issued
/// token is never lost to a schema mismatch.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AuthResponse {
    pub token: Option<String>,
    pub token_type: Option<String>,
    pub id: Option<String>,
    pub email: Option<String>,
    pub name: Option<String>,
    pub role: Option<String>,
    pub profile_image_url: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl From<Value> for AuthResponse {
    fn from(body: Value) -> Self {
        let mut extra = match body {
            Value::Object(map) => map,
            other => {
                debug!(kind = json_kind(&other), "Auth response body is not an object");
                Map::new()
            }
        };

        Self {
            token: take_text(&mut extra, "token"),
            token_type: take_text(&mut extra, "token_type"),
            id: take_text(&mut extra, "id"),
            email: take_text(&mut extra, "email"),
            name: take_text(&mut extra, "name"),
            role: take_text(&mut extra, "role"),
            profile_image_url: take_text(&mut extra, "profile_image_url"),
            extra,
        }
    }
}

/// Remove `key` when it holds a string or number; anything else stays put
fn take_text(map: &mut Map<String, Value>, key: &str) -> Option<String> {
    let text = match map.get(key)? {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Null => {
            map.remove(key);
            return None;
        }
        _ => return None,
    };
    map.remove(key);
    Some(text)
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[derive(Serialize)]
struct SigninRequest<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Serialize)]
struct SignupRequest<'a> {
    name: &'a str,
    email: &'a str,
    password: &'a str,
    profile_image_url: &'a str,
}

#[derive(Serialize)]
struct FederatedRequest<'a> {
    id_token: &'a str,
}

/// Sign-in, sign-up and federated sign-in against the VICA backend.
///
/// Every successful call that returns a token leaves it in the token store,
/// where the client's `BearerAuth` interceptor picks it up for later requests.
pub struct AuthService {
    api: ApiClient,
    store: Arc<dyn TokenStore>,
    provider: Arc<dyn IdentityProvider>,
}

impl AuthService {
    pub fn new(
        api: ApiClient,
        store: Arc<dyn TokenStore>,
        provider: Arc<dyn IdentityProvider>,
    ) -> Self {
        Self {
            api,
            store,
            provider,
        }
    }

    /// Build the shared client with the session interceptors registered on it
    pub fn connect(
        base_url: impl Into<String>,
        timeout: Duration,
        store: Arc<dyn TokenStore>,
        provider: Arc<dyn IdentityProvider>,
        navigator: Arc<dyn Navigator>,
    ) -> Result<Self, AuthError> {
        let api = ApiClient::builder(base_url)
            .timeout(timeout)
            .request_interceptor(Arc::new(BearerAuth::new(store.clone())))
            .response_interceptor(Arc::new(SessionGuard::new(store.clone(), navigator)))
            .build()?;

        Ok(Self::new(api, store, provider))
    }

    /// Client for other backend calls, sharing the session interceptors
    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> Result<AuthResponse, AuthError> {
        self.exchange("signin", "/signin", &SigninRequest { email, password })
            .await
    }

    pub async fn sign_up(
        &self,
        name: &str,
        email: &str,
        password: &str,
        profile_image_url: Option<&str>,
    ) -> Result<AuthResponse, AuthError> {
        let request = SignupRequest {
            name,
            email,
            password,
            profile_image_url: profile_image_url.unwrap_or_default(),
        };
        self.exchange("signup", "/signup", &request).await
    }

    /// Run the provider's interactive flow, then trade its assertion for a
    /// session token. A provider failure never reaches the backend.
    pub async fn sign_in_federated(&self) -> Result<AuthResponse, AuthError> {
        let assertion = self.provider.sign_in_federated().await.map_err(|e| {
            warn!(error = %e, "Federated sign-in did not complete");
            e
        })?;

        let request = FederatedRequest {
            id_token: assertion.as_str(),
        };
        self.exchange("federated", "/firebase-auth", &request).await
    }

    pub fn logout(&self) -> Result<(), AuthError> {
        self.store.clear()?;
        info!("Signed out");
        Ok(())
    }

    /// A stored token counts as signed in; its expiry is the backend's call
    pub fn is_authenticated(&self) -> bool {
        match self.store.get() {
            Ok(token) => token.is_some(),
            Err(e) => {
                warn!(error = %e, "Could not read session token");
                false
            }
        }
    }

    async fn exchange<B: Serialize>(
        &self,
        operation: &'static str,
        path: &str,
        body: &B,
    ) -> Result<AuthResponse, AuthError> {
        let path = format!("{}{}", AUTH_PREFIX, path);

        let response = match self.api.post_json::<_, Value>(&path, body).await {
            Ok(body) => AuthResponse::from(body),
            Err(e) => {
                error!(operation, error = %e, "Authentication request failed");
                return Err(e.into());
            }
        };

        match response.token.as_deref().filter(|token| !token.is_empty()) {
            Some(token) => {
                self.store.set(token)?;
                info!(operation, "Session token stored");
            }
            None => debug!(operation, "Response carried no token"),
        }

        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use futures::future::{self, BoxFuture, FutureExt};
    use mockito::{Matcher, Server, ServerGuard};
    use serde_json::json;

    use super::*;
    use crate::auth::provider::IdentityAssertion;
    use crate::auth::session::{RecordingNavigator, LOGIN_PATH};
    use crate::auth::MemoryTokenStore;

    /// Provider that hands out one pre-set outcome
    struct ScriptedProvider {
        outcome: Mutex<Option<Result<IdentityAssertion, ProviderError>>>,
    }

    impl ScriptedProvider {
        fn returning(outcome: Result<IdentityAssertion, ProviderError>) -> Arc<Self> {
            Arc::new(Self {
                outcome: Mutex::new(Some(outcome)),
            })
        }
    }

    impl IdentityProvider for ScriptedProvider {
        fn sign_in_federated(&self) -> BoxFuture<'_, Result<IdentityAssertion, ProviderError>> {
            let outcome = self
                .outcome
                .lock()
                .unwrap()
                .take()
                .unwrap_or_else(|| Err(ProviderError::Unavailable("already used".to_string())));
            future::ready(outcome).boxed()
        }
    }

    struct Harness {
        service: AuthService,
        store: Arc<MemoryTokenStore>,
        navigator: Arc<RecordingNavigator>,
    }

    fn harness(server: &ServerGuard, provider: Arc<dyn IdentityProvider>) -> Harness {
        let store = Arc::new(MemoryTokenStore::new());
        let navigator = Arc::new(RecordingNavigator::default());
        let service = AuthService::connect(
            server.url(),
            Duration::from_secs(5),
            store.clone(),
            provider,
            navigator.clone(),
        )
        .unwrap();
        Harness {
            service,
            store,
            navigator,
        }
    }

    fn unused_provider() -> Arc<dyn IdentityProvider> {
        ScriptedProvider::returning(Err(ProviderError::Unavailable("not in this test".to_string())))
    }

    #[tokio::test]
    async fn test_sign_in_stores_token() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/vica/auths/signin")
            .match_header("authorization", Matcher::Missing)
            .match_body(Matcher::Json(json!({"email": "a@b.com", "password": "pw"})))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"token": "T1", "token_type": "bearer", "id": "u-1", "email": "a@b.com",
                    "name": "A", "role": "admin", "profile_image_url": "", "theme": "dark"}"#,
            )
            .create_async()
            .await;

        let h = harness(&server, unused_provider());
        assert!(!h.service.is_authenticated());

        let response = h.service.sign_in("a@b.com", "pw").await.unwrap();

        mock.assert_async().await;
        assert_eq!(response.token.as_deref(), Some("T1"));
        assert_eq!(response.role.as_deref(), Some("admin"));
        assert_eq!(response.extra.get("theme"), Some(&json!("dark")));
        assert_eq!(h.store.get().unwrap().as_deref(), Some("T1"));
        assert!(h.service.is_authenticated());
    }

    #[tokio::test]
    async fn test_token_is_attached_to_next_request() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/vica/auths/signin")
            .with_status(200)
            .with_body(r#"{"token": "T1"}"#)
            .create_async()
            .await;
        let users = server
            .mock("GET", "/vica/users/getUser")
            .match_header("authorization", "Bearer T1")
            .with_status(200)
            .with_body("[]")
            .create_async()
            .await;

        let h = harness(&server, unused_provider());
        h.service.sign_in("a@b.com", "pw").await.unwrap();
        let list: Vec<Value> = h.service.api().get_json("/vica/users/getUser").await.unwrap();

        assert!(list.is_empty());
        users.assert_async().await;
    }

    #[tokio::test]
    async fn test_unauthorized_clears_token_and_redirects_once() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/vica/users/getUser")
            .match_header("authorization", "Bearer T1")
            .with_status(401)
            .with_body(r#"{"detail": "Could not validate credentials"}"#)
            .create_async()
            .await;

        let h = harness(&server, unused_provider());
        h.store.set("T1").unwrap();

        let err: AuthError = h
            .service
            .api()
            .get_json::<Value>("/vica/users/getUser")
            .await
            .unwrap_err()
            .into();

        assert!(err.is_session_expired());
        assert_eq!(h.store.get().unwrap(), None);
        assert_eq!(h.navigator.redirects(), vec![LOGIN_PATH.to_string()]);
        assert!(!h.service.is_authenticated());
    }

    #[tokio::test]
    async fn test_unauthorized_on_sign_in_also_signs_out() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/vica/auths/signin")
            .with_status(401)
            .create_async()
            .await;

        let h = harness(&server, unused_provider());
        h.store.set("OLD").unwrap();

        let err = h.service.sign_in("a@b.com", "pw").await.unwrap_err();

        assert!(err.is_session_expired());
        assert_eq!(h.store.get().unwrap(), None);
        assert_eq!(h.navigator.redirects().len(), 1);
    }

    #[tokio::test]
    async fn test_sign_in_rejection_keeps_backend_message() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/vica/auths/signin")
            .with_status(400)
            .with_body(r#"{"detail": "Invalid password."}"#)
            .create_async()
            .await;

        let h = harness(&server, unused_provider());
        let err = h.service.sign_in("a@b.com", "wrong").await.unwrap_err();

        assert!(matches!(err, AuthError::Api(ApiError::Rejected { .. })));
        assert_eq!(err.user_message(), "Invalid password.");
        assert_eq!(h.store.get().unwrap(), None);
        assert!(h.navigator.redirects().is_empty());
    }

    #[tokio::test]
    async fn test_server_failure_falls_back_to_generic_message() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/vica/auths/signin")
            .with_status(502)
            .with_body("<html>Bad Gateway</html>")
            .create_async()
            .await;

        let h = harness(&server, unused_provider());
        let err = h.service.sign_in("a@b.com", "pw").await.unwrap_err();

        assert!(matches!(err, AuthError::Api(ApiError::ServerError { .. })));
        assert_eq!(err.user_message(), GENERIC_FAILURE_MESSAGE);
    }

    #[tokio::test]
    async fn test_response_without_token_leaves_store_alone() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/vica/auths/signin")
            .with_status(200)
            .with_body(r#"{"token": "", "name": "A"}"#)
            .create_async()
            .await;

        let h = harness(&server, unused_provider());
        h.store.set("EXISTING").unwrap();

        let response = h.service.sign_in("a@b.com", "pw").await.unwrap();
        assert_eq!(response.name.as_deref(), Some("A"));
        assert_eq!(h.store.get().unwrap().as_deref(), Some("EXISTING"));
    }

    #[tokio::test]
    async fn test_sign_up_without_avatar_sends_empty_url() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/vica/auths/signup")
            .match_body(Matcher::Json(json!({
                "name": "Jane",
                "email": "j@x.com",
                "password": "pw",
                "profile_image_url": "",
            })))
            .with_status(200)
            .with_body(r#"{"token": "T2"}"#)
            .create_async()
            .await;

        let h = harness(&server, unused_provider());
        h.service.sign_up("Jane", "j@x.com", "pw", None).await.unwrap();

        mock.assert_async().await;
        assert_eq!(h.store.get().unwrap().as_deref(), Some("T2"));
    }

    #[tokio::test]
    async fn test_sign_up_with_avatar() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/vica/auths/signup")
            .match_body(Matcher::PartialJson(json!({
                "profile_image_url": "https://cdn.example/jane.png",
            })))
            .with_status(200)
            .with_body(r#"{"token": "T3"}"#)
            .create_async()
            .await;

        let h = harness(&server, unused_provider());
        h.service
            .sign_up("Jane", "j@x.com", "pw", Some("https://cdn.example/jane.png"))
            .await
            .unwrap();

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_federated_sign_in_exchanges_assertion() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/vica/auths/firebase-auth")
            .match_body(Matcher::Json(json!({"id_token": "google-assertion"})))
            .with_status(200)
            .with_body(r#"{"token": "T4", "email": "g@x.com"}"#)
            .create_async()
            .await;

        let provider = ScriptedProvider::returning(Ok(IdentityAssertion::new("google-assertion")));
        let h = harness(&server, provider);

        let response = h.service.sign_in_federated().await.unwrap();

        mock.assert_async().await;
        assert_eq!(response.email.as_deref(), Some("g@x.com"));
        assert_eq!(h.store.get().unwrap().as_deref(), Some("T4"));
    }

    #[tokio::test]
    async fn test_federated_cancel_never_contacts_backend() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/vica/auths/firebase-auth")
            .expect(0)
            .create_async()
            .await;

        let provider = ScriptedProvider::returning(Err(ProviderError::Cancelled(
            "popup_closed_by_user".to_string(),
        )));
        let h = harness(&server, provider);
        h.store.set("UNCHANGED").unwrap();

        let err = h.service.sign_in_federated().await.unwrap_err();

        assert!(matches!(err, AuthError::Provider(ProviderError::Cancelled(_))));
        assert_eq!(err.user_message(), "Federated sign-in was cancelled.");
        assert_eq!(h.store.get().unwrap().as_deref(), Some("UNCHANGED"));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_logout_is_idempotent() {
        let server = Server::new_async().await;
        let h = harness(&server, unused_provider());

        h.store.set("T1").unwrap();
        h.service.logout().unwrap();
        assert!(!h.service.is_authenticated());

        h.service.logout().unwrap();
        assert_eq!(h.store.get().unwrap(), None);
    }

    #[tokio::test]
    async fn test_concurrent_sign_ins_leave_one_token() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/vica/auths/signin")
            .match_body(Matcher::PartialJson(json!({"email": "first@x.com"})))
            .with_status(200)
            .with_body(r#"{"token": "FIRST"}"#)
            .create_async()
            .await;
        server
            .mock("POST", "/vica/auths/signin")
            .match_body(Matcher::PartialJson(json!({"email": "second@x.com"})))
            .with_status(200)
            .with_body(r#"{"token": "SECOND"}"#)
            .create_async()
            .await;

        let h = harness(&server, unused_provider());
        let (a, b) = tokio::join!(
            h.service.sign_in("first@x.com", "pw"),
            h.service.sign_in("second@x.com", "pw"),
        );
        a.unwrap();
        b.unwrap();

        let stored = h.store.get().unwrap().unwrap();
        assert!(stored == "FIRST" || stored == "SECOND");
    }

    #[test]
    fn test_auth_response_tolerates_missing_fields() {
        assert_eq!(AuthResponse::from(json!({})), AuthResponse::default());
        assert_eq!(AuthResponse::from(Value::Null), AuthResponse::default());
    }

    #[test]
    fn test_auth_response_keeps_odd_fields_in_extra() {
        let response = AuthResponse::from(json!({
            "token": "T1",
            "id": 42,
            "name": null,
            "role": ["admin"],
        }));

        assert_eq!(response.token.as_deref(), Some("T1"));
        assert_eq!(response.id.as_deref(), Some("42"));
        assert_eq!(response.name, None);
        assert_eq!(response.role, None);
        assert_eq!(response.extra.get("role"), Some(&json!(["admin"])));
        assert!(!response.extra.contains_key("token"));
    }

    #[tokio::test]
    async fn test_token_stored_despite_unexpected_profile_types() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/vica/auths/signin")
            .with_status(200)
            .with_body(r#"{"token": "T1", "id": 42, "email": {"primary": "a@b.com"}}"#)
            .create_async()
            .await;

        let h = harness(&server, unused_provider());
        let response = h.service.sign_in("a@b.com", "pw").await.unwrap();

        assert_eq!(response.token.as_deref(), Some("T1"));
        assert_eq!(response.email, None);
        assert_eq!(h.store.get().unwrap().as_deref(), Some("T1"));
    }

    #[tokio::test]
    async fn test_unauthorized_request_does_not_disturb_others_in_flight() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/vica/users/getUser/expired")
            .with_status(401)
            .create_async()
            .await;
        server
            .mock("GET", "/vica/users/getUser/u-1")
            .with_status(200)
            .with_body(r#"{"id": "u-1"}"#)
            .create_async()
            .await;

        let h = harness(&server, unused_provider());
        h.store.set("T1").unwrap();

        let api = h.service.api();
        let (expired, user) = tokio::join!(
            api.get_json::<Value>("/vica/users/getUser/expired"),
            api.get_json::<Value>("/vica/users/getUser/u-1"),
        );

        assert!(matches!(expired, Err(ApiError::SessionExpired)));
        assert_eq!(user.unwrap(), json!({"id": "u-1"}));
        assert_eq!(h.store.get().unwrap(), None);
        assert_eq!(h.navigator.redirects(), vec![LOGIN_PATH.to_string()]);
    }
}
