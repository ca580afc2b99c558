use std::fmt;

use futures::future::BoxFuture;
use thiserror::Error;

/// Signed proof of identity from the external provider.
///
/// Exchanged with the backend straight away and never persisted.
#[derive(Clone, PartialEq, Eq)]
pub struct IdentityAssertion(String);

impl IdentityAssertion {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for IdentityAssertion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("IdentityAssertion(<redacted>)")
    }
}

#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("Sign-in was cancelled: {0}")]
    Cancelled(String),

    #[error("Identity provider unavailable: {0}")]
    Unavailable(String),

    #[error("Timed out after {0}s waiting for the identity provider")]
    Timeout(u64),

    #[error("Identity provider returned an invalid response: {0}")]
    InvalidResponse(String),
}

/// Interactive federated sign-in.
///
/// Resolves once the user finishes or abandons the flow. An error means no
/// assertion was issued.
pub trait IdentityProvider: Send + Sync {
    fn sign_in_federated(&self) -> BoxFuture<'_, Result<IdentityAssertion, ProviderError>>;
}
