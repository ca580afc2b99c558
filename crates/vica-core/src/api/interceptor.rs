//! Request and response hooks registered once on the shared `ApiClient`.
//!
//! A `RequestInterceptor` may rewrite the outgoing `RequestContext` (the
//! bearer credential is injected this way). A `ResponseInterceptor` sees the
//! status of every response before the caller does and may halt further
//! handling with an error of its own.

use std::fmt;

use reqwest::header::HeaderMap;
use reqwest::{Method, StatusCode};
use serde::Serialize;
use serde_json::Value;

use super::ApiError;

/// Description of one outgoing request, owned by the client for a single call.
#[derive(Clone)]
pub struct RequestContext {
    pub method: Method,
    pub path: String,
    pub body: Option<Value>,
    pub headers: HeaderMap,
}

impl RequestContext {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            body: None,
            headers: HeaderMap::new(),
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    /// Attach a JSON body
    pub fn json<B: Serialize + ?Sized>(mut self, body: &B) -> Result<Self, ApiError> {
        self.body = Some(serde_json::to_value(body)?);
        Ok(self)
    }
}

// Bodies carry passwords and identity tokens
impl fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestContext")
            .field("method", &self.method)
            .field("path", &self.path)
            .field("body", &self.body.as_ref().map(|_| "<redacted>"))
            .field("headers", &self.headers)
            .finish()
    }
}

/// What the client should do after a response interceptor has run
#[derive(Debug)]
pub enum ResponseAction {
    /// Hand the response on to the next interceptor and then the caller
    Continue,
    /// Stop here and fail the call with this error
    Halt(ApiError),
}

pub trait RequestInterceptor: Send + Sync {
    /// Called before every request is sent, on tokio's blocking pool, so
    /// blocking I/O is allowed here. Must not fail the request.
    fn on_request(&self, request: &mut RequestContext);
}

pub trait ResponseInterceptor: Send + Sync {
    /// Called for every response that arrives, whatever its status.
    fn on_response(&self, request: &RequestContext, status: StatusCode) -> ResponseAction;
}
