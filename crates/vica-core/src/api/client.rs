//! API client for communicating with the VICA backend.
//!
//! This module provides the `ApiClient` struct: a thin pipeline over
//! `reqwest` that runs every registered `RequestInterceptor` before a request
//! goes out and every `ResponseInterceptor` when a response comes back.

use std::sync::Arc;
use std::time::Duration;

use reqwest::{Client, Response};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, warn};

use super::interceptor::{RequestContext, RequestInterceptor, ResponseAction, ResponseInterceptor};
use super::ApiError;

// ============================================================================
// Constants
// ============================================================================

/// HTTP request timeout in seconds.
/// 30s allows for slow API responses while failing fast enough for good UX.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Builder that collects interceptors before the shared client is created.
pub struct ApiClientBuilder {
    base_url: String,
    timeout: Duration,
    request_interceptors: Vec<Arc<dyn RequestInterceptor>>,
    response_interceptors: Vec<Arc<dyn ResponseInterceptor>>,
}

impl ApiClientBuilder {
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn request_interceptor(mut self, interceptor: Arc<dyn RequestInterceptor>) -> Self {
        self.request_interceptors.push(interceptor);
        self
    }

    pub fn response_interceptor(mut self, interceptor: Arc<dyn ResponseInterceptor>) -> Self {
        self.response_interceptors.push(interceptor);
        self
    }

    pub fn build(self) -> Result<ApiClient, ApiError> {
        let client = Client::builder().timeout(self.timeout).build()?;

        Ok(ApiClient {
            client,
            base_url: self.base_url.trim_end_matches('/').to_string(),
            request_interceptors: Arc::new(self.request_interceptors),
            response_interceptors: Arc::new(self.response_interceptors),
        })
    }
}

/// API client for the VICA backend.
/// Clone is cheap - reqwest::Client and the interceptor lists are shared.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    request_interceptors: Arc<Vec<Arc<dyn RequestInterceptor>>>,
    response_interceptors: Arc<Vec<Arc<dyn ResponseInterceptor>>>,
}

impl ApiClient {
    pub fn builder(base_url: impl Into<String>) -> ApiClientBuilder {
        ApiClientBuilder {
            base_url: base_url.into(),
            timeout: Duration::from_secs(REQUEST_TIMEOUT_SECS),
            request_interceptors: Vec::new(),
            response_interceptors: Vec::new(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Check if response is successful, returning an error with body if not.
    async fn check_response(response: Response) -> Result<Response, ApiError> {
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(ApiError::from_status(status, &body))
        }
    }

    /// Run the request interceptors on the blocking pool; token stores may
    /// touch the filesystem or the OS keychain.
    async fn intercept_request(&self, mut request: RequestContext) -> RequestContext {
        if self.request_interceptors.is_empty() {
            return request;
        }
        let interceptors = self.request_interceptors.clone();
        let intercepted = tokio::task::spawn_blocking(move || {
            for interceptor in interceptors.iter() {
                interceptor.on_request(&mut request);
            }
            request
        })
        .await;

        match intercepted {
            Ok(request) => request,
            Err(e) => std::panic::resume_unwind(e.into_panic()),
        }
    }

    /// Send a request through the interceptor pipeline.
    ///
    /// Returns the response only when it is a success; a response interceptor
    /// halting, a non-2xx status and transport failures all come back as errors.
    pub async fn send(&self, request: RequestContext) -> Result<Response, ApiError> {
        let request = self.intercept_request(request).await;

        let url = self.url(&request.path);
        let mut builder = self
            .client
            .request(request.method.clone(), &url)
            .headers(request.headers.clone());
        if let Some(ref body) = request.body {
            builder = builder.json(body);
        }

        debug!(method = %request.method, url = %url, "Sending request");
        let response = builder.send().await.map_err(|e| {
            warn!(method = %request.method, url = %url, error = %e, "Request failed before a response arrived");
            ApiError::NetworkError(e)
        })?;

        let status = response.status();
        debug!(method = %request.method, url = %url, status = %status, "Received response");

        for interceptor in self.response_interceptors.iter() {
            if let ResponseAction::Halt(err) = interceptor.on_response(&request, status) {
                return Err(err);
            }
        }

        Self::check_response(response).await
    }

    async fn read_json<T: DeserializeOwned>(response: Response, path: &str) -> Result<T, ApiError> {
        let text = response.text().await?;
        serde_json::from_str(&text).map_err(|e| {
            ApiError::InvalidResponse(format!("Failed to parse JSON response from {}: {}", path, e))
        })
    }

    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let response = self.send(RequestContext::get(path)).await?;
        Self::read_json(response, path).await
    }

    pub async fn post_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        let request = RequestContext::post(path).json(body)?;
        let response = self.send(request).await?;
        Self::read_json(response, path).await
    }
}
