//! HTTP client module for the VICA backend.
//!
//! This module provides the `ApiClient`, a shared request pipeline with
//! explicit request and response interceptors, and the `ApiError` taxonomy
//! every backend call reports through.

pub mod client;
pub mod error;
pub mod interceptor;

pub use client::{ApiClient, ApiClientBuilder};
pub use error::ApiError;
pub use interceptor::{RequestContext, RequestInterceptor, ResponseAction, ResponseInterceptor};
