//! Core library for the VICA client.
//!
//! Provides the pieces a front end needs to sign a user in and keep the
//! session alive:
//! - `api`: the shared HTTP client and its request/response interceptors
//! - `auth`: token stores, identity providers and the `AuthService` facade
//! - `config`: environment-driven configuration

pub mod api;
pub mod auth;
pub mod config;

pub use api::{ApiClient, ApiError};
pub use auth::{AuthError, AuthResponse, AuthService, TokenStore};
pub use config::Config;
