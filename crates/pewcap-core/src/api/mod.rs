//! Remote API module for the Personal Capital web service.
//!
//! This module provides the `RemoteApi` transport seam and the
//! `PersonalCapitalClient` that implements it over HTTPS.
//!
//! The service authenticates with session cookies plus a rotating CSRF
//! token; a remembered device skips the SMS/email verification step.

pub mod client;
pub mod cookies;
pub mod error;

pub use client::{
    AuthLevel, PersonalCapitalClient, RemoteApi, TransactionResponse, TwoFactorMethod,
    DEFAULT_BASE_URL,
};
pub use cookies::SessionJar;
pub use error::ApiError;
