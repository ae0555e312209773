//! Core library for pewcap.
//!
//! Logs in to Personal Capital, keeping the cookie session on disk so that
//! unattended runs skip the SMS/email verification step, then fetches a
//! window of recent transactions as raw JSON.

pub mod api;
pub mod app;
pub mod auth;
pub mod config;
pub mod output;
pub mod transactions;

#[cfg(test)]
pub(crate) mod test_support;

pub use api::{ApiError, PersonalCapitalClient, RemoteApi, TransactionResponse, TwoFactorMethod};
pub use auth::{
    AuthClient, AuthError, AuthState, Credentials, FileSessionStore, LoginOutcome, OperatorInput,
    Session, SessionStore,
};
pub use config::Config;
pub use output::OutputSink;
pub use transactions::{DateWindow, FetchOrchestrator, TransactionBatch};
