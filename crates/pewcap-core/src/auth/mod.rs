//! Authentication module for sessions, credentials and the login handshake.
//!
//! This module provides:
//! - `Session` / `SessionStore`: cookie state persisted between runs
//! - `Credentials` / `OperatorInput`: login secrets and interactive prompts
//! - `AuthClient`: the login state machine, escalating to a second factor
//!   when the restored session is no longer trusted

pub mod client;
pub mod credentials;
pub mod session;

pub use client::{AuthClient, AuthError, AuthState, LoginOutcome};
pub use credentials::{Credentials, OperatorInput};
pub use session::{FileSessionStore, Session, SessionError, SessionStore, DEFAULT_SESSION_FILE};
