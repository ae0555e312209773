//! Login state machine over a [`RemoteApi`] transport.
//!
//! ```text
//! Unauthenticated --login--> Authenticated                 (remembered session)
//! Unauthenticated --login--> SecondFactorRequired(method)
//! SecondFactorRequired --challenge/verify/password--> Authenticated
//! Authenticated --rejected on fetch--> Unauthenticated     (fatal for the run)
//! ```

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::api::{ApiError, RemoteApi, TransactionResponse, TwoFactorMethod};

use super::credentials::{Credentials, OperatorInput};
use super::session::{SessionError, SessionStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    Unauthenticated,
    SecondFactorRequired(TwoFactorMethod),
    Authenticated,
}

/// What `login` achieved without operator interaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginOutcome {
    Authenticated,
    SecondFactorRequired(TwoFactorMethod),
}

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Login rejected: {0}")]
    Rejected(#[source] ApiError),

    #[error("Failed to send {method} verification challenge: {source}")]
    ChallengeFailed {
        method: TwoFactorMethod,
        #[source]
        source: ApiError,
    },

    #[error("Verification code rejected: {0}")]
    VerificationFailed(#[source] ApiError),

    #[error("Password confirmation after verification failed: {0}")]
    PasswordConfirmationFailed(#[source] ApiError),

    #[error("Failed to read operator input: {0}")]
    Input(#[from] std::io::Error),

    #[error("No second-factor challenge is pending")]
    NotAwaitingSecondFactor,

    #[error("Not authenticated")]
    NotAuthenticated,

    #[error("Session rejected by server")]
    SessionRejected,

    #[error("Request failed: {0}")]
    Api(#[source] ApiError),
}

/// Drives the login handshake and owns the session's persistence.
pub struct AuthClient<A, S> {
    api: A,
    store: S,
    method: TwoFactorMethod,
    state: AuthState,
}

impl<A: RemoteApi, S: SessionStore> AuthClient<A, S> {
    pub fn new(api: A, store: S) -> Self {
        Self {
            api,
            store,
            method: TwoFactorMethod::default(),
            state: AuthState::Unauthenticated,
        }
    }

    /// Channel used when a second factor is required
    pub fn with_method(mut self, method: TwoFactorMethod) -> Self {
        self.method = method;
        self
    }

    pub fn state(&self) -> AuthState {
        self.state
    }

    /// The underlying transport
    pub fn api(&self) -> &A {
        &self.api
    }

    pub fn is_authenticated(&self) -> bool {
        self.state == AuthState::Authenticated
    }

    /// Hand the stored session to the transport
    pub fn restore_session(&mut self) {
        let session = self.store.load();
        debug!(cookies = session.len(), "Restoring session");
        self.api.set_session(session);
    }

    /// Write the transport's current session back to the store
    pub fn persist_session(&self) -> Result<(), SessionError> {
        self.store.save(&self.api.session())
    }

    /// Try to authenticate without operator interaction.
    ///
    /// A no-op when already authenticated.
    pub async fn login(&mut self, credentials: &Credentials) -> Result<LoginOutcome, AuthError> {
        if self.state == AuthState::Authenticated {
            debug!("Already authenticated, keeping session");
            return Ok(LoginOutcome::Authenticated);
        }

        let level = self
            .api
            .identify_user(credentials.email())
            .await
            .map_err(AuthError::Rejected)?;

        if !level.is_remembered() {
            info!(auth_level = ?level, method = %self.method, "Session not remembered, second factor required");
            self.state = AuthState::SecondFactorRequired(self.method);
            return Ok(LoginOutcome::SecondFactorRequired(self.method));
        }

        self.api
            .authenticate_password(credentials.secret())
            .await
            .map_err(AuthError::Rejected)?;

        info!("Authenticated with remembered session");
        self.state = AuthState::Authenticated;
        Ok(LoginOutcome::Authenticated)
    }

    /// Challenge, prompt for the code, verify, then confirm the password.
    ///
    /// Every step is fatal on failure; nothing is retried.
    pub async fn complete_second_factor(
        &mut self,
        credentials: &Credentials,
        input: &dyn OperatorInput,
    ) -> Result<(), AuthError> {
        let method = match self.state {
            AuthState::SecondFactorRequired(method) => method,
            AuthState::Authenticated => return Ok(()),
            AuthState::Unauthenticated => return Err(AuthError::NotAwaitingSecondFactor),
        };

        self.api
            .challenge(method)
            .await
            .map_err(|source| AuthError::ChallengeFailed { method, source })?;
        info!(method = %method, "Verification code requested");

        let code = input.prompt("code: ")?;
        let code = code.trim();

        self.api
            .verify(method, code)
            .await
            .map_err(AuthError::VerificationFailed)?;

        self.api
            .authenticate_password(credentials.secret())
            .await
            .map_err(AuthError::PasswordConfirmationFailed)?;

        info!("Authenticated after second factor");
        self.state = AuthState::Authenticated;
        Ok(())
    }

    /// Log in, escalating to the second factor when the server asks for it
    pub async fn authenticate(
        &mut self,
        credentials: &Credentials,
        input: &dyn OperatorInput,
    ) -> Result<(), AuthError> {
        match self.login(credentials).await? {
            LoginOutcome::Authenticated => Ok(()),
            LoginOutcome::SecondFactorRequired(_) => {
                self.complete_second_factor(credentials, input).await
            }
        }
    }

    /// Authenticated request reusing the established session
    pub async fn fetch(
        &mut self,
        endpoint: &str,
        params: &[(&str, &str)],
    ) -> Result<TransactionResponse, AuthError> {
        if self.state != AuthState::Authenticated {
            return Err(AuthError::NotAuthenticated);
        }

        match self.api.fetch(endpoint, params).await {
            Ok(response) => Ok(response),
            Err(ApiError::Unauthorized) => {
                warn!(endpoint = endpoint, "Server rejected the session");
                self.state = AuthState::Unauthenticated;
                Err(AuthError::SessionRejected)
            }
            Err(e) => Err(AuthError::Api(e)),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
