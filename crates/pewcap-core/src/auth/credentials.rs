use std::fmt;
use std::io;

use tracing::warn;

/// Something that can ask the operator a question and wait for the answer.
///
/// The terminal implementation lives in the binary; tests script the answers.
pub trait OperatorInput {
    /// Ask for a visible value (email, verification code)
    fn prompt(&self, message: &str) -> io::Result<String>;

    /// Ask for a value that must not be echoed
    fn prompt_secret(&self, message: &str) -> io::Result<String>;
}

/// Login credentials for a single run. Never persisted.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    email: String,
    secret: String,
}

impl Credentials {
    pub fn new(email: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            secret: secret.into(),
        }
    }

    /// Use configured values where present, prompting for the rest
    pub fn resolve(
        email: Option<&str>,
        secret: Option<&str>,
        input: &dyn OperatorInput,
    ) -> io::Result<Self> {
        let email = match email.filter(|e| !e.is_empty()) {
            Some(email) => email.to_string(),
            None => {
                warn!("PEW_EMAIL and PEW_PASSWORD can be set so these prompts don't come up every time");
                input.prompt("Enter email: ")?.trim().to_string()
            }
        };

        let secret = match secret.filter(|s| !s.is_empty()) {
            Some(secret) => secret.to_string(),
            None => input.prompt_secret("Enter password: ")?,
        };

        Ok(Self { email, secret })
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    pub fn secret(&self) -> &str {
        &self.secret
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("secret", &"<redacted>")
            .finish()
    }
}
