//! Run configuration.
//!
//! Built once at process start (the binary fills it from flags and `PEW_*`
//! environment variables) and passed by reference from then on.

use std::fmt;
use std::path::PathBuf;

use crate::api::TwoFactorMethod;
use crate::auth::DEFAULT_SESSION_FILE;

pub const ENV_SESSION_FILE: &str = "PEW_SESSION_FILE";
pub const ENV_EMAIL: &str = "PEW_EMAIL";
pub const ENV_PASSWORD: &str = "PEW_PASSWORD";
pub const ENV_OUTPUT_DIR: &str = "PEW_OUTPUT_DIR";
pub const ENV_TWO_FACTOR: &str = "PEW_TWO_FACTOR";

/// Output directory when `PEW_OUTPUT_DIR` is unset
pub const DEFAULT_OUTPUT_DIR: &str = ".";

#[derive(Clone, PartialEq, Eq)]
pub struct Config {
    pub session_file: PathBuf,
    pub output_dir: PathBuf,
    pub email: Option<String>,
    pub password: Option<String>,
    pub two_factor: TwoFactorMethod,
    /// Fetch a year instead of a week
    pub extended: bool,
    pub to_stdout: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            session_file: PathBuf::from(DEFAULT_SESSION_FILE),
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            email: None,
            password: None,
            two_factor: TwoFactorMethod::default(),
            extended: false,
            to_stdout: false,
        }
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("session_file", &self.session_file)
            .field("output_dir", &self.output_dir)
            .field("email", &self.email)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("two_factor", &self.two_factor)
            .field("extended", &self.extended)
            .field("to_stdout", &self.to_stdout)
            .finish()
    }
}
