//! HTTP client for the Personal Capital web API.
//!
//! The API is session-cookie based: every response may set cookies that must
//! be replayed on later requests, and every POST carries a CSRF token that is
//! first scraped from the home page and then refreshed from each response
//! envelope (`spHeader.csrf`).

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::auth::Session;

use super::{ApiError, SessionJar};

// ============================================================================
// Constants
// ============================================================================

/// Home page; also the source of the initial CSRF token
pub const DEFAULT_BASE_URL: &str = "https://home.personalcapital.com";

/// HTTP request timeout in seconds.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// The API rejects requests that don't look like they come from the web app.
const USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Marker preceding the CSRF token in the home page source
const CSRF_MARKER: &str = "globals.csrf='";

const API_CLIENT: &str = "WEB";

// ============================================================================
// Wire types
// ============================================================================

/// How much the server trusts the current session after identifying the user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuthLevel {
    UserRemembered,
    UserIdentified,
    DeviceAuthorized,
    SessionAuthenticated,
    None,
    #[serde(other)]
    Unknown,
}

impl AuthLevel {
    /// Only a remembered device may skip the second factor
    pub fn is_remembered(self) -> bool {
        matches!(self, AuthLevel::UserRemembered)
    }
}

/// Out-of-band channel for the verification code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TwoFactorMethod {
    #[default]
    Sms,
    Email,
}

impl TwoFactorMethod {
    fn challenge_path(self) -> &'static str {
        match self {
            TwoFactorMethod::Sms => "/credential/challengeSms",
            TwoFactorMethod::Email => "/credential/challengeEmail",
        }
    }

    fn challenge_type(self) -> &'static str {
        match self {
            TwoFactorMethod::Sms => "challengeSMS",
            TwoFactorMethod::Email => "challengeEmail",
        }
    }

    fn verify_path(self) -> &'static str {
        match self {
            TwoFactorMethod::Sms => "/credential/authenticateSms",
            TwoFactorMethod::Email => "/credential/authenticateEmailByCode",
        }
    }
}

impl fmt::Display for TwoFactorMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TwoFactorMethod::Sms => write!(f, "sms"),
            TwoFactorMethod::Email => write!(f, "email"),
        }
    }
}

impl FromStr for TwoFactorMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sms" => Ok(TwoFactorMethod::Sms),
            "email" => Ok(TwoFactorMethod::Email),
            other => Err(format!("unknown two-factor method '{}' (expected sms or email)", other)),
        }
    }
}

/// Raw body of a data request. Never parsed.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TransactionResponse(Vec<u8>);

impl TransactionResponse {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<u8>> for TransactionResponse {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(rename = "spHeader", default)]
    header: SpHeader,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SpHeader {
    csrf: Option<String>,
    auth_level: Option<AuthLevel>,
    success: Option<bool>,
    #[serde(default)]
    errors: Vec<SpError>,
}

#[derive(Debug, Deserialize)]
struct SpError {
    message: Option<String>,
    code: Option<i64>,
}

impl SpHeader {
    fn parse(body: &str) -> Result<Self, ApiError> {
        serde_json::from_str::<Envelope>(body)
            .map(|e| e.header)
            .map_err(|e| ApiError::InvalidResponse(format!("Unparseable response envelope: {}", e)))
    }

    /// Turn `success: false` into an error carrying the server's messages
    fn into_result(self) -> Result<Self, ApiError> {
        if self.success != Some(false) {
            return Ok(self);
        }
        let messages = self
            .errors
            .iter()
            .map(|e| match (&e.message, e.code) {
                (Some(m), Some(c)) => format!("{} (code {})", m, c),
                (Some(m), None) => m.clone(),
                (None, Some(c)) => format!("code {}", c),
                (None, None) => "unknown error".to_string(),
            })
            .collect::<Vec<_>>();
        let detail = if messages.is_empty() {
            "no error details".to_string()
        } else {
            messages.join("; ")
        };
        Err(ApiError::Rejected(detail))
    }
}

/// Classify a data response without altering it. A failed envelope means the
/// session is no longer accepted unless the server still reports it as
/// authenticated, in which case the request itself was refused.
fn check_data_envelope(body: &[u8]) -> Result<(), ApiError> {
    let Ok(envelope) = serde_json::from_slice::<Envelope>(body) else {
        return Ok(());
    };
    let header = envelope.header;
    if header.success != Some(false) {
        return Ok(());
    }
    if header.auth_level == Some(AuthLevel::SessionAuthenticated) {
        return header.into_result().map(|_| ());
    }
    Err(ApiError::Unauthorized)
}

/// Pull the CSRF token out of the home page source
fn extract_csrf(page: &str) -> Option<String> {
    let start = page.find(CSRF_MARKER)? + CSRF_MARKER.len();
    let rest = &page[start..];
    let token = &rest[..rest.find('\'')?];
    let valid = !token.is_empty()
        && token
            .chars()
            .all(|c| c == '-' || c.is_ascii_digit() || ('a'..='f').contains(&c));
    valid.then(|| token.to_string())
}

// ============================================================================
// Transport seam
// ============================================================================

/// The remote half of the login handshake plus authenticated data requests.
///
/// Implementations own the cookie session; the auth state machine drives them.
#[async_trait]
pub trait RemoteApi: Send {
    /// Snapshot of the current cookie session
    fn session(&self) -> Session;

    /// Replace the cookie session (restore from disk)
    fn set_session(&mut self, session: Session);

    /// Identify the user and report how far the session is trusted
    async fn identify_user(&mut self, email: &str) -> Result<AuthLevel, ApiError>;

    /// Ask the server to send a verification code via `method`
    async fn challenge(&mut self, method: TwoFactorMethod) -> Result<(), ApiError>;

    /// Submit the verification code received via `method`
    async fn verify(&mut self, method: TwoFactorMethod, code: &str) -> Result<(), ApiError>;

    /// Submit the account password
    async fn authenticate_password(&mut self, secret: &str) -> Result<(), ApiError>;

    /// Authenticated POST to an API endpoint, returning the raw body
    async fn fetch(
        &mut self,
        endpoint: &str,
        params: &[(&str, &str)],
    ) -> Result<TransactionResponse, ApiError>;
}

// ============================================================================
// Personal Capital client
// ============================================================================

pub struct PersonalCapitalClient {
    client: Client,
    base_url: String,
    jar: Arc<SessionJar>,
    csrf: Option<String>,
}

impl PersonalCapitalClient {
    pub fn new() -> Result<Self, ApiError> {
        Self::with_base_url(DEFAULT_BASE_URL)
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Result<Self, ApiError> {
        let jar = Arc::new(SessionJar::default());
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .user_agent(USER_AGENT)
            .cookie_provider(Arc::clone(&jar))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            jar,
            csrf: None,
        })
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}/api{}", self.base_url, path)
    }

    /// Scrape a fresh CSRF token from the home page
    async fn refresh_csrf(&mut self) -> Result<(), ApiError> {
        let response = self.client.get(&self.base_url).send().await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(ApiError::from_status(status, &body));
        }

        let csrf = extract_csrf(&body).ok_or(ApiError::MissingCsrf)?;
        debug!("Obtained CSRF token from home page");
        self.csrf = Some(csrf);
        Ok(())
    }

    async fn post(
        &self,
        path: &str,
        form: &[(&str, &str)],
    ) -> Result<reqwest::Response, ApiError> {
        let csrf = self.csrf.clone().unwrap_or_default();
        let mut fields: Vec<(&str, &str)> = vec![("csrf", csrf.as_str()), ("apiClient", API_CLIENT)];
        fields.extend_from_slice(form);

        let url = self.api_url(path);
        debug!(url = %url, "POST");
        let response = self.client.post(&url).form(&fields).send().await?;
        Ok(response)
    }

    /// POST a handshake step and check both the HTTP status and the envelope
    async fn post_checked(
        &mut self,
        path: &str,
        form: &[(&str, &str)],
    ) -> Result<SpHeader, ApiError> {
        let response = self.post(path, form).await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(ApiError::from_status(status, &body));
        }

        let header = SpHeader::parse(&body)?;
        if let Some(ref csrf) = header.csrf {
            self.csrf = Some(csrf.clone());
        }
        header.into_result()
    }
}

#[async_trait]
impl RemoteApi for PersonalCapitalClient {
    fn session(&self) -> Session {
        self.jar.snapshot()
    }

    fn set_session(&mut self, session: Session) {
        self.jar.replace(session);
    }

    async fn identify_user(&mut self, email: &str) -> Result<AuthLevel, ApiError> {
        self.refresh_csrf().await?;

        let header = self
            .post_checked(
                "/login/identifyUser",
                &[
                    ("username", email),
                    ("bindDevice", "false"),
                    ("skipLinkAccount", "false"),
                    ("redirectTo", ""),
                    ("skipFirstUse", ""),
                    ("referrerId", ""),
                ],
            )
            .await?;

        let Some(level) = header.auth_level else {
            warn!("identifyUser response carried no authLevel");
            return Err(ApiError::InvalidResponse(
                "Unable to identify user".to_string(),
            ));
        };
        debug!(auth_level = ?level, "Identified user");
        Ok(level)
    }

    async fn challenge(&mut self, method: TwoFactorMethod) -> Result<(), ApiError> {
        self.post_checked(
            method.challenge_path(),
            &[
                ("challengeReason", "DEVICE_AUTH"),
                ("challengeMethod", "OP"),
                ("challengeType", method.challenge_type()),
                ("bindDevice", "false"),
            ],
        )
        .await?;
        Ok(())
    }

    async fn verify(&mut self, method: TwoFactorMethod, code: &str) -> Result<(), ApiError> {
        self.post_checked(
            method.verify_path(),
            &[
                ("challengeReason", "DEVICE_AUTH"),
                ("challengeMethod", "OP"),
                ("bindDevice", "false"),
                ("code", code),
            ],
        )
        .await?;
        Ok(())
    }

    async fn authenticate_password(&mut self, secret: &str) -> Result<(), ApiError> {
        self.post_checked(
            "/credential/authenticatePassword",
            &[
                ("bindDevice", "true"),
                ("deviceName", ""),
                ("redirectTo", ""),
                ("skipFirstUse", ""),
                ("skipLinkAccount", "false"),
                ("referrerId", ""),
                ("passwd", secret),
            ],
        )
        .await?;
        Ok(())
    }

    async fn fetch(
        &mut self,
        endpoint: &str,
        params: &[(&str, &str)],
    ) -> Result<TransactionResponse, ApiError> {
        let mut form: Vec<(&str, &str)> = vec![("lastServerChangeId", "-1")];
        form.extend_from_slice(params);

        let response = self.post(endpoint, &form).await?;
        let status = response.status();
        let bytes = response.bytes().await?;
        if !status.is_success() {
            return Err(ApiError::from_status(
                status,
                &String::from_utf8_lossy(&bytes),
            ));
        }

        check_data_envelope(&bytes)?;
        debug!(endpoint = endpoint, bytes = bytes.len(), "Fetched");
        Ok(TransactionResponse::from(bytes.to_vec()))
    }
}

// ============================================================================
// Tests
// ============================================================================
