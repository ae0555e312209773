//! Cookie store handed to reqwest so it can manage the session, including
//! cookies set on redirect responses, while the contents stay a plain
//! [`Session`] that can be written to disk.

use std::sync::{PoisonError, RwLock};

use cookie::Cookie;
use reqwest::cookie::CookieStore;
use reqwest::header::HeaderValue;
use reqwest::Url;
use tracing::{debug, warn};

use crate::auth::Session;

/// A [`Session`] shared with the HTTP client.
///
/// The session is a flat name/value map for a single host, so cookie
/// domain and path attributes are not tracked.
#[derive(Debug, Default)]
pub struct SessionJar {
    session: RwLock<Session>,
}

impl SessionJar {
    pub fn snapshot(&self) -> Session {
        self.session
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn replace(&self, session: Session) {
        *self.session.write().unwrap_or_else(PoisonError::into_inner) = session;
    }
}

/// Apply one `Set-Cookie` header. An empty value or a zero max-age removes
/// the cookie; other attributes are dropped.
fn absorb(session: &mut Session, header: &HeaderValue) {
    let Ok(text) = header.to_str() else {
        warn!("Ignoring non-ASCII Set-Cookie header");
        return;
    };
    let cookie = match Cookie::parse(text) {
        Ok(cookie) => cookie,
        Err(e) => {
            debug!(error = %e, "Ignoring unparseable Set-Cookie header");
            return;
        }
    };

    let expired = cookie
        .max_age()
        .is_some_and(|age| age <= cookie::time::Duration::ZERO);
    if cookie.value().is_empty() || expired {
        session.remove(cookie.name());
    } else {
        session.insert(cookie.name(), cookie.value());
    }
}

impl CookieStore for SessionJar {
    fn set_cookies(&self, cookie_headers: &mut dyn Iterator<Item = &HeaderValue>, url: &Url) {
        let mut session = self.session.write().unwrap_or_else(PoisonError::into_inner);
        for header in cookie_headers {
            absorb(&mut session, header);
        }
        debug!(url = %url, cookies = session.len(), "Updated session cookies");
    }

    fn cookies(&self, _url: &Url) -> Option<HeaderValue> {
        let session = self.session.read().unwrap_or_else(PoisonError::into_inner);
        if session.is_empty() {
            return None;
        }

        let header = session
            .iter()
            .map(|(name, value)| format!("{}={}", name, value))
            .collect::<Vec<_>>()
            .join("; ");
        match HeaderValue::from_str(&header) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Session holds a cookie that is not a valid header value, sending none");
                None
            }
        }
    }
}
