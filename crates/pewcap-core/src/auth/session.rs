use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

/// Default session file name, relative to the working directory
pub const DEFAULT_SESSION_FILE: &str = "session.json";

/// Server-issued cookie state that lets later runs skip two-factor login.
///
/// Keys are kept ordered so the serialized form is deterministic and a
/// previously written file re-serializes to the same text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Session {
    cookies: BTreeMap<String, String>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.cookies.get(name).map(String::as_str)
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.cookies.insert(name.into(), value.into());
    }

    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty()
    }

    pub fn len(&self) -> usize {
        self.cookies.len()
    }

    pub fn remove(&mut self, name: &str) -> Option<String> {
        self.cookies.remove(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.cookies.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Failed to serialize session: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Failed to write session file {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Where a [`Session`] lives between runs.
pub trait SessionStore {
    /// Restore the last saved session. Never fails: anything unreadable
    /// comes back as an empty session.
    fn load(&self) -> Session;

    /// Overwrite the stored session.
    fn save(&self, session: &Session) -> Result<(), SessionError>;
}

/// Session persisted as a flat JSON object on disk
#[derive(Debug, Clone)]
pub struct FileSessionStore {
    path: PathBuf,
}

impl FileSessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl SessionStore for FileSessionStore {
    fn load(&self) -> Session {
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Could not read session file, starting without a session");
                return Session::new();
            }
        };

        match serde_json::from_str::<Session>(&contents) {
            Ok(session) => {
                debug!(path = %self.path.display(), cookies = session.len(), "Loaded session");
                session
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Could not parse session file, starting without a session");
                Session::new()
            }
        }
    }

    fn save(&self, session: &Session) -> Result<(), SessionError> {
        let contents = serde_json::to_string(session)?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| SessionError::Write {
                path: self.path.clone(),
                source,
            })?;
        }

        std::fs::write(&self.path, contents).map_err(|source| SessionError::Write {
            path: self.path.clone(),
            source,
        })?;

        debug!(path = %self.path.display(), cookies = session.len(), "Saved session");
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
