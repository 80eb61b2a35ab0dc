use std::fmt;

use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Opaque token scoping one user's temporary assets in storage.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionHandle(String);

impl SessionHandle {
    /// `session_<unix-ms>_<8 hex chars>`.
    pub fn generate() -> Self {
        let random = uuid::Uuid::new_v4().simple().to_string();
        Self(format!(
            "session_{}_{}",
            Utc::now().timestamp_millis(),
            &random[..8]
        ))
    }

    /// Wraps a client-supplied handle. Blank handles and handles that would
    /// escape their storage prefix are rejected.
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty()
            || trimmed.contains('/')
            || trimmed.contains('\\')
            || trimmed.contains("..")
        {
            return None;
        }
        Some(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct StorageCredentials {
    pub url: String,
    pub key: String,
}

impl fmt::Debug for StorageCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageCredentials")
            .field("url", &self.url)
            .field("key", &"<redacted>")
            .finish()
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub api_key: String,
    pub storage: Option<StorageCredentials>,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &"<redacted>")
            .field("storage", &self.storage)
            .finish()
    }
}

/// Everything a stage needs to know about who is calling. Passed into every
/// stage call; nothing here is held globally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionContext {
    pub session: SessionHandle,
    pub credentials: Credentials,
}

impl SessionContext {
    pub fn new(session: SessionHandle, api_key: impl Into<String>) -> Self {
        Self {
            session,
            credentials: Credentials {
                api_key: api_key.into(),
                storage: None,
            },
        }
    }

    pub fn with_storage(mut self, url: impl Into<String>, key: impl Into<String>) -> Self {
        self.credentials.storage = Some(StorageCredentials {
            url: url.into(),
            key: key.into(),
        });
        self
    }

    pub fn api_key(&self) -> &str {
        self.credentials.api_key.trim()
    }

    pub fn has_api_key(&self) -> bool {
        !self.api_key().is_empty()
    }
}
