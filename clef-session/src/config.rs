//! Configuration for the session layer
//!
//! One environment knob, `API_BASE_URL`, selects the identity endpoint.
//! Everything else is constructor-level configuration with deployment
//! defaults.

use crate::{SessionError, SessionResult};
use std::path::PathBuf;

/// Base URL of the deployed identity endpoint
pub const DEFAULT_API_BASE_URL: &str = "http://47.97.154.187:9007/api";

/// Environment variable that overrides the API base URL
pub const API_BASE_URL_ENV: &str = "API_BASE_URL";

/// Configuration for [`SessionManager`](crate::SessionManager)
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Base URL of the identity endpoint
    pub api_base_url: String,
    /// Request timeout in seconds
    pub timeout_seconds: u64,
    /// User agent string
    pub user_agent: String,
    /// Directory holding the persisted session keys
    pub storage_dir: PathBuf,
}

impl Default for SessionConfig {
    fn default() -> Self {
        let storage_dir = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("clef")
            .join("session");

        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            timeout_seconds: 30,
            user_agent: "clef/0.1".to_string(),
            storage_dir,
        }
    }
}

impl SessionConfig {
    /// Create a configuration from the environment.
    ///
    /// `API_BASE_URL` overrides the deployment host when set to a non-empty
    /// value; everything else keeps its default.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(base_url) = std::env::var(API_BASE_URL_ENV) {
            if !base_url.is_empty() {
                config.api_base_url = base_url;
            }
        }

        config
    }

    /// Set the base URL
    pub fn with_base_url<S: Into<String>>(mut self, base_url: S) -> Self {
        self.api_base_url = base_url.into();
        self
    }

    /// Set the storage directory (tests point this at a temp dir)
    pub fn with_storage_dir<P: Into<PathBuf>>(mut self, storage_dir: P) -> Self {
        self.storage_dir = storage_dir.into();
        self
    }

    /// Set the request timeout
    pub fn with_timeout(mut self, timeout_seconds: u64) -> Self {
        self.timeout_seconds = timeout_seconds;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> SessionResult<()> {
        if self.api_base_url.is_empty() {
            return Err(SessionError::config("API base URL cannot be empty"));
        }

        if !self.api_base_url.starts_with("http://") && !self.api_base_url.starts_with("https://") {
            return Err(SessionError::config(format!(
                "API base URL must be an http(s) URL: {}",
                self.api_base_url
            )));
        }

        if self.timeout_seconds == 0 {
            return Err(SessionError::config("Timeout must be greater than 0"));
        }

        Ok(())
    }
}
