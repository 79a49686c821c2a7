//! Credential storage - the persisted copy of the session
//!
//! Two independent keys in the storage directory, `token` and `username`,
//! written together and removed together so a restart restores exactly the
//! session that was live before it.

use super::Session;
use crate::{SessionError, SessionResult};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// File name of the persisted token key
const TOKEN_KEY: &str = "token";
/// File name of the persisted username key
const USERNAME_KEY: &str = "username";

/// Persists the session credential pair on disk
pub struct CredentialStorage {
    /// Directory holding the two key files
    storage_dir: PathBuf,
}

impl CredentialStorage {
    /// Create a storage manager, creating the directory if needed
    pub fn new<P: AsRef<Path>>(storage_dir: P) -> SessionResult<Self> {
        let storage_dir = storage_dir.as_ref().to_path_buf();

        std::fs::create_dir_all(&storage_dir).map_err(SessionError::Storage)?;

        info!(
            "Credential storage initialized at: {}",
            storage_dir.display()
        );

        Ok(Self { storage_dir })
    }

    /// Load the persisted session, if a complete one is present.
    ///
    /// A partial copy (one key without the other) violates the pairing
    /// invariant and is treated as corrupt: the leftover key is removed and
    /// no session is restored.
    pub fn load(&self) -> SessionResult<Option<Session>> {
        let token = self.read_key(TOKEN_KEY)?;
        let username = self.read_key(USERNAME_KEY)?;

        match (token, username) {
            (Some(token), Some(username)) => {
                debug!("Loaded persisted session for user: {}", username);
                Ok(Some(Session::new(token, username)))
            }
            (None, None) => Ok(None),
            _ => {
                warn!("Discarding partial persisted session");
                self.clear()?;
                Ok(None)
            }
        }
    }

    /// Persist both keys of a session
    pub fn save(&self, session: &Session) -> SessionResult<()> {
        std::fs::write(self.key_path(TOKEN_KEY), &session.token).map_err(SessionError::Storage)?;
        std::fs::write(self.key_path(USERNAME_KEY), &session.username)
            .map_err(SessionError::Storage)?;

        debug!("Persisted session for user: {}", session.username);
        Ok(())
    }

    /// Remove both keys; keys that are already gone are not an error
    pub fn clear(&self) -> SessionResult<()> {
        for key in [TOKEN_KEY, USERNAME_KEY] {
            let path = self.key_path(key);
            if path.exists() {
                std::fs::remove_file(&path).map_err(SessionError::Storage)?;
                debug!("Removed persisted key: {}", path.display());
            }
        }

        Ok(())
    }

    fn key_path(&self, key: &str) -> PathBuf {
        self.storage_dir.join(key)
    }

    fn read_key(&self, key: &str) -> SessionResult<Option<String>> {
        let path = self.key_path(key);

        if !path.exists() {
            return Ok(None);
        }

        let value = std::fs::read_to_string(&path).map_err(SessionError::Storage)?;
        Ok(Some(value))
    }
}
