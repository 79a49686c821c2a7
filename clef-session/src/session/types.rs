//! Session types - the credential pair, wire formats, and session events

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An established session: the bearer token and the username it was issued
/// for.
///
/// The two always travel together. Session state elsewhere in the crate is
/// `Option<Session>`, so a token without a username (or the reverse) cannot
/// be represented.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Bearer token issued by the identity endpoint
    pub token: String,
    /// Username the token belongs to
    pub username: String,
}

impl Session {
    /// Create a session from a token/username pair
    pub fn new<T: Into<String>, U: Into<String>>(token: T, username: U) -> Self {
        Self {
            token: token.into(),
            username: username.into(),
        }
    }
}

/// Session state transitions, broadcast to subscribers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionEvent {
    /// A login established a session for this username
    LoggedIn { username: String },
    /// The user ended the session locally
    LoggedOut,
    /// The server refused the held token and the session was cleared
    Invalidated,
}

/// Login request payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// Successful login response.
///
/// The username comes back from the server and is treated as authoritative;
/// extra fields such as `token_type` are ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct LoginResponse {
    pub access_token: String,
    pub username: String,
}

/// Registration request payload, forwarded to the identity endpoint as-is
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    /// Email verification code, omitted from the payload when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verification_code: Option<String>,
}

impl RegisterRequest {
    /// Create a registration request without a verification code
    pub fn new<U: Into<String>, E: Into<String>, P: Into<String>>(
        username: U,
        email: E,
        password: P,
    ) -> Self {
        Self {
            username: username.into(),
            email: email.into(),
            password: password.into(),
            verification_code: None,
        }
    }

    /// Attach an email verification code
    pub fn with_verification_code<C: Into<String>>(mut self, code: C) -> Self {
        self.verification_code = Some(code.into());
        self
    }
}

/// Error body returned by the identity endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorBody {
    pub detail: Option<String>,
}

/// Account record behind an authenticated session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserInfo {
    pub id: i64,
    pub username: String,
    pub email: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// Ask the identity endpoint to email a verification code
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationRequest {
    pub email: String,
}

/// Confirm an email address with a previously issued code
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationConfirm {
    pub email: String,
    pub verification_code: String,
}

/// Acknowledgement returned when a verification code has been issued
#[derive(Debug, Clone, Deserialize)]
pub struct VerificationReceipt {
    pub message: String,
    pub expires_in_minutes: u64,
}
