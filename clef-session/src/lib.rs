//! Clef Session - client-side session management for the Clef web app
//!
//! This crate owns the authentication state of a Clef client: it exchanges
//! credentials with the identity endpoint, keeps the bearer token and the
//! username as one inseparable pair, persists them across restarts, and
//! tears the session down the moment the server stops accepting the token.
//! It includes:
//!
//! - Credential exchange (login, registration, email verification)
//! - Session persistence under the platform data directory
//! - Bearer decoration of every outgoing request through one owned client
//! - Automatic logout when a held token is rejected by the server
//!
//! ## Architecture
//!
//! This crate follows a clear separation between:
//! - **Transport** (http): the owned client, bearer decoration, and the
//!   unauthorized-response seam
//! - **Session** (session): state, persistence, and the credential flows
//! - **Presentation** (the embedding app): consumes state snapshots and
//!   session events, never raw HTTP

pub mod config;
pub mod http;
pub mod logging;
pub mod session;

pub use config::SessionConfig;
pub use http::{ApiClient, AuthorizationProvider};
pub use logging::init_logging;
pub use session::{
    RegisterRequest, Session, SessionEvent, SessionManager, UserInfo, VerificationReceipt,
};

/// Session-level error type
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The identity endpoint turned the operation down. The display text is
    /// the server's `detail` message when one was provided, otherwise the
    /// operation's fallback, so it can be shown to the user as-is.
    #[error("{message}")]
    Rejected { message: String },

    /// An authorized call came back 401. By the time this surfaces, the
    /// held session has already been cleared.
    #[error("Unauthorized: {message}")]
    Unauthorized { message: String },

    /// An authorized call came back with a non-401 error status
    #[error("HTTP {status}: {message}")]
    Api { status: u16, message: String },

    /// The request never produced a usable response
    #[error("Network error: {message}")]
    Network {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A success response did not match the expected payload shape
    #[error("Unexpected response: {message}")]
    UnexpectedResponse { message: String },

    /// A second login was attempted while one is still pending
    #[error("A login attempt is already in progress")]
    LoginInFlight,

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Storage error: {0}")]
    Storage(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type SessionResult<T> = Result<T, SessionError>;

impl SessionError {
    /// Create a rejection error whose display text is user-facing
    pub fn rejected<S: Into<String>>(message: S) -> Self {
        Self::Rejected {
            message: message.into(),
        }
    }

    /// Create an unauthorized error
    pub fn unauthorized<S: Into<String>>(message: S) -> Self {
        Self::Unauthorized {
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a network error
    pub fn network<S: Into<String>>(message: S) -> Self {
        Self::Network {
            message: message.into(),
            source: None,
        }
    }

    /// Create a network error with source
    pub fn network_with_source<S: Into<String>>(
        message: S,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        Self::Network {
            message: message.into(),
            source: Some(source),
        }
    }

    /// Create an unexpected-response error
    pub fn unexpected_response<S: Into<String>>(message: S) -> Self {
        Self::UnexpectedResponse {
            message: message.into(),
        }
    }

    /// Whether this error is a credential-exchange rejection
    pub fn is_rejection(&self) -> bool {
        matches!(self, Self::Rejected { .. })
    }
}

/// Prelude module for convenient imports
pub mod prelude {
    pub use super::{
        RegisterRequest, Session, SessionConfig, SessionError, SessionEvent, SessionManager,
        SessionResult,
    };
}
