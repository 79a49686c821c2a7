//! Session manager - owns the credential pair and the authentication flows
//!
//! One manager instance serves the whole application: it hydrates the
//! persisted session at startup, exchanges credentials with the identity
//! endpoint, and clears everything when the user logs out or the server
//! stops accepting the token.

use super::storage::CredentialStorage;
use super::types::{
    LoginRequest, LoginResponse, RegisterRequest, Session, SessionEvent, UserInfo,
    VerificationConfirm, VerificationReceipt, VerificationRequest,
};
use crate::config::SessionConfig;
use crate::http::{rejection_detail, ApiClient, AuthorizationProvider};
use crate::{SessionError, SessionResult};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex, RwLock};
use tracing::{debug, info, warn};

/// Fallback messages for exchange routes whose error body carries no
/// `detail` field
const LOGIN_FALLBACK: &str = "Login failed";
const REGISTER_FALLBACK: &str = "Registration failed";
const SEND_VERIFICATION_FALLBACK: &str = "Failed to send verification code";
const VERIFY_EMAIL_FALLBACK: &str = "Email verification failed";

/// Shared session state plus the side effects every clearing path runs.
///
/// Implements [`AuthorizationProvider`], so the transport reads its bearer
/// token from exactly the state that login and logout mutate. Mutations
/// serialize on the write lock; the persisted copy is updated under the
/// same lock, so memory and disk cannot diverge between two paths racing.
struct SessionState {
    session: RwLock<Option<Session>>,
    storage: CredentialStorage,
    events: broadcast::Sender<SessionEvent>,
}

impl SessionState {
    fn new(storage: CredentialStorage) -> Self {
        let (events, _) = broadcast::channel::<SessionEvent>(16);

        Self {
            session: RwLock::new(None),
            storage,
            events,
        }
    }

    /// Restore a persisted session without announcing a transition
    async fn hydrate(&self) -> SessionResult<()> {
        if let Some(session) = self.storage.load()? {
            info!("Restored session for user: {}", session.username);
            *self.session.write().await = Some(session);
        }

        Ok(())
    }

    /// Install a freshly issued session: persist first, then publish.
    ///
    /// If persisting fails the in-memory state is left untouched, so a
    /// failed login can never leave a half-established session behind.
    async fn establish(&self, session: Session) -> SessionResult<()> {
        let mut guard = self.session.write().await;

        self.storage.save(&session)?;

        info!("Session established for user: {}", session.username);
        let _ = self.events.send(SessionEvent::LoggedIn {
            username: session.username.clone(),
        });

        *guard = Some(session);
        Ok(())
    }

    /// Clear memory and disk, returning the session that was held.
    ///
    /// The event is announced only when there was something to clear, so
    /// repeated logouts stay silent after the first.
    async fn clear_with(&self, event: SessionEvent) -> SessionResult<Option<Session>> {
        let mut guard = self.session.write().await;
        let held = guard.take();

        if let Some(ref session) = held {
            debug!("Session cleared for user: {}", session.username);
            let _ = self.events.send(event);
        }

        self.storage.clear()?;
        Ok(held)
    }

    async fn snapshot(&self) -> Option<Session> {
        self.session.read().await.clone()
    }
}

#[async_trait]
impl AuthorizationProvider for SessionState {
    async fn bearer_token(&self) -> Option<String> {
        self.session.read().await.as_ref().map(|s| s.token.clone())
    }

    async fn on_unauthorized(&self) {
        match self.clear_with(SessionEvent::Invalidated).await {
            Ok(Some(session)) => {
                warn!(
                    "Server rejected the session token, logged out user: {}",
                    session.username
                );
            }
            Ok(None) => {
                debug!("Unauthorized response with no session held, nothing to clear");
            }
            Err(e) => {
                warn!("Failed to clear invalidated session: {}", e);
            }
        }
    }
}

/// Client-side session manager.
///
/// Owns the HTTP client the application talks through, so every request is
/// decorated with the current bearer token and every unauthorized response
/// feeds back into the logout path.
pub struct SessionManager {
    /// Shared state, also injected into the transport as its
    /// authorization provider
    state: Arc<SessionState>,
    /// Owned HTTP client
    api: ApiClient,
    /// Rejects a second login while one is pending
    login_gate: Mutex<()>,
    /// Configuration the manager was built from
    config: SessionConfig,
}

impl SessionManager {
    /// Create a manager, restoring any persisted session.
    ///
    /// The transport is wired to the shared state before the persisted
    /// session becomes visible, so even the first request after a restart
    /// goes through the same authorization and invalidation path as every
    /// later one.
    pub async fn new(config: SessionConfig) -> SessionResult<Self> {
        config.validate()?;

        let storage = CredentialStorage::new(&config.storage_dir)?;
        let state = Arc::new(SessionState::new(storage));
        let api = ApiClient::new(&config, state.clone())?;

        state.hydrate().await?;

        Ok(Self {
            state,
            api,
            login_gate: Mutex::new(()),
            config,
        })
    }

    /// Create a manager from the environment (`API_BASE_URL` override)
    pub async fn from_env() -> SessionResult<Self> {
        Self::new(SessionConfig::from_env()).await
    }

    /// Authenticate against the identity endpoint and establish a session.
    ///
    /// On failure the session is left exactly as it was, and the error's
    /// display text is the server's `detail` message when one was provided.
    /// A login attempted while another is pending fails fast instead of
    /// racing it.
    pub async fn login(&self, username: &str, password: &str) -> SessionResult<()> {
        let _gate = self
            .login_gate
            .try_lock()
            .map_err(|_| SessionError::LoginInFlight)?;

        info!("Logging in user: {}", username);

        let request = LoginRequest {
            username: username.to_string(),
            password: password.to_string(),
        };

        let login: LoginResponse = self
            .exchange_json("/auth/login", &request, LOGIN_FALLBACK)
            .await?;

        // The username echoed by the server is authoritative
        self.state
            .establish(Session::new(login.access_token, login.username))
            .await
    }

    /// Create a new account.
    ///
    /// The payload is forwarded to the identity endpoint as-is and the
    /// success payload comes back unchanged. Registration does not
    /// establish a session; callers log in afterwards.
    pub async fn register(&self, request: RegisterRequest) -> SessionResult<serde_json::Value> {
        info!("Registering user: {}", request.username);

        self.exchange_json("/auth/register", &request, REGISTER_FALLBACK)
            .await
    }

    /// End the session locally: clear the in-memory pair and the persisted
    /// keys. Subsequent requests carry no authorization header.
    ///
    /// Idempotent, and the identity endpoint is not called.
    pub async fn logout(&self) -> SessionResult<()> {
        if let Some(session) = self.state.clear_with(SessionEvent::LoggedOut).await? {
            info!("User logged out: {}", session.username);
        }

        Ok(())
    }

    /// Fetch the account record behind the current session.
    ///
    /// Goes through the authorized path, so a rejected token clears the
    /// session before the error surfaces.
    pub async fn current_user(&self) -> SessionResult<UserInfo> {
        self.api.get_json("/auth/me").await
    }

    /// Ask the identity endpoint to email a verification code
    pub async fn request_verification(&self, email: &str) -> SessionResult<VerificationReceipt> {
        let request = VerificationRequest {
            email: email.to_string(),
        };

        self.exchange_json(
            "/verification/send-verification",
            &request,
            SEND_VERIFICATION_FALLBACK,
        )
        .await
    }

    /// Confirm an email address with a previously issued code
    pub async fn confirm_verification(&self, email: &str, code: &str) -> SessionResult<()> {
        let request = VerificationConfirm {
            email: email.to_string(),
            verification_code: code.to_string(),
        };

        let _: serde_json::Value = self
            .exchange_json("/verification/verify-email", &request, VERIFY_EMAIL_FALLBACK)
            .await?;

        Ok(())
    }

    /// Current bearer token, if authenticated
    pub async fn token(&self) -> Option<String> {
        self.state.snapshot().await.map(|s| s.token)
    }

    /// Current username, if authenticated
    pub async fn username(&self) -> Option<String> {
        self.state.snapshot().await.map(|s| s.username)
    }

    /// Whether a session is currently held.
    ///
    /// Derived from the stored pair on every call; there is no cached flag
    /// to fall out of sync.
    pub async fn is_authenticated(&self) -> bool {
        self.state.snapshot().await.is_some()
    }

    /// Snapshot of the current session
    pub async fn session(&self) -> Option<Session> {
        self.state.snapshot().await
    }

    /// Subscribe to session state transitions
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.state.events.subscribe()
    }

    /// The decorated HTTP client, for the rest of the application's traffic
    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    /// The configuration this manager was built from
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// POST to an exchange route, collapsing every failure into a
    /// `Rejected` error carrying the extracted or fallback message
    async fn exchange_json<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
        fallback: &str,
    ) -> SessionResult<T> {
        let response = match self.api.post_exchange(path, body).await {
            Ok(response) => response,
            Err(e) => {
                warn!("Request to {} failed: {}", path, e);
                return Err(SessionError::rejected(fallback));
            }
        };

        if !response.status().is_success() {
            let message = rejection_detail(response, fallback).await;
            debug!("{} rejected: {}", path, message);
            return Err(SessionError::rejected(message));
        }

        response.json().await.map_err(|e| {
            warn!("Malformed response from {}: {}", path, e);
            SessionError::rejected(fallback)
        })
    }
}
