//! HTTP transport for the identity endpoint
//!
//! One owned `reqwest` client carries all of the application's traffic. An
//! injected [`AuthorizationProvider`] supplies the bearer token for every
//! outgoing request and is told about unauthorized responses before they
//! surface to the caller, which keeps session policy out of the transport.

use crate::config::SessionConfig;
use crate::session::ErrorBody;
use crate::{SessionError, SessionResult};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

/// Display text for a 401 whose body carries no `detail`
const UNAUTHORIZED_FALLBACK: &str = "The server rejected the session token";

/// Seam between the transport and the session layer.
///
/// The client asks for the current token before each request and reports
/// unauthorized responses on authorized calls back through the same object,
/// so whoever owns the session state decides what both mean.
#[async_trait]
pub trait AuthorizationProvider: Send + Sync {
    /// Current bearer token, if a session is held
    async fn bearer_token(&self) -> Option<String>;

    /// Report a 401 on an authorized call. Runs to completion before the
    /// error is returned to the caller.
    async fn on_unauthorized(&self);
}

/// HTTP client for the identity endpoint and for application traffic.
///
/// Every request is decorated with `Authorization: Bearer <token>` while a
/// token is held; the header is entirely absent otherwise.
pub struct ApiClient {
    client: reqwest::Client,
    base_url: String,
    provider: Arc<dyn AuthorizationProvider>,
}

impl ApiClient {
    /// Create a client from the configuration, wiring in the provider
    pub fn new(
        config: &SessionConfig,
        provider: Arc<dyn AuthorizationProvider>,
    ) -> SessionResult<Self> {
        let client = create_http_client(config)?;

        Ok(Self {
            client,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            provider,
        })
    }

    /// Build the full URL for an endpoint path
    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Attach the bearer header when a token is held
    async fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.provider.bearer_token().await {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// POST to a credential-exchange route (login, register, verification).
    ///
    /// Decorated like any other request, but a 401 here describes the
    /// submitted credentials rather than the held session, so it is not
    /// reported to the provider.
    pub(crate) async fn post_exchange<B: Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> SessionResult<reqwest::Response> {
        let url = self.endpoint(path);
        debug!("POST {}", url);

        let request = self.authorize(self.client.post(&url).json(body)).await;

        request.send().await.map_err(|e| {
            let message = format!("request to {} failed: {}", url, e);
            SessionError::network_with_source(message, Box::new(e))
        })
    }

    /// GET an endpoint through the authorized path
    pub async fn get(&self, path: &str) -> SessionResult<reqwest::Response> {
        let url = self.endpoint(path);
        debug!("GET {}", url);

        let request = self.authorize(self.client.get(&url)).await;
        self.execute(request, &url).await
    }

    /// GET an endpoint and deserialize its JSON success payload
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> SessionResult<T> {
        let response = self.get(path).await?;
        read_json(response).await
    }

    /// POST a JSON body through the authorized path and deserialize the
    /// JSON success payload
    pub async fn post_json<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> SessionResult<T> {
        let url = self.endpoint(path);
        debug!("POST {}", url);

        let request = self.authorize(self.client.post(&url).json(body)).await;
        let response = self.execute(request, &url).await?;
        read_json(response).await
    }

    /// Send a decorated request and inspect the response status.
    ///
    /// A 401 is reported to the provider, and the report awaited, before
    /// the error is returned, so callers observe the already-cleared
    /// session.
    async fn execute(
        &self,
        request: reqwest::RequestBuilder,
        url: &str,
    ) -> SessionResult<reqwest::Response> {
        let response = request.send().await.map_err(|e| {
            let message = format!("request to {} failed: {}", url, e);
            SessionError::network_with_source(message, Box::new(e))
        })?;

        if response.status() == reqwest::StatusCode::UNAUTHORIZED {
            self.provider.on_unauthorized().await;

            let message = rejection_detail(response, UNAUTHORIZED_FALLBACK).await;
            return Err(SessionError::unauthorized(message));
        }

        Ok(response)
    }
}

/// Deserialize a success payload, mapping error statuses to `Api` errors
async fn read_json<T: DeserializeOwned>(response: reqwest::Response) -> SessionResult<T> {
    let status = response.status();

    if !status.is_success() {
        let fallback = status.canonical_reason().unwrap_or("Request failed");
        let message = rejection_detail(response, fallback).await;
        return Err(SessionError::Api {
            status: status.as_u16(),
            message,
        });
    }

    response
        .json()
        .await
        .map_err(|e| SessionError::unexpected_response(e.to_string()))
}

/// Pull the server's `detail` message out of an error body, falling back
/// when the body is empty, not JSON, or carries no detail field
pub(crate) async fn rejection_detail(response: reqwest::Response, fallback: &str) -> String {
    let body = response.text().await.unwrap_or_default();

    serde_json::from_str::<ErrorBody>(&body)
        .ok()
        .and_then(|b| b.detail)
        .unwrap_or_else(|| fallback.to_string())
}

/// Build the underlying reqwest client with the configured defaults
fn create_http_client(config: &SessionConfig) -> SessionResult<reqwest::Client> {
    let mut headers = reqwest::header::HeaderMap::new();

    headers.insert(
        reqwest::header::USER_AGENT,
        reqwest::header::HeaderValue::from_str(&config.user_agent)
            .map_err(|e| SessionError::config(format!("Invalid user agent: {}", e)))?,
    );

    reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(config.timeout_seconds))
        .default_headers(headers)
        .build()
        .map_err(|e| SessionError::config(format!("Failed to create HTTP client: {}", e)))
}
