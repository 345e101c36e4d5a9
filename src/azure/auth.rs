//! Bearer tokens for the Azure management plane.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::Mutex;
use tokio::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::config::{BridgeConfig, ClientCredentials};
use crate::{BridgeError, Result};

#[async_trait]
pub trait Authorizer: Send + Sync {
    async fn bearer_token(&self) -> Result<String>;
}

/// Hands out a fixed token.
pub struct StaticTokenAuthorizer {
    token: String,
}

impl StaticTokenAuthorizer {
    pub fn new(token: impl Into<String>) -> Self {
        Self { token: token.into() }
    }
}

#[async_trait]
impl Authorizer for StaticTokenAuthorizer {
    async fn bearer_token(&self) -> Result<String> {
        Ok(self.token.clone())
    }
}

/// Stands in when credentials could not be acquired; every call fails.
pub struct UnavailableAuthorizer {
    reason: String,
}

impl UnavailableAuthorizer {
    pub fn new(reason: impl Into<String>) -> Self {
        Self { reason: reason.into() }
    }
}

#[async_trait]
impl Authorizer for UnavailableAuthorizer {
    async fn bearer_token(&self) -> Result<String> {
        Err(BridgeError::Unauthorized(self.reason.clone()))
    }
}

/// Tokens are refreshed this long before they expire.
const EXPIRY_MARGIN: Duration = Duration::from_secs(300);

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    // v1 endpoints send this as a string
    #[serde(default)]
    expires_in: Option<serde_json::Value>,
}

impl TokenResponse {
    fn lifetime(&self) -> Duration {
        let secs = match &self.expires_in {
            Some(serde_json::Value::Number(n)) => n.as_u64(),
            Some(serde_json::Value::String(s)) => s.parse().ok(),
            _ => None,
        };
        Duration::from_secs(secs.unwrap_or(0))
    }
}

/// OAuth2 client-credentials grant for a service principal.
pub struct ClientSecretAuthorizer {
    http: reqwest::Client,
    token_url: String,
    resource: String,
    credentials: ClientCredentials,
    cached: Mutex<Option<(String, Instant)>>,
}

impl ClientSecretAuthorizer {
    pub fn new(authority_host: &str, management_endpoint: &str, credentials: ClientCredentials) -> Self {
        Self {
            http: reqwest::Client::new(),
            token_url: format!(
                "{}/{}/oauth2/token",
                authority_host.trim_end_matches('/'),
                credentials.tenant_id
            ),
            resource: format!("{}/", management_endpoint.trim_end_matches('/')),
            credentials,
            cached: Mutex::new(None),
        }
    }

    async fn request_token(&self) -> Result<TokenResponse> {
        debug!(client_id = %self.credentials.client_id, "Requesting management token");

        let response = self
            .http
            .post(&self.token_url)
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", self.credentials.client_id.as_str()),
                ("client_secret", self.credentials.client_secret.as_str()),
                ("resource", self.resource.as_str()),
            ])
            .send()
            .await
            .map_err(|e| BridgeError::Unauthorized(format!("token request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(BridgeError::Unauthorized(format!(
                "token request rejected with status {}",
                status
            )));
        }

        response
            .json()
            .await
            .map_err(|e| BridgeError::Unauthorized(format!("invalid token response: {}", e)))
    }
}

#[async_trait]
impl Authorizer for ClientSecretAuthorizer {
    async fn bearer_token(&self) -> Result<String> {
        let mut cached = self.cached.lock().await;
        if let Some((token, expires_at)) = cached.as_ref() {
            if Instant::now() + EXPIRY_MARGIN < *expires_at {
                return Ok(token.clone());
            }
        }

        let response = self.request_token().await?;
        let expires_at = Instant::now() + response.lifetime();
        *cached = Some((response.access_token.clone(), expires_at));
        Ok(response.access_token)
    }
}

/// Picks the authorizer the environment supports.
///
/// Never fails: without credentials the returned authorizer rejects each call
/// with `Unauthorized`, so clients can still be constructed.
pub fn authorizer_from_environment(config: &BridgeConfig) -> Arc<dyn Authorizer> {
    match &config.credentials {
        Some(credentials) => Arc::new(ClientSecretAuthorizer::new(
            &config.authority_host,
            &config.management_endpoint,
            credentials.clone(),
        )),
        None => {
            warn!("No Azure service principal configured; backend queries will fail");
            Arc::new(UnavailableAuthorizer::new(
                "AZURE_TENANT_ID, AZURE_CLIENT_ID and AZURE_CLIENT_SECRET must be set",
            ))
        }
    }
}
