//! Access credentials and the providers that issue them
//!
//! A [`Credential`] is an opaque short-lived token. Issuance and signing live
//! on a remote backend; this module only fetches them. [`HttpTokenProvider`]
//! talks to the backend with a plain `GET <endpoint>?identity=<identity>`
//! and expects `{ "token": "..." }` back.
//!
//! ```rust,no_run
//! use voice_session_core::{HttpTokenProvider, Identity, TokenProvider};
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let provider = HttpTokenProvider::new("http://localhost:3000/token", Duration::from_secs(10))?;
//! let credential = provider.fetch_token(&Identity::parse("alice")?).await?;
//! println!("fetched {:?}", credential); // token value is redacted
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};
use url::Url;

use crate::client::config::ClientConfig;
use crate::error::{ClientError, ClientResult};
use crate::identity::Identity;

/// Opaque access token authorizing SDK registration and calls
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Credential(<{} bytes>)", self.0.len())
    }
}

/// Source of credentials for an identity
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// Fetch a fresh credential. Every failure is a [`ClientError::TokenFetch`].
    async fn fetch_token(&self, identity: &Identity) -> ClientResult<Credential>;
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    token: String,
}

/// Token provider backed by an HTTP endpoint
#[derive(Debug, Clone)]
pub struct HttpTokenProvider {
    client: reqwest::Client,
    endpoint: Url,
}

impl HttpTokenProvider {
    /// Create a provider for `endpoint` with a per-request timeout
    pub fn new(endpoint: &str, timeout: Duration) -> ClientResult<Self> {
        let endpoint = Url::parse(endpoint)
            .map_err(|e| ClientError::config(format!("invalid token endpoint '{}': {}", endpoint, e)))?;

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ClientError::config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self { client, endpoint })
    }

    /// Create a provider from the client configuration
    pub fn from_config(config: &ClientConfig) -> ClientResult<Self> {
        Self::new(&config.token_endpoint, config.token_timeout())
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

#[async_trait]
impl TokenProvider for HttpTokenProvider {
    async fn fetch_token(&self, identity: &Identity) -> ClientResult<Credential> {
        debug!("Fetching token for '{}' from {}", identity, self.endpoint);

        let response = self
            .client
            .get(self.endpoint.clone())
            .query(&[("identity", identity.as_str())])
            .send()
            .await
            .map_err(|e| ClientError::token_fetch(format!("request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            warn!("Token endpoint returned {} for '{}'", status, identity);
            return Err(ClientError::token_fetch(format!("token endpoint returned {}", status)));
        }

        let parsed: TokenResponse = response
            .json()
            .await
            .map_err(|e| ClientError::token_fetch(format!("malformed token response: {}", e)))?;

        if parsed.token.trim().is_empty() {
            return Err(ClientError::token_fetch("token endpoint returned an empty token"));
        }

        Ok(Credential::new(parsed.token))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credential_debug_is_redacted() {
        let credential = Credential::new("secret-jwt");
        let rendered = format!("{:?}", credential);
        assert!(!rendered.contains("secret"));
        assert_eq!(rendered, "Credential(<10 bytes>)");
    }

    #[test]
    fn test_from_config_uses_configured_endpoint() {
        let config = ClientConfig::new().with_token_endpoint("https://voice.example.com/token");
        let provider = HttpTokenProvider::from_config(&config).unwrap();
        assert_eq!(provider.endpoint().as_str(), "https://voice.example.com/token");
    }

    #[test]
    fn test_invalid_endpoint_is_configuration_error() {
        let err = HttpTokenProvider::new("not a url", Duration::from_secs(1)).unwrap_err();
        assert!(matches!(err, ClientError::Configuration { .. }));
    }
}
