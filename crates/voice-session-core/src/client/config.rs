//! Client configuration
//!
//! ```rust
//! use voice_session_core::ClientConfig;
//!
//! let config = ClientConfig::new()
//!     .with_token_endpoint("https://voice.example.com/token")
//!     .with_display_name("Support Line")
//!     .with_auto_accept(false);
//!
//! assert!(config.validate().is_ok());
//! assert!(!config.auto_accept);
//! assert_eq!(config.token_timeout_secs, 10);
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{ClientError, ClientResult};

/// Default token endpoint, a backend running next to the app during development
pub const DEFAULT_TOKEN_ENDPOINT: &str = "http://localhost:3000/token";

/// Configuration for a [`VoiceClient`](crate::VoiceClient)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// URL queried as `GET <token_endpoint>?identity=<identity>`
    pub token_endpoint: String,

    /// Name shown in the platform notification for outgoing calls
    pub display_name: String,

    /// Accept every inbound invite without user confirmation
    pub auto_accept: bool,

    /// Timeout for a single token request
    pub token_timeout_secs: u64,

    /// Upper bound on the best-effort unregister during teardown
    pub unregister_timeout_ms: u64,

    /// Queue depth for commands from `VoiceClient` handles
    pub command_capacity: usize,

    /// Buffer size of the event broadcast channel
    pub event_capacity: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            token_endpoint: DEFAULT_TOKEN_ENDPOINT.to_string(),
            display_name: "Voice Call".to_string(),
            auto_accept: true,
            token_timeout_secs: 10,
            unregister_timeout_ms: 2000,
            command_capacity: 64,
            event_capacity: 256,
        }
    }
}

impl ClientConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.token_endpoint = endpoint.into();
        self
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = name.into();
        self
    }

    pub fn with_auto_accept(mut self, auto_accept: bool) -> Self {
        self.auto_accept = auto_accept;
        self
    }

    pub fn with_token_timeout(mut self, timeout: Duration) -> Self {
        self.token_timeout_secs = timeout.as_secs().max(1);
        self
    }

    pub fn with_unregister_timeout(mut self, timeout: Duration) -> Self {
        self.unregister_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }

    pub fn token_timeout(&self) -> Duration {
        Duration::from_secs(self.token_timeout_secs)
    }

    pub fn unregister_timeout(&self) -> Duration {
        Duration::from_millis(self.unregister_timeout_ms)
    }

    /// Check the settings before the client is started
    pub fn validate(&self) -> ClientResult<()> {
        let endpoint = Url::parse(&self.token_endpoint)
            .map_err(|e| ClientError::config(format!("invalid token endpoint: {}", e)))?;
        if !matches!(endpoint.scheme(), "http" | "https") {
            return Err(ClientError::config(format!(
                "token endpoint must be http or https, got '{}'",
                endpoint.scheme()
            )));
        }
        if self.token_timeout_secs == 0 {
            return Err(ClientError::config("token timeout must be greater than zero"));
        }
        if self.command_capacity == 0 || self.event_capacity == 0 {
            return Err(ClientError::config("channel capacities must be greater than zero"));
        }
        Ok(())
    }
}
