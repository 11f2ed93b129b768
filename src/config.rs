//! Client configuration
//!
//! Defaults overridable by environment variables:
//! - `CHAT_ENDPOINT`: broker URL (`ws`, `wss`, `http` or `https`)
//! - `CHAT_DISPLAY_NAME`: name requested at connect time
//! - `CHAT_EVENT_BUFFER`: transport event channel capacity

use std::env;

use tracing::warn;
use url::Url;

use crate::error::ClientError;

/// Default broker endpoint
pub const DEFAULT_ENDPOINT: &str = "ws://127.0.0.1:3501/api/connect";

/// Default capacity of the transport event channel
pub const DEFAULT_EVENT_BUFFER: usize = 256;

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// WebSocket endpoint of the broker
    pub endpoint: Url,
    /// Name requested on the first connect
    pub display_name: Option<String>,
    /// Transport event channel capacity
    pub event_buffer: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint: Url::parse(DEFAULT_ENDPOINT).expect("default endpoint is valid"),
            display_name: None,
            event_buffer: DEFAULT_EVENT_BUFFER,
        }
    }
}

impl ClientConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ClientError> {
        let mut config = Self::default();

        if let Ok(endpoint) = env::var("CHAT_ENDPOINT") {
            config.endpoint = parse_endpoint(&endpoint)?;
        }

        config.display_name = env::var("CHAT_DISPLAY_NAME")
            .ok()
            .filter(|name| !name.trim().is_empty());

        if let Ok(buffer) = env::var("CHAT_EVENT_BUFFER") {
            match buffer.parse::<usize>() {
                Ok(size) if size > 0 => config.event_buffer = size,
                _ => warn!("Ignoring invalid CHAT_EVENT_BUFFER '{}'", buffer),
            }
        }

        Ok(config)
    }

    /// Replace the endpoint
    pub fn with_endpoint(mut self, endpoint: &str) -> Result<Self, ClientError> {
        self.endpoint = parse_endpoint(endpoint)?;
        Ok(self)
    }
}

/// Parse an endpoint, mapping `http`/`https` to `ws`/`wss`
pub fn parse_endpoint(input: &str) -> Result<Url, ClientError> {
    let mut url = Url::parse(input)?;
    let scheme = match url.scheme() {
        "ws" | "http" => "ws",
        "wss" | "https" => "wss",
        other => return Err(ClientError::UnsupportedScheme(other.to_string())),
    };
    if url.scheme() != scheme && url.set_scheme(scheme).is_err() {
        return Err(ClientError::UnsupportedScheme(url.scheme().to_string()));
    }
    Ok(url)
}
