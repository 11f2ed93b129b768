//! Error types for the chat client
//!
//! Defines client-level errors, local validation errors and inbound
//! decode errors. Uses thiserror for ergonomic error definitions.

use thiserror::Error;

/// Client-level errors
///
/// Failures of a local request or of the client setup. Transport
/// failures are reported as events, never through this type.
#[derive(Debug, Error)]
pub enum ClientError {
    /// JSON serialization error
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// Endpoint could not be parsed as a URL
    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(#[from] url::ParseError),

    /// Endpoint scheme is not a WebSocket (or HTTP) scheme
    #[error("Unsupported endpoint scheme: {0}")]
    UnsupportedScheme(String),

    /// A command was issued while no session is connected
    #[error("Not connected to server")]
    NotConnected,

    /// Channel send error (internal channel broken)
    #[error("Channel send error")]
    ChannelSend,

    /// Request rejected before reaching the wire
    #[error(transparent)]
    Validation(#[from] ValidationError),
}

/// Client-side request validation errors
///
/// Raised before any command is emitted; no network traffic results.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// Subscribe/unsubscribe with a blank channel name
    #[error("Please enter a channel name")]
    EmptyChannel,

    /// Publish with no channel selected
    #[error("Please select a channel")]
    NoChannelSelected,

    /// Publish with blank content
    #[error("Please enter a message")]
    EmptyContent,

    /// Publish to a channel outside the subscription set
    #[error("Not subscribed to channel '{0}'")]
    NotSubscribed(String),
}

/// Inbound frame could not be parsed
#[derive(Debug, Error)]
#[error("Failed to parse message: {raw}")]
pub struct DecodeError {
    /// Raw frame text, kept for diagnostics
    pub raw: String,
    #[source]
    pub source: serde_json::Error,
}
