//! Session struct definition
//!
//! Represents one logical connection attempt and its lifecycle state.

use crate::types::{SessionId, SessionState};

/// Live connection attempt
///
/// Created on connect request, dropped on close or explicit disconnect.
#[derive(Debug)]
pub struct Session {
    /// Identifier stamped on this session's transport events
    pub id: SessionId,
    /// Name requested at connect time (None lets the broker pick)
    display_name: Option<String>,
    /// Current lifecycle state
    pub state: SessionState,
    /// Name the broker reports for us
    pub client_name: Option<String>,
}

impl Session {
    /// Create a new session in the Connecting state
    pub fn new(id: SessionId, display_name: Option<String>) -> Self {
        Self {
            id,
            display_name,
            state: SessionState::Connecting,
            client_name: None,
        }
    }

    /// Name requested at connect time
    pub fn display_name(&self) -> Option<&str> {
        self.display_name.as_deref()
    }

    /// Check if the transport reported the connection open
    pub fn is_connected(&self) -> bool {
        self.state == SessionState::Connected
    }

    /// Mark the transport open
    pub fn mark_connected(&mut self) {
        self.state = SessionState::Connected;
    }

    /// Record the broker-assigned client name
    pub fn set_client_name(&mut self, name: String) {
        self.client_name = Some(name);
    }
}
