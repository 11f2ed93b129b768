//! Notifications for the presentation layer
//!
//! The core never renders anything. It pushes `ClientEvent`s into an
//! `EventSink`, and whatever sits on the other end draws them.

use tokio::sync::mpsc;

use crate::message::ChatDelivery;
use crate::types::SessionState;

/// Client → presentation notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    /// Session moved to a new lifecycle state
    SessionStateChanged(SessionState),
    /// Chat content delivered on a subscribed channel
    ChatReceived(ChatDelivery),
    /// Subscription set after a change, in display order
    SubscriptionsChanged(Vec<String>),
    /// Broker rejected a command
    CommandFailed(String),
    /// Broker confirmed the connection under this name
    ConnectedAs(String),
    /// Broker confirmed a subscribe
    Subscribed {
        channel_name: String,
        total_subscribers: u64,
    },
    /// Broker acknowledged a command with no payload
    Acknowledged,
    /// Local echo of a publish that went out
    Published {
        channel_name: String,
        content: String,
    },
    /// Connection refused, dropped or errored
    TransportFailed(String),
    /// Malformed or unrecognized frames, rejected requests
    Diagnostic(String),
}

/// Destination of client notifications
pub trait EventSink {
    fn emit(&mut self, event: ClientEvent);
}

impl EventSink for Vec<ClientEvent> {
    fn emit(&mut self, event: ClientEvent) {
        self.push(event);
    }
}

impl EventSink for mpsc::UnboundedSender<ClientEvent> {
    fn emit(&mut self, event: ClientEvent) {
        // Receiver gone means nobody is rendering; nothing to do
        let _ = self.send(event);
    }
}
