//! Publish/Subscribe WebSocket Chat Client Library
//!
//! A chat client for a channel-based publish/subscribe broker, built with
//! tokio-tungstenite. One persistent WebSocket carries everything.
//!
//! # Features
//! - Connect with an optional display name
//! - Subscribe / unsubscribe / publish / list channels
//! - Shape-based classification of inbound frames (chat vs. acknowledgment)
//! - Optimistic subscription updates, resynced from the broker's channel list
//! - Disconnection handling
//!
//! # Architecture
//! Uses the Actor pattern with `mpsc` channels:
//! - `ChatClient` is the single actor owning session and subscription state
//! - `WsTransport` runs each connection in its own task and reports back
//!   through a channel of `TransportEnvelope`s
//! - The presentation layer sends `UserRequest`s and receives `ClientEvent`s
//!
//! # Example
//! ```ignore
//! use tokio::sync::mpsc;
//! use pubsub_chat_client::{ChatClient, ClientConfig, UserRequest, WsTransport};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = ClientConfig::from_env().unwrap();
//!     let (event_tx, event_rx) = mpsc::channel(config.event_buffer);
//!     let (request_tx, request_rx) = mpsc::channel(32);
//!     let (sink_tx, mut sink_rx) = mpsc::unbounded_channel();
//!
//!     let client = ChatClient::new(config.endpoint, WsTransport::new(event_tx), sink_tx);
//!     tokio::spawn(client.run(request_rx, event_rx));
//!
//!     request_tx.send(UserRequest::Connect { display_name: None }).await.unwrap();
//!     while let Some(event) = sink_rx.recv().await {
//!         println!("{:?}", event);
//!     }
//! }
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod event;
pub mod message;
pub mod session;
pub mod subscription;
pub mod transport;
pub mod types;

// Re-export main types for convenience
pub use client::{ChatClient, UserRequest};
pub use config::ClientConfig;
pub use error::{ClientError, DecodeError, ValidationError};
pub use event::{ClientEvent, EventSink};
pub use message::{Acknowledgment, ChatDelivery, Command, Frame};
pub use session::Session;
pub use subscription::{Reconciler, SubscriptionSet};
pub use transport::{Transport, TransportEnvelope, TransportEvent, WsTransport};
pub use types::{SessionId, SessionState};
