//! WebSocket transport session
//!
//! Owns the single connection to the broker: opens it, pumps raw text
//! both ways, and reports lifecycle events back to the client loop.

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::error::ClientError;
use crate::types::SessionId;

/// Query parameter carrying the requested display name
pub const CLIENT_NAME_PARAM: &str = "client_name";

/// Lifecycle and data events of a connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// Handshake completed
    Opened,
    /// Connection ended (by either side)
    Closed,
    /// Connection failed or errored
    Error(String),
    /// One data frame from the broker, as text
    MessageReceived(String),
}

/// A transport event with the session that produced it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportEnvelope {
    pub session: SessionId,
    pub event: TransportEvent,
}

/// Raw connection primitives used by the client
///
/// Completion of `connect` is reported asynchronously as
/// `TransportEvent::Opened`, never through the return value.
pub trait Transport {
    /// Start connecting, dropping any previous connection
    fn connect(&mut self, url: Url) -> SessionId;
    /// Queue one text frame on the live connection
    fn send(&mut self, text: String) -> Result<(), ClientError>;
    /// Close the live connection; no-op without one
    fn disconnect(&mut self);
}

/// Build the connection URL, adding the display name when one is given
pub fn connection_url(endpoint: &Url, display_name: Option<&str>) -> Url {
    let mut url = endpoint.clone();
    if let Some(name) = display_name.map(str::trim).filter(|n| !n.is_empty()) {
        url.query_pairs_mut().append_pair(CLIENT_NAME_PARAM, name);
    }
    url
}

/// Handle to a spawned connection task
#[derive(Debug)]
struct Connection {
    id: SessionId,
    outbound: mpsc::UnboundedSender<String>,
    task: JoinHandle<()>,
}

/// tokio-tungstenite backed transport
///
/// Each connection runs in its own task; events flow back over `events`.
#[derive(Debug)]
pub struct WsTransport {
    events: mpsc::Sender<TransportEnvelope>,
    active: Option<Connection>,
}

impl WsTransport {
    /// Create a transport reporting into the given event channel
    pub fn new(events: mpsc::Sender<TransportEnvelope>) -> Self {
        Self {
            events,
            active: None,
        }
    }
}

impl Transport for WsTransport {
    fn connect(&mut self, url: Url) -> SessionId {
        if let Some(previous) = self.active.take() {
            debug!("Dropping connection {} for a new connect", previous.id);
            previous.task.abort();
        }

        let id = SessionId::new();
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(run_connection(id, url, outbound_rx, self.events.clone()));
        self.active = Some(Connection { id, outbound, task });
        id
    }

    fn send(&mut self, text: String) -> Result<(), ClientError> {
        let connection = self.active.as_ref().ok_or(ClientError::NotConnected)?;
        connection
            .outbound
            .send(text)
            .map_err(|_| ClientError::ChannelSend)
    }

    fn disconnect(&mut self) {
        // Dropping the sender lets the task send a close frame and finish
        if let Some(connection) = self.active.take() {
            debug!("Closing connection {}", connection.id);
        }
    }
}

/// Drive one connection until it closes
async fn run_connection(
    id: SessionId,
    url: Url,
    mut outbound: mpsc::UnboundedReceiver<String>,
    events: mpsc::Sender<TransportEnvelope>,
) {
    let emit = |event: TransportEvent| {
        let events = events.clone();
        async move {
            if events
                .send(TransportEnvelope { session: id, event })
                .await
                .is_err()
            {
                debug!("Client loop gone, dropping event for {}", id);
            }
        }
    };

    info!("Connecting to {}", url);
    let ws_stream = match tokio_tungstenite::connect_async(url.as_str()).await {
        Ok((stream, _response)) => stream,
        Err(e) => {
            warn!("Connection {} failed: {}", id, e);
            emit(TransportEvent::Error(e.to_string())).await;
            emit(TransportEvent::Closed).await;
            return;
        }
    };
    info!("Connection {} opened", id);
    emit(TransportEvent::Opened).await;

    let (mut ws_sender, mut ws_receiver) = ws_stream.split();

    loop {
        tokio::select! {
            inbound = ws_receiver.next() => match inbound {
                Some(Ok(Message::Text(text))) => {
                    emit(TransportEvent::MessageReceived(text.to_string())).await;
                }
                Some(Ok(Message::Close(_))) => {
                    debug!("Broker sent close frame on {}", id);
                    break;
                }
                Some(Ok(Message::Ping(_))) => {
                    // Pong is handled automatically by tungstenite
                    debug!("Ping on {}", id);
                }
                Some(Ok(Message::Pong(_))) => {
                    debug!("Pong on {}", id);
                }
                Some(Ok(Message::Binary(data))) => {
                    // Handed on as text; the decoder reports it if unparseable
                    debug!("Binary frame ({} bytes) on {}", data.len(), id);
                    let text = String::from_utf8_lossy(&data).into_owned();
                    emit(TransportEvent::MessageReceived(text)).await;
                }
                Some(Ok(_)) => {
                    debug!("Raw frame on {}", id);
                }
                Some(Err(e)) => {
                    error!("WebSocket error on {}: {}", id, e);
                    emit(TransportEvent::Error(e.to_string())).await;
                    break;
                }
                None => break,
            },
            outgoing = outbound.recv() => match outgoing {
                Some(text) => {
                    if let Err(e) = ws_sender.send(Message::Text(text.into())).await {
                        error!("WebSocket send failed on {}: {}", id, e);
                        emit(TransportEvent::Error(e.to_string())).await;
                        break;
                    }
                }
                None => {
                    debug!("Local disconnect on {}", id);
                    let _ = ws_sender.close().await;
                    break;
                }
            },
        }
    }

    info!("Connection {} closed", id);
    emit(TransportEvent::Closed).await;
}
