//! ChatClient actor implementation
//!
//! The composition root: owns the live session, the subscription
//! reconciler, the transport and the event sink. User requests and
//! transport events are processed one at a time, in arrival order.

use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use url::Url;

use crate::error::ClientError;
use crate::event::{ClientEvent, EventSink};
use crate::message::{self, Acknowledgment, Command, Frame};
use crate::session::Session;
use crate::subscription::{CommandSink, Reconciler, SubscriptionSet};
use crate::transport::{connection_url, Transport, TransportEnvelope, TransportEvent};
use crate::types::SessionState;

/// Requests the presentation layer may make
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserRequest {
    Connect { display_name: Option<String> },
    Disconnect,
    Subscribe { channel_name: String },
    Unsubscribe { channel_name: String },
    Publish { channel_name: String, content: String },
    List,
}

/// Commands go to the transport only while the session is connected
struct Wire<'a, T: Transport> {
    transport: &'a mut T,
    connected: bool,
}

impl<'a, T: Transport> Wire<'a, T> {
    fn new(transport: &'a mut T, session: Option<&Session>) -> Self {
        Self {
            transport,
            connected: session.is_some_and(Session::is_connected),
        }
    }
}

impl<T: Transport> CommandSink for Wire<'_, T> {
    fn dispatch(&mut self, command: Command) -> Result<(), ClientError> {
        if !self.connected {
            return Err(ClientError::NotConnected);
        }
        let text = message::encode(&command)?;
        debug!("Sending {}", text);
        self.transport.send(text)
    }
}

/// The chat client
pub struct ChatClient<T: Transport, S: EventSink> {
    endpoint: Url,
    transport: T,
    sink: S,
    session: Option<Session>,
    reconciler: Reconciler,
}

impl<T: Transport, S: EventSink> ChatClient<T, S> {
    /// Create a disconnected client
    pub fn new(endpoint: Url, transport: T, sink: S) -> Self {
        Self {
            endpoint,
            transport,
            sink,
            session: None,
            reconciler: Reconciler::new(),
        }
    }

    /// Current lifecycle state
    pub fn state(&self) -> SessionState {
        self.session
            .as_ref()
            .map_or(SessionState::Disconnected, |s| s.state)
    }

    /// Live session, if any
    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    /// Current subscription set
    pub fn subscriptions(&self) -> &SubscriptionSet {
        self.reconciler.subscriptions()
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Start a new session, replacing any live one
    pub fn connect(&mut self, display_name: Option<String>) {
        if self.session.is_some() {
            info!("New connect request replaces the live session");
            self.disconnect();
        }

        let display_name = display_name
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty());
        let url = connection_url(&self.endpoint, display_name.as_deref());
        let id = self.transport.connect(url);
        info!("Session {} connecting", id);

        self.session = Some(Session::new(id, display_name));
        self.sink
            .emit(ClientEvent::SessionStateChanged(SessionState::Connecting));
    }

    /// Close the live session; no-op without one
    pub fn disconnect(&mut self) {
        if self.session.is_none() {
            return;
        }
        self.transport.disconnect();
        self.teardown();
    }

    pub fn request_subscribe(&mut self, channel: &str) -> Result<(), ClientError> {
        let mut wire = Wire::new(&mut self.transport, self.session.as_ref());
        if self.reconciler.request_subscribe(channel, &mut wire)? {
            self.notify_subscriptions();
        }
        Ok(())
    }

    pub fn request_unsubscribe(&mut self, channel: &str) -> Result<(), ClientError> {
        let mut wire = Wire::new(&mut self.transport, self.session.as_ref());
        if self.reconciler.request_unsubscribe(channel, &mut wire)? {
            self.notify_subscriptions();
        }
        Ok(())
    }

    pub fn request_publish(&mut self, channel: &str, content: &str) -> Result<(), ClientError> {
        let mut wire = Wire::new(&mut self.transport, self.session.as_ref());
        let (channel_name, content) = self.reconciler.request_publish(channel, content, &mut wire)?;
        self.sink.emit(ClientEvent::Published {
            channel_name,
            content,
        });
        Ok(())
    }

    pub fn request_list(&mut self) -> Result<(), ClientError> {
        let mut wire = Wire::new(&mut self.transport, self.session.as_ref());
        self.reconciler.request_list(&mut wire)
    }

    /// Apply a user request, surfacing rejections as diagnostics
    pub fn handle_request(&mut self, request: UserRequest) {
        let result = match request {
            UserRequest::Connect { display_name } => {
                self.connect(display_name);
                Ok(())
            }
            UserRequest::Disconnect => {
                self.disconnect();
                Ok(())
            }
            UserRequest::Subscribe { channel_name } => self.request_subscribe(&channel_name),
            UserRequest::Unsubscribe { channel_name } => self.request_unsubscribe(&channel_name),
            UserRequest::Publish {
                channel_name,
                content,
            } => self.request_publish(&channel_name, &content),
            UserRequest::List => self.request_list(),
        };

        if let Err(e) = result {
            warn!("Request rejected: {}", e);
            self.sink.emit(ClientEvent::Diagnostic(e.to_string()));
        }
    }

    /// Apply one transport event
    ///
    /// Events from a session other than the live one are dropped.
    pub fn handle_transport_event(&mut self, envelope: TransportEnvelope) {
        let Some(session) = self.session.as_mut() else {
            debug!("Dropping {:?}: no live session", envelope.event);
            return;
        };
        if session.id != envelope.session {
            debug!("Dropping {:?} from stale session {}", envelope.event, envelope.session);
            return;
        }

        match envelope.event {
            TransportEvent::Opened => {
                session.mark_connected();
                info!("Session {} connected", session.id);
                self.sink
                    .emit(ClientEvent::SessionStateChanged(SessionState::Connected));
            }
            TransportEvent::Closed => {
                info!("Session {} closed", session.id);
                self.teardown();
            }
            TransportEvent::Error(detail) => {
                warn!("Session {} transport error: {}", session.id, detail);
                self.sink.emit(ClientEvent::TransportFailed(detail));
                self.teardown();
            }
            TransportEvent::MessageReceived(text) => self.handle_frame(&text),
        }
    }

    /// Run the client loop
    ///
    /// Processes requests and transport events until the request channel
    /// closes, then disconnects.
    pub async fn run(
        mut self,
        mut requests: mpsc::Receiver<UserRequest>,
        mut events: mpsc::Receiver<TransportEnvelope>,
    ) {
        info!("ChatClient started");

        loop {
            tokio::select! {
                request = requests.recv() => match request {
                    Some(request) => self.handle_request(request),
                    None => break,
                },
                Some(envelope) = events.recv() => self.handle_transport_event(envelope),
            }
        }

        self.disconnect();
        info!("ChatClient shutting down");
    }

    fn handle_frame(&mut self, text: &str) {
        let frame = match message::decode(text) {
            Ok(frame) => frame,
            Err(e) => {
                warn!("{}", e);
                self.sink.emit(ClientEvent::Diagnostic(e.to_string()));
                return;
            }
        };

        match frame {
            Frame::Chat(chat) => self.sink.emit(ClientEvent::ChatReceived(chat)),
            Frame::Ack(ack) => self.handle_acknowledgment(ack),
            Frame::Unrecognized(value) => {
                let shown = serde_json::to_string_pretty(&value).unwrap_or_else(|_| text.to_string());
                debug!("Unrecognized frame: {}", text);
                self.sink.emit(ClientEvent::Diagnostic(shown));
            }
        }
    }

    fn handle_acknowledgment(&mut self, ack: Acknowledgment) {
        if let Some(channels) = self.reconciler.on_acknowledgment(&ack) {
            self.sink.emit(ClientEvent::SubscriptionsChanged(channels));
            return;
        }

        if let Some(detail) = ack.error_detail() {
            warn!("Command failed: {}", detail);
            self.sink.emit(ClientEvent::CommandFailed(detail.to_string()));
            return;
        }

        match ack {
            Acknowledgment::Connected { client_name } => {
                if let Some(session) = self.session.as_mut() {
                    session.set_client_name(client_name.clone());
                }
                self.sink.emit(ClientEvent::ConnectedAs(client_name));
            }
            Acknowledgment::Subscribed {
                channel_name,
                total_subscribers,
            } => self.sink.emit(ClientEvent::Subscribed {
                channel_name,
                total_subscribers,
            }),
            Acknowledgment::Empty | Acknowledgment::Other(_) => {
                self.sink.emit(ClientEvent::Acknowledged)
            }
            Acknowledgment::ChannelList { .. } | Acknowledgment::Error { .. } => {}
        }
    }

    /// Drop the session and every piece of state derived from it
    fn teardown(&mut self) {
        self.session = None;
        self.reconciler.on_disconnect();
        self.notify_subscriptions();
        self.sink
            .emit(ClientEvent::SessionStateChanged(SessionState::Disconnected));
    }

    fn notify_subscriptions(&mut self) {
        self.sink.emit(ClientEvent::SubscriptionsChanged(
            self.reconciler.subscriptions().to_vec(),
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::UNKNOWN_ERROR;
    use crate::types::SessionId;

    /// In-memory transport recording what the client does with it
    #[derive(Debug, Default)]
    struct RecordingTransport {
        connects: Vec<Url>,
        sessions: Vec<SessionId>,
        sent: Vec<String>,
        disconnects: usize,
    }

    impl Transport for RecordingTransport {
        fn connect(&mut self, url: Url) -> SessionId {
            let id = SessionId::new();
            self.connects.push(url);
            self.sessions.push(id);
            id
        }

        fn send(&mut self, text: String) -> Result<(), ClientError> {
            self.sent.push(text);
            Ok(())
        }

        fn disconnect(&mut self) {
            self.disconnects += 1;
        }
    }

    /// Accepts a fixed number of sends, then fails every one after
    #[derive(Debug)]
    struct FlakyTransport {
        remaining: usize,
        sent: Vec<String>,
    }

    impl Transport for FlakyTransport {
        fn connect(&mut self, _url: Url) -> SessionId {
            SessionId::new()
        }

        fn send(&mut self, text: String) -> Result<(), ClientError> {
            if self.remaining == 0 {
                return Err(ClientError::ChannelSend);
            }
            self.remaining -= 1;
            self.sent.push(text);
            Ok(())
        }

        fn disconnect(&mut self) {}
    }

    type TestClient = ChatClient<RecordingTransport, Vec<ClientEvent>>;

    fn new_client() -> TestClient {
        let endpoint = Url::parse("ws://localhost:3501/api/connect").unwrap();
        ChatClient::new(endpoint, RecordingTransport::default(), Vec::new())
    }

    fn current_session(client: &TestClient) -> SessionId {
        client.session().expect("live session").id
    }

    fn deliver(client: &mut TestClient, event: TransportEvent) {
        let session = current_session(client);
        client.handle_transport_event(TransportEnvelope { session, event });
    }

    fn receive(client: &mut TestClient, text: &str) {
        deliver(client, TransportEvent::MessageReceived(text.to_string()));
    }

    fn connected_client() -> TestClient {
        let mut client = new_client();
        client.connect(None);
        deliver(&mut client, TransportEvent::Opened);
        client.sink_mut().clear();
        client
    }

    fn channels(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[test]
    fn test_end_to_end_scenario() {
        let mut client = new_client();
        client.connect(None);
        deliver(&mut client, TransportEvent::Opened);
        receive(&mut client, r#"{"status":"ok","info":{"client_name":"guest-42"}}"#);
        client.request_subscribe("news").unwrap();
        receive(
            &mut client,
            r#"{"status":"ok","info":{"channel_name":"news","total_subscribers":3}}"#,
        );
        receive(
            &mut client,
            r#"{"sender":"bob","channel_name":"news","content":"hi","sent_at":"2024-01-01T00:00:00Z"}"#,
        );

        assert_eq!(
            client.session().and_then(|s| s.client_name.as_deref()),
            Some("guest-42")
        );
        assert_eq!(
            client.transport().sent,
            vec![r#"{"action":"subscribe","params":{"channel_name":"news"}}"#.to_string()]
        );
        assert_eq!(
            client.sink(),
            &vec![
                ClientEvent::SessionStateChanged(SessionState::Connecting),
                ClientEvent::SessionStateChanged(SessionState::Connected),
                ClientEvent::ConnectedAs("guest-42".to_string()),
                ClientEvent::SubscriptionsChanged(channels(&["news"])),
                ClientEvent::Subscribed {
                    channel_name: "news".to_string(),
                    total_subscribers: 3,
                },
                ClientEvent::ChatReceived(crate::message::ChatDelivery {
                    sender: "bob".to_string(),
                    channel_name: "news".to_string(),
                    content: "hi".to_string(),
                    sent_at: "2024-01-01T00:00:00Z".to_string(),
                }),
            ]
        );
    }

    #[test]
    fn test_connect_embeds_display_name() {
        let mut client = new_client();
        client.connect(Some("alice smith".to_string()));

        assert_eq!(client.state(), SessionState::Connecting);
        assert_eq!(
            client.transport().connects[0].as_str(),
            "ws://localhost:3501/api/connect?client_name=alice+smith"
        );
        assert_eq!(
            client.session().and_then(|s| s.display_name()),
            Some("alice smith")
        );
    }

    #[test]
    fn test_request_before_open_is_rejected() {
        let mut client = new_client();
        client.connect(None);

        let err = client.request_subscribe("news").unwrap_err();
        assert!(matches!(err, ClientError::NotConnected));
        assert!(client.transport().sent.is_empty());
        assert!(client.subscriptions().is_empty());
    }

    #[test]
    fn test_handle_request_surfaces_rejection() {
        let mut client = new_client();
        client.handle_request(UserRequest::List);

        assert_eq!(
            client.sink(),
            &vec![ClientEvent::Diagnostic("Not connected to server".to_string())]
        );
    }

    #[test]
    fn test_publish_gating() {
        let mut client = connected_client();

        let err = client.request_publish("x", "hello").unwrap_err();
        assert!(matches!(err, ClientError::Validation(_)));
        assert!(client.transport().sent.is_empty());
        assert!(client.sink().is_empty());
    }

    #[test]
    fn test_publish_echoes_locally() {
        let mut client = connected_client();
        client.request_subscribe("x").unwrap();
        client.request_publish("x", "hello").unwrap();

        assert_eq!(
            client.transport().sent.last().map(String::as_str),
            Some(r#"{"action":"publish","params":{"channel_name":"x","content":"hello"}}"#)
        );
        assert_eq!(
            client.sink().last(),
            Some(&ClientEvent::Published {
                channel_name: "x".to_string(),
                content: "hello".to_string(),
            })
        );
    }

    #[test]
    fn test_optimistic_then_resync_convergence() {
        let mut client = connected_client();
        client.request_subscribe("general").unwrap();
        receive(&mut client, r#"{"status":"ok","info":{"channels":["other"]}}"#);

        assert_eq!(client.subscriptions().as_slice(), ["other".to_string()]);
        assert_eq!(
            client.sink().last(),
            Some(&ClientEvent::SubscriptionsChanged(channels(&["other"])))
        );
    }

    #[test]
    fn test_resync_notifies_every_time() {
        let mut client = connected_client();
        let payload = r#"{"status":"ok","info":{"channels":["a","b"]}}"#;
        receive(&mut client, payload);
        receive(&mut client, payload);

        let expected = ClientEvent::SubscriptionsChanged(channels(&["a", "b"]));
        assert_eq!(client.sink(), &vec![expected.clone(), expected]);
    }

    #[test]
    fn test_unsubscribe_sends_list() {
        let mut client = connected_client();
        client.request_subscribe("news").unwrap();
        client.request_unsubscribe("news").unwrap();

        assert_eq!(
            client.transport().sent[1..],
            [
                r#"{"action":"unsubscribe","params":{"channel_name":"news"}}"#.to_string(),
                r#"{"action":"list"}"#.to_string(),
            ]
        );
        assert!(client.subscriptions().is_empty());
    }

    #[test]
    fn test_unsubscribe_notifies_when_resync_request_fails() {
        let endpoint = Url::parse("ws://localhost:3501/api/connect").unwrap();
        let transport = FlakyTransport {
            remaining: 2,
            sent: Vec::new(),
        };
        let mut client = ChatClient::new(endpoint, transport, Vec::new());
        client.connect(None);
        let session = client.session().expect("live session").id;
        client.handle_transport_event(TransportEnvelope {
            session,
            event: TransportEvent::Opened,
        });
        client.request_subscribe("news").unwrap();
        client.sink_mut().clear();

        // Unsubscribe goes out, the follow-up list does not
        client.request_unsubscribe("news").unwrap();

        assert!(client.subscriptions().is_empty());
        assert_eq!(
            client.transport().sent.last().map(String::as_str),
            Some(r#"{"action":"unsubscribe","params":{"channel_name":"news"}}"#)
        );
        assert_eq!(client.sink(), &vec![ClientEvent::SubscriptionsChanged(vec![])]);
    }

    #[test]
    fn test_closed_clears_state() {
        let mut client = connected_client();
        client.request_subscribe("a").unwrap();
        client.request_subscribe("b").unwrap();
        client.sink_mut().clear();

        deliver(&mut client, TransportEvent::Closed);

        assert_eq!(client.state(), SessionState::Disconnected);
        assert!(client.subscriptions().is_empty());
        assert_eq!(
            client.sink(),
            &vec![
                ClientEvent::SubscriptionsChanged(vec![]),
                ClientEvent::SessionStateChanged(SessionState::Disconnected),
            ]
        );
    }

    #[test]
    fn test_transport_error_ends_session() {
        let mut client = connected_client();
        client.request_subscribe("a").unwrap();

        deliver(&mut client, TransportEvent::Error("connection reset".to_string()));

        assert_eq!(client.state(), SessionState::Disconnected);
        assert!(client.subscriptions().is_empty());
        assert!(client
            .sink()
            .contains(&ClientEvent::TransportFailed("connection reset".to_string())));
    }

    #[test]
    fn test_disconnect_is_idempotent() {
        let mut client = connected_client();
        client.disconnect();
        client.disconnect();

        assert_eq!(client.transport().disconnects, 1);
        assert_eq!(
            client.sink(),
            &vec![
                ClientEvent::SubscriptionsChanged(vec![]),
                ClientEvent::SessionStateChanged(SessionState::Disconnected),
            ]
        );
    }

    #[test]
    fn test_reconnect_drops_stale_events() {
        let mut client = connected_client();
        let old_session = current_session(&client);
        client.request_subscribe("a").unwrap();

        client.connect(Some("bob".to_string()));
        assert!(client.subscriptions().is_empty());
        assert_eq!(client.state(), SessionState::Connecting);

        client.sink_mut().clear();
        client.handle_transport_event(TransportEnvelope {
            session: old_session,
            event: TransportEvent::Closed,
        });
        client.handle_transport_event(TransportEnvelope {
            session: old_session,
            event: TransportEvent::MessageReceived(r#"{"status":"ok","info":{"channels":["a"]}}"#.to_string()),
        });

        assert!(client.sink().is_empty());
        assert_eq!(client.state(), SessionState::Connecting);
        assert!(client.subscriptions().is_empty());
    }

    #[test]
    fn test_malformed_frame_is_diagnostic() {
        let mut client = connected_client();
        receive(&mut client, "not json");

        assert_eq!(client.state(), SessionState::Connected);
        assert_eq!(
            client.sink(),
            &vec![ClientEvent::Diagnostic("Failed to parse message: not json".to_string())]
        );
    }

    #[test]
    fn test_error_ack_keeps_optimistic_entry() {
        let mut client = connected_client();
        client.request_subscribe("news").unwrap();
        receive(&mut client, r#"{"status":"error","info":{"detail":"denied"}}"#);
        receive(&mut client, r#"{"status":"error"}"#);

        assert!(client.subscriptions().contains("news"));
        let failures: Vec<_> = client
            .sink()
            .iter()
            .filter_map(|e| match e {
                ClientEvent::CommandFailed(detail) => Some(detail.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(failures, ["denied", UNKNOWN_ERROR]);
    }

    #[test]
    fn test_unrecognized_frame_shown_verbatim() {
        let mut client = connected_client();
        receive(&mut client, r#"{"hello":"world"}"#);

        assert_eq!(
            client.sink(),
            &vec![ClientEvent::Diagnostic("{\n  \"hello\": \"world\"\n}".to_string())]
        );
    }

    #[tokio::test]
    async fn test_run_processes_requests_and_events_in_order() {
        let (request_tx, request_rx) = mpsc::channel(8);
        let (event_tx, event_rx) = mpsc::channel(8);
        let (sink_tx, mut sink_rx) = mpsc::unbounded_channel();
        let endpoint = Url::parse("ws://localhost:3501/api/connect").unwrap();

        // Session ids come from the transport; a fixed-id transport lets the
        // test stamp events before the client connects.
        struct FixedTransport(SessionId);
        impl Transport for FixedTransport {
            fn connect(&mut self, _url: Url) -> SessionId {
                self.0
            }
            fn send(&mut self, _text: String) -> Result<(), ClientError> {
                Ok(())
            }
            fn disconnect(&mut self) {}
        }

        let session = SessionId::new();
        let client = ChatClient::new(endpoint, FixedTransport(session), sink_tx);
        let handle = tokio::spawn(client.run(request_rx, event_rx));

        request_tx
            .send(UserRequest::Connect { display_name: None })
            .await
            .unwrap();
        assert_eq!(
            sink_rx.recv().await,
            Some(ClientEvent::SessionStateChanged(SessionState::Connecting))
        );

        event_tx
            .send(TransportEnvelope {
                session,
                event: TransportEvent::Opened,
            })
            .await
            .unwrap();
        assert_eq!(
            sink_rx.recv().await,
            Some(ClientEvent::SessionStateChanged(SessionState::Connected))
        );

        request_tx
            .send(UserRequest::Subscribe {
                channel_name: "news".to_string(),
            })
            .await
            .unwrap();
        assert_eq!(
            sink_rx.recv().await,
            Some(ClientEvent::SubscriptionsChanged(channels(&["news"])))
        );

        // Closing the request channel stops the loop, which disconnects
        drop(request_tx);
        handle.await.unwrap();
        assert_eq!(
            sink_rx.recv().await,
            Some(ClientEvent::SubscriptionsChanged(vec![]))
        );
        assert_eq!(
            sink_rx.recv().await,
            Some(ClientEvent::SessionStateChanged(SessionState::Disconnected))
        );
    }
}
