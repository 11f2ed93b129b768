//! Publish/Subscribe Chat Client - Terminal Entry Point
//!
//! Reads slash commands from stdin, forwards them to the ChatClient actor
//! and prints whatever the client reports.

use std::env;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use pubsub_chat_client::{ChatClient, ClientConfig, ClientEvent, UserRequest, WsTransport};

/// Channel buffer size for user requests
const REQUEST_BUFFER_SIZE: usize = 32;

const HELP: &str = "commands: /connect [name], /disconnect, /sub <channel>, \
/unsub <channel>, /pub <channel> <message>, /list, /quit";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging with environment filter
    // Use RUST_LOG env var to control log level
    // e.g., RUST_LOG=debug or RUST_LOG=pubsub_chat_client=trace
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("pubsub_chat_client=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    // Endpoint from command line overrides the environment
    let mut config = ClientConfig::from_env()?;
    if let Some(endpoint) = env::args().nth(1) {
        config = config.with_endpoint(&endpoint)?;
    }
    info!("Using broker endpoint {}", config.endpoint);

    let (event_tx, event_rx) = mpsc::channel(config.event_buffer);
    let (request_tx, request_rx) = mpsc::channel(REQUEST_BUFFER_SIZE);
    let (sink_tx, mut sink_rx) = mpsc::unbounded_channel();

    let client = ChatClient::new(config.endpoint.clone(), WsTransport::new(event_tx), sink_tx);
    let client_task = tokio::spawn(client.run(request_rx, event_rx));

    let printer = tokio::spawn(async move {
        while let Some(event) = sink_rx.recv().await {
            println!("{}", render(&event));
        }
    });

    println!("{}", HELP);
    if config.display_name.is_some() {
        request_tx
            .send(UserRequest::Connect {
                display_name: config.display_name.clone(),
            })
            .await?;
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        match parse_line(&line) {
            Some(Input::Quit) => break,
            Some(Input::Request(request)) => {
                if request_tx.send(request).await.is_err() {
                    error!("Client loop stopped");
                    break;
                }
            }
            Some(Input::Help) => println!("{}", HELP),
            None => {}
        }
    }

    drop(request_tx);
    let _ = client_task.await;
    let _ = printer.await;
    Ok(())
}

enum Input {
    Request(UserRequest),
    Help,
    Quit,
}

fn parse_line(line: &str) -> Option<Input> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    let (command, rest) = line.split_once(' ').unwrap_or((line, ""));
    let rest = rest.trim();

    let request = match command {
        "/connect" => UserRequest::Connect {
            display_name: (!rest.is_empty()).then(|| rest.to_string()),
        },
        "/disconnect" => UserRequest::Disconnect,
        "/sub" => UserRequest::Subscribe {
            channel_name: rest.to_string(),
        },
        "/unsub" => UserRequest::Unsubscribe {
            channel_name: rest.to_string(),
        },
        "/pub" => {
            let (channel_name, content) = rest.split_once(' ').unwrap_or((rest, ""));
            UserRequest::Publish {
                channel_name: channel_name.to_string(),
                content: content.to_string(),
            }
        }
        "/list" => UserRequest::List,
        "/quit" => return Some(Input::Quit),
        _ => return Some(Input::Help),
    };
    Some(Input::Request(request))
}

fn render(event: &ClientEvent) -> String {
    match event {
        ClientEvent::SessionStateChanged(state) => format!("* {}", state),
        ClientEvent::ChatReceived(chat) => {
            let time = chat
                .sent_at_parsed()
                .map(|t| t.format("%H:%M:%S").to_string())
                .unwrap_or_else(|| chat.sent_at.clone());
            format!("[{}] #{} - {}: {}", time, chat.channel_name, chat.sender, chat.content)
        }
        ClientEvent::SubscriptionsChanged(channels) if channels.is_empty() => {
            "* subscriptions: none".to_string()
        }
        ClientEvent::SubscriptionsChanged(channels) => {
            let tags: Vec<String> = channels.iter().map(|c| format!("#{}", c)).collect();
            format!("* subscriptions: {}", tags.join(" "))
        }
        ClientEvent::CommandFailed(detail) => format!("! Error: {}", detail),
        ClientEvent::ConnectedAs(name) => format!("* Connected as: {}", name),
        ClientEvent::Subscribed {
            channel_name,
            total_subscribers,
        } => format!(
            "* Subscribed to #{} ({} subscribers)",
            channel_name, total_subscribers
        ),
        ClientEvent::Acknowledged => "* OK".to_string(),
        ClientEvent::Published {
            channel_name,
            content,
        } => format!("[Sent to #{}]: {}", channel_name, content),
        ClientEvent::TransportFailed(detail) => format!("! WebSocket error: {}", detail),
        ClientEvent::Diagnostic(text) => format!("! {}", text),
    }
}
