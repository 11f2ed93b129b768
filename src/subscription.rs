//! Subscription reconciliation
//!
//! Keeps the local view of subscribed channels. Subscribe and unsubscribe
//! are applied optimistically as soon as the command goes out; a channel
//! list acknowledgment from the broker then replaces the set wholesale.
//! The broker always wins.

use tracing::{debug, warn};

use crate::error::{ClientError, ValidationError};
use crate::message::{Acknowledgment, Command};

/// Where the reconciler sends its commands
pub trait CommandSink {
    fn dispatch(&mut self, command: Command) -> Result<(), ClientError>;
}

impl CommandSink for Vec<Command> {
    fn dispatch(&mut self, command: Command) -> Result<(), ClientError> {
        self.push(command);
        Ok(())
    }
}

/// Insertion-ordered, duplicate-free set of channel names
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscriptionSet {
    channels: Vec<String>,
}

impl SubscriptionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if a channel is in the set
    pub fn contains(&self, channel: &str) -> bool {
        self.channels.iter().any(|c| c == channel)
    }

    /// Append a channel. Returns false if it was already present.
    fn insert(&mut self, channel: String) -> bool {
        if self.contains(&channel) {
            false
        } else {
            self.channels.push(channel);
            true
        }
    }

    /// Remove a channel. Returns false if it was not present.
    fn remove(&mut self, channel: &str) -> bool {
        let before = self.channels.len();
        self.channels.retain(|c| c != channel);
        self.channels.len() != before
    }

    /// Replace the whole set, keeping the given order and dropping repeats
    fn replace(&mut self, channels: Vec<String>) {
        self.channels.clear();
        for channel in channels {
            self.insert(channel);
        }
    }

    fn clear(&mut self) {
        self.channels.clear();
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    pub fn as_slice(&self) -> &[String] {
        &self.channels
    }

    pub fn to_vec(&self) -> Vec<String> {
        self.channels.clone()
    }
}

/// Owner of the subscription set
///
/// Every `request_*` validates first and only touches the set after the
/// command was accepted by the sink. Methods that change the set return
/// `true` when its contents actually changed.
#[derive(Debug, Default)]
pub struct Reconciler {
    set: SubscriptionSet,
}

impl Reconciler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current subscription set
    pub fn subscriptions(&self) -> &SubscriptionSet {
        &self.set
    }

    /// Send a subscribe and insert the channel without waiting for the ack
    pub fn request_subscribe(
        &mut self,
        channel: &str,
        sink: &mut impl CommandSink,
    ) -> Result<bool, ClientError> {
        let channel = non_blank(channel).ok_or(ValidationError::EmptyChannel)?;
        sink.dispatch(Command::Subscribe {
            channel_name: channel.clone(),
        })?;
        debug!("Optimistically subscribed to '{}'", channel);
        Ok(self.set.insert(channel))
    }

    /// Send an unsubscribe, remove the channel, then ask for a resync
    ///
    /// Once the unsubscribe is out the removal stands; a failed resync
    /// request is only logged.
    pub fn request_unsubscribe(
        &mut self,
        channel: &str,
        sink: &mut impl CommandSink,
    ) -> Result<bool, ClientError> {
        let channel = non_blank(channel).ok_or(ValidationError::EmptyChannel)?;
        sink.dispatch(Command::Unsubscribe {
            channel_name: channel.clone(),
        })?;
        let changed = self.set.remove(&channel);
        debug!("Optimistically unsubscribed from '{}'", channel);
        if let Err(e) = sink.dispatch(Command::List) {
            warn!("Resync after unsubscribing from '{}' not sent: {}", channel, e);
        }
        Ok(changed)
    }

    /// Send a publish to a channel in the current set
    ///
    /// Returns the `(channel, content)` that went out. The set is untouched.
    pub fn request_publish(
        &self,
        channel: &str,
        content: &str,
        sink: &mut impl CommandSink,
    ) -> Result<(String, String), ClientError> {
        let channel = non_blank(channel).ok_or(ValidationError::NoChannelSelected)?;
        let content = non_blank(content).ok_or(ValidationError::EmptyContent)?;
        if !self.set.contains(&channel) {
            return Err(ValidationError::NotSubscribed(channel).into());
        }
        sink.dispatch(Command::Publish {
            channel_name: channel.clone(),
            content: content.clone(),
        })?;
        Ok((channel, content))
    }

    /// Ask the broker for the authoritative channel list
    pub fn request_list(&self, sink: &mut impl CommandSink) -> Result<(), ClientError> {
        sink.dispatch(Command::List)
    }

    /// Apply an acknowledgment
    ///
    /// Only a channel list mutates the set; it then returns the new
    /// contents. Every other acknowledgment leaves the set alone.
    pub fn on_acknowledgment(&mut self, ack: &Acknowledgment) -> Option<Vec<String>> {
        match ack {
            Acknowledgment::ChannelList { channels } => {
                self.set.replace(channels.clone());
                debug!("Resynced subscriptions: {:?}", self.set.as_slice());
                Some(self.set.to_vec())
            }
            _ => None,
        }
    }

    /// Forget every subscription
    pub fn on_disconnect(&mut self) {
        self.set.clear();
    }
}

/// Trimmed input, or None if nothing is left
fn non_blank(input: &str) -> Option<String> {
    let trimmed = input.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}
