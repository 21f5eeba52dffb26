//! Transport contract the chat core needs from a publish/subscribe system.
//!
//! A [`Transport`] is bound to exactly one participant UUID. Everything it receives (messages,
//! presence changes and status reports) is fanned out through a single broadcast channel
//! returned by [`Transport::listen`]. Messages on one channel arrive in timetoken order; no
//! order is promised across channels, so consumers sequence by timetoken.

mod memory;
#[cfg(feature = "nats")]
mod nats;
mod subjects;

use std::sync::Arc;

use async_trait::async_trait;
use hdesk_core::{ChannelName, Envelope, Timetoken};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::broadcast;

pub use memory::{InMemoryHub, InMemoryTransport};
#[cfg(feature = "nats")]
pub use nats::NatsTransport;
pub use subjects::{channel_subject, presence_subject};

/// Capacity of the per-transport event fan-out.
pub const EVENT_BUFFER: usize = 256;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("publish to {channel} failed: {reason}")]
    Publish { channel: ChannelName, reason: String },
    #[error("subscribe to {channel} failed: {reason}")]
    Subscribe { channel: ChannelName, reason: String },
    #[error("transport rejected the request: {0}")]
    Validation(String),
    #[error("encode payload")]
    Encode(#[from] serde_json::Error),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Status categories reported by the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StatusCategory {
    Connected,
    Reconnected,
    Disconnected,
    NetworkIssues,
    AccessDenied,
    MalformedResponse,
    ValidationError,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusEvent {
    pub category: StatusCategory,
    pub error: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub affected_channels: Vec<ChannelName>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl StatusEvent {
    pub fn new(category: StatusCategory, error: bool) -> Self {
        Self {
            category,
            error,
            operation: None,
            affected_channels: Vec::new(),
            message: None,
        }
    }

    pub fn connected(channels: Vec<ChannelName>) -> Self {
        Self {
            operation: Some("subscribe".into()),
            affected_channels: channels,
            ..Self::new(StatusCategory::Connected, false)
        }
    }

    pub fn failure(
        category: StatusCategory,
        operation: &str,
        channel: Option<ChannelName>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            operation: Some(operation.to_string()),
            affected_channels: channel.into_iter().collect(),
            message: Some(message.into()),
            ..Self::new(category, true)
        }
    }

    pub fn severity(&self) -> StatusSeverity {
        classify_status(self)
    }

    /// Converts a fatal status into an error; reported and healthy statuses pass.
    pub fn into_result(self) -> Result<StatusEvent, TransportError> {
        match self.severity() {
            StatusSeverity::Fatal => Err(TransportError::Validation(
                self.message
                    .unwrap_or_else(|| "validation error".to_string()),
            )),
            StatusSeverity::Healthy | StatusSeverity::Reported => Ok(self),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusSeverity {
    Healthy,
    /// Logged; the triggering operation failed and the caller decides on retries.
    Reported,
    /// Propagated immediately.
    Fatal,
}

/// `validationError` is fatal, any other status flagged as an error is only reported.
///
/// ```
/// use hdesk_bus::{StatusCategory, StatusEvent, StatusSeverity, classify_status};
///
/// let fatal = StatusEvent::new(StatusCategory::ValidationError, true);
/// assert_eq!(classify_status(&fatal), StatusSeverity::Fatal);
/// let flaky = StatusEvent::new(StatusCategory::NetworkIssues, true);
/// assert_eq!(classify_status(&flaky), StatusSeverity::Reported);
/// ```
pub fn classify_status(status: &StatusEvent) -> StatusSeverity {
    match (status.category, status.error) {
        (StatusCategory::ValidationError, _) => StatusSeverity::Fatal,
        (_, true) => StatusSeverity::Reported,
        (_, false) => StatusSeverity::Healthy,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PresenceAction {
    Join,
    Leave,
    Timeout,
    StateChange,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceEvent {
    pub action: PresenceAction,
    pub channel: ChannelName,
    pub uuid: ChannelName,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub occupancy: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<Value>,
}

/// A message as delivered on one channel, already stamped with its timetoken.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    pub channel: ChannelName,
    pub publisher: ChannelName,
    pub timetoken: Timetoken,
    pub envelope: Envelope,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    Message(InboundMessage),
    Presence(PresenceEvent),
    Status(StatusEvent),
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// Participant this transport publishes as.
    fn uuid(&self) -> &ChannelName;

    /// Publishes one envelope. Failures are returned, never retried here.
    async fn publish(
        &self,
        channel: &ChannelName,
        envelope: &Envelope,
    ) -> Result<Timetoken, TransportError>;

    /// Subscribing to an already subscribed channel is a no-op.
    async fn subscribe(
        &self,
        channels: &[ChannelName],
        with_presence: bool,
    ) -> Result<(), TransportError>;

    async fn unsubscribe(&self, channels: &[ChannelName]) -> Result<(), TransportError>;

    async fn subscriptions(&self) -> Vec<ChannelName>;

    /// Sets this participant's presence state on `channel`.
    async fn set_state(&self, channel: &ChannelName, state: Value) -> Result<(), TransportError>;

    async fn state(
        &self,
        channel: &ChannelName,
        uuid: &ChannelName,
    ) -> Result<Option<Value>, TransportError>;

    /// The single dispatch point for messages, presence and status events.
    fn listen(&self) -> broadcast::Receiver<TransportEvent>;
}

pub type SharedTransport = Arc<dyn Transport>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fatal_status_becomes_error() {
        let status = StatusEvent::failure(
            StatusCategory::ValidationError,
            "publish",
            Some(ChannelName::room("1")),
            "bad channel",
        );
        let err = status.into_result().unwrap_err();
        assert!(matches!(err, TransportError::Validation(ref msg) if msg == "bad channel"));
    }

    #[test]
    fn reported_status_passes_through() {
        let status = StatusEvent::failure(StatusCategory::AccessDenied, "subscribe", None, "403");
        assert_eq!(status.severity(), StatusSeverity::Reported);
        assert!(status.into_result().is_ok());
        assert_eq!(
            StatusEvent::connected(vec![]).severity(),
            StatusSeverity::Healthy
        );
    }

    #[test]
    fn status_wire_names() {
        let status = StatusEvent::new(StatusCategory::ValidationError, true);
        let value = serde_json::to_value(&status).unwrap();
        assert_eq!(value["category"], "validationError");
    }
}
