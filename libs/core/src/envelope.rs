//! Chat message envelope exchanged over the transport and kept in room history.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::{ChannelName, Timetoken};

/// Only envelopes carrying a transport-assigned timetoken may enter a history.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("envelope from {sender} in room {room_id} has no timetoken")]
pub struct UnconfirmedEnvelopeError {
    pub room_id: String,
    pub sender: ChannelName,
}

/// Structural control messages published next to ordinary chat content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RoomEvent {
    /// The bot stopped answering; humans own the room from now on.
    #[serde(rename = "stoppedFAQs")]
    StoppedFaqs,
    /// A client opened the chat widget for a room (sent on the faculty lobby channel).
    #[serde(rename = "conversationOpened")]
    ConversationOpened,
}

/// Button shown under a bot message; clicking it sends `go_to_blocks` back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuickReply {
    pub title: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub go_to_blocks: Vec<String>,
}

impl QuickReply {
    pub fn new(title: impl Into<String>, go_to_blocks: Vec<String>) -> Self {
        Self {
            title: title.into(),
            go_to_blocks,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttachmentType {
    Template,
    File,
    Image,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attachment {
    #[serde(rename = "type")]
    pub kind: AttachmentType,
    #[serde(default)]
    pub payload: Value,
}

/// Closed set of message bodies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MessageContent {
    Text(String),
    QuickReplies(Vec<QuickReply>),
    Attachment(Attachment),
    Event(RoomEvent),
}

impl MessageContent {
    pub fn text(text: impl Into<String>) -> Self {
        MessageContent::Text(text.into())
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            MessageContent::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_event(&self) -> Option<RoomEvent> {
        match self {
            MessageContent::Event(event) => Some(*event),
            MessageContent::Text(_)
            | MessageContent::QuickReplies(_)
            | MessageContent::Attachment(_) => None,
        }
    }

    /// Short label used in logs and metrics.
    pub fn label(&self) -> &'static str {
        match self {
            MessageContent::Text(_) => "text",
            MessageContent::QuickReplies(_) => "quick_replies",
            MessageContent::Attachment(_) => "attachment",
            MessageContent::Event(_) => "event",
        }
    }
}

/// One chat event.
///
/// Created locally with no timetoken, confirmed once the transport acknowledges the publish.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    pub room_id: String,
    #[serde(rename = "senderUUID")]
    pub sender: ChannelName,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timetoken: Option<Timetoken>,
    pub content: MessageContent,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub go_to_blocks: Vec<String>,
}

impl Envelope {
    pub fn with_go_to_blocks(mut self, blocks: Vec<String>) -> Self {
        self.go_to_blocks = blocks;
        self
    }

    /// Stamps the transport-assigned timetoken.
    pub fn confirm(mut self, timetoken: Timetoken) -> Self {
        self.timetoken = Some(timetoken);
        self
    }

    pub fn is_confirmed(&self) -> bool {
        self.timetoken.is_some()
    }

    pub fn require_timetoken(&self) -> Result<Timetoken, UnconfirmedEnvelopeError> {
        self.timetoken.ok_or_else(|| UnconfirmedEnvelopeError {
            room_id: self.room_id.clone(),
            sender: self.sender.clone(),
        })
    }

    /// De-duplication key: `(senderUUID, timetoken)`.
    pub fn dedup_key(&self) -> Option<(&ChannelName, Timetoken)> {
        self.timetoken.map(|tt| (&self.sender, tt))
    }
}

/// Builds an unsent envelope. Does not touch the transport.
pub fn create_message(
    room_id: impl Into<String>,
    content: MessageContent,
    sender: ChannelName,
) -> Envelope {
    Envelope {
        room_id: room_id.into(),
        sender,
        timetoken: None,
        content,
        go_to_blocks: Vec::new(),
    }
}
