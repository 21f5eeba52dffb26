use std::collections::BTreeSet;

use hdesk_core::{
    AppendOutcome, ChannelName, Envelope, History, ParticipantKind, Timetoken,
    UnconfirmedEnvelopeError,
};
use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};

use crate::BotTimings;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomAttributes {
    /// `None` while the bot serves FAQs; the handoff timetoken afterwards.
    #[serde(rename = "stoppedFAQs", default)]
    stopped_faqs: Option<Timetoken>,
}

impl RoomAttributes {
    pub fn stopped_faqs(&self) -> Option<Timetoken> {
        self.stopped_faqs
    }
}

/// Who is answering a room.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BotState {
    ServingFaqs,
    HandedOff(Timetoken),
}

/// Turns taken since the handoff, derived from history.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandoffCounts {
    pub from_client: usize,
    pub from_bot: usize,
}

impl HandoffCounts {
    /// The client asked exactly one question and the bot only sent its handoff notice.
    pub fn wants_email_capture(&self) -> bool {
        self.from_client == 1 && self.from_bot == 1
    }
}

/// Room aggregate: handoff marker, history and the channels its participants use.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Room {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default)]
    attributes: RoomAttributes,
    #[serde(default)]
    history: History,
    #[serde(default)]
    channels: BTreeSet<ChannelName>,
}

impl Room {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            attributes: RoomAttributes::default(),
            history: History::new(),
            channels: BTreeSet::new(),
        }
    }

    pub fn channel(&self) -> ChannelName {
        ChannelName::room(&self.id)
    }

    pub fn attributes(&self) -> &RoomAttributes {
        &self.attributes
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn channels(&self) -> &BTreeSet<ChannelName> {
        &self.channels
    }

    pub fn state(&self) -> BotState {
        match self.attributes.stopped_faqs {
            Some(at) => BotState::HandedOff(at),
            None => BotState::ServingFaqs,
        }
    }

    pub fn record(&mut self, envelope: Envelope) -> Result<AppendOutcome, UnconfirmedEnvelopeError> {
        self.history.append(envelope)
    }

    /// Sets the handoff marker once; later calls keep the first value and return `false`.
    pub fn mark_handed_off(&mut self, at: Timetoken) -> bool {
        if self.attributes.stopped_faqs.is_some() {
            return false;
        }
        self.attributes.stopped_faqs = Some(at);
        true
    }

    pub fn add_channels<'a>(&mut self, channels: impl IntoIterator<Item = &'a ChannelName>) -> bool {
        let before = self.channels.len();
        self.channels.extend(channels.into_iter().cloned());
        self.channels.len() != before
    }

    /// Client and bot messages strictly after the handoff; `None` while serving FAQs.
    pub fn handoff_counts(&self, bot: &ChannelName) -> Option<HandoffCounts> {
        let BotState::HandedOff(at) = self.state() else {
            return None;
        };
        let since = self.history.messages_since(at);
        Some(HandoffCounts {
            from_client: since.clone().from_kind(ParticipantKind::Client).count(),
            from_bot: since.from_sender(bot).count(),
        })
    }

    /// FAQ block to open the conversation with, if any.
    pub fn opening_block(&self, now: OffsetDateTime, idle_after: Duration) -> Option<&'static str> {
        if self.attributes.stopped_faqs.is_some() {
            return None;
        }
        match self.history.latest().and_then(|env| env.timetoken) {
            None => Some(hdesk_core::WELCOME_BLOCK),
            Some(last) if last.age(now) > idle_after => Some(hdesk_core::HI_BLOCK),
            Some(_) => None,
        }
    }

    pub fn opening_block_for(&self, timings: &BotTimings) -> Option<&'static str> {
        self.opening_block(OffsetDateTime::now_utc(), timings.idle_after)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hdesk_core::{MessageContent, create_message};

    fn text(sender: ChannelName, tt: Timetoken) -> Envelope {
        create_message("r1", MessageContent::text("x"), sender).confirm(tt)
    }

    #[test]
    fn handoff_marker_is_set_once() {
        let mut room = Room::new("r1");
        assert_eq!(room.state(), BotState::ServingFaqs);
        assert!(room.mark_handed_off(Timetoken::new(10)));
        assert!(!room.mark_handed_off(Timetoken::new(20)));
        assert_eq!(room.state(), BotState::HandedOff(Timetoken::new(10)));
    }

    #[test]
    fn opening_block_rules() {
        let now = OffsetDateTime::now_utc();
        let idle = Duration::days(30);
        let mut room = Room::new("r1");
        assert_eq!(room.opening_block(now, idle), Some("welcome"));

        room.record(text(
            ChannelName::client("1"),
            Timetoken::from_datetime(now - Duration::days(45)),
        ))
        .unwrap();
        assert_eq!(room.opening_block(now, idle), Some("hi"));

        room.record(text(
            ChannelName::client("1"),
            Timetoken::from_datetime(now - Duration::days(2)),
        ))
        .unwrap();
        assert_eq!(room.opening_block(now, idle), None);

        let mut handed = Room::new("r2");
        handed.mark_handed_off(Timetoken::new(1));
        assert_eq!(handed.opening_block(now, idle), None);
    }

    #[test]
    fn counts_exclude_the_handoff_event() {
        let bot = ChannelName::user("bot");
        let mut room = Room::new("r1");
        assert!(room.handoff_counts(&bot).is_none());

        room.record(text(bot.clone(), Timetoken::new(10))).unwrap();
        room.mark_handed_off(Timetoken::new(10));
        room.record(text(bot.clone(), Timetoken::new(11))).unwrap();
        room.record(text(ChannelName::user("alice"), Timetoken::new(12)))
            .unwrap();
        room.record(text(ChannelName::client("1"), Timetoken::new(13)))
            .unwrap();

        let counts = room.handoff_counts(&bot).unwrap();
        assert_eq!(
            counts,
            HandoffCounts {
                from_client: 1,
                from_bot: 1
            }
        );
        assert!(counts.wants_email_capture());
    }

    #[test]
    fn serializes_with_document_field_names() {
        let mut room = Room::new("r1");
        room.mark_handed_off(Timetoken::new(5));
        room.add_channels([&ChannelName::room("r1")]);
        let value = serde_json::to_value(&room).unwrap();
        assert_eq!(value["_id"], "r1");
        assert_eq!(value["attributes"]["stoppedFAQs"], "5");
        assert_eq!(value["channels"][0], "room#r1");

        let back: Room = serde_json::from_value(value).unwrap();
        assert_eq!(back, room);
        let fresh: Room = serde_json::from_value(serde_json::json!({"_id": "r9"})).unwrap();
        assert_eq!(fresh.state(), BotState::ServingFaqs);
    }
}
