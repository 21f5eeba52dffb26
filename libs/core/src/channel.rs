//! Participant identities and the `<kind>#<id>` channel naming scheme.
//!
//! The same construction is used for a participant's own transport UUID and
//! for every topic a participant subscribes to, so routing on the other side
//! can rely on the format.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

const SEPARATOR: char = '#';

/// Raised when a channel is built from a kind outside the closed participant set.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid participant kind `{kind}` (expected one of client, user, room, faculty)")]
pub struct InvalidKindError {
    pub kind: String,
}

/// Kinds of participants that own a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ParticipantKind {
    Client,
    /// Helpdesk agent (human or the bot).
    User,
    Room,
    Faculty,
}

impl ParticipantKind {
    pub const ALL: [ParticipantKind; 4] = [
        ParticipantKind::Client,
        ParticipantKind::User,
        ParticipantKind::Room,
        ParticipantKind::Faculty,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ParticipantKind::Client => "client",
            ParticipantKind::User => "user",
            ParticipantKind::Room => "room",
            ParticipantKind::Faculty => "faculty",
        }
    }
}

impl fmt::Display for ParticipantKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ParticipantKind {
    type Err = InvalidKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "client" => Ok(ParticipantKind::Client),
            "user" => Ok(ParticipantKind::User),
            "room" => Ok(ParticipantKind::Room),
            "faculty" => Ok(ParticipantKind::Faculty),
            other => Err(InvalidKindError {
                kind: other.to_string(),
            }),
        }
    }
}

/// A participant identity: `(kind, id)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Participant {
    pub kind: ParticipantKind,
    pub id: String,
}

impl Participant {
    pub fn new(kind: ParticipantKind, id: impl Into<String>) -> Self {
        Self {
            kind,
            id: id.into(),
        }
    }

    pub fn channel(&self) -> ChannelName {
        ChannelName::new(self.kind, &self.id)
    }
}

/// Transport channel / UUID string of the form `<kind>#<id>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelName {
    kind: ParticipantKind,
    raw: String,
}

impl ChannelName {
    pub fn new(kind: ParticipantKind, id: impl AsRef<str>) -> Self {
        Self {
            kind,
            raw: format!("{}{}{}", kind.as_str(), SEPARATOR, id.as_ref()),
        }
    }

    /// Shorthand for `room#<id>`.
    pub fn room(id: impl AsRef<str>) -> Self {
        Self::new(ParticipantKind::Room, id)
    }

    /// Shorthand for `client#<id>`.
    pub fn client(id: impl AsRef<str>) -> Self {
        Self::new(ParticipantKind::Client, id)
    }

    /// Shorthand for `user#<id>`.
    pub fn user(id: impl AsRef<str>) -> Self {
        Self::new(ParticipantKind::User, id)
    }

    /// Shorthand for `faculty#<id>`.
    pub fn faculty(id: impl AsRef<str>) -> Self {
        Self::new(ParticipantKind::Faculty, id)
    }

    /// Parses a `<kind>#<id>` string. The id may itself contain `#`.
    pub fn parse(raw: &str) -> Result<Self, InvalidKindError> {
        let (kind, id) = raw.split_once(SEPARATOR).ok_or_else(|| InvalidKindError {
            kind: raw.to_string(),
        })?;
        Ok(Self::new(kind.parse()?, id))
    }

    pub fn kind(&self) -> ParticipantKind {
        self.kind
    }

    pub fn id(&self) -> &str {
        &self.raw[self.kind.as_str().len() + SEPARATOR.len_utf8()..]
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn participant(&self) -> Participant {
        Participant::new(self.kind, self.id())
    }
}

impl fmt::Display for ChannelName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl AsRef<str> for ChannelName {
    fn as_ref(&self) -> &str {
        &self.raw
    }
}

impl Serialize for ChannelName {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.raw)
    }
}

impl<'de> Deserialize<'de> for ChannelName {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        ChannelName::parse(&raw).map_err(serde::de::Error::custom)
    }
}

/// Builds the channel name for a `(kind, id)` pair given as plain strings.
///
/// ```
/// use hdesk_core::channel_name;
///
/// assert_eq!(channel_name("room", "42").unwrap().as_str(), "room#42");
/// assert!(channel_name("admin", "1").is_err());
/// ```
pub fn channel_name(kind: &str, id: &str) -> Result<ChannelName, InvalidKindError> {
    Ok(ChannelName::new(kind.parse()?, id))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_every_kind() {
        for kind in ParticipantKind::ALL {
            let name = channel_name(kind.as_str(), "abc").unwrap();
            assert_eq!(name.as_str(), format!("{kind}#abc"));
            assert_eq!(name.kind(), kind);
            assert_eq!(name.id(), "abc");
        }
    }

    #[test]
    fn rejects_unknown_kind() {
        let err = channel_name("agent", "1").unwrap_err();
        assert_eq!(err.kind, "agent");
        assert!(channel_name("Client", "1").is_err());
        assert!(channel_name("", "1").is_err());
    }

    #[test]
    fn parse_keeps_hashes_in_id() {
        let name = ChannelName::parse("client#a#b").unwrap();
        assert_eq!(name.kind(), ParticipantKind::Client);
        assert_eq!(name.id(), "a#b");
        assert!(ChannelName::parse("no-separator").is_err());
        assert!(ChannelName::parse("bogus#1").is_err());
    }

    #[test]
    fn serde_uses_plain_string() {
        let name = ChannelName::faculty("law");
        let json = serde_json::to_string(&name).unwrap();
        assert_eq!(json, "\"faculty#law\"");
        let back: ChannelName = serde_json::from_str(&json).unwrap();
        assert_eq!(back, name);
        assert!(serde_json::from_str::<ChannelName>("\"nope#1\"").is_err());
    }

    #[test]
    fn participant_round_trips_through_channel() {
        let participant = Participant::new(ParticipantKind::User, "bot");
        assert_eq!(participant.channel().participant(), participant);
    }
}
