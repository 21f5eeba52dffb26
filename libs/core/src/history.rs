//! Time-ordered, de-duplicated room history.

use serde::{Deserialize, Serialize};

use crate::{ChannelName, Envelope, ParticipantKind, Timetoken, UnconfirmedEnvelopeError};

/// Result of [`History::append`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    Inserted,
    /// Same `(senderUUID, timetoken)` already present; history unchanged.
    Duplicate,
}

impl AppendOutcome {
    pub fn is_duplicate(&self) -> bool {
        matches!(self, AppendOutcome::Duplicate)
    }
}

/// Envelopes kept in ascending timetoken order; ties are ordered by sender.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Envelope>", into = "Vec<Envelope>")]
pub struct History {
    entries: Vec<Envelope>,
}

/// One page of history, oldest first.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryPage {
    pub messages: Vec<Envelope>,
    /// Pass as `before` to fetch the next older page; `None` once the start is reached.
    pub next_before: Option<Timetoken>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Envelope> {
        self.entries.iter()
    }

    pub fn latest(&self) -> Option<&Envelope> {
        self.entries.last()
    }

    pub fn contains(&self, sender: &ChannelName, timetoken: Timetoken) -> bool {
        self.position(sender, timetoken).is_ok()
    }

    fn position(&self, sender: &ChannelName, timetoken: Timetoken) -> Result<usize, usize> {
        self.entries.binary_search_by(|probe| {
            let probe_tt = probe.timetoken.unwrap_or(Timetoken::ZERO);
            probe_tt
                .cmp(&timetoken)
                .then_with(|| probe.sender.cmp(sender))
        })
    }

    /// Inserts a confirmed envelope at its timetoken position.
    ///
    /// Re-delivery of an already stored `(senderUUID, timetoken)` is a no-op.
    pub fn append(&mut self, envelope: Envelope) -> Result<AppendOutcome, UnconfirmedEnvelopeError> {
        let timetoken = envelope.require_timetoken()?;
        match self.position(&envelope.sender, timetoken) {
            Ok(_) => Ok(AppendOutcome::Duplicate),
            Err(index) => {
                self.entries.insert(index, envelope);
                Ok(AppendOutcome::Inserted)
            }
        }
    }

    /// Envelopes strictly after `timetoken`, oldest first.
    pub fn messages_since(&self, timetoken: Timetoken) -> MessagesSince<'_> {
        let start = self
            .entries
            .partition_point(|env| env.timetoken.unwrap_or(Timetoken::ZERO) <= timetoken);
        MessagesSince {
            inner: self.entries[start..].iter(),
            kind: None,
            sender: None,
        }
    }

    /// Newest `limit` envelopes strictly before `before` (or the newest overall).
    pub fn page(&self, before: Option<Timetoken>, limit: usize) -> HistoryPage {
        let end = match before {
            Some(before) => self
                .entries
                .partition_point(|env| env.timetoken.unwrap_or(Timetoken::ZERO) < before),
            None => self.entries.len(),
        };
        let start = end.saturating_sub(limit);
        let next_before = if start > 0 {
            self.entries[start].timetoken
        } else {
            None
        };
        HistoryPage {
            messages: self.entries[start..end].to_vec(),
            next_before,
        }
    }
}

impl<'a> IntoIterator for &'a History {
    type Item = &'a Envelope;
    type IntoIter = std::slice::Iter<'a, Envelope>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

impl TryFrom<Vec<Envelope>> for History {
    type Error = UnconfirmedEnvelopeError;

    fn try_from(envelopes: Vec<Envelope>) -> Result<Self, Self::Error> {
        let mut history = History::new();
        for envelope in envelopes {
            history.append(envelope)?;
        }
        Ok(history)
    }
}

impl From<History> for Vec<Envelope> {
    fn from(history: History) -> Self {
        history.entries
    }
}

/// Filtered view over the tail of a history. Cloning restarts the scan.
#[derive(Debug, Clone)]
pub struct MessagesSince<'a> {
    inner: std::slice::Iter<'a, Envelope>,
    kind: Option<ParticipantKind>,
    sender: Option<&'a ChannelName>,
}

impl<'a> MessagesSince<'a> {
    pub fn from_kind(mut self, kind: ParticipantKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn from_sender(mut self, sender: &'a ChannelName) -> Self {
        self.sender = Some(sender);
        self
    }
}

impl<'a> Iterator for MessagesSince<'a> {
    type Item = &'a Envelope;

    fn next(&mut self) -> Option<Self::Item> {
        let kind = self.kind;
        let sender = self.sender;
        self.inner.find(|env| {
            kind.is_none_or(|k| env.sender.kind() == k) && sender.is_none_or(|s| &env.sender == s)
        })
    }
}
