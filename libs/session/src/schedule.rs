use std::time::Duration;

use hdesk_core::{ChannelName, MessageContent};

const OPENING_DELAY_ENV: &str = "HDESK_OPENING_DELAY_MS";
const STAGGER_ENV: &str = "HDESK_STAGGER_MS";
const NOTICE_DELAY_ENV: &str = "HDESK_NOTICE_DELAY_MS";
const IDLE_DAYS_ENV: &str = "HDESK_IDLE_DAYS";

/// Presentation delays used by the bot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BotTimings {
    /// Pause before the opening move of a conversation.
    pub opening_delay: Duration,
    /// Gap between consecutive messages of one FAQ block.
    pub stagger: Duration,
    /// Pause between the `stoppedFAQs` event and the handoff notice.
    pub handoff_notice_delay: Duration,
    /// A room idle for longer than this is greeted with the `hi` block.
    pub idle_after: time::Duration,
}

impl Default for BotTimings {
    fn default() -> Self {
        Self {
            opening_delay: Duration::from_millis(1000),
            stagger: Duration::from_millis(1000),
            handoff_notice_delay: Duration::from_millis(500),
            idle_after: time::Duration::days(30),
        }
    }
}

impl BotTimings {
    pub fn from_env() -> Self {
        let mut timings = Self::default();
        if let Some(ms) = env_u64(OPENING_DELAY_ENV) {
            timings.opening_delay = Duration::from_millis(ms);
        }
        if let Some(ms) = env_u64(STAGGER_ENV) {
            timings.stagger = Duration::from_millis(ms);
        }
        if let Some(ms) = env_u64(NOTICE_DELAY_ENV) {
            timings.handoff_notice_delay = Duration::from_millis(ms);
        }
        if let Some(days) = env_u64(IDLE_DAYS_ENV) {
            timings.idle_after = time::Duration::days(days.max(1) as i64);
        }
        timings
    }
}

fn env_u64(key: &str) -> Option<u64> {
    std::env::var(key)
        .ok()
        .and_then(|raw| raw.trim().parse::<u64>().ok())
}

/// One bot message to publish `offset` after the plan starts.
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduledSend {
    pub offset: Duration,
    pub channel: ChannelName,
    pub content: MessageContent,
}

/// Sends produced by one handling pass, each at a fixed offset from the start of the pass.
///
/// Entries are independent: one failing send does not hold back the others.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SendPlan {
    entries: Vec<ScheduledSend>,
}

impl SendPlan {
    pub fn new() -> Self {
        Self::default()
    }

    /// `contents[i]` goes out at `start + step * i`.
    pub fn staggered(
        channel: &ChannelName,
        contents: impl IntoIterator<Item = MessageContent>,
        start: Duration,
        step: Duration,
    ) -> Self {
        let entries = contents
            .into_iter()
            .enumerate()
            .map(|(index, content)| ScheduledSend {
                offset: start + step * index as u32,
                channel: channel.clone(),
                content,
            })
            .collect();
        Self { entries }
    }

    pub fn push_at(&mut self, offset: Duration, channel: ChannelName, content: MessageContent) {
        self.entries.push(ScheduledSend {
            offset,
            channel,
            content,
        });
    }

    pub fn entries(&self) -> &[ScheduledSend] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl IntoIterator for SendPlan {
    type Item = ScheduledSend;
    type IntoIter = std::vec::IntoIter<ScheduledSend>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn staggers_by_index() {
        let room = ChannelName::room("1");
        let plan = SendPlan::staggered(
            &room,
            ["a", "b", "c"].map(MessageContent::text),
            Duration::from_millis(100),
            Duration::from_millis(1000),
        );
        let offsets: Vec<u64> = plan
            .entries()
            .iter()
            .map(|e| e.offset.as_millis() as u64)
            .collect();
        assert_eq!(offsets, vec![100, 1100, 2100]);
    }

    #[test]
    fn defaults() {
        let timings = BotTimings::default();
        assert_eq!(timings.idle_after, time::Duration::days(30));
        assert!(timings.handoff_notice_delay < timings.stagger);
    }
}
