//! NATS subject helpers.
//!
//! A channel maps onto `<prefix>.msg.<kind>.<id>` for chat messages and
//! `<prefix>.pnpres.<kind>.<id>` for presence. The id becomes a single subject token, so
//! distinct channel names always land on distinct subjects.

use std::borrow::Cow;

use hdesk_core::ChannelName;

/// Percent-encodes an id into one subject token. `.` is escaped as well since it separates
/// tokens; the empty id becomes a bare `%`, which no encoded id can produce.
fn token(id: &str) -> Cow<'_, str> {
    if id.is_empty() {
        return Cow::Borrowed("%");
    }
    let encoded = urlencoding::encode(id);
    if encoded.contains('.') {
        Cow::Owned(encoded.replace('.', "%2E"))
    } else {
        encoded
    }
}

/// ```
/// use hdesk_bus::channel_subject;
/// use hdesk_core::ChannelName;
///
/// assert_eq!(
///     channel_subject("hdesk", &ChannelName::room("a.b 1")),
///     "hdesk.msg.room.a%2Eb%201"
/// );
/// ```
pub fn channel_subject(prefix: &str, channel: &ChannelName) -> String {
    format!("{}.msg.{}.{}", prefix, channel.kind(), token(channel.id()))
}

pub fn presence_subject(prefix: &str, channel: &ChannelName) -> String {
    format!("{}.pnpres.{}.{}", prefix, channel.kind(), token(channel.id()))
}
