use std::time::Duration;

use anyhow::Result;
use hdesk_bus::{InMemoryHub, Transport, TransportEvent};
use hdesk_core::{ChannelName, MessageContent, RoomEvent, create_message};
use tracing::info;

const DEMO_ROOM: &str = "demo";

/// Questions the scripted client asks, with the FAQ blocks its quick replies point to.
const SCRIPT: &[(&str, &[&str])] = &[
    ("When are you open?", &["hours"]),
    ("I would like to talk to someone", &["person"]),
    ("Can I still change my study plan?", &[]),
];

/// Plays one client conversation against the bot on `hub` and logs what the room sees.
pub async fn run(hub: &InMemoryHub, faculty: &ChannelName, pace: Duration) -> Result<()> {
    let client = hub.transport(ChannelName::client("demo-student")).await;
    let room = ChannelName::room(DEMO_ROOM);
    let mut events = client.listen();
    client.subscribe(std::slice::from_ref(&room), true).await?;

    let me = client.uuid().clone();
    let printer = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            if let TransportEvent::Message(message) = event
                && message.publisher != me
            {
                info!(
                    from = %message.publisher,
                    timetoken = %message.timetoken,
                    content = ?message.envelope.content,
                    "room message"
                );
            }
        }
    });

    let opened = create_message(
        DEMO_ROOM,
        MessageContent::Event(RoomEvent::ConversationOpened),
        client.uuid().clone(),
    );
    client.publish(faculty, &opened).await?;
    tokio::time::sleep(pace * 2).await;

    for (text, blocks) in SCRIPT {
        info!(question = text, "client asks");
        let envelope = create_message(DEMO_ROOM, MessageContent::text(*text), client.uuid().clone())
            .with_go_to_blocks(blocks.iter().map(|b| b.to_string()).collect());
        client.publish(&room, &envelope).await?;
        tokio::time::sleep(pace).await;
    }

    printer.abort();
    Ok(())
}
