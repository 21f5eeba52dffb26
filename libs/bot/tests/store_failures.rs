use std::{
    collections::HashSet,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use hdesk_bot::{BotAction, RoomDispatcher, handle_message};
use hdesk_bus::{InMemoryHub, InMemoryTransport, Transport};
use hdesk_core::{
    AppendOutcome, ChannelName, MessageContent, RoomEvent, StaticFaqCatalog, StaticTextBundle,
    Timetoken, create_message,
};
use hdesk_session::{
    BotSession, BotTimings, MemoryRoomStore, Room, RoomStore, SessionConfig, SessionDeps,
    SessionError,
};
use tokio::sync::Notify;

const FAQ: &str = r#"
blocks:
  - id: welcome
    data:
      - text: Hello, I am the faculty bot.
  - id: hours
    data:
      - text: We are open 9-17.
"#;

/// Memory store that can reject saves and hold back loads of chosen rooms.
#[derive(Default)]
struct UnreliableStore {
    inner: MemoryRoomStore,
    failing_saves: AtomicUsize,
    held_rooms: HashSet<String>,
    release: Notify,
}

#[async_trait::async_trait]
impl RoomStore for UnreliableStore {
    async fn load(&self, room_id: &str) -> anyhow::Result<Option<Room>> {
        if self.held_rooms.contains(room_id) {
            self.release.notified().await;
        }
        self.inner.load(room_id).await
    }

    async fn save(&self, room: &Room) -> anyhow::Result<()> {
        let fail = self
            .failing_saves
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if fail {
            anyhow::bail!("store offline");
        }
        self.inner.save(room).await
    }

    async fn delete(&self, room_id: &str) -> anyhow::Result<()> {
        self.inner.delete(room_id).await
    }
}

async fn deps(hub: &InMemoryHub, store: Arc<UnreliableStore>) -> SessionDeps {
    let bot = hub.transport(ChannelName::user("bot")).await;
    SessionDeps {
        transport: Arc::new(bot),
        store,
        faq: StaticFaqCatalog::from_yaml_str(FAQ).unwrap().shared(),
        texts: StaticTextBundle::new().shared(),
    }
}

fn config() -> SessionConfig {
    SessionConfig {
        language: "en".into(),
        faculty: Some(ChannelName::faculty("f1")),
        timings: BotTimings::default(),
    }
}

fn bot_texts(room: &Room) -> Vec<String> {
    room.history()
        .iter()
        .filter(|env| env.sender == ChannelName::user("bot"))
        .filter_map(|env| env.content.as_text().map(str::to_string))
        .collect()
}

#[tokio::test(start_paused = true)]
async fn redelivery_after_failed_save_is_answered() {
    let hub = InMemoryHub::new();
    let store = Arc::new(UnreliableStore::default());
    store.failing_saves.store(1, Ordering::SeqCst);
    let session = BotSession::open(deps(&hub, store).await, config(), "r1")
        .await
        .unwrap();
    let envelope = create_message("r1", MessageContent::text("hours?"), ChannelName::client("c1"))
        .with_go_to_blocks(vec!["hours".into()])
        .confirm(Timetoken::new(100));

    let err = handle_message(&session, envelope.clone()).await.unwrap_err();
    assert!(matches!(err, SessionError::Store(_)));

    let report = handle_message(&session, envelope).await.unwrap();
    assert_eq!(report.outcome, AppendOutcome::Inserted);
    assert_eq!(report.actions, vec![BotAction::SendBlock("hours".into())]);

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(bot_texts(&session.snapshot().await), vec!["We are open 9-17."]);
}

async fn open(client: &InMemoryTransport, room: &str) {
    let event = create_message(
        room,
        MessageContent::Event(RoomEvent::ConversationOpened),
        client.uuid().clone(),
    );
    client
        .publish(&ChannelName::faculty("f1"), &event)
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;
}

#[tokio::test(start_paused = true)]
async fn slow_room_load_does_not_hold_up_other_rooms() {
    let hub = InMemoryHub::new();
    let store = Arc::new(UnreliableStore {
        held_rooms: HashSet::from(["slow".to_string()]),
        ..Default::default()
    });
    let deps = deps(&hub, store.clone()).await;
    let events = deps.transport.listen();
    let dispatcher = RoomDispatcher::new(deps, config());
    dispatcher.join_lobby().await.unwrap();
    let run = tokio::spawn(Arc::clone(&dispatcher).run(events));
    let client = hub.transport(ChannelName::client("c1")).await;

    open(&client, "slow").await;
    open(&client, "fast").await;
    assert!(dispatcher.session("slow").is_none());

    let question = create_message("fast", MessageContent::text("hours?"), client.uuid().clone())
        .with_go_to_blocks(vec!["hours".into()]);
    client
        .publish(&ChannelName::room("fast"), &question)
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_secs(2)).await;

    let fast = dispatcher.session("fast").unwrap().snapshot().await;
    assert!(bot_texts(&fast).contains(&"We are open 9-17.".to_string()));
    assert!(dispatcher.session("slow").is_none());

    store.release.notify_one();
    tokio::time::sleep(Duration::from_secs(2)).await;
    let slow = dispatcher.session("slow").unwrap().snapshot().await;
    assert_eq!(bot_texts(&slow), vec!["Hello, I am the faculty bot."]);
    assert!(!run.is_finished());
}
