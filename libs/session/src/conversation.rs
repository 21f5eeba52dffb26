use std::{sync::Arc, time::Duration};

use hdesk_bus::SharedTransport;
use hdesk_core::{
    AppendOutcome, CHAT_NAMESPACE, ChannelName, Envelope, HANDOFF_NOTICE_KEY, MessageContent,
    RoomEvent, SharedFaqCatalog, SharedTextBundle, TemplateKind, Timetoken, create_message,
};
use tokio::{sync::Mutex, task::AbortHandle};
use tracing::{Instrument, debug, info, instrument, warn};

use crate::{BotState, BotTimings, Room, SendPlan, SessionError, SharedRoomStore};

/// Process-wide collaborators shared by every room session.
#[derive(Clone)]
pub struct SessionDeps {
    pub transport: SharedTransport,
    pub store: SharedRoomStore,
    pub faq: SharedFaqCatalog,
    pub texts: SharedTextBundle,
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Language used for bot-authored text lookups.
    pub language: String,
    /// Lobby channel that also receives the `stoppedFAQs` event.
    pub faculty: Option<ChannelName>,
    pub timings: BotTimings,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            language: "en".to_string(),
            faculty: None,
            timings: BotTimings::default(),
        }
    }
}

/// The bot's view of one room.
///
/// All room mutations go through this type; deferred sends hold an `Arc` to it and can be
/// aborted with [`BotSession::cancel_pending`].
pub struct BotSession {
    room_channel: ChannelName,
    publish_channels: Vec<ChannelName>,
    config: SessionConfig,
    deps: SessionDeps,
    room: Mutex<Room>,
    pending: Mutex<Vec<AbortHandle>>,
}

impl BotSession {
    /// Loads the room from the store, or starts a fresh one.
    pub async fn open(
        deps: SessionDeps,
        config: SessionConfig,
        room_id: &str,
    ) -> Result<Arc<Self>, SessionError> {
        let room = deps
            .store
            .load(room_id)
            .await
            .map_err(SessionError::Store)?
            .unwrap_or_else(|| Room::new(room_id));
        let room_channel = room.channel();
        let mut publish_channels = vec![room_channel.clone()];
        if let Some(faculty) = &config.faculty {
            publish_channels.push(faculty.clone());
        }
        debug!(room = room_id, history = room.history().len(), "session opened");
        Ok(Arc::new(Self {
            room_channel,
            publish_channels,
            config,
            deps,
            room: Mutex::new(room),
            pending: Mutex::new(Vec::new()),
        }))
    }

    pub fn room_id(&self) -> &str {
        self.room_channel.id()
    }

    pub fn room_channel(&self) -> &ChannelName {
        &self.room_channel
    }

    /// The bot's own UUID.
    pub fn bot(&self) -> &ChannelName {
        self.deps.transport.uuid()
    }

    pub fn publish_channels(&self) -> &[ChannelName] {
        &self.publish_channels
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub async fn snapshot(&self) -> Room {
        self.room.lock().await.clone()
    }

    /// Runs `f` against the current room without cloning it.
    pub async fn inspect<R>(&self, f: impl FnOnce(&Room) -> R) -> R {
        let room = self.room.lock().await;
        f(&room)
    }

    pub async fn state(&self) -> BotState {
        self.room.lock().await.state()
    }

    async fn persist(&self, room: &Room) -> Result<(), SessionError> {
        self.deps.store.save(room).await.map_err(SessionError::Store)
    }

    /// Applies `change` to a copy of the room and keeps it only once the store accepted it.
    async fn commit<R>(
        &self,
        change: impl FnOnce(&mut Room) -> Result<Option<R>, SessionError>,
    ) -> Result<Option<R>, SessionError> {
        let mut room = self.room.lock().await;
        let mut next = room.clone();
        let Some(result) = change(&mut next)? else {
            return Ok(None);
        };
        self.persist(&next).await?;
        *room = next;
        Ok(Some(result))
    }

    /// Appends a confirmed envelope to the room history. Re-deliveries are reported as
    /// [`AppendOutcome::Duplicate`] and leave the room untouched; nothing is kept in memory
    /// unless the store saved it, so a failed pass can be retried.
    pub async fn record(&self, envelope: Envelope) -> Result<AppendOutcome, SessionError> {
        if let Some((sender, timetoken)) = envelope.dedup_key() {
            if self.inspect(|room| room.history().contains(sender, timetoken)).await {
                return Ok(AppendOutcome::Duplicate);
            }
        }
        let outcome = self
            .commit(|room| match room.record(envelope)? {
                AppendOutcome::Duplicate => Ok(None),
                inserted => Ok(Some(inserted)),
            })
            .await?;
        Ok(outcome.unwrap_or(AppendOutcome::Duplicate))
    }

    /// Subscribes to the room channel with presence and remembers it on the room.
    pub async fn join(&self) -> Result<(), SessionError> {
        let channels = std::slice::from_ref(&self.room_channel);
        self.deps.transport.subscribe(channels, true).await?;
        self.note_subscribed(channels).await
    }

    pub async fn note_subscribed(&self, channels: &[ChannelName]) -> Result<(), SessionError> {
        self.commit(|room| Ok(room.add_channels(channels).then_some(())))
            .await?;
        Ok(())
    }

    /// Publishes one bot-authored message; room-channel messages are recorded once acknowledged.
    #[instrument(name = "session.send", skip(self, channel, content), fields(room = %self.room_id(), channel = %channel, kind = content.label()))]
    pub async fn send(
        &self,
        channel: &ChannelName,
        content: MessageContent,
    ) -> Result<Envelope, SessionError> {
        let envelope = create_message(self.room_id(), content, self.bot().clone());
        let timetoken = self.deps.transport.publish(channel, &envelope).await?;
        let confirmed = envelope.confirm(timetoken);
        if *channel == self.room_channel {
            self.record(confirmed.clone()).await?;
        }
        metrics::counter!("hdesk.bot.messages_sent", "kind" => confirmed.content.label())
            .increment(1);
        Ok(confirmed)
    }

    /// Runs every entry of `plan` as its own deferred task.
    pub async fn execute(self: &Arc<Self>, plan: SendPlan) {
        let mut pending = self.pending.lock().await;
        pending.retain(|handle| !handle.is_finished());
        for entry in plan {
            let session = Arc::clone(self);
            let task = tokio::spawn(async move {
                tokio::time::sleep(entry.offset).await;
                if let Err(err) = session.send(&entry.channel, entry.content).await {
                    warn!(room = %session.room_id(), error = %err, "scheduled send failed");
                    metrics::counter!("hdesk.bot.errors", "kind" => err.kind()).increment(1);
                }
            }
            .in_current_span());
            pending.push(task.abort_handle());
        }
    }

    /// Sends an FAQ block, one message per `stagger` step.
    pub async fn send_block(self: &Arc<Self>, block_id: &str) -> Result<SendPlan, SessionError> {
        let block = self.deps.faq.require(block_id)?;
        let plan = SendPlan::staggered(
            &self.room_channel,
            block.data.iter().cloned(),
            Duration::ZERO,
            self.config.timings.stagger,
        );
        debug!(room = %self.room_id(), block = block_id, messages = plan.len(), "sending faq block");
        self.execute(plan.clone()).await;
        Ok(plan)
    }

    /// Schedules the opening move after `opening_delay`.
    pub async fn start_conversation(self: &Arc<Self>) {
        let session = Arc::clone(self);
        let delay = self.config.timings.opening_delay;
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Err(err) = session.open_conversation().await {
                warn!(room = %session.room_id(), error = %err, "opening move failed");
                metrics::counter!("hdesk.bot.errors", "kind" => err.kind()).increment(1);
            }
        }
        .in_current_span());
        let mut pending = self.pending.lock().await;
        pending.retain(|handle| !handle.is_finished());
        pending.push(task.abort_handle());
    }

    /// Opening move without the delay: `welcome` for an empty room, `hi` for an idle one.
    pub async fn open_conversation(self: &Arc<Self>) -> Result<Option<SendPlan>, SessionError> {
        let block = self
            .room
            .lock()
            .await
            .opening_block_for(&self.config.timings);
        match block {
            Some(block_id) => {
                info!(room = %self.room_id(), block = block_id, "opening conversation");
                self.send_block(block_id).await.map(Some)
            }
            None => Ok(None),
        }
    }

    /// Hands the room to humans.
    ///
    /// The `stoppedFAQs` event goes to every publish channel first; only when all of them
    /// accepted it is the room marked and the notice scheduled.
    #[instrument(name = "session.stop_faqs", skip(self), fields(room = %self.room_id()))]
    pub async fn stop_faqs(self: &Arc<Self>) -> Result<Timetoken, SessionError> {
        if let BotState::HandedOff(at) = self.state().await {
            return Ok(at);
        }

        let event = create_message(
            self.room_id(),
            MessageContent::Event(RoomEvent::StoppedFaqs),
            self.bot().clone(),
        );
        let at = self
            .deps
            .transport
            .publish(&self.room_channel, &event)
            .await
            .map_err(SessionError::Handoff)?;
        for channel in self
            .publish_channels
            .iter()
            .filter(|channel| **channel != self.room_channel)
        {
            self.deps
                .transport
                .publish(channel, &event)
                .await
                .map_err(SessionError::Handoff)?;
        }

        let confirmed = event.confirm(at);
        self.commit(|room| {
            room.record(confirmed)?;
            room.mark_handed_off(at);
            Ok(Some(()))
        })
        .await?;
        metrics::counter!("hdesk.bot.handoffs").increment(1);
        info!(%at, "faqs stopped");

        let notice = self
            .deps
            .texts
            .text(&self.config.language, CHAT_NAMESPACE, HANDOFF_NOTICE_KEY);
        let mut plan = SendPlan::new();
        plan.push_at(
            self.config.timings.handoff_notice_delay,
            self.room_channel.clone(),
            MessageContent::Text(notice),
        );
        self.execute(plan).await;
        Ok(at)
    }

    pub async fn send_template(&self, kind: TemplateKind) -> Result<Envelope, SessionError> {
        debug!(room = %self.room_id(), template = %kind, "sending template");
        self.send(&self.room_channel, kind.content()).await
    }

    /// Deferred sends that have not completed yet.
    pub async fn pending_sends(&self) -> usize {
        self.pending
            .lock()
            .await
            .iter()
            .filter(|handle| !handle.is_finished())
            .count()
    }

    /// Aborts all deferred sends, e.g. when the room is torn down.
    pub async fn cancel_pending(&self) {
        let mut pending = self.pending.lock().await;
        for handle in pending.drain(..) {
            handle.abort();
        }
    }
}
