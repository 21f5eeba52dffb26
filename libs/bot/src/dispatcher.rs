use std::sync::{Arc, OnceLock};

use dashmap::DashMap;
use hdesk_bus::{StatusSeverity, TransportError, TransportEvent};
use hdesk_core::{ChannelName, Envelope, ParticipantKind, RoomEvent};
use hdesk_session::{BotSession, SessionConfig, SessionDeps, SessionError};
use thiserror::Error;
use tokio::{
    sync::{broadcast, mpsc},
    task::JoinHandle,
};
use tracing::{Instrument, debug, error, info, info_span, warn};

use crate::handle_message;

#[derive(Debug, Error)]
pub enum DispatchError {
    /// The transport reported a status the bot cannot continue after.
    #[error("fatal transport status")]
    Fatal(#[from] TransportError),
}

enum RoomCommand {
    Start,
    Inbound(Envelope),
}

struct RoomWorker {
    commands: mpsc::UnboundedSender<RoomCommand>,
    session: Arc<OnceLock<Arc<BotSession>>>,
    task: JoinHandle<()>,
}

/// Routes transport events to one sequential worker per room.
///
/// Messages of a room are handled in delivery order; rooms never wait on each other. Loading
/// a room and joining its channel happen on the room's worker, so routing never blocks on the
/// store or the transport.
pub struct RoomDispatcher {
    deps: SessionDeps,
    config: SessionConfig,
    workers: DashMap<String, RoomWorker>,
}

impl RoomDispatcher {
    pub fn new(deps: SessionDeps, config: SessionConfig) -> Arc<Self> {
        Arc::new(Self {
            deps,
            config,
            workers: DashMap::new(),
        })
    }

    /// Subscribes the bot to its faculty lobby, where new conversations are announced.
    pub async fn join_lobby(&self) -> Result<(), TransportError> {
        if let Some(faculty) = &self.config.faculty {
            self.deps
                .transport
                .subscribe(std::slice::from_ref(faculty), true)
                .await?;
            info!(lobby = %faculty, "joined faculty lobby");
        }
        Ok(())
    }

    /// Consumes transport events until the transport closes or reports a fatal status.
    pub async fn run(
        self: Arc<Self>,
        mut events: broadcast::Receiver<TransportEvent>,
    ) -> Result<(), DispatchError> {
        loop {
            match events.recv().await {
                Ok(event) => self.dispatch(event)?,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "dispatcher lagged behind transport events");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    info!("transport closed; dispatcher stopping");
                    return Ok(());
                }
            }
        }
    }

    /// Handles a single transport event.
    pub fn dispatch(&self, event: TransportEvent) -> Result<(), DispatchError> {
        match event {
            TransportEvent::Message(message) => {
                let channel = message.channel;
                match channel.kind() {
                    ParticipantKind::Room => {
                        self.route(channel.id(), RoomCommand::Inbound(message.envelope));
                    }
                    ParticipantKind::Faculty if self.is_lobby(&channel) => {
                        if message.envelope.content.as_event()
                            == Some(RoomEvent::ConversationOpened)
                        {
                            self.open_room(&message.envelope.room_id);
                        }
                    }
                    _ => debug!(%channel, "ignoring message"),
                }
            }
            TransportEvent::Presence(presence) => {
                debug!(
                    channel = %presence.channel,
                    uuid = %presence.uuid,
                    action = ?presence.action,
                    occupancy = ?presence.occupancy,
                    "presence"
                );
            }
            TransportEvent::Status(status) => match status.severity() {
                StatusSeverity::Fatal => {
                    error!(category = ?status.category, message = ?status.message, "fatal transport status");
                    status.into_result()?;
                }
                StatusSeverity::Reported => {
                    warn!(
                        category = ?status.category,
                        operation = ?status.operation,
                        message = ?status.message,
                        "transport reported an error"
                    );
                }
                StatusSeverity::Healthy => debug!(category = ?status.category, "transport status"),
            },
        }
        Ok(())
    }

    fn is_lobby(&self, channel: &ChannelName) -> bool {
        self.config.faculty.as_ref() == Some(channel)
    }

    /// Joins a newly opened room and schedules the bot's opening move.
    pub fn open_room(&self, room_id: &str) {
        self.route(room_id, RoomCommand::Start);
    }

    /// Cancels deferred sends, stops the worker and leaves the room channel.
    pub async fn close_room(&self, room_id: &str) -> Result<(), TransportError> {
        if let Some((_, worker)) = self.workers.remove(room_id) {
            worker.task.abort();
            if let Some(session) = worker.session.get() {
                session.cancel_pending().await;
            }
        }
        self.deps
            .transport
            .unsubscribe(&[ChannelName::room(room_id)])
            .await?;
        info!(room = room_id, "room closed");
        Ok(())
    }

    /// The room's session, once its worker has loaded it.
    pub fn session(&self, room_id: &str) -> Option<Arc<BotSession>> {
        self.workers
            .get(room_id)
            .and_then(|worker| worker.session.get().cloned())
    }

    pub fn rooms(&self) -> Vec<String> {
        let mut rooms: Vec<String> = self.workers.iter().map(|w| w.key().clone()).collect();
        rooms.sort();
        rooms
    }

    fn route(&self, room_id: &str, mut command: RoomCommand) {
        for _ in 0..2 {
            let sent = {
                let worker = self.workers.entry(room_id.to_string()).or_insert_with(|| {
                    spawn_worker(self.deps.clone(), self.config.clone(), room_id.to_string())
                });
                worker.commands.send(command)
            };
            match sent {
                Ok(()) => return,
                Err(mpsc::error::SendError(returned)) => {
                    // The worker stopped after failing to load the room; start a fresh one.
                    self.workers.remove(room_id);
                    command = returned;
                }
            }
        }
        warn!(room = room_id, "room worker is gone; dropping command");
    }
}

impl Drop for RoomDispatcher {
    fn drop(&mut self) {
        for worker in self.workers.iter() {
            worker.task.abort();
        }
    }
}

fn spawn_worker(deps: SessionDeps, config: SessionConfig, room_id: String) -> RoomWorker {
    let (commands, mut inbox) = mpsc::unbounded_channel();
    let span = info_span!("room", room = %room_id);
    let slot = Arc::new(OnceLock::new());
    let worker_slot = Arc::clone(&slot);
    let task = tokio::spawn(
        async move {
            let session = match BotSession::open(deps, config, &room_id).await {
                Ok(session) => session,
                Err(err) => {
                    error!(error = %err, "could not open room session");
                    record_error(&err);
                    return;
                }
            };
            let _ = worker_slot.set(Arc::clone(&session));
            while let Some(command) = inbox.recv().await {
                match command {
                    RoomCommand::Start => {
                        if let Err(err) = session.join().await {
                            warn!(error = %err, "joining room failed");
                            record_error(&err);
                            continue;
                        }
                        session.start_conversation().await;
                    }
                    RoomCommand::Inbound(envelope) => {
                        if let Err(err) = handle_message(&session, envelope).await {
                            error!(kind = err.kind(), error = %err, "handling pass failed");
                            record_error(&err);
                        }
                    }
                }
            }
        }
        .instrument(span),
    );
    RoomWorker {
        commands,
        session: slot,
        task,
    }
}

fn record_error(err: &SessionError) {
    metrics::counter!("hdesk.bot.errors", "kind" => err.kind()).increment(1);
}
