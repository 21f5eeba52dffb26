use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use async_trait::async_trait;
use hdesk_core::{ChannelName, Envelope, Timetoken};
use serde_json::Value;
use tokio::sync::{Mutex, broadcast};
use tracing::{debug, instrument};

use crate::{
    EVENT_BUFFER, InboundMessage, PresenceAction, PresenceEvent, StatusCategory, StatusEvent,
    Transport, TransportError, TransportEvent,
};

/// Process-local pub/sub network shared by any number of [`InMemoryTransport`]s.
///
/// Timetokens are assigned under one lock, so they are strictly increasing across the hub and
/// delivery order on a channel always matches timetoken order.
#[derive(Clone, Default)]
pub struct InMemoryHub {
    inner: Arc<Mutex<HubState>>,
}

#[derive(Default)]
struct HubState {
    last_timetoken: Timetoken,
    peers: HashMap<ChannelName, Peer>,
    states: HashMap<(ChannelName, ChannelName), Value>,
}

struct Peer {
    /// Subscribed channel -> presence enabled.
    subscriptions: HashMap<ChannelName, bool>,
    events: broadcast::Sender<TransportEvent>,
}

impl HubState {
    fn next_timetoken(&mut self) -> Timetoken {
        let candidate = Timetoken::now();
        let next = if candidate > self.last_timetoken {
            candidate
        } else {
            self.last_timetoken.next()
        };
        self.last_timetoken = next;
        next
    }

    fn occupancy(&self, channel: &ChannelName) -> usize {
        self.peers
            .values()
            .filter(|peer| peer.subscriptions.contains_key(channel))
            .count()
    }

    fn deliver_presence(&self, event: PresenceEvent) {
        for peer in self.peers.values() {
            if peer.subscriptions.get(&event.channel).copied() == Some(true) {
                let _ = peer.events.send(TransportEvent::Presence(event.clone()));
            }
        }
    }
}

impl InMemoryHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a transport bound to `uuid`. A second transport with the same uuid replaces the first.
    pub async fn transport(&self, uuid: ChannelName) -> InMemoryTransport {
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        let mut state = self.inner.lock().await;
        state.peers.insert(
            uuid.clone(),
            Peer {
                subscriptions: HashMap::new(),
                events: events.clone(),
            },
        );
        InMemoryTransport {
            hub: self.clone(),
            uuid,
            events,
            faults: Arc::new(Mutex::new(Faults::default())),
        }
    }

    /// Pushes a status event to the transport bound to `uuid`.
    pub async fn emit_status(&self, uuid: &ChannelName, status: StatusEvent) {
        let state = self.inner.lock().await;
        if let Some(peer) = state.peers.get(uuid) {
            let _ = peer.events.send(TransportEvent::Status(status));
        }
    }

    pub async fn occupancy(&self, channel: &ChannelName) -> usize {
        self.inner.lock().await.occupancy(channel)
    }
}

#[derive(Default)]
struct Faults {
    next_publishes: usize,
    channels: HashSet<ChannelName>,
}

impl Faults {
    fn take(&mut self, channel: &ChannelName) -> bool {
        if self.channels.contains(channel) {
            return true;
        }
        if self.next_publishes > 0 {
            self.next_publishes -= 1;
            return true;
        }
        false
    }
}

/// One participant's connection to an [`InMemoryHub`].
#[derive(Clone)]
pub struct InMemoryTransport {
    hub: InMemoryHub,
    uuid: ChannelName,
    events: broadcast::Sender<TransportEvent>,
    faults: Arc<Mutex<Faults>>,
}

impl InMemoryTransport {
    pub fn hub(&self) -> &InMemoryHub {
        &self.hub
    }

    /// The next `count` publishes fail.
    pub async fn fail_next_publishes(&self, count: usize) {
        self.faults.lock().await.next_publishes = count;
    }

    /// Every publish to `channel` fails until [`Self::clear_faults`].
    pub async fn fail_channel(&self, channel: ChannelName) {
        self.faults.lock().await.channels.insert(channel);
    }

    pub async fn clear_faults(&self) {
        *self.faults.lock().await = Faults::default();
    }
}

#[async_trait]
impl Transport for InMemoryTransport {
    fn uuid(&self) -> &ChannelName {
        &self.uuid
    }

    #[instrument(name = "bus.memory.publish", skip(self, channel, envelope), fields(uuid = %self.uuid, channel = %channel))]
    async fn publish(
        &self,
        channel: &ChannelName,
        envelope: &Envelope,
    ) -> Result<Timetoken, TransportError> {
        if self.faults.lock().await.take(channel) {
            let reason = "injected publish failure".to_string();
            let _ = self.events.send(TransportEvent::Status(StatusEvent::failure(
                StatusCategory::NetworkIssues,
                "publish",
                Some(channel.clone()),
                reason.clone(),
            )));
            return Err(TransportError::Publish {
                channel: channel.clone(),
                reason,
            });
        }

        let mut state = self.hub.inner.lock().await;
        let timetoken = state.next_timetoken();
        let message = InboundMessage {
            channel: channel.clone(),
            publisher: self.uuid.clone(),
            timetoken,
            envelope: envelope.clone().confirm(timetoken),
        };
        for peer in state.peers.values() {
            if peer.subscriptions.contains_key(channel) {
                let _ = peer.events.send(TransportEvent::Message(message.clone()));
            }
        }
        debug!(%timetoken, "published");
        Ok(timetoken)
    }

    async fn subscribe(
        &self,
        channels: &[ChannelName],
        with_presence: bool,
    ) -> Result<(), TransportError> {
        let mut state = self.hub.inner.lock().await;
        let mut added = Vec::new();
        if let Some(peer) = state.peers.get_mut(&self.uuid) {
            for channel in channels {
                if peer.subscriptions.contains_key(channel) {
                    continue;
                }
                peer.subscriptions.insert(channel.clone(), with_presence);
                added.push(channel.clone());
            }
        }
        if added.is_empty() {
            return Ok(());
        }
        for channel in &added {
            let occupancy = state.occupancy(channel);
            state.deliver_presence(PresenceEvent {
                action: PresenceAction::Join,
                channel: channel.clone(),
                uuid: self.uuid.clone(),
                occupancy: Some(occupancy),
                state: None,
            });
        }
        let _ = self
            .events
            .send(TransportEvent::Status(StatusEvent::connected(added)));
        Ok(())
    }

    async fn unsubscribe(&self, channels: &[ChannelName]) -> Result<(), TransportError> {
        let mut state = self.hub.inner.lock().await;
        let mut removed = Vec::new();
        if let Some(peer) = state.peers.get_mut(&self.uuid) {
            for channel in channels {
                if peer.subscriptions.remove(channel).is_some() {
                    removed.push(channel.clone());
                }
            }
        }
        for channel in removed {
            state.states.remove(&(channel.clone(), self.uuid.clone()));
            let occupancy = state.occupancy(&channel);
            state.deliver_presence(PresenceEvent {
                action: PresenceAction::Leave,
                channel,
                uuid: self.uuid.clone(),
                occupancy: Some(occupancy),
                state: None,
            });
        }
        Ok(())
    }

    async fn subscriptions(&self) -> Vec<ChannelName> {
        let state = self.hub.inner.lock().await;
        let mut channels: Vec<ChannelName> = state
            .peers
            .get(&self.uuid)
            .map(|peer| peer.subscriptions.keys().cloned().collect())
            .unwrap_or_default();
        channels.sort();
        channels
    }

    async fn set_state(&self, channel: &ChannelName, value: Value) -> Result<(), TransportError> {
        let mut state = self.hub.inner.lock().await;
        state
            .states
            .insert((channel.clone(), self.uuid.clone()), value.clone());
        let occupancy = state.occupancy(channel);
        state.deliver_presence(PresenceEvent {
            action: PresenceAction::StateChange,
            channel: channel.clone(),
            uuid: self.uuid.clone(),
            occupancy: Some(occupancy),
            state: Some(value),
        });
        Ok(())
    }

    async fn state(
        &self,
        channel: &ChannelName,
        uuid: &ChannelName,
    ) -> Result<Option<Value>, TransportError> {
        let state = self.hub.inner.lock().await;
        Ok(state.states.get(&(channel.clone(), uuid.clone())).cloned())
    }

    fn listen(&self) -> broadcast::Receiver<TransportEvent> {
        self.events.subscribe()
    }
}
