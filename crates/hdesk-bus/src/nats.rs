//! NATS-backed transport.
//!
//! Each chat channel maps onto one message subject and one presence subject. NATS does not
//! stamp messages, so the publishing side assigns the timetoken before sending.

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use dashmap::DashMap;
use futures::StreamExt;
use hdesk_core::{ChannelName, Envelope, Timetoken};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::{
    sync::{Mutex, broadcast},
    task::JoinHandle,
};
use tracing::{instrument, warn};

use crate::{
    EVENT_BUFFER, InboundMessage, PresenceAction, PresenceEvent, StatusCategory, StatusEvent,
    Transport, TransportError, TransportEvent, channel_subject, presence_subject,
};

#[derive(Debug, Serialize, Deserialize)]
struct PresenceWire {
    action: PresenceAction,
    uuid: ChannelName,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    state: Option<Value>,
}

struct Subscription {
    presence: bool,
    tasks: Vec<JoinHandle<()>>,
}

impl Subscription {
    fn new(presence: bool) -> Self {
        Self {
            presence,
            tasks: Vec::new(),
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

pub struct NatsTransport {
    client: async_nats::Client,
    uuid: ChannelName,
    prefix: String,
    events: broadcast::Sender<TransportEvent>,
    subscriptions: Mutex<HashMap<ChannelName, Subscription>>,
    last_timetoken: Mutex<Timetoken>,
    states: Arc<DashMap<(ChannelName, ChannelName), Value>>,
}

impl NatsTransport {
    pub fn new(client: async_nats::Client, uuid: ChannelName, prefix: impl Into<String>) -> Self {
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        Self {
            client,
            uuid,
            prefix: prefix.into(),
            events,
            subscriptions: Mutex::new(HashMap::new()),
            last_timetoken: Mutex::new(Timetoken::ZERO),
            states: Arc::new(DashMap::new()),
        }
    }

    pub async fn connect(
        url: &str,
        uuid: ChannelName,
        prefix: impl Into<String>,
    ) -> anyhow::Result<Self> {
        let client = async_nats::connect(url).await?;
        Ok(Self::new(client, uuid, prefix))
    }

    async fn next_timetoken(&self) -> Timetoken {
        let mut last = self.last_timetoken.lock().await;
        let candidate = Timetoken::now();
        *last = if candidate > *last {
            candidate
        } else {
            last.next()
        };
        *last
    }

    async fn publish_presence(
        &self,
        channel: &ChannelName,
        action: PresenceAction,
        state: Option<Value>,
    ) -> Result<(), TransportError> {
        let wire = PresenceWire {
            action,
            uuid: self.uuid.clone(),
            state,
        };
        let bytes = serde_json::to_vec(&wire)?;
        self.client
            .publish(presence_subject(&self.prefix, channel), bytes.into())
            .await
            .map_err(|err| TransportError::Publish {
                channel: channel.clone(),
                reason: err.to_string(),
            })
    }

    async fn spawn_messages(&self, channel: &ChannelName) -> Result<JoinHandle<()>, TransportError> {
        let mut subscriber = self
            .client
            .subscribe(channel_subject(&self.prefix, channel))
            .await
            .map_err(|err| TransportError::Subscribe {
                channel: channel.clone(),
                reason: err.to_string(),
            })?;
        let events = self.events.clone();
        let channel = channel.clone();
        Ok(tokio::spawn(async move {
            while let Some(msg) = subscriber.next().await {
                let event = match serde_json::from_slice::<Envelope>(&msg.payload) {
                    Ok(envelope) => match envelope.timetoken {
                        Some(timetoken) => TransportEvent::Message(InboundMessage {
                            channel: channel.clone(),
                            publisher: envelope.sender.clone(),
                            timetoken,
                            envelope,
                        }),
                        None => TransportEvent::Status(StatusEvent::failure(
                            StatusCategory::MalformedResponse,
                            "message",
                            Some(channel.clone()),
                            "message without timetoken",
                        )),
                    },
                    Err(err) => {
                        warn!(%channel, error = %err, "undecodable chat payload");
                        TransportEvent::Status(StatusEvent::failure(
                            StatusCategory::MalformedResponse,
                            "message",
                            Some(channel.clone()),
                            err.to_string(),
                        ))
                    }
                };
                let _ = events.send(event);
            }
        }))
    }

    async fn spawn_presence(&self, channel: &ChannelName) -> Result<JoinHandle<()>, TransportError> {
        let mut subscriber = self
            .client
            .subscribe(presence_subject(&self.prefix, channel))
            .await
            .map_err(|err| TransportError::Subscribe {
                channel: channel.clone(),
                reason: err.to_string(),
            })?;
        let events = self.events.clone();
        let states = self.states.clone();
        let channel = channel.clone();
        Ok(tokio::spawn(async move {
            while let Some(msg) = subscriber.next().await {
                let Ok(wire) = serde_json::from_slice::<PresenceWire>(&msg.payload) else {
                    warn!(%channel, "undecodable presence payload");
                    continue;
                };
                let key = (channel.clone(), wire.uuid.clone());
                match (&wire.action, &wire.state) {
                    (PresenceAction::StateChange, Some(state)) => {
                        states.insert(key, state.clone());
                    }
                    (PresenceAction::Leave | PresenceAction::Timeout, _) => {
                        states.remove(&key);
                    }
                    _ => {}
                }
                let _ = events.send(TransportEvent::Presence(PresenceEvent {
                    action: wire.action,
                    channel: channel.clone(),
                    uuid: wire.uuid,
                    occupancy: None,
                    state: wire.state,
                }));
            }
        }))
    }
}

#[async_trait]
impl Transport for NatsTransport {
    fn uuid(&self) -> &ChannelName {
        &self.uuid
    }

    #[instrument(name = "bus.nats.publish", skip(self, channel, envelope), fields(uuid = %self.uuid, channel = %channel))]
    async fn publish(
        &self,
        channel: &ChannelName,
        envelope: &Envelope,
    ) -> Result<Timetoken, TransportError> {
        let timetoken = self.next_timetoken().await;
        let stamped = envelope.clone().confirm(timetoken);
        let bytes = serde_json::to_vec(&stamped)?;
        self.client
            .publish(channel_subject(&self.prefix, channel), bytes.into())
            .await
            .map_err(|err| TransportError::Publish {
                channel: channel.clone(),
                reason: err.to_string(),
            })?;
        Ok(timetoken)
    }

    async fn subscribe(
        &self,
        channels: &[ChannelName],
        with_presence: bool,
    ) -> Result<(), TransportError> {
        let mut subscriptions = self.subscriptions.lock().await;
        let mut added = Vec::new();
        for channel in channels {
            if subscriptions.contains_key(channel) {
                continue;
            }
            // Dropped on any failure below, which aborts the readers spawned so far.
            let mut subscription = Subscription::new(with_presence);
            subscription.tasks.push(self.spawn_messages(channel).await?);
            if with_presence {
                subscription.tasks.push(self.spawn_presence(channel).await?);
            }
            self.publish_presence(channel, PresenceAction::Join, None)
                .await?;
            subscriptions.insert(channel.clone(), subscription);
            added.push(channel.clone());
        }
        if !added.is_empty() {
            let _ = self
                .events
                .send(TransportEvent::Status(StatusEvent::connected(added)));
        }
        Ok(())
    }

    async fn unsubscribe(&self, channels: &[ChannelName]) -> Result<(), TransportError> {
        let mut subscriptions = self.subscriptions.lock().await;
        for channel in channels {
            if let Some(subscription) = subscriptions.remove(channel) {
                if subscription.presence {
                    self.publish_presence(channel, PresenceAction::Leave, None)
                        .await?;
                }
            }
        }
        Ok(())
    }

    async fn subscriptions(&self) -> Vec<ChannelName> {
        let mut channels: Vec<ChannelName> =
            self.subscriptions.lock().await.keys().cloned().collect();
        channels.sort();
        channels
    }

    async fn set_state(&self, channel: &ChannelName, state: Value) -> Result<(), TransportError> {
        self.states
            .insert((channel.clone(), self.uuid.clone()), state.clone());
        self.publish_presence(channel, PresenceAction::StateChange, Some(state))
            .await
    }

    async fn state(
        &self,
        channel: &ChannelName,
        uuid: &ChannelName,
    ) -> Result<Option<Value>, TransportError> {
        Ok(self
            .states
            .get(&(channel.clone(), uuid.clone()))
            .map(|entry| entry.value().clone()))
    }

    fn listen(&self) -> broadcast::Receiver<TransportEvent> {
        self.events.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn dropping_a_staged_subscription_stops_its_readers() {
        let mut subscription = Subscription::new(true);
        subscription
            .tasks
            .push(tokio::spawn(std::future::pending::<()>()));
        let reader = subscription.tasks[0].abort_handle();

        drop(subscription);
        for _ in 0..10 {
            if reader.is_finished() {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert!(reader.is_finished());
    }
}
