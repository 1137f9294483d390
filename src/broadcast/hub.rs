//! Fan-out hub with one dispatch task and bounded subscriber queues

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};

use super::types::{Message, Payload, SubscriberId};
use crate::config::BroadcastConfig;
use crate::error::{Result, TradingError};
use crate::telemetry::{self, GaugeMetric};

enum Command {
    Register {
        capacity: usize,
        reply: oneshot::Sender<(SubscriberId, mpsc::Receiver<Arc<Message>>)>,
    },
    Unregister(SubscriberId),
    Publish(Arc<Message>),
    Count(oneshot::Sender<usize>),
}

/// A registered subscriber's end of the hub
///
/// The stream ends once the hub drops the subscriber, after any queued
/// messages have been received.
#[derive(Debug)]
pub struct Subscription {
    id: SubscriberId,
    receiver: mpsc::Receiver<Arc<Message>>,
}

impl Subscription {
    /// Id to pass to `BroadcastHub::unsubscribe`
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Next message, or `None` once the hub has dropped this subscriber
    pub async fn recv(&mut self) -> Option<Arc<Message>> {
        self.receiver.recv().await
    }

    /// Next message if one is already queued
    pub fn try_recv(&mut self) -> Option<Arc<Message>> {
        self.receiver.try_recv().ok()
    }
}

/// Handle to the broadcast hub
///
/// Cloning is cheap; the dispatch task stops when every handle is dropped.
#[derive(Debug, Clone)]
pub struct BroadcastHub {
    commands: mpsc::UnboundedSender<Command>,
    queue_depth: usize,
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Command::Register { capacity, .. } => write!(f, "Register({})", capacity),
            Command::Unregister(id) => write!(f, "Unregister({})", id),
            Command::Publish(msg) => write!(f, "Publish({})", msg.payload.kind()),
            Command::Count(_) => f.write_str("Count"),
        }
    }
}

impl BroadcastHub {
    /// Spawn the dispatch task; must be called inside a Tokio runtime
    pub fn new(queue_depth: usize) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(Self::dispatch(rx));
        Self {
            commands: tx,
            queue_depth: queue_depth.max(1),
        }
    }

    /// Create a hub from configuration
    pub fn from_config(config: &BroadcastConfig) -> Self {
        Self::new(config.queue_depth)
    }

    /// Register a subscriber with the configured queue depth
    pub async fn subscribe(&self) -> Result<Subscription> {
        self.subscribe_with_capacity(self.queue_depth).await
    }

    /// Register a subscriber with its own queue depth
    pub async fn subscribe_with_capacity(&self, capacity: usize) -> Result<Subscription> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Register {
            capacity: capacity.max(1),
            reply,
        })?;
        let (id, receiver) = rx.await.map_err(|_| Self::stopped())?;
        Ok(Subscription { id, receiver })
    }

    /// Remove a subscriber; unknown ids are ignored
    pub fn unsubscribe(&self, id: SubscriberId) {
        let _ = self.send(Command::Unregister(id));
    }

    /// Queue a payload for every subscriber without waiting
    ///
    /// Returns false when the dispatch task is gone.
    pub fn publish(&self, payload: Payload) -> bool {
        self.publish_message(Message::new(payload))
    }

    /// Queue a prebuilt message for every subscriber
    pub fn publish_message(&self, message: Message) -> bool {
        self.send(Command::Publish(Arc::new(message))).is_ok()
    }

    /// Number of registered subscribers
    pub async fn subscriber_count(&self) -> usize {
        let (reply, rx) = oneshot::channel();
        if self.send(Command::Count(reply)).is_err() {
            return 0;
        }
        rx.await.unwrap_or(0)
    }

    fn send(&self, command: Command) -> Result<()> {
        self.commands.send(command).map_err(|_| Self::stopped())
    }

    fn stopped() -> TradingError {
        TradingError::InvalidState("broadcast hub is stopped".into())
    }

    async fn dispatch(mut commands: mpsc::UnboundedReceiver<Command>) {
        let mut subscribers: HashMap<SubscriberId, mpsc::Sender<Arc<Message>>> = HashMap::new();
        let mut next_id: SubscriberId = 1;

        while let Some(command) = commands.recv().await {
            match command {
                Command::Register { capacity, reply } => {
                    let (tx, rx) = mpsc::channel(capacity);
                    let id = next_id;
                    next_id += 1;
                    if reply.send((id, rx)).is_ok() {
                        subscribers.insert(id, tx);
                        tracing::debug!(subscriber = id, capacity, "Subscriber registered");
                    }
                }
                Command::Unregister(id) => {
                    if subscribers.remove(&id).is_some() {
                        tracing::debug!(subscriber = id, "Subscriber unregistered");
                    }
                }
                Command::Publish(message) => {
                    let mut dropped = Vec::new();
                    for (id, tx) in &subscribers {
                        if let Err(e) = tx.try_send(Arc::clone(&message)) {
                            let reason = match e {
                                mpsc::error::TrySendError::Full(_) => "queue full",
                                mpsc::error::TrySendError::Closed(_) => "receiver closed",
                            };
                            tracing::warn!(subscriber = id, reason, "Dropping subscriber");
                            dropped.push(*id);
                        }
                    }
                    for id in dropped {
                        subscribers.remove(&id);
                        telemetry::record_subscriber_dropped();
                    }
                }
                Command::Count(reply) => {
                    let _ = reply.send(subscribers.len());
                }
            }
            telemetry::set_gauge(GaugeMetric::Subscribers, subscribers.len() as f64);
        }

        tracing::debug!("Broadcast hub stopped");
    }
}
