//! Central event distribution bus
//!
//! The [`Bus`] is itself a receiver: a cloneable handle in front of a
//! single distributor task that owns the subscription table. All mutation
//! of the table happens on that task, so no locking is needed — system
//! messages (register/unregister) travel through the same queue as
//! ordinary events and are consumed by the bus instead of forwarded.

use crate::error::{HubError, Result};
use crate::event::Event;
use crate::receiver::ReceiverHandle;
use crate::schedulable::SchedulableRegistry;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

/// Privileged messages consumed by the bus itself, never forwarded
pub(crate) enum SystemMessage {
    /// Add a receiver to the table under every kind it subscribes to
    Register {
        receiver: ReceiverHandle,
        ack: Option<oneshot::Sender<()>>,
    },
    /// Remove a receiver from every bucket it appears in
    Unregister {
        id: Uuid,
        ack: Option<oneshot::Sender<()>>,
    },
}

enum BusMessage {
    Publish(Event),
    System(SystemMessage),
    RegisteredKinds(oneshot::Sender<Vec<String>>),
}

/// Cloneable handle to the event distribution bus
#[derive(Clone)]
pub struct Bus {
    tx: mpsc::UnboundedSender<BusMessage>,
    registry: Arc<SchedulableRegistry>,
}

impl Bus {
    /// Create a bus and start its distributor task
    pub fn new(registry: SchedulableRegistry) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(distribute(rx));
        Self {
            tx,
            registry: Arc::new(registry),
        }
    }

    /// Publish an event into the bus
    ///
    /// Never blocks. An event whose kind has no subscribers is logged and
    /// dropped by the distributor — a valid, silent no-op.
    pub fn publish(&self, event: Event) {
        if self.tx.send(BusMessage::Publish(event)).is_err() {
            tracing::warn!("Bus is gone; event dropped");
        }
    }

    /// Register receivers for every kind they subscribe to
    ///
    /// Registering the same receiver twice is legal and yields duplicate
    /// forwarding. Completion of this call means the registration is
    /// visible to subsequently published events.
    pub async fn register(&self, receivers: &[ReceiverHandle]) -> Result<()> {
        for receiver in receivers {
            let (ack, done) = oneshot::channel();
            self.send_system(SystemMessage::Register {
                receiver: receiver.clone(),
                ack: Some(ack),
            })?;
            done.await.map_err(|_| HubError::ChannelClosed("bus"))?;
        }
        Ok(())
    }

    /// Remove a receiver from every bucket it appears in
    pub async fn unregister(&self, receiver: &ReceiverHandle) -> Result<()> {
        let (ack, done) = oneshot::channel();
        self.send_system(SystemMessage::Unregister {
            id: receiver.id(),
            ack: Some(ack),
        })?;
        done.await.map_err(|_| HubError::ChannelClosed("bus"))
    }

    /// Fire-and-forget unregistration (used by one-shot receivers)
    pub(crate) fn unregister_nowait(&self, id: Uuid) {
        let _ = self.send_system(SystemMessage::Unregister { id, ack: None });
    }

    pub(crate) fn send_system(&self, msg: SystemMessage) -> Result<()> {
        self.tx
            .send(BusMessage::System(msg))
            .map_err(|_| HubError::ChannelClosed("bus"))
    }

    /// All event kinds that currently have at least one subscriber
    pub async fn registered_kinds(&self) -> Result<Vec<String>> {
        let (reply, answer) = oneshot::channel();
        self.tx
            .send(BusMessage::RegisteredKinds(reply))
            .map_err(|_| HubError::ChannelClosed("bus"))?;
        answer.await.map_err(|_| HubError::ChannelClosed("bus"))
    }

    /// Map a generic JSON payload to a registered schedulable event
    ///
    /// Probes every currently registered kind that has a codec; see
    /// [`SchedulableRegistry::resolve`]. A failed resolution is a client
    /// error for the caller to reject, never a bus failure.
    pub async fn resolve_schedulable(&self, payload: &serde_json::Value) -> Result<Event> {
        let kinds = self.registered_kinds().await?;
        self.registry.resolve(&kinds, payload)
    }

    /// The schedulable codec registry this bus was built with
    pub fn registry(&self) -> &SchedulableRegistry {
        &self.registry
    }
}

/// Distributor loop; exclusive owner of the subscription table
async fn distribute(mut rx: mpsc::UnboundedReceiver<BusMessage>) {
    let mut table: HashMap<String, Vec<ReceiverHandle>> = HashMap::new();

    while let Some(msg) = rx.recv().await {
        match msg {
            BusMessage::Publish(event) => match table.get(&event.kind) {
                Some(subscribers) => {
                    tracing::debug!(
                        kind = %event.kind,
                        receivers = subscribers.len(),
                        "Forwarding event"
                    );
                    for subscriber in subscribers {
                        subscriber.enqueue(event.clone());
                    }
                }
                None => {
                    tracing::warn!(kind = %event.kind, "No receivers registered for event");
                }
            },
            BusMessage::System(SystemMessage::Register { receiver, ack }) => {
                for kind in receiver.kinds() {
                    tracing::debug!(kind = %kind, receiver = %receiver.id(), "Registering receiver");
                    table.entry(kind.clone()).or_default().push(receiver.clone());
                }
                if let Some(ack) = ack {
                    let _ = ack.send(());
                }
            }
            BusMessage::System(SystemMessage::Unregister { id, ack }) => {
                // drop buckets that become empty so registered-kinds
                // enumeration stays accurate for schedulable resolution
                table.retain(|kind, subscribers| {
                    let before = subscribers.len();
                    subscribers.retain(|s| s.id() != id);
                    if subscribers.len() != before {
                        tracing::debug!(kind = %kind, receiver = %id, "Unregistering receiver");
                    }
                    !subscribers.is_empty()
                });
                if let Some(ack) = ack {
                    let _ = ack.send(());
                }
            }
            BusMessage::RegisteredKinds(reply) => {
                let _ = reply.send(table.keys().cloned().collect());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::receiver::{spawn, EventReceiver};
    use crate::schedulable::SchedulableCodec;
    use async_trait::async_trait;
    use tokio::time::{timeout, Duration};

    struct Forwarder {
        kinds: Vec<String>,
        out: mpsc::UnboundedSender<Event>,
    }

    #[async_trait]
    impl EventReceiver for Forwarder {
        fn subscriptions(&self) -> Vec<String> {
            self.kinds.clone()
        }

        async fn handle(&self, event: Event) -> Result<()> {
            let _ = self.out.send(event);
            Ok(())
        }
    }

    fn forwarder(kinds: &[&str]) -> (ReceiverHandle, mpsc::UnboundedReceiver<Event>) {
        let (out, rx) = mpsc::unbounded_channel();
        let handle = spawn(Arc::new(Forwarder {
            kinds: kinds.iter().map(|s| s.to_string()).collect(),
            out,
        }));
        (handle, rx)
    }

    #[tokio::test]
    async fn test_publish_reaches_subscriber() {
        let bus = Bus::new(SchedulableRegistry::new());
        let (handle, mut rx) = forwarder(&["ping"]);
        bus.register(&[handle]).await.unwrap();

        bus.publish(Event::signal("ping"));

        let event = timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event.kind, "ping");
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_is_noop() {
        let bus = Bus::new(SchedulableRegistry::new());
        bus.publish(Event::signal("nobody.listens"));
        assert!(bus.registered_kinds().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_registered_kinds_lists_subscribed() {
        let bus = Bus::new(SchedulableRegistry::new());
        let (handle, _rx) = forwarder(&["a", "b"]);
        bus.register(&[handle]).await.unwrap();

        let mut kinds = bus.registered_kinds().await.unwrap();
        kinds.sort();
        assert_eq!(kinds, vec!["a".to_string(), "b".to_string()]);
    }

    #[tokio::test]
    async fn test_unregister_drops_empty_buckets() {
        let bus = Bus::new(SchedulableRegistry::new());
        let (handle, _rx) = forwarder(&["a", "b"]);
        bus.register(&[handle.clone()]).await.unwrap();
        bus.unregister(&handle).await.unwrap();

        assert!(bus.registered_kinds().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_registration_duplicates_delivery() {
        let bus = Bus::new(SchedulableRegistry::new());
        let (handle, mut rx) = forwarder(&["dup"]);
        bus.register(&[handle.clone(), handle]).await.unwrap();

        bus.publish(Event::signal("dup"));

        for _ in 0..2 {
            let event = timeout(Duration::from_secs(1), rx.recv())
                .await
                .unwrap()
                .unwrap();
            assert_eq!(event.kind, "dup");
        }
    }

    #[tokio::test]
    async fn test_resolve_schedulable_uses_registered_kinds() {
        let registry = SchedulableRegistry::new().with(SchedulableCodec::simple("R"));
        let bus = Bus::new(registry);

        let payload = serde_json::json!({ crate::event::EVENT_ID_FIELD: "R" });

        // codec exists but the kind is not registered on the bus yet
        assert!(bus.resolve_schedulable(&payload).await.is_err());

        let (handle, _rx) = forwarder(&["R"]);
        bus.register(&[handle]).await.unwrap();

        let event = bus.resolve_schedulable(&payload).await.unwrap();
        assert_eq!(event.kind, "R");
    }
}
