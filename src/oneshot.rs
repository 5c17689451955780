//! One-shot receivers for request/response semantics over the bus
//!
//! Both variants skip the background consumption loop and let the caller
//! await the queue directly. The explicit `start()` step is load-bearing:
//! it completes registration with the bus before the caller publishes the
//! triggering request, so the response cannot arrive before anyone
//! listens ("lost response").
//!
//! There is no built-in cancellation. A caller that needs a deadline must
//! wrap the wait in its own timeout and then unregister explicitly to
//! avoid leaking a subscription entry.

use crate::bus::Bus;
use crate::error::{HubError, Result};
use crate::event::Event;
use crate::receiver::ReceiverHandle;
use tokio::sync::mpsc;

/// Receiver that awaits exactly one response event
pub struct ResponseReceiver {
    handle: ReceiverHandle,
    rx: mpsc::UnboundedReceiver<Event>,
    bus: Bus,
}

impl ResponseReceiver {
    /// Create a response receiver for the given event kinds
    ///
    /// Does not register with the bus yet; call [`start`](Self::start)
    /// before publishing the triggering request.
    pub fn new(bus: &Bus, kinds: Vec<String>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            handle: ReceiverHandle::new(kinds, tx),
            rx,
            bus: bus.clone(),
        }
    }

    /// Register with the bus; returns once the registration is visible
    pub async fn start(&self) -> Result<()> {
        tracing::debug!(kinds = ?self.handle.kinds(), "Registering response receiver");
        self.bus.register(std::slice::from_ref(&self.handle)).await
    }

    /// Block until exactly one awaited event arrives
    ///
    /// With `auto_unregister` the receiver removes itself from the bus
    /// afterwards, which is what request/response callers want.
    pub async fn await_one(mut self, auto_unregister: bool) -> Result<Event> {
        tracing::debug!(kinds = ?self.handle.kinds(), "Waiting for response event");
        let event = self
            .rx
            .recv()
            .await
            .ok_or(HubError::ChannelClosed("response receiver"))?;
        if auto_unregister {
            self.bus.unregister_nowait(self.handle.id());
        }
        Ok(event)
    }
}

/// Streaming variant of [`ResponseReceiver`]
///
/// Keeps receiving until explicitly unregistered — suited to long-lived
/// consumers such as an outward push channel that unregisters on
/// transport disconnect.
pub struct TemporaryReceiver {
    handle: ReceiverHandle,
    rx: mpsc::UnboundedReceiver<Event>,
    bus: Bus,
}

impl TemporaryReceiver {
    /// Create a temporary receiver for the given event kinds
    pub fn new(bus: &Bus, kinds: Vec<String>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            handle: ReceiverHandle::new(kinds, tx),
            rx,
            bus: bus.clone(),
        }
    }

    /// Register with the bus; returns once the registration is visible
    pub async fn start(&self) -> Result<()> {
        tracing::debug!(kinds = ?self.handle.kinds(), "Registering temporary receiver");
        self.bus.register(std::slice::from_ref(&self.handle)).await
    }

    /// Receive the next awaited event
    pub async fn next(&mut self) -> Result<Event> {
        self.rx
            .recv()
            .await
            .ok_or(HubError::ChannelClosed("temporary receiver"))
    }

    /// Remove this receiver from the bus
    pub async fn unregister(self) -> Result<()> {
        tracing::debug!(kinds = ?self.handle.kinds(), "Unregistering temporary receiver");
        self.bus.unregister(&self.handle).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schedulable::SchedulableRegistry;
    use tokio::time::{timeout, Duration};

    #[tokio::test]
    async fn test_response_arrives_after_start() {
        let bus = Bus::new(SchedulableRegistry::new());
        let receiver = ResponseReceiver::new(&bus, vec!["answer".into()]);
        receiver.start().await.unwrap();

        // publishing immediately after start() must not lose the response
        bus.publish(Event::signal("answer"));

        let event = timeout(Duration::from_secs(1), receiver.await_one(true))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event.kind, "answer");
    }

    #[tokio::test]
    async fn test_await_one_auto_unregisters() {
        let bus = Bus::new(SchedulableRegistry::new());
        let receiver = ResponseReceiver::new(&bus, vec!["once".into()]);
        receiver.start().await.unwrap();

        bus.publish(Event::signal("once"));
        receiver.await_one(true).await.unwrap();

        // the unregister system event is processed in queue order; a
        // subsequent query observes the empty table
        let mut kinds = bus.registered_kinds().await.unwrap();
        while !kinds.is_empty() {
            tokio::task::yield_now().await;
            kinds = bus.registered_kinds().await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_temporary_receiver_streams_until_unregistered() {
        let bus = Bus::new(SchedulableRegistry::new());
        let mut receiver = TemporaryReceiver::new(&bus, vec![crate::event::PUSH_UPDATE_KIND.into()]);
        receiver.start().await.unwrap();

        for i in 0..3 {
            bus.publish(Event::push("spotify/playback", serde_json::json!({ "seq": i })));
        }

        for i in 0..3 {
            let event = timeout(Duration::from_secs(1), receiver.next())
                .await
                .unwrap()
                .unwrap();
            assert_eq!(event.payload["data"]["seq"], i);
        }

        receiver.unregister().await.unwrap();
        assert!(bus.registered_kinds().await.unwrap().is_empty());
    }
}
