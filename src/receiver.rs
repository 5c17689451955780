//! Receiver actors — the unit of concurrency
//!
//! A receiver is a handler behind a private unbounded queue with a
//! background consumption loop. Constructing one via [`spawn`] starts the
//! loop immediately; there is no separate start step.

use crate::error::Result;
use crate::event::Event;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};
use uuid::Uuid;

/// Core trait for components that consume events from the bus
#[async_trait]
pub trait EventReceiver: Send + Sync + 'static {
    /// The event kinds this receiver wants to be registered for
    fn subscriptions(&self) -> Vec<String>;

    /// Handle one event from the queue
    ///
    /// Failures are logged by the consumption loop and never propagate
    /// back into the bus.
    async fn handle(&self, event: Event) -> Result<()>;
}

/// The bus-facing side of a receiver: identity, subscribed kinds, and
/// the sending half of its private queue
///
/// Cloning the handle does not clone the receiver; all clones feed the
/// same queue.
#[derive(Debug, Clone)]
pub struct ReceiverHandle {
    id: Uuid,
    kinds: Vec<String>,
    tx: mpsc::UnboundedSender<Event>,
}

impl ReceiverHandle {
    pub(crate) fn new(kinds: Vec<String>, tx: mpsc::UnboundedSender<Event>) -> Self {
        Self {
            id: Uuid::new_v4(),
            kinds,
            tx,
        }
    }

    /// Unique identity of this receiver (used for unregistration)
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Event kinds this receiver subscribes to
    pub fn kinds(&self) -> &[String] {
        &self.kinds
    }

    /// Append an event to the receiver's queue; never blocks the caller
    pub fn enqueue(&self, event: Event) {
        if self.tx.send(event).is_err() {
            tracing::warn!(receiver = %self.id, "Receiver queue is gone; event dropped");
        }
    }
}

/// Spawn a receiver with a single worker (strict per-receiver ordering)
pub fn spawn(handler: Arc<dyn EventReceiver>) -> ReceiverHandle {
    spawn_with_workers(handler, 1)
}

/// Spawn a receiver with a bounded worker pool
///
/// With `workers == 1` events are handled one at a time in enqueue order.
/// With more workers a slow handler cannot stall the queue, but completion
/// order between concurrently handled events is no longer guaranteed.
pub fn spawn_with_workers(handler: Arc<dyn EventReceiver>, workers: usize) -> ReceiverHandle {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let handle = ReceiverHandle::new(handler.subscriptions(), tx);
    let workers = workers.max(1);
    let pool = Arc::new(Semaphore::new(workers));

    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            if workers == 1 {
                dispatch(handler.as_ref(), event).await;
            } else {
                let Ok(permit) = pool.clone().acquire_owned().await else {
                    break;
                };
                let handler = handler.clone();
                tokio::spawn(async move {
                    dispatch(handler.as_ref(), event).await;
                    drop(permit);
                });
            }
        }
    });

    handle
}

async fn dispatch(handler: &dyn EventReceiver, event: Event) {
    let kind = event.kind.clone();
    if let Err(e) = handler.handle(event).await {
        tracing::warn!(kind = %kind, error = %e, "Event handler failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tokio::time::{sleep, timeout, Duration};

    struct Recorder {
        kinds: Vec<String>,
        seen: Mutex<Vec<String>>,
        done: mpsc::UnboundedSender<()>,
    }

    #[async_trait]
    impl EventReceiver for Recorder {
        fn subscriptions(&self) -> Vec<String> {
            self.kinds.clone()
        }

        async fn handle(&self, event: Event) -> Result<()> {
            self.seen.lock().unwrap().push(event.kind);
            let _ = self.done.send(());
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_spawn_consumes_in_enqueue_order() {
        let (done, mut done_rx) = mpsc::unbounded_channel();
        let recorder = Arc::new(Recorder {
            kinds: vec!["a".into()],
            seen: Mutex::new(Vec::new()),
            done,
        });
        let handle = spawn(recorder.clone());

        for kind in ["one", "two", "three"] {
            handle.enqueue(Event::signal(kind));
        }
        for _ in 0..3 {
            timeout(Duration::from_secs(1), done_rx.recv())
                .await
                .unwrap();
        }

        let seen = recorder.seen.lock().unwrap().clone();
        assert_eq!(seen, vec!["one", "two", "three"]);
    }

    #[tokio::test]
    async fn test_handle_exposes_subscriptions() {
        let (done, _done_rx) = mpsc::unbounded_channel();
        let recorder = Arc::new(Recorder {
            kinds: vec!["x".into(), "y".into()],
            seen: Mutex::new(Vec::new()),
            done,
        });
        let handle = spawn(recorder);
        assert_eq!(handle.kinds(), ["x".to_string(), "y".to_string()]);
    }

    struct SlowFirst {
        done: mpsc::UnboundedSender<String>,
    }

    #[async_trait]
    impl EventReceiver for SlowFirst {
        fn subscriptions(&self) -> Vec<String> {
            vec!["s".into()]
        }

        async fn handle(&self, event: Event) -> Result<()> {
            if event.kind == "slow" {
                sleep(Duration::from_millis(100)).await;
            }
            let _ = self.done.send(event.kind);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_worker_pool_does_not_stall_queue() {
        let (done, mut done_rx) = mpsc::unbounded_channel();
        let handle = spawn_with_workers(Arc::new(SlowFirst { done }), 2);

        handle.enqueue(Event::signal("slow"));
        handle.enqueue(Event::signal("fast"));

        // the fast event completes first even though it was enqueued second
        let first = timeout(Duration::from_secs(1), done_rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(first, "fast");
    }
}
