//! Typed publish/subscribe channel between the coordinator and observers.
//!
//! Delivery follows `tokio::sync::broadcast` semantics: every subscriber gets
//! every event published after it subscribed, there is no replay for late
//! subscribers, and a subscriber that falls more than the buffer size behind
//! skips the events it missed.

use futures::StreamExt;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;

use crate::types::{Event, EventKind};

/// Broadcast bus for [`Event`]s
#[derive(Clone, Debug)]
pub struct EventBus {
    tx: broadcast::Sender<Event>,
}

impl EventBus {
    /// Create a bus buffering up to `capacity` events per subscriber
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Publish an event (fire and forget)
    ///
    /// Sending with no subscribers is not an error; the event is dropped.
    pub fn publish(&self, event: Event) {
        self.tx.send(event).ok();
    }

    /// Receive every event published from now on
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }

    /// Invoke `handler` for each event of `kind` published from now on
    ///
    /// The handler runs on its own task and stops when the bus is dropped.
    pub fn subscribe_kind<F>(&self, kind: EventKind, mut handler: F) -> tokio::task::JoinHandle<()>
    where
        F: FnMut(Event) + Send + 'static,
    {
        let mut stream = BroadcastStream::new(self.tx.subscribe());
        tokio::spawn(async move {
            while let Some(item) = stream.next().await {
                match item {
                    Ok(event) if event.kind() == kind => handler(event),
                    Ok(_) => {}
                    Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                        tracing::warn!(?kind, skipped, "Event subscriber lagged, events skipped");
                    }
                }
            }
        })
    }

    /// Number of live subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}
