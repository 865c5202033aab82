//! Serialized worker task owning the handle correlation table.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use url::Url;

use crate::error::Error;
use crate::events::EventBus;
use crate::session::{SessionEvent, TransferSession};
use crate::store::{ChangeSet, RecordStore};
use crate::types::{Item, ItemId, TransferId};

/// Request from the public API to the worker
pub(crate) enum Command {
    Download(Item),
    Cancel(Item),
    Resume(Item),
    /// Report how many interrupted records were restored
    Restore(oneshot::Sender<usize>),
    /// Acknowledge once everything queued before it is processed
    Flush(oneshot::Sender<()>),
    /// Cancel live transfers, wait for their results, then stop
    Shutdown {
        timeout: Duration,
        done: oneshot::Sender<()>,
    },
}

/// Correlation entry for a transfer handle this process started
#[derive(Debug, Clone)]
pub(crate) struct LiveTransfer {
    pub(crate) item_id: ItemId,
    pub(crate) url: Url,
    /// Last progress fraction published for this handle
    pub(crate) progress: f32,
    /// Last progress fraction written to the store
    pub(crate) persisted: f32,
    /// Superseded by a newer download of the same item, awaiting its cancel result
    pub(crate) replaced: bool,
}

impl LiveTransfer {
    pub(crate) fn new(item_id: ItemId, url: Url) -> Self {
        Self {
            item_id,
            url,
            progress: 0.0,
            persisted: 0.0,
            replaced: false,
        }
    }
}

/// State owned by the worker task
pub(crate) struct Worker {
    pub(crate) session: Arc<dyn TransferSession>,
    pub(crate) store: Arc<dyn RecordStore>,
    pub(crate) events: EventBus,
    /// Persist progress when it advanced by at least this fraction
    pub(crate) persist_step: Option<f32>,
    /// Live transfer handle -> item and URL; entries leave on terminal callbacks
    pub(crate) live: HashMap<TransferId, LiveTransfer>,
}

impl Worker {
    pub(crate) fn new(
        session: Arc<dyn TransferSession>,
        store: Arc<dyn RecordStore>,
        events: EventBus,
        persist_step: Option<f32>,
    ) -> Self {
        Self {
            session,
            store,
            events,
            persist_step,
            live: HashMap::new(),
        }
    }

    /// Process commands and session callbacks one at a time until shutdown
    pub(crate) async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut session_events: mpsc::UnboundedReceiver<SessionEvent>,
    ) {
        loop {
            tokio::select! {
                biased;
                Some(event) = session_events.recv() => self.handle_session_event(event).await,
                command = commands.recv() => match command {
                    Some(Command::Flush(ack)) => {
                        self.drain(&mut session_events).await;
                        ack.send(()).ok();
                    }
                    Some(Command::Shutdown { timeout, done }) => {
                        self.stop_live_transfers(&mut session_events, timeout).await;
                        done.send(()).ok();
                        break;
                    }
                    Some(command) => self.handle_command(command).await,
                    None => break,
                },
            }
        }

        tracing::debug!(live = self.live.len(), "Coordinator worker stopped");
    }

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::Download(item) => self.start_download(item).await,
            Command::Cancel(item) => self.cancel_download(item).await,
            Command::Resume(item) => self.resume_download(item).await,
            Command::Restore(reply) => {
                let restored = self.restore_interrupted().await;
                reply.send(restored).ok();
            }
            // Handled by the run loop
            Command::Flush(ack) => {
                ack.send(()).ok();
            }
            Command::Shutdown { done, .. } => {
                done.send(()).ok();
            }
        }
    }

    pub(crate) async fn handle_session_event(&mut self, event: SessionEvent) {
        if self.live.get(&event.id()).is_some_and(|live| live.replaced) {
            self.on_replaced_event(event).await;
            return;
        }

        match event {
            SessionEvent::Progress {
                id,
                bytes_written,
                bytes_expected,
            } => self.on_progress(id, bytes_written, bytes_expected).await,
            SessionEvent::Completed { id, path, bytes } => self.on_completed(id, path, bytes).await,
            SessionEvent::Canceled {
                id,
                resume_token,
                bytes_received,
                bytes_expected,
            } => {
                self.on_canceled(id, resume_token, bytes_received, bytes_expected)
                    .await
            }
            SessionEvent::Failed { id, error } => self.on_failed(id, error).await,
        }
    }

    /// Process session events that were already delivered
    async fn drain(&mut self, session_events: &mut mpsc::UnboundedReceiver<SessionEvent>) {
        while let Ok(event) = session_events.try_recv() {
            self.handle_session_event(event).await;
        }
    }

    /// Live handles belonging to an item, not counting replaced ones
    pub(crate) fn handles_for_item(&self, item: &ItemId) -> Vec<TransferId> {
        self.live
            .iter()
            .filter(|(_, live)| !live.replaced && &live.item_id == item)
            .map(|(id, _)| *id)
            .collect()
    }

    /// Write a batch, logging instead of propagating failures
    ///
    /// Returns whether the batch was written. A failed write leaves in-flight
    /// transfers untouched; terminal callbacks rebuild the missing record.
    pub(crate) async fn persist(&self, changes: &ChangeSet) -> bool {
        match self.store.save(changes).await {
            Ok(()) => true,
            Err(Error::Validation(e)) => {
                tracing::error!(error = %e, "Record validation failed, changes not persisted");
                false
            }
            Err(e) => {
                tracing::error!(
                    store = self.store.name(),
                    error = %e,
                    "Failed to persist transfer records"
                );
                false
            }
        }
    }
}
