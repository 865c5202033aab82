//! Startup restore and shutdown coordination.

use std::sync::atomic::Ordering;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

use crate::error::{Error, Result};
use crate::session::SessionEvent;
use crate::store::ChangeSet;
use crate::types::{Event, TransferRecord, TransferStatus};

use super::DownloadCoordinator;
use super::worker::{Command, Worker};

impl DownloadCoordinator {
    /// Settle records left behind by transfers of a previous process
    ///
    /// Their transfers no longer exist. Each `downloading` record becomes
    /// `canceled` with a resume token when the session can salvage the partial
    /// data, and `failed` otherwise. A `canceled` record whose resumed transfer
    /// died mid-stream gets a token for the data that transfer wrote. Returns
    /// the number of records updated.
    ///
    /// [`open`](Self::open) runs this automatically.
    pub async fn restore(&self) -> usize {
        let (reply_tx, reply_rx) = oneshot::channel();
        if self.commands.send(Command::Restore(reply_tx)).is_err() {
            return 0;
        }
        reply_rx.await.unwrap_or(0)
    }

    /// Gracefully shut down the coordinator
    ///
    /// This method performs a graceful shutdown sequence:
    /// 1. Stops accepting commands
    /// 2. Cancels every live transfer
    /// 3. Waits up to `shutdown_timeout` for their cancel results, so resume
    ///    tokens reach the store
    /// 4. Stops the worker task
    /// 5. Emits [`Event::Shutdown`] and marks a clean shutdown in the database
    ///
    /// # Errors
    ///
    /// Returns [`Error::ShuttingDown`] if shutdown was already requested.
    pub async fn shutdown(&self) -> Result<()> {
        if !self.accepting.swap(false, Ordering::SeqCst) {
            return Err(Error::ShuttingDown);
        }
        tracing::info!("Initiating graceful shutdown");

        let (done_tx, done_rx) = oneshot::channel();
        let command = Command::Shutdown {
            timeout: self.config.coordinator.shutdown_timeout,
            done: done_tx,
        };
        if self.commands.send(command).is_ok() {
            done_rx.await.ok();
        }

        if let Some(handle) = self.worker.lock().await.take()
            && let Err(e) = handle.await
        {
            tracing::error!(error = %e, "Coordinator worker panicked");
        }

        self.events.publish(Event::Shutdown);

        if let Some(db) = &self.db {
            if let Err(e) = db.set_clean_shutdown().await {
                tracing::error!(error = %e, "Failed to mark clean shutdown in database");
            } else {
                tracing::info!("Marked clean shutdown in database");
            }
        }

        tracing::info!("Shutdown complete");
        Ok(())
    }
}

impl Worker {
    /// Settle records whose transfer died with a previous process
    ///
    /// Records still `downloading` become `canceled` with a salvaged token or
    /// `failed`. A `canceled` record can also belong to a resumed transfer that
    /// died mid-stream after moving the partial data to its own handle; its
    /// token is replaced by one salvaged from that handle.
    pub(super) async fn restore_interrupted(&mut self) -> usize {
        let mut changes = ChangeSet::default();
        self.settle_downloading(&mut changes).await;
        self.refresh_resume_tokens(&mut changes).await;

        let count = changes.records.len();
        if count > 0 && self.persist(&changes).await {
            tracing::info!(count, "Restored interrupted transfers");
        }
        count
    }

    async fn settle_downloading(&self, changes: &mut ChangeSet) {
        for mut record in self.stale_records(TransferStatus::Downloading).await {
            match self
                .session
                .salvage(record.transfer_id, &record.source_url, None)
                .await
            {
                Some(token) => {
                    tracing::info!(
                        item = %record.item_id,
                        "Interrupted transfer salvaged, resumable"
                    );
                    record.status = TransferStatus::Canceled;
                    record.resume_token = Some(token);
                }
                None => {
                    tracing::info!(item = %record.item_id, "Interrupted transfer marked failed");
                    record.status = TransferStatus::Failed;
                    record.resume_token = None;
                }
            }
            changes.records.push(record);
        }
    }

    async fn refresh_resume_tokens(&self, changes: &mut ChangeSet) {
        for mut record in self.stale_records(TransferStatus::Canceled).await {
            let Some(previous) = record.resume_token.clone() else {
                continue;
            };
            let salvaged = self
                .session
                .salvage(record.transfer_id, &record.source_url, Some(&previous))
                .await;
            // No partial data under the handle: the token still points at it
            if let Some(token) = salvaged
                && token != previous
            {
                tracing::info!(
                    item = %record.item_id,
                    transfer_id = %record.transfer_id,
                    "Interrupted resume salvaged, resume token replaced"
                );
                record.resume_token = Some(token);
                changes.records.push(record);
            }
        }
    }

    /// Records with `status` whose transfer was not started by this process
    async fn stale_records(&self, status: TransferStatus) -> Vec<TransferRecord> {
        match self.store.records_with_status(status).await {
            Ok(records) => records
                .into_iter()
                .filter(|record| !self.live.contains_key(&record.transfer_id))
                .collect(),
            Err(e) => {
                tracing::error!(%status, error = %e, "Failed to load records for restore");
                Vec::new()
            }
        }
    }

    /// Cancel every live transfer and process results until none is left or time runs out
    pub(super) async fn stop_live_transfers(
        &mut self,
        session_events: &mut mpsc::UnboundedReceiver<SessionEvent>,
        timeout: Duration,
    ) {
        let ids: Vec<_> = self.live.keys().copied().collect();
        for id in &ids {
            self.session.cancel(*id).await;
        }
        tracing::info!(count = ids.len(), "Canceled live transfers");

        let deadline = tokio::time::Instant::now() + timeout;
        while !self.live.is_empty() {
            match tokio::time::timeout_at(deadline, session_events.recv()).await {
                Ok(Some(event)) => self.handle_session_event(event).await,
                Ok(None) => break,
                Err(_) => {
                    tracing::warn!(
                        remaining = self.live.len(),
                        "Timeout waiting for transfers to stop, proceeding with shutdown"
                    );
                    break;
                }
            }
        }
    }
}
