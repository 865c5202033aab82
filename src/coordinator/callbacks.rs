//! Session callback handling: progress and terminal outcomes.

use std::path::PathBuf;

use crate::error::TransferError;
use crate::session::SessionEvent;
use crate::store::ChangeSet;
use crate::types::{Event, ResumeToken, TransferId, TransferRecord, TransferStatus};

use super::worker::{LiveTransfer, Worker};

/// Fraction of `expected` covered by `received`, if the size is known
fn fraction(received: u64, expected: Option<u64>) -> Option<f32> {
    let expected = expected.filter(|e| *e > 0)?;
    Some((received as f32 / expected as f32).min(1.0))
}

impl Worker {
    pub(super) async fn on_progress(
        &mut self,
        id: TransferId,
        bytes_written: u64,
        bytes_expected: Option<u64>,
    ) {
        let Some(live) = self.live.get_mut(&id) else {
            tracing::debug!(transfer_id = %id, "Progress for unknown transfer ignored");
            return;
        };
        let Some(progress) = fraction(bytes_written, bytes_expected) else {
            return;
        };
        // Per-handle progress only moves forward
        if progress < live.progress {
            return;
        }
        live.progress = progress;
        self.events.publish(Event::ProgressUpdated {
            url: live.url.clone(),
            progress,
        });

        let Some(step) = self.persist_step else {
            return;
        };
        if progress - live.persisted < step {
            return;
        }
        live.persisted = progress;
        let live = live.clone();

        let mut record = self.record_for(id, &live).await;
        record.progress = progress;
        self.persist(&ChangeSet::record(record)).await;
    }

    pub(super) async fn on_completed(&mut self, id: TransferId, path: PathBuf, bytes: u64) {
        let Some(live) = self.live.remove(&id) else {
            tracing::debug!(transfer_id = %id, "Completion for unknown transfer ignored");
            return;
        };

        let mut record = self.record_for(id, &live).await;
        record.status = TransferStatus::Succeeded;
        record.progress = 1.0;
        record.resume_token = None;
        record.downloaded_at = Some(chrono::Utc::now());
        record.size_bytes = Some(bytes);
        record.storage_path = Some(path.clone());
        self.persist(&ChangeSet::record(record)).await;

        tracing::info!(
            item = %live.item_id,
            transfer_id = %id,
            path = %path.display(),
            bytes,
            "Download completed"
        );
        self.events.publish(Event::DownloadCompleted { url: live.url });
    }

    pub(super) async fn on_canceled(
        &mut self,
        id: TransferId,
        resume_token: Option<ResumeToken>,
        bytes_received: u64,
        bytes_expected: Option<u64>,
    ) {
        let Some(live) = self.live.remove(&id) else {
            tracing::debug!(transfer_id = %id, "Cancel result for unknown transfer ignored");
            return;
        };

        let resumable = resume_token.is_some();
        let mut record = self.record_for(id, &live).await;
        record.status = TransferStatus::Canceled;
        record.resume_token = resume_token;
        if let Some(progress) = fraction(bytes_received, bytes_expected) {
            record.progress = progress;
        }
        self.persist(&ChangeSet::record(record)).await;

        tracing::info!(
            item = %live.item_id,
            transfer_id = %id,
            bytes_received,
            resumable,
            "Download canceled"
        );
        self.events.publish(Event::DownloadCanceled {
            url: live.url,
            resumable,
        });
    }

    pub(super) async fn on_failed(&mut self, id: TransferId, error: TransferError) {
        let Some(live) = self.live.remove(&id) else {
            tracing::debug!(transfer_id = %id, "Failure for unknown transfer ignored");
            return;
        };

        let mut record = self.record_for(id, &live).await;
        record.status = TransferStatus::Failed;
        record.resume_token = None;
        self.persist(&ChangeSet::record(record)).await;

        tracing::warn!(
            item = %live.item_id,
            transfer_id = %id,
            url = %live.url,
            error = %error,
            "Download failed"
        );
        self.events.publish(Event::DownloadFailed { url: live.url });
    }

    /// Result of a transfer superseded by a newer download of the same item
    ///
    /// The record already belongs to the newer transfer. Only resume data the
    /// old transfer left behind is cleaned up.
    pub(super) async fn on_replaced_event(&mut self, event: SessionEvent) {
        if !event.is_terminal() {
            return;
        }
        self.live.remove(&event.id());

        if let SessionEvent::Canceled {
            id,
            resume_token: Some(token),
            ..
        } = event
        {
            tracing::debug!(transfer_id = %id, "Discarding resume data of replaced transfer");
            self.session.discard(&token).await;
        }
    }

    /// Stored record of a live handle, rebuilt from the correlation entry if missing
    ///
    /// A miss means an earlier write for this transfer was rejected; the
    /// rebuilt record is written back by the caller.
    async fn record_for(&self, id: TransferId, live: &LiveTransfer) -> TransferRecord {
        match self.store.fetch_record(id).await {
            Ok(Some(record)) => return record,
            Ok(None) => {
                tracing::warn!(
                    item = %live.item_id,
                    transfer_id = %id,
                    "Record missing for live transfer, reconciling"
                );
            }
            Err(e) => {
                tracing::error!(
                    transfer_id = %id,
                    error = %e,
                    "Failed to read record, reconciling"
                );
            }
        }

        let mut record = TransferRecord::started(live.item_id.clone(), id, live.url.clone());
        record.progress = live.persisted.max(live.progress).min(1.0);
        record
    }
}
