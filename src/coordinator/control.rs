//! Download lifecycle control: download, cancel, resume.

use std::sync::atomic::Ordering;

use crate::store::ChangeSet;
use crate::types::{CollectionId, Item, ItemId, TransferRecord};

use super::DownloadCoordinator;
use super::worker::{Command, LiveTransfer, Worker};

impl DownloadCoordinator {
    /// Start downloading an item
    ///
    /// The item must resolve to a URL and an owning collection; otherwise the
    /// call is a silent no-op. Starting a download prunes the collection to
    /// members that already have a record, plus this item, and replaces any
    /// transfer still running for the same item.
    ///
    /// Returns immediately; progress and the outcome arrive as events.
    pub fn download(&self, item: &Item) {
        self.send(Command::Download(item.clone()));
    }

    /// Cancel the live transfer of an item
    ///
    /// No-op if the item has no URL or nothing is transferring it. The record
    /// becomes `canceled` once the session reports back, keeping a resume
    /// token when the session produced one.
    pub fn cancel(&self, item: &Item) {
        self.send(Command::Cancel(item.clone()));
    }

    /// Continue a canceled download from its resume token
    ///
    /// No-op if the item has no URL, no record or no resume token. The record
    /// gets the new transfer handle but keeps its status until the transfer
    /// reports an outcome.
    pub fn resume(&self, item: &Item) {
        self.send(Command::Resume(item.clone()));
    }

    fn send(&self, command: Command) {
        if !self.accepting.load(Ordering::SeqCst) {
            tracing::debug!("Coordinator is shutting down, command ignored");
            return;
        }
        if self.commands.send(command).is_err() {
            tracing::debug!("Coordinator worker stopped, command ignored");
        }
    }
}

impl Worker {
    pub(super) async fn start_download(&mut self, item: Item) {
        let Some((url, collection)) = item.source() else {
            tracing::debug!(item = %item.id, "Item has no URL or collection, download ignored");
            return;
        };
        let url = url.clone();

        // One live transfer per item: a repeated download replaces the old one,
        // whose cancel result only cleans up its partial data
        for previous in self.handles_for_item(&item.id) {
            if let Some(live) = self.live.get_mut(&previous) {
                live.replaced = true;
            }
            self.session.cancel(previous).await;
            tracing::debug!(item = %item.id, transfer_id = %previous, "Replaced running transfer");
        }
        self.discard_resume_data(&item.id).await;

        let transfer_id = self.session.start(&url).await;
        self.live
            .insert(transfer_id, LiveTransfer::new(item.id.clone(), url.clone()));

        let evictions = self.evictions(collection, &item.id).await;
        let changes = ChangeSet {
            records: vec![TransferRecord::started(
                item.id.clone(),
                transfer_id,
                url.clone(),
            )],
            memberships: vec![(collection, item.id.clone())],
            evictions,
        };
        self.persist(&changes).await;

        tracing::info!(
            item = %item.id,
            transfer_id = %transfer_id,
            url = %url,
            evicted = changes.evictions.len(),
            "Download started"
        );
    }

    /// Drop the partial data of an earlier canceled attempt before its record is overwritten
    async fn discard_resume_data(&self, item: &ItemId) {
        match self.store.fetch_record_for_item(item).await {
            Ok(Some(TransferRecord {
                resume_token: Some(token),
                ..
            })) => {
                tracing::debug!(item = %item, "Discarding resume data of earlier attempt");
                self.session.discard(&token).await;
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(
                    item = %item,
                    error = %e,
                    "Failed to read record, earlier resume data kept"
                );
            }
        }
    }

    /// Siblings in `collection` without a record, to be removed
    async fn evictions(
        &self,
        collection: CollectionId,
        target: &ItemId,
    ) -> Vec<(CollectionId, ItemId)> {
        let members = match self.store.collection_items(collection).await {
            Ok(members) => members,
            Err(e) => {
                tracing::error!(
                    collection = %collection,
                    error = %e,
                    "Failed to read collection, skipping eviction"
                );
                return Vec::new();
            }
        };

        let mut evictions = Vec::new();
        for member in members {
            if &member == target {
                continue;
            }
            match self.store.fetch_record_for_item(&member).await {
                Ok(Some(_)) => {}
                Ok(None) => {
                    tracing::debug!(
                        collection = %collection,
                        item = %member,
                        "Evicting item without download"
                    );
                    evictions.push((collection, member));
                }
                // Keep members we cannot classify
                Err(e) => {
                    tracing::warn!(item = %member, error = %e, "Failed to read record, item kept");
                }
            }
        }
        evictions
    }

    pub(super) async fn cancel_download(&mut self, item: Item) {
        let Some(url) = item.url.as_ref() else {
            tracing::debug!(item = %item.id, "Item has no URL, cancel ignored");
            return;
        };

        let handles: Vec<_> = self
            .live
            .iter()
            .filter(|(_, live)| !live.replaced && &live.url == url)
            .map(|(id, _)| *id)
            .collect();
        if handles.is_empty() {
            tracing::debug!(item = %item.id, url = %url, "No live transfer to cancel");
            return;
        }

        for id in handles {
            tracing::debug!(item = %item.id, transfer_id = %id, "Cancel requested");
            self.session.cancel(id).await;
        }
    }

    pub(super) async fn resume_download(&mut self, item: Item) {
        let Some(url) = item.url.clone() else {
            tracing::debug!(item = %item.id, "Item has no URL, resume ignored");
            return;
        };
        let mut record = match self.store.fetch_record_for_item(&item.id).await {
            Ok(Some(record)) => record,
            Ok(None) => {
                tracing::debug!(item = %item.id, "Item has no record, resume ignored");
                return;
            }
            Err(e) => {
                tracing::error!(
                    item = %item.id,
                    error = %e,
                    "Failed to read record, resume ignored"
                );
                return;
            }
        };
        let Some(token) = record.resume_token.clone() else {
            tracing::debug!(
                item = %item.id,
                status = %record.status,
                "Record has no resume token, resume ignored"
            );
            return;
        };
        if !self.handles_for_item(&item.id).is_empty() {
            tracing::debug!(item = %item.id, "Transfer already live, resume ignored");
            return;
        }

        let transfer_id = match self.session.resume(&token).await {
            Ok(id) => id,
            Err(e) => {
                tracing::warn!(item = %item.id, error = %e, "Session rejected resume token");
                return;
            }
        };
        self.live
            .insert(transfer_id, LiveTransfer::new(item.id.clone(), url.clone()));

        record.transfer_id = transfer_id;
        self.persist(&ChangeSet::record(record)).await;

        tracing::info!(
            item = %item.id,
            transfer_id = %transfer_id,
            url = %url,
            "Download resumed"
        );
    }
}
