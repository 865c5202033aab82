//! SQLite-backed record store

use async_trait::async_trait;

use super::{ChangeSet, RecordStore};
use crate::db::Database;
use crate::error::Result;
use crate::types::{CollectionId, ItemId, TransferId, TransferRecord, TransferStatus};

#[async_trait]
impl RecordStore for Database {
    async fn fetch_record(&self, transfer_id: TransferId) -> Result<Option<TransferRecord>> {
        self.get_record_by_transfer(transfer_id).await
    }

    async fn fetch_record_for_item(&self, item: &ItemId) -> Result<Option<TransferRecord>> {
        self.get_record_for_item(item).await
    }

    async fn records_with_status(&self, status: TransferStatus) -> Result<Vec<TransferRecord>> {
        self.list_records_by_status(status).await
    }

    async fn collection_items(&self, collection: CollectionId) -> Result<Vec<ItemId>> {
        self.list_collection_items(collection).await
    }

    async fn save(&self, changes: &ChangeSet) -> Result<()> {
        self.apply_changes(changes).await
    }

    fn name(&self) -> &'static str {
        "sqlite"
    }
}
