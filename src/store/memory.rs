//! In-memory record store

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

use super::{ChangeSet, RecordStore};
use crate::error::{Error, Result};
use crate::types::{CollectionId, ItemId, TransferId, TransferRecord, TransferStatus};

#[derive(Default)]
struct Inner {
    records: HashMap<ItemId, TransferRecord>,
    collections: HashMap<CollectionId, Vec<ItemId>>,
}

/// Record store kept in process memory
///
/// Useful for tests and for embedding without durable storage. Batches are
/// applied under one lock, which makes them atomic.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store whose collection already holds `items`, in order
    pub fn with_collection(
        collection: CollectionId,
        items: impl IntoIterator<Item = ItemId>,
    ) -> Self {
        let store = Self::default();
        if let Ok(mut inner) = store.inner.lock() {
            inner.collections.insert(collection, items.into_iter().collect());
        }
        store
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Inner>> {
        self.inner
            .lock()
            .map_err(|_| Error::Other("memory store lock poisoned".into()))
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn fetch_record(&self, transfer_id: TransferId) -> Result<Option<TransferRecord>> {
        let inner = self.lock()?;
        Ok(inner
            .records
            .values()
            .find(|r| r.transfer_id == transfer_id)
            .cloned())
    }

    async fn fetch_record_for_item(&self, item: &ItemId) -> Result<Option<TransferRecord>> {
        Ok(self.lock()?.records.get(item).cloned())
    }

    async fn records_with_status(&self, status: TransferStatus) -> Result<Vec<TransferRecord>> {
        let inner = self.lock()?;
        Ok(inner
            .records
            .values()
            .filter(|r| r.status == status)
            .cloned()
            .collect())
    }

    async fn collection_items(&self, collection: CollectionId) -> Result<Vec<ItemId>> {
        Ok(self
            .lock()?
            .collections
            .get(&collection)
            .cloned()
            .unwrap_or_default())
    }

    async fn save(&self, changes: &ChangeSet) -> Result<()> {
        changes.validate()?;

        let mut inner = self.lock()?;
        for (collection, item) in &changes.evictions {
            if let Some(members) = inner.collections.get_mut(collection) {
                members.retain(|m| m != item);
            }
            inner.records.remove(item);
        }
        for (collection, item) in &changes.memberships {
            let members = inner.collections.entry(*collection).or_default();
            if !members.contains(item) {
                members.push(item.clone());
            }
        }
        for record in &changes.records {
            inner.records.insert(record.item_id.clone(), record.clone());
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
