//! Transfer record persistence seam
//!
//! The coordinator never talks to a database directly. It reads and writes
//! [`TransferRecord`]s and collection membership through the [`RecordStore`]
//! trait, so the same orchestration runs against SQLite in production and an
//! in-memory map in tests.
//!
//! - [`Database`](crate::db::Database) implements the trait on top of SQLite
//! - [`MemoryStore`] keeps everything in process memory

use async_trait::async_trait;

use crate::error::{Result, ValidationError};
use crate::types::{CollectionId, ItemId, TransferId, TransferRecord, TransferStatus};

mod memory;
mod sqlite;

pub use memory::MemoryStore;

/// Batch of writes applied in one transaction
///
/// Records are upserted by item id, memberships are inserted at the end of the
/// collection when absent, evictions remove an item (and its record) from a
/// collection.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ChangeSet {
    /// Records to insert or replace
    pub records: Vec<TransferRecord>,
    /// `(collection, item)` pairs that must be members after the write
    pub memberships: Vec<(CollectionId, ItemId)>,
    /// `(collection, item)` pairs to remove
    pub evictions: Vec<(CollectionId, ItemId)>,
}

impl ChangeSet {
    /// Batch holding a single record upsert
    pub fn record(record: TransferRecord) -> Self {
        Self {
            records: vec![record],
            ..Default::default()
        }
    }

    /// Whether the batch writes nothing
    pub fn is_empty(&self) -> bool {
        self.records.is_empty() && self.memberships.is_empty() && self.evictions.is_empty()
    }

    /// Validate every record and reject duplicate items
    pub fn validate(&self) -> std::result::Result<(), ValidationError> {
        let mut seen = std::collections::HashSet::new();
        for record in &self.records {
            record.validate()?;
            if !seen.insert(&record.item_id) {
                return Err(ValidationError::DuplicateItem {
                    item: record.item_id.clone(),
                });
            }
        }
        Ok(())
    }
}

/// Persistence collaborator used by the coordinator
///
/// `save` is transactional over the batch: either every change in the
/// [`ChangeSet`] is applied or none is. A batch failing
/// [`ChangeSet::validate`] is rejected with
/// [`Error::Validation`](crate::Error::Validation) before anything is written.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Record whose last transfer handle is `transfer_id`
    async fn fetch_record(&self, transfer_id: TransferId) -> Result<Option<TransferRecord>>;

    /// Record of an item
    async fn fetch_record_for_item(&self, item: &ItemId) -> Result<Option<TransferRecord>>;

    /// All records with the given status
    async fn records_with_status(&self, status: TransferStatus) -> Result<Vec<TransferRecord>>;

    /// Members of a collection, in collection order
    async fn collection_items(&self, collection: CollectionId) -> Result<Vec<ItemId>>;

    /// Apply a batch of changes atomically
    async fn save(&self, changes: &ChangeSet) -> Result<()>;

    /// Human-readable name for logging
    fn name(&self) -> &'static str;
}
