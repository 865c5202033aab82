//! Core types for podcast-dl

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use url::Url;

use crate::error::ValidationError;

/// Stable identifier of a downloadable item (an episode guid)
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(pub String);

impl ItemId {
    /// Create a new ItemId
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the inner string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ItemId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for ItemId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for ItemId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of the collection (podcast) that owns items
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct CollectionId(pub i64);

impl CollectionId {
    /// Get the inner i64 value
    pub fn get(&self) -> i64 {
        self.0
    }
}

impl From<i64> for CollectionId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for CollectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque handle of a live transfer
///
/// Random v4 UUIDs, so a handle issued after a restart can never match a
/// historical record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransferId(pub uuid::Uuid);

impl TransferId {
    /// Generate a fresh handle
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for TransferId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TransferId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for TransferId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(uuid::Uuid::parse_str(s)?))
    }
}

/// Opaque resumable-state blob produced by a transfer session
///
/// Stored and returned byte-for-byte; only the session that produced it
/// knows how to read it.
#[derive(Clone, PartialEq, Eq)]
pub struct ResumeToken(Vec<u8>);

impl ResumeToken {
    /// Wrap raw bytes
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// Borrow the raw bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl From<Vec<u8>> for ResumeToken {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

impl std::fmt::Debug for ResumeToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ResumeToken({} bytes)", self.0.len())
    }
}

/// Transfer status
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferStatus {
    /// Transfer is in flight
    Downloading,
    /// Canceled by the user (possibly resumable)
    Canceled,
    /// Transfer failed
    Failed,
    /// File downloaded and stored
    Succeeded,
}

impl TransferStatus {
    /// Convert integer status code to TransferStatus
    pub fn from_i32(status: i32) -> Self {
        match status {
            0 => TransferStatus::Downloading,
            1 => TransferStatus::Canceled,
            2 => TransferStatus::Failed,
            3 => TransferStatus::Succeeded,
            _ => TransferStatus::Failed, // Unknown codes surface as failures
        }
    }

    /// Convert TransferStatus to integer status code
    pub fn to_i32(&self) -> i32 {
        match self {
            TransferStatus::Downloading => 0,
            TransferStatus::Canceled => 1,
            TransferStatus::Failed => 2,
            TransferStatus::Succeeded => 3,
        }
    }
}

impl std::fmt::Display for TransferStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TransferStatus::Downloading => "downloading",
            TransferStatus::Canceled => "canceled",
            TransferStatus::Failed => "failed",
            TransferStatus::Succeeded => "succeeded",
        };
        f.write_str(s)
    }
}

/// The "item to fetch" descriptor handed to the coordinator
///
/// Either field may be missing; operations on such items are silent no-ops.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Item {
    /// Stable item id
    pub id: ItemId,
    /// Enclosure URL
    pub url: Option<Url>,
    /// Owning collection
    pub collection: Option<CollectionId>,
}

impl Item {
    /// Create an item with neither URL nor collection
    pub fn new(id: impl Into<ItemId>) -> Self {
        Self {
            id: id.into(),
            url: None,
            collection: None,
        }
    }

    /// Set the enclosure URL
    pub fn with_url(mut self, url: Url) -> Self {
        self.url = Some(url);
        self
    }

    /// Set the owning collection
    pub fn in_collection(mut self, collection: CollectionId) -> Self {
        self.collection = Some(collection);
        self
    }

    /// Resolve to `(url, collection)` if both are present
    pub fn source(&self) -> Option<(&Url, CollectionId)> {
        Some((self.url.as_ref()?, self.collection?))
    }
}

/// Durable status record of one item's download attempt
#[derive(Clone, Debug, PartialEq)]
pub struct TransferRecord {
    /// Item this record belongs to (one record per item)
    pub item_id: ItemId,
    /// Handle of the transfer that last touched this record
    pub transfer_id: TransferId,
    /// URL being fetched
    pub source_url: Url,
    /// Current status
    pub status: TransferStatus,
    /// Fraction downloaded (0.0 to 1.0)
    pub progress: f32,
    /// Resumable state, present only for canceled transfers that produced one
    pub resume_token: Option<ResumeToken>,
    /// When the file landed (succeeded only)
    pub downloaded_at: Option<DateTime<Utc>>,
    /// Size of the stored file
    pub size_bytes: Option<u64>,
    /// Where the file was stored (succeeded only)
    pub storage_path: Option<PathBuf>,
}

impl TransferRecord {
    /// Fresh record for a transfer that just started
    pub fn started(item_id: ItemId, transfer_id: TransferId, source_url: Url) -> Self {
        Self {
            item_id,
            transfer_id,
            source_url,
            status: TransferStatus::Downloading,
            progress: 0.0,
            resume_token: None,
            downloaded_at: None,
            size_bytes: None,
            storage_path: None,
        }
    }

    /// Check the record invariants a store enforces before writing
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.item_id.as_str().is_empty() {
            return Err(ValidationError::EmptyItemId);
        }
        if !(0.0..=1.0).contains(&self.progress) {
            return Err(ValidationError::ProgressOutOfRange {
                item: self.item_id.clone(),
                progress: self.progress,
            });
        }
        if self.resume_token.is_some() && self.status != TransferStatus::Canceled {
            return Err(ValidationError::ResumeTokenWithoutCancel {
                item: self.item_id.clone(),
                status: self.status,
            });
        }
        if self.status == TransferStatus::Succeeded {
            if self.storage_path.is_none() {
                return Err(ValidationError::IncompleteSuccess {
                    item: self.item_id.clone(),
                    field: "storage_path",
                });
            }
            if self.downloaded_at.is_none() {
                return Err(ValidationError::IncompleteSuccess {
                    item: self.item_id.clone(),
                    field: "downloaded_at",
                });
            }
        }
        Ok(())
    }
}

/// Event published to subscribers
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// Byte progress of a transfer changed
    ProgressUpdated {
        /// Source URL of the transfer
        url: Url,
        /// Fraction downloaded (0.0 to 1.0)
        progress: f32,
    },

    /// Download finished and was stored
    DownloadCompleted {
        /// Source URL of the transfer
        url: Url,
    },

    /// Download failed
    DownloadFailed {
        /// Source URL of the transfer
        url: Url,
    },

    /// Download was canceled
    DownloadCanceled {
        /// Source URL of the transfer
        url: Url,
        /// Whether a resume token was kept
        resumable: bool,
    },

    /// Coordinator shut down
    Shutdown,
}

/// Discriminant of [`Event`] used for filtered subscriptions
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// [`Event::ProgressUpdated`]
    ProgressUpdated,
    /// [`Event::DownloadCompleted`]
    DownloadCompleted,
    /// [`Event::DownloadFailed`]
    DownloadFailed,
    /// [`Event::DownloadCanceled`]
    DownloadCanceled,
    /// [`Event::Shutdown`]
    Shutdown,
}

impl Event {
    /// Kind of this event
    pub fn kind(&self) -> EventKind {
        match self {
            Event::ProgressUpdated { .. } => EventKind::ProgressUpdated,
            Event::DownloadCompleted { .. } => EventKind::DownloadCompleted,
            Event::DownloadFailed { .. } => EventKind::DownloadFailed,
            Event::DownloadCanceled { .. } => EventKind::DownloadCanceled,
            Event::Shutdown => EventKind::Shutdown,
        }
    }

    /// Source URL the event is keyed by, if any
    pub fn url(&self) -> Option<&Url> {
        match self {
            Event::ProgressUpdated { url, .. }
            | Event::DownloadCompleted { url }
            | Event::DownloadFailed { url }
            | Event::DownloadCanceled { url, .. } => Some(url),
            Event::Shutdown => None,
        }
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn url() -> Url {
        Url::parse("https://a/ep.mp3").unwrap()
    }

    // --- TransferStatus integer encoding ---

    #[test]
    fn status_round_trips_through_i32_for_all_variants() {
        let cases = [
            (TransferStatus::Downloading, 0),
            (TransferStatus::Canceled, 1),
            (TransferStatus::Failed, 2),
            (TransferStatus::Succeeded, 3),
        ];

        for (variant, expected_int) in cases {
            assert_eq!(variant.to_i32(), expected_int, "{variant:?} should encode to {expected_int}");
            assert_eq!(
                TransferStatus::from_i32(expected_int),
                variant,
                "{expected_int} should decode to {variant:?}"
            );
        }
    }

    #[test]
    fn status_from_unknown_integer_defaults_to_failed() {
        assert_eq!(TransferStatus::from_i32(42), TransferStatus::Failed);
        assert_eq!(TransferStatus::from_i32(-1), TransferStatus::Failed);
    }

    // --- Item resolution ---

    #[test]
    fn item_without_url_does_not_resolve() {
        let item = Item::new("ep").in_collection(CollectionId(1));
        assert!(item.source().is_none());
    }

    #[test]
    fn item_without_collection_does_not_resolve() {
        let item = Item::new("ep").with_url(url());
        assert!(item.source().is_none());
    }

    #[test]
    fn item_with_url_and_collection_resolves() {
        let item = Item::new("ep").with_url(url()).in_collection(CollectionId(7));
        let (u, c) = item.source().unwrap();
        assert_eq!(u.as_str(), "https://a/ep.mp3");
        assert_eq!(c, CollectionId(7));
    }

    // --- TransferId ---

    #[test]
    fn transfer_ids_are_unique() {
        assert_ne!(TransferId::new(), TransferId::new());
    }

    #[test]
    fn transfer_id_parses_its_display_form() {
        let id = TransferId::new();
        assert_eq!(TransferId::from_str(&id.to_string()).unwrap(), id);
        assert!(TransferId::from_str("not-a-uuid").is_err());
    }

    #[test]
    fn resume_token_debug_hides_contents() {
        let token = ResumeToken::new(b"secret-state".to_vec());
        assert_eq!(format!("{token:?}"), "ResumeToken(12 bytes)");
    }

    // --- Record validation ---

    #[test]
    fn started_record_is_valid() {
        let record = TransferRecord::started(ItemId::from("ep"), TransferId::new(), url());
        assert_eq!(record.status, TransferStatus::Downloading);
        assert_eq!(record.progress, 0.0);
        assert!(record.validate().is_ok());
    }

    #[test]
    fn progress_above_one_is_rejected() {
        let mut record = TransferRecord::started(ItemId::from("ep"), TransferId::new(), url());
        record.progress = 1.5;
        assert!(matches!(
            record.validate(),
            Err(ValidationError::ProgressOutOfRange { .. })
        ));
    }

    #[test]
    fn nan_progress_is_rejected() {
        let mut record = TransferRecord::started(ItemId::from("ep"), TransferId::new(), url());
        record.progress = f32::NAN;
        assert!(record.validate().is_err(), "NaN must not slip through the range check");
    }

    #[test]
    fn resume_token_requires_canceled_status() {
        let mut record = TransferRecord::started(ItemId::from("ep"), TransferId::new(), url());
        record.resume_token = Some(ResumeToken::new(vec![1, 2, 3]));
        assert!(matches!(
            record.validate(),
            Err(ValidationError::ResumeTokenWithoutCancel { .. })
        ));

        record.status = TransferStatus::Canceled;
        assert!(record.validate().is_ok());
    }

    #[test]
    fn succeeded_requires_path_and_timestamp() {
        let mut record = TransferRecord::started(ItemId::from("ep"), TransferId::new(), url());
        record.status = TransferStatus::Succeeded;
        assert!(matches!(
            record.validate(),
            Err(ValidationError::IncompleteSuccess { field: "storage_path", .. })
        ));

        record.storage_path = Some(PathBuf::from("/tmp/ep.mp3"));
        assert!(matches!(
            record.validate(),
            Err(ValidationError::IncompleteSuccess { field: "downloaded_at", .. })
        ));

        record.downloaded_at = Some(Utc::now());
        assert!(record.validate().is_ok());
    }

    #[test]
    fn empty_item_id_is_rejected() {
        let record = TransferRecord::started(ItemId::from(""), TransferId::new(), url());
        assert_eq!(record.validate(), Err(ValidationError::EmptyItemId));
    }

    // --- Events ---

    #[test]
    fn event_kind_and_url_match_variant() {
        let event = Event::ProgressUpdated {
            url: url(),
            progress: 0.5,
        };
        assert_eq!(event.kind(), EventKind::ProgressUpdated);
        assert_eq!(event.url(), Some(&url()));
        assert_eq!(Event::Shutdown.url(), None);
    }

    #[test]
    fn event_serializes_with_type_tag() {
        let json = serde_json::to_value(Event::DownloadCompleted { url: url() }).unwrap();
        assert_eq!(json["type"], "download_completed");
        assert_eq!(json["url"], "https://a/ep.mp3");
    }
}
