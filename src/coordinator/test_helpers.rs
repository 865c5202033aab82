//! Shared test helpers for creating DownloadCoordinator instances in tests.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use url::Url;

use crate::config::Config;
use crate::coordinator::DownloadCoordinator;
use crate::error::{Error, Result, TransferError, ValidationError};
use crate::session::{SessionEvent, TransferSession};
use crate::store::{ChangeSet, MemoryStore, RecordStore};
use crate::types::{
    CollectionId, Item, ItemId, ResumeToken, TransferId, TransferRecord, TransferStatus,
};

/// Call made on a [`MockSession`]
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum SessionCall {
    Start { url: Url, id: TransferId },
    Resume { token: ResumeToken, id: TransferId },
    Cancel(TransferId),
    Discard(ResumeToken),
}

/// Scripted transfer session: records calls, tests inject callbacks
pub(crate) struct MockSession {
    calls: Mutex<Vec<SessionCall>>,
    events: mpsc::UnboundedSender<SessionEvent>,
    salvageable: Mutex<HashMap<TransferId, ResumeToken>>,
    /// Answer every cancel with a resumable `Canceled` event at 50/100 bytes
    answer_cancels: AtomicBool,
}

impl MockSession {
    pub(crate) fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<SessionEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let session = Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            events: tx,
            salvageable: Mutex::new(HashMap::new()),
            answer_cancels: AtomicBool::new(false),
        });
        (session, rx)
    }

    pub(crate) fn calls(&self) -> Vec<SessionCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Handles returned by `start`, in call order
    pub(crate) fn started(&self) -> Vec<(Url, TransferId)> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                SessionCall::Start { url, id } => Some((url, id)),
                _ => None,
            })
            .collect()
    }

    pub(crate) fn last_started(&self) -> TransferId {
        self.started().last().expect("no transfer started").1
    }

    pub(crate) fn resumed(&self) -> Vec<(ResumeToken, TransferId)> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                SessionCall::Resume { token, id } => Some((token, id)),
                _ => None,
            })
            .collect()
    }

    pub(crate) fn canceled(&self) -> Vec<TransferId> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                SessionCall::Cancel(id) => Some(id),
                _ => None,
            })
            .collect()
    }

    /// Tokens whose partial data was discarded, in call order
    pub(crate) fn discarded(&self) -> Vec<ResumeToken> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                SessionCall::Discard(token) => Some(token),
                _ => None,
            })
            .collect()
    }

    pub(crate) fn answer_cancels(&self) {
        self.answer_cancels.store(true, Ordering::SeqCst);
    }

    pub(crate) fn allow_salvage(&self, id: TransferId, token: ResumeToken) {
        self.salvageable.lock().unwrap().insert(id, token);
    }

    pub(crate) fn emit(&self, event: SessionEvent) {
        self.events.send(event).unwrap();
    }

    pub(crate) fn progress(&self, id: TransferId, written: u64, expected: u64) {
        self.emit(SessionEvent::Progress {
            id,
            bytes_written: written,
            bytes_expected: Some(expected),
        });
    }

    pub(crate) fn complete(&self, id: TransferId, path: &str, bytes: u64) {
        self.emit(SessionEvent::Completed {
            id,
            path: path.into(),
            bytes,
        });
    }

    pub(crate) fn cancel_result(
        &self,
        id: TransferId,
        token: Option<&[u8]>,
        received: u64,
        expected: u64,
    ) {
        self.emit(SessionEvent::Canceled {
            id,
            resume_token: token.map(|t| ResumeToken::new(t.to_vec())),
            bytes_received: received,
            bytes_expected: Some(expected),
        });
    }

    pub(crate) fn fail(&self, id: TransferId) {
        self.emit(SessionEvent::Failed {
            id,
            error: TransferError::Network("connection reset".into()),
        });
    }
}

#[async_trait]
impl TransferSession for MockSession {
    async fn start(&self, url: &Url) -> TransferId {
        let id = TransferId::new();
        self.calls.lock().unwrap().push(SessionCall::Start {
            url: url.clone(),
            id,
        });
        id
    }

    async fn resume(&self, token: &ResumeToken) -> Result<TransferId> {
        if token.as_bytes().is_empty() {
            return Err(Error::InvalidResumeToken("empty".into()));
        }
        let id = TransferId::new();
        self.calls.lock().unwrap().push(SessionCall::Resume {
            token: token.clone(),
            id,
        });
        Ok(id)
    }

    async fn cancel(&self, id: TransferId) {
        self.calls.lock().unwrap().push(SessionCall::Cancel(id));
        if self.answer_cancels.load(Ordering::SeqCst) {
            self.cancel_result(id, Some(b"mock-resume"), 50, 100);
        }
    }

    async fn salvage(
        &self,
        id: TransferId,
        _url: &Url,
        _previous: Option<&ResumeToken>,
    ) -> Option<ResumeToken> {
        self.salvageable.lock().unwrap().remove(&id)
    }

    async fn discard(&self, token: &ResumeToken) {
        self.calls
            .lock()
            .unwrap()
            .push(SessionCall::Discard(token.clone()));
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

/// Store that rejects the next `n` saves with a validation error
pub(crate) struct RejectingStore {
    inner: MemoryStore,
    rejections: AtomicUsize,
}

impl RejectingStore {
    pub(crate) fn new(inner: MemoryStore) -> Self {
        Self {
            inner,
            rejections: AtomicUsize::new(0),
        }
    }

    pub(crate) fn reject_next(&self, n: usize) {
        self.rejections.store(n, Ordering::SeqCst);
    }
}

#[async_trait]
impl RecordStore for RejectingStore {
    async fn fetch_record(&self, transfer_id: TransferId) -> Result<Option<TransferRecord>> {
        self.inner.fetch_record(transfer_id).await
    }

    async fn fetch_record_for_item(&self, item: &ItemId) -> Result<Option<TransferRecord>> {
        self.inner.fetch_record_for_item(item).await
    }

    async fn records_with_status(&self, status: TransferStatus) -> Result<Vec<TransferRecord>> {
        self.inner.records_with_status(status).await
    }

    async fn collection_items(&self, collection: CollectionId) -> Result<Vec<ItemId>> {
        self.inner.collection_items(collection).await
    }

    async fn save(&self, changes: &ChangeSet) -> Result<()> {
        let remaining = self.rejections.load(Ordering::SeqCst);
        if remaining > 0 {
            self.rejections.store(remaining - 1, Ordering::SeqCst);
            return Err(Error::Validation(ValidationError::EmptyItemId));
        }
        self.inner.save(changes).await
    }

    fn name(&self) -> &'static str {
        "rejecting"
    }
}

/// Episode `id` of collection 1 at `https://a/<id>.mp3`
pub(crate) fn episode(id: &str) -> Item {
    Item::new(id)
        .with_url(Url::parse(&format!("https://a/{id}.mp3")).unwrap())
        .in_collection(CollectionId(1))
}

/// Coordinator over a [`MockSession`] and the given store
pub(crate) fn create_test_coordinator_with(
    config: Config,
    store: Arc<dyn RecordStore>,
) -> (DownloadCoordinator, Arc<MockSession>) {
    let (session, session_rx) = MockSession::new();
    let coordinator =
        DownloadCoordinator::new(config, session.clone(), store, session_rx).unwrap();
    (coordinator, session)
}

/// Coordinator over a [`MockSession`] and an empty [`MemoryStore`]
pub(crate) fn create_test_coordinator() -> (DownloadCoordinator, Arc<MockSession>, Arc<MemoryStore>)
{
    let store = Arc::new(MemoryStore::new());
    let (coordinator, session) = create_test_coordinator_with(Config::default(), store.clone());
    (coordinator, session, store)
}

/// Drain every event currently buffered on a subscription
pub(crate) fn drain_events(
    rx: &mut tokio::sync::broadcast::Receiver<crate::types::Event>,
) -> Vec<crate::types::Event> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}
