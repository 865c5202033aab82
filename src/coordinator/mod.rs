//! Download coordinator split into focused submodules.
//!
//! The `DownloadCoordinator` struct and its methods are organized by domain:
//! - [`worker`] - Serialized worker task owning the handle correlation table
//! - [`control`] - Public download/cancel/resume operations
//! - [`callbacks`] - Session callback handling (progress and terminal events)
//! - [`lifecycle`] - Restore of interrupted transfers and graceful shutdown

mod callbacks;
mod control;
mod lifecycle;
mod worker;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod test_helpers;

use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::config::Config;
use crate::db::Database;
use crate::error::{Error, Result};
use crate::events::EventBus;
use crate::session::{HttpSession, SessionEvent, TransferSession};
use crate::store::RecordStore;
use crate::types::{Event, EventKind, ItemId, TransferRecord};

use worker::{Command, Worker};

/// Orchestrates transfers for items and keeps their records consistent
///
/// Public operations never block on network or storage I/O: they enqueue a
/// command for a single serialized worker task and return. The worker is the
/// only code that touches the record store for writes and the table mapping
/// live transfer handles to items, so session callbacks and commands never
/// race each other.
///
/// Cloning is cheap; all clones drive the same worker.
#[derive(Clone)]
pub struct DownloadCoordinator {
    /// Command channel into the worker
    pub(crate) commands: mpsc::UnboundedSender<Command>,
    /// Event bus shared with the worker
    pub(crate) events: EventBus,
    /// Configuration (wrapped in Arc for sharing across clones)
    pub(crate) config: Arc<Config>,
    /// Record store, read directly for queries
    pub(crate) store: Arc<dyn RecordStore>,
    /// SQLite handle when opened with [`DownloadCoordinator::open`]
    pub(crate) db: Option<Arc<Database>>,
    /// Flag to indicate whether commands are accepted (set to false during shutdown)
    pub(crate) accepting: Arc<AtomicBool>,
    /// Worker task handle, taken by shutdown
    pub(crate) worker: Arc<Mutex<Option<JoinHandle<()>>>>,
    /// Whether the previous run ended without a clean shutdown
    pub(crate) unclean_shutdown: bool,
}

impl DownloadCoordinator {
    /// Create a coordinator around injected collaborators
    ///
    /// `session_events` must be the receiving end of the channel the session
    /// delivers its callbacks on. The worker task is spawned immediately, so
    /// this must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the configuration is invalid.
    pub fn new(
        config: Config,
        session: Arc<dyn TransferSession>,
        store: Arc<dyn RecordStore>,
        session_events: mpsc::UnboundedReceiver<SessionEvent>,
    ) -> Result<Self> {
        config.validate()?;

        let events = EventBus::new(config.coordinator.event_buffer);
        let (commands, command_rx) = mpsc::unbounded_channel();

        tracing::info!(
            session = session.name(),
            store = store.name(),
            max_concurrent = config.transfer.max_concurrent_transfers,
            "Download coordinator starting"
        );

        let worker = Worker::new(
            session,
            Arc::clone(&store),
            events.clone(),
            config.persistence.progress_persist_step,
        );
        let handle = tokio::spawn(worker.run(command_rx, session_events));

        Ok(Self {
            commands,
            events,
            config: Arc::new(config),
            store,
            db: None,
            accepting: Arc::new(AtomicBool::new(true)),
            worker: Arc::new(Mutex::new(Some(handle))),
            unclean_shutdown: false,
        })
    }

    /// Open a coordinator backed by SQLite and HTTP transfers
    ///
    /// This initializes all core components:
    /// - Creates the download and temp directories
    /// - Opens/creates the SQLite database and runs migrations
    /// - Records the start for unclean shutdown detection
    /// - Restores records left `downloading` by a previous process
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use podcast_dl::{Config, DownloadCoordinator, Item, CollectionId};
    /// use url::Url;
    ///
    /// #[tokio::main]
    /// async fn main() -> Result<(), Box<dyn std::error::Error>> {
    ///     let coordinator = DownloadCoordinator::open(Config::default()).await?;
    ///
    ///     let item = Item::new("episode-42")
    ///         .with_url(Url::parse("https://cdn.example.com/ep42.mp3")?)
    ///         .in_collection(CollectionId(7));
    ///     coordinator.download(&item);
    ///
    ///     coordinator.shutdown().await?;
    ///     Ok(())
    /// }
    /// ```
    pub async fn open(config: Config) -> Result<Self> {
        config.validate()?;

        for dir in [config.download_dir(), config.temp_dir()] {
            tokio::fs::create_dir_all(dir).await.map_err(|e| {
                Error::Io(std::io::Error::new(
                    e.kind(),
                    format!("Failed to create directory '{}': {}", dir.display(), e),
                ))
            })?;
        }

        let db = Arc::new(Database::new(&config.persistence.database_path).await?);

        let unclean_shutdown = db.was_unclean_shutdown().await?;
        if unclean_shutdown {
            tracing::warn!("Previous run did not shut down cleanly");
        }
        // Mark that we're starting up (for unclean shutdown detection)
        db.set_clean_start().await?;

        let (session_tx, session_rx) = mpsc::unbounded_channel();
        let session = Arc::new(HttpSession::new(&config.transfer, session_tx)?);

        let store: Arc<dyn RecordStore> = db.clone();
        let mut coordinator = Self::new(config, session, store, session_rx)?;
        coordinator.db = Some(db);
        coordinator.unclean_shutdown = unclean_shutdown;

        let restored = coordinator.restore().await;
        tracing::info!(restored, "Download coordinator ready");

        Ok(coordinator)
    }

    /// Subscribe to download events
    ///
    /// Multiple subscribers are supported. Each subscriber receives all events
    /// published after it subscribed; there is no replay.
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<Event> {
        self.events.subscribe()
    }

    /// Invoke `handler` on its own task for every event of `kind`
    pub fn subscribe_kind<F>(&self, kind: EventKind, handler: F) -> JoinHandle<()>
    where
        F: FnMut(Event) + Send + 'static,
    {
        self.events.subscribe_kind(kind, handler)
    }

    /// Current record of an item
    pub async fn record(&self, item: &ItemId) -> Result<Option<TransferRecord>> {
        self.store.fetch_record_for_item(item).await
    }

    /// Wait until every command issued so far has been processed
    ///
    /// Session events already delivered to the coordinator are processed too.
    /// Returns immediately once the coordinator has shut down.
    pub async fn flush(&self) {
        let (ack_tx, ack_rx) = oneshot::channel();
        if self.commands.send(Command::Flush(ack_tx)).is_ok() {
            ack_rx.await.ok();
        }
    }

    /// Whether the previous run ended without calling [`shutdown`](Self::shutdown)
    ///
    /// Always `false` for coordinators built with [`DownloadCoordinator::new`].
    pub fn was_unclean_shutdown(&self) -> bool {
        self.unclean_shutdown
    }

    /// Get the current configuration
    pub fn get_config(&self) -> Arc<Config> {
        Arc::clone(&self.config)
    }
}
