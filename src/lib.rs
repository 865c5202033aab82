//! # podcast-dl
//!
//! Background episode download coordinator for podcast clients.
//!
//! ## Design Philosophy
//!
//! podcast-dl is designed to be:
//! - **Never blocking** - Public operations enqueue work and return immediately
//! - **Durable** - Every download attempt leaves a record that survives restarts
//! - **Resumable** - Canceled transfers keep an opaque resume token
//! - **Event-driven** - Consumers subscribe to events, no polling required
//!
//! ## Quick Start
//!
//! ```no_run
//! use podcast_dl::{CollectionId, Config, DownloadCoordinator, Event, Item};
//! use url::Url;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let coordinator = DownloadCoordinator::open(Config::default()).await?;
//!
//!     // Subscribe to events
//!     let mut events = coordinator.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             if let Event::ProgressUpdated { url, progress } = event {
//!                 println!("{url}: {:.0}%", progress * 100.0);
//!             }
//!         }
//!     });
//!
//!     let episode = Item::new("guid-1234")
//!         .with_url(Url::parse("https://cdn.example.com/episode.mp3")?)
//!         .in_collection(CollectionId(1));
//!     coordinator.download(&episode);
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Configuration types
pub mod config;
/// Download coordinator (decomposed into focused submodules)
pub mod coordinator;
/// Database persistence layer
pub mod db;
/// Error types
pub mod error;
/// Typed event bus
pub mod events;
/// Network transfer sessions
pub mod session;
/// Record store abstraction
pub mod store;
/// Core types and events
pub mod types;
/// Utility functions
pub mod utils;

// Re-export commonly used types
pub use config::Config;
pub use coordinator::DownloadCoordinator;
pub use db::Database;
pub use error::{DatabaseError, Error, Result, TransferError, ValidationError};
pub use events::EventBus;
pub use session::{HttpSession, ResumeState, SessionEvent, TransferSession};
pub use store::{ChangeSet, MemoryStore, RecordStore};
pub use types::{
    CollectionId, Event, EventKind, Item, ItemId, ResumeToken, TransferId, TransferRecord,
    TransferStatus,
};

/// Helper function to run the coordinator with graceful signal handling.
///
/// Waits for a termination signal and then calls the coordinator's `shutdown()` method.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// # Example
///
/// ```no_run
/// use podcast_dl::{Config, DownloadCoordinator, run_with_shutdown};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let coordinator = DownloadCoordinator::open(Config::default()).await?;
///
///     // Run with automatic signal handling
///     run_with_shutdown(coordinator).await?;
///
///     Ok(())
/// }
/// ```
pub async fn run_with_shutdown(coordinator: DownloadCoordinator) -> Result<()> {
    wait_for_signal().await;
    coordinator.shutdown().await
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Signal registration may fail in restricted environments (containers, tests)
    match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => tracing::info!("Received SIGTERM signal"),
                _ = sigint.recv() => tracing::info!("Received SIGINT signal (Ctrl+C)"),
            }
        }
        (Ok(mut sigterm), Err(e)) => {
            tracing::warn!(error = %e, "Could not register SIGINT handler, waiting for SIGTERM only");
            sigterm.recv().await;
            tracing::info!("Received SIGTERM signal");
        }
        (Err(e), Ok(mut sigint)) => {
            tracing::warn!(error = %e, "Could not register SIGTERM handler, waiting for SIGINT only");
            sigint.recv().await;
            tracing::info!("Received SIGINT signal (Ctrl+C)");
        }
        (Err(e), Err(_)) => {
            tracing::error!(error = %e, "Could not register any signal handlers, using ctrl_c fallback");
            tokio::signal::ctrl_c().await.ok();
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received Ctrl+C signal");
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
        }
    }
}
