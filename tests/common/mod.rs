//! Common test utilities for podcast-dl E2E tests

#![allow(dead_code)]

use podcast_dl::{CollectionId, Config, Event, Item};
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::broadcast;
use url::Url;
use wiremock::MockServer;

/// Default time to wait for an event before failing a test
pub const EVENT_TIMEOUT: Duration = Duration::from_secs(10);

/// Configuration with every path under `dir`
///
/// Progress is reported on every chunk so small bodies still produce
/// progress events.
pub fn test_config(dir: &TempDir) -> Config {
    let mut config = Config::default();
    config.transfer.download_dir = dir.path().join("downloads");
    config.transfer.temp_dir = dir.path().join("temp");
    config.transfer.progress_interval = Duration::ZERO;
    config.persistence.database_path = dir.path().join("podcast-dl.db");
    config.coordinator.shutdown_timeout = Duration::from_secs(5);
    config
}

/// URL of `/<name>.mp3` on the mock server
pub fn episode_url(server: &MockServer, name: &str) -> Url {
    Url::parse(&format!("{}/{name}.mp3", server.uri())).unwrap()
}

/// Episode `name` of collection 1, served by the mock server
pub fn episode(server: &MockServer, name: &str) -> Item {
    Item::new(name)
        .with_url(episode_url(server, name))
        .in_collection(CollectionId(1))
}

/// Deterministic body of `len` bytes
pub fn body(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

/// Wait for the first event matching `predicate`, collecting everything seen
///
/// Returns `None` on timeout or if the bus closes first.
pub async fn wait_for_event<F>(
    events: &mut broadcast::Receiver<Event>,
    timeout: Duration,
    predicate: F,
) -> Option<(Event, Vec<Event>)>
where
    F: Fn(&Event) -> bool,
{
    let mut seen = Vec::new();
    let result = tokio::time::timeout(timeout, async {
        loop {
            match events.recv().await {
                Ok(event) if predicate(&event) => return Some(event),
                Ok(event) => seen.push(event),
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    })
    .await;

    match result {
        Ok(Some(event)) => Some((event, seen)),
        _ => None,
    }
}

/// Wait for a terminal event for `url`
pub async fn wait_for_outcome(
    events: &mut broadcast::Receiver<Event>,
    url: &Url,
) -> Option<(Event, Vec<Event>)> {
    wait_for_event(events, EVENT_TIMEOUT, |event| {
        event.url() == Some(url)
            && matches!(
                event,
                Event::DownloadCompleted { .. }
                    | Event::DownloadFailed { .. }
                    | Event::DownloadCanceled { .. }
            )
    })
    .await
}
