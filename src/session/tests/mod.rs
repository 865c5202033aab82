
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::mpsc;

use super::{HttpSession, SessionEvent};
use crate::config::TransferConfig;

/// Session writing under a scratch directory, reporting every chunk
fn session_in(dir: &TempDir, max_concurrent: usize) -> (HttpSession, mpsc::UnboundedReceiver<SessionEvent>) {
    let config = TransferConfig {
        download_dir: dir.path().join("downloads"),
        temp_dir: dir.path().join("temp"),
        max_concurrent_transfers: max_concurrent,
        progress_interval: Duration::ZERO,
        ..Default::default()
    };
    let (tx, rx) = mpsc::unbounded_channel();
    (HttpSession::new(&config, tx).unwrap(), rx)
}

/// Collect progress events until the terminal event arrives
async fn until_terminal(
    rx: &mut mpsc::UnboundedReceiver<SessionEvent>,
) -> (Vec<SessionEvent>, SessionEvent) {
    let mut progress = Vec::new();
    loop {
        let event = tokio::time::timeout(Duration::from_secs(10), rx.recv())
            .await
            .expect("timed out waiting for session event")
            .expect("session channel closed");
        if event.is_terminal() {
            return (progress, event);
        }
        progress.push(event);
    }
}

/// Deterministic body of `len` bytes
fn body(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}
