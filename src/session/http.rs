//! HTTP transfer session backed by reqwest

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::StatusCode;
use reqwest::header::{
    CONTENT_RANGE, ETAG, HeaderMap, HeaderName, IF_RANGE, LAST_MODIFIED, RANGE,
};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::AsyncWriteExt;
use tokio::sync::{RwLock, Semaphore, mpsc};
use tokio_util::sync::CancellationToken;
use url::Url;

use super::resume_data::ResumeState;
use super::traits::{SessionEvent, TransferSession};
use crate::config::TransferConfig;
use crate::error::{Error, Result, TransferError};
use crate::types::{ResumeToken, TransferId};
use crate::utils::storage_file_name;

/// Streams transfers over HTTP(S) into partial files
///
/// At most `max_concurrent_transfers` transfers hold a connection at once;
/// the rest wait for a permit in FIFO order. Bytes stream into
/// `temp_dir/<transfer id>.part` and the finished file is moved into
/// `download_dir` under a name derived from the URL.
///
/// Cancel produces a resume token once at least `min_resumable_bytes` were
/// written. Resuming issues a range request guarded by `If-Range`; a server
/// that answers with the full body restarts the file from zero.
pub struct HttpSession {
    shared: Arc<Shared>,
}

/// State shared between the session handle and its transfer tasks
struct Shared {
    client: reqwest::Client,
    permits: Arc<Semaphore>,
    download_dir: PathBuf,
    temp_dir: PathBuf,
    progress_interval: Duration,
    min_resumable_bytes: u64,
    events: mpsc::UnboundedSender<SessionEvent>,
    /// Cancellation tokens of queued and running transfers
    active: RwLock<HashMap<TransferId, CancellationToken>>,
}

/// How a single transfer ended
enum Outcome {
    Completed {
        path: PathBuf,
        bytes: u64,
    },
    Canceled {
        resume_token: Option<ResumeToken>,
        bytes_received: u64,
        bytes_expected: Option<u64>,
    },
    Failed(TransferError),
}

impl Outcome {
    fn into_event(self, id: TransferId) -> SessionEvent {
        match self {
            Outcome::Completed { path, bytes } => SessionEvent::Completed { id, path, bytes },
            Outcome::Canceled {
                resume_token,
                bytes_received,
                bytes_expected,
            } => SessionEvent::Canceled {
                id,
                resume_token,
                bytes_received,
                bytes_expected,
            },
            Outcome::Failed(error) => SessionEvent::Failed { id, error },
        }
    }
}

impl HttpSession {
    /// Create a session delivering its callbacks on `events`
    ///
    /// # Errors
    ///
    /// Fails if the HTTP client cannot be built (e.g. TLS backend errors).
    pub fn new(
        config: &TransferConfig,
        events: mpsc::UnboundedSender<SessionEvent>,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| Error::Transfer(TransferError::from(e)))?;

        Ok(Self {
            shared: Arc::new(Shared {
                client,
                permits: Arc::new(Semaphore::new(config.max_concurrent_transfers.max(1))),
                download_dir: config.download_dir.clone(),
                temp_dir: config.temp_dir.clone(),
                progress_interval: config.progress_interval,
                min_resumable_bytes: config.min_resumable_bytes,
                events,
                active: RwLock::new(HashMap::new()),
            }),
        })
    }

    /// Number of queued and running transfers
    pub async fn active_count(&self) -> usize {
        self.shared.active.read().await.len()
    }

    async fn spawn(&self, state: ResumeState) -> TransferId {
        let id = TransferId::new();
        let cancel = CancellationToken::new();
        self.shared.active.write().await.insert(id, cancel.clone());

        let shared = Arc::clone(&self.shared);
        tokio::spawn(async move {
            let outcome = shared.run(id, state, cancel).await;
            shared.active.write().await.remove(&id);
            shared.emit(outcome.into_event(id));
        });

        id
    }
}

#[async_trait]
impl TransferSession for HttpSession {
    async fn start(&self, url: &Url) -> TransferId {
        let state = ResumeState {
            url: url.clone(),
            partial_path: PathBuf::new(),
            bytes_received: 0,
            bytes_expected: None,
            etag: None,
            last_modified: None,
        };
        let id = self.spawn(state).await;
        tracing::debug!(transfer_id = %id, url = %url, "Transfer queued");
        id
    }

    async fn resume(&self, token: &ResumeToken) -> Result<TransferId> {
        let state = ResumeState::decode(token)?;
        let url = state.url.clone();
        let offset = state.bytes_received;
        let id = self.spawn(state).await;
        tracing::debug!(transfer_id = %id, url = %url, offset, "Resumed transfer queued");
        Ok(id)
    }

    async fn cancel(&self, id: TransferId) {
        match self.shared.active.read().await.get(&id) {
            Some(token) => token.cancel(),
            None => tracing::debug!(transfer_id = %id, "Cancel for unknown transfer ignored"),
        }
    }

    async fn salvage(
        &self,
        id: TransferId,
        url: &Url,
        previous: Option<&ResumeToken>,
    ) -> Option<ResumeToken> {
        let partial_path = self.shared.partial_path(id);
        let len = tokio::fs::metadata(&partial_path).await.ok()?.len();
        if len < self.shared.min_resumable_bytes.max(1) {
            self.shared.discard(&partial_path).await;
            return None;
        }

        // Validators of the resumed response still describe the bytes on disk
        let mut state = previous
            .and_then(|token| ResumeState::decode(token).ok())
            .filter(|state| &state.url == url)
            .unwrap_or_else(|| ResumeState {
                url: url.clone(),
                partial_path: PathBuf::new(),
                bytes_received: 0,
                bytes_expected: None,
                etag: None,
                last_modified: None,
            });
        state.partial_path = partial_path;
        state.bytes_received = len;

        match state.encode() {
            Ok(token) => Some(token),
            Err(e) => {
                tracing::warn!(transfer_id = %id, error = %e, "Failed to encode salvaged state");
                None
            }
        }
    }

    async fn discard(&self, token: &ResumeToken) {
        let state = match ResumeState::decode(token) {
            Ok(state) => state,
            Err(e) => {
                tracing::debug!(error = %e, "Nothing to discard for foreign resume token");
                return;
            }
        };
        if !state.partial_path.starts_with(&self.shared.temp_dir) {
            tracing::warn!(
                path = %state.partial_path.display(),
                "Resume data outside the temp directory left in place"
            );
            return;
        }

        tracing::debug!(path = %state.partial_path.display(), "Discarding superseded partial file");
        self.shared.discard(&state.partial_path).await;
    }

    fn name(&self) -> &'static str {
        "http"
    }
}

impl Shared {
    fn partial_path(&self, id: TransferId) -> PathBuf {
        self.temp_dir.join(format!("{}.part", id))
    }

    fn emit(&self, event: SessionEvent) {
        self.events.send(event).ok();
    }

    /// Wait for a permit, then transfer; every path ends in one [`Outcome`]
    async fn run(
        &self,
        id: TransferId,
        mut state: ResumeState,
        cancel: CancellationToken,
    ) -> Outcome {
        let _permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::debug!(transfer_id = %id, "Transfer canceled while queued");
                return self.cancel_outcome(&state).await;
            }
            permit = Arc::clone(&self.permits).acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => {
                    return Outcome::Failed(TransferError::Network("transfer pool closed".into()));
                }
            },
        };

        tracing::info!(transfer_id = %id, url = %state.url, "Transfer started");
        match self.download(id, &mut state, &cancel).await {
            Ok(outcome) => outcome,
            Err(error) => {
                tracing::warn!(
                    transfer_id = %id,
                    url = %state.url,
                    error = %error,
                    "Transfer failed"
                );
                self.discard(&state.partial_path).await;
                Outcome::Failed(error)
            }
        }
    }

    async fn download(
        &self,
        id: TransferId,
        state: &mut ResumeState,
        cancel: &CancellationToken,
    ) -> std::result::Result<Outcome, TransferError> {
        tokio::fs::create_dir_all(&self.temp_dir)
            .await
            .map_err(storage_error)?;

        // Partial files are named after the live handle so a later salvage can find them
        let partial_path = self.partial_path(id);
        if !state.partial_path.as_os_str().is_empty()
            && state.partial_path != partial_path
            && tokio::fs::rename(&state.partial_path, &partial_path)
                .await
                .is_err()
        {
            state.bytes_received = 0;
        }
        state.partial_path = partial_path;
        state.bytes_received = match tokio::fs::metadata(&state.partial_path).await {
            Ok(meta) => meta.len().min(state.bytes_received),
            Err(_) => 0,
        };

        let mut request = self.client.get(state.url.clone());
        if state.bytes_received > 0 {
            request = request.header(RANGE, format!("bytes={}-", state.bytes_received));
            if let Some(validator) = state.validator() {
                request = request.header(IF_RANGE, validator);
            }
        }

        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(self.cancel_outcome(state).await),
            response = request.send() => response?,
        };

        let status = response.status();
        if !status.is_success() {
            return Err(TransferError::Http {
                status: status.as_u16(),
                url: state.url.to_string(),
            });
        }

        let append = status == StatusCode::PARTIAL_CONTENT && state.bytes_received > 0;
        let headers = response.headers();
        if append {
            let range = headers
                .get(CONTENT_RANGE)
                .and_then(|v| v.to_str().ok())
                .and_then(parse_content_range);
            if let Some((start, _)) = range
                && start != state.bytes_received
            {
                return Err(TransferError::RangeMismatch {
                    expected: state.bytes_received,
                    got: start,
                });
            }
            state.bytes_expected = range
                .and_then(|(_, total)| total)
                .or_else(|| response.content_length().map(|len| len + state.bytes_received))
                .or(state.bytes_expected);
        } else {
            if state.bytes_received > 0 {
                tracing::debug!(transfer_id = %id, "Server ignored range request, restarting");
            }
            state.bytes_received = 0;
            state.bytes_expected = response.content_length();
        }
        update_validators(state, headers);

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .append(append)
            .truncate(!append)
            .open(&state.partial_path)
            .await
            .map_err(storage_error)?;

        let mut stream = response.bytes_stream();
        let mut last_tick = Instant::now();
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    file.flush().await.map_err(storage_error)?;
                    drop(file);
                    return Ok(self.cancel_outcome(state).await);
                }
                chunk = stream.next() => match chunk {
                    Some(Ok(bytes)) => {
                        file.write_all(&bytes).await.map_err(storage_error)?;
                        state.bytes_received += bytes.len() as u64;
                        if last_tick.elapsed() >= self.progress_interval {
                            last_tick = Instant::now();
                            self.emit_progress(id, state);
                        }
                    }
                    Some(Err(e)) => return Err(TransferError::from(e)),
                    None => break,
                },
            }
        }

        file.flush().await.map_err(storage_error)?;
        drop(file);
        self.emit_progress(id, state);

        let path = self.finalize(state).await?;
        tracing::info!(
            transfer_id = %id,
            url = %state.url,
            path = %path.display(),
            bytes = state.bytes_received,
            "Transfer complete"
        );

        Ok(Outcome::Completed {
            path,
            bytes: state.bytes_received,
        })
    }

    fn emit_progress(&self, id: TransferId, state: &ResumeState) {
        self.emit(SessionEvent::Progress {
            id,
            bytes_written: state.bytes_received,
            bytes_expected: state.bytes_expected,
        });
    }

    /// Move the partial file to its final location
    async fn finalize(&self, state: &ResumeState) -> std::result::Result<PathBuf, TransferError> {
        tokio::fs::create_dir_all(&self.download_dir)
            .await
            .map_err(storage_error)?;
        let dest = self.download_dir.join(storage_file_name(&state.url));

        if tokio::fs::rename(&state.partial_path, &dest).await.is_err() {
            // Rename fails across filesystems
            tokio::fs::copy(&state.partial_path, &dest)
                .await
                .map_err(storage_error)?;
            self.discard(&state.partial_path).await;
        }

        Ok(dest)
    }

    /// Outcome of a cancel: keep the partial file only when it can be resumed
    async fn cancel_outcome(&self, state: &ResumeState) -> Outcome {
        let mut resume_token = None;
        if state.bytes_received >= self.min_resumable_bytes.max(1) {
            match state.encode() {
                Ok(token) => resume_token = Some(token),
                Err(e) => tracing::warn!(error = %e, "Failed to encode resume state"),
            }
        }
        if resume_token.is_none() {
            self.discard(&state.partial_path).await;
        }

        Outcome::Canceled {
            resume_token,
            bytes_received: state.bytes_received,
            bytes_expected: state.bytes_expected,
        }
    }

    async fn discard(&self, path: &Path) {
        if path.as_os_str().is_empty() {
            return;
        }
        if let Err(e) = tokio::fs::remove_file(path).await
            && e.kind() != std::io::ErrorKind::NotFound
        {
            tracing::warn!(path = %path.display(), error = %e, "Failed to remove partial file");
        }
    }
}

fn storage_error(e: std::io::Error) -> TransferError {
    TransferError::Storage(e.to_string())
}

/// Keep the validators of the newest response, falling back to earlier ones
fn update_validators(state: &mut ResumeState, headers: &HeaderMap) {
    let header = |name: HeaderName| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };
    if let Some(etag) = header(ETAG) {
        state.etag = Some(etag);
    }
    if let Some(last_modified) = header(LAST_MODIFIED) {
        state.last_modified = Some(last_modified);
    }
}

/// Parse `bytes <start>-<end>/<total>` into the start offset and total size
fn parse_content_range(value: &str) -> Option<(u64, Option<u64>)> {
    let rest = value.trim().strip_prefix("bytes ")?;
    let (range, total) = rest.split_once('/')?;
    let (start, _end) = range.split_once('-')?;
    let start = start.trim().parse().ok()?;
    Some((start, total.trim().parse().ok()))
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod parse_tests {
    use super::*;

    #[test]
    fn content_range_with_total() {
        assert_eq!(parse_content_range("bytes 30-99/100"), Some((30, Some(100))));
    }

    #[test]
    fn content_range_with_unknown_total() {
        assert_eq!(parse_content_range("bytes 30-99/*"), Some((30, None)));
    }

    #[test]
    fn content_range_garbage() {
        assert_eq!(parse_content_range("items 1-2/3"), None);
        assert_eq!(parse_content_range("bytes */100"), None);
    }
}
