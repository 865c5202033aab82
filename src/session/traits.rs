//! Traits and types for network transfer sessions

use async_trait::async_trait;
use std::path::PathBuf;
use url::Url;

use crate::error::{Result, TransferError};
use crate::types::{ResumeToken, TransferId};

/// Low-level callback raised by a [`TransferSession`]
///
/// Events are delivered on the channel handed to the session at construction,
/// from the session's own worker tasks. Exactly one terminal event
/// (`Completed`, `Canceled` or `Failed`) is sent per transfer handle.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// Bytes were written for a transfer
    Progress {
        /// Transfer handle
        id: TransferId,
        /// Total bytes written so far, including bytes from a resumed prefix
        bytes_written: u64,
        /// Total size if the server reported one
        bytes_expected: Option<u64>,
    },
    /// The transfer finished and the file is in place
    Completed {
        /// Transfer handle
        id: TransferId,
        /// Final location of the file
        path: PathBuf,
        /// Size of the file in bytes
        bytes: u64,
    },
    /// The transfer stopped after a cancel request
    Canceled {
        /// Transfer handle
        id: TransferId,
        /// Resumable state, absent when too little was transferred to resume
        resume_token: Option<ResumeToken>,
        /// Bytes received before the transfer stopped
        bytes_received: u64,
        /// Total size if known
        bytes_expected: Option<u64>,
    },
    /// The transfer failed; the session does not retry
    Failed {
        /// Transfer handle
        id: TransferId,
        /// What went wrong
        error: TransferError,
    },
}

impl SessionEvent {
    /// Handle the event refers to
    pub fn id(&self) -> TransferId {
        match self {
            SessionEvent::Progress { id, .. }
            | SessionEvent::Completed { id, .. }
            | SessionEvent::Canceled { id, .. }
            | SessionEvent::Failed { id, .. } => *id,
        }
    }

    /// Whether this is the last event for its handle
    pub fn is_terminal(&self) -> bool {
        !matches!(self, SessionEvent::Progress { .. })
    }
}

/// Trait for a bounded pool of network transfers
///
/// Every operation returns without waiting for network I/O. Transfers run on
/// the session's own tasks, at most a configured number at a time; excess
/// transfers queue rather than fail. Results arrive as [`SessionEvent`]s.
///
/// Implementations can stream over HTTP ([`HttpSession`](super::HttpSession))
/// or be scripted test doubles.
#[async_trait]
pub trait TransferSession: Send + Sync {
    /// Enqueue a transfer of `url` and return its handle
    async fn start(&self, url: &Url) -> TransferId;

    /// Enqueue a transfer continuing from previously saved resumable state
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidResumeToken`](crate::Error::InvalidResumeToken)
    /// if the token was not produced by this kind of session.
    async fn resume(&self, token: &ResumeToken) -> Result<TransferId>;

    /// Request cancellation of a transfer
    ///
    /// Cancellation is cooperative. The outcome, including any resume token,
    /// arrives later as [`SessionEvent::Canceled`]. Unknown or finished handles
    /// are ignored.
    async fn cancel(&self, id: TransferId);

    /// Build resumable state for a transfer left behind by a previous process
    ///
    /// `previous` is the token the transfer was resumed from, if any; details
    /// it carries about the source are kept in the new token. Returns `None`
    /// when nothing usable survived. The default implementation never
    /// salvages.
    async fn salvage(
        &self,
        id: TransferId,
        url: &Url,
        previous: Option<&ResumeToken>,
    ) -> Option<ResumeToken> {
        let _ = (id, url, previous);
        None
    }

    /// Delete the partial data behind a token that will never be resumed
    ///
    /// Tokens this session did not produce are ignored. The default
    /// implementation keeps no partial data and does nothing.
    async fn discard(&self, token: &ResumeToken) {
        let _ = token;
    }

    /// Human-readable name for logging
    fn name(&self) -> &'static str;
}
