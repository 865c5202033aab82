//! Network transfer sessions
//!
//! A session owns a bounded pool of concurrent byte transfers. Callers get a
//! [`TransferId`](crate::types::TransferId) back immediately from
//! [`TransferSession::start`] and [`TransferSession::resume`]; everything that
//! happens afterwards arrives as [`SessionEvent`]s on the channel the session
//! was built with.
//!
//! ## Architecture
//!
//! The core abstraction is the [`TransferSession`] trait. Implementations:
//!
//! - [`HttpSession`]: streams HTTP(S) responses to disk with range-request resume
//!
//! Resume tokens are opaque to callers. [`HttpSession`] encodes a
//! [`ResumeState`] into them.

mod http;
mod resume_data;
mod traits;

pub use http::HttpSession;
pub use resume_data::ResumeState;
pub use traits::{SessionEvent, TransferSession};

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;
