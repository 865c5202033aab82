//! Resumable transfer state carried inside a [`ResumeToken`]

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use url::Url;

use crate::error::{Error, Result};
use crate::types::ResumeToken;

/// State needed to continue an HTTP transfer with a range request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResumeState {
    /// Source URL
    pub url: Url,
    /// Partial file holding the bytes received so far
    pub partial_path: PathBuf,
    /// Length of the partial file
    pub bytes_received: u64,
    /// Total size if the server reported one
    pub bytes_expected: Option<u64>,
    /// Entity tag of the partial response, used as `If-Range` validator
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
    /// `Last-Modified` of the partial response, fallback `If-Range` validator
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<String>,
}

impl ResumeState {
    /// Encode into an opaque token
    pub fn encode(&self) -> Result<ResumeToken> {
        Ok(ResumeToken::new(serde_json::to_vec(self)?))
    }

    /// Decode a token produced by [`ResumeState::encode`]
    pub fn decode(token: &ResumeToken) -> Result<Self> {
        serde_json::from_slice(token.as_bytes())
            .map_err(|e| Error::InvalidResumeToken(format!("not an HTTP resume state: {}", e)))
    }

    /// Validator for the `If-Range` header, strongest first
    pub fn validator(&self) -> Option<&str> {
        self.etag.as_deref().or(self.last_modified.as_deref())
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> ResumeState {
        ResumeState {
            url: Url::parse("https://a/ep.mp3").unwrap(),
            partial_path: PathBuf::from("/tmp/x.part"),
            bytes_received: 30,
            bytes_expected: Some(100),
            etag: None,
            last_modified: Some("Wed, 21 Oct 2015 07:28:00 GMT".into()),
        }
    }

    #[test]
    fn decode_reads_what_encode_wrote() {
        let token = state().encode().unwrap();
        assert_eq!(ResumeState::decode(&token).unwrap(), state());
    }

    #[test]
    fn foreign_token_is_rejected() {
        let token = ResumeToken::new(vec![0xde, 0xad, 0xbe, 0xef]);
        assert!(matches!(
            ResumeState::decode(&token),
            Err(Error::InvalidResumeToken(_))
        ));
    }

    #[test]
    fn validator_prefers_etag() {
        let mut s = state();
        assert_eq!(s.validator(), Some("Wed, 21 Oct 2015 07:28:00 GMT"));
        s.etag = Some("\"v1\"".into());
        assert_eq!(s.validator(), Some("\"v1\""));
        s.etag = None;
        s.last_modified = None;
        assert_eq!(s.validator(), None);
    }
}
