//! Utility functions for storage path naming

use sha2::{Digest, Sha256};
use url::Url;

/// Longest file name component kept from the URL
const MAX_NAME_LEN: usize = 100;

/// Name used when the URL path has no usable last segment
const FALLBACK_NAME: &str = "download";

/// Derive the stored file name for a transfer from its source URL
///
/// The name is deterministic: every transfer of the same URL, whether it ran
/// straight through or was canceled and resumed, lands at the same file name.
/// It is made of the first 8 hex characters of the URL's SHA-256 digest
/// (so two feeds publishing `episode.mp3` do not collide) followed by the
/// sanitized, percent-decoded last path segment.
///
/// # Examples
///
/// ```
/// use podcast_dl::utils::storage_file_name;
/// use url::Url;
///
/// let url = Url::parse("https://cdn.example.com/shows/Episode%201.mp3").unwrap();
/// let name = storage_file_name(&url);
/// assert!(name.ends_with("-Episode_1.mp3"));
/// assert_eq!(name.len(), "00000000-Episode_1.mp3".len());
/// ```
#[must_use]
pub fn storage_file_name(url: &Url) -> String {
    let mut hasher = Sha256::new();
    hasher.update(url.as_str().as_bytes());
    let digest = format!("{:x}", hasher.finalize());

    let segment = url
        .path_segments()
        .and_then(|segments| segments.filter(|s| !s.is_empty()).next_back())
        .map(|s| {
            urlencoding::decode(s)
                .map(|decoded| decoded.into_owned())
                .unwrap_or_else(|_| s.to_string())
        })
        .unwrap_or_default();

    format!("{}-{}", &digest[..8], sanitize_file_name(&segment))
}

/// Replace characters that are unsafe in file names
///
/// Keeps ASCII alphanumerics, `.`, `-` and `_`; everything else becomes `_`.
/// Leading dots are stripped so the result is never hidden or a relative path
/// component, and the result is capped at a fixed length.
#[must_use]
pub fn sanitize_file_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let trimmed = cleaned.trim_start_matches('.');

    if trimmed.is_empty() || trimmed.chars().all(|c| c == '_') {
        return FALLBACK_NAME.to_string();
    }

    trimmed.chars().take(MAX_NAME_LEN).collect()
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn same_url_gives_same_name() {
        let a = storage_file_name(&url("https://a/ep.mp3"));
        let b = storage_file_name(&url("https://a/ep.mp3"));
        assert_eq!(a, b);
        assert!(a.ends_with("-ep.mp3"));
    }

    #[test]
    fn same_segment_on_different_hosts_does_not_collide() {
        let a = storage_file_name(&url("https://one.example/ep.mp3"));
        let b = storage_file_name(&url("https://two.example/ep.mp3"));
        assert_ne!(a, b);
    }

    #[test]
    fn prefix_is_eight_hex_chars() {
        let name = storage_file_name(&url("https://a/ep.mp3"));
        let (prefix, rest) = name.split_at(8);
        assert!(prefix.chars().all(|c| c.is_ascii_hexdigit()));
        assert!(rest.starts_with('-'));
    }

    #[test]
    fn trailing_slash_uses_last_non_empty_segment() {
        let name = storage_file_name(&url("https://a/shows/ep42/"));
        assert!(name.ends_with("-ep42"));
    }

    #[test]
    fn url_without_path_falls_back() {
        let name = storage_file_name(&url("https://a/"));
        assert!(name.ends_with("-download"));
    }

    #[test]
    fn query_string_is_not_part_of_name() {
        let name = storage_file_name(&url("https://a/ep.mp3?token=abc"));
        assert!(name.ends_with("-ep.mp3"));
    }

    #[test]
    fn sanitize_replaces_path_separators() {
        assert_eq!(sanitize_file_name("../../etc/passwd"), "_.._etc_passwd");
        assert_eq!(sanitize_file_name("a b:c"), "a_b_c");
    }

    #[test]
    fn sanitize_strips_leading_dots_and_falls_back() {
        assert_eq!(sanitize_file_name(".hidden"), "hidden");
        assert_eq!(sanitize_file_name("..."), "download");
        assert_eq!(sanitize_file_name("???"), "download");
        assert_eq!(sanitize_file_name(""), "download");
    }

    #[test]
    fn sanitize_caps_length() {
        let long = "x".repeat(500);
        assert_eq!(sanitize_file_name(&long).len(), MAX_NAME_LEN);
    }
}
