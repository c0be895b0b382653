//! Source download: GET one image URL into memory.
//!
//! Every request carries its own timeout, so a
//! hanging host costs at most `fetch_timeout_secs` for its row and never
//! delays the rest of the batch beyond that.

use crate::error::{error_chain, truncate_message, ItemError};
use std::time::Duration;
use tracing::debug;

/// Check if the source string looks like a URL we can fetch.
///
/// The scheme is matched case-insensitively: spreadsheet autocorrect
/// happily turns `http://` into `Http://` or `HTTP://`.
pub fn is_url(source: &str) -> bool {
    let has_scheme = |scheme: &str| {
        source
            .get(..scheme.len())
            .is_some_and(|prefix| prefix.eq_ignore_ascii_case(scheme))
    };
    has_scheme("http://") || has_scheme("https://")
}

/// Downloads source images.
#[derive(Debug, Clone)]
pub struct Fetcher {
    client: reqwest::Client,
    timeout: Duration,
    message_limit: usize,
}

impl Fetcher {
    pub fn new(client: reqwest::Client, timeout_secs: u64, message_limit: usize) -> Self {
        Self {
            client,
            timeout: Duration::from_secs(timeout_secs),
            message_limit,
        }
    }

    /// Fetch the body at `source`.
    ///
    /// Non-2xx answers map to [`ItemError::HttpStatus`]; transport failures
    /// and timeouts map to [`ItemError::Network`].
    pub async fn fetch(&self, source: &str) -> Result<Vec<u8>, ItemError> {
        let url = source.trim();
        if !is_url(url) {
            return Err(ItemError::Network {
                detail: "unsupported URL scheme".to_string(),
            });
        }

        let response = self
            .client
            .get(url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| self.network_error(e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ItemError::HttpStatus {
                status: status.as_u16(),
            });
        }

        let bytes = response.bytes().await.map_err(|e| self.network_error(e))?;
        debug!("Fetched {} bytes from {}", bytes.len(), url);
        Ok(Vec::from(bytes))
    }

    fn network_error(&self, e: reqwest::Error) -> ItemError {
        let detail = if e.is_timeout() {
            format!("timed out after {}s", self.timeout.as_secs())
        } else {
            error_chain(&e)
        };
        ItemError::Network {
            detail: truncate_message(&detail, self.message_limit),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_url() {
        assert!(is_url("https://example.com/a.jpg"));
        assert!(is_url("http://example.com/a.jpg"));
        assert!(!is_url("/tmp/a.jpg"));
        assert!(!is_url("ftp://example.com/a.jpg"));
        assert!(!is_url(""));
        assert!(!is_url("http:/"));
    }

    #[test]
    fn scheme_match_ignores_case() {
        assert!(is_url("HTTP://EXAMPLE.COM/A.JPG"));
        assert!(is_url("Https://example.com/a.jpg"));
        assert!(!is_url("HTTPX://example.com/a.jpg"));
    }

    #[tokio::test]
    async fn non_http_source_fails_without_io() {
        let fetcher = Fetcher::new(reqwest::Client::new(), 1, 100);
        let err = fetcher.fetch("file:///etc/passwd").await.unwrap_err();
        assert_eq!(err.token(), "Err: unsupported URL scheme");
    }
}
