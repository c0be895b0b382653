//! Upload sink: POST a PNG to an ImgBB-compatible hosting API.
//!
//! The request is form-encoded with two fields, `key` (the credential) and
//! `image` (standard base64 of the PNG bytes). A successful answer looks
//! like
//!
//! ```json
//! { "data": { "url": "https://i.ibb.co/…/a.png", "display_url": "…", "delete_url": "…" },
//!   "success": true, "status": 200 }
//! ```
//!
//! and a rejected one like
//!
//! ```json
//! { "status_code": 400, "error": { "message": "Invalid API v1 key.", "code": 100 },
//!   "status_txt": "Bad Request" }
//! ```

use crate::error::{error_chain, truncate_message, ItemError};
use crate::output::HostedLink;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Deserialize)]
struct UploadResponse {
    data: Option<UploadData>,
    error: Option<ApiError>,
    status_txt: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UploadData {
    url: Option<String>,
    display_url: Option<String>,
    delete_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: Option<String>,
}

/// Uploads PNG bytes and extracts the hosted link.
#[derive(Clone)]
pub struct Uploader {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    expiration_secs: Option<u64>,
    timeout: Duration,
    message_limit: usize,
}

impl std::fmt::Debug for Uploader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Uploader")
            .field("endpoint", &self.endpoint)
            .field("api_key", &"<redacted>")
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl Uploader {
    pub fn new(
        client: reqwest::Client,
        endpoint: impl Into<String>,
        api_key: impl Into<String>,
        timeout_secs: u64,
        message_limit: usize,
    ) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            expiration_secs: None,
            timeout: Duration::from_secs(timeout_secs),
            message_limit,
        }
    }

    pub fn with_expiration(mut self, secs: Option<u64>) -> Self {
        self.expiration_secs = secs;
        self
    }

    /// Upload `png` and return where it is now hosted.
    pub async fn upload(&self, png: &[u8]) -> Result<HostedLink, ItemError> {
        let b64 = STANDARD.encode(png);
        debug!("Uploading {} bytes ({} base64)", png.len(), b64.len());

        let mut request = self
            .client
            .post(&self.endpoint)
            .timeout(self.timeout)
            .form(&[("key", self.api_key.as_str()), ("image", b64.as_str())]);
        if let Some(secs) = self.expiration_secs {
            request = request.query(&[("expiration", secs)]);
        }

        let response = request.send().await.map_err(|e| ItemError::Upload {
            status: None,
            message: if e.is_timeout() {
                format!("timed out after {}s", self.timeout.as_secs())
            } else {
                truncate_message(&error_chain(&e), self.message_limit)
            },
        })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| ItemError::Upload {
            status: Some(status.as_u16()),
            message: truncate_message(&error_chain(&e), self.message_limit),
        })?;

        parse_upload_response(status.as_u16(), &body, self.message_limit)
    }
}

/// Interpret the sink's answer.
///
/// On a non-2xx status the upstream `error.message` is preferred, then
/// `status_txt`, then the bare status code. A 2xx body without `data.url`
/// counts as malformed.
pub fn parse_upload_response(
    status: u16,
    body: &str,
    message_limit: usize,
) -> Result<HostedLink, ItemError> {
    let parsed: Option<UploadResponse> = serde_json::from_str(body).ok();

    if !(200..300).contains(&status) {
        let message = parsed
            .as_ref()
            .and_then(|r| {
                r.error
                    .as_ref()
                    .and_then(|e| e.message.clone())
                    .or_else(|| r.status_txt.clone())
            })
            .unwrap_or_else(|| format!("HTTP {status}"));
        return Err(ItemError::Upload {
            status: Some(status),
            message: truncate_message(&message, message_limit),
        });
    }

    match parsed.and_then(|r| r.data) {
        Some(UploadData {
            url: Some(url),
            display_url,
            delete_url,
        }) if !url.is_empty() => Ok(HostedLink {
            url,
            display_url,
            delete_url,
        }),
        _ => Err(ItemError::Upload {
            status: Some(status),
            message: "malformed response".to_string(),
        }),
    }
}
