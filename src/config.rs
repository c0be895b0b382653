//! Configuration types for spreadsheet re-hosting.
//!
//! All run behaviour is controlled through [`ConversionConfig`], built via its
//! [`ConversionConfigBuilder`]. Keeping every knob in one struct makes it
//! trivial to share configs across worker tasks and to log the settings a run
//! used.
//!
//! # Credentials
//! There is no embedded default API key. Operations that upload fail with
//! [`RelinkError::MissingApiKey`] unless a key was set explicitly.

use crate::error::RelinkError;
use crate::progress::ProgressCallback;
use serde::{Deserialize, Serialize};
use std::fmt;

/// ImgBB's public upload endpoint.
pub const DEFAULT_UPLOAD_ENDPOINT: &str = "https://api.imgbb.com/1/upload";

/// The hosting API refuses uploads slower than this; shorter timeouts only
/// manufacture failures.
pub const MIN_UPLOAD_TIMEOUT_SECS: u64 = 20;

/// Configuration for a re-hosting run.
///
/// Built via [`ConversionConfig::builder()`] or using
/// [`ConversionConfig::default()`].
///
/// # Example
/// ```rust
/// use sheet_relink::{ConversionConfig, WriteMode};
///
/// let config = ConversionConfig::builder()
///     .api_key("my-imgbb-key")
///     .concurrency(8)
///     .max_dimension(Some(1000))
///     .write_mode(WriteMode::Append("hosted".into()))
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct ConversionConfig {
    /// Credential sent as the `key` form field. Required for uploads.
    pub api_key: Option<String>,

    /// Number of rows processed concurrently. Default: 8.
    ///
    /// Each in-flight row holds one download and one upload connection.
    /// Eight keeps the hosting API from throttling while still hiding most of
    /// the network latency.
    pub concurrency: usize,

    /// Longest edge, in pixels, of the re-encoded PNG. Default: `Some(1000)`.
    ///
    /// Larger images are shrunk with their aspect ratio preserved; smaller
    /// ones are never upscaled. `None` keeps the original size.
    pub max_dimension: Option<u32>,

    /// Per-download timeout in seconds. Default: 10.
    pub fetch_timeout_secs: u64,

    /// Per-upload timeout in seconds. Default: 30, minimum 20.
    pub upload_timeout_secs: u64,

    /// Upload endpoint. Default: [`DEFAULT_UPLOAD_ENDPOINT`].
    pub upload_endpoint: String,

    /// Optional auto-delete delay forwarded as the `expiration` query
    /// parameter (60–15 552 000 s).
    pub upload_expiration_secs: Option<u64>,

    /// How the image column is located. Default: [`ColumnSelection::Auto`].
    pub column: ColumnSelection,

    /// Where hosted links are written. Default: [`WriteMode::Replace`].
    pub write_mode: WriteMode,

    /// CSV field delimiter. `None` sniffs it from the header line.
    pub delimiter: Option<u8>,

    /// Upstream messages embedded in error tokens are cut to this many
    /// characters. Default: 100.
    pub error_message_limit: usize,

    /// `User-Agent` header for downloads and uploads.
    pub user_agent: String,

    /// Receives per-row progress events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            concurrency: 8,
            max_dimension: Some(1000),
            fetch_timeout_secs: 10,
            upload_timeout_secs: 30,
            upload_endpoint: DEFAULT_UPLOAD_ENDPOINT.to_string(),
            upload_expiration_secs: None,
            column: ColumnSelection::default(),
            write_mode: WriteMode::default(),
            delimiter: None,
            error_message_limit: 100,
            user_agent: concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")).to_string(),
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ConversionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversionConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("concurrency", &self.concurrency)
            .field("max_dimension", &self.max_dimension)
            .field("fetch_timeout_secs", &self.fetch_timeout_secs)
            .field("upload_timeout_secs", &self.upload_timeout_secs)
            .field("upload_endpoint", &self.upload_endpoint)
            .field("upload_expiration_secs", &self.upload_expiration_secs)
            .field("column", &self.column)
            .field("write_mode", &self.write_mode)
            .field("delimiter", &self.delimiter.map(char::from))
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn ConversionProgressCallback>"),
            )
            .finish()
    }
}

impl ConversionConfig {
    /// Create a new builder for `ConversionConfig`.
    pub fn builder() -> ConversionConfigBuilder {
        ConversionConfigBuilder {
            config: Self::default(),
        }
    }

    /// The API key, or [`RelinkError::MissingApiKey`] when unset or blank.
    pub fn require_api_key(&self) -> Result<&str, RelinkError> {
        match self.api_key.as_deref().map(str::trim) {
            Some(key) if !key.is_empty() => Ok(key),
            _ => Err(RelinkError::MissingApiKey),
        }
    }
}

/// Builder for [`ConversionConfig`].
#[derive(Debug)]
pub struct ConversionConfigBuilder {
    config: ConversionConfig,
}

impl ConversionConfigBuilder {
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.config.api_key = Some(key.into());
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn max_dimension(mut self, px: Option<u32>) -> Self {
        self.config.max_dimension = px.map(|p| p.max(16));
        self
    }

    pub fn fetch_timeout_secs(mut self, secs: u64) -> Self {
        self.config.fetch_timeout_secs = secs;
        self
    }

    pub fn upload_timeout_secs(mut self, secs: u64) -> Self {
        self.config.upload_timeout_secs = secs;
        self
    }

    pub fn upload_endpoint(mut self, url: impl Into<String>) -> Self {
        self.config.upload_endpoint = url.into();
        self
    }

    pub fn upload_expiration_secs(mut self, secs: Option<u64>) -> Self {
        self.config.upload_expiration_secs = secs;
        self
    }

    pub fn column(mut self, selection: ColumnSelection) -> Self {
        self.config.column = selection;
        self
    }

    pub fn write_mode(mut self, mode: WriteMode) -> Self {
        self.config.write_mode = mode;
        self
    }

    pub fn delimiter(mut self, delimiter: Option<u8>) -> Self {
        self.config.delimiter = delimiter;
        self
    }

    pub fn error_message_limit(mut self, chars: usize) -> Self {
        self.config.error_message_limit = chars.max(8);
        self
    }

    pub fn user_agent(mut self, ua: impl Into<String>) -> Self {
        self.config.user_agent = ua.into();
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    ///
    /// The API key is not checked here so column inspection and dry runs work
    /// without one; upload paths call [`ConversionConfig::require_api_key`].
    pub fn build(self) -> Result<ConversionConfig, RelinkError> {
        let c = &self.config;
        if c.concurrency == 0 {
            return Err(RelinkError::InvalidConfig("Concurrency must be ≥ 1".into()));
        }
        if c.fetch_timeout_secs == 0 {
            return Err(RelinkError::InvalidConfig(
                "Fetch timeout must be ≥ 1s".into(),
            ));
        }
        if c.upload_timeout_secs < MIN_UPLOAD_TIMEOUT_SECS {
            return Err(RelinkError::InvalidConfig(format!(
                "Upload timeout must be ≥ {MIN_UPLOAD_TIMEOUT_SECS}s, got {}s",
                c.upload_timeout_secs
            )));
        }
        if !(c.upload_endpoint.starts_with("http://") || c.upload_endpoint.starts_with("https://")) {
            return Err(RelinkError::InvalidConfig(format!(
                "Upload endpoint must be an http(s) URL, got '{}'",
                c.upload_endpoint
            )));
        }
        if let Some(secs) = c.upload_expiration_secs {
            if !(60..=15_552_000).contains(&secs) {
                return Err(RelinkError::InvalidConfig(format!(
                    "Expiration must be 60–15552000s, got {secs}"
                )));
            }
        }
        if let Some(d) = c.delimiter {
            if d == b'"' || d == b'\n' || d == b'\r' {
                return Err(RelinkError::InvalidConfig(format!(
                    "Delimiter {:?} is not usable",
                    char::from(d)
                )));
            }
        }
        if let WriteMode::Append(ref name) = c.write_mode {
            if name.trim().is_empty() {
                return Err(RelinkError::InvalidConfig(
                    "Appended column needs a non-empty name".into(),
                ));
            }
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// How the column holding image URLs is located.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColumnSelection {
    /// Header heuristics, then content sniffing (default).
    #[default]
    Auto,
    /// Header name, compared trimmed and case-insensitively.
    Named(String),
    /// 0-indexed column position.
    Index(usize),
}

/// Where hosted links are written back.
///
/// Overwriting the source column loses the original URLs, appending keeps
/// them side by side; neither is inferred, the caller picks one.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum WriteMode {
    /// Overwrite the source column in place (default).
    #[default]
    Replace,
    /// Keep the source column and append a new one with this header.
    Append(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documentation() {
        let c = ConversionConfig::default();
        assert_eq!(c.concurrency, 8);
        assert_eq!(c.max_dimension, Some(1000));
        assert_eq!(c.fetch_timeout_secs, 10);
        assert_eq!(c.upload_timeout_secs, 30);
        assert_eq!(c.upload_endpoint, DEFAULT_UPLOAD_ENDPOINT);
        assert_eq!(c.write_mode, WriteMode::Replace);
        assert!(c.api_key.is_none());
    }

    #[test]
    fn builder_clamps_concurrency() {
        let c = ConversionConfig::builder().concurrency(0).build().unwrap();
        assert_eq!(c.concurrency, 1);
    }

    #[test]
    fn short_upload_timeout_rejected() {
        let err = ConversionConfig::builder()
            .upload_timeout_secs(5)
            .build()
            .unwrap_err();
        assert!(matches!(err, RelinkError::InvalidConfig(_)));
    }

    #[test]
    fn non_http_endpoint_rejected() {
        let err = ConversionConfig::builder()
            .upload_endpoint("ftp://example.com")
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("http(s)"));
    }

    #[test]
    fn expiration_range_checked() {
        assert!(ConversionConfig::builder()
            .upload_expiration_secs(Some(30))
            .build()
            .is_err());
        assert!(ConversionConfig::builder()
            .upload_expiration_secs(Some(600))
            .build()
            .is_ok());
    }

    #[test]
    fn append_requires_name() {
        assert!(ConversionConfig::builder()
            .write_mode(WriteMode::Append("  ".into()))
            .build()
            .is_err());
    }

    #[test]
    fn missing_api_key_is_reported() {
        let c = ConversionConfig::default();
        assert!(matches!(c.require_api_key(), Err(RelinkError::MissingApiKey)));
        let c = ConversionConfig::builder().api_key("   ").build().unwrap();
        assert!(c.require_api_key().is_err());
        let c = ConversionConfig::builder().api_key("k").build().unwrap();
        assert_eq!(c.require_api_key().unwrap(), "k");
    }

    #[test]
    fn debug_redacts_api_key() {
        let c = ConversionConfig::builder().api_key("secret-123").build().unwrap();
        let dbg = format!("{c:?}");
        assert!(!dbg.contains("secret-123"));
        assert!(dbg.contains("<redacted>"));
    }
}
