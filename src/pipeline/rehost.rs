//! The per-row unit-of-work: fetch → transcode → upload.
//!
//! [`UnitOfWork`] is the seam the batch pipeline is generic over. The
//! production implementation is [`ImageRehoster`]; tests inject stubs.

use crate::config::ConversionConfig;
use crate::error::{ItemError, RelinkError};
use crate::output::HostedLink;
use crate::pipeline::fetch::Fetcher;
use crate::pipeline::transcode;
use crate::pipeline::upload::Uploader;
use async_trait::async_trait;
use tracing::debug;

/// One independently failable step applied to every non-blank row.
///
/// Implementations report failures through the returned `ItemError`. A
/// panic is still contained by the batch pipeline, but only as the generic
/// [`ItemError::Panicked`].
#[async_trait]
pub trait UnitOfWork: Send + Sync {
    async fn process(&self, source: &str) -> Result<HostedLink, ItemError>;
}

/// Re-hosts one image URL as PNG on the configured upload sink.
#[derive(Debug, Clone)]
pub struct ImageRehoster {
    fetcher: Fetcher,
    uploader: Uploader,
    max_dimension: Option<u32>,
}

impl ImageRehoster {
    pub fn new(fetcher: Fetcher, uploader: Uploader, max_dimension: Option<u32>) -> Self {
        Self {
            fetcher,
            uploader,
            max_dimension,
        }
    }

    /// Build from a config; one HTTP client is shared by every row.
    pub fn from_config(config: &ConversionConfig) -> Result<Self, RelinkError> {
        let api_key = config.require_api_key()?;
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| RelinkError::HttpClient(e.to_string()))?;

        let fetcher = Fetcher::new(
            client.clone(),
            config.fetch_timeout_secs,
            config.error_message_limit,
        );
        let uploader = Uploader::new(
            client,
            config.upload_endpoint.clone(),
            api_key,
            config.upload_timeout_secs,
            config.error_message_limit,
        )
        .with_expiration(config.upload_expiration_secs);

        Ok(Self::new(fetcher, uploader, config.max_dimension))
    }
}

#[async_trait]
impl UnitOfWork for ImageRehoster {
    async fn process(&self, source: &str) -> Result<HostedLink, ItemError> {
        let body = self.fetcher.fetch(source).await?;

        let max = self.max_dimension;
        let png = tokio::task::spawn_blocking(move || transcode::transcode(&body, max))
            .await
            .map_err(|e| ItemError::Unexpected {
                detail: format!("transcode task failed: {e}"),
            })??;

        let link = self.uploader.upload(&png).await?;
        debug!("{} → {}", source.trim(), link.url);
        Ok(link)
    }
}
