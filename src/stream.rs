//! Streaming API: emit row outcomes as soon as they are final.
//!
//! Unlike [`crate::convert::convert_urls`], which returns only after every
//! row finishes, [`convert_stream`] yields [`Outcome`]s through a `Stream`.
//! Outcomes arrive in input order; up to `concurrency` rows run ahead of the
//! consumer, so a slow row holds back only the rows after it.

use crate::config::ConversionConfig;
use crate::error::RelinkError;
use crate::output::Outcome;
use crate::pipeline::batch::run_batch_ordered_stream;
use crate::pipeline::rehost::{ImageRehoster, UnitOfWork};
use std::pin::Pin;
use std::sync::Arc;
use tokio_stream::Stream;
use tracing::info;

/// A boxed stream of row outcomes, in input order.
pub type OutcomeStream = Pin<Box<dyn Stream<Item = Outcome> + Send>>;

/// Re-host `sources`, streaming outcomes in input order.
///
/// The progress callback in `config` is not used; the stream itself is the
/// progress signal.
///
/// # Errors
/// Missing API key or HTTP client failure.
pub fn convert_stream(
    sources: Vec<String>,
    config: &ConversionConfig,
) -> Result<OutcomeStream, RelinkError> {
    let unit: Arc<dyn UnitOfWork> = Arc::new(ImageRehoster::from_config(config)?);
    Ok(convert_stream_with(sources, config, unit))
}

/// Like [`convert_stream`], with a caller-supplied unit-of-work.
pub fn convert_stream_with(
    sources: Vec<String>,
    config: &ConversionConfig,
    unit: Arc<dyn UnitOfWork>,
) -> OutcomeStream {
    info!("Starting streaming conversion: {} rows", sources.len());
    Box::pin(run_batch_ordered_stream(sources, config.concurrency, unit))
}
