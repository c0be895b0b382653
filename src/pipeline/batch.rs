//! Ordered parallel batch: run a [`UnitOfWork`] over N sources with at most W
//! in flight, and hand back N outcomes in input order.
//!
//! Rows finish in whatever order the network allows. Each outcome carries
//! its row index and lands in a preallocated slot at that index, so the
//! completion order never leaks into the result. A slot is written exactly
//! once, by the loop that drains the worker stream.
//!
//! Every unit-of-work call runs in its own `tokio::spawn`ed task. A panic
//! surfaces as a `JoinError` at the dispatch boundary and is recorded as
//! [`ItemError::Panicked`] for that row alone.

use crate::error::ItemError;
use crate::output::{BatchResult, Outcome, WorkItem};
use crate::pipeline::rehost::UnitOfWork;
use crate::progress::ProgressCallback;
use futures::stream::{self, Stream, StreamExt};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Run `unit` over every source, `concurrency` rows at a time.
///
/// Blank sources are answered with [`Outcome::skipped`] and never reach
/// `unit`. Returns once every row has an outcome; the result always has
/// `sources.len()` entries.
pub async fn run_batch(
    sources: Vec<String>,
    concurrency: usize,
    unit: Arc<dyn UnitOfWork>,
    progress: Option<&ProgressCallback>,
) -> BatchResult {
    let start = Instant::now();
    let total = sources.len();
    let concurrency = concurrency.max(1);
    info!("Starting batch: {} rows, concurrency {}", total, concurrency);

    if let Some(cb) = progress {
        cb.on_batch_start(total);
    }

    let mut slots: Vec<Option<Outcome>> = (0..total).map(|_| None).collect();
    let mut completed = 0usize;
    let mut pending = Vec::with_capacity(total);

    for (index, source) in sources.into_iter().enumerate() {
        let item = WorkItem::new(index, source);
        if item.is_blank() {
            completed += 1;
            slots[index] = Some(Outcome::skipped(index));
            if let Some(cb) = progress {
                cb.on_item_skipped(completed, total, index);
            }
        } else {
            pending.push(item);
        }
    }
    debug!("{} blank rows skipped, {} dispatched", completed, pending.len());

    let mut in_flight = stream::iter(pending.into_iter().map(|item| {
        dispatch(Arc::clone(&unit), item, total, progress.cloned())
    }))
    .buffer_unordered(concurrency);

    while let Some(outcome) = in_flight.next().await {
        completed += 1;
        let index = outcome.index;
        match &outcome.result {
            Ok(Some(link)) => {
                if let Some(cb) = progress {
                    cb.on_item_complete(completed, total, index, &link.url);
                }
            }
            Ok(None) => {
                if let Some(cb) = progress {
                    cb.on_item_skipped(completed, total, index);
                }
            }
            Err(e) => {
                warn!("Row {}: {}", index + 1, e);
                if let Some(cb) = progress {
                    cb.on_item_error(completed, total, index, &e.to_string());
                }
            }
        }
        slots[index] = Some(outcome);
    }

    let batch = BatchResult::from_slots(slots);
    info!(
        "Batch complete: {}/{} uploaded, {} failed, {} skipped in {}ms",
        batch.success_count(),
        total,
        batch.failed_count(),
        batch.skipped_count(),
        start.elapsed().as_millis()
    );

    if let Some(cb) = progress {
        cb.on_batch_complete(total, batch.success_count());
    }
    batch
}

/// Like [`run_batch`], but yields outcomes as a stream in input order.
///
/// Up to `concurrency` rows run ahead of the consumer; outcome `i` is
/// yielded only after outcomes `0..i`.
pub fn run_batch_ordered_stream(
    sources: Vec<String>,
    concurrency: usize,
    unit: Arc<dyn UnitOfWork>,
) -> impl Stream<Item = Outcome> + Send + 'static {
    let total = sources.len();
    stream::iter(sources.into_iter().enumerate().map(move |(index, source)| {
        let unit = Arc::clone(&unit);
        async move {
            let item = WorkItem::new(index, source);
            if item.is_blank() {
                Outcome::skipped(index)
            } else {
                dispatch(unit, item, total, None).await
            }
        }
    }))
    .buffered(concurrency.max(1))
}

/// Run one row in its own task and turn a panic into an outcome.
async fn dispatch(
    unit: Arc<dyn UnitOfWork>,
    item: WorkItem,
    total: usize,
    progress: Option<ProgressCallback>,
) -> Outcome {
    let WorkItem { index, source } = item;
    if let Some(ref cb) = progress {
        cb.on_item_start(index, total);
    }

    let handle = tokio::spawn(async move { unit.process(&source).await });
    let result = match handle.await {
        Ok(result) => result.map(Some),
        Err(e) if e.is_panic() => {
            warn!("Row {}: unit-of-work panicked", index + 1);
            Err(ItemError::Panicked)
        }
        Err(e) => Err(ItemError::Unexpected {
            detail: e.to_string(),
        }),
    };

    Outcome { index, result }
}
