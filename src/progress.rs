//! Progress-callback trait for per-row batch events.
//!
//! Inject an [`Arc<dyn ConversionProgressCallback>`] via
//! [`crate::config::ConversionConfigBuilder::progress_callback`] to receive
//! events as the pipeline finishes each row.
//!
//! Progress is advisory: the callback observes the batch but never influences
//! the ordered result. The `completed` counter passed to the per-row methods
//! rises by exactly one per call, from 1 to `total`.
//!
//! # Example
//!
//! ```rust
//! use sheet_relink::{ConversionProgressCallback, ConversionConfig};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     failures: AtomicUsize,
//! }
//!
//! impl ConversionProgressCallback for CountingCallback {
//!     fn on_item_error(&self, completed: usize, total: usize, index: usize, error: &str) {
//!         self.failures.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("[{completed}/{total}] row {index}: {error}");
//!     }
//! }
//!
//! let counter = Arc::new(CountingCallback { failures: AtomicUsize::new(0) });
//!
//! let config = ConversionConfig::builder()
//!     .progress_callback(counter as Arc<dyn ConversionProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the batch pipeline as it processes each row.
///
/// Implementations must be `Send + Sync`: rows run concurrently and
/// `on_item_start` may be called from several worker threads at once. All
/// methods have default no-op implementations so callers only override what
/// they care about.
pub trait ConversionProgressCallback: Send + Sync {
    /// Called once before any row is dispatched.
    fn on_batch_start(&self, total: usize) {
        let _ = total;
    }

    /// Called when a worker picks up a non-blank row.
    fn on_item_start(&self, index: usize, total: usize) {
        let _ = (index, total);
    }

    /// Called when a row was uploaded.
    ///
    /// # Arguments
    /// * `completed`: rows finished so far, this one included
    /// * `total`: rows in the batch
    /// * `index`: 0-indexed row position
    /// * `link`: hosted URL
    fn on_item_complete(&self, completed: usize, total: usize, index: usize, link: &str) {
        let _ = (completed, total, index, link);
    }

    /// Called when a row failed; `error` is human-readable.
    fn on_item_error(&self, completed: usize, total: usize, index: usize, error: &str) {
        let _ = (completed, total, index, error);
    }

    /// Called for a blank row that was skipped without any network call.
    fn on_item_skipped(&self, completed: usize, total: usize, index: usize) {
        let _ = (completed, total, index);
    }

    /// Called exactly once after every row has an outcome, also for an
    /// empty batch.
    fn on_batch_complete(&self, total: usize, success_count: usize) {
        let _ = (total, success_count);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl ConversionProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ConversionConfig`].
pub type ProgressCallback = Arc<dyn ConversionProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct TrackingCallback {
        starts: AtomicUsize,
        completes: AtomicUsize,
        errors: AtomicUsize,
        skipped: AtomicUsize,
        last_completed: AtomicUsize,
    }

    impl ConversionProgressCallback for TrackingCallback {
        fn on_item_start(&self, _index: usize, _total: usize) {
            self.starts.fetch_add(1, Ordering::SeqCst);
        }

        fn on_item_complete(&self, completed: usize, _total: usize, _index: usize, _link: &str) {
            self.completes.fetch_add(1, Ordering::SeqCst);
            self.last_completed.store(completed, Ordering::SeqCst);
        }

        fn on_item_error(&self, completed: usize, _total: usize, _index: usize, _error: &str) {
            self.errors.fetch_add(1, Ordering::SeqCst);
            self.last_completed.store(completed, Ordering::SeqCst);
        }

        fn on_item_skipped(&self, completed: usize, _total: usize, _index: usize) {
            self.skipped.fetch_add(1, Ordering::SeqCst);
            self.last_completed.store(completed, Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_batch_start(3);
        cb.on_item_start(0, 3);
        cb.on_item_complete(1, 3, 0, "https://i.ibb.co/x.png");
        cb.on_item_error(2, 3, 1, "Err: timeout");
        cb.on_item_skipped(3, 3, 2);
        cb.on_batch_complete(3, 1);
    }

    #[test]
    fn tracking_callback_receives_events() {
        let tracker = TrackingCallback::default();
        tracker.on_item_start(0, 3);
        tracker.on_item_complete(1, 3, 0, "a");
        tracker.on_item_skipped(2, 3, 1);
        tracker.on_item_start(2, 3);
        tracker.on_item_error(3, 3, 2, "boom");

        assert_eq!(tracker.starts.load(Ordering::SeqCst), 2);
        assert_eq!(tracker.completes.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.skipped.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.errors.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.last_completed.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn arc_dyn_callback_works() {
        let cb: ProgressCallback = Arc::new(NoopProgressCallback);
        cb.on_batch_start(10);
        cb.on_item_complete(1, 10, 4, "link");
    }
}
