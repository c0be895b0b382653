//! Integration tests for the ordered batch pipeline.
//!
//! The unit-of-work is stubbed so these run offline and fast; each stub is
//! instrumented for the property under test (call counts, in-flight gauge,
//! scripted panics, randomized delays).

use async_trait::async_trait;
use futures::StreamExt;
use sheet_relink::sheet::{self, Table};
use sheet_relink::{
    convert_stream_with, convert_table, is_error_token, run_batch, ConversionConfig,
    ConversionProgressCallback, HostedLink, ItemError, ProgressCallback, UnitOfWork, WriteMode,
};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

// ── Test helpers ─────────────────────────────────────────────────────────────

/// Pseudo-random but reproducible delay in `0..max_ms` for `key`.
fn jitter(key: &str, salt: u64, max_ms: u64) -> Duration {
    let mut h = DefaultHasher::new();
    key.hash(&mut h);
    salt.hash(&mut h);
    Duration::from_millis(h.finish() % max_ms)
}

/// What the stubbed unit answers for `source`.
fn expected(source: &str) -> Result<HostedLink, ItemError> {
    if source.contains("bad") {
        Err(ItemError::HttpStatus { status: 404 })
    } else {
        Ok(HostedLink::new(format!(
            "https://host/{}.png",
            source.rsplit('/').next().unwrap_or(source)
        )))
    }
}

/// Answers [`expected`] after a jittered delay; counts calls.
struct Scripted {
    salt: u64,
    calls: AtomicUsize,
}

impl Scripted {
    fn new(salt: u64) -> Arc<Self> {
        Arc::new(Self {
            salt,
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl UnitOfWork for Scripted {
    async fn process(&self, source: &str) -> Result<HostedLink, ItemError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(jitter(source, self.salt, 15)).await;
        expected(source)
    }
}

/// Records the highest number of simultaneously active calls.
#[derive(Default)]
struct Gauge {
    active: AtomicUsize,
    peak: AtomicUsize,
}

#[async_trait]
impl UnitOfWork for Gauge {
    async fn process(&self, source: &str) -> Result<HostedLink, ItemError> {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(jitter(source, 7, 10) + Duration::from_millis(2)).await;
        self.active.fetch_sub(1, Ordering::SeqCst);
        Ok(HostedLink::new(source))
    }
}

/// Panics for any source containing "boom".
struct Panicky;

#[async_trait]
impl UnitOfWork for Panicky {
    async fn process(&self, source: &str) -> Result<HostedLink, ItemError> {
        if source.contains("boom") {
            panic!("unit-of-work blew up on {source}");
        }
        Ok(HostedLink::new(format!("ok:{source}")))
    }
}

fn urls(n: usize) -> Vec<String> {
    (0..n)
        .map(|i| {
            if i % 3 == 2 {
                format!("http://bad/{i}")
            } else {
                format!("http://good/{i}")
            }
        })
        .collect()
}

#[derive(Default)]
struct Recorder {
    completed: Mutex<Vec<usize>>,
    batch_complete_calls: AtomicUsize,
    totals: Mutex<Vec<usize>>,
}

impl ConversionProgressCallback for Recorder {
    fn on_batch_start(&self, total: usize) {
        self.totals.lock().unwrap().push(total);
    }
    fn on_item_complete(&self, completed: usize, _total: usize, _index: usize, _link: &str) {
        self.completed.lock().unwrap().push(completed);
    }
    fn on_item_error(&self, completed: usize, _total: usize, _index: usize, _error: &str) {
        self.completed.lock().unwrap().push(completed);
    }
    fn on_item_skipped(&self, completed: usize, _total: usize, _index: usize) {
        self.completed.lock().unwrap().push(completed);
    }
    fn on_batch_complete(&self, _total: usize, _success_count: usize) {
        self.batch_complete_calls.fetch_add(1, Ordering::SeqCst);
    }
}

// ── Length and ordering ──────────────────────────────────────────────────────

#[tokio::test]
async fn result_length_always_matches_input() {
    for n in [0usize, 1, 2, 7, 50] {
        let batch = run_batch(urls(n), 4, Scripted::new(n as u64), None).await;
        assert_eq!(batch.len(), n, "N = {n}");
        assert_eq!(batch.failed_count(), n / 3, "N = {n}");
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn order_is_stable_under_random_completion() {
    let sources = urls(40);
    for salt in 0..5u64 {
        let batch = run_batch(sources.clone(), 6, Scripted::new(salt), None).await;
        for (i, outcome) in batch.outcomes().iter().enumerate() {
            assert_eq!(outcome.index, i);
            assert_eq!(
                outcome.result.clone().map(|l| l.map(|l| l.url)),
                expected(&sources[i]).map(|l| Some(l.url)),
                "salt {salt}, row {i}"
            );
        }
    }
}

// ── Blank sources ────────────────────────────────────────────────────────────

#[tokio::test]
async fn blank_sources_skip_the_unit() {
    let unit = Scripted::new(1);
    let sources = vec![
        "".to_string(),
        "http://good/a".to_string(),
        "   ".to_string(),
        "\t\n".to_string(),
        "http://good/b".to_string(),
    ];
    let batch = run_batch(sources, 3, unit.clone(), None).await;

    assert_eq!(
        batch.tokens(),
        vec!["", "https://host/a.png", "", "", "https://host/b.png"]
    );
    assert_eq!(unit.calls.load(Ordering::SeqCst), 2);
    assert_eq!(batch.skipped_count(), 3);
}

// ── Failure containment ──────────────────────────────────────────────────────

#[tokio::test]
async fn panic_is_contained_to_its_row() {
    let sources: Vec<String> = ["a", "b", "boom", "c", "boom-again", "d"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    let batch = run_batch(sources, 2, Arc::new(Panicky), None).await;

    assert_eq!(
        batch.tokens(),
        vec!["ok:a", "ok:b", "Erreur Fatal", "ok:c", "Erreur Fatal", "ok:d"]
    );
    assert_eq!(batch.outcomes()[2].result, Err(ItemError::Panicked));
    assert_eq!(batch.failed_count(), 2);
}

#[tokio::test]
async fn failure_summary_is_computable_from_tokens() {
    let batch = run_batch(urls(9), 3, Scripted::new(3), None).await;
    let tokens = batch.tokens();
    let failures = tokens.iter().filter(|t| is_error_token(t)).count();
    assert_eq!(failures, batch.failed_count());
    assert_eq!(failures, 3);
}

// ── Concurrency bound ────────────────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrency_limit_is_respected() {
    for w in [1usize, 3, 8] {
        let gauge = Arc::new(Gauge::default());
        let sources: Vec<String> = (0..30).map(|i| format!("u{i}")).collect();
        let batch = run_batch(sources, w, gauge.clone(), None).await;

        let peak = gauge.peak.load(Ordering::SeqCst);
        assert_eq!(batch.len(), 30);
        assert!(peak <= w, "W = {w}, peak = {peak}");
        assert!(peak >= 1);
        assert_eq!(gauge.active.load(Ordering::SeqCst), 0);
    }
}

// ── Progress ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn progress_counts_every_row_once_in_order() {
    let recorder = Arc::new(Recorder::default());
    let cb: ProgressCallback = recorder.clone();
    let mut sources = urls(10);
    sources[4] = String::new();

    run_batch(sources, 4, Scripted::new(9), Some(&cb)).await;

    let completed = recorder.completed.lock().unwrap().clone();
    assert_eq!(completed, (1..=10).collect::<Vec<_>>());
    assert_eq!(*recorder.totals.lock().unwrap(), vec![10]);
    assert_eq!(recorder.batch_complete_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn progress_completes_for_empty_batch() {
    let recorder = Arc::new(Recorder::default());
    let cb: ProgressCallback = recorder.clone();
    run_batch(vec![], 4, Scripted::new(0), Some(&cb)).await;
    assert_eq!(recorder.batch_complete_calls.load(Ordering::SeqCst), 1);
    assert!(recorder.completed.lock().unwrap().is_empty());
}

// ── End-to-end scenario ──────────────────────────────────────────────────────

#[tokio::test]
async fn good_blank_bad_scenario() {
    let sources = vec![
        "http://good/a.jpg".to_string(),
        String::new(),
        "http://bad/b.jpg".to_string(),
    ];
    let batch = run_batch(sources, 2, Scripted::new(0), None).await;
    let tokens = batch.tokens();

    assert_eq!(tokens[0], "https://host/a.jpg.png");
    assert_eq!(tokens[1], "");
    assert_eq!(tokens[2], "Err: HTTP 404");
    assert!(is_error_token(&tokens[2]));
}

// ── Sheet-level conversion ───────────────────────────────────────────────────

fn sample_table() -> Table {
    sheet::parse_csv(
        b"sku;Image;name\n1;http://good/a;alpha\n2;;beta\n3;http://bad/c;gamma\n",
        None,
    )
    .unwrap()
}

#[tokio::test]
async fn convert_table_replaces_column() {
    let config = ConversionConfig::builder().concurrency(2).build().unwrap();
    let out = convert_table(sample_table(), &config, Scripted::new(2))
        .await
        .unwrap();

    assert_eq!(out.source_column, "Image");
    assert_eq!(out.target_column, "Image");
    assert_eq!(out.table.headers, vec!["sku", "Image", "name"]);
    assert_eq!(
        out.table.column(1),
        vec!["https://host/a.png", "", "Err: HTTP 404"]
    );
    assert_eq!(out.table.column(2), vec!["alpha", "beta", "gamma"]);
    assert_eq!(out.stats.uploaded, 1);
    assert_eq!(out.stats.skipped, 1);
    assert_eq!(out.stats.failed, 1);
}

#[tokio::test]
async fn convert_table_appends_column_and_roundtrips_file() {
    let config = ConversionConfig::builder()
        .write_mode(WriteMode::Append("hosted".into()))
        .build()
        .unwrap();
    let out = convert_table(sample_table(), &config, Scripted::new(5))
        .await
        .unwrap();

    assert_eq!(out.table.headers, vec!["sku", "Image", "name", "hosted"]);
    assert_eq!(out.table.column(1), vec!["http://good/a", "", "http://bad/c"]);

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("out.csv");
    sheet::write_sheet(&out.table, &path, None).unwrap();
    let written = std::fs::read_to_string(&path).unwrap();
    assert_eq!(
        written,
        "sku;Image;name;hosted\n\
         1;http://good/a;alpha;https://host/a.png\n\
         2;;beta;\n\
         3;http://bad/c;gamma;Err: HTTP 404\n"
    );
}

// ── Streaming ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn stream_yields_in_input_order() {
    let config = ConversionConfig::builder().concurrency(4).build().unwrap();
    let sources = urls(12);
    let outcomes: Vec<_> = convert_stream_with(sources.clone(), &config, Scripted::new(11))
        .collect()
        .await;

    assert_eq!(outcomes.len(), 12);
    for (i, o) in outcomes.iter().enumerate() {
        assert_eq!(o.index, i);
        assert_eq!(o.is_failure(), sources[i].contains("bad"));
    }
}

#[test]
fn batch_runs_under_plain_block_on() {
    let batch = tokio_test::block_on(run_batch(urls(4), 2, Scripted::new(4), None));
    assert_eq!(batch.len(), 4);
    assert_eq!(batch.tokens()[2], "Err: HTTP 404");
}
