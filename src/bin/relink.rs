//! CLI binary for sheet-relink.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `ConversionConfig` and prints results.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use sheet_relink::config::DEFAULT_UPLOAD_ENDPOINT;
use sheet_relink::{
    convert_to_file, default_output_path, ColumnSelection, ConversionConfig, ConversionOutput,
    ConversionProgressCallback, ProgressCallback, WriteMode,
};
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: a live bar plus one log line per finished
/// row. Rows complete out of order; the bar tracks the completed count.
struct CliProgressCallback {
    bar: ProgressBar,
    /// Per-row wall-clock start times for elapsed reporting.
    start_times: Mutex<HashMap<usize, Instant>>,
}

impl CliProgressCallback {
    fn new_dynamic() -> Arc<Self> {
        let bar = ProgressBar::new(0); // length set in on_batch_start
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);

        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Reading sheet…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            start_times: Mutex::new(HashMap::new()),
        })
    }

    fn activate_bar(&self, total: usize) {
        let progress_style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>4}/{len} rows  \
             ⏱ {elapsed_precise}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        self.bar.set_length(total as u64);
        self.bar.set_style(progress_style);
        self.bar.set_prefix("Relinking");
        self.bar.reset_eta();
    }

    fn elapsed_secs(&self, index: usize) -> f64 {
        self.start_times
            .lock()
            .ok()
            .and_then(|mut m| m.remove(&index))
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }
}

impl ConversionProgressCallback for CliProgressCallback {
    fn on_batch_start(&self, total: usize) {
        self.activate_bar(total);
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Re-hosting {total} rows…"))
        ));
    }

    fn on_item_start(&self, index: usize, _total: usize) {
        if let Ok(mut m) = self.start_times.lock() {
            m.insert(index, Instant::now());
        }
    }

    fn on_item_complete(&self, completed: usize, _total: usize, index: usize, link: &str) {
        let elapsed = self.elapsed_secs(index);
        self.bar.println(format!(
            "  {} Row {:>4}  {}  {}",
            green("✓"),
            index + 1,
            dim(link),
            dim(&format!("{elapsed:.1}s")),
        ));
        self.bar.set_position(completed as u64);
    }

    fn on_item_error(&self, completed: usize, _total: usize, index: usize, error: &str) {
        let elapsed = self.elapsed_secs(index);

        // Truncate very long error messages to keep output tidy.
        let msg = if error.chars().count() > 80 {
            format!("{}\u{2026}", error.chars().take(79).collect::<String>())
        } else {
            error.to_string()
        };

        self.bar.println(format!(
            "  {} Row {:>4}  {}  {}",
            red("✗"),
            index + 1,
            red(&msg),
            dim(&format!("{elapsed:.1}s")),
        ));
        self.bar.set_position(completed as u64);
    }

    fn on_item_skipped(&self, completed: usize, _total: usize, _index: usize) {
        self.bar.set_position(completed as u64);
    }

    fn on_batch_complete(&self, _total: usize, _success_count: usize) {
        // The run summary is printed once by `main`, after the write.
        self.bar.finish_and_clear();
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Replace the 'image' column in place (writes products_relinked.csv)
  relink products.csv

  # Workbooks work the same way (writes catalogue_relinked.xlsx)
  relink catalogue.xlsx

  # Keep the source URLs and add a new column
  relink products.csv --append-column hosted_image -o out.csv

  # Pick the column explicitly, by name or 1-indexed position
  relink --column visuel catalogue.csv
  relink --column '#3' catalogue.csv

  # Keep original size, 16 rows at a time
  relink --no-resize -c 16 products.csv

  # Fail (exit 1) if any row could not be re-hosted
  relink --strict products.csv

CELL VALUES WRITTEN BACK:
  https://i.ibb.co/…        uploaded
  (empty)                   source cell was empty
  Err: <message>            download failed (network, timeout, HTTP status)
  Format Image Invalide     downloaded content is not an image
  Err API: <message>        the hosting API rejected the upload
  Erreur / Erreur Fatal     unexpected failure

ENVIRONMENT VARIABLES:
  IMGBB_API_KEY           Image-hosting API key (required)
  RELINK_CONCURRENCY      Rows processed in parallel
  RELINK_MAX_SIZE         Longest PNG edge in pixels
  RUST_LOG                Override log filter (e.g. sheet_relink=debug)
"#;

/// Re-host every image of a spreadsheet as PNG and write the links back.
#[derive(Parser, Debug)]
#[command(
    name = "relink",
    version,
    about = "Re-host the images of a spreadsheet as PNG and write the hosted links back",
    long_about = "Downloads every image URL of a spreadsheet column, re-encodes it to PNG \
(optionally downscaled), uploads it to an ImgBB-compatible hosting API, and writes the \
hosted links into the sheet in the original row order.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Input sheet (.csv or .xlsx).
    input: PathBuf,

    /// Output path; its extension picks the format. Default: <input>_relinked.<ext>.
    #[arg(short, long, env = "RELINK_OUTPUT")]
    output: Option<PathBuf>,

    /// Image-hosting API key.
    #[arg(long, env = "IMGBB_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Number of rows processed concurrently.
    #[arg(short, long, env = "RELINK_CONCURRENCY", default_value_t = 8)]
    concurrency: usize,

    /// Longest edge of the re-encoded PNG, in pixels.
    #[arg(long, env = "RELINK_MAX_SIZE", default_value_t = 1000,
          value_parser = clap::value_parser!(u32).range(16..))]
    max_size: u32,

    /// Keep the original image size.
    #[arg(long, env = "RELINK_NO_RESIZE")]
    no_resize: bool,

    /// Image column: a header name, or '#N' for the N-th column (1-indexed).
    #[arg(long, env = "RELINK_COLUMN")]
    column: Option<String>,

    /// Write links into a new column with this header instead of replacing.
    #[arg(long, env = "RELINK_APPEND_COLUMN")]
    append_column: Option<String>,

    /// CSV delimiter: ',', ';', '|', or 'tab'. Default: sniffed. Ignored for .xlsx.
    #[arg(long, env = "RELINK_DELIMITER")]
    delimiter: Option<String>,

    /// Per-download timeout in seconds.
    #[arg(long, env = "RELINK_FETCH_TIMEOUT", default_value_t = 10)]
    fetch_timeout: u64,

    /// Per-upload timeout in seconds (minimum 20).
    #[arg(long, env = "RELINK_UPLOAD_TIMEOUT", default_value_t = 30)]
    upload_timeout: u64,

    /// Upload endpoint.
    #[arg(long, env = "RELINK_ENDPOINT", default_value = DEFAULT_UPLOAD_ENDPOINT)]
    endpoint: String,

    /// Ask the host to delete uploads after this many seconds.
    #[arg(long, env = "RELINK_EXPIRATION")]
    expiration: Option<u64>,

    /// Print the structured result (stats, per-row outcomes) as JSON on stdout.
    #[arg(long, env = "RELINK_JSON")]
    json: bool,

    /// Exit with an error if any row failed.
    #[arg(long, env = "RELINK_STRICT")]
    strict: bool,

    /// Disable progress bar.
    #[arg(long, env = "RELINK_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "RELINK_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "RELINK_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // Suppress INFO-level library logs when the progress bar is active;
    // the bar provides all the feedback that matters to the user.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let bar = show_progress.then(CliProgressCallback::new_dynamic);
    let output_path = cli
        .output
        .clone()
        .unwrap_or_else(|| default_output_path(&cli.input));

    // ── Run conversion ───────────────────────────────────────────────────
    let output = run(&cli, &output_path, bar).await?;

    if cli.json {
        let json = serde_json::to_string_pretty(&serde_json::json!({
            "output": output_path,
            "source_column": output.source_column,
            "target_column": output.target_column,
            "stats": output.stats,
            "outcomes": output.batch.outcomes(),
        }))
        .context("Failed to serialise output")?;
        println!("{json}");
    }

    if !cli.quiet {
        eprintln!("{}", summary_line(&output, &output_path));
    }

    if cli.strict {
        output
            .batch
            .into_result()
            .context("Strict mode: some rows were not re-hosted")?;
    }

    Ok(())
}

/// Build the config and convert. The progress bar is cleared on every
/// exit path, including setup errors raised before the batch starts.
async fn run(
    cli: &Cli,
    output_path: &Path,
    bar: Option<Arc<CliProgressCallback>>,
) -> Result<ConversionOutput> {
    let progress = bar.clone().map(|cb| cb as ProgressCallback);
    let result = match build_config(cli, progress) {
        Ok(config) => convert_to_file(&cli.input, output_path, &config)
            .await
            .context("Conversion failed"),
        Err(e) => Err(e),
    };
    if let Some(cb) = bar {
        cb.bar.finish_and_clear();
    }
    result
}

/// One-line run summary: uploads, failures, blanks, timing, columns, output.
fn summary_line(output: &ConversionOutput, output_path: &Path) -> String {
    let stats = &output.stats;
    let mark = if stats.failed == 0 {
        green("✔")
    } else if stats.uploaded == 0 {
        red("✘")
    } else {
        cyan("⚠")
    };
    let failed = if stats.failed == 0 {
        "0 failed".to_string()
    } else {
        red(&format!("{} failed", stats.failed))
    };
    format!(
        "{}  {}/{} rows uploaded  ({}, {} empty)  {}ms  '{}' → '{}'  →  {}",
        mark,
        bold(&stats.uploaded.to_string()),
        stats.total_rows,
        failed,
        stats.skipped,
        stats.duration_ms,
        output.source_column,
        output.target_column,
        bold(&output_path.display().to_string()),
    )
}

/// Map CLI args to `ConversionConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<ConversionConfig> {
    let column = match cli.column {
        Some(ref c) => parse_column(c)?,
        None => ColumnSelection::Auto,
    };
    let write_mode = match cli.append_column {
        Some(ref name) => WriteMode::Append(name.clone()),
        None => WriteMode::Replace,
    };
    let delimiter = cli.delimiter.as_deref().map(parse_delimiter).transpose()?;

    let mut builder = ConversionConfig::builder()
        .concurrency(cli.concurrency)
        .max_dimension((!cli.no_resize).then_some(cli.max_size))
        .fetch_timeout_secs(cli.fetch_timeout)
        .upload_timeout_secs(cli.upload_timeout)
        .upload_endpoint(cli.endpoint.clone())
        .upload_expiration_secs(cli.expiration)
        .column(column)
        .write_mode(write_mode)
        .delimiter(delimiter);

    if let Some(ref key) = cli.api_key {
        builder = builder.api_key(key.clone());
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

/// Parse `--column`: `#N` is a 1-indexed position, anything else a header.
fn parse_column(s: &str) -> Result<ColumnSelection> {
    let s = s.trim();
    if let Some(n) = s.strip_prefix('#') {
        let n: usize = n.trim().parse().context("Invalid column position")?;
        if n < 1 {
            anyhow::bail!("Columns are 1-indexed, minimum is 1 (got {})", n);
        }
        return Ok(ColumnSelection::Index(n - 1));
    }
    if s.is_empty() {
        anyhow::bail!("Column name must not be empty");
    }
    Ok(ColumnSelection::Named(s.to_string()))
}

/// Parse `--delimiter` into a single byte.
fn parse_delimiter(s: &str) -> Result<u8> {
    match s {
        "tab" | "\\t" | "\t" => Ok(b'\t'),
        other if other.len() == 1 => Ok(other.as_bytes()[0]),
        other => anyhow::bail!("Delimiter must be a single ASCII character or 'tab', got '{other}'"),
    }
}
