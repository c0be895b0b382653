//! # sheet-relink
//!
//! Re-host every image of a spreadsheet as PNG on an image-hosting API and
//! get the sheet back with the hosted links substituted in.
//!
//! ## Pipeline Overview
//!
//! ```text
//! CSV / XLSX
//!  │
//!  ├─ 1. Sheet      parse (csv or calamine), locate the image column
//!  ├─ 2. Batch      up to N rows in flight, results kept in row order
//!  │    ├─ Fetch      GET the source URL (per-call timeout)
//!  │    ├─ Transcode  decode → RGB → shrink to bound → PNG (spawn_blocking)
//!  │    └─ Upload     base64 form POST → hosted URL
//!  └─ 3. Output     links (or error tokens) written back, sheet saved atomically
//! ```
//!
//! A row never aborts the batch. Failures are kept as [`ItemError`] values
//! and only rendered as the legacy cell tokens (`Err: …`,
//! `Format Image Invalide`, `Err API: …`, `Erreur`) when written back.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use sheet_relink::{convert_to_file, ConversionConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ConversionConfig::builder()
//!         .api_key(std::env::var("IMGBB_API_KEY")?)
//!         .build()?;
//!     let output = convert_to_file("products.csv", "products_relinked.csv", &config).await?;
//!     eprintln!("{} uploaded, {} failed", output.stats.uploaded, output.stats.failed);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `relink` binary (clap + anyhow + tracing-subscriber + indicatif) |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod convert;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod sheet;
pub mod stream;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ColumnSelection, ConversionConfig, ConversionConfigBuilder, WriteMode};
pub use convert::{
    convert_file, convert_sync, convert_table, convert_to_file, convert_urls, convert_urls_with,
    default_output_path,
};
pub use error::{ErrorKind, ItemError, RelinkError};
pub use output::{
    is_error_token, BatchResult, ConversionOutput, ConversionStats, HostedLink, Outcome, WorkItem,
};
pub use pipeline::batch::{run_batch, run_batch_ordered_stream};
pub use pipeline::rehost::{ImageRehoster, UnitOfWork};
pub use progress::{ConversionProgressCallback, NoopProgressCallback, ProgressCallback};
pub use sheet::{SheetFormat, Table};
pub use stream::{convert_stream, convert_stream_with, OutcomeStream};
