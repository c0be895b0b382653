//! Eager (whole-batch) entry points.
//!
//! These wait for every row, then return. Use [`crate::stream::convert_stream`]
//! instead to consume outcomes incrementally.

use crate::config::ConversionConfig;
use crate::error::RelinkError;
use crate::output::{BatchResult, ConversionOutput, ConversionStats};
use crate::pipeline::batch::run_batch;
use crate::pipeline::rehost::{ImageRehoster, UnitOfWork};
use crate::sheet::{self, SheetFormat, Table};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

/// Re-host a list of image URLs.
///
/// Returns one outcome per source, in input order, even when rows fail.
///
/// # Errors
/// Only for fatal setup problems: missing API key, HTTP client failure.
pub async fn convert_urls(
    sources: Vec<String>,
    config: &ConversionConfig,
) -> Result<BatchResult, RelinkError> {
    let unit: Arc<dyn UnitOfWork> = Arc::new(ImageRehoster::from_config(config)?);
    Ok(convert_urls_with(sources, config, unit).await)
}

/// Like [`convert_urls`], with a caller-supplied unit-of-work.
pub async fn convert_urls_with(
    sources: Vec<String>,
    config: &ConversionConfig,
    unit: Arc<dyn UnitOfWork>,
) -> BatchResult {
    run_batch(
        sources,
        config.concurrency,
        unit,
        config.progress_callback.as_ref(),
    )
    .await
}

/// Locate the image column of `table`, re-host it, and write the links back
/// according to `config.write_mode`.
pub async fn convert_table(
    mut table: Table,
    config: &ConversionConfig,
    unit: Arc<dyn UnitOfWork>,
) -> Result<ConversionOutput, RelinkError> {
    let start = Instant::now();
    let idx = sheet::find_image_column(&table, &config.column)?;
    let source_column = table.headers[idx].clone();
    info!(
        "Using column '{}' ({} rows)",
        source_column,
        table.rows.len()
    );

    let batch = convert_urls_with(table.column(idx), config, unit).await;
    let target_column = table.apply(idx, batch.tokens(), &config.write_mode)?;
    let stats = ConversionStats::from_batch(&batch, start.elapsed().as_millis() as u64);

    Ok(ConversionOutput {
        table,
        source_column,
        target_column,
        batch,
        stats,
    })
}

/// Read a sheet (`.csv` or `.xlsx`) and re-host its image column.
///
/// # Errors
/// Sheet missing, unreadable or of an unknown format, no image column,
/// missing API key.
pub async fn convert_file(
    input: impl AsRef<Path>,
    config: &ConversionConfig,
) -> Result<ConversionOutput, RelinkError> {
    let input = input.as_ref();
    info!("Starting conversion: {}", input.display());

    let table = sheet::read_sheet(input, config.delimiter)?;
    // Fail on a bad column before validating credentials or touching the network.
    sheet::find_image_column(&table, &config.column)?;
    let unit: Arc<dyn UnitOfWork> = Arc::new(ImageRehoster::from_config(config)?);

    let output = convert_table(table, config, unit).await?;
    info!(
        "Conversion complete: {}/{} rows uploaded, {}ms total",
        output.stats.uploaded, output.stats.total_rows, output.stats.duration_ms
    );
    Ok(output)
}

/// Convert a sheet and write the result to `output_path`.
///
/// The output format follows the extension of `output_path`, so reading a
/// workbook and writing CSV (or the reverse) works. Uses atomic write
/// (temp file + rename) to prevent partial files; the result keeps the
/// input file's permissions.
pub async fn convert_to_file(
    input: impl AsRef<Path>,
    output_path: impl AsRef<Path>,
    config: &ConversionConfig,
) -> Result<ConversionOutput, RelinkError> {
    let input = input.as_ref().to_path_buf();
    let path = output_path.as_ref().to_path_buf();
    // An unwritable output format must fail before any upload happens.
    SheetFormat::from_path(&path)?;

    let output = convert_file(&input, config).await?;
    let table = output.table.clone();
    tokio::task::spawn_blocking(move || {
        sheet::write_sheet(&table, &path, Some(input.as_path()))
    })
    .await
    .map_err(|e| RelinkError::Internal(format!("Write task panicked: {e}")))??;
    Ok(output)
}

/// Synchronous wrapper around [`convert_file`].
///
/// Creates a temporary tokio runtime internally.
pub fn convert_sync(
    input: impl AsRef<Path>,
    config: &ConversionConfig,
) -> Result<ConversionOutput, RelinkError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| RelinkError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(convert_file(input, config))
}

/// Default output path: `<stem>_relinked.<ext>` next to the input, keeping
/// the input's sheet format (`csv` when the extension is unknown).
pub fn default_output_path(input: &Path) -> std::path::PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    let ext = input
        .extension()
        .and_then(|e| e.to_str())
        .filter(|_| SheetFormat::from_path(input).is_ok())
        .unwrap_or("csv");
    input.with_file_name(format!("{stem}_relinked.{ext}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_output_path_sits_next_to_input() {
        assert_eq!(
            default_output_path(Path::new("/data/catalogue.csv")),
            Path::new("/data/catalogue_relinked.csv")
        );
        assert_eq!(
            default_output_path(Path::new("sheet")),
            Path::new("sheet_relinked.csv")
        );
    }

    #[test]
    fn default_output_path_keeps_sheet_format() {
        assert_eq!(
            default_output_path(Path::new("/data/catalogue.xlsx")),
            Path::new("/data/catalogue_relinked.xlsx")
        );
        assert_eq!(
            default_output_path(Path::new("export.TSV")),
            Path::new("export_relinked.TSV")
        );
        assert_eq!(
            default_output_path(Path::new("notes.pdf")),
            Path::new("notes_relinked.csv")
        );
    }

    #[tokio::test]
    async fn unknown_output_format_fails_before_reading() {
        let config = ConversionConfig::default();
        let err = convert_to_file("/no/such/input.csv", "/tmp/out.ods", &config)
            .await
            .unwrap_err();
        assert!(matches!(err, RelinkError::UnsupportedFormat { .. }), "{err}");
    }

    #[tokio::test]
    async fn convert_urls_without_key_is_fatal() {
        let config = ConversionConfig::default();
        let err = convert_urls(vec!["http://x/a.jpg".into()], &config)
            .await
            .unwrap_err();
        assert!(matches!(err, RelinkError::MissingApiKey));
    }
}
