//! Spreadsheet I/O: sheet in, image column located, hosted links written back.
//!
//! The pipeline itself only sees one column of strings; this module is the
//! glue that gets that column out of a sheet and the results back in. Two
//! on-disk formats are handled, picked by file extension ([`SheetFormat`]):
//! delimited text (`.csv`) and Excel workbooks (`.xlsx`, first worksheet).
//! Row order, the CSV dialect (delimiter, BOM, line ending) and the
//! worksheet name survive a read/write round trip.

use crate::config::{ColumnSelection, WriteMode};
use crate::error::RelinkError;
use crate::pipeline::fetch::is_url;
use calamine::{Reader, Xlsx};
use once_cell::sync::Lazy;
use regex::Regex;
use rust_xlsxwriter::{Format, Workbook};
use serde::{Deserialize, Serialize};
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const CANDIDATE_DELIMITERS: [u8; 4] = [b',', b';', b'\t', b'|'];

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Excel's hard worksheet limits.
const XLSX_MAX_ROWS: usize = 1_048_576;
const XLSX_MAX_COLS: usize = 16_384;

/// Header names that usually hold an image link, as a whole word.
static IMAGE_HEADER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(^|[^a-z])(image|img|photo|picture|url|lien|link)s?([^a-z]|$)")
        .expect("static regex")
});

/// On-disk sheet format, chosen from the file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SheetFormat {
    /// Delimited text. Also used for files without an extension.
    Csv,
    /// Office Open XML workbook; only the first worksheet is read.
    Xlsx,
}

impl SheetFormat {
    pub fn from_path(path: &Path) -> Result<Self, RelinkError> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        match ext.as_deref() {
            None | Some("csv" | "tsv" | "txt") => Ok(Self::Csv),
            Some("xlsx" | "xlsm") => Ok(Self::Xlsx),
            Some(_) => Err(RelinkError::UnsupportedFormat {
                path: path.to_path_buf(),
            }),
        }
    }
}

/// A parsed sheet. Every row has exactly `headers.len()` cells.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
    /// Delimiter the sheet was read with; reused on CSV write.
    pub delimiter: u8,
    /// The input started with a UTF-8 byte-order mark.
    pub bom: bool,
    /// The input used `\r\n` line endings.
    pub crlf: bool,
    /// Worksheet the rows came from, for workbooks.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sheet_name: Option<String>,
}

impl Table {
    /// Build a rectangular table.
    ///
    /// Short rows are padded with empty cells. When a row is longer than the
    /// header, the header is extended with unnamed columns so no cell is lost.
    pub fn new(mut headers: Vec<String>, rows: Vec<Vec<String>>, delimiter: u8) -> Self {
        let width = rows
            .iter()
            .map(Vec::len)
            .max()
            .unwrap_or(0)
            .max(headers.len());
        if width > headers.len() {
            debug!(
                "{} cells beyond the last header; adding unnamed columns",
                width - headers.len()
            );
            headers.resize(width, String::new());
        }
        let rows = rows
            .into_iter()
            .map(|mut row| {
                row.resize(width, String::new());
                row
            })
            .collect();
        Self {
            headers,
            rows,
            delimiter,
            bom: false,
            crlf: false,
            sheet_name: None,
        }
    }

    /// Values of column `idx`, top to bottom.
    pub fn column(&self, idx: usize) -> Vec<String> {
        self.rows
            .iter()
            .map(|row| row.get(idx).cloned().unwrap_or_default())
            .collect()
    }

    /// Write `values` back into the sheet and return the header written to.
    pub fn apply(
        &mut self,
        idx: usize,
        values: Vec<String>,
        mode: &WriteMode,
    ) -> Result<String, RelinkError> {
        if values.len() != self.rows.len() {
            return Err(RelinkError::Internal(format!(
                "{} results for {} rows",
                values.len(),
                self.rows.len()
            )));
        }
        match mode {
            WriteMode::Replace => {
                let header = self
                    .headers
                    .get(idx)
                    .cloned()
                    .ok_or_else(|| RelinkError::Internal(format!("no column #{idx}")))?;
                for (row, value) in self.rows.iter_mut().zip(values) {
                    row[idx] = value;
                }
                Ok(header)
            }
            WriteMode::Append(name) => {
                self.headers.push(name.clone());
                for (row, value) in self.rows.iter_mut().zip(values) {
                    row.push(value);
                }
                Ok(name.clone())
            }
        }
    }
}

/// Pick the delimiter appearing most often, outside quotes, in `first_line`.
///
/// Ties go to the earlier candidate in `, ; \t |`; a line with none of them
/// is a single-column sheet and reads as comma-separated.
pub fn sniff_delimiter(first_line: &str) -> u8 {
    let mut counts = [0usize; CANDIDATE_DELIMITERS.len()];
    let mut in_quotes = false;
    for b in first_line.bytes() {
        if b == b'"' {
            in_quotes = !in_quotes;
        } else if !in_quotes {
            if let Some(pos) = CANDIDATE_DELIMITERS.iter().position(|&d| d == b) {
                counts[pos] += 1;
            }
        }
    }
    let mut best = 0;
    for (i, &count) in counts.iter().enumerate() {
        if count > counts[best] {
            best = i;
        }
    }
    CANDIDATE_DELIMITERS[best]
}

/// Parse CSV bytes. `delimiter: None` sniffs it from the first line.
pub fn parse_csv(bytes: &[u8], delimiter: Option<u8>) -> Result<Table, csv::Error> {
    let bom = bytes.starts_with(UTF8_BOM);
    let bytes = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
    let first = bytes.split(|&b| b == b'\n').next().unwrap_or_default();
    let crlf = first.len() < bytes.len() && first.ends_with(b"\r");
    let delimiter =
        delimiter.unwrap_or_else(|| sniff_delimiter(&String::from_utf8_lossy(first)));

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .flexible(true)
        .from_reader(bytes);

    let headers: Vec<String> = reader
        .headers()?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();
    let rows = reader
        .records()
        .map(|r| r.map(|rec| rec.iter().map(String::from).collect()))
        .collect::<Result<Vec<Vec<String>>, _>>()?;

    debug!(
        "Parsed {} columns × {} rows (delimiter {:?})",
        headers.len(),
        rows.len(),
        char::from(delimiter)
    );
    let mut table = Table::new(headers, rows, delimiter);
    table.bom = bom;
    table.crlf = crlf;
    Ok(table)
}

/// Parse an `.xlsx` workbook. The first worksheet's first row is the header.
pub fn parse_xlsx(bytes: &[u8]) -> Result<Table, calamine::XlsxError> {
    let mut workbook: Xlsx<_> = Xlsx::new(Cursor::new(bytes))?;
    let Some(name) = workbook.sheet_names().first().cloned() else {
        return Ok(Table::new(Vec::new(), Vec::new(), b','));
    };
    let range = workbook.worksheet_range(&name)?;

    let mut rows = range
        .rows()
        .map(|row| row.iter().map(|cell| cell.to_string()).collect::<Vec<_>>());
    let headers = rows
        .next()
        .unwrap_or_default()
        .into_iter()
        .map(|h| h.trim().to_string())
        .collect();
    let rows: Vec<Vec<String>> = rows.collect();

    debug!("Parsed worksheet '{}': {} rows", name, rows.len());
    let mut table = Table::new(headers, rows, b',');
    table.sheet_name = Some(name);
    Ok(table)
}

/// Read a sheet from disk, dispatching on its extension.
///
/// `delimiter` only applies to CSV input.
pub fn read_sheet(path: &Path, delimiter: Option<u8>) -> Result<Table, RelinkError> {
    let format = SheetFormat::from_path(path)?;
    let bytes = std::fs::read(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => RelinkError::FileNotFound {
            path: path.to_path_buf(),
        },
        std::io::ErrorKind::PermissionDenied => RelinkError::PermissionDenied {
            path: path.to_path_buf(),
        },
        _ => RelinkError::SheetRead {
            path: path.to_path_buf(),
            detail: e.to_string(),
        },
    })?;

    let read_err = |detail: String| RelinkError::SheetRead {
        path: path.to_path_buf(),
        detail,
    };
    let table = match format {
        SheetFormat::Csv => parse_csv(&bytes, delimiter).map_err(|e| read_err(e.to_string()))?,
        SheetFormat::Xlsx => parse_xlsx(&bytes).map_err(|e| read_err(e.to_string()))?,
    };

    if table.headers.iter().all(|h| h.is_empty()) {
        return Err(RelinkError::EmptySheet {
            path: path.to_path_buf(),
        });
    }
    info!("Read {} rows from {}", table.rows.len(), path.display());
    Ok(table)
}

/// Locate the column holding image URLs.
///
/// Under [`ColumnSelection::Auto`] the order is: a header that is exactly
/// `image`, then a header naming an image or link, then the first column
/// whose non-empty cells are mostly `http(s)://` URLs.
pub fn find_image_column(table: &Table, selection: &ColumnSelection) -> Result<usize, RelinkError> {
    let not_found = |wanted: String| RelinkError::ColumnNotFound {
        wanted,
        available: table.headers.clone(),
    };

    match selection {
        ColumnSelection::Named(name) => table
            .headers
            .iter()
            .position(|h| h.trim().eq_ignore_ascii_case(name.trim()))
            .ok_or_else(|| not_found(format!("'{name}'"))),
        ColumnSelection::Index(idx) => {
            if *idx < table.headers.len() {
                Ok(*idx)
            } else {
                Err(not_found(format!("#{idx}")))
            }
        }
        ColumnSelection::Auto => {
            if let Some(idx) = table
                .headers
                .iter()
                .position(|h| h.trim().eq_ignore_ascii_case("image"))
            {
                return Ok(idx);
            }
            if let Some(idx) = table.headers.iter().position(|h| IMAGE_HEADER.is_match(h)) {
                debug!("Image column by header name: {}", table.headers[idx]);
                return Ok(idx);
            }
            (0..table.headers.len())
                .find(|&idx| mostly_urls(&table.column(idx)))
                .inspect(|&idx| debug!("Image column by content: {}", table.headers[idx]))
                .ok_or_else(|| not_found("'image'".to_string()))
        }
    }
}

fn mostly_urls(cells: &[String]) -> bool {
    let non_empty: Vec<&str> = cells
        .iter()
        .map(|c| c.trim())
        .filter(|c| !c.is_empty())
        .collect();
    let urls = non_empty.iter().filter(|c| is_url(c)).count();
    !non_empty.is_empty() && urls * 2 > non_empty.len()
}

/// Serialize a table with its own CSV dialect.
pub fn to_csv_bytes(table: &Table) -> Result<Vec<u8>, csv::Error> {
    let terminator = if table.crlf {
        csv::Terminator::CRLF
    } else {
        csv::Terminator::Any(b'\n')
    };
    let mut out = Vec::new();
    if table.bom {
        out.extend_from_slice(UTF8_BOM);
    }
    let mut writer = csv::WriterBuilder::new()
        .delimiter(table.delimiter)
        .terminator(terminator)
        .from_writer(out);
    writer.write_record(&table.headers)?;
    for row in &table.rows {
        writer.write_record(row)?;
    }
    writer
        .into_inner()
        .map_err(|e| csv::Error::from(e.into_error()))
}

/// Serialize a table as a single-worksheet `.xlsx` workbook.
///
/// The header row is bold. Cells that read as plain decimal numbers are
/// stored as numbers; everything else as text.
pub fn to_xlsx_bytes(table: &Table) -> Result<Vec<u8>, std::io::Error> {
    if table.rows.len() >= XLSX_MAX_ROWS || table.headers.len() > XLSX_MAX_COLS {
        return Err(std::io::Error::other(format!(
            "{} rows × {} columns exceeds the xlsx worksheet limit",
            table.rows.len(),
            table.headers.len()
        )));
    }

    let mut workbook = Workbook::new();
    let bold = Format::new().set_bold();
    let sheet = workbook.add_worksheet();
    if let Some(name) = &table.sheet_name {
        sheet.set_name(name).map_err(std::io::Error::other)?;
    }

    // Bounds were checked above, so the narrowing casts cannot truncate.
    for (c, header) in table.headers.iter().enumerate() {
        sheet
            .write_string_with_format(0, c as u16, header, &bold)
            .map_err(std::io::Error::other)?;
    }
    for (r, row) in table.rows.iter().enumerate() {
        let r = (r + 1) as u32;
        for (c, cell) in row.iter().enumerate() {
            if cell.is_empty() {
                continue;
            }
            let c = c as u16;
            let written = match as_number(cell) {
                Some(n) => sheet.write_number(r, c, n),
                None => sheet.write_string(r, c, cell),
            };
            written.map_err(std::io::Error::other)?;
        }
    }
    workbook.save_to_buffer().map_err(std::io::Error::other)
}

/// `Some(n)` for cells such as `12`, `-3.5`; not for `007` or `1e3`.
fn as_number(cell: &str) -> Option<f64> {
    let digits = cell.strip_prefix('-').unwrap_or(cell);
    let plain = !digits.is_empty()
        && digits.bytes().all(|b| b.is_ascii_digit() || b == b'.')
        && digits.bytes().next().is_some_and(|b| b.is_ascii_digit())
        && !(digits.len() > 1 && digits.starts_with('0') && !digits.starts_with("0."));
    if !plain {
        return None;
    }
    cell.parse::<f64>().ok().filter(|n| n.is_finite())
}

/// Write a table to `path` atomically (temp file in the same directory,
/// then rename), in the format its extension names.
///
/// The new file takes the permissions of `permissions_from` if given,
/// otherwise those of the file it replaces.
pub fn write_sheet(
    table: &Table,
    path: &Path,
    permissions_from: Option<&Path>,
) -> Result<(), RelinkError> {
    let write_err = |source: std::io::Error| RelinkError::OutputWriteFailed {
        path: path.to_path_buf(),
        source,
    };

    let bytes = match SheetFormat::from_path(path)? {
        SheetFormat::Csv => to_csv_bytes(table).map_err(|e| write_err(std::io::Error::other(e)))?,
        SheetFormat::Xlsx => to_xlsx_bytes(table).map_err(write_err)?,
    };

    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&dir).map_err(write_err)?;

    let mut tmp = tempfile::NamedTempFile::new_in(&dir).map_err(write_err)?;
    tmp.write_all(&bytes).map_err(write_err)?;

    let template = permissions_from.or_else(|| path.exists().then_some(path));
    if let Some(template) = template {
        match std::fs::metadata(template) {
            Ok(meta) => tmp
                .as_file()
                .set_permissions(meta.permissions())
                .map_err(write_err)?,
            Err(e) => warn!("Cannot read permissions of {}: {}", template.display(), e),
        }
    }
    tmp.persist(path).map_err(|e| write_err(e.error))?;

    info!("Wrote {} rows to {}", table.rows.len(), path.display());
    Ok(())
}
