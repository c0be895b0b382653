//! Result types produced by a batch run.

use crate::error::{ItemError, RelinkError, FATAL_TOKEN, GENERIC_TOKEN, INVALID_FORMAT_TOKEN};
use crate::sheet::Table;
use serde::{Deserialize, Serialize};

/// One input row handed to the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkItem {
    /// Position in the original sequence.
    pub index: usize,
    /// Raw cell value; may be empty.
    pub source: String,
}

impl WorkItem {
    pub fn new(index: usize, source: impl Into<String>) -> Self {
        Self {
            index,
            source: source.into(),
        }
    }

    /// True for empty or whitespace-only sources.
    pub fn is_blank(&self) -> bool {
        self.source.trim().is_empty()
    }
}

/// A successfully hosted image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostedLink {
    /// Direct link to the uploaded PNG.
    pub url: String,
    /// Viewer page, when the host returns one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_url: Option<String>,
    /// Deletion page, when the host returns one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delete_url: Option<String>,
}

impl HostedLink {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            display_url: None,
            delete_url: None,
        }
    }
}

/// The outcome for one row.
///
/// `Ok(None)` marks a blank source that was skipped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Outcome {
    pub index: usize,
    pub result: Result<Option<HostedLink>, ItemError>,
}

impl Outcome {
    pub fn skipped(index: usize) -> Self {
        Self {
            index,
            result: Ok(None),
        }
    }

    pub fn is_failure(&self) -> bool {
        self.result.is_err()
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self.result, Ok(None))
    }

    pub fn link(&self) -> Option<&HostedLink> {
        self.result.as_ref().ok().and_then(Option::as_ref)
    }

    /// The value written back into the sheet cell.
    pub fn token(&self) -> String {
        match &self.result {
            Ok(Some(link)) => link.url.clone(),
            Ok(None) => String::new(),
            Err(e) => e.token(),
        }
    }
}

/// Ordered outcomes for a whole batch: `outcomes[i]` belongs to input `i`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchResult {
    outcomes: Vec<Outcome>,
}

impl BatchResult {
    /// Wrap outcomes that are already in index order.
    ///
    /// Returns `None` if any slot holds the wrong index.
    pub fn from_ordered(outcomes: Vec<Outcome>) -> Option<Self> {
        if outcomes.iter().enumerate().all(|(i, o)| o.index == i) {
            Some(Self { outcomes })
        } else {
            None
        }
    }

    /// Collapse index-addressed slots; an unfilled slot becomes an
    /// [`ItemError::Unexpected`] for that row.
    pub(crate) fn from_slots(slots: Vec<Option<Outcome>>) -> Self {
        let outcomes = slots
            .into_iter()
            .enumerate()
            .map(|(index, slot)| match slot {
                Some(outcome) if outcome.index == index => outcome,
                _ => Outcome {
                    index,
                    result: Err(ItemError::Unexpected {
                        detail: "no outcome recorded".to_string(),
                    }),
                },
            })
            .collect();
        Self { outcomes }
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    pub fn outcomes(&self) -> &[Outcome] {
        &self.outcomes
    }

    pub fn into_outcomes(self) -> Vec<Outcome> {
        self.outcomes
    }

    /// Cell values in input order.
    pub fn tokens(&self) -> Vec<String> {
        self.outcomes.iter().map(Outcome::token).collect()
    }

    pub fn failed_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_failure()).count()
    }

    pub fn skipped_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_skipped()).count()
    }

    pub fn success_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.link().is_some()).count()
    }

    /// First failure in input order, with its row index.
    pub fn first_error(&self) -> Option<(usize, &ItemError)> {
        self.outcomes
            .iter()
            .find_map(|o| o.result.as_ref().err().map(|e| (o.index, e)))
    }

    /// Treat any row failure as an error.
    pub fn into_result(self) -> Result<Self, RelinkError> {
        let failed = self.failed_count();
        if failed == 0 {
            Ok(self)
        } else {
            Err(RelinkError::PartialFailure {
                success: self.success_count(),
                failed,
                total: self.len(),
            })
        }
    }
}

/// Loose check for the legacy string contract: does `token` look like one of
/// the error markers rather than a link or an empty cell?
pub fn is_error_token(token: &str) -> bool {
    token.starts_with("Err")
        || token == INVALID_FORMAT_TOKEN
        || token == GENERIC_TOKEN
        || token == FATAL_TOKEN
}

/// Counters for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionStats {
    pub total_rows: usize,
    pub uploaded: usize,
    pub failed: usize,
    pub skipped: usize,
    pub duration_ms: u64,
}

impl ConversionStats {
    pub fn from_batch(batch: &BatchResult, duration_ms: u64) -> Self {
        Self {
            total_rows: batch.len(),
            uploaded: batch.success_count(),
            failed: batch.failed_count(),
            skipped: batch.skipped_count(),
            duration_ms,
        }
    }
}

/// Everything a sheet conversion produced.
#[derive(Debug, Clone, Serialize)]
pub struct ConversionOutput {
    /// The sheet with hosted links written back.
    pub table: Table,
    /// Header of the column that was read.
    pub source_column: String,
    /// Header of the column that was written.
    pub target_column: String,
    pub batch: BatchResult,
    pub stats: ConversionStats,
}
