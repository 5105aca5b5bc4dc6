//! Record types flowing through the extraction pipeline.
//!
//! The pipeline narrows data in three steps:
//!
//! 1. [`RawRecord`] — whatever the VLM returned for one table row. Fields
//!    are optional [`serde_json::Value`]s because the model sometimes emits
//!    `"3306"` and sometimes `3306`; nothing is validated yet.
//! 2. [`Reading`] — one typed, validated row. Immutable once produced, and
//!    guaranteed to satisfy `current_reading >= previous_reading` (the
//!    reconciliation clamp in [`crate::validate`] enforces it, it is not
//!    merely checked).
//! 3. [`PageOutcome`] / [`RunOutput`] — per-page and per-session aggregates
//!    the driver hands back to the caller.
//!
//! [`Warning`]s are a side channel: they describe suspected misreads but
//! never alter data or control flow, and they are not written to the CSV.

use crate::error::PageError;
use serde::{Deserialize, Serialize};

/// One table row exactly as extracted by the VLM, before validation.
///
/// Field names match the printed column headers of the reading sheet
/// (Serbian/Bosnian), which is also the JSON contract given to the model:
/// `sifra` (subscriber code), `novi_status` (new status, decimal),
/// `staro_stanje` (old reading), `novo_stanje` (new handwritten reading).
///
/// Every field is optional and untyped — malformed rows are the validator's
/// problem, not the deserialiser's.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawRecord {
    #[serde(default)]
    pub sifra: Option<serde_json::Value>,
    #[serde(default)]
    pub novi_status: Option<serde_json::Value>,
    #[serde(default)]
    pub staro_stanje: Option<serde_json::Value>,
    #[serde(default)]
    pub novo_stanje: Option<serde_json::Value>,
}

/// Whether a reading passed validation untouched or had to be corrected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Verdict {
    /// The handwritten reading was plausible as read.
    Valid,
    /// The handwritten reading was below the printed previous reading and
    /// was clamped up to equal it. Meter totals never decrease, so a lower
    /// value is treated as a definite misread.
    Corrected,
}

impl Verdict {
    /// The status literal written to the CSV, matching the utility's own
    /// vocabulary: "Ispravan" (correct) / "Neispravan" (incorrect).
    pub fn as_csv_str(&self) -> &'static str {
        match self {
            Verdict::Valid => "Ispravan",
            Verdict::Corrected => "Neispravan",
        }
    }
}

/// One validated meter reading — the unit of pipeline output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    /// Subscriber code as printed on the sheet. Usually 8 digits, but the
    /// pipeline does not enforce a format.
    pub code: String,
    /// The printed "novi status" decimal value.
    pub reported_status: f64,
    /// The printed previous meter total.
    pub previous_reading: i64,
    /// The handwritten current meter total, possibly clamped upward.
    /// Always `>= previous_reading`.
    pub current_reading: i64,
    /// Whether the clamp fired for this row.
    pub verdict: Verdict,
}

/// An advisory note about a suspected misread in one table row.
///
/// Warnings are collected per page and surfaced to the operator in a single
/// batch once all rows of the page have been validated, so extraction noise
/// and validation review stay separated on the console. They never block a
/// row and are not persisted in the CSV.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Warning {
    /// 1-based row index within the source page.
    pub row: usize,
    /// Human-readable description naming the row, code, and values.
    pub message: String,
}

impl std::fmt::Display for Warning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

/// Everything the driver recorded for one sheet page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageOutcome {
    /// 1-indexed page number in the source PDF.
    pub page_num: usize,
    /// Validated readings in table order. Empty when the page failed or the
    /// model found nothing.
    pub readings: Vec<Reading>,
    /// Batched validation warnings for this page.
    pub warnings: Vec<Warning>,
    /// Rows the VLM returned but validation had to drop (unparseable field
    /// or malformed array element).
    pub skipped_rows: usize,
    /// Set when the page failed before validation (enhance/extract stage).
    pub error: Option<PageError>,
    /// Wall-clock time spent on this page, including the operator gate.
    pub duration_ms: u64,
}

impl PageOutcome {
    /// A page that failed before producing any rows.
    pub fn failed(page_num: usize, error: PageError, duration_ms: u64) -> Self {
        Self {
            page_num,
            readings: Vec::new(),
            warnings: Vec::new(),
            skipped_rows: 0,
            error: Some(error),
            duration_ms,
        }
    }
}

/// Aggregate statistics for a whole run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunStats {
    /// Pages in the source document.
    pub total_pages: usize,
    /// Pages that produced at least one reading.
    pub processed_pages: usize,
    /// Pages that failed in the enhance or extract stage.
    pub failed_pages: usize,
    /// Pages that completed but yielded zero rows.
    pub empty_pages: usize,
    /// Validated readings across all pages.
    pub total_readings: usize,
    /// Readings whose verdict is [`Verdict::Corrected`].
    pub corrected_readings: usize,
    /// Rows dropped because a field could not be coerced.
    pub skipped_rows: usize,
    /// Validation warnings across all pages.
    pub warning_count: usize,
    /// Time spent rasterising the PDF.
    pub render_duration_ms: u64,
    /// Time spent inside VLM calls.
    pub llm_duration_ms: u64,
    /// End-to-end wall-clock time.
    pub total_duration_ms: u64,
}

/// The result of a full extraction run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunOutput {
    /// All validated readings, in page order then table order — exactly the
    /// rows the CSV artifact will contain.
    pub readings: Vec<Reading>,
    /// Per-page detail, in page order.
    pub pages: Vec<PageOutcome>,
    /// Run statistics.
    pub stats: RunStats,
}
