//! # metersheet
//!
//! Extract validated water-meter readings from scanned reading sheets
//! using Vision Language Models (VLMs).
//!
//! ## Why this crate?
//!
//! Municipal water utilities still collect readings on paper: a reader
//! walks the route with a printed sheet, writes the new meter total next
//! to each subscriber, and the office types the batch into the billing
//! system by hand. Classic OCR fails on these scans — landscape
//! orientation, faint dot-matrix print, handwritten digits squeezed into
//! gridded cells. This crate rasterises each page, enhances it for
//! legibility, lets a VLM read the table as a human would, then runs every
//! row through domain validation (meter totals never decrease) before
//! emitting a billing-ready CSV.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF
//!  │
//!  ├─ 1. Input    resolve local file or download from URL
//!  ├─ 2. Render   rasterise pages via pdfium (CPU-bound, spawn_blocking)
//!  ├─ 3. Enhance  rotate 90° CCW, contrast ×1.5, sharpness ×2.0, brightness ×1.1
//!  ├─ 4. Gate     operator inspects the enhanced PNG, may abort before spend
//!  ├─ 5. Extract  VLM call per page → JSON array of raw rows
//!  ├─ 6. Validate coerce fields, warn on implausible jumps, clamp decreases
//!  └─ 7. Output   CSV (sifra,novi_status,staro_stanje,novo_stanje,status)
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use metersheet::{run_to_csv, ExtractionConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Provider auto-detected from OPENAI_API_KEY / ANTHROPIC_API_KEY / …
//!     let config = ExtractionConfig::default();
//!     let output = run_to_csv("sheets.pdf", "ocitanja.csv", &config).await?;
//!     eprintln!(
//!         "{} readings, {} corrected, {} warnings",
//!         output.stats.total_readings,
//!         output.stats.corrected_readings,
//!         output.stats.warning_count
//!     );
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `metersheet` binary (clap + anyhow + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! metersheet = { version = "0.1", default-features = false }
//! ```
//!
//! ## Trust model
//!
//! The VLM transcribes; it is never trusted to be right. Every row it
//! returns passes through [`validate`], which coerces loose types, flags
//! implausible consumption jumps and digit-count mismatches as warnings,
//! and corrects physically impossible readings (a meter total lower than
//! the previous one is clamped up and marked "Neispravan"). The operator
//! gate sits before the API call so an unusable scan costs nothing.

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod csv_out;
pub mod error;
pub mod gate;
pub mod pipeline;
pub mod prompts;
pub mod record;
pub mod run;
pub mod validate;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ExtractionConfig, ExtractionConfigBuilder, PageSelection};
pub use csv_out::{write_csv, CSV_HEADER};
pub use error::{MeterSheetError, PageError};
pub use gate::{AutoConfirm, ConfirmationGate};
pub use pipeline::extract::{ExtractError, RowExtractor, VlmRowExtractor};
pub use record::{PageOutcome, RawRecord, Reading, RunOutput, RunStats, Verdict, Warning};
pub use run::{process_page, run, run_to_csv, run_with_extractor};
pub use validate::{validate_row, CoercionError, DIGIT_SLACK, MAX_PLAUSIBLE_DIFFERENCE};
