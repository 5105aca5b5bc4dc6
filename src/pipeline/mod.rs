//! Pipeline stages for sheet-to-CSV extraction.
//!
//! Each submodule implements exactly one transformation step. Keeping
//! stages separate makes each independently testable and lets the driver
//! in [`crate::run`] sequence them with the operator gate in between.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ render ──▶ enhance ──▶ (gate) ──▶ encode ──▶ extract
//! (URL/path) (pdfium)  (rotate+     operator   (base64)   (VLM → RawRecord)
//!                       contrast)   confirm
//! ```
//!
//! 1. [`input`]   — canonicalise the user-supplied path or URL to a local file
//! 2. [`render`]  — rasterise selected pages at the configured DPI; runs in
//!    `spawn_blocking` because pdfium is not async-safe
//! 3. [`enhance`] — fixed legibility pipeline (rotate 90° CCW, contrast ×1.5,
//!    sharpness ×2.0, brightness ×1.1) plus a persisted PNG for inspection
//! 4. [`encode`]  — PNG-encode and base64-wrap the enhanced image for the
//!    multimodal request body
//! 5. [`extract`] — drive the VLM call and parse its JSON-array response
//!    into [`crate::record::RawRecord`]s; the only stage with network I/O
//!
//! Validation of the raw records is not a pipeline stage here — it lives in
//! [`crate::validate`] because it is pure row logic with no I/O.

pub mod encode;
pub mod enhance;
pub mod extract;
pub mod input;
pub mod render;
