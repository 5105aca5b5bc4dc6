//! Row validation and reconciliation — the decision core of the pipeline.
//!
//! [`validate_row`] turns one untyped [`RawRecord`] into one typed
//! [`Reading`], in a fixed order:
//!
//! 1. Coerce every field (comma decimals accepted, missing fields default).
//!    A field that is present but not numeric fails the whole row — no
//!    partial readings are ever emitted.
//! 2. Run the two plausibility heuristics. Both are advisory: they produce
//!    [`Warning`]s for the operator but never block the row.
//! 3. Apply the reconciliation clamp: a current reading below the previous
//!    one is forced up to equal it and the verdict becomes `Corrected`.
//!
//! The clamp encodes the domain fact that meter totals are monotonically
//! non-decreasing; an observed decrease is always a misread of the
//! handwritten digits, never real. The trade-off is that a genuine meter
//! replacement (counter reset to zero) is silently clamped too — it shows
//! up only through the magnitude warning. That behaviour is deliberate and
//! matches what the field teams expect; do not "fix" it here.
//!
//! The function is pure and idempotent: validating the same raw row twice
//! yields the same reading, and warnings depend only on the inputs.

use crate::record::{RawRecord, Reading, Verdict, Warning};
use serde_json::Value;
use thiserror::Error;

/// Readings further apart than this are flagged as probable misreads.
///
/// Household consumption between two visits is almost always below 200
/// units; 500 leaves generous headroom while still catching transposed or
/// hallucinated digits.
pub const MAX_PLAUSIBLE_DIFFERENCE: i64 = 500;

/// How many more decimal digits the new reading may have than the old one
/// before the extra-digit heuristic fires. One extra digit is a legitimate
/// rollover (999 → 1004); two or more usually means a table gridline was
/// read as a digit.
pub const DIGIT_SLACK: usize = 1;

/// A row-level coercion failure. The driver logs it and skips the row;
/// sibling rows on the same page are unaffected.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CoercionError {
    /// A field was present but could not be read as a number.
    #[error("field '{field}' is not numeric: {value}")]
    NotNumeric { field: &'static str, value: String },
}

/// Validate one raw row, producing a reading plus advisory warnings.
///
/// `row_index` is 1-based (as printed on the sheet) and is only used in
/// warning messages.
///
/// # Errors
/// Returns [`CoercionError`] when any numeric field is present but
/// unparsable. Missing fields do not error — they take the sheet defaults
/// (`"0"` for the code, zero for the numbers), matching the behaviour of
/// rows the model could only partially read.
pub fn validate_row(
    row_index: usize,
    raw: &RawRecord,
) -> Result<(Reading, Vec<Warning>), CoercionError> {
    let code = coerce_string(raw.sifra.as_ref(), "0");
    let reported_status = coerce_f64(raw.novi_status.as_ref(), "novi_status")?;
    let previous = coerce_i64(raw.staro_stanje.as_ref(), "staro_stanje")?;
    let current = coerce_i64(raw.novo_stanje.as_ref(), "novo_stanje")?;

    let mut warnings = Vec::new();

    // Heuristics run against the values as read, before the clamp, so the
    // operator sees what the model actually produced.
    let difference = (current - previous).abs();
    if difference > MAX_PLAUSIBLE_DIFFERENCE {
        warnings.push(Warning {
            row: row_index,
            message: format!(
                "Row {row_index} (sifra {code}): large difference detected! \
                 Staro: {previous}, Novo: {current} (diff: {difference}). \
                 This might be a misread — please verify manually."
            ),
        });
    }

    if digit_count(current) > digit_count(previous) + DIGIT_SLACK {
        warnings.push(Warning {
            row: row_index,
            message: format!(
                "Row {row_index} (sifra {code}): digit count mismatch! \
                 Staro: {previous} ({} digits), Novo: {current} ({} digits). \
                 Novo stanje might have an extra digit from a table line — please verify.",
                digit_count(previous),
                digit_count(current),
            ),
        });
    }

    // Reconciliation: meter totals never decrease, so clamp rather than
    // reject and keep the row flowing to the CSV.
    let (current, verdict) = if current < previous {
        (previous, Verdict::Corrected)
    } else {
        (current, Verdict::Valid)
    };

    Ok((
        Reading {
            code,
            reported_status,
            previous_reading: previous,
            current_reading: current,
            verdict,
        },
        warnings,
    ))
}

// ── Field coercion ───────────────────────────────────────────────────────

/// Stringify a JSON value the way the sheet prints it: strings pass
/// through, numbers render without quotes, null/absent takes the default.
fn coerce_string(value: Option<&Value>, default: &str) -> String {
    match value {
        None | Some(Value::Null) => default.to_string(),
        Some(Value::String(s)) => s.trim().to_string(),
        Some(other) => other.to_string(),
    }
}

/// Parse a JSON value as a float, accepting the locale decimal comma the
/// sheets use ("3,5" and "3.5" both parse to 3.5). Absent fields are 0.0.
fn coerce_f64(value: Option<&Value>, field: &'static str) -> Result<f64, CoercionError> {
    match value {
        None | Some(Value::Null) => Ok(0.0),
        Some(Value::Number(n)) => n.as_f64().ok_or_else(|| CoercionError::NotNumeric {
            field,
            value: n.to_string(),
        }),
        Some(Value::String(s)) => {
            let normalised = s.trim().replace(',', ".");
            normalised
                .parse::<f64>()
                .map_err(|_| CoercionError::NotNumeric {
                    field,
                    value: s.clone(),
                })
        }
        Some(other) => Err(CoercionError::NotNumeric {
            field,
            value: other.to_string(),
        }),
    }
}

/// Parse as float then truncate — "3306.0" and "3306" both become 3306.
fn coerce_i64(value: Option<&Value>, field: &'static str) -> Result<i64, CoercionError> {
    Ok(coerce_f64(value, field)?.trunc() as i64)
}

/// Decimal digit count of a reading, as it appears written on the sheet.
fn digit_count(n: i64) -> usize {
    // Readings are non-negative in practice; abs() keeps the count sane if
    // the model ever emits a stray minus sign.
    n.abs().to_string().len()
}
