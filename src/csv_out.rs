//! CSV output: validated readings → the billing-import file.
//!
//! The column order and header names are a contract with the downstream
//! billing import and must not change:
//!
//! ```text
//! sifra,novi_status,staro_stanje,novo_stanje,status
//! ```
//!
//! The file is written atomically (temp file in the same directory, then
//! rename) so a crash mid-write never leaves a truncated CSV where the
//! import job will pick it up.

use crate::error::MeterSheetError;
use crate::record::Reading;
use std::path::Path;
use tracing::info;

/// Header row expected by the billing import.
pub const CSV_HEADER: [&str; 5] = [
    "sifra",
    "novi_status",
    "staro_stanje",
    "novo_stanje",
    "status",
];

/// Write all validated readings to `path`, replacing any existing file.
pub fn write_csv(readings: &[Reading], path: &Path) -> Result<(), MeterSheetError> {
    let write_failed = |detail: String| MeterSheetError::OutputWriteFailed {
        path: path.to_path_buf(),
        detail,
    };

    let parent = path.parent().filter(|p| !p.as_os_str().is_empty());
    let mut tmp = tempfile::NamedTempFile::new_in(parent.unwrap_or_else(|| Path::new(".")))
        .map_err(|e| write_failed(e.to_string()))?;

    {
        let mut writer = csv::Writer::from_writer(&mut tmp);
        writer
            .write_record(CSV_HEADER)
            .map_err(|e| write_failed(e.to_string()))?;

        for reading in readings {
            writer
                .write_record([
                    reading.code.as_str(),
                    &format_status(reading.reported_status),
                    &reading.previous_reading.to_string(),
                    &reading.current_reading.to_string(),
                    reading.verdict.as_csv_str(),
                ])
                .map_err(|e| write_failed(e.to_string()))?;
        }

        writer.flush().map_err(|e| write_failed(e.to_string()))?;
    }

    tmp.persist(path)
        .map_err(|e| write_failed(e.to_string()))?;

    info!("Wrote {} readings to {}", readings.len(), path.display());
    Ok(())
}

/// Format the meter-status column the way the sheets print it: integral
/// values keep one decimal place (`0.0`), fractional values print as-is.
pub fn format_status(status: f64) -> String {
    if status.fract() == 0.0 {
        format!("{:.1}", status)
    } else {
        format!("{}", status)
    }
}
