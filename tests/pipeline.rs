//! Integration tests for the page-processing loop.
//!
//! These drive the real enhance → gate → encode → validate path with canned
//! extractors standing in for the VLM, so the whole per-page flow runs
//! without network access or a pdfium install.

use image::{DynamicImage, Rgb, RgbImage};
use metersheet::{
    process_page, run_with_extractor, write_csv, ConfirmationGate, ExtractError, ExtractionConfig,
    MeterSheetError, PageError, RawRecord, RowExtractor, Verdict,
};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

fn page_image() -> DynamicImage {
    DynamicImage::ImageRgb8(RgbImage::from_pixel(40, 24, Rgb([230, 230, 230])))
}

fn raw(value: serde_json::Value) -> RawRecord {
    serde_json::from_value(value).expect("test row must deserialize")
}

/// Extractor returning a fixed set of rows.
struct StubExtractor {
    rows: Vec<RawRecord>,
    skipped: usize,
}

impl RowExtractor for StubExtractor {
    async fn extract(
        &self,
        _page_num: usize,
        _image: &edgequake_llm::ImageData,
    ) -> Result<(Vec<RawRecord>, usize), ExtractError> {
        Ok((self.rows.clone(), self.skipped))
    }
}

/// Extractor that always fails at the transport level.
struct FailingExtractor;

impl RowExtractor for FailingExtractor {
    async fn extract(
        &self,
        _page_num: usize,
        _image: &edgequake_llm::ImageData,
    ) -> Result<(Vec<RawRecord>, usize), ExtractError> {
        Err(ExtractError::Transport("connection reset by peer".into()))
    }
}

#[tokio::test]
async fn full_page_flow_validates_and_clamps() {
    let dir = tempfile::tempdir().unwrap();
    let extractor = StubExtractor {
        rows: vec![
            // Normal row, string and number types mixed.
            raw(serde_json::json!({
                "sifra": "00020011", "novi_status": "0,0",
                "staro_stanje": "3306", "novo_stanje": 3326
            })),
            // Decreasing reading: must be clamped up and marked corrected.
            raw(serde_json::json!({
                "sifra": "00020012", "novi_status": 0.0,
                "staro_stanje": 3306, "novo_stanje": 3290
            })),
            // Unreadable reading: dropped, not fatal.
            raw(serde_json::json!({
                "sifra": "00020013", "novi_status": 0.0,
                "staro_stanje": 100, "novo_stanje": "smudge"
            })),
        ],
        skipped: 0,
    };

    let outcome = process_page(&extractor, &page_image(), 1, 1, dir.path(), None)
        .await
        .expect("no gate, no fatal error");

    assert!(outcome.error.is_none());
    assert_eq!(outcome.readings.len(), 2);
    assert_eq!(outcome.skipped_rows, 1);

    let first = &outcome.readings[0];
    assert_eq!(first.code, "00020011");
    assert_eq!(first.reported_status, 0.0);
    assert_eq!(first.previous_reading, 3306);
    assert_eq!(first.current_reading, 3326);
    assert_eq!(first.verdict, Verdict::Valid);

    let clamped = &outcome.readings[1];
    assert_eq!(clamped.current_reading, 3306, "clamped up to previous");
    assert_eq!(clamped.verdict, Verdict::Corrected);

    // Enhanced image persisted under the page-unique name.
    assert!(dir.path().join("enhanced_page_1.png").exists());
}

#[tokio::test]
async fn extractor_failure_is_recorded_not_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let outcome = process_page(&FailingExtractor, &page_image(), 2, 5, dir.path(), None)
        .await
        .expect("page failure must not abort the run");

    assert!(outcome.readings.is_empty());
    match outcome.error {
        Some(PageError::ExtractFailed { page, ref detail }) => {
            assert_eq!(page, 2);
            assert!(detail.contains("connection reset"));
        }
        other => panic!("expected ExtractFailed, got {:?}", other),
    }
}

#[tokio::test]
async fn declined_gate_aborts_before_extraction() {
    struct DenyGate {
        calls: AtomicUsize,
    }
    impl ConfirmationGate for DenyGate {
        fn confirm_page(&self, _page: usize, _total: usize, path: &Path) -> bool {
            // The enhanced image must already exist when the gate fires.
            assert!(path.exists(), "gate must see a persisted enhanced image");
            self.calls.fetch_add(1, Ordering::SeqCst);
            false
        }
    }

    let dir = tempfile::tempdir().unwrap();
    let gate: Arc<dyn ConfirmationGate> = Arc::new(DenyGate {
        calls: AtomicUsize::new(0),
    });

    // The extractor would fail loudly if reached; the gate must stop first.
    let err = process_page(&FailingExtractor, &page_image(), 3, 4, dir.path(), Some(&gate))
        .await
        .unwrap_err();

    assert!(matches!(err, MeterSheetError::Aborted { page: 3 }));
}

#[tokio::test]
async fn approving_gate_sees_page_numbers_and_path() {
    struct RecordingGate {
        seen: Mutex<Vec<(usize, usize, PathBuf)>>,
    }
    impl ConfirmationGate for RecordingGate {
        fn confirm_page(&self, page: usize, total: usize, path: &Path) -> bool {
            self.seen
                .lock()
                .unwrap()
                .push((page, total, path.to_path_buf()));
            true
        }
    }

    let dir = tempfile::tempdir().unwrap();
    let gate = Arc::new(RecordingGate {
        seen: Mutex::new(Vec::new()),
    });
    let gate_dyn: Arc<dyn ConfirmationGate> = gate.clone();

    let extractor = StubExtractor {
        rows: Vec::new(),
        skipped: 0,
    };
    let outcome = process_page(&extractor, &page_image(), 4, 7, dir.path(), Some(&gate_dyn))
        .await
        .unwrap();

    assert!(outcome.error.is_none());
    let seen = gate.seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].0, 4);
    assert_eq!(seen[0].1, 7);
    assert!(seen[0].2.ends_with("enhanced_page_4.png"));
}

#[tokio::test]
async fn empty_page_yields_no_readings_and_no_error() {
    let dir = tempfile::tempdir().unwrap();
    let extractor = StubExtractor {
        rows: Vec::new(),
        skipped: 0,
    };
    let outcome = process_page(&extractor, &page_image(), 1, 1, dir.path(), None)
        .await
        .unwrap();

    assert!(outcome.error.is_none());
    assert!(outcome.readings.is_empty());
    assert!(outcome.warnings.is_empty());
}

#[tokio::test]
async fn missing_input_fails_before_any_extraction() {
    let extractor = StubExtractor {
        rows: Vec::new(),
        skipped: 0,
    };
    let config = ExtractionConfig::default();
    let err = run_with_extractor("/no/such/sheets.pdf", &config, &extractor)
        .await
        .unwrap_err();
    assert!(matches!(err, MeterSheetError::FileNotFound { .. }));
}

#[tokio::test]
async fn warnings_flow_through_to_the_outcome() {
    let dir = tempfile::tempdir().unwrap();
    let extractor = StubExtractor {
        rows: vec![
            // Jump of 1194 > 500 triggers a consumption warning but stays valid.
            raw(serde_json::json!({
                "sifra": "00020014", "novi_status": 0.0,
                "staro_stanje": 3306, "novo_stanje": 4500
            })),
        ],
        skipped: 0,
    };
    let outcome = process_page(&extractor, &page_image(), 1, 1, dir.path(), None)
        .await
        .unwrap();

    assert_eq!(outcome.readings.len(), 1);
    assert_eq!(outcome.readings[0].verdict, Verdict::Valid);
    assert_eq!(outcome.warnings.len(), 1);
    assert!(outcome.warnings[0].message.contains("00020014"));
}

#[tokio::test]
async fn malformed_middle_row_keeps_siblings_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let extractor = StubExtractor {
        rows: vec![
            raw(serde_json::json!({
                "sifra": "A1", "staro_stanje": 10, "novo_stanje": 12
            })),
            raw(serde_json::json!({
                "sifra": "B2", "staro_stanje": "??", "novo_stanje": 30
            })),
            raw(serde_json::json!({
                "sifra": "C3", "staro_stanje": 40, "novo_stanje": 44
            })),
        ],
        skipped: 0,
    };
    let outcome = process_page(&extractor, &page_image(), 1, 1, dir.path(), None)
        .await
        .unwrap();

    assert_eq!(outcome.skipped_rows, 1);
    let codes: Vec<&str> = outcome.readings.iter().map(|r| r.code.as_str()).collect();
    assert_eq!(codes, vec!["A1", "C3"], "order of surviving rows preserved");
}

#[tokio::test]
async fn validated_readings_round_trip_through_csv() {
    let dir = tempfile::tempdir().unwrap();
    let extractor = StubExtractor {
        rows: vec![
            raw(serde_json::json!({
                "sifra": "00020011", "novi_status": 0.0,
                "staro_stanje": 3306, "novo_stanje": 3326
            })),
            raw(serde_json::json!({
                "sifra": "00020012", "novi_status": 0.0,
                "staro_stanje": 3306, "novo_stanje": 3290
            })),
        ],
        skipped: 0,
    };
    let outcome = process_page(&extractor, &page_image(), 1, 1, dir.path(), None)
        .await
        .unwrap();

    let csv_path = dir.path().join("out.csv");
    write_csv(&outcome.readings, &csv_path).unwrap();

    let content = std::fs::read_to_string(&csv_path).unwrap();
    let lines: Vec<&str> = content.lines().collect();
    assert_eq!(lines[0], "sifra,novi_status,staro_stanje,novo_stanje,status");
    assert_eq!(lines[1], "00020011,0.0,3306,3326,Ispravan");
    assert_eq!(lines[2], "00020012,0.0,3306,3306,Neispravan");
}
