//! The extraction driver: sequences the pipeline stages for a whole run.
//!
//! Pages are processed strictly sequentially. The per-page operator gate
//! makes concurrency pointless — a human can only look at one enhanced
//! image at a time — and sequential VLM calls keep the console output in
//! page order, which is how operators cross-check against the paper batch.
//!
//! A page failure (unreadable scan, model timeout) is recorded in its
//! [`PageOutcome`] and the run continues; only input problems, provider
//! configuration, and a gate refusal abort the whole run.

use crate::config::ExtractionConfig;
use crate::csv_out;
use crate::error::{MeterSheetError, PageError};
use crate::gate::ConfirmationGate;
use crate::pipeline::extract::{RowExtractor, VlmRowExtractor};
use crate::pipeline::{encode, enhance, input, render};
use crate::prompts::TABLE_EXTRACTION_PROMPT;
use crate::record::{PageOutcome, Reading, RunOutput, RunStats, Verdict, Warning};
use crate::validate::validate_row;
use edgequake_llm::{LLMProvider, ProviderFactory};
use image::DynamicImage;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Extract validated meter readings from a PDF file or URL.
///
/// This is the primary library entry point. Returns `Ok` even when some
/// pages failed — check `output.stats.failed_pages` — and errs only on
/// run-fatal conditions: unusable input, no provider, or the operator
/// declining a page at the confirmation gate.
pub async fn run(
    input_str: impl AsRef<str>,
    config: &ExtractionConfig,
) -> Result<RunOutput, MeterSheetError> {
    let provider = resolve_provider(config)?;
    let extractor = VlmRowExtractor::new(
        provider,
        config
            .prompt
            .clone()
            .unwrap_or_else(|| TABLE_EXTRACTION_PROMPT.to_string()),
        config.temperature,
        config.max_tokens,
    );
    run_with_extractor(input_str, config, &extractor).await
}

/// Run the extraction and write the CSV artifact in one call.
///
/// The CSV is written even when zero readings were extracted (header only),
/// so downstream jobs watching for the file always find a well-formed one.
pub async fn run_to_csv(
    input_str: impl AsRef<str>,
    output_path: impl AsRef<Path>,
    config: &ExtractionConfig,
) -> Result<RunOutput, MeterSheetError> {
    let output = run(input_str, config).await?;
    csv_out::write_csv(&output.readings, output_path.as_ref())?;
    Ok(output)
}

/// [`run`] with an explicit extractor instead of a VLM provider.
///
/// The seam that lets tests drive the full page loop — enhancement, gate,
/// validation, stats — with a canned extractor and no network.
pub async fn run_with_extractor<E: RowExtractor>(
    input_str: impl AsRef<str>,
    config: &ExtractionConfig,
    extractor: &E,
) -> Result<RunOutput, MeterSheetError> {
    let total_start = Instant::now();
    let input_str = input_str.as_ref();
    info!("Starting extraction: {}", input_str);

    let resolved = input::resolve_input(input_str, config.download_timeout_secs).await?;

    let render_start = Instant::now();
    let rendered = render::render_pages(resolved.path(), config).await?;
    let render_duration_ms = render_start.elapsed().as_millis() as u64;
    info!(
        "Rendered {} of {} pages in {}ms",
        rendered.pages.len(),
        rendered.total_pages,
        render_duration_ms
    );

    // Enhanced images go either where the caller asked or into a temp dir
    // that lives exactly as long as this run.
    let (enhanced_dir, _tmp_guard) = prepare_enhanced_dir(config)?;

    let selected = rendered.pages.len();
    let mut pages: Vec<PageOutcome> = Vec::with_capacity(selected);

    let llm_start = Instant::now();
    for (idx, image) in &rendered.pages {
        let page_num = idx + 1;
        let outcome = process_page(
            extractor,
            image,
            page_num,
            selected,
            &enhanced_dir,
            config.gate.as_ref(),
        )
        .await?;

        // Warnings surface in one batch per page so they read as a review
        // checklist rather than interleaving with extraction noise.
        for warning in &outcome.warnings {
            warn!("Page {}: {}", page_num, warning);
        }
        if let Some(ref err) = outcome.error {
            warn!("Page {} failed: {}", page_num, err);
        }

        pages.push(outcome);
    }
    let llm_duration_ms = llm_start.elapsed().as_millis() as u64;

    let readings: Vec<Reading> = pages
        .iter()
        .flat_map(|p| p.readings.iter().cloned())
        .collect();

    let stats = RunStats {
        total_pages: rendered.total_pages,
        processed_pages: pages
            .iter()
            .filter(|p| p.error.is_none() && !p.readings.is_empty())
            .count(),
        failed_pages: pages.iter().filter(|p| p.error.is_some()).count(),
        empty_pages: pages
            .iter()
            .filter(|p| p.error.is_none() && p.readings.is_empty())
            .count(),
        total_readings: readings.len(),
        corrected_readings: readings
            .iter()
            .filter(|r| r.verdict == Verdict::Corrected)
            .count(),
        skipped_rows: pages.iter().map(|p| p.skipped_rows).sum(),
        warning_count: pages.iter().map(|p| p.warnings.len()).sum(),
        render_duration_ms,
        llm_duration_ms,
        total_duration_ms: total_start.elapsed().as_millis() as u64,
    };

    info!(
        "Extraction complete: {} readings ({} corrected) from {} pages in {}ms",
        stats.total_readings, stats.corrected_readings, selected, stats.total_duration_ms
    );

    Ok(RunOutput {
        readings,
        pages,
        stats,
    })
}

/// Run one rendered page through enhance → gate → encode → extract →
/// validate.
///
/// Errors are run-fatal only: a gate refusal ([`MeterSheetError::Aborted`])
/// or a panicked blocking task. Stage failures within the page come back as
/// `Ok` with [`PageOutcome::error`] set.
pub async fn process_page<E: RowExtractor>(
    extractor: &E,
    image: &DynamicImage,
    page_num: usize,
    total_pages: usize,
    enhanced_dir: &Path,
    gate: Option<&Arc<dyn ConfirmationGate>>,
) -> Result<PageOutcome, MeterSheetError> {
    let start = Instant::now();
    info!("Processing page {} of {}", page_num, total_pages);

    let enhanced = enhance::enhance_page(image);

    let enhanced_path = match enhance::persist_enhanced(&enhanced, enhanced_dir, page_num) {
        Ok(path) => path,
        Err(e) => {
            return Ok(PageOutcome::failed(
                page_num,
                e,
                start.elapsed().as_millis() as u64,
            ))
        }
    };

    if let Some(gate) = gate {
        let gate = Arc::clone(gate);
        let path = enhanced_path.clone();
        let approved =
            tokio::task::spawn_blocking(move || gate.confirm_page(page_num, total_pages, &path))
                .await
                .map_err(|e| MeterSheetError::Internal(format!("Gate task panicked: {}", e)))?;
        if !approved {
            info!("Operator declined page {}; aborting run", page_num);
            return Err(MeterSheetError::Aborted { page: page_num });
        }
    }

    let image_data = match encode::encode_page(&enhanced) {
        Ok(data) => data,
        Err(e) => {
            return Ok(PageOutcome::failed(
                page_num,
                PageError::EnhanceFailed {
                    page: page_num,
                    detail: format!("image encoding failed: {}", e),
                },
                start.elapsed().as_millis() as u64,
            ))
        }
    };

    let (raw_rows, mut skipped) = match extractor.extract(page_num, &image_data).await {
        Ok(result) => result,
        Err(e) => {
            return Ok(PageOutcome::failed(
                page_num,
                PageError::ExtractFailed {
                    page: page_num,
                    detail: e.to_string(),
                },
                start.elapsed().as_millis() as u64,
            ))
        }
    };

    debug!("Page {}: {} raw rows extracted", page_num, raw_rows.len());

    let mut readings = Vec::with_capacity(raw_rows.len());
    let mut warnings: Vec<Warning> = Vec::new();

    for (i, raw) in raw_rows.iter().enumerate() {
        match validate_row(i + 1, raw) {
            Ok((reading, row_warnings)) => {
                readings.push(reading);
                warnings.extend(row_warnings);
            }
            Err(e) => {
                warn!("Page {}: dropping row {}: {}", page_num, i + 1, e);
                skipped += 1;
            }
        }
    }

    Ok(PageOutcome {
        page_num,
        readings,
        warnings,
        skipped_rows: skipped,
        error: None,
        duration_ms: start.elapsed().as_millis() as u64,
    })
}

// ── Internal helpers ─────────────────────────────────────────────────────

fn prepare_enhanced_dir(
    config: &ExtractionConfig,
) -> Result<(PathBuf, Option<tempfile::TempDir>), MeterSheetError> {
    match &config.enhanced_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir).map_err(|e| MeterSheetError::OutputWriteFailed {
                path: dir.clone(),
                detail: e.to_string(),
            })?;
            Ok((dir.clone(), None))
        }
        None => {
            let tmp = tempfile::TempDir::new()
                .map_err(|e| MeterSheetError::Internal(format!("tempdir: {}", e)))?;
            let path = tmp.path().to_path_buf();
            Ok((path, Some(tmp)))
        }
    }
}

/// Instantiate a named provider with the given model.
fn create_vision_provider(
    provider_name: &str,
    model: &str,
) -> Result<Arc<dyn LLMProvider>, MeterSheetError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        MeterSheetError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}

/// Resolve the VLM provider, from most-specific to least-specific:
///
/// 1. A pre-built provider in the config (tests, custom middleware).
/// 2. A named provider plus optional model from the config.
/// 3. The `EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL` environment pair,
///    checked before full auto-detection so an explicit model choice wins
///    even when several API keys are present.
/// 4. OpenAI whenever `OPENAI_API_KEY` is set — the sheets were tuned
///    against GPT-4-class vision and that remains the default.
/// 5. Full auto-detection across all known API key variables.
fn resolve_provider(config: &ExtractionConfig) -> Result<Arc<dyn LLMProvider>, MeterSheetError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    if let Some(ref name) = config.provider_name {
        let model = config.model.as_deref().unwrap_or("gpt-4o");
        return create_vision_provider(name, model);
    }

    if let (Ok(prov), Ok(model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !prov.is_empty() && !model.is_empty() {
            return create_vision_provider(&prov, &model);
        }
    }

    if let Ok(openai_key) = std::env::var("OPENAI_API_KEY") {
        if !openai_key.is_empty() {
            let model = config.model.as_deref().unwrap_or("gpt-4o");
            return create_vision_provider("openai", model);
        }
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| MeterSheetError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No VLM provider could be auto-detected from environment.\n\
                Set OPENAI_API_KEY, ANTHROPIC_API_KEY, or configure a provider.\n\
                Error: {}",
                e
            ),
        })?;

    Ok(llm_provider)
}
