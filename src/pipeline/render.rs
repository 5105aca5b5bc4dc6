//! PDF rasterisation: render selected sheet pages to `DynamicImage` via
//! pdfium.
//!
//! ## Why spawn_blocking?
//!
//! The `pdfium-render` crate wraps the pdfium C++ library, which uses
//! thread-local state internally and is not safe to call from async
//! contexts. `tokio::task::spawn_blocking` moves the work onto a dedicated
//! blocking thread so the runtime never stalls during CPU-heavy rendering.
//!
//! ## DPI to pixels
//!
//! PDF pages measure themselves in points (1/72 inch). The target pixel
//! width for a page is `width_pts / 72 × dpi`, capped by
//! `max_rendered_pixels` so a mis-scanned oversized page cannot exhaust
//! memory. At the default 300 DPI an A4 sheet lands around 2480×3508 px,
//! which keeps handwritten digits several pixels wide — the difference
//! between the model reading "3306" and guessing.
//!
//! Rasterisation failure is fatal to the run (spec'd as the one upstream
//! collaborator the pipeline cannot work around).

use crate::config::ExtractionConfig;
use crate::error::MeterSheetError;
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::path::Path;
use tracing::{debug, info};

/// The rasterised pages of one document, plus the document's page count
/// (needed to report selection errors precisely).
pub struct RenderedPages {
    /// Total pages in the source document.
    pub total_pages: usize,
    /// `(page_index_0based, image)` for each selected page, in order.
    pub pages: Vec<(usize, DynamicImage)>,
}

/// Rasterise the selected pages of a PDF into images.
///
/// Runs inside `spawn_blocking` since pdfium operations are CPU-bound.
pub async fn render_pages(
    pdf_path: &Path,
    config: &ExtractionConfig,
) -> Result<RenderedPages, MeterSheetError> {
    let path = pdf_path.to_path_buf();
    let dpi = config.dpi;
    let max_pixels = config.max_rendered_pixels;
    let selection = config.pages.clone();

    tokio::task::spawn_blocking(move || {
        render_pages_blocking(&path, dpi, max_pixels, &selection)
    })
    .await
    .map_err(|e| MeterSheetError::Internal(format!("Render task panicked: {}", e)))?
}

/// Blocking implementation of page rendering.
fn render_pages_blocking(
    pdf_path: &Path,
    dpi: u32,
    max_pixels: u32,
    selection: &crate::config::PageSelection,
) -> Result<RenderedPages, MeterSheetError> {
    let bindings = match std::env::var("PDFIUM_LIB_PATH") {
        Ok(dir) if !dir.is_empty() => {
            Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(&dir))
        }
        _ => Pdfium::bind_to_system_library(),
    }
    .map_err(|e| MeterSheetError::PdfiumBindingFailed(e.to_string()))?;
    let pdfium = Pdfium::new(bindings);

    let document = pdfium
        .load_pdf_from_file(pdf_path, None)
        .map_err(|e| MeterSheetError::CorruptPdf {
            path: pdf_path.to_path_buf(),
            detail: format!("{:?}", e),
        })?;

    let pages = document.pages();
    let total_pages = pages.len() as usize;
    info!("PDF loaded: {} pages", total_pages);

    let indices = selection.to_indices(total_pages);
    if indices.is_empty() {
        return Err(MeterSheetError::PageOutOfRange {
            page: match selection {
                crate::config::PageSelection::Single(p) => *p,
                crate::config::PageSelection::Range(s, _) => *s,
                crate::config::PageSelection::All => 0,
            },
            total: total_pages,
        });
    }

    let mut results = Vec::with_capacity(indices.len());

    for idx in indices {
        let page = pages
            .get(idx as u16)
            .map_err(|e| MeterSheetError::RasterisationFailed {
                page: idx + 1,
                detail: format!("{:?}", e),
            })?;

        // Points → pixels at the configured DPI, capped for safety.
        let target_width =
            ((page.width().value / 72.0) * dpi as f32).round() as u32;
        let render_config = PdfRenderConfig::new()
            .set_target_width(target_width.min(max_pixels) as i32)
            .set_maximum_height(max_pixels as i32);

        let bitmap = page.render_with_config(&render_config).map_err(|e| {
            MeterSheetError::RasterisationFailed {
                page: idx + 1,
                detail: format!("{:?}", e),
            }
        })?;

        let image = bitmap.as_image();
        debug!(
            "Rendered page {} → {}x{} px",
            idx + 1,
            image.width(),
            image.height()
        );

        results.push((idx, image));
    }

    Ok(RenderedPages {
        total_pages,
        pages: results,
    })
}
