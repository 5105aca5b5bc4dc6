//! Configuration for an extraction run.
//!
//! All run behaviour is controlled through [`ExtractionConfig`], built via
//! its [`ExtractionConfigBuilder`]. Keeping every knob in one struct makes
//! it trivial to share a config between the CLI and tests, and to diff two
//! runs to understand why their outputs differ.
//!
//! Defaults follow the field workflow this tool replaced: 300 DPI scans,
//! 3000 output tokens per page, near-deterministic sampling.

use crate::error::MeterSheetError;
use crate::gate::ConfirmationGate;
use edgequake_llm::LLMProvider;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Configuration for a reading-sheet extraction run.
///
/// Built via [`ExtractionConfig::builder()`] or
/// [`ExtractionConfig::default()`].
///
/// # Example
/// ```rust
/// use metersheet::ExtractionConfig;
///
/// let config = ExtractionConfig::builder()
///     .dpi(300)
///     .model("gpt-4o")
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct ExtractionConfig {
    /// Rendering DPI used when rasterising each PDF page. Range: 72–600.
    /// Default: 300.
    ///
    /// Handwritten digits on the sheets are small; 300 DPI keeps individual
    /// strokes legible to the VLM. Raise to 400 for faint pencil entries,
    /// lower only when upload size becomes a problem.
    pub dpi: u32,

    /// Maximum rendered image dimension (width or height) in pixels.
    /// Default: 4096.
    ///
    /// A safety cap independent of DPI so an oversized scan cannot exhaust
    /// memory; either dimension is capped and the other scales with it.
    pub max_rendered_pixels: u32,

    /// VLM model identifier, e.g. "gpt-4o". If None, uses the provider
    /// default.
    pub model: Option<String>,

    /// VLM provider name (e.g. "openai", "anthropic", "ollama").
    /// If None along with `provider`, the provider is auto-detected from
    /// environment API keys.
    pub provider_name: Option<String>,

    /// Pre-constructed VLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Sampling temperature for the VLM completion. Default: 0.1.
    ///
    /// Transcription wants determinism; higher values make the model
    /// inventive about digits, which is exactly wrong here.
    pub temperature: f32,

    /// Maximum tokens the VLM may generate per page. Default: 3000.
    ///
    /// A full sheet is ~40 rows of short JSON objects; 3000 covers that
    /// with headroom. Too low silently truncates the array mid-row.
    pub max_tokens: usize,

    /// Custom extraction prompt. If None, uses
    /// [`crate::prompts::TABLE_EXTRACTION_PROMPT`].
    pub prompt: Option<String>,

    /// Page selection. Default: all pages.
    pub pages: PageSelection,

    /// Directory for the persisted enhanced page images. If None, a
    /// temporary directory is created for the run and cleaned up afterwards.
    ///
    /// Each page gets its own file (`enhanced_page_{n}.png`); nothing is
    /// overwritten mid-run, so the operator can still compare earlier pages.
    pub enhanced_dir: Option<PathBuf>,

    /// Confirmation gate invoked after enhancement, before the VLM call.
    ///
    /// `None` means auto-confirm: every page proceeds straight to
    /// extraction. The CLI installs a stdin gate by default so an operator
    /// can inspect the enhanced image and abort before spending an API
    /// call on a bad scan.
    pub gate: Option<Arc<dyn ConfirmationGate>>,

    /// Download timeout for URL inputs in seconds. Default: 120.
    pub download_timeout_secs: u64,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            dpi: 300,
            max_rendered_pixels: 4096,
            model: None,
            provider_name: None,
            provider: None,
            temperature: 0.1,
            max_tokens: 3000,
            prompt: None,
            pages: PageSelection::default(),
            enhanced_dir: None,
            gate: None,
            download_timeout_secs: 120,
        }
    }
}

impl fmt::Debug for ExtractionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtractionConfig")
            .field("dpi", &self.dpi)
            .field("max_rendered_pixels", &self.max_rendered_pixels)
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("pages", &self.pages)
            .field("enhanced_dir", &self.enhanced_dir)
            .field("gate", &self.gate.as_ref().map(|_| "<dyn ConfirmationGate>"))
            .finish()
    }
}

impl ExtractionConfig {
    /// Create a new builder for `ExtractionConfig`.
    pub fn builder() -> ExtractionConfigBuilder {
        ExtractionConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`ExtractionConfig`].
#[derive(Debug)]
pub struct ExtractionConfigBuilder {
    config: ExtractionConfig,
}

impl ExtractionConfigBuilder {
    pub fn dpi(mut self, dpi: u32) -> Self {
        self.config.dpi = dpi.clamp(72, 600);
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.max(100);
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.prompt = Some(prompt.into());
        self
    }

    pub fn pages(mut self, selection: PageSelection) -> Self {
        self.config.pages = selection;
        self
    }

    pub fn enhanced_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.enhanced_dir = Some(dir.into());
        self
    }

    pub fn confirmation_gate(mut self, gate: Arc<dyn ConfirmationGate>) -> Self {
        self.config.gate = Some(gate);
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ExtractionConfig, MeterSheetError> {
        let c = &self.config;
        if c.dpi < 72 || c.dpi > 600 {
            return Err(MeterSheetError::InvalidConfig(format!(
                "DPI must be 72–600, got {}",
                c.dpi
            )));
        }
        if c.max_tokens == 0 {
            return Err(MeterSheetError::InvalidConfig(
                "max_tokens must be ≥ 1".into(),
            ));
        }
        Ok(self.config)
    }
}

// ── Page selection ───────────────────────────────────────────────────────

/// Which pages of the PDF to process.
///
/// Useful when re-running a single sheet whose first extraction was poor,
/// without paying for the whole document again.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub enum PageSelection {
    /// Process every page (default).
    #[default]
    All,
    /// Process a single page (1-indexed).
    Single(usize),
    /// Process a contiguous range of pages (1-indexed, inclusive).
    Range(usize, usize),
}

impl PageSelection {
    /// Expand the selection into ordered 0-indexed page numbers, clipped to
    /// the document's page count. Out-of-range selections yield an empty
    /// list; the driver turns that into a fatal `PageOutOfRange`.
    pub fn to_indices(&self, total_pages: usize) -> Vec<usize> {
        match self {
            PageSelection::All => (0..total_pages).collect(),
            PageSelection::Single(p) => {
                if (1..=total_pages).contains(p) {
                    vec![p - 1]
                } else {
                    Vec::new()
                }
            }
            PageSelection::Range(start, end) => {
                let s = (*start).max(1) - 1;
                let e = (*end).min(total_pages);
                (s..e).collect()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_clamps_dpi() {
        let config = ExtractionConfig::builder().dpi(10_000).build().unwrap();
        assert_eq!(config.dpi, 600);
        let config = ExtractionConfig::builder().dpi(10).build().unwrap();
        assert_eq!(config.dpi, 72);
    }

    #[test]
    fn builder_rejects_zero_max_tokens() {
        assert!(ExtractionConfig::builder().max_tokens(0).build().is_err());
    }

    #[test]
    fn defaults_match_field_workflow() {
        let config = ExtractionConfig::default();
        assert_eq!(config.dpi, 300);
        assert_eq!(config.max_tokens, 3000);
        assert!(config.gate.is_none(), "library default is auto-confirm");
    }

    #[test]
    fn page_selection_expansion() {
        assert_eq!(PageSelection::All.to_indices(3), vec![0, 1, 2]);
        assert_eq!(PageSelection::Single(2).to_indices(3), vec![1]);
        assert_eq!(PageSelection::Single(4).to_indices(3), Vec::<usize>::new());
        assert_eq!(PageSelection::Range(2, 9).to_indices(4), vec![1, 2, 3]);
        assert_eq!(PageSelection::All.to_indices(0), Vec::<usize>::new());
    }
}
