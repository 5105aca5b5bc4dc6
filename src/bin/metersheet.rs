//! CLI binary for metersheet.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `ExtractionConfig`, installs the interactive confirmation gate, and
//! prints the run summary.

use anyhow::{Context, Result};
use clap::Parser;
use metersheet::{
    run_to_csv, ConfirmationGate, ExtractionConfig, MeterSheetError, PageSelection, RunOutput,
};
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

// ── Interactive confirmation gate ────────────────────────────────────────────

/// Blocking stdin gate: shows where the enhanced image landed and waits for
/// the operator. Anything other than an explicit "n"/"no" proceeds, so an
/// operator hammering Enter through a good batch is never slowed down.
struct StdinGate;

impl ConfirmationGate for StdinGate {
    fn confirm_page(&self, page_num: usize, total_pages: usize, enhanced_path: &Path) -> bool {
        eprintln!(
            "\n{} Page {}/{} enhanced → {}",
            cyan("◆"),
            page_num,
            total_pages,
            bold(&enhanced_path.display().to_string())
        );
        eprint!("  Inspect the image, then extract this page? [Y/n] ");
        let _ = io::stderr().flush();

        let mut line = String::new();
        if io::stdin().lock().read_line(&mut line).is_err() {
            // stdin closed (e.g. piped run without --yes): fail safe, abort.
            return false;
        }
        let answer = line.trim().to_lowercase();
        !(answer == "n" || answer == "no")
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Extract a scanned batch to CSV
  metersheet sheets.pdf -o ocitanja.csv

  # Unattended run (skip the per-page confirmation prompt)
  metersheet --yes sheets.pdf -o ocitanja.csv

  # Re-run a single bad page at higher DPI
  metersheet --pages 3 --dpi 400 sheets.pdf -o page3.csv

  # Use a specific model
  metersheet --model gpt-4o --provider openai sheets.pdf

  # Download the batch from the utility's scan server
  metersheet https://scans.example.net/batch-2024-07.pdf -o batch.csv

  # Keep the enhanced page images for archiving
  metersheet --enhanced-dir ./enhanced sheets.pdf -o out.csv

  # Machine-readable output with per-page detail and warnings
  metersheet --yes --json sheets.pdf > run.json

OUTPUT FORMAT:
  CSV with header: sifra,novi_status,staro_stanje,novo_stanje,status
  status is "Ispravan" for readings accepted as written and "Neispravan"
  for readings that were below the previous total and were corrected
  upward. Validation warnings (implausible consumption, digit-count
  mismatches) go to stderr and the --json report, never into the CSV.

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY          OpenAI API key
  ANTHROPIC_API_KEY       Anthropic API key
  GEMINI_API_KEY          Google Gemini API key
  EDGEQUAKE_LLM_PROVIDER  Override provider (openai, anthropic, gemini, ollama)
  EDGEQUAKE_MODEL         Override model ID
  PDFIUM_LIB_PATH         Path to an existing libpdfium

SETUP:
  1. Set API key:  export OPENAI_API_KEY=sk-...
  2. Extract:      metersheet sheets.pdf -o ocitanja.csv
"#;

/// Extract validated water-meter readings from scanned sheets.
#[derive(Parser, Debug)]
#[command(
    name = "metersheet",
    version,
    about = "Extract validated water-meter readings from scanned PDF sheets using Vision LLMs",
    long_about = "Extract handwritten water-meter readings from scanned reading sheets (local \
PDF or URL) into a validated, billing-ready CSV. Each page is enhanced for legibility, shown \
to you for confirmation, read by a Vision Language Model, and every row is validated: meter \
totals that decreased are corrected upward and flagged, implausible jumps produce warnings.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Local PDF file path or HTTP/HTTPS URL.
    input: String,

    /// Write the CSV to this file.
    #[arg(short, long, env = "METERSHEET_OUTPUT", default_value = "ocitanja.csv")]
    output: PathBuf,

    /// VLM model ID (e.g. gpt-4o, claude-sonnet-4-20250514).
    #[arg(long, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// VLM provider: openai, anthropic, gemini, ollama.
    #[arg(
        long,
        env = "EDGEQUAKE_PROVIDER",
        long_help = "VLM provider. Auto-detected from API key env vars if not set.\n\
          Supported: openai, anthropic, gemini, ollama, or any OpenAI-compatible endpoint."
    )]
    provider: Option<String>,

    /// Rendering DPI (72–600). Raise for faint pencil entries.
    #[arg(long, env = "METERSHEET_DPI", default_value_t = 300,
          value_parser = clap::value_parser!(u32).range(72..=600))]
    dpi: u32,

    /// Page selection: all, 5, or 3-15.
    #[arg(long, env = "METERSHEET_PAGES", default_value = "all")]
    pages: String,

    /// Directory to keep the enhanced page images in (default: temp dir,
    /// deleted after the run).
    #[arg(long, env = "METERSHEET_ENHANCED_DIR")]
    enhanced_dir: Option<PathBuf>,

    /// Path to a text file containing a custom extraction prompt.
    #[arg(long, env = "METERSHEET_PROMPT")]
    prompt: Option<PathBuf>,

    /// Max VLM output tokens per page.
    #[arg(long, env = "METERSHEET_MAX_TOKENS", default_value_t = 3000)]
    max_tokens: usize,

    /// VLM temperature (0.0–2.0).
    #[arg(long, env = "METERSHEET_TEMPERATURE", default_value_t = 0.1)]
    temperature: f32,

    /// Skip the per-page confirmation prompt (unattended mode).
    #[arg(short = 'y', long, env = "METERSHEET_YES")]
    yes: bool,

    /// Print the full run report as JSON to stdout instead of a summary.
    /// Implies --yes (JSON runs are unattended).
    #[arg(long, env = "METERSHEET_JSON")]
    json: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "METERSHEET_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors and the confirmation prompt.
    #[arg(short, long, env = "METERSHEET_QUIET")]
    quiet: bool,

    /// HTTP download timeout in seconds.
    #[arg(long, env = "METERSHEET_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let config = build_config(&cli).await?;

    // ── Run extraction ───────────────────────────────────────────────────
    let output = match run_to_csv(&cli.input, &cli.output, &config).await {
        Ok(output) => output,
        Err(MeterSheetError::Aborted { page }) => {
            eprintln!(
                "{} Run aborted at page {} — no CSV written. Rescan the sheet and retry.",
                yellow("⚠"),
                page
            );
            std::process::exit(2);
        }
        Err(e) => return Err(e).context("Extraction failed"),
    };

    if cli.json {
        let json = serde_json::to_string_pretty(&output).context("Failed to serialise report")?;
        println!("{json}");
    } else if !cli.quiet {
        print_summary(&output, &cli.output);
    }

    Ok(())
}

/// Human summary after a completed run.
fn print_summary(output: &RunOutput, csv_path: &Path) {
    let stats = &output.stats;

    eprintln!(
        "\n{}  {} readings from {} pages  {}ms  →  {}",
        if stats.failed_pages == 0 {
            green("✔")
        } else {
            yellow("⚠")
        },
        bold(&stats.total_readings.to_string()),
        stats.processed_pages + stats.empty_pages + stats.failed_pages,
        stats.total_duration_ms,
        bold(&csv_path.display().to_string()),
    );

    if stats.corrected_readings > 0 {
        eprintln!(
            "   {} readings corrected upward (marked {})",
            yellow(&stats.corrected_readings.to_string()),
            dim("Neispravan")
        );
    }
    if stats.warning_count > 0 {
        eprintln!(
            "   {} validation warnings — review them above before importing",
            yellow(&stats.warning_count.to_string())
        );
    }
    if stats.skipped_rows > 0 {
        eprintln!(
            "   {} rows dropped as unreadable",
            red(&stats.skipped_rows.to_string())
        );
    }
    if stats.failed_pages > 0 {
        eprintln!("   {} pages failed", red(&stats.failed_pages.to_string()));
    }

    // First few rows as a sanity check against the paper batch.
    for reading in output.readings.iter().take(3) {
        eprintln!(
            "   {}",
            dim(&format!(
                "{}  {} → {}  {}",
                reading.code,
                reading.previous_reading,
                reading.current_reading,
                reading.verdict.as_csv_str()
            ))
        );
    }
    if output.readings.len() > 3 {
        eprintln!("   {}", dim(&format!("… {} more", output.readings.len() - 3)));
    }

    if stats.total_readings == 0 {
        eprintln!(
            "{} No readings extracted. The CSV contains only the header. \
             Try --dpi 400 or rescan the batch.",
            yellow("⚠")
        );
    }
}

/// Map CLI args to `ExtractionConfig`.
async fn build_config(cli: &Cli) -> Result<ExtractionConfig> {
    let pages = parse_pages(&cli.pages)?;

    let mut builder = ExtractionConfig::builder()
        .dpi(cli.dpi)
        .pages(pages)
        .max_tokens(cli.max_tokens)
        .temperature(cli.temperature)
        .download_timeout_secs(cli.download_timeout);

    if let Some(ref dir) = cli.enhanced_dir {
        builder = builder.enhanced_dir(dir.clone());
    }

    if let Some(ref path) = cli.prompt {
        let prompt = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read prompt from {:?}", path))?;
        builder = builder.prompt(prompt);
    }

    if !cli.yes && !cli.json {
        builder = builder.confirmation_gate(Arc::new(StdinGate) as Arc<dyn ConfirmationGate>);
    }

    let mut config = builder.build().context("Invalid configuration")?;

    // Fields the builder has no setters for when coming straight from flags.
    config.model = cli.model.clone();
    config.provider_name = cli.provider.clone();

    Ok(config)
}

/// Parse `--pages` string into `PageSelection`.
fn parse_pages(s: &str) -> Result<PageSelection> {
    let s = s.trim().to_lowercase();

    if s == "all" {
        return Ok(PageSelection::All);
    }

    // Range: "3-15"
    if let Some((start, end)) = s.split_once('-') {
        let start: usize = start.trim().parse().context("Invalid start page in range")?;
        let end: usize = end.trim().parse().context("Invalid end page in range")?;

        if start < 1 {
            anyhow::bail!("Pages are 1-indexed, minimum is 1 (got {})", start);
        }
        if start > end {
            anyhow::bail!("Invalid page range '{}-{}': start must be <= end", start, end);
        }

        return Ok(PageSelection::Range(start, end));
    }

    // Single page: "5"
    let page: usize = s.parse().context("Invalid page number")?;
    if page < 1 {
        anyhow::bail!("Pages are 1-indexed, minimum is 1 (got {})", page);
    }

    Ok(PageSelection::Single(page))
}
