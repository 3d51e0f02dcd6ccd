//! CLI binary for tessflow.
//!
//! A thin shim over the library crate: maps CLI flags onto a
//! `PipelineConfig`, resolves the inputs, runs one processor over them and
//! writes every routed document under `--out-dir/<channel>/`.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tessflow::language::LanguageIdentifier;
use tessflow::pipeline::input::resolve_input;
use tessflow::progress::{BatchProgressCallback, ProgressCallback};
use tessflow::{
    run_batch, BatchStats, ConvertProcessor, DirectorySession, Document, Engines, LanguageTables,
    OcrProcessor, Outcome, PageScope, PipelineConfig, Processor, SplitProcessor, TraversalReport,
    ValidationPolicy,
};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
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

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Live progress bar plus one log line per routed or failed document.
/// Documents finish out of order when `--concurrency` is above 1.
struct CliProgressCallback {
    bar: ProgressBar,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(TICKS),
        );
        bar.set_prefix("Preparing");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self { bar })
    }
}

impl BatchProgressCallback for CliProgressCallback {
    fn on_batch_start(&self, processor: &str, total_documents: usize) {
        self.bar.set_length(total_documents as u64);
        self.bar.set_style(
            ProgressStyle::with_template(
                "{spinner:.cyan} {prefix:.bold}  \
                 [{bar:42.green/238}] {pos:>3}/{len} documents  \
                 ⏱ {elapsed_precise}  ETA {eta_precise}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▉▊▋▌▍▎▏  ")
            .tick_strings(TICKS),
        );
        self.bar.set_prefix(processor.to_string());
        self.bar.reset_eta();
    }

    fn on_document_start(&self, _index: usize, filename: &str) {
        self.bar.set_message(filename.to_string());
    }

    fn on_document_routed(&self, _index: usize, report: &TraversalReport) {
        let language = report
            .language
            .as_ref()
            .map(|l| format!("  [{l}]"))
            .unwrap_or_default();
        self.bar.println(format!(
            "  {} {}  {}{}",
            green("✓"),
            report.filename,
            dim(&format!("{} artifact(s)", report.ledger.committed.len())),
            dim(&language),
        ));
        self.bar.inc(1);
    }

    fn on_document_failed(&self, _index: usize, report: &TraversalReport) {
        let reason = match &report.outcome {
            Outcome::Failed { stage, error } => format!("{stage}: {error}"),
            Outcome::Routed { .. } => String::new(),
        };
        let reason = if reason.chars().count() > 80 {
            format!("{}\u{2026}", reason.chars().take(79).collect::<String>())
        } else {
            reason
        };
        self.bar.println(format!(
            "  {} {}  {}",
            red("✗"),
            report.filename,
            red(&reason)
        ));
        self.bar.inc(1);
    }

    fn on_batch_complete(&self, total_documents: usize, routed: usize) {
        self.bar.finish_and_clear();
        let failed = total_documents.saturating_sub(routed);
        if failed == 0 {
            eprintln!(
                "{} {} documents routed",
                green("✔"),
                bold(&routed.to_string())
            );
        } else {
            eprintln!(
                "{} {}/{} documents routed  ({} failed)",
                if routed == 0 { red("✘") } else { cyan("⚠") },
                bold(&routed.to_string()),
                total_documents,
                red(&failed.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # OCR a scan, language from the default (eng)
  tessflow ocr scan.tif

  # Language from the filename, falling back to text detection
  tessflow ocr --mode regexORtextdetection report-fra_00007.pdf

  # Every PDF page, packaged as a paginated PDF
  tessflow ocr --all-pages --output-format PDFDOC book.pdf

  # Split a PDF into single pages
  tessflow split --out-dir pages/ letter.pdf

  # Convert a PDF into one multi-page TIFF
  tessflow convert scan.pdf

  # Options from a properties file, overridden by flags
  tessflow ocr --config ocr.properties --lenient *.png

OUTPUT LAYOUT:
  <out-dir>/files/      successful artifacts (and OCR sources)
  <out-dir>/original/   sources of successful splits and conversions
  <out-dir>/failure/    documents that could not be processed
  Every file has a <name>.attributes.json sidecar with its lineage.

ENVIRONMENT VARIABLES:
  PDFIUM_LIB_PATH      Path to libpdfium (file or directory)
  TESSFLOW_*           Defaults for most flags, e.g. TESSFLOW_MODE=regex
  RUST_LOG             Overrides the log filter
"#;

/// Route documents through OCR, page splitting or TIFF conversion.
#[derive(Parser, Debug)]
#[command(
    name = "tessflow",
    version,
    about = "Route documents through OCR, page splitting or TIFF conversion",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Recognize text with Tesseract.
    Ocr {
        #[command(flatten)]
        common: CommonArgs,
        #[command(flatten)]
        ocr: OcrArgs,
    },
    /// Split PDFs into single-page PDFs.
    Split {
        #[command(flatten)]
        common: CommonArgs,
    },
    /// Convert PDFs into multi-page TIFFs.
    Convert {
        #[command(flatten)]
        common: CommonArgs,
    },
}

#[derive(Args, Debug)]
struct CommonArgs {
    /// Local file paths or HTTP/HTTPS URLs.
    #[arg(required = true)]
    inputs: Vec<String>,

    /// Root of the channel directories.
    #[arg(short, long, env = "TESSFLOW_OUT_DIR", default_value = "tessflow-out")]
    out_dir: PathBuf,

    /// Properties file with pipeline options; flags override it.
    #[arg(long, env = "TESSFLOW_CONFIG")]
    config: Option<PathBuf>,

    /// Documents processed concurrently.
    #[arg(short, long, env = "TESSFLOW_CONCURRENCY")]
    concurrency: Option<usize>,

    /// Print the traversal reports as JSON on stdout.
    #[arg(long, env = "TESSFLOW_JSON")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "TESSFLOW_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "TESSFLOW_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "TESSFLOW_QUIET")]
    quiet: bool,

    /// HTTP download timeout in seconds.
    #[arg(long, env = "TESSFLOW_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    /// Upper bound in seconds for each blocking stage (0 = none).
    #[arg(long, env = "TESSFLOW_STAGE_TIMEOUT")]
    stage_timeout: Option<u64>,

    /// Path to libpdfium, or the directory holding it.
    #[arg(long, env = "PDFIUM_LIB_PATH")]
    pdfium_lib: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct OcrArgs {
    /// none, regex, textdetection, regexORtextdetection or textdetectionORregex.
    #[arg(long, env = "TESSFLOW_MODE")]
    mode: Option<String>,

    /// Filename pattern; capture group 1 is the language.
    #[arg(long, env = "TESSFLOW_REGEX")]
    regex: Option<String>,

    /// Tesseract tessdata directory.
    #[arg(long, env = "TESSFLOW_INSTALL_DIR")]
    install_dir: Option<String>,

    /// Tesseract OCR engine mode (0–2).
    #[arg(long, env = "TESSFLOW_ENGINE_MODE")]
    engine_mode: Option<u8>,

    /// Tesseract page segmentation mode (0–13).
    #[arg(long, env = "TESSFLOW_PSM")]
    psm: Option<u8>,

    /// Language used when none is resolved.
    #[arg(long, env = "TESSFLOW_DEFAULT_LANGUAGE")]
    default_language: Option<String>,

    /// TXT or PDFDOC.
    #[arg(long, env = "TESSFLOW_OUTPUT_FORMAT")]
    output_format: Option<String>,

    /// Substitute the default language instead of failing on a disallowed code.
    #[arg(long, env = "TESSFLOW_LENIENT")]
    lenient: bool,

    /// Recognize every PDF page instead of the first.
    #[arg(long, env = "TESSFLOW_ALL_PAGES")]
    all_pages: bool,

    /// Path to the tesseract executable.
    #[arg(long, env = "TESSFLOW_TESSERACT")]
    tesseract: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    let (common, ocr) = match &cli.command {
        Command::Ocr { common, ocr } => (common, Some(ocr)),
        Command::Split { common } | Command::Convert { common } => (common, None),
    };

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO-level logs unless --verbose is given.
    let show_progress = !common.quiet && !common.no_progress && !common.json;
    let filter = if common.verbose {
        "debug"
    } else if common.quiet || show_progress {
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

    // ── Build config and processor ───────────────────────────────────────
    let config = build_config(common, ocr)?;
    let concurrency = config.concurrency;
    let processor: Arc<dyn Processor> = match &cli.command {
        Command::Ocr { .. } => {
            let tables = LanguageTables::load(
                config.iso639_mapping_path.as_deref(),
                config.allowed_languages_path.as_deref(),
            )
            .context("Failed to load language tables")?;
            let engines = Engines::system(&config).with_identifier(identifier(&config));
            Arc::new(
                OcrProcessor::new(Arc::new(config), Arc::new(tables), engines)
                    .context("Invalid configuration")?,
            )
        }
        Command::Split { .. } => Arc::new(SplitProcessor::from_config(config)?),
        Command::Convert { .. } => Arc::new(ConvertProcessor::from_config(config)?),
    };

    // ── Resolve inputs ───────────────────────────────────────────────────
    let mut documents: Vec<Document> = Vec::with_capacity(common.inputs.len());
    let mut unreadable = 0usize;
    for input in &common.inputs {
        match resolve_input(input, common.download_timeout).await {
            Ok(doc) => documents.push(doc),
            Err(e) => {
                unreadable += 1;
                eprintln!("{} {}", red("✗"), e);
            }
        }
    }

    DirectorySession::prepare(&common.out_dir).with_context(|| {
        format!("Failed to prepare output directory {}", common.out_dir.display())
    })?;

    // ── Run ──────────────────────────────────────────────────────────────
    let progress: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn BatchProgressCallback>)
    } else {
        None
    };

    let out_dir = common.out_dir.clone();
    let results = run_batch(
        processor,
        documents,
        concurrency,
        move || DirectorySession::new(out_dir.clone()),
        progress,
    )
    .await;
    let reports: Vec<TraversalReport> = results.into_iter().map(|(report, _)| report).collect();
    let stats = BatchStats::from_reports(&reports);

    if common.json {
        let json = serde_json::to_string_pretty(&serde_json::json!({
            "stats": stats,
            "reports": reports,
        }))
        .context("Failed to serialise reports")?;
        println!("{json}");
    } else if !common.quiet && !show_progress {
        for report in &reports {
            match &report.outcome {
                Outcome::Routed { channel } => {
                    eprintln!("{} {} → {}", green("✓"), report.filename, channel)
                }
                Outcome::Failed { stage, error } => {
                    eprintln!("{} {} failed at {}: {}", red("✗"), report.filename, stage, error)
                }
            }
        }
        eprintln!(
            "Routed {}/{} documents, {} artifact(s) written to {}",
            stats.routed,
            stats.total,
            stats.artifacts_committed,
            bold(&common.out_dir.display().to_string())
        );
    }

    if stats.all_routed() && unreadable == 0 {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}

/// Layer CLI flags over the properties file (or the defaults).
fn build_config(common: &CommonArgs, ocr: Option<&OcrArgs>) -> Result<PipelineConfig> {
    let base = match &common.config {
        Some(path) => PipelineConfig::from_properties_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => PipelineConfig::default(),
    };

    let mut b = base.into_builder();
    if let Some(n) = common.concurrency {
        b = b.concurrency(n);
    }
    if let Some(secs) = common.stage_timeout {
        b = b.stage_timeout_secs(secs);
    }
    if let Some(ref path) = common.pdfium_lib {
        b = b.pdfium_library_path(path.clone());
    }

    if let Some(ocr) = ocr {
        if let Some(ref mode) = ocr.mode {
            b = b.strategy(mode.parse().context("Invalid --mode")?);
        }
        if let Some(ref regex) = ocr.regex {
            b = b.language_regex(regex.clone());
        }
        if let Some(ref dir) = ocr.install_dir {
            b = b.install_dir(dir.clone());
        }
        if let Some(mode) = ocr.engine_mode {
            b = b.engine_mode(mode);
        }
        if let Some(psm) = ocr.psm {
            b = b.page_seg_mode(psm);
        }
        if let Some(ref lang) = ocr.default_language {
            b = b.default_language(lang.clone());
        }
        if let Some(ref format) = ocr.output_format {
            b = b.output_format(format.parse().context("Invalid --output-format")?);
        }
        if ocr.lenient {
            b = b.validation(ValidationPolicy::Lenient);
        }
        if ocr.all_pages {
            b = b.page_scope(PageScope::All);
        }
        if let Some(ref bin) = ocr.tesseract {
            b = b.tesseract_binary(bin.clone());
        }
    }

    b.build().context("Invalid configuration")
}

/// The language identifier, with its model loaded up front when the
/// configured strategy will need it.
fn identifier(config: &PipelineConfig) -> Arc<dyn LanguageIdentifier> {
    #[cfg(feature = "detect")]
    {
        let lingua = Arc::new(tessflow::language::LinguaIdentifier::new());
        if config.strategy.uses_detection() {
            tokio::task::block_in_place(|| {
                lingua.preload();
            });
        }
        let id: Arc<dyn LanguageIdentifier> = lingua;
        id
    }
    #[cfg(not(feature = "detect"))]
    {
        let _ = config;
        Arc::new(tessflow::language::DisabledIdentifier)
    }
}
