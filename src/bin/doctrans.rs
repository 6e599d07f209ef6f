//! CLI binary for edgequake-doctrans.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `TranslatorConfig` and prints a summary.

use anyhow::{Context, Result};
use clap::Parser;
use edgequake_doctrans::{
    translate_file, translate_file_to, ProgressCallback, RetryPolicy, Stage,
    TranslationOutput, TranslationProgressCallback, TranslatorConfig,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
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

/// Spinner for stages, switched to a bar once the page count is known.
struct CliProgressCallback {
    bar: ProgressBar,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);
        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Opening document…");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self { bar })
    }

    fn activate_bar(&self, total: usize) {
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} pages  \
             ⏱ {elapsed_precise}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);
        self.bar.set_length(total as u64);
        self.bar.set_style(style);
        self.bar.set_prefix("Analysing");
        self.bar.reset_eta();
    }
}

impl TranslationProgressCallback for CliProgressCallback {
    fn on_job_start(&self, input: &Path, family: &str) {
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Translating {} ({family})", input.display()))
        ));
    }

    fn on_stage_start(&self, stage: Stage) {
        self.bar.set_prefix(stage.to_string());
        self.bar.set_message("");
    }

    fn on_stage_complete(&self, stage: Stage, items: usize) {
        if stage == Stage::Render && self.bar.length().unwrap_or(0) == 0 {
            self.activate_bar(items);
        }
        self.bar.println(format!(
            "  {} {:<10} {}",
            green("✓"),
            stage.to_string(),
            dim(&format!("{items} items"))
        ));
    }

    fn on_page_start(&self, page_num: usize, total: usize) {
        self.bar.set_message(format!("page {page_num}/{total}"));
    }

    fn on_page_complete(&self, _page_num: usize, _total: usize, _blocks: usize) {
        self.bar.inc(1);
    }

    fn on_page_degraded(&self, page_num: usize, total: usize) {
        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {}",
            cyan("⚠"),
            page_num,
            total,
            dim("unstructured reply, kept as one paragraph")
        ));
    }

    fn on_job_complete(&self, _output: &Path) {
        self.bar.finish_and_clear();
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Spreadsheet: writes quote_en_translated.xlsx next to the input
  doctrans quote.xlsx

  # Word document to a chosen path
  doctrans contract.docx -o contract_en.docx

  # Scanned PDF with a specific model
  doctrans --model gpt-4o --provider openai scan.pdf

  # Image from a URL, JSON summary on stdout
  doctrans --json https://example.com/label.png

SUPPORTED INPUTS:
  Family        Extensions                              Output
  ───────────   ──────────────────────────────────────  ──────
  spreadsheet   .xlsx .xlsm (.xls rejected)             .xlsx
  word          .docx (.doc rejected)                   .docx
  pdf           .pdf                                    .docx
  image         .png .jpg .jpeg .gif .bmp .tiff .webp   .docx

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY          OpenAI API key
  ANTHROPIC_API_KEY       Anthropic API key
  GEMINI_API_KEY          Google Gemini API key
  EDGEQUAKE_LLM_PROVIDER  Override provider (openai, anthropic, gemini, ollama)
  EDGEQUAKE_MODEL         Override model ID
  PDFIUM_LIB_PATH         Path to libpdfium (otherwise the system library)
"#;

/// Translate spreadsheets, Word documents, PDFs and images into English.
#[derive(Parser, Debug)]
#[command(
    name = "doctrans",
    version,
    about = "Translate spreadsheets, Word documents, PDFs and images into English",
    long_about = "Translate documents (local files or URLs) into English with an LLM while \
preserving layout. Spreadsheets are edited in place, cell by cell; Word documents, PDFs and \
images are rebuilt as formatted .docx files. Supports OpenAI, Anthropic, Google Gemini, Azure \
OpenAI, and any OpenAI-compatible endpoint (Ollama, vLLM, LiteLLM, etc.).",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Local file path or HTTP/HTTPS URL.
    input: String,

    /// Output path. Default: <stem>_en_translated.<xlsx|docx> next to the input.
    #[arg(short, long, env = "DOCTRANS_OUTPUT")]
    output: Option<PathBuf>,

    /// LLM model ID (text and vision). Default: gpt-4o.
    #[arg(long, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// LLM provider: openai, anthropic, gemini, ollama, azure.
    #[arg(long, env = "EDGEQUAKE_PROVIDER")]
    provider: Option<String>,

    /// Largest number of fragments per batch request.
    #[arg(long, env = "DOCTRANS_BATCH_SIZE", default_value_t = 20)]
    batch_size: usize,

    /// Rendering DPI for PDF pages (72–600).
    #[arg(long, env = "DOCTRANS_DPI", default_value_t = 300,
          value_parser = clap::value_parser!(u32).range(72..=600))]
    dpi: u32,

    /// PDF user password for encrypted documents.
    #[arg(long, env = "DOCTRANS_PASSWORD")]
    password: Option<String>,

    /// Max completion tokens per call.
    #[arg(long, env = "DOCTRANS_MAX_TOKENS", default_value_t = 16384)]
    max_tokens: usize,

    /// LLM temperature (0.0–2.0).
    #[arg(long, env = "DOCTRANS_TEMPERATURE", default_value_t = 0.1)]
    temperature: f32,

    /// Attempts per model call, first one included.
    #[arg(long, env = "DOCTRANS_MAX_ATTEMPTS", default_value_t = 3)]
    max_attempts: u32,

    /// Character substituted for anything that stays untranslatable.
    #[arg(long, env = "DOCTRANS_PLACEHOLDER", default_value_t = '?')]
    placeholder: char,

    /// Share of placeholder fallbacks above which the output is flagged for review.
    #[arg(long, env = "DOCTRANS_REVIEW_THRESHOLD", default_value_t = 0.0)]
    review_threshold: f64,

    /// Suffix for the default output file name.
    #[arg(long, env = "DOCTRANS_SUFFIX", default_value = "_en_translated")]
    suffix: String,

    /// Print the translation summary as JSON on stdout.
    #[arg(long, env = "DOCTRANS_JSON")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "DOCTRANS_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "DOCTRANS_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "DOCTRANS_QUIET")]
    quiet: bool,

    /// HTTP download timeout in seconds.
    #[arg(long, env = "DOCTRANS_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO-level library logs.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
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

    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn TranslationProgressCallback>)
    } else {
        None
    };
    let config = build_config(&cli, progress_cb)?;

    let output = match cli.output {
        Some(ref path) => translate_file_to(&cli.input, path, &config).await,
        None => translate_file(&cli.input, &config).await,
    }
    .with_context(|| format!("Translation of {} failed", cli.input))?;

    if cli.json {
        let json = serde_json::to_string_pretty(&output).context("Failed to serialise output")?;
        println!("{json}");
    } else if !cli.quiet {
        print_summary(&output);
    }
    Ok(())
}

/// Map CLI args to `TranslatorConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<TranslatorConfig> {
    let text_retry = RetryPolicy {
        max_attempts: cli.max_attempts,
        ..RetryPolicy::text()
    };
    let vision_retry = RetryPolicy {
        max_attempts: cli.max_attempts,
        ..RetryPolicy::vision()
    };

    let mut builder = TranslatorConfig::builder()
        .batch_size(cli.batch_size)
        .dpi(cli.dpi)
        .max_tokens(cli.max_tokens)
        .temperature(cli.temperature)
        .text_retry(text_retry)
        .vision_retry(vision_retry)
        .placeholder(cli.placeholder)
        .review_threshold(cli.review_threshold)
        .output_suffix(cli.suffix.clone())
        .download_timeout_secs(cli.download_timeout);

    if let Some(ref model) = cli.model {
        builder = builder.model(model.clone());
    }
    if let Some(ref provider) = cli.provider {
        builder = builder.provider_name(provider.clone());
    }
    if let Some(ref pwd) = cli.password {
        builder = builder.password(pwd.clone());
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

fn print_summary(output: &TranslationOutput) {
    let doc = &output.document;
    let session = &output.session;
    eprintln!(
        "{}  {} {}  {}ms  →  {}",
        if doc.needs_review { cyan("⚠") } else { green("✔") },
        output.pages,
        if output.pages == 1 { "page" } else { "pages" },
        output.duration_ms,
        bold(&output.output_path.display().to_string()),
    );
    if let Some(counters) = &doc.spreadsheet {
        eprintln!(
            "   {} cells  /  {} header-footer segments  /  {} comments",
            dim(&counters.cells.to_string()),
            dim(&counters.header_footer_segments.to_string()),
            dim(&counters.comments.to_string()),
        );
        eprintln!(
            "   {} members restored  /  {} drawing runs  /  {} validation fixes",
            dim(&doc.restored_members.to_string()),
            dim(&doc.drawing_runs.to_string()),
            dim(&doc.validation_fixes.to_string()),
        );
    }
    if doc.degraded_pages > 0 {
        eprintln!("   {} pages kept as plain text", cyan(&doc.degraded_pages.to_string()));
    }
    eprintln!(
        "   {} model calls  /  {} cache hits  /  {} terms",
        dim(&session.model_calls.to_string()),
        dim(&session.cache_hits.to_string()),
        dim(&session.terminology_size.to_string()),
    );
    if doc.needs_review {
        eprintln!(
            "   {} {} items fell back to placeholders; review the output",
            red("!"),
            doc.forced_fallbacks
        );
    }
    if let Some(err) = &doc.validation_error {
        eprintln!("   {} validation stopped early: {}", red("!"), err);
    }
}
