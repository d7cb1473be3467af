//! CLI binary for market-lens.
//!
//! A thin shim over the library crate that maps CLI flags to `LensConfig`,
//! expands directories to the PDFs inside them and prints the batch report.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use market_lens::digest::{assign_unique_ids, document_dir, rebase_thumbnails};
use market_lens::pipeline::input::{is_url, resolve_input};
use market_lens::progress::ProgressCallback;
use market_lens::{
    extract_candidates, process_batch, BatchReport, Candidate, DigestProgressCallback,
    DocumentOutcome, DocumentSource, JsonLedger, Ledger, LensConfig, LlmRelevanceModel,
    RegionConfig, RelevanceModel,
};
use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
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
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// One bar for the batch plus a log line per finished document. Documents
/// may finish out of order when `--concurrency` > 1.
struct CliProgressCallback {
    bar: ProgressBar,
    errors: AtomicUsize,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} reports  \
             ⏱ {elapsed_precise}  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);

        bar.set_style(style);
        bar.set_prefix("Digesting");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            errors: AtomicUsize::new(0),
        })
    }
}

impl DigestProgressCallback for CliProgressCallback {
    fn on_batch_start(&self, total_documents: usize) {
        self.bar.set_length(total_documents as u64);
        self.bar.reset_eta();
    }

    fn on_document_start(&self, name: &str) {
        self.bar.set_message(name.to_string());
    }

    fn on_document_skipped(&self, name: &str) {
        self.bar.println(format!(
            "  {} {}  {}",
            yellow("↷"),
            name,
            dim("already processed")
        ));
        self.bar.inc(1);
    }

    fn on_document_complete(&self, name: &str, gallery_len: usize) {
        self.bar.println(format!(
            "  {} {}  {}",
            green("✓"),
            name,
            dim(&format!("{gallery_len} regions"))
        ));
        self.bar.inc(1);
    }

    fn on_document_error(&self, name: &str, error: &str) {
        self.errors.fetch_add(1, Ordering::SeqCst);
        let first_line = error.lines().next().unwrap_or(error);
        let msg = if first_line.chars().count() > 80 {
            format!("{}\u{2026}", first_line.chars().take(79).collect::<String>())
        } else {
            first_line.to_string()
        };
        self.bar
            .println(format!("  {} {}  {}", red("✗"), name, red(&msg)));
        self.bar.inc(1);
    }

    fn on_batch_complete(&self, total_documents: usize, digested: usize) {
        self.bar.finish_and_clear();
        let errors = self.errors.load(Ordering::SeqCst);
        let mark = if errors == 0 { green("✔") } else { red("✘") };
        eprintln!(
            "{} {}/{} reports digested  ({} failed)",
            mark,
            bold(&digested.to_string()),
            total_documents,
            errors
        );
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Digest every PDF in a folder into ./out
  market-lens reports/

  # Several files and a URL, two at a time
  market-lens -c 2 q3.pdf q4.pdf https://example.com/outlook.pdf

  # Only list detected charts/tables (no LLM needed)
  market-lens --candidates-only q3.pdf

  # Digest without ranking (no gallery), ignoring the ledger
  market-lens --no-rank --force reports/

  # Digest at most five new documents this run
  market-lens --limit 5 reports/

  # Machine-readable batch report
  market-lens --json reports/ > report.json

OUTPUT LAYOUT (under --output):
  <doc>.json                  digest: candidates, ranking, gallery, hero figure
  <doc>/thumbs/<id>.png       chart thumbnails
  <doc>/slices/<id>.png       cropped top-N regions
  assets/<doc>_figure.png     hero figure
  assets/<doc>_page1.png      first-page preview

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY          OpenAI API key
  ANTHROPIC_API_KEY       Anthropic API key
  GEMINI_API_KEY          Google Gemini API key
  EDGEQUAKE_LLM_PROVIDER  Override provider (openai, anthropic, gemini, ollama)
  EDGEQUAKE_MODEL         Override model ID
  PDFIUM_LIB_PATH         Path to libpdfium (file or directory)
  RUST_LOG                Log filter, overrides -v / -q
"#;

/// Find, rank and crop the charts and tables that matter in PDF market reports.
#[derive(Parser, Debug)]
#[command(
    name = "market-lens",
    version,
    about = "Find, rank and crop the charts and tables that matter in PDF market reports",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// PDF files, directories of PDFs, or HTTP/HTTPS URLs.
    #[arg(required = true)]
    inputs: Vec<String>,

    /// Output root for digests and images.
    #[arg(short, long, env = "MARKET_LENS_OUTPUT", default_value = "out")]
    output: PathBuf,

    /// Idempotency ledger (JSON). Defaults to <output>/ledger.json.
    #[arg(long, env = "MARKET_LENS_LEDGER")]
    ledger: Option<PathBuf>,

    /// LLM model ID for ranking (e.g. gpt-4.1-nano, gpt-4.1-mini).
    #[arg(long, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// LLM provider: openai, anthropic, gemini, ollama, azure.
    #[arg(long, env = "EDGEQUAKE_PROVIDER")]
    provider: Option<String>,

    /// Number of documents processed at once.
    #[arg(short, long, env = "MARKET_LENS_CONCURRENCY", default_value_t = 1)]
    concurrency: usize,

    /// Regions cropped into the gallery.
    #[arg(long, env = "MARKET_LENS_TOP_N", default_value_t = 3)]
    top_n: usize,

    /// Table candidates kept per document.
    #[arg(long, env = "MARKET_LENS_MAX_TABLES", default_value_t = 10)]
    max_tables: usize,

    /// Padding around cropped regions, in PDF points.
    #[arg(long, env = "MARKET_LENS_CROP_PAD", default_value_t = 8.0)]
    crop_pad: f64,

    /// First-page preview DPI (72–400).
    #[arg(long, env = "MARKET_LENS_PREVIEW_DPI", default_value_t = 144,
          value_parser = clap::value_parser!(u32).range(72..=400))]
    preview_dpi: u32,

    /// Skip the first-page preview.
    #[arg(long, env = "MARKET_LENS_NO_PREVIEW")]
    no_preview: bool,

    /// Skip LLM ranking; digests get candidates but no gallery.
    #[arg(long, env = "MARKET_LENS_NO_RANK")]
    no_rank: bool,

    /// Stop after digesting this many documents (ledger skips do not count).
    #[arg(long, env = "MARKET_LENS_LIMIT")]
    limit: Option<usize>,

    /// Print extracted candidates as JSON and stop (no ranking, cropping or ledger).
    #[arg(long)]
    candidates_only: bool,

    /// Reprocess documents the ledger already holds.
    #[arg(long, env = "MARKET_LENS_FORCE")]
    force: bool,

    /// LLM temperature (0.0–2.0).
    #[arg(long, env = "MARKET_LENS_TEMPERATURE", default_value_t = 0.2)]
    temperature: f32,

    /// Max LLM output tokens for the ranking call.
    #[arg(long, env = "MARKET_LENS_MAX_TOKENS", default_value_t = 2048)]
    max_tokens: usize,

    /// Retries on ranking-call failure.
    #[arg(long, env = "MARKET_LENS_MAX_RETRIES", default_value_t = 3)]
    max_retries: u32,

    /// Save raw ranking responses into this directory.
    #[arg(long, env = "MARKET_LENS_RANK_DEBUG_DIR")]
    rank_debug_dir: Option<PathBuf>,

    /// Print the batch report as JSON on stdout.
    #[arg(long, env = "MARKET_LENS_JSON")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "MARKET_LENS_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "MARKET_LENS_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "MARKET_LENS_QUIET")]
    quiet: bool,

    /// HTTP download timeout in seconds.
    #[arg(long, env = "MARKET_LENS_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar carries the feedback that matters, so library INFO
    // logs are muted while it is shown.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json && !cli.candidates_only;
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

    // ── Sources ──────────────────────────────────────────────────────────
    let mut sources = expand_inputs(&cli.inputs)?;
    if sources.is_empty() {
        anyhow::bail!("No PDF files found in {:?}", cli.inputs);
    }
    assign_unique_ids(&mut sources);

    // ── Candidates-only mode ─────────────────────────────────────────────
    if cli.candidates_only {
        let config = build_config(&cli, None)?;
        if let Some(limit) = cli.limit {
            sources.truncate(limit);
        }
        let listing = list_candidates(&sources, &config).await?;
        println!(
            "{}",
            serde_json::to_string_pretty(&listing).context("Failed to serialise candidates")?
        );
        return Ok(());
    }

    // ── Build config ─────────────────────────────────────────────────────
    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn DigestProgressCallback>)
    } else {
        None
    };
    let config = build_config(&cli, progress_cb)?;

    let model = if config.rank {
        Some(
            LlmRelevanceModel::from_config(&config)
                .context("No LLM provider for ranking (pass --no-rank to digest without one)")?,
        )
    } else {
        None
    };
    let model_ref = model.as_ref().map(|m| m as &dyn RelevanceModel);

    let ledger_path = cli
        .ledger
        .clone()
        .unwrap_or_else(|| config.output_dir.join("ledger.json"));
    let ledger = JsonLedger::open(&ledger_path)
        .with_context(|| format!("Failed to open ledger {}", ledger_path.display()))?;

    // ── Run batch ────────────────────────────────────────────────────────
    let report = process_batch(&sources, &config, model_ref, &ledger as &dyn Ledger).await;

    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&report).context("Failed to serialise report")?
        );
    } else if !cli.quiet {
        print_report(&sources, &report);
    }

    if report.failed() > 0 {
        anyhow::bail!(
            "{} of {} documents failed",
            report.failed(),
            report.outcomes.len()
        );
    }
    Ok(())
}

/// Map CLI args to `LensConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<LensConfig> {
    let regions = RegionConfig {
        max_table_candidates: cli.max_tables,
        ..RegionConfig::default()
    };

    let mut builder = LensConfig::builder()
        .output_dir(&cli.output)
        .regions(regions)
        .top_n(cli.top_n)
        .crop_pad(cli.crop_pad)
        .preview_dpi(cli.preview_dpi)
        .render_preview(!cli.no_preview)
        .rank(!cli.no_rank && !cli.candidates_only)
        .temperature(cli.temperature)
        .max_tokens(cli.max_tokens)
        .max_retries(cli.max_retries)
        .concurrency(cli.concurrency)
        .force(cli.force)
        .batch_limit(cli.limit)
        .download_timeout_secs(cli.download_timeout);

    if let Some(ref model) = cli.model {
        builder = builder.model(model);
    }
    if let Some(ref provider) = cli.provider {
        builder = builder.provider_name(provider);
    }
    if let Some(ref dir) = cli.rank_debug_dir {
        builder = builder.rank_debug_dir(dir);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

/// Directories expand to the `*.pdf` files directly inside them, sorted.
fn expand_inputs(inputs: &[String]) -> Result<Vec<DocumentSource>> {
    let mut sources = Vec::new();
    for input in inputs {
        let path = Path::new(input);
        if !is_url(input) && path.is_dir() {
            let mut pdfs: Vec<PathBuf> = std::fs::read_dir(path)
                .with_context(|| format!("Failed to list {}", path.display()))?
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|p| p.is_file() && has_pdf_extension(p))
                .collect();
            pdfs.sort();
            sources.extend(
                pdfs.into_iter()
                    .map(|p| DocumentSource::new(p.display().to_string())),
            );
        } else {
            sources.push(DocumentSource::new(input.clone()));
        }
    }
    Ok(sources)
}

fn has_pdf_extension(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"))
}

/// Extract candidates per document without ranking or recording anything.
async fn list_candidates(
    sources: &[DocumentSource],
    config: &LensConfig,
) -> Result<BTreeMap<String, Vec<Candidate>>> {
    let mut listing = BTreeMap::new();
    for source in sources {
        let resolved = resolve_input(&source.location, config.download_timeout_secs)
            .await
            .with_context(|| format!("Failed to open {}", source.name))?;
        let work_dir = document_dir(&config.output_dir, &source.id);
        let mut candidates =
            extract_candidates(resolved.path(), &work_dir, &config.regions).await;
        rebase_thumbnails(&mut candidates, &source.id);
        eprintln!(
            "{}  {} candidates",
            bold(&source.name),
            candidates.len()
        );
        listing.insert(source.id.clone(), candidates);
    }
    Ok(listing)
}

fn print_report(sources: &[DocumentSource], report: &BatchReport) {
    println!("{:<40} {:<30} {:<10} DIGEST", "FILE", "ID", "STATUS");
    for (source, outcome) in sources.iter().zip(&report.outcomes) {
        let (status, detail) = match outcome {
            DocumentOutcome::Digested { digest_path, .. } => (green("done"), digest_path.clone()),
            DocumentOutcome::Skipped { content_hash, .. } => (
                yellow("skipped"),
                dim(&format!("md5 {}…", &content_hash[..content_hash.len().min(10)])),
            ),
            DocumentOutcome::Failed { error, .. } => (
                red("failed"),
                error.lines().next().unwrap_or_default().to_string(),
            ),
        };
        // Colour codes add 9 bytes; pad the visible text to 10.
        println!("{:<40} {:<30} {:<19} {}", source.name, source.id, status, detail);
    }
}
