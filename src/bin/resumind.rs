//! CLI binary for resumind.
//!
//! A thin shim over the library crate: maps flags to `PipelineConfig`,
//! opens directory-backed stores under `--data-dir`, and prints results.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use resumind::pipeline::render::rasterize;
use resumind::store::fs::{FsBlobStore, FsKvStore};
use resumind::submit::{open_review, wipe};
use resumind::{
    load_document, DocumentRecord, Feedback, JobContext, PdfiumRasterizer, PipelineConfig,
    PipelineFailure, PipelineState, RecordId, RecordStore, ReviewPipeline, ReviewStatus,
    Submission, SubmissionObserver, TipPolarity,
};
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
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}

// ── CLI observer using indicatif ─────────────────────────────────────────────

/// Spinner showing the current status line of a submission.
struct CliObserver {
    bar: ProgressBar,
}

impl CliObserver {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {msg}  {elapsed:.dim}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);
        bar.set_style(style);
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self { bar })
    }
}

impl SubmissionObserver for CliObserver {
    fn on_state(&self, state: PipelineState) {
        self.bar.set_message(state.status_text());
    }

    fn on_checkpoint(&self, id: &RecordId) {
        self.bar
            .println(format!("  {} record {} saved", dim("•"), dim(id.as_str())));
    }

    fn on_failure(&self, failure: &PipelineFailure) {
        self.bar.finish_and_clear();
        eprintln!("{} {}", red("✘"), failure.state.status_text());
    }

    fn on_complete(&self, _record: &DocumentRecord) {
        self.bar.finish_and_clear();
        eprintln!("{} {}", green("✔"), PipelineState::Complete.status_text());
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Review a résumé against a job
  resumind submit cv.pdf --company Acme --title "Backend Engineer" \
      --description-file job.txt

  # List stored reviews, then show one
  resumind list
  resumind show 3f2a9c1e-...

  # Render the first-page preview only (no API key needed)
  resumind render cv.pdf -o cv.png

  # Remove every stored file and record
  resumind wipe --yes

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY          OpenAI API key
  ANTHROPIC_API_KEY       Anthropic API key
  GEMINI_API_KEY          Google Gemini API key
  EDGEQUAKE_LLM_PROVIDER  Override provider (openai, anthropic, gemini, ollama)
  EDGEQUAKE_MODEL         Override model ID
  PDFIUM_LIB_PATH         Path to libpdfium (file or directory)
  RESUMIND_DATA_DIR       Default for --data-dir
"#;

/// Résumé intake and AI review from the command line.
#[derive(Parser, Debug)]
#[command(
    name = "resumind",
    version,
    about = "Rasterise, store and AI-review résumés",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Directory holding `blobs/` and `records/`.
    #[arg(long, global = true, env = "RESUMIND_DATA_DIR", default_value = "./resumind-data")]
    data_dir: PathBuf,

    /// Key prefix of stored records.
    #[arg(long, global = true, env = "RESUMIND_RECORD_PREFIX", default_value = "resume:")]
    record_prefix: String,

    /// Print JSON instead of text.
    #[arg(long, global = true, env = "RESUMIND_JSON")]
    json: bool,

    /// Disable the progress spinner.
    #[arg(long, global = true, env = "RESUMIND_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "RESUMIND_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors and results.
    #[arg(short, long, global = true, env = "RESUMIND_QUIET")]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Upload a résumé, render its preview and run the AI review.
    Submit(SubmitArgs),
    /// List stored reviews.
    List,
    /// Show one stored review.
    Show {
        /// Record id as printed by `submit` or `list`.
        id: String,
        /// Also write the stored preview image here.
        #[arg(long)]
        preview: Option<PathBuf>,
    },
    /// Render the first page of a document to PNG.
    Render(RenderArgs),
    /// Delete every stored file and record.
    Wipe {
        /// Confirm the deletion.
        #[arg(long)]
        yes: bool,
    },
}

#[derive(Args, Debug)]
struct SubmitArgs {
    /// Local PDF path or HTTP/HTTPS URL.
    input: String,

    /// Company the application is for.
    #[arg(long, default_value = "")]
    company: String,

    /// Job title the résumé is judged against.
    #[arg(long, default_value = "")]
    title: String,

    /// Job description text.
    #[arg(long, conflicts_with = "description_file")]
    description: Option<String>,

    /// File containing the job description.
    #[arg(long)]
    description_file: Option<PathBuf>,

    /// LLM model ID (e.g. gpt-4.1-mini, claude-sonnet-4-20250514).
    #[arg(long, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// LLM provider: openai, anthropic, gemini, ollama, azure.
    #[arg(long, env = "EDGEQUAKE_PROVIDER")]
    provider: Option<String>,

    /// Path to a text file containing a custom system prompt.
    #[arg(long, env = "RESUMIND_SYSTEM_PROMPT")]
    system_prompt: Option<PathBuf>,

    /// Max LLM output tokens.
    #[arg(long, env = "RESUMIND_MAX_TOKENS", default_value_t = 4096)]
    max_tokens: usize,

    /// LLM temperature (0.0–2.0).
    #[arg(long, env = "RESUMIND_TEMPERATURE", default_value_t = 0.2)]
    temperature: f32,

    /// Analysis call timeout in seconds.
    #[arg(long, env = "RESUMIND_API_TIMEOUT", default_value_t = 120)]
    api_timeout: u64,

    /// HTTP download timeout in seconds.
    #[arg(long, env = "RESUMIND_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    #[command(flatten)]
    raster: RasterOpts,
}

#[derive(Args, Debug)]
struct RenderArgs {
    /// Local PDF path or HTTP/HTTPS URL.
    input: String,

    /// Output PNG path. Defaults to the input's stem + `.png`.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// HTTP download timeout in seconds.
    #[arg(long, env = "RESUMIND_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    #[command(flatten)]
    raster: RasterOpts,
}

#[derive(Args, Debug)]
struct RasterOpts {
    /// Longer edge of the preview in pixels (256–4096).
    #[arg(long, env = "RESUMIND_MAX_PIXELS", default_value_t = 2000,
          value_parser = clap::value_parser!(u32).range(256..=4096))]
    max_pixels: u32,

    /// Path to the pdfium shared library (file or directory).
    #[arg(long, env = "PDFIUM_LIB_PATH")]
    pdfium_lib: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // Library INFO logs would fight with the spinner; keep them off while
    // it is shown.
    let show_progress = !cli.quiet
        && !cli.no_progress
        && !cli.json
        && matches!(cli.command, Command::Submit(_));
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

    match &cli.command {
        Command::Submit(args) => cmd_submit(&cli, args, show_progress).await,
        Command::List => cmd_list(&cli).await,
        Command::Show { id, preview } => cmd_show(&cli, id, preview.as_deref()).await,
        Command::Render(args) => cmd_render(&cli, args).await,
        Command::Wipe { yes } => cmd_wipe(&cli, *yes).await,
    }
}

// ── Stores ───────────────────────────────────────────────────────────────────

async fn open_stores(data_dir: &Path) -> Result<(Arc<FsBlobStore>, Arc<FsKvStore>)> {
    let blobs = FsBlobStore::open(data_dir.join("blobs"))
        .await
        .with_context(|| format!("Failed to open blob store in {}", data_dir.display()))?;
    let kv = FsKvStore::open(data_dir.join("records"))
        .await
        .with_context(|| format!("Failed to open record store in {}", data_dir.display()))?;
    Ok((Arc::new(blobs), Arc::new(kv)))
}

// ── submit ───────────────────────────────────────────────────────────────────

async fn cmd_submit(cli: &Cli, args: &SubmitArgs, show_progress: bool) -> Result<()> {
    let description = match (&args.description, &args.description_file) {
        (Some(text), _) => text.clone(),
        (None, Some(path)) => tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read job description from {:?}", path))?,
        (None, None) => String::new(),
    };
    let system_prompt = match &args.system_prompt {
        Some(path) => Some(
            tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read system prompt from {:?}", path))?,
        ),
        None => None,
    };

    let mut builder = PipelineConfig::builder()
        .max_rendered_pixels(args.raster.max_pixels)
        .record_prefix(cli.record_prefix.clone())
        .max_tokens(args.max_tokens)
        .temperature(args.temperature)
        .api_timeout_secs(args.api_timeout)
        .download_timeout_secs(args.download_timeout);
    if let Some(ref lib) = args.raster.pdfium_lib {
        builder = builder.pdfium_library(lib.clone());
    }
    if let Some(ref model) = args.model {
        builder = builder.model(model.clone());
    }
    if let Some(ref provider) = args.provider {
        builder = builder.provider_name(provider.clone());
    }
    if let Some(prompt) = system_prompt {
        builder = builder.system_prompt(prompt);
    }
    if show_progress {
        builder = builder.observer(CliObserver::new());
    }
    let config = builder.build().context("Invalid configuration")?;

    let document = load_document(&args.input, config.download_timeout_secs)
        .await
        .with_context(|| format!("Failed to load {}", args.input))?;
    let (blobs, kv) = open_stores(&cli.data_dir).await?;
    let pipeline = ReviewPipeline::with_vision(blobs, kv, config)
        .context("Failed to set up the review pipeline")?;

    let job = JobContext::new(args.company.clone(), args.title.clone(), description);
    let record = match pipeline.submit(Submission::new(document, job)).await {
        Ok(record) => record,
        Err(failure) => {
            if let Some(ref id) = failure.record_id {
                eprintln!(
                    "{} record {} was saved without feedback (analysis incomplete); \
                     re-submit to try again",
                    yellow("⚠"),
                    bold(&pipeline.records().key_for(id))
                );
            }
            let kind = failure.kind();
            return Err(anyhow::Error::new(failure).context(format!("Submission failed ({kind})")));
        }
    };

    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&record).context("Failed to serialise record")?
        );
    } else {
        print_record(&record);
    }
    Ok(())
}

// ── list / show ──────────────────────────────────────────────────────────────

async fn cmd_list(cli: &Cli) -> Result<()> {
    let (_, kv) = open_stores(&cli.data_dir).await?;
    let records_dir = kv.dir().to_path_buf();
    let records = RecordStore::new(kv, cli.record_prefix.clone());
    let mut all = records.list_all().await.context("Failed to list records")?;
    all.sort_by(|a, b| {
        (&a.job().company_name, a.id().as_str()).cmp(&(&b.job().company_name, b.id().as_str()))
    });

    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&all).context("Failed to serialise records")?
        );
        return Ok(());
    }
    if all.is_empty() {
        eprintln!(
            "No reviews stored under '{}' in {}",
            records.prefix(),
            records_dir.display()
        );
        return Ok(());
    }
    for record in &all {
        let score = match record.feedback() {
            Some(f) => format!("{:>3}/100", f.overall_score.get()),
            None => yellow("pending"),
        };
        println!(
            "{}  {}  {} — {}",
            record.id(),
            score,
            non_empty(&record.job().company_name),
            non_empty(&record.job().job_title),
        );
    }
    Ok(())
}

async fn cmd_show(cli: &Cli, id: &str, preview_out: Option<&Path>) -> Result<()> {
    let (blobs, kv) = open_stores(&cli.data_dir).await?;
    let records = RecordStore::new(kv, cli.record_prefix.clone());
    let bundle = open_review(blobs.as_ref(), &records, &RecordId::from(id))
        .await
        .with_context(|| format!("Failed to open review {id}"))?;

    if let Some(path) = preview_out {
        tokio::fs::write(path, &bundle.preview)
            .await
            .with_context(|| format!("Failed to write preview to {}", path.display()))?;
        if !cli.quiet {
            eprintln!("{} preview → {}", green("✔"), bold(&path.display().to_string()));
        }
    }

    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&bundle.record).context("Failed to serialise record")?
        );
    } else {
        print_record(&bundle.record);
        println!(
            "{}",
            dim(&format!(
                "document {} ({} bytes), preview {} ({} bytes)",
                bundle.record.resume_path(),
                bundle.document.len(),
                bundle.record.image_path(),
                bundle.preview.len()
            ))
        );
    }
    Ok(())
}

// ── render ───────────────────────────────────────────────────────────────────

async fn cmd_render(cli: &Cli, args: &RenderArgs) -> Result<()> {
    let document = load_document(&args.input, args.download_timeout)
        .await
        .with_context(|| format!("Failed to load {}", args.input))?;

    let mut rasterizer = PdfiumRasterizer::new(args.raster.max_pixels);
    if let Some(ref lib) = args.raster.pdfium_lib {
        rasterizer = rasterizer.with_library(lib.clone());
    }
    let max_pixels = rasterizer.max_pixels();
    let raster = rasterize(Arc::new(rasterizer), document.bytes, document.filename)
        .await
        .context("Rendering failed")?;

    let output = args
        .output
        .clone()
        .unwrap_or_else(|| PathBuf::from(&raster.filename));
    tokio::fs::write(&output, &raster.png)
        .await
        .with_context(|| format!("Failed to write {}", output.display()))?;

    if cli.json {
        println!(
            "{}",
            serde_json::json!({
                "path": output.display().to_string(),
                "width": raster.width,
                "height": raster.height,
                "bytes": raster.byte_len(),
                "maxPixels": max_pixels,
            })
        );
    } else if !cli.quiet {
        eprintln!(
            "{} {}x{} px (longer edge {}), {} bytes → {}",
            green("✔"),
            raster.width,
            raster.height,
            max_pixels,
            raster.byte_len(),
            bold(&output.display().to_string())
        );
    }
    Ok(())
}

// ── wipe ─────────────────────────────────────────────────────────────────────

async fn cmd_wipe(cli: &Cli, yes: bool) -> Result<()> {
    if !yes {
        anyhow::bail!(
            "Refusing to wipe {} without --yes: every stored file and record would be deleted",
            cli.data_dir.display()
        );
    }
    let (blobs, kv) = open_stores(&cli.data_dir).await?;
    let blobs_dir = blobs.root().to_path_buf();
    let records = RecordStore::new(kv, cli.record_prefix.clone());
    let report = wipe(blobs.as_ref(), &records, "")
        .await
        .context("Wipe failed")?;

    if cli.json {
        println!(
            "{}",
            serde_json::json!({
                "blobsDeleted": report.blobs_deleted,
                "recordsCleared": report.records_cleared,
            })
        );
    } else if !cli.quiet {
        eprintln!(
            "{} deleted {} files from {} and {} records",
            green("✔"),
            report.blobs_deleted,
            blobs_dir.display(),
            report.records_cleared
        );
    }
    Ok(())
}

// ── Text output ──────────────────────────────────────────────────────────────

fn non_empty(s: &str) -> &str {
    if s.trim().is_empty() {
        "—"
    } else {
        s
    }
}

fn print_record(record: &DocumentRecord) {
    let job = record.job();
    println!("{} {}", bold("Review"), record.id());
    println!(
        "  {} at {}",
        non_empty(&job.job_title),
        non_empty(&job.company_name)
    );
    match (record.status(), record.feedback()) {
        (ReviewStatus::Complete, Some(feedback)) => print_feedback(feedback),
        _ => println!("  {}", yellow("Analysis pending or incomplete")),
    }
}

fn print_feedback(feedback: &Feedback) {
    println!("  Overall score: {}", bold(&format!("{}/100", feedback.overall_score)));
    for (kind, category) in feedback.categories() {
        println!();
        println!("  {} {}", bold(kind.label()), dim(&format!("{}/100", category.score)));
        for tip in &category.tips {
            let mark = match tip.polarity {
                TipPolarity::Good => green("✓"),
                TipPolarity::Improve => yellow("!"),
            };
            println!("    {} {} {}", mark, tip.label, dim(&format!("[{}]", tip.polarity)));
            if !tip.explanation.is_empty() {
                println!("      {}", dim(&tip.explanation));
            }
        }
    }
}
