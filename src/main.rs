// figure-harvest command line entry point
use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

use figure_harvest::annotations::CaptionConflictPolicy;
use figure_harvest::config::{ConfigFile, ExtractionConfig, DEFAULT_METADATA_FILE};
use figure_harvest::logging::init_logging;
use figure_harvest::{page_progress_bar, BatchOrchestrator, PdfiumBackend, RegistryStore};

#[derive(Debug, Clone, ValueEnum)]
enum CaptionPolicyArg {
    LastWins,
    FirstWins,
    Reject,
}

impl From<CaptionPolicyArg> for CaptionConflictPolicy {
    fn from(arg: CaptionPolicyArg) -> Self {
        match arg {
            CaptionPolicyArg::LastWins => CaptionConflictPolicy::LastWins,
            CaptionPolicyArg::FirstWins => CaptionConflictPolicy::FirstWins,
            CaptionPolicyArg::Reject => CaptionConflictPolicy::Reject,
        }
    }
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Extract annotated figures and captions from PDF pages")]
struct Cli {
    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Extract figures for the given page ids, skipping pages already done
    Run(RunArgs),
    /// Show what the registry in an output directory contains (read-only)
    Status(RegistryArgs),
    /// Fold the checkpoint journal into the metadata file
    Compact(RegistryArgs),
}

#[derive(Parser, Debug)]
struct RunArgs {
    /// Page ids such as `Report-2021-3`
    ids: Vec<String>,

    /// File with one page id per line (`#` starts a comment)
    #[arg(long)]
    ids_file: Option<PathBuf>,

    #[arg(long)]
    pdf_dir: Option<PathBuf>,

    #[arg(long)]
    annotations_dir: Option<PathBuf>,

    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Config file; defaults to ./figure-harvest.toml or the user config dir
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long, value_enum)]
    caption_policy: Option<CaptionPolicyArg>,

    /// Render resolution for figure crops
    #[arg(long)]
    dpi: Option<f32>,

    /// Compact the registry every N documents (0 = end of run only)
    #[arg(long)]
    compact_every: Option<usize>,

    /// Largest page bitmap to render; bigger pages get a lower zoom
    #[arg(long)]
    max_render_pixels: Option<u64>,

    /// Hide the page progress bar
    #[arg(long)]
    no_progress: bool,
}

#[derive(Parser, Debug)]
struct RegistryArgs {
    #[arg(long)]
    output_dir: PathBuf,

    #[arg(long, default_value = DEFAULT_METADATA_FILE)]
    metadata_file: String,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_json);

    match cli.command {
        Command::Run(args) => {
            let show_progress = !(args.no_progress || cli.log_json);
            cmd_run(args, show_progress)
        }
        Command::Status(args) => cmd_status(&args),
        Command::Compact(args) => cmd_compact(&args),
    }
}

fn cmd_run(args: RunArgs, show_progress: bool) -> Result<()> {
    let file = match &args.config {
        Some(path) => Some(ConfigFile::load(path).with_context(|| format!("loading {}", path.display()))?),
        None => ConfigFile::discover().context("loading config file")?,
    }
    .unwrap_or_default();

    let pdf_dir = args.pdf_dir.clone().or_else(|| file.pdf_dir.clone());
    let annotations_dir = args.annotations_dir.clone().or_else(|| file.annotations_dir.clone());
    let output_dir = args.output_dir.clone().or_else(|| file.output_dir.clone());
    let (Some(pdf_dir), Some(annotations_dir), Some(output_dir)) = (pdf_dir, annotations_dir, output_dir) else {
        bail!("--pdf-dir, --annotations-dir and --output-dir are required (on the command line or in the config file)");
    };

    let mut config = ExtractionConfig::new(pdf_dir, annotations_dir, output_dir);
    config.apply_file(file);
    if let Some(policy) = args.caption_policy {
        config.caption_policy = policy.into();
    }
    if let Some(dpi) = args.dpi {
        config.target_dpi = dpi;
    }
    if let Some(compact_every) = args.compact_every {
        config.compact_every = compact_every;
    }
    if let Some(max_render_pixels) = args.max_render_pixels {
        config.max_render_pixels = max_render_pixels;
    }

    let mut ids = args.ids;
    if let Some(path) = &args.ids_file {
        ids.extend(read_ids_file(path)?);
    }
    if ids.is_empty() {
        bail!("no page ids given");
    }

    let backend = PdfiumBackend::bind().context("initializing PDFium")?;
    let mut orchestrator = BatchOrchestrator::new(config, backend).context("invalid configuration")?;
    let mut progress = page_progress_bar(show_progress);
    let report = orchestrator
        .run_with_progress(&ids, &mut progress)
        .context("extraction run failed")?;

    info!(
        registry = %orchestrator.store().snapshot_path().display(),
        records = report.registry.record_count(),
        "Registry up to date"
    );
    println!("{}", report.summary);
    Ok(())
}

fn cmd_status(args: &RegistryArgs) -> Result<()> {
    let store = RegistryStore::new(&args.output_dir, &args.metadata_file);
    let (registry, pending) = store
        .peek()
        .with_context(|| format!("reading registry in {}", args.output_dir.display()))?;

    println!("registry:             {}", store.snapshot_path().display());
    println!("completed units:      {}", registry.completed_count());
    println!("figure records:       {}", registry.record_count());
    println!("pending checkpoints:  {pending}");
    Ok(())
}

fn cmd_compact(args: &RegistryArgs) -> Result<()> {
    let mut store = RegistryStore::new(&args.output_dir, &args.metadata_file);
    let registry = store
        .load()
        .with_context(|| format!("reading registry in {}", args.output_dir.display()))?;
    let folded = store.pending_checkpoints();
    store.compact(&registry).context("compacting registry")?;
    println!("folded {folded} checkpoints into {}", store.snapshot_path().display());
    Ok(())
}

fn read_ids_file(path: &Path) -> Result<Vec<String>> {
    let content = fs::read_to_string(path).with_context(|| format!("reading ids file {}", path.display()))?;
    Ok(content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect())
}
