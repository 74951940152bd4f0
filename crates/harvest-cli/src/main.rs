//! Harvest CLI - acquire AI models from Civitai and HuggingFace references.
//!
//! Exit codes: 0 when every requested file is in place, 1 when nothing was
//! (or the request failed before any transfer), 2 on partial success.

mod progress;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use harvest_core::acquisition::{
    list_local_models, run_batch, AcquisitionOutcome, BatchConfig, BatchEntryStatus,
    BatchReport, CategoryClassifier, DestinationCategory, FileStatus, ModelDirectories,
    SourceKind,
};
use harvest_core::catalog::{CatalogSet, CatalogTokens};
use harvest_core::{AcquireOptions, AcquisitionEngine, CancellationToken, Settings};
use indicatif::HumanBytes;
use progress::TransferBars;
use std::path::PathBuf;
use tracing::{info, warn, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser, Debug)]
#[command(name = "harvest")]
#[command(version, about = "Resolve and download AI models from Civitai and HuggingFace")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Models root directory (category subdirectories live below it)
    #[arg(long, global = true, env = "HARVEST_MODELS_DIR")]
    models_dir: Option<PathBuf>,

    /// JSON settings file
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    /// Files transferred at once (overrides settings)
    #[arg(short, long, global = true)]
    jobs: Option<usize>,

    /// Retries per file after a transient failure (overrides settings)
    #[arg(long, global = true)]
    retries: Option<u32>,

    /// Civitai API key (falls back to CIVITAI_API_KEY)
    #[arg(long, global = true)]
    civitai_token: Option<String>,

    /// HuggingFace token (falls back to HF_TOKEN, then the hub CLI cache)
    #[arg(long, global = true)]
    hf_token: Option<String>,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Hide progress bars
    #[arg(long, global = true)]
    quiet: bool,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Download every file of a model reference
    Download {
        /// URL, numeric model id, or namespace/repo
        reference: String,

        /// Source for bare identifiers
        #[arg(short, long, value_parser = parse_source)]
        source: Option<SourceKind>,

        /// Place every file in this category
        #[arg(short, long, value_parser = parse_category)]
        category: Option<DestinationCategory>,

        /// Place every file in this directory instead of the category roots
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Local name of the primary file
        #[arg(long)]
        filename: Option<String>,

        /// Only download this remote file
        #[arg(long)]
        file: Option<String>,

        /// Expected SHA-256 of the primary file
        #[arg(long)]
        sha256: Option<String>,
    },

    /// Search a remote catalog
    Search {
        query: String,

        #[arg(short, long, value_parser = parse_source, default_value = "civitai")]
        source: SourceKind,

        #[arg(short, long, default_value = "20")]
        limit: usize,

        /// Source type filter (e.g. LORA, text-to-image)
        #[arg(short = 't', long = "type")]
        type_filter: Option<String>,
    },

    /// Run every download listed in a JSON batch file
    Batch { file: PathBuf },

    /// List model files already in the category directories
    List {
        #[arg(short, long, value_parser = parse_category)]
        category: Option<DestinationCategory>,
    },

    /// Show categories, known type tags, and filename rules
    Types,
}

fn parse_source(value: &str) -> std::result::Result<SourceKind, String> {
    SourceKind::from_name(value)
        .ok_or_else(|| format!("unknown source '{}' (expected civitai or huggingface)", value))
}

fn parse_category(value: &str) -> std::result::Result<DestinationCategory, String> {
    DestinationCategory::from_name(value).ok_or_else(|| {
        let names: Vec<&str> = DestinationCategory::ALL.iter().map(|c| c.as_str()).collect();
        format!("unknown category '{}' (expected one of {})", value, names.join(", "))
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.debug { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level.as_str().to_ascii_lowercase()));
    FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();

    let session = Session::load(&cli)?;

    let code = match &cli.command {
        Command::Download {
            reference,
            source,
            category,
            output,
            filename,
            file,
            sha256,
        } => {
            let options = AcquireOptions {
                source_hint: *source,
                category_override: *category,
                destination_override: output.clone(),
                filename_override: filename.clone(),
                remote_file: file.clone(),
                expected_hash: sha256.clone(),
                ..Default::default()
            };
            download(&cli, &session, reference, options).await?
        }
        Command::Search {
            query,
            source,
            limit,
            type_filter,
        } => {
            search(&cli, &session, *source, query, *limit, type_filter.as_deref()).await?;
            0
        }
        Command::Batch { file } => batch(&cli, &session, file).await?,
        Command::List { category } => {
            list(&cli, &session, *category)?;
            0
        }
        Command::Types => {
            types(&cli)?;
            0
        }
    };

    if code != 0 {
        std::process::exit(code);
    }
    Ok(())
}

/// Settings, directories, and the engine shared by every command.
struct Session {
    engine: AcquisitionEngine,
    directories: ModelDirectories,
}

impl Session {
    fn load(cli: &Cli) -> Result<Self> {
        let mut settings = Settings::load_or_default(cli.settings.as_deref())?;
        if let Some(jobs) = cli.jobs {
            settings.max_concurrent_downloads = jobs;
        }
        if let Some(retries) = cli.retries {
            settings.max_retries = retries;
        }
        settings.validate()?;

        let directories = ModelDirectories::from_settings(&settings, cli.models_dir.as_deref())?;
        let tokens = CatalogTokens::resolve(cli.civitai_token.as_deref(), cli.hf_token.as_deref());
        let catalogs = CatalogSet::from_settings(&settings, tokens)?;
        let engine = AcquisitionEngine::builder(catalogs)
            .settings(&settings)
            .directories(directories.clone())
            .build()?;

        Ok(Self {
            engine,
            directories,
        })
    }
}

/// Cancel `token` on Ctrl-C.
fn cancel_on_ctrl_c(token: &CancellationToken) {
    let token = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling transfers");
            token.cancel();
        }
    });
}

async fn download(
    cli: &Cli,
    session: &Session,
    reference: &str,
    mut options: AcquireOptions,
) -> Result<i32> {
    cancel_on_ctrl_c(&options.cancel);
    let bars = (!cli.quiet).then(TransferBars::new);
    options.on_progress = bars.as_ref().map(|b| b.callback());

    let result = session.engine.acquire(reference, options).await;
    if let Some(bars) = &bars {
        bars.finish();
    }
    let outcome = result.with_context(|| format!("Failed to acquire '{}'", reference))?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    } else {
        print_outcome(&outcome);
    }
    Ok(outcome.tier().exit_code())
}

fn print_outcome(outcome: &AcquisitionOutcome) {
    println!("{} ({})", outcome.title, outcome.reference);
    for file in &outcome.files {
        match &file.status {
            FileStatus::Succeeded { bytes, .. } => println!(
                "  ok      {} -> {} ({})",
                file.name,
                file.destination.display(),
                HumanBytes(*bytes)
            ),
            FileStatus::Failed { failure } => {
                println!("  FAILED  {}: {}", file.name, failure)
            }
        }
    }
    if let Some(path) = &outcome.provenance {
        println!("  provenance: {}", path.display());
    }
    println!(
        "{}/{} files in place",
        outcome.succeeded().count(),
        outcome.files.len()
    );
}

async fn search(
    cli: &Cli,
    session: &Session,
    source: SourceKind,
    query: &str,
    limit: usize,
    type_filter: Option<&str>,
) -> Result<()> {
    let hits = session
        .engine
        .search(source, query, limit, type_filter)
        .await
        .with_context(|| format!("Search on {} failed", source))?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&hits)?);
        return Ok(());
    }

    if hits.is_empty() {
        println!("No results for '{}' on {}", query, source);
    }
    for hit in &hits {
        println!(
            "{:<12} {:<40} {:<16} {:>10} downloads  {}",
            hit.id, hit.name, hit.type_tag, hit.downloads, hit.url
        );
    }
    Ok(())
}

async fn batch(cli: &Cli, session: &Session, file: &std::path::Path) -> Result<i32> {
    let config = BatchConfig::load(file)?;
    if config.downloads.is_empty() {
        bail!("Batch file {} lists no downloads", file.display());
    }
    info!("Loaded {} batch entries from {}", config.downloads.len(), file.display());

    let base = AcquireOptions::default();
    cancel_on_ctrl_c(&base.cancel);
    let bars = (!cli.quiet).then(TransferBars::new);
    let base = AcquireOptions {
        on_progress: bars.as_ref().map(|b| b.callback()),
        ..base
    };

    let report = run_batch(&session.engine, &config, &base).await;
    if let Some(bars) = &bars {
        bars.finish();
    }

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_batch(&report);
    }
    Ok(report.tier().exit_code())
}

fn print_batch(report: &BatchReport) {
    for entry in &report.entries {
        match &entry.status {
            BatchEntryStatus::Completed { outcome } => println!(
                "{:<7} {} ({}/{} files)",
                if outcome.all_succeeded { "ok" } else { "PARTIAL" },
                entry.label,
                outcome.succeeded().count(),
                outcome.files.len()
            ),
            BatchEntryStatus::Aborted { kind, message } => {
                println!("FAILED  {} [{}]: {}", entry.label, kind, message)
            }
        }
    }
    println!("{}/{} entries succeeded", report.succeeded, report.total);
}

fn list(cli: &Cli, session: &Session, category: Option<DestinationCategory>) -> Result<()> {
    let models = list_local_models(&session.directories, category);

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&models)?);
        return Ok(());
    }

    for model in &models {
        println!(
            "{:<14} {:>10}  {}{}",
            model.category.as_str(),
            HumanBytes(model.size_bytes).to_string(),
            model.path.display(),
            if model.has_provenance { "" } else { "  (no provenance)" }
        );
    }
    println!("{} model files", models.len());
    Ok(())
}

fn types(cli: &Cli) -> Result<()> {
    let categories: Vec<(&str, &str)> = DestinationCategory::ALL
        .iter()
        .map(|c| (c.as_str(), c.dir_name()))
        .collect();
    let type_tags: Vec<(&str, &str)> = CategoryClassifier::type_table()
        .iter()
        .map(|(tag, category)| (*tag, category.as_str()))
        .collect();
    let keyword_rules: Vec<(String, &str)> = CategoryClassifier::keyword_rules()
        .iter()
        .map(|(keywords, category)| (keywords.join(", "), category.as_str()))
        .collect();

    if cli.json {
        let value = serde_json::json!({
            "categories": categories
                .iter()
                .map(|(name, dir)| serde_json::json!({ "name": name, "directory": dir }))
                .collect::<Vec<_>>(),
            "type_tags": type_tags
                .iter()
                .map(|(tag, category)| serde_json::json!({ "tag": tag, "category": category }))
                .collect::<Vec<_>>(),
            "keyword_rules": keyword_rules
                .iter()
                .map(|(keywords, category)| serde_json::json!({ "keywords": keywords, "category": category }))
                .collect::<Vec<_>>(),
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    println!("Categories:");
    for (name, dir) in &categories {
        println!("  {:<16} {}/", name, dir);
    }
    println!("\nSource type tags:");
    for (tag, category) in &type_tags {
        println!("  {:<20} -> {}", tag, category);
    }
    println!("\nFilename rules (first match wins, otherwise checkpoint):");
    for (keywords, category) in &keyword_rules {
        println!("  {:<48} -> {}", keywords, category);
    }
    Ok(())
}
