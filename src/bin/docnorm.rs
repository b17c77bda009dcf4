//! Command-line front end: normalize one file or a whole folder to JSON.

use anyhow::{Context, Result};
use clap::Parser;
use docnorm::{process_folder, Document, Engine, EngineConfig};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "docnorm",
    version,
    about = "Normalize documents (PDF, office, images, spreadsheets, archives) into unified JSON records"
)]
struct Cli {
    /// Input file, or a folder to process in batch
    input: PathBuf,

    /// Output file (single input) or folder (batch). Defaults to stdout /
    /// the current directory.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Directory where extracted images are persisted
    #[arg(long, default_value = "images")]
    images_dir: PathBuf,

    /// Vision provider name (openai, anthropic, gemini, ollama, …).
    /// Auto-detected from API-key environment variables when omitted.
    #[arg(short, long, env = "DOCNORM_PROVIDER")]
    provider: Option<String>,

    /// Vision model identifier
    #[arg(short, long, env = "DOCNORM_MODEL")]
    model: Option<String>,

    /// Per-description-call timeout in seconds
    #[arg(long, default_value_t = 60)]
    api_timeout: u64,

    /// Office-to-PDF conversion timeout in seconds
    #[arg(long, default_value_t = 120)]
    convert_timeout: u64,

    /// Explicit path to the LibreOffice soffice executable
    #[arg(long, env = "SOFFICE_PATH")]
    soffice: Option<PathBuf>,

    /// Concurrent documents in batch mode
    #[arg(long, default_value_t = 4)]
    concurrency: usize,

    /// Verbose logging (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "docnorm=info",
        1 => "docnorm=debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| default.into()))
        .with_target(false)
        .init();
}

fn write_document(doc: &Document, target: Option<&Path>) -> Result<()> {
    let json = serde_json::to_string_pretty(doc)?;
    match target {
        Some(path) => std::fs::write(path, json)
            .with_context(|| format!("writing {}", path.display()))?,
        None => println!("{json}"),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let mut builder = EngineConfig::builder()
        .images_dir(&cli.images_dir)
        .api_timeout_secs(cli.api_timeout)
        .convert_timeout_secs(cli.convert_timeout)
        .batch_concurrency(cli.concurrency);
    if let Some(ref provider) = cli.provider {
        builder = builder.provider_name(provider);
    }
    if let Some(ref model) = cli.model {
        builder = builder.model(model);
    }
    if let Some(ref soffice) = cli.soffice {
        builder = builder.soffice_path(soffice);
    }
    let engine = Engine::new(builder.build()?)?;

    if cli.input.is_dir() {
        run_batch(&engine, &cli).await
    } else {
        let doc = engine.process(&cli.input).await?;
        write_document(&doc, cli.output.as_deref())
    }
}

async fn run_batch(engine: &Engine, cli: &Cli) -> Result<()> {
    let out_dir = cli.output.clone().unwrap_or_else(|| PathBuf::from("."));
    std::fs::create_dir_all(&out_dir)
        .with_context(|| format!("creating {}", out_dir.display()))?;

    let count = std::fs::read_dir(&cli.input)?
        .filter_map(|e| e.ok())
        .filter(|e| e.path().is_file())
        .count();
    let bar = ProgressBar::new(count as u64).with_style(
        ProgressStyle::with_template("{bar:40} {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );

    let outcomes = process_folder(engine, &cli.input).await?;
    let mut failures = 0usize;
    for outcome in &outcomes {
        bar.inc(1);
        match &outcome.result {
            Ok(doc) => {
                let name = format!("{}.json", doc.stem());
                write_document(doc, Some(&out_dir.join(name)))?;
            }
            Err(e) => {
                failures += 1;
                bar.set_message(format!("failed: {}", outcome.path.display()));
                eprintln!("{}: {e}", outcome.path.display());
            }
        }
    }
    bar.finish_and_clear();

    println!(
        "{} processed, {} failed, output in {}",
        outcomes.len() - failures,
        failures,
        out_dir.display()
    );
    if failures == outcomes.len() && !outcomes.is_empty() {
        anyhow::bail!("all {} inputs failed", outcomes.len());
    }
    Ok(())
}
