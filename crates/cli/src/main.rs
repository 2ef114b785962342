mod cli;

use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tokio::signal;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use mytunes_core::{
    create_encoder, load_config, load_config_from_str, scan_tree, validate_config, AppConfig,
    BatchCoordinator, BatchEvent, BatchReport, Converter, Encoder, EncoderCapabilities,
    FfmpegEncoder, FormatPolicy, LoftyTagStore, LogEntry, QaacEncoder, TagStore,
};

use cli::{Cli, Commands};

/// Config file used when neither `--config` nor `MYTUNES_CONFIG` is given.
const DEFAULT_CONFIG: &str = "mytunes.toml";

/// Buffer size for the batch event channel
const EVENT_BUFFER_SIZE: usize = 256;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    let config = load(cli.config.clone())?;

    // RUST_LOG wins over the configured level
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level))
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match cli.command {
        Commands::Convert {
            source,
            output,
            threads,
            no_overwrite,
            verify,
            json,
        } => {
            let mut config = config;
            if let Some(threads) = threads {
                config.batch.threads = threads;
            }
            if no_overwrite {
                config.batch.overwrite = false;
            }
            if verify {
                config.batch.verify_copies = true;
            }
            validate_config(&config).context("Configuration validation failed")?;
            convert(config, source, output, json).await
        }
        Commands::Check => check(&config).await,
        Commands::Tags { file, json } => print_tags(file, json).await,
    }
}

fn load(explicit: Option<PathBuf>) -> Result<AppConfig> {
    let path = explicit.or_else(|| std::env::var_os("MYTUNES_CONFIG").map(PathBuf::from));

    let config = match path {
        Some(path) => load_config(&path)
            .with_context(|| format!("Failed to load config from {:?}", path))?,
        None if Path::new(DEFAULT_CONFIG).exists() => load_config(Path::new(DEFAULT_CONFIG))
            .with_context(|| format!("Failed to load config from {}", DEFAULT_CONFIG))?,
        None => load_config_from_str("").context("Failed to build default config")?,
    };

    validate_config(&config).context("Configuration validation failed")?;
    Ok(config)
}

async fn convert(
    config: AppConfig,
    source: Option<PathBuf>,
    output: Option<PathBuf>,
    json: bool,
) -> Result<()> {
    let source = source
        .or_else(|| config.library.root_path.clone())
        .context("No source directory given and library.root_path is not set")?;
    let output = output
        .or_else(|| config.library.sync_path.clone())
        .context("No output directory given and library.sync_path is not set")?;

    let tasks = scan_tree(&source).with_context(|| format!("Failed to scan {:?}", source))?;
    info!("Found {} files under {:?}", tasks.len(), source);

    let encoder = create_encoder(&config.converter, &config.encoders)
        .await
        .context("Failed to configure encoder")?;
    let transcoder = Arc::new(FfmpegEncoder::new(&config.converter).await);
    let converter = Arc::new(Converter::new(
        transcoder,
        Arc::new(LoftyTagStore),
        config.converter.temp_dir.clone(),
    ));

    let (tx, rx) = mpsc::channel(EVENT_BUFFER_SIZE);
    let coordinator = Arc::new(
        BatchCoordinator::new(
            converter,
            encoder,
            FormatPolicy::from_config(&config.formats),
            config.batch.clone(),
        )
        .with_events(tx),
    );
    let printer = tokio::spawn(print_events(rx));

    let interrupt = {
        let coordinator = Arc::clone(&coordinator);
        tokio::spawn(async move {
            if signal::ctrl_c().await.is_ok() {
                warn!("Interrupt received, cancelling queued files");
                let cancelled = coordinator.break_convert_files().await;
                info!("{} queued files cancelled", cancelled);
            }
        })
    };

    let result = coordinator.process(tasks, &output).await;

    // Release every event sender so the printer drains and exits
    interrupt.abort();
    let _ = interrupt.await;
    drop(coordinator);
    let _ = printer.await;

    let report = result.context("Batch failed")?;
    print_report(&report, json)?;

    if report.failed > 0 {
        bail!("{} of {} files failed", report.failed, report.enqueued);
    }
    Ok(())
}

async fn print_events(mut rx: mpsc::Receiver<BatchEvent>) {
    let color = std::io::stdout().is_terminal();
    let show_progress = std::io::stderr().is_terminal();

    while let Some(event) = rx.recv().await {
        match event {
            BatchEvent::Log(entry) => {
                if show_progress {
                    eprint!("\r\x1b[2K");
                }
                println!("{}", paint(&entry, color));
            }
            BatchEvent::Progress(p) if show_progress => {
                eprint!("\r[worker {}] {:>3}%", p.worker, p.percent);
            }
            BatchEvent::Started { worker, path } => {
                debug!(worker, path = %path, "started");
            }
            BatchEvent::Progress(_) => {}
        }
    }
    if show_progress {
        eprint!("\r\x1b[2K");
    }
}

/// Renders a log entry with its background color as a 24-bit ANSI escape.
fn paint(entry: &LogEntry, color: bool) -> String {
    match entry.color().and_then(parse_hex).filter(|_| color) {
        Some((r, g, b)) => format!("\x1b[48;2;{};{};{}m\x1b[30m{}\x1b[0m", r, g, b, entry),
        None => entry.to_string(),
    }
}

fn parse_hex(hex: &str) -> Option<(u8, u8, u8)> {
    let hex = hex.strip_prefix('#')?;
    if hex.len() != 6 {
        return None;
    }
    let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
    Some((channel(0)?, channel(2)?, channel(4)?))
}

fn print_report(report: &BatchReport, json: bool) -> Result<()> {
    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(report).context("Failed to serialize report")?
        );
        return Ok(());
    }

    println!(
        "{} files: {} done, {} copied, {} exists, {} skipped, {} cancelled, {} failed, {} without tags",
        report.enqueued,
        report.done,
        report.copied,
        report.exists,
        report.unknown,
        report.cancelled,
        report.failed,
        report.metadata_failed,
    );
    Ok(())
}

async fn check(config: &AppConfig) -> Result<()> {
    let qaac = QaacEncoder::unchecked(config.converter.qaac_path.clone());
    let ffmpeg = FfmpegEncoder::unchecked(config.converter.ffmpeg_path.clone());
    let candidates: [(&dyn Encoder, &Path); 2] = [
        (&qaac, config.converter.qaac_path.as_path()),
        (&ffmpeg, config.converter.ffmpeg_path.as_path()),
    ];

    let mut active_ok = false;
    for (encoder, path) in candidates {
        let active = encoder.name() == config.converter.encoder.as_str();
        let marker = if active { "*" } else { " " };
        match encoder.check_available().await {
            Ok(version) => {
                active_ok |= active;
                println!("{} {:<7} ok       {}", marker, encoder.name(), version.version);
            }
            Err(e) => println!("{} {:<7} missing  {} ({:?})", marker, encoder.name(), e, path),
        }
    }

    let capabilities = EncoderCapabilities::detect(&config.converter.ffmpeg_path).await;
    let codecs: Vec<String> = capabilities
        .available_codecs()
        .iter()
        .map(ToString::to_string)
        .collect();
    if !codecs.is_empty() {
        println!("  ffmpeg audio encoders: {}", codecs.join(", "));
    }

    if !active_ok {
        bail!(
            "Active encoder {} is not available",
            config.converter.encoder.as_str()
        );
    }
    Ok(())
}

async fn print_tags(file: PathBuf, json: bool) -> Result<()> {
    let path = file.clone();
    let tags = tokio::task::spawn_blocking(move || LoftyTagStore.load_tags(&path))
        .await
        .context("Tag reader task failed")?
        .with_context(|| format!("Failed to read tags from {:?}", file))?;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&tags).context("Failed to serialize tags")?
        );
        return Ok(());
    }

    for (key, values) in &tags.fields {
        let values: Vec<String> = values.iter().map(ToString::to_string).collect();
        println!("{:<13} {}", key.as_str(), values.join("; "));
    }
    if let Some(artwork) = &tags.artwork {
        println!("{:<13} {} ({} bytes)", "artwork", artwork.mime, artwork.data.len());
    }
    Ok(())
}
