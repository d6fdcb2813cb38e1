use anyhow::{Context, Result};
use clap::Parser;
use m4bind::config::Config;
use m4bind::media::{check_ffmpeg, check_ffprobe, CommandRunner, FfmpegEncoder, FfprobeProber};
use m4bind::pipeline::{assemble, print_summary, PipelineConfig};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "m4bind")]
#[command(version, about = "Assemble per-chapter audio files into a chaptered M4B audiobook")]
#[command(
    long_about = "Encode every matching audio file in a directory to AAC, build a chapter \
timeline from their durations and tags, resolve a cover image and merge everything into a \
single chaptered .m4b container using FFmpeg."
)]
struct Cli {
    /// Directory containing the per-chapter audio files
    #[arg(default_value = ".")]
    directory: PathBuf,

    /// Source file extension
    #[arg(short, long)]
    ext: Option<String>,

    /// Target bitrate in kbps (detected from the sources when omitted)
    #[arg(short, long)]
    bitrate: Option<u32>,

    /// Number of concurrent encode/probe jobs
    #[arg(short, long)]
    concurrency: Option<usize>,

    /// Output filename (derived from tags when omitted)
    #[arg(short, long)]
    output: Option<String>,

    /// Keep intermediate encoded files for debugging
    #[arg(long)]
    keep: bool,

    /// Disable progress bars
    #[arg(long)]
    no_progress: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn init_logging(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::INFO };

    FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    if !cli.directory.is_dir() {
        anyhow::bail!("Not a directory: {}", cli.directory.display());
    }

    // Load configuration, CLI flags win over file and environment
    let mut config = Config::load().context("Failed to load configuration")?;
    if let Some(ext) = cli.ext {
        config.source_ext = ext;
    }
    if cli.bitrate.is_some() {
        config.bitrate = cli.bitrate;
    }
    if cli.concurrency.is_some() {
        config.concurrency = cli.concurrency;
    }
    config.validate().context("Configuration validation failed")?;

    check_ffmpeg().context("Prerequisite check failed")?;
    check_ffprobe().context("Prerequisite check failed")?;

    info!("Directory: {}", cli.directory.display());
    info!("Extension: .{}", config.source_ext.trim_start_matches('.'));
    if let Some(bitrate) = config.bitrate {
        info!("Bitrate:   {} kbps (pinned)", bitrate);
    }

    let runner = CommandRunner::new(&cli.directory);
    let encoder = Arc::new(FfmpegEncoder::new(runner.clone()));
    let prober = Arc::new(FfprobeProber::new(runner));

    let pipeline_config = PipelineConfig {
        source_ext: config.source_ext.clone(),
        bitrate: config.bitrate,
        concurrency: config.concurrency,
        output: cli.output,
        show_progress: !cli.no_progress,
        keep_intermediates: cli.keep,
    };

    let outcome = assemble(&cli.directory, encoder, prober, &pipeline_config)
        .await
        .context("Assembly failed")?;

    print_summary(&outcome);

    Ok(())
}
