use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tempfile::TempDir;
use tracing::{debug, info};

use crate::bitrate::BitrateSelector;
use crate::config::{CONCAT_LIST_NAME, METADATA_FILE_NAME, OUTPUT_EXTENSION};
use crate::cover::CoverResolver;
use crate::discovery::{list_sources, SourceFile};
use crate::error::{AssembleError, Result};
use crate::media::{write_concat_list, Encoder, ProbeResult, Prober};
use crate::metadata::write_metadata_file;
use crate::pool::WorkerPool;
use crate::timeline::{self, Chapter, TagBag};

/// Configuration for one assembly run.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Extension of the per-chapter source files.
    pub source_ext: String,
    /// Pin the target bitrate instead of detecting it.
    pub bitrate: Option<u32>,
    /// Override the worker-pool concurrency.
    pub concurrency: Option<usize>,
    /// Override the output filename.
    pub output: Option<String>,
    /// Show progress bars.
    pub show_progress: bool,
    /// Keep the intermediate encode directory for debugging.
    pub keep_intermediates: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            source_ext: "mp3".to_string(),
            bitrate: None,
            concurrency: None,
            output: None,
            show_progress: true,
            keep_intermediates: false,
        }
    }
}

/// Statistics from one assembly run.
#[derive(Debug, Clone)]
pub struct PipelineStats {
    pub total_time: Duration,
    pub encode_time: Duration,
    pub probe_time: Duration,
    pub source_files: usize,
    pub bitrate_kbps: u32,
    pub book_duration_ms: u64,
}

/// Result of one assembly run.
#[derive(Debug)]
pub struct AssemblyOutcome {
    pub output_path: PathBuf,
    pub chapters: Vec<Chapter>,
    pub tags: TagBag,
    pub stats: PipelineStats,
}

fn pool_for(sources: usize, config: &PipelineConfig) -> WorkerPool {
    match config.concurrency {
        Some(n) => WorkerPool::new(n),
        None => WorkerPool::for_items(sources),
    }
    .with_progress(config.show_progress)
}

/// Assemble every matching file in `workdir` into one chaptered M4B.
///
/// Stages run strictly in sequence, each completing (including error
/// collection) before the next begins:
/// 1. Discover source files
/// 2. Select the target bitrate
/// 3. Encode all sources into a temp directory
/// 4. Probe all encoded outputs
/// 5. Build the chapter timeline and write the metadata sidecar
/// 6. Resolve a cover and merge everything into the final container
pub async fn assemble(
    workdir: &Path,
    encoder: Arc<dyn Encoder>,
    prober: Arc<dyn Prober>,
    config: &PipelineConfig,
) -> Result<AssemblyOutcome> {
    let start_time = Instant::now();

    // ── Stage 1: discovery ────────────────────────────────────────────────
    let sources = list_sources(workdir, &config.source_ext)?;
    if sources.is_empty() {
        return Err(AssembleError::Discovery(format!(
            "No .{} files in {}",
            config.source_ext.trim_start_matches('.'),
            workdir.display()
        )));
    }
    info!("Found {} source files", sources.len());

    // ── Stage 2: bitrate selection ────────────────────────────────────────
    let bitrate_kbps = match config.bitrate {
        Some(pinned) => {
            info!("Bitrate pinned to {} kbps", pinned);
            pinned
        }
        None => {
            info!("Stage 1/5: Detecting target bitrate");
            BitrateSelector::new()
                .select_bitrate(prober.as_ref(), &sources)
                .await?
        }
    };

    let temp_dir = TempDir::new()?;
    let temp_path = temp_dir.path().to_path_buf();
    debug!("Intermediate files in {:?}", temp_path);

    // ── Stage 3: encode phase ─────────────────────────────────────────────
    info!(
        "Stage 2/5: Encoding {} files at {} kbps",
        sources.len(),
        bitrate_kbps
    );
    let encode_start = Instant::now();

    let pool = pool_for(sources.len(), config);
    let encode_outcome = pool
        .run_all(sources.clone(), |source: SourceFile| {
            let encoder = encoder.clone();
            let output = temp_path.join(format!(
                "{}.m4a",
                Path::new(&source.file_name)
                    .file_stem()
                    .unwrap_or_default()
                    .to_string_lossy()
            ));
            async move {
                encoder
                    .encode(&source.path, bitrate_kbps, &output)
                    .await
                    .map(|()| output)
            }
        })
        .await;
    debug!(
        "Encode phase: {}/{} succeeded",
        encode_outcome.results.len(),
        encode_outcome.attempted
    );
    let mut encoded = encode_outcome.into_result()?;
    let encode_time = encode_start.elapsed();

    // concat order must follow filename order, not completion order
    encoded.sort();

    // ── Stage 4: probe phase ──────────────────────────────────────────────
    info!("Stage 3/5: Probing {} encoded files", encoded.len());
    let probe_start = Instant::now();

    let pool = pool_for(encoded.len(), config);
    let probe_outcome = pool
        .run_all(encoded.clone(), |path: PathBuf| {
            let prober = prober.clone();
            async move { prober.probe(&path).await }
        })
        .await;
    let probes: Vec<ProbeResult> = probe_outcome.into_result()?;
    let probe_time = probe_start.elapsed();

    // ── Stage 5: timeline + sidecar ───────────────────────────────────────
    info!("Stage 4/5: Building chapter timeline");
    let (chapters, tags) = timeline::build(probes)?;
    let book_duration_ms = chapters.last().map(|c| c.end_ms).unwrap_or(0);

    let output_name = match &config.output {
        Some(name) => name.clone(),
        None => format!(
            "{}.{}",
            timeline::derive_output_stem(&tags, workdir),
            OUTPUT_EXTENSION
        ),
    };
    let output_path = workdir.join(&output_name);

    let metadata_path = temp_path.join(METADATA_FILE_NAME);
    write_metadata_file(&metadata_path, &chapters, &tags)?;

    // ── Stage 6: cover + merge ────────────────────────────────────────────
    info!("Stage 5/5: Resolving cover and merging");
    let cover = CoverResolver::new(
        workdir,
        encoder.clone(),
        sources.first().map(|s| s.path.clone()),
    )
    .resolve()
    .await?;

    let list_path = temp_path.join(CONCAT_LIST_NAME);
    write_concat_list(&encoded, &list_path)?;
    encoder
        .merge(&list_path, &cover, &metadata_path, &output_path)
        .await?;

    if config.keep_intermediates {
        let kept = temp_dir.keep();
        info!("Keeping intermediate files in {:?}", kept);
    }

    let stats = PipelineStats {
        total_time: start_time.elapsed(),
        encode_time,
        probe_time,
        source_files: sources.len(),
        bitrate_kbps,
        book_duration_ms,
    };

    info!(
        "Assembled {} chapters into {:?} in {:.2}s",
        chapters.len(),
        output_path,
        stats.total_time.as_secs_f64()
    );

    Ok(AssemblyOutcome {
        output_path,
        chapters,
        tags,
        stats,
    })
}

/// Print a summary of the assembly results.
pub fn print_summary(outcome: &AssemblyOutcome) {
    println!();
    println!("═══════════════════════════════════════════════════════════════");
    println!("                      Audiobook Assembly Complete               ");
    println!("═══════════════════════════════════════════════════════════════");
    println!();
    println!("  Output:     {}", outcome.output_path.display());
    println!("  Chapters:   {}", outcome.chapters.len());
    println!("  Bitrate:    {} kbps", outcome.stats.bitrate_kbps);
    println!(
        "  Duration:   {:.1}s",
        outcome.stats.book_duration_ms as f64 / 1000.0
    );
    println!();
    println!("  Timing:");
    println!(
        "    Encode:      {:.2}s ({} files)",
        outcome.stats.encode_time.as_secs_f64(),
        outcome.stats.source_files
    );
    println!(
        "    Probe:       {:.2}s",
        outcome.stats.probe_time.as_secs_f64()
    );
    println!(
        "    Total:       {:.2}s",
        outcome.stats.total_time.as_secs_f64()
    );
    println!();
    println!("═══════════════════════════════════════════════════════════════");
}
