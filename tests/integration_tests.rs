//! Integration tests for m4bind
//!
//! These tests validate the integration between components using mock
//! encoder/prober implementations, without requiring FFmpeg.

use m4bind::bitrate::BitrateSelector;
use m4bind::error::{AssembleError, Result};
use m4bind::media::{Encoder, ProbeResult, Prober};
use m4bind::pipeline::{assemble, PipelineConfig};
use m4bind::timeline;

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

// ============================================================================
// Mock collaborators
// ============================================================================

/// Encoder that writes placeholder files instead of invoking FFmpeg.
struct MockEncoder {
    fail_on_stem: Option<String>,
    encode_calls: AtomicUsize,
    merge_calls: AtomicUsize,
}

impl MockEncoder {
    fn new() -> Self {
        Self {
            fail_on_stem: None,
            encode_calls: AtomicUsize::new(0),
            merge_calls: AtomicUsize::new(0),
        }
    }

    fn failing_on(stem: &str) -> Self {
        Self {
            fail_on_stem: Some(stem.to_string()),
            ..Self::new()
        }
    }
}

#[async_trait]
impl Encoder for MockEncoder {
    async fn encode(&self, source: &Path, _bitrate_kbps: u32, output: &Path) -> Result<()> {
        self.encode_calls.fetch_add(1, Ordering::SeqCst);
        let stem = source
            .file_stem()
            .unwrap_or_default()
            .to_string_lossy()
            .to_string();
        if self.fail_on_stem.as_deref() == Some(stem.as_str()) {
            return Err(AssembleError::Encode(format!("mock failure for {stem}")));
        }
        fs::write(output, b"encoded").map_err(AssembleError::Io)
    }

    async fn extract_cover(&self, _source: &Path, _output: &Path) -> Result<()> {
        Err(AssembleError::Encode("no embedded art".to_string()))
    }

    async fn merge(
        &self,
        list_file: &Path,
        cover: &Path,
        metadata: &Path,
        output: &Path,
    ) -> Result<()> {
        self.merge_calls.fetch_add(1, Ordering::SeqCst);
        assert!(list_file.exists(), "concat list must exist before merge");
        assert!(cover.exists(), "cover must exist before merge");
        assert!(metadata.exists(), "metadata sidecar must exist before merge");
        fs::write(output, b"m4b").map_err(AssembleError::Io)
    }
}

/// Prober that answers from fixed per-filename tables.
struct MockProber {
    bitrates: HashMap<String, u32>,
    durations: HashMap<String, String>,
    tags: HashMap<String, Vec<(String, String)>>,
    bitrate_calls: AtomicUsize,
}

impl MockProber {
    fn new() -> Self {
        Self {
            bitrates: HashMap::new(),
            durations: HashMap::new(),
            tags: HashMap::new(),
            bitrate_calls: AtomicUsize::new(0),
        }
    }

    fn with_bitrate(mut self, filename: &str, kbps: u32) -> Self {
        self.bitrates.insert(filename.to_string(), kbps);
        self
    }

    fn with_format(mut self, stem: &str, duration: &str, tags: &[(&str, &str)]) -> Self {
        let encoded = format!("{stem}.m4a");
        self.durations.insert(encoded.clone(), duration.to_string());
        self.tags.insert(
            encoded,
            tags.iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        );
        self
    }
}

#[async_trait]
impl Prober for MockProber {
    async fn probe(&self, file: &Path) -> Result<ProbeResult> {
        let filename = file
            .file_name()
            .unwrap_or_default()
            .to_string_lossy()
            .to_string();
        let duration = self
            .durations
            .get(&filename)
            .cloned()
            .ok_or_else(|| AssembleError::Probe(format!("no mock duration for {filename}")))?;
        let tags: BTreeMap<String, String> = self
            .tags
            .get(&filename)
            .map(|pairs| pairs.iter().cloned().collect())
            .unwrap_or_default();
        Ok(ProbeResult {
            filename,
            duration,
            tags,
        })
    }

    async fn bitrate_kbps(&self, file: &Path) -> Result<u32> {
        self.bitrate_calls.fetch_add(1, Ordering::SeqCst);
        let filename = file
            .file_name()
            .unwrap_or_default()
            .to_string_lossy()
            .to_string();
        self.bitrates
            .get(&filename)
            .copied()
            .ok_or_else(|| AssembleError::Probe(format!("no mock bitrate for {filename}")))
    }
}

fn book_dir(names: &[&str]) -> TempDir {
    let dir = TempDir::new().unwrap();
    for name in names {
        fs::write(dir.path().join(name), b"mp3").unwrap();
    }
    dir
}

fn quiet_config() -> PipelineConfig {
    PipelineConfig {
        show_progress: false,
        ..PipelineConfig::default()
    }
}

// ============================================================================
// End-to-end pipeline tests
// ============================================================================

mod pipeline_tests {
    use super::*;

    fn standard_prober() -> MockProber {
        MockProber::new()
            .with_bitrate("01 - intro.mp3", 127)
            .with_bitrate("02 - body.mp3", 129)
            .with_bitrate("03 - end.mp3", 126)
            .with_format(
                "01 - intro",
                "10.000000",
                &[
                    ("artist", "J. Doe"),
                    ("album", "Book One"),
                    ("title", "Intro"),
                    ("track", "1"),
                    ("comment", "irrelevant"),
                ],
            )
            .with_format("02 - body", "20.500000", &[("title", "The Body")])
            .with_format("03 - end", "5.250000", &[])
    }

    #[tokio::test]
    async fn test_full_assembly() {
        let dir = book_dir(&["01 - intro.mp3", "02 - body.mp3", "03 - end.mp3"]);
        let encoder = Arc::new(MockEncoder::new());
        let prober = Arc::new(standard_prober());

        let outcome = assemble(
            dir.path(),
            encoder.clone(),
            prober.clone(),
            &quiet_config(),
        )
        .await
        .unwrap();

        // unanimous sources standardize to 128
        assert_eq!(outcome.stats.bitrate_kbps, 128);
        assert_eq!(prober.bitrate_calls.load(Ordering::SeqCst), 3);
        assert_eq!(encoder.encode_calls.load(Ordering::SeqCst), 3);
        assert_eq!(encoder.merge_calls.load(Ordering::SeqCst), 1);

        // chapters are contiguous from zero in filename order
        assert_eq!(outcome.chapters.len(), 3);
        assert_eq!(outcome.chapters[0].start_ms, 0);
        assert_eq!(outcome.chapters[0].end_ms, 10_000);
        assert_eq!(outcome.chapters[1].start_ms, 10_000);
        assert_eq!(outcome.chapters[1].end_ms, 30_500);
        assert_eq!(outcome.chapters[2].start_ms, 30_500);
        assert_eq!(outcome.chapters[2].end_ms, 35_750);

        // title tag, then filename stem fallback
        assert_eq!(outcome.chapters[0].title, "Intro");
        assert_eq!(outcome.chapters[1].title, "The Body");
        assert_eq!(outcome.chapters[2].title, "03 - end");

        // book-level bag: whitelisted, per-chapter fields dropped, genre pinned
        assert_eq!(outcome.tags.get("artist").map(String::as_str), Some("J. Doe"));
        assert!(!outcome.tags.contains_key("title"));
        assert!(!outcome.tags.contains_key("track"));
        assert!(!outcome.tags.contains_key("comment"));
        assert_eq!(outcome.tags.get("genre").map(String::as_str), Some("Audiobook"));

        // output name derived from tags, written by the merge step
        assert_eq!(
            outcome.output_path.file_name().unwrap(),
            "J. Doe - Book One.m4b"
        );
        assert!(outcome.output_path.exists());
        assert_eq!(outcome.stats.book_duration_ms, 35_750);

        // no local or embedded art, so the bundled default was written out
        assert!(dir.path().join("default_cover.png").exists());
    }

    #[tokio::test]
    async fn test_empty_directory_is_discovery_error() {
        let dir = book_dir(&[]);
        let result = assemble(
            dir.path(),
            Arc::new(MockEncoder::new()),
            Arc::new(MockProber::new()),
            &quiet_config(),
        )
        .await;
        assert!(matches!(result, Err(AssembleError::Discovery(_))));
    }

    #[tokio::test]
    async fn test_encode_failure_is_fatal_after_full_batch() {
        let dir = book_dir(&["01 - intro.mp3", "02 - body.mp3", "03 - end.mp3"]);
        let encoder = Arc::new(MockEncoder::failing_on("02 - body"));
        let prober = Arc::new(standard_prober());

        let result = assemble(dir.path(), encoder.clone(), prober, &quiet_config()).await;
        assert!(matches!(result, Err(AssembleError::Encode(_))));
        // siblings were not cancelled by the failure
        assert_eq!(encoder.encode_calls.load(Ordering::SeqCst), 3);
        // the pipeline never reached the merge step
        assert_eq!(encoder.merge_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_pinned_bitrate_skips_detection() {
        let dir = book_dir(&["01 - intro.mp3", "02 - body.mp3", "03 - end.mp3"]);
        let encoder = Arc::new(MockEncoder::new());
        let prober = Arc::new(standard_prober());

        let config = PipelineConfig {
            bitrate: Some(64),
            ..quiet_config()
        };
        let outcome = assemble(dir.path(), encoder, prober.clone(), &config)
            .await
            .unwrap();

        assert_eq!(outcome.stats.bitrate_kbps, 64);
        assert_eq!(prober.bitrate_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_output_override_wins_over_tags() {
        let dir = book_dir(&["01 - intro.mp3", "02 - body.mp3", "03 - end.mp3"]);
        let config = PipelineConfig {
            output: Some("custom.m4b".to_string()),
            ..quiet_config()
        };
        let outcome = assemble(
            dir.path(),
            Arc::new(MockEncoder::new()),
            Arc::new(standard_prober()),
            &config,
        )
        .await
        .unwrap();

        assert_eq!(outcome.output_path.file_name().unwrap(), "custom.m4b");
    }

    #[tokio::test]
    async fn test_missing_tags_fall_back_to_directory_name() {
        let dir = book_dir(&["01.mp3"]);
        let prober = MockProber::new()
            .with_bitrate("01.mp3", 96)
            .with_format("01", "3.000000", &[]);

        let outcome = assemble(
            dir.path(),
            Arc::new(MockEncoder::new()),
            Arc::new(prober),
            &quiet_config(),
        )
        .await
        .unwrap();

        let dir_name = dir.path().file_name().unwrap().to_string_lossy();
        assert_eq!(
            outcome.output_path.file_name().unwrap().to_string_lossy(),
            format!("{dir_name}.m4b")
        );
    }

    #[tokio::test]
    async fn test_local_cover_is_preferred() {
        let dir = book_dir(&["01.mp3"]);
        fs::write(dir.path().join("folder.jpg"), b"art").unwrap();
        let prober = MockProber::new()
            .with_bitrate("01.mp3", 96)
            .with_format("01", "3.000000", &[]);

        assemble(
            dir.path(),
            Arc::new(MockEncoder::new()),
            Arc::new(prober),
            &quiet_config(),
        )
        .await
        .unwrap();

        // the bundled default was not needed
        assert!(!dir.path().join("default_cover.png").exists());
    }
}

// ============================================================================
// Cross-component property tests
// ============================================================================

mod bitrate_properties {
    use super::*;

    #[test]
    fn test_unanimous_bucket_identity() {
        let selector = BitrateSelector::new();
        for base in [32u32, 64, 96, 128, 160, 192, 256, 320] {
            let samples: Vec<u32> = (0..5).map(|i| base.saturating_sub(i % 3)).collect();
            assert_eq!(selector.decide(&samples).unwrap(), base);
        }
    }

    #[test]
    fn test_weighted_mean_example_from_mixed_rips() {
        let selector = BitrateSelector::new();
        assert_eq!(selector.decide(&[160, 160, 128, 128, 64]).unwrap(), 128);
    }

    #[test]
    fn test_standardize_idempotent_over_range() {
        let selector = BitrateSelector::new();
        for kbps in (0..400).step_by(7) {
            let once = selector.standardize(kbps);
            assert_eq!(selector.standardize(once), once);
        }
    }
}

mod timeline_properties {
    use super::*;

    fn probe_of(filename: &str, duration: &str) -> ProbeResult {
        ProbeResult {
            filename: filename.to_string(),
            duration: duration.to_string(),
            tags: BTreeMap::new(),
        }
    }

    #[test]
    fn test_chapter_contiguity_for_any_permutation() {
        let files = [
            ("b.m4a", "7.125000"),
            ("a.m4a", "3.000000"),
            ("d.m4a", "11.900000"),
            ("c.m4a", "0.500000"),
        ];

        // two different input orders, identical timeline
        let forward: Vec<_> = files.iter().map(|(f, d)| probe_of(f, d)).collect();
        let reversed: Vec<_> = files.iter().rev().map(|(f, d)| probe_of(f, d)).collect();

        let (chapters_a, _) = timeline::build(forward).unwrap();
        let (chapters_b, _) = timeline::build(reversed).unwrap();
        assert_eq!(chapters_a, chapters_b);

        assert_eq!(chapters_a[0].start_ms, 0);
        for i in 1..chapters_a.len() {
            assert_eq!(chapters_a[i].start_ms, chapters_a[i - 1].end_ms);
        }
        assert_eq!(chapters_a[0].title, "a");
    }
}
