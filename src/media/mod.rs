pub mod encode;
pub mod probe;
pub mod runner;

pub use encode::{write_concat_list, FfmpegEncoder};
pub use probe::FfprobeProber;
pub use runner::CommandRunner;

use std::collections::BTreeMap;
use std::path::Path;
use std::process::Command;

use async_trait::async_trait;
use tracing::debug;

use crate::error::{AssembleError, Result};

/// Format-level metadata for one media file, as reported by the prober.
///
/// The duration is kept as the prober's decimal-seconds string; the
/// timeline builder is responsible for parsing it into milliseconds.
#[derive(Debug, Clone)]
pub struct ProbeResult {
    pub filename: String,
    pub duration: String,
    pub tags: BTreeMap<String, String>,
}

/// External encoder, invoked once per work item.
#[async_trait]
pub trait Encoder: Send + Sync {
    /// Transcode `source` to an AAC/M4A file at `output`.
    async fn encode(&self, source: &Path, bitrate_kbps: u32, output: &Path) -> Result<()>;

    /// Copy embedded cover art out of `source` into `output`.
    async fn extract_cover(&self, source: &Path, output: &Path) -> Result<()>;

    /// Concatenate the files listed in `list_file` with `cover` and the
    /// chapter metadata sidecar into the final container at `output`.
    async fn merge(
        &self,
        list_file: &Path,
        cover: &Path,
        metadata: &Path,
        output: &Path,
    ) -> Result<()>;
}

/// External metadata prober.
#[async_trait]
pub trait Prober: Send + Sync {
    /// Fetch duration and tags for `file`.
    async fn probe(&self, file: &Path) -> Result<ProbeResult>;

    /// Fetch the encoded bitrate of `file` in kbps.
    async fn bitrate_kbps(&self, file: &Path) -> Result<u32>;
}

/// Check if FFmpeg is installed and accessible.
pub fn check_ffmpeg() -> Result<()> {
    let output = Command::new("ffmpeg").arg("-version").output().map_err(|e| {
        AssembleError::Encode(format!(
            "FFmpeg not found. Please install FFmpeg and ensure it's in your PATH. Error: {e}"
        ))
    })?;

    if !output.status.success() {
        return Err(AssembleError::Encode("FFmpeg check failed".to_string()));
    }

    debug!("FFmpeg is available");
    Ok(())
}

/// Check if FFprobe is installed and accessible.
pub fn check_ffprobe() -> Result<()> {
    let output = Command::new("ffprobe").arg("-version").output().map_err(|e| {
        AssembleError::Probe(format!(
            "FFprobe not found. Please install FFmpeg (includes FFprobe). Error: {e}"
        ))
    })?;

    if !output.status.success() {
        return Err(AssembleError::Probe("FFprobe check failed".to_string()));
    }

    debug!("FFprobe is available");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ffmpeg_available() -> bool {
        Command::new("ffmpeg")
            .arg("-version")
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    #[test]
    fn test_check_ffmpeg() {
        if !ffmpeg_available() {
            eprintln!("Skipping test: FFmpeg not available or broken");
            return;
        }
        assert!(check_ffmpeg().is_ok());
    }

    #[test]
    fn test_check_ffprobe() {
        if !Command::new("ffprobe")
            .arg("-version")
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
        {
            eprintln!("Skipping test: FFprobe not available or broken");
            return;
        }
        assert!(check_ffprobe().is_ok());
    }
}
