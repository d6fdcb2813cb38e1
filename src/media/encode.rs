use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;

use crate::error::{AssembleError, Result};
use crate::media::runner::CommandRunner;
use crate::media::Encoder;

/// FFmpeg-backed encoder.
pub struct FfmpegEncoder {
    runner: CommandRunner,
}

impl FfmpegEncoder {
    pub fn new(runner: CommandRunner) -> Self {
        Self { runner }
    }

    async fn run_ffmpeg(&self, args: Vec<String>) -> Result<()> {
        self.runner
            .run("ffmpeg", &args)
            .await
            .map(|_| ())
            .map_err(|e| AssembleError::Encode(e.to_string()))
    }
}

#[async_trait]
impl Encoder for FfmpegEncoder {
    async fn encode(&self, source: &Path, bitrate_kbps: u32, output: &Path) -> Result<()> {
        let args = vec![
            "-y".to_string(),
            "-i".to_string(),
            source.display().to_string(),
            "-map".to_string(),
            "0:a".to_string(),
            "-c:a".to_string(),
            "aac".to_string(),
            "-b:a".to_string(),
            format!("{bitrate_kbps}k"),
            output.display().to_string(),
        ];
        self.run_ffmpeg(args).await?;
        debug!("Encoded {} -> {}", source.display(), output.display());
        Ok(())
    }

    async fn extract_cover(&self, source: &Path, output: &Path) -> Result<()> {
        let args = vec![
            "-y".to_string(),
            "-i".to_string(),
            source.display().to_string(),
            "-map".to_string(),
            "0:v:0".to_string(),
            "-c".to_string(),
            "copy".to_string(),
            output.display().to_string(),
        ];
        self.run_ffmpeg(args).await?;

        if !output.exists() {
            return Err(AssembleError::Encode(format!(
                "No embedded art extracted from {}",
                source.display()
            )));
        }
        Ok(())
    }

    async fn merge(
        &self,
        list_file: &Path,
        cover: &Path,
        metadata: &Path,
        output: &Path,
    ) -> Result<()> {
        let args = vec![
            "-y".to_string(),
            "-f".to_string(),
            "concat".to_string(),
            "-thread_queue_size".to_string(),
            "40960".to_string(),
            "-safe".to_string(),
            "0".to_string(),
            "-i".to_string(),
            list_file.display().to_string(),
            "-i".to_string(),
            cover.display().to_string(),
            "-i".to_string(),
            metadata.display().to_string(),
            "-map".to_string(),
            "0".to_string(),
            "-map".to_string(),
            "1".to_string(),
            "-map_metadata".to_string(),
            "2".to_string(),
            "-c".to_string(),
            "copy".to_string(),
            "-disposition:v:0".to_string(),
            "attached_pic".to_string(),
            output.display().to_string(),
        ];
        self.run_ffmpeg(args).await
    }
}

/// Write the concat-demuxer list file referencing `files` by absolute path.
pub fn write_concat_list(files: &[PathBuf], dest: &Path) -> Result<()> {
    let mut contents = String::new();
    for file in files {
        let absolute = std::fs::canonicalize(file)?;
        // single quotes in the path would break the single-quoted list entry
        let escaped = absolute.display().to_string().replace('\'', r"'\''");
        contents.push_str(&format!("file '{escaped}'\n"));
    }
    std::fs::write(dest, contents)?;
    Ok(())
}
