use std::path::{Path, PathBuf};
use std::sync::Arc;

use rust_embed::RustEmbed;
use tracing::{debug, info, warn};

use crate::config::{
    COVER_EXTENSIONS, COVER_STEMS, DEFAULT_COVER_NAME, EXTRACTED_COVER_NAME,
    MAX_LONE_COVER_BYTES,
};
use crate::error::{AssembleError, Result};
use crate::media::Encoder;

#[derive(RustEmbed)]
#[folder = "assets/"]
struct Assets;

/// An image file found during the directory scan.
#[derive(Debug)]
struct CoverCandidate {
    path: PathBuf,
    size_bytes: u64,
    conventional_name: bool,
}

/// Resolves a cover image for the book through a fallback cascade:
/// conventionally named local file, lone small image, art embedded in the
/// first source file, bundled default. Only a broken bundle can fail.
pub struct CoverResolver {
    workdir: PathBuf,
    encoder: Arc<dyn Encoder>,
    first_source: Option<PathBuf>,
}

impl CoverResolver {
    pub fn new(workdir: &Path, encoder: Arc<dyn Encoder>, first_source: Option<PathBuf>) -> Self {
        Self {
            workdir: workdir.to_path_buf(),
            encoder,
            first_source,
        }
    }

    pub async fn resolve(&self) -> Result<PathBuf> {
        let candidates = self.scan_candidates();

        // 1: a file deliberately named as the cover wins outright
        if let Some(named) = candidates.iter().find(|c| c.conventional_name) {
            info!("Using cover {}", named.path.display());
            return Ok(named.path.clone());
        }

        // 2: a lone image is probably the cover, unless it is suspiciously
        // large for one
        if candidates.len() == 1 && candidates[0].size_bytes <= MAX_LONE_COVER_BYTES {
            info!("Using lone image {} as cover", candidates[0].path.display());
            return Ok(candidates[0].path.clone());
        }

        // 3: embedded art from the first chapter
        if let Some(extracted) = self.extract_embedded().await {
            info!("Using extracted cover {}", extracted.display());
            return Ok(extracted);
        }

        // 4: bundled default
        let path = self.write_default()?;
        info!("Using bundled default cover");
        Ok(path)
    }

    /// Enumerate image files in directory-listing order. Scan problems are
    /// not fatal, the cascade continues without local candidates.
    fn scan_candidates(&self) -> Vec<CoverCandidate> {
        let entries = match std::fs::read_dir(&self.workdir) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Could not scan {} for covers: {}", self.workdir.display(), e);
                return Vec::new();
            }
        };

        let mut candidates = Vec::new();
        for entry in entries.flatten() {
            let path = entry.path();
            if !entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
                continue;
            }
            if !is_image_ext(&path) {
                continue;
            }
            let size_bytes = entry.metadata().map(|m| m.len()).unwrap_or(u64::MAX);
            let conventional_name = has_cover_stem(&path);
            debug!(
                "Cover candidate {} ({} bytes, conventional: {})",
                path.display(),
                size_bytes,
                conventional_name
            );
            candidates.push(CoverCandidate {
                path,
                size_bytes,
                conventional_name,
            });
        }
        candidates
    }

    async fn extract_embedded(&self) -> Option<PathBuf> {
        let source = self.first_source.as_ref()?;
        let output = self.workdir.join(EXTRACTED_COVER_NAME);
        match self.encoder.extract_cover(source, &output).await {
            Ok(()) => Some(output),
            Err(e) => {
                // not fatal, the bundled default still applies
                warn!("Cover extraction from {} failed: {}", source.display(), e);
                None
            }
        }
    }

    fn write_default(&self) -> Result<PathBuf> {
        let asset = Assets::get(DEFAULT_COVER_NAME).ok_or_else(|| {
            AssembleError::Asset(format!(
                "{DEFAULT_COVER_NAME} is not bundled into this build"
            ))
        })?;
        let path = self.workdir.join(DEFAULT_COVER_NAME);
        std::fs::write(&path, asset.data.as_ref())?;
        Ok(path)
    }
}

fn is_image_ext(path: &Path) -> bool {
    path.extension()
        .map(|e| {
            let ext = e.to_string_lossy().to_lowercase();
            COVER_EXTENSIONS.contains(&ext.as_str())
        })
        .unwrap_or(false)
}

fn has_cover_stem(path: &Path) -> bool {
    path.file_stem()
        .map(|s| {
            let stem = s.to_string_lossy().to_lowercase();
            COVER_STEMS.contains(&stem.as_str())
        })
        .unwrap_or(false)
}
