use crate::error::{AssembleError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Canonical encoding bitrates (kbps). Noisy or VBR source bitrates are
/// normalized to the nearest entry of this ladder.
pub const BITRATE_LADDER: [u32; 8] = [32, 64, 96, 128, 160, 192, 256, 320];

/// Tags copied from the first chapter into the book-level tag bag.
pub const TAG_WHITELIST: [&str; 7] = [
    "album",
    "title",
    "artist",
    "disk",
    "track",
    "date",
    "performer",
];

/// Whitelisted tags that are per-chapter, not per-book, and therefore
/// dropped again from the book-level bag.
pub const BOOK_LEVEL_DROPPED_TAGS: [&str; 2] = ["title", "track"];

/// Genre force-set on every assembled book regardless of source tags.
pub const AUDIOBOOK_GENRE: &str = "Audiobook";

/// Conventional cover-art file stems, matched case-insensitively.
pub const COVER_STEMS: [&str; 3] = ["cover", "folder", "image"];

/// Image extensions considered cover candidates, matched case-insensitively.
pub const COVER_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

/// A lone unnamed image larger than this is assumed unrelated to the book.
pub const MAX_LONE_COVER_BYTES: u64 = 300 * 1024;

/// Output stem when neither tags nor the directory name yield one.
pub const FALLBACK_OUTPUT_STEM: &str = "audiobook";

/// Filename the bundled default cover is written out under.
pub const DEFAULT_COVER_NAME: &str = "default_cover.png";

/// Filename embedded art is extracted to.
pub const EXTRACTED_COVER_NAME: &str = "cover.jpg";

/// Chapter-metadata sidecar consumed by the merge step.
pub const METADATA_FILE_NAME: &str = "FFMETA";

/// Concat list consumed by the merge step.
pub const CONCAT_LIST_NAME: &str = "filelist.txt";

/// Container extension of the assembled book.
pub const OUTPUT_EXTENSION: &str = "m4b";

fn default_source_ext() -> String {
    "mp3".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Extension of the per-chapter source files.
    #[serde(default = "default_source_ext")]
    pub source_ext: String,
    /// Pin the target bitrate instead of detecting it from the sources.
    #[serde(default)]
    pub bitrate: Option<u32>,
    /// Override the worker-pool concurrency.
    #[serde(default)]
    pub concurrency: Option<usize>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            source_ext: default_source_ext(),
            bitrate: None,
            concurrency: None,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let mut config = Self::default();

        // Load from config file if it exists
        if let Some(config_path) = Self::config_file_path() {
            if config_path.exists() {
                let contents = std::fs::read_to_string(&config_path)?;
                if let Ok(file_config) = toml::from_str::<Config>(&contents) {
                    config = file_config;
                }
            }
        }

        // Override with environment variables
        if let Ok(ext) = std::env::var("M4BIND_SOURCE_EXT") {
            config.source_ext = ext;
        }
        if let Ok(bitrate) = std::env::var("M4BIND_BITRATE") {
            if let Ok(b) = bitrate.parse() {
                config.bitrate = Some(b);
            }
        }
        if let Ok(concurrency) = std::env::var("M4BIND_CONCURRENCY") {
            if let Ok(c) = concurrency.parse() {
                config.concurrency = Some(c);
            }
        }

        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.source_ext.is_empty() {
            return Err(AssembleError::Config(
                "Source extension must not be empty".to_string(),
            ));
        }

        if self.bitrate == Some(0) {
            return Err(AssembleError::Config(
                "Bitrate must be greater than 0".to_string(),
            ));
        }

        if self.concurrency == Some(0) {
            return Err(AssembleError::Config(
                "Concurrency must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    fn config_file_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("m4bind").join("config.toml"))
    }
}
