use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::Result;

/// A per-chapter source file found in the working directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub path: PathBuf,
    pub file_name: String,
}

/// List regular files in `dir` whose extension matches `ext`
/// (case-insensitive, without the dot), sorted by filename.
pub fn list_sources(dir: &Path, ext: &str) -> Result<Vec<SourceFile>> {
    let wanted = ext.trim_start_matches('.').to_lowercase();
    let mut sources = Vec::new();

    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if !entry.file_type()?.is_file() {
            continue;
        }
        let matches = path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase() == wanted)
            .unwrap_or(false);
        if !matches {
            continue;
        }
        let file_name = entry.file_name().to_string_lossy().to_string();
        sources.push(SourceFile { path, file_name });
    }

    sources.sort_by(|a, b| a.file_name.cmp(&b.file_name));
    debug!("Discovered {} .{} files in {:?}", sources.len(), wanted, dir);
    Ok(sources)
}
