use std::fmt::Write as _;
use std::path::Path;

use crate::error::Result;
use crate::timeline::{Chapter, TagBag};

/// Render the FFMETADATA sidecar consumed by the merge step.
///
/// Tag order is deterministic (sorted keys) so reruns produce identical
/// sidecars.
pub fn render(chapters: &[Chapter], tags: &TagBag) -> String {
    let mut out = String::new();
    out.push_str(";FFMETADATA1\n");
    out.push_str("major_brand=mp42\n");
    out.push_str("minor_version=0\n");
    out.push_str("compatible_brands=M4A mp42isom\n");

    for (key, value) in tags {
        let _ = writeln!(out, "{key}={value}");
    }

    for chapter in chapters {
        out.push_str("[CHAPTER]\n");
        out.push_str("TIMEBASE=1/1000\n");
        let _ = writeln!(out, "START={}", chapter.start_ms);
        let _ = writeln!(out, "END={}", chapter.end_ms);
        let _ = writeln!(out, "title={}", chapter.title);
    }

    out
}

/// Write the rendered sidecar to `path`.
pub fn write_metadata_file(path: &Path, chapters: &[Chapter], tags: &TagBag) -> Result<()> {
    std::fs::write(path, render(chapters, tags))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample() -> (Vec<Chapter>, TagBag) {
        let chapters = vec![
            Chapter {
                title: "Intro".to_string(),
                start_ms: 0,
                end_ms: 10_500,
            },
            Chapter {
                title: "Chapter One".to_string(),
                start_ms: 10_500,
                end_ms: 65_000,
            },
        ];
        let mut tags = TagBag::new();
        tags.insert("artist".to_string(), "J. Doe".to_string());
        tags.insert("album".to_string(), "Book One".to_string());
        tags.insert("genre".to_string(), "Audiobook".to_string());
        (chapters, tags)
    }

    #[test]
    fn test_render_header_and_tags() {
        let (chapters, tags) = sample();
        let output = render(&chapters, &tags);

        assert!(output.starts_with(";FFMETADATA1\n"));
        assert!(output.contains("major_brand=mp42\n"));
        assert!(output.contains("compatible_brands=M4A mp42isom\n"));
        assert!(output.contains("artist=J. Doe\n"));
        assert!(output.contains("album=Book One\n"));
        assert!(output.contains("genre=Audiobook\n"));
    }

    #[test]
    fn test_render_chapter_blocks() {
        let (chapters, tags) = sample();
        let output = render(&chapters, &tags);

        assert_eq!(output.matches("[CHAPTER]").count(), 2);
        assert_eq!(output.matches("TIMEBASE=1/1000").count(), 2);
        assert!(output.contains("START=0\n"));
        assert!(output.contains("END=10500\n"));
        assert!(output.contains("START=10500\n"));
        assert!(output.contains("END=65000\n"));
        assert!(output.contains("title=Intro\n"));
        assert!(output.contains("title=Chapter One\n"));
    }

    #[test]
    fn test_render_is_deterministic() {
        let (chapters, tags) = sample();
        assert_eq!(render(&chapters, &tags), render(&chapters, &tags));
    }

    #[test]
    fn test_write_metadata_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("FFMETA");
        let (chapters, tags) = sample();

        write_metadata_file(&path, &chapters, &tags).unwrap();
        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.starts_with(";FFMETADATA1"));
    }
}
