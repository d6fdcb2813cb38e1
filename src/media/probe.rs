use std::collections::BTreeMap;
use std::path::Path;
use std::sync::OnceLock;

use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;

use crate::error::{AssembleError, Result};
use crate::media::runner::CommandRunner;
use crate::media::{ProbeResult, Prober};

/// `ffprobe -of json -show_entries format` container.
#[derive(Debug, Deserialize)]
struct FormatContainer {
    format: FormatSection,
}

#[derive(Debug, Default, Deserialize)]
struct FormatSection {
    filename: Option<String>,
    duration: Option<String>,
    bit_rate: Option<String>,
    #[serde(default)]
    tags: BTreeMap<String, String>,
}

fn flat_line_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"^format\.(tags\.)?([^=.\s]+)="?(.*?)"?$"#).expect("valid regex")
    })
}

/// Parse prober output in either the JSON or the flat `key="value"`
/// representation into a format section.
fn parse_format(raw: &[u8]) -> Option<FormatSection> {
    if let Ok(container) = serde_json::from_slice::<FormatContainer>(raw) {
        return Some(container.format);
    }

    let text = String::from_utf8_lossy(raw);
    let mut section = FormatSection::default();
    let mut saw_any = false;
    for line in text.lines() {
        let Some(caps) = flat_line_re().captures(line.trim()) else {
            continue;
        };
        saw_any = true;
        let key = caps[2].to_lowercase();
        let value = caps[3].to_string();
        if caps.get(1).is_some() {
            section.tags.insert(key, value);
        } else {
            match key.as_str() {
                "filename" => section.filename = Some(value),
                "duration" => section.duration = Some(value),
                "bit_rate" => section.bit_rate = Some(value),
                _ => {}
            }
        }
    }
    saw_any.then_some(section)
}

/// FFprobe-backed metadata prober.
pub struct FfprobeProber {
    runner: CommandRunner,
}

impl FfprobeProber {
    pub fn new(runner: CommandRunner) -> Self {
        Self { runner }
    }

    async fn probe_format(&self, file: &Path) -> Result<FormatSection> {
        let args = vec![
            "-hide_banner".to_string(),
            "-of".to_string(),
            "json".to_string(),
            "-v".to_string(),
            "quiet".to_string(),
            "-show_entries".to_string(),
            "format".to_string(),
            file.display().to_string(),
        ];

        let output = self
            .runner
            .run("ffprobe", &args)
            .await
            .map_err(|e| AssembleError::Probe(e.to_string()))?;

        parse_format(&output.stdout).ok_or_else(|| {
            AssembleError::Probe(format!(
                "Unparsable ffprobe output for {}",
                file.display()
            ))
        })
    }
}

#[async_trait]
impl Prober for FfprobeProber {
    async fn probe(&self, file: &Path) -> Result<ProbeResult> {
        let format = self.probe_format(file).await?;

        let duration = format.duration.ok_or_else(|| {
            AssembleError::Probe(format!("No duration reported for {}", file.display()))
        })?;

        // Prefer the basename from the report, fall back to the path we asked about
        let filename = format
            .filename
            .as_deref()
            .and_then(|f| Path::new(f).file_name())
            .or_else(|| file.file_name())
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();

        let tags = format
            .tags
            .into_iter()
            .map(|(k, v)| (k.to_lowercase(), v))
            .collect();

        Ok(ProbeResult {
            filename,
            duration,
            tags,
        })
    }

    async fn bitrate_kbps(&self, file: &Path) -> Result<u32> {
        let format = self.probe_format(file).await?;

        let raw = format.bit_rate.ok_or_else(|| {
            AssembleError::Probe(format!("No bit_rate reported for {}", file.display()))
        })?;
        let bits_per_sec: u64 = raw.trim().parse().map_err(|_| {
            AssembleError::Probe(format!(
                "Unparsable bit_rate '{}' for {}",
                raw.trim(),
                file.display()
            ))
        })?;

        // metadata reports bits/s, the ladder is in kbps
        Ok((bits_per_sec / 1000) as u32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_json_format() {
        let raw = br#"{
            "format": {
                "filename": "/books/01 - Intro.m4a",
                "duration": "903.529000",
                "bit_rate": "127843",
                "tags": {"Artist": "J. Doe", "album": "Book One"}
            }
        }"#;

        let format = parse_format(raw).unwrap();
        assert_eq!(format.duration.as_deref(), Some("903.529000"));
        assert_eq!(format.bit_rate.as_deref(), Some("127843"));
        assert_eq!(format.tags.get("Artist").map(String::as_str), Some("J. Doe"));
    }

    #[test]
    fn test_parse_flat_format() {
        let raw = b"format.filename=\"01.m4a\"\nformat.duration=\"42.100000\"\nformat.tags.artist=\"J. Doe\"\nformat.tags.title=\"Intro\"\n";

        let format = parse_format(raw).unwrap();
        assert_eq!(format.filename.as_deref(), Some("01.m4a"));
        assert_eq!(format.duration.as_deref(), Some("42.100000"));
        assert_eq!(format.tags.get("artist").map(String::as_str), Some("J. Doe"));
        assert_eq!(format.tags.get("title").map(String::as_str), Some("Intro"));
    }

    #[test]
    fn test_parse_garbage_yields_none() {
        assert!(parse_format(b"not a format dump").is_none());
        assert!(parse_format(b"").is_none());
    }

    #[test]
    fn test_flat_values_are_dequoted() {
        let raw = b"format.tags.album=\"Quoted \"\n";
        let format = parse_format(raw).unwrap();
        assert_eq!(format.tags.get("album").map(String::as_str), Some("Quoted "));
    }
}
