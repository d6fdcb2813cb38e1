use std::collections::BTreeMap;
use std::path::Path;

use tracing::debug;

use crate::config::{
    AUDIOBOOK_GENRE, BOOK_LEVEL_DROPPED_TAGS, FALLBACK_OUTPUT_STEM, TAG_WHITELIST,
};
use crate::error::{AssembleError, Result};
use crate::media::ProbeResult;

/// One chapter of the assembled book. Offsets are milliseconds from the
/// start of the container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chapter {
    pub title: String,
    pub start_ms: u64,
    pub end_ms: u64,
}

/// Book-level tag set carried into the final container.
pub type TagBag = BTreeMap<String, String>;

/// Fold per-file probe results into an ordered chapter list and the
/// book-level tag bag.
///
/// The filename sort order of the inputs is the sole determinant of chapter
/// sequence; callers may hand results in any order.
pub fn build(mut probes: Vec<ProbeResult>) -> Result<(Vec<Chapter>, TagBag)> {
    if probes.is_empty() {
        return Err(AssembleError::Metadata(
            "No probe results to build a timeline from".to_string(),
        ));
    }

    probes.sort_by(|a, b| a.filename.cmp(&b.filename));

    let tag_bag = derive_tag_bag(&probes[0]);

    let mut chapters = Vec::with_capacity(probes.len());
    let mut end_ms = 0u64;
    for (index, probe) in probes.iter().enumerate() {
        let duration_ms = parse_duration_ms(&probe.duration).map_err(|e| {
            AssembleError::Metadata(format!("{} ({})", e, probe.filename))
        })?;
        let start_ms = end_ms;
        end_ms = start_ms + duration_ms;
        let title = select_title(probe, index);
        debug!("Chapter {:04}: '{}' {}..{}", index, title, start_ms, end_ms);
        chapters.push(Chapter {
            title,
            start_ms,
            end_ms,
        });
    }

    Ok((chapters, tag_bag))
}

/// Parse a decimal-seconds string (e.g. "903.529000") into milliseconds.
///
/// The decimal is parsed explicitly rather than sliced: the integer part
/// carries seconds, the fraction is rounded to three digits.
pub fn parse_duration_ms(duration: &str) -> Result<u64> {
    let trimmed = duration.trim().trim_matches('"');
    let (whole, frac) = match trimmed.split_once('.') {
        Some((w, f)) => (w, f),
        None => (trimmed, ""),
    };

    let bad = || AssembleError::Metadata(format!("Unparsable duration '{duration}'"));

    let seconds: u64 = if whole.is_empty() {
        0
    } else {
        whole.parse().map_err(|_| bad())?
    };
    if whole.is_empty() && frac.is_empty() {
        return Err(bad());
    }

    let mut millis = 0u64;
    if !frac.is_empty() {
        if !frac.bytes().all(|b| b.is_ascii_digit()) {
            return Err(bad());
        }
        for (i, b) in frac.bytes().take(3).enumerate() {
            millis += u64::from(b - b'0') * 10u64.pow(2 - i as u32);
        }
        // round on the fourth fractional digit
        if frac.bytes().nth(3).is_some_and(|b| b >= b'5') {
            millis += 1;
        }
    }

    Ok(seconds * 1000 + millis)
}

/// Pick a chapter title: title tag, then filename stem, then a zero-padded
/// sequence number.
fn select_title(probe: &ProbeResult, index: usize) -> String {
    if let Some(title) = probe.tags.get("title") {
        if !title.is_empty() {
            return title.clone();
        }
    }
    if !probe.filename.is_empty() {
        return strip_extension(&probe.filename).to_string();
    }
    format!("{index:04}")
}

fn strip_extension(filename: &str) -> &str {
    match filename.rfind('.') {
        Some(dot) => &filename[..dot],
        None => filename,
    }
}

/// Book-level tags come from the first file in sorted order, filtered to the
/// whitelist. Title and track are whitelisted but per-chapter, so they are
/// dropped again before the bag is applied book-wide, and genre is pinned so
/// players shelve the result as an audiobook.
fn derive_tag_bag(first: &ProbeResult) -> TagBag {
    let mut bag: TagBag = first
        .tags
        .iter()
        .filter(|(k, _)| TAG_WHITELIST.contains(&k.as_str()))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();

    for dropped in BOOK_LEVEL_DROPPED_TAGS {
        bag.remove(dropped);
    }

    bag.insert("genre".to_string(), AUDIOBOOK_GENRE.to_string());
    bag
}

/// Derive the output file stem: "{artist} - {album}" when both tags are
/// usable, else the working directory's basename, else a fixed fallback.
/// Path separators are never allowed through.
pub fn derive_output_stem(tags: &TagBag, workdir: &Path) -> String {
    let artist = tags.get("artist").filter(|v| !v.is_empty());
    let album = tags.get("album").filter(|v| !v.is_empty());

    let stem = match (artist, album) {
        (Some(artist), Some(album)) => format!("{artist} - {album}"),
        _ => workdir
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| FALLBACK_OUTPUT_STEM.to_string()),
    };

    stem.replace(['/', '\\'], "_")
}
