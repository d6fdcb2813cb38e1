use std::collections::BTreeMap;

use tracing::{debug, info};

use crate::config::BITRATE_LADDER;
use crate::discovery::SourceFile;
use crate::error::{AssembleError, Result};
use crate::media::Prober;

/// Picks one target encoding bitrate for a whole batch of source files.
///
/// Sources rarely agree on a bitrate (VBR files report odd values), so each
/// raw measurement is snapped to a standard ladder first. When all files land
/// in the same bucket that bucket wins; otherwise the decision falls back to
/// the occurrence-weighted mean of the raw measurements, snapped once more.
pub struct BitrateSelector {
    ladder: &'static [u32],
}

impl Default for BitrateSelector {
    fn default() -> Self {
        Self {
            ladder: &BITRATE_LADDER,
        }
    }
}

impl BitrateSelector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snap a raw kbps value to the nearest ladder entry.
    ///
    /// Linear scan in ladder order with a strictly-less comparison, so a
    /// value exactly between two entries keeps the earlier (lower) one.
    pub fn standardize(&self, kbps: u32) -> u32 {
        let mut closest = self.ladder[0];
        for &step in self.ladder {
            if step.abs_diff(kbps) < closest.abs_diff(kbps) {
                closest = step;
            }
        }
        closest
    }

    /// Collapse raw per-file kbps samples into one ladder value.
    pub fn decide(&self, samples: &[u32]) -> Result<u32> {
        if samples.is_empty() {
            return Err(AssembleError::Probe(
                "No bitrate samples to decide from".to_string(),
            ));
        }

        let mut buckets: BTreeMap<u32, usize> = BTreeMap::new();
        for &sample in samples {
            *buckets.entry(self.standardize(sample)).or_default() += 1;
        }

        debug!("Source bitrate buckets:");
        for (bucket, count) in &buckets {
            debug!("  {} kbps: {} files", bucket, count);
        }

        // All sources agree
        if buckets.len() == 1 {
            if let Some(&bucket) = buckets.keys().next() {
                return Ok(bucket);
            }
        }

        // Mixed sources: weighted mean of the raw measurements, not of the
        // buckets, so outliers pull proportionally to their real rate
        let sum: u64 = samples.iter().map(|&s| u64::from(s)).sum();
        let mean = (sum / samples.len() as u64) as u32;
        Ok(self.standardize(mean))
    }

    /// Probe every source and pick the batch bitrate.
    pub async fn select_bitrate(
        &self,
        prober: &dyn Prober,
        sources: &[SourceFile],
    ) -> Result<u32> {
        if sources.is_empty() {
            return Err(AssembleError::Probe(
                "No source files to probe for bitrate".to_string(),
            ));
        }

        let mut samples = Vec::with_capacity(sources.len());
        for source in sources {
            let kbps = prober.bitrate_kbps(&source.path).await?;
            debug!("{}: {} kbps", source.file_name, kbps);
            samples.push(kbps);
        }

        let decision = self.decide(&samples)?;
        info!("Using bitrate {} kbps", decision);
        Ok(decision)
    }
}
