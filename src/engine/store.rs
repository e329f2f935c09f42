// src/engine/store.rs

use anyhow::{bail, Result};

use crate::source::BlockSource;
use crate::spectrum::SpectrumAnalyzer;

/// Immutable per-channel sample and spectrum storage.
///
/// Built once at engine construction and never mutated again, so it is read
/// without synchronization from any thread.
pub struct TrackStore {
    channels: Vec<Vec<f32>>,
    spectra: Vec<Vec<Vec<f32>>>,
    sample_count: usize,
    sample_rate: u32,
    window_size: usize,
}

impl TrackStore {
    /// Drive the source to exhaustion, storing raw samples per channel and
    /// one spectrum block per channel per window.
    ///
    /// The window buffer is zeroed before every read, so a short final read
    /// is analyzed as a zero-padded full window; only the frames actually
    /// read land in the sample buffers. An empty source yields zero samples
    /// and zero blocks.
    pub fn ingest(source: &mut dyn BlockSource, analyzer: &mut SpectrumAnalyzer) -> Result<Self> {
        let channel_count = source.channel_count();
        if channel_count == 0 {
            bail!("source reports zero channels");
        }
        let sample_rate = source.sample_rate();
        let window_size = analyzer.window_size();

        let mut block: Vec<Vec<f32>> = vec![vec![0.0; window_size]; channel_count];
        let mut channels: Vec<Vec<f32>> = vec![Vec::new(); channel_count];
        let mut spectra: Vec<Vec<Vec<f32>>> = vec![Vec::new(); channel_count];
        let mut sample_count = 0usize;
        let mut blocks = 0usize;

        loop {
            for window in block.iter_mut() {
                window.fill(0.0);
            }
            let read = source.read_block(&mut block)?;
            if read == 0 {
                break;
            }

            for (ch, window) in block.iter().enumerate() {
                channels[ch].extend_from_slice(&window[..read]);
                spectra[ch].push(analyzer.analyze(window));
            }
            sample_count += read;
            blocks += 1;

            if read < window_size {
                break;
            }
        }

        log::info!(
            "ingested {:.2}s ({} samples in {} blocks of {}) across {} channels at {} Hz",
            sample_count as f64 / sample_rate.max(1) as f64,
            sample_count,
            blocks,
            window_size,
            channel_count,
            sample_rate
        );

        Ok(Self {
            channels,
            spectra,
            sample_count,
            sample_rate,
            window_size,
        })
    }

    pub fn sample_count(&self) -> usize {
        self.sample_count
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    pub fn block_count(&self) -> usize {
        self.spectra.first().map(|s| s.len()).unwrap_or(0)
    }

    pub fn channel_samples(&self, channel: usize) -> Option<&[f32]> {
        self.channels.get(channel).map(|c| c.as_slice())
    }

    /// The spectrum block covering `position`, i.e. block
    /// `position / window_size`.
    pub fn spectrum_at(&self, channel: usize, position: usize) -> Option<&[f32]> {
        if position >= self.sample_count {
            return None;
        }
        self.spectra
            .get(channel)
            .and_then(|blocks| blocks.get(position / self.window_size))
            .map(|block| block.as_slice())
    }

    /// Sum of the magnitudes in the spectrum block covering `position`.
    /// Recomputed on every call; blocks are small and bounded.
    pub fn channel_energy(&self, channel: usize, position: usize) -> Option<f32> {
        self.spectrum_at(channel, position)
            .map(|block| block.iter().sum())
    }

    pub(crate) fn channels(&self) -> &[Vec<f32>] {
        &self.channels
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::MemorySource;

    fn ingest_frames(per_channel: Vec<Vec<f32>>, window: usize) -> TrackStore {
        let mut source = MemorySource::new(per_channel, 44_100);
        let mut analyzer = SpectrumAnalyzer::new(window);
        TrackStore::ingest(&mut source, &mut analyzer).unwrap()
    }

    #[test]
    fn test_exact_multiple_of_window() {
        let left: Vec<f32> = (0..2048).map(|i| (i as f32 / 2048.0).sin()).collect();
        let right: Vec<f32> = (0..2048).map(|i| (i as f32 / 1024.0).cos()).collect();
        let store = ingest_frames(vec![left.clone(), right], 1024);

        assert_eq!(store.sample_count(), 2048);
        assert_eq!(store.channel_count(), 2);
        assert_eq!(store.block_count(), 2);
        assert_eq!(store.channel_samples(0).unwrap(), left.as_slice());
    }

    #[test]
    fn test_partial_final_block_is_stored_and_counted() {
        let store = ingest_frames(vec![vec![0.5; 1500]], 1024);

        // ceil(1500 / 1024) == 2
        assert_eq!(store.sample_count(), 1500);
        assert_eq!(store.block_count(), 2);
        assert_eq!(store.channel_samples(0).unwrap().len(), 1500);
    }

    #[test]
    fn test_partial_final_block_is_zero_padded_before_transform() {
        let samples: Vec<f32> = (0..1500).map(|i| ((i * 7) % 13) as f32 * 0.01).collect();
        let store = ingest_frames(vec![samples.clone()], 1024);

        let mut padded = samples[1024..].to_vec();
        padded.resize(1024, 0.0);
        let expected = SpectrumAnalyzer::new(1024).analyze(&padded);

        assert_eq!(store.spectrum_at(0, 1499).unwrap(), expected.as_slice());
    }

    #[test]
    fn test_empty_source_yields_zero_blocks() {
        let store = ingest_frames(vec![Vec::new()], 1024);
        assert_eq!(store.sample_count(), 0);
        assert_eq!(store.block_count(), 0);
        assert!(store.spectrum_at(0, 0).is_none());
    }

    #[test]
    fn test_zero_channels_is_a_construction_failure() {
        let mut source = MemorySource::new(Vec::new(), 44_100);
        let mut analyzer = SpectrumAnalyzer::new(1024);
        assert!(TrackStore::ingest(&mut source, &mut analyzer).is_err());
    }

    #[test]
    fn test_block_index_mapping_and_stability() {
        let samples: Vec<f32> = (0..2048).map(|i| (i as f32 * 0.013).sin()).collect();
        let store = ingest_frames(vec![samples], 1024);

        let first = store.spectrum_at(0, 0).unwrap();
        let same_block = store.spectrum_at(0, 1023).unwrap();
        let next_block = store.spectrum_at(0, 1024).unwrap();

        assert!(std::ptr::eq(first.as_ptr(), same_block.as_ptr()));
        assert!(!std::ptr::eq(first.as_ptr(), next_block.as_ptr()));

        // Stable across repeated calls: same storage, no recomputation drift.
        let again = store.spectrum_at(0, 512).unwrap();
        assert!(std::ptr::eq(first.as_ptr(), again.as_ptr()));
    }

    #[test]
    fn test_energy_is_exact_magnitude_sum() {
        let samples: Vec<f32> = (0..1024).map(|i| ((i % 32) as f32 - 16.0) * 0.02).collect();
        let store = ingest_frames(vec![samples], 1024);

        let expected: f32 = store.spectrum_at(0, 100).unwrap().iter().sum();
        assert_eq!(store.channel_energy(0, 100).unwrap(), expected);
        // Block boundary and mid-block positions map to the same block.
        assert_eq!(store.channel_energy(0, 0).unwrap(), expected);
        assert_eq!(store.channel_energy(0, 1023).unwrap(), expected);
    }

    #[test]
    fn test_out_of_range_queries_fail() {
        let store = ingest_frames(vec![vec![0.1; 512], vec![0.2; 512]], 1024);

        assert!(store.channel_samples(2).is_none());
        assert!(store.spectrum_at(2, 0).is_none());
        assert!(store.spectrum_at(1, 512).is_none());
        assert!(store.channel_energy(1, 512).is_none());
    }
}
