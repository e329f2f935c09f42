// src/spectrum.rs

use rustfft::{num_complex::Complex, Fft, FftPlanner};
use std::sync::Arc;

/// Analysis window length in samples. Every spectrum block covers exactly one
/// window of consecutive samples.
pub const WINDOW_SIZE: usize = 1024;

/// Fixed-size forward FFT, planned once and reused for every block.
pub struct SpectrumAnalyzer {
    fft: Arc<dyn Fft<f32>>,
    window_size: usize,
    scratch: Vec<Complex<f32>>,
}

impl SpectrumAnalyzer {
    pub fn new(window_size: usize) -> Self {
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(window_size);
        Self {
            fft,
            window_size,
            scratch: vec![Complex::new(0.0, 0.0); window_size],
        }
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    /// Transform one window of real samples into one magnitude per bin.
    ///
    /// The scratch state is zeroed before every use, so nothing leaks from the
    /// previous block and a window shorter than `window_size` is analyzed as
    /// if zero-padded to full length.
    pub fn analyze(&mut self, window: &[f32]) -> Vec<f32> {
        for slot in self.scratch.iter_mut() {
            *slot = Complex::new(0.0, 0.0);
        }
        for (slot, &sample) in self
            .scratch
            .iter_mut()
            .zip(window.iter().take(self.window_size))
        {
            slot.re = sample;
        }

        self.fft.process(&mut self.scratch);

        self.scratch.iter().map(|bin| bin.norm()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dc_signal_concentrates_in_bin_zero() {
        let mut analyzer = SpectrumAnalyzer::new(8);
        let mags = analyzer.analyze(&[1.0; 8]);

        assert_eq!(mags.len(), 8);
        assert!((mags[0] - 8.0).abs() < 1e-4);
        for &m in &mags[1..] {
            assert!(m < 1e-4);
        }
    }

    #[test]
    fn test_impulse_is_flat_across_bins() {
        let mut analyzer = SpectrumAnalyzer::new(16);
        let mut window = [0.0f32; 16];
        window[0] = 1.0;

        let mags = analyzer.analyze(&window);
        for &m in &mags {
            assert!((m - 1.0).abs() < 1e-4);
        }
    }

    #[test]
    fn test_short_window_equals_explicit_zero_padding() {
        let mut analyzer = SpectrumAnalyzer::new(32);
        let short: Vec<f32> = (0..20).map(|i| (i as f32 * 0.37).sin()).collect();

        let mut padded = short.clone();
        padded.resize(32, 0.0);

        let a = analyzer.analyze(&short);
        let b = analyzer.analyze(&padded);
        assert_eq!(a, b);
    }

    #[test]
    fn test_noise_window_analyzes_deterministically() {
        use rand::{Rng, SeedableRng};

        let mut rng = rand::rngs::StdRng::seed_from_u64(7);
        let window: Vec<f32> = (0..64).map(|_| rng.random_range(-1.0f32..1.0)).collect();

        let mut analyzer = SpectrumAnalyzer::new(64);
        let a = analyzer.analyze(&window);
        let b = analyzer.analyze(&window);
        assert_eq!(a, b);
    }

    #[test]
    fn test_no_state_leaks_between_blocks() {
        let mut analyzer = SpectrumAnalyzer::new(16);
        let loud = [0.9f32; 16];
        let quiet = [0.0f32; 16];

        let _ = analyzer.analyze(&loud);
        let silent = analyzer.analyze(&quiet);
        for &m in &silent {
            assert!(m < 1e-6);
        }
    }
}
