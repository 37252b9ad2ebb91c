//! Spectrum analyser producing byte frequency magnitudes.
//!
//! Mirrors the behaviour of a browser `AnalyserNode`: Blackman window over the
//! latest `fft_size` samples, magnitudes normalised by the FFT size, smoothed
//! over time, converted to decibels and mapped onto `0..=255` between
//! `min_decibels` and `max_decibels`.

use num_complex::Complex;
use rustfft::{Fft, FftPlanner};
use std::f32::consts::PI;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct AnalyserConfig {
    /// FFT size (power of 2); yields `fft_size / 2` bins
    pub fft_size: usize,
    /// Time smoothing constant, 0.0 (none) - 1.0 (frozen)
    pub smoothing: f32,
    pub min_decibels: f32,
    pub max_decibels: f32,
}

impl Default for AnalyserConfig {
    fn default() -> Self {
        Self {
            fft_size: 256,
            smoothing: 0.8,
            min_decibels: -100.0,
            max_decibels: -30.0,
        }
    }
}

pub struct Analyser {
    fft: Arc<dyn Fft<f32>>,
    config: AnalyserConfig,
    window: Vec<f32>,
    fft_buffer: Vec<Complex<f32>>,
    scratch_buffer: Vec<Complex<f32>>,
    smoothed: Vec<f32>,
}

impl Analyser {
    pub fn new(config: AnalyserConfig) -> Self {
        let fft_size = config.fft_size.max(32).next_power_of_two();
        let config = AnalyserConfig { fft_size, ..config };

        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(fft_size);

        // Blackman window, alpha = 0.16
        let n = fft_size as f32;
        let window = (0..fft_size)
            .map(|i| {
                let x = i as f32 / n;
                0.42 - 0.5 * (2.0 * PI * x).cos() + 0.08 * (4.0 * PI * x).cos()
            })
            .collect();

        let scratch_len = fft.get_inplace_scratch_len();
        log::debug!(
            "Analyser created: fft_size={}, smoothing={}, range={}..{} dB",
            fft_size,
            config.smoothing,
            config.min_decibels,
            config.max_decibels
        );

        Self {
            fft,
            window,
            fft_buffer: vec![Complex::new(0.0, 0.0); fft_size],
            scratch_buffer: vec![Complex::new(0.0, 0.0); scratch_len],
            smoothed: vec![0.0; fft_size / 2],
            config,
        }
    }

    pub fn fft_size(&self) -> usize {
        self.config.fft_size
    }

    pub fn bin_count(&self) -> usize {
        self.config.fft_size / 2
    }

    /// Analyse the most recent samples and write one byte per bin into `out`.
    ///
    /// `samples` shorter than the FFT size are treated as preceded by silence;
    /// longer input only uses its tail.
    pub fn byte_frequency_data(&mut self, samples: &[f32], out: &mut [u8]) {
        let size = self.config.fft_size;
        let tail = &samples[samples.len().saturating_sub(size)..];
        let pad = size - tail.len();

        for (i, slot) in self.fft_buffer.iter_mut().enumerate() {
            let s = if i < pad { 0.0 } else { tail[i - pad] };
            *slot = Complex::new(s * self.window[i], 0.0);
        }
        self.fft
            .process_with_scratch(&mut self.fft_buffer, &mut self.scratch_buffer);

        let tau = self.config.smoothing.clamp(0.0, 1.0);
        let range = self.config.max_decibels - self.config.min_decibels;
        let scale = 1.0 / size as f32;

        for (k, smoothed) in self.smoothed.iter_mut().enumerate() {
            let magnitude = self.fft_buffer[k].norm() * scale;
            *smoothed = tau * *smoothed + (1.0 - tau) * magnitude;

            if let Some(byte) = out.get_mut(k) {
                *byte = if *smoothed <= 0.0 {
                    0
                } else {
                    let db = 20.0 * smoothed.log10();
                    (255.0 / range * (db - self.config.min_decibels))
                        .floor()
                        .clamp(0.0, 255.0) as u8
                };
            }
        }
    }
}
