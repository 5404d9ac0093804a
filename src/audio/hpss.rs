//! Harmonic-percussive source separation
//!
//! Median-filters the magnitude spectrogram along time (sustained partials) and
//! along frequency (broadband transients), then applies a soft mask to the
//! complex STFT and resynthesizes the harmonic part.

use rustfft::num_complex::Complex;

use super::features::AudioBuffer;
use super::stft::{istft, magnitude, stft};

const N_FFT: usize = 2048;
const HOP: usize = 512;

pub struct HarmonicSeparator {
    kernel: usize,
}

impl HarmonicSeparator {
    pub fn new(kernel: usize) -> Self {
        Self { kernel: kernel.max(1) }
    }

    /// Harmonic component of `audio`, same length and rate.
    pub fn harmonic(&self, audio: &AudioBuffer) -> AudioBuffer {
        let spec = stft(&audio.samples, N_FFT, HOP);
        if spec.is_empty() {
            return audio.clone();
        }

        let mags = magnitude(&spec);
        let harmonic = median_along_time(&mags, self.kernel);
        let percussive = median_along_frequency(&mags, self.kernel);

        let masked: Vec<Vec<Complex<f32>>> = spec
            .iter()
            .enumerate()
            .map(|(t, frame)| {
                frame
                    .iter()
                    .enumerate()
                    .map(|(k, &c)| c * soft_mask(harmonic[t][k], percussive[t][k]))
                    .collect()
            })
            .collect();

        log::debug!(
            "HPSS: {} frames x {} bins, kernel {}",
            spec.len(),
            spec[0].len(),
            self.kernel
        );

        AudioBuffer::new(
            istft(&masked, N_FFT, HOP, audio.samples.len()),
            audio.sample_rate,
        )
    }
}

/// Wiener-style mask with power 2; an all-zero cell splits evenly.
fn soft_mask(target: f32, other: f32) -> f32 {
    let t = target * target;
    let o = other * other;
    let total = t + o;
    if total <= f32::EPSILON {
        0.5
    } else {
        t / total
    }
}

fn median(window: &mut [f32]) -> f32 {
    if window.is_empty() {
        return 0.0;
    }
    let mid = window.len() / 2;
    let (_, m, _) = window.select_nth_unstable_by(mid, |a, b| a.total_cmp(b));
    *m
}

/// Per-bin median over neighbouring frames.
fn median_along_time(mags: &[Vec<f32>], kernel: usize) -> Vec<Vec<f32>> {
    let n_frames = mags.len();
    let n_bins = mags.first().map_or(0, |f| f.len());
    let half = kernel / 2;
    let mut out = vec![vec![0.0f32; n_bins]; n_frames];
    let mut scratch = Vec::with_capacity(kernel);

    for k in 0..n_bins {
        for t in 0..n_frames {
            let start = t.saturating_sub(half);
            let end = (t + half + 1).min(n_frames);
            scratch.clear();
            scratch.extend((start..end).map(|i| mags[i][k]));
            out[t][k] = median(&mut scratch);
        }
    }
    out
}

/// Per-frame median over neighbouring bins.
fn median_along_frequency(mags: &[Vec<f32>], kernel: usize) -> Vec<Vec<f32>> {
    let half = kernel / 2;
    let mut scratch = Vec::with_capacity(kernel);

    mags.iter()
        .map(|frame| {
            let n_bins = frame.len();
            (0..n_bins)
                .map(|k| {
                    let start = k.saturating_sub(half);
                    let end = (k + half + 1).min(n_bins);
                    scratch.clear();
                    scratch.extend_from_slice(&frame[start..end]);
                    median(&mut scratch)
                })
                .collect()
        })
        .collect()
}
