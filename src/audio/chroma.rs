//! Chroma extraction
//!
//! Approximates a constant-Q chromagram: STFT power is pooled into bands one
//! semitone wide (so every band has the same Q), each band is turned back into
//! an amplitude, and the bands are folded onto the 12 pitch classes.

use super::features::{AudioBuffer, ChromaVector};
use super::stft::stft;
use crate::error::AnalysisError;

/// 8192 points at 22.05 kHz resolves ~2.7 Hz, under a semitone from C2 upward.
const FFT_SIZE: usize = 8192;
const HOP_SIZE: usize = 2048;

/// MIDI range of the filterbank: C2 (65.4 Hz) to C7 (2093 Hz).
const MIN_MIDI: i32 = 36;
const MAX_MIDI: i32 = 96;

fn midi_to_hz(midi: f64) -> f64 {
    440.0 * 2f64.powf((midi - 69.0) / 12.0)
}

/// Semitone band (MIDI number) each FFT bin falls into, if inside the filterbank.
fn band_map(sample_rate: u32) -> Vec<Option<usize>> {
    let lo = midi_to_hz(MIN_MIDI as f64 - 0.5);
    let hi = midi_to_hz(MAX_MIDI as f64 + 0.5);
    (0..FFT_SIZE / 2 + 1)
        .map(|bin| {
            let freq = bin as f64 * sample_rate as f64 / FFT_SIZE as f64;
            if freq < lo || freq >= hi {
                return None;
            }
            let midi = (69.0 + 12.0 * (freq / 440.0).log2()).round() as i32;
            Some((midi.clamp(MIN_MIDI, MAX_MIDI) - MIN_MIDI) as usize)
        })
        .collect()
}

/// Frame-averaged chroma of `audio`.
pub fn extract_chroma(audio: &AudioBuffer) -> Result<ChromaVector, AnalysisError> {
    if audio.samples.is_empty() {
        return Err(AnalysisError::AnalysisFailure("no samples for chroma extraction".to_string()));
    }
    if audio.sample_rate == 0 {
        return Err(AnalysisError::AnalysisFailure("invalid sample rate".to_string()));
    }

    let bands = band_map(audio.sample_rate);
    let n_bands = (MAX_MIDI - MIN_MIDI + 1) as usize;
    let spec = stft(&audio.samples, FFT_SIZE, HOP_SIZE);

    let mut accumulated = [0.0f64; 12];
    for frame in &spec {
        let mut band_power = vec![0.0f64; n_bands];
        for (bin, band) in bands.iter().enumerate() {
            if let Some(band) = band {
                band_power[*band] += frame[bin].norm_sqr() as f64;
            }
        }

        let mut frame_chroma = [0.0f64; 12];
        for (band, power) in band_power.iter().enumerate() {
            let pitch_class = (MIN_MIDI as usize + band) % 12;
            frame_chroma[pitch_class] += power.sqrt();
        }

        // per-frame max normalization; silent frames contribute nothing
        let peak = frame_chroma.iter().copied().fold(0.0f64, f64::max);
        if peak > 1e-10 {
            for (acc, v) in accumulated.iter_mut().zip(frame_chroma.iter()) {
                *acc += v / peak;
            }
        }
    }

    if spec.is_empty() {
        return Err(AnalysisError::AnalysisFailure("no analysis frames".to_string()));
    }
    let n_frames = spec.len() as f64;
    for v in accumulated.iter_mut() {
        *v /= n_frames;
    }

    if accumulated.iter().any(|v| !v.is_finite()) {
        return Err(AnalysisError::AnalysisFailure("non-finite chroma energy".to_string()));
    }

    log::debug!("Chroma from {} frames: {:?}", spec.len(), accumulated);
    Ok(ChromaVector::from_energies(accumulated))
}
