use thiserror::Error;

use super::features::AudioBuffer;
use super::stft::{magnitude, stft};
use crate::config::AnalysisConfig;

const FFT_SIZE: usize = 2048;
const HOP_SIZE: usize = 512;

/// Search range for the periodicity estimate, before octave correction.
const SEARCH_MIN_BPM: f32 = 30.0;
const SEARCH_MAX_BPM: f32 = 320.0;

/// Log-normal tempo prior: centre and spread in octaves.
const PRIOR_BPM: f32 = 120.0;
const PRIOR_STD_OCTAVES: f32 = 1.0;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum TempoError {
    #[error("onset envelope too short ({0} frames)")]
    TooShort(usize),
    #[error("no onset energy")]
    NoOnsets,
    #[error("non-finite tempo estimate")]
    NonFinite,
}

pub struct TempoEstimator {
    default_bpm: u32,
    min_bpm: f32,
    max_bpm: f32,
    onset_validation: bool,
}

impl TempoEstimator {
    pub fn new(config: &AnalysisConfig) -> Self {
        Self {
            default_bpm: config.default_bpm,
            min_bpm: config.min_bpm,
            max_bpm: config.max_bpm,
            onset_validation: config.onset_validation,
        }
    }

    /// Integer BPM for the full (unseparated) buffer. Never fails; falls back
    /// to the default tempo when no periodicity can be found.
    pub fn estimate(&self, audio: &AudioBuffer) -> u32 {
        match self.try_estimate(audio) {
            Ok(bpm) => bpm,
            Err(err) => {
                log::warn!("Tempo detection failed ({}), using {} BPM", err, self.default_bpm);
                self.default_bpm
            }
        }
    }

    fn try_estimate(&self, audio: &AudioBuffer) -> Result<u32, TempoError> {
        let envelope = smooth(&onset_envelope(&audio.samples));
        let frame_rate = audio.sample_rate as f32 / HOP_SIZE as f32;

        let mut tempo = periodicity_tempo(&envelope, frame_rate)?;
        log::debug!("Raw periodicity tempo: {:.2} BPM", tempo);

        if self.onset_validation {
            let onset_times = detect_onsets(&envelope, frame_rate);
            if let Some(onset_tempo) = interval_tempo(&onset_times) {
                if onset_tempo >= self.min_bpm
                    && onset_tempo <= self.max_bpm
                    && (tempo - onset_tempo).abs() < 20.0
                {
                    log::debug!("Onset intervals agree ({:.2} BPM), averaging", onset_tempo);
                    tempo = (tempo + onset_tempo) / 2.0;
                }
            }
        }

        let corrected = correct_octave(tempo, self.min_bpm, self.max_bpm);
        if !corrected.is_finite() || corrected <= 0.0 {
            return Err(TempoError::NonFinite);
        }
        Ok(corrected.round() as u32)
    }
}

/// Fold a double/half-time estimate back toward `[min_bpm, max_bpm]`.
pub fn correct_octave(bpm: f32, min_bpm: f32, max_bpm: f32) -> f32 {
    if bpm > max_bpm {
        bpm / 2.0
    } else if bpm < min_bpm {
        bpm * 2.0
    } else {
        bpm
    }
}

/// Positive spectral flux of log-compressed magnitudes, one value per hop.
fn onset_envelope(samples: &[f32]) -> Vec<f32> {
    let mags = magnitude(&stft(samples, FFT_SIZE, HOP_SIZE));
    if mags.is_empty() {
        return Vec::new();
    }

    let log_mags: Vec<Vec<f32>> = mags
        .iter()
        .map(|frame| frame.iter().map(|&m| (1.0 + 100.0 * m).ln()).collect())
        .collect();

    let n_bins = log_mags[0].len() as f32;
    let mut flux_values = vec![0.0f32; log_mags.len()];
    for i in 1..log_mags.len() {
        let flux: f32 = log_mags[i]
            .iter()
            .zip(log_mags[i - 1].iter())
            .map(|(cur, prev)| (cur - prev).max(0.0))
            .sum();
        flux_values[i] = flux / n_bins;
    }
    flux_values
}

/// Triangular smoothing so a beat period that falls between two lags still
/// produces a single autocorrelation peak.
fn smooth(envelope: &[f32]) -> Vec<f32> {
    const KERNEL: [f32; 5] = [1.0, 2.0, 3.0, 2.0, 1.0];
    let norm: f32 = KERNEL.iter().sum();
    let half = KERNEL.len() / 2;
    (0..envelope.len())
        .map(|i| {
            KERNEL
                .iter()
                .enumerate()
                .filter_map(|(k, w)| {
                    let idx = (i + k).checked_sub(half)?;
                    envelope.get(idx).map(|v| v * w)
                })
                .sum::<f32>()
                / norm
        })
        .collect()
}

/// Tempo of the strongest envelope periodicity, weighted by the tempo prior.
fn periodicity_tempo(envelope: &[f32], frame_rate: f32) -> Result<f32, TempoError> {
    let min_lag = (60.0 * frame_rate / SEARCH_MAX_BPM).floor().max(1.0) as usize;
    let max_lag = (60.0 * frame_rate / SEARCH_MIN_BPM).ceil() as usize;

    if envelope.len() < 2 * min_lag + 2 {
        return Err(TempoError::TooShort(envelope.len()));
    }
    let max_lag = max_lag.min(envelope.len() - 2);

    let mean = envelope.iter().sum::<f32>() / envelope.len() as f32;
    let centered: Vec<f32> = envelope.iter().map(|v| v - mean).collect();
    let energy: f32 = centered.iter().map(|v| v * v).sum();
    if energy <= 1e-10 {
        return Err(TempoError::NoOnsets);
    }

    // one slot either side of the search range for interpolation
    let scores: Vec<f32> = (min_lag - 1..=max_lag + 1)
        .map(|lag| {
            if lag == 0 || lag >= centered.len() {
                return 0.0;
            }
            let ac: f32 = centered[..centered.len() - lag]
                .iter()
                .zip(centered[lag..].iter())
                .map(|(a, b)| a * b)
                .sum::<f32>()
                / energy;
            let bpm = 60.0 * frame_rate / lag as f32;
            ac.max(0.0) * tempo_prior(bpm)
        })
        .collect();

    let (best, best_score) = scores[1..scores.len() - 1]
        .iter()
        .enumerate()
        .map(|(i, &s)| (i + 1, s))
        .fold((1, f32::MIN), |acc, cur| if cur.1 > acc.1 { cur } else { acc });

    if best_score <= 0.0 {
        return Err(TempoError::NoOnsets);
    }

    let (l, c, r) = (scores[best - 1], scores[best], scores[best + 1]);
    let denom = l - 2.0 * c + r;
    let offset = if denom.abs() > 1e-12 {
        (0.5 * (l - r) / denom).clamp(-0.5, 0.5)
    } else {
        0.0
    };

    let lag = (min_lag - 1 + best) as f32 + offset;
    let bpm = 60.0 * frame_rate / lag;
    if !bpm.is_finite() {
        return Err(TempoError::NonFinite);
    }
    Ok(bpm)
}

fn tempo_prior(bpm: f32) -> f32 {
    let octaves = (bpm / PRIOR_BPM).log2() / PRIOR_STD_OCTAVES;
    (-0.5 * octaves * octaves).exp()
}

/// Onset times (seconds) picked from the envelope with an adaptive threshold.
fn detect_onsets(envelope: &[f32], frame_rate: f32) -> Vec<f32> {
    if envelope.is_empty() {
        return Vec::new();
    }

    let window = 20;
    let mut onset_times: Vec<f32> = Vec::new();

    for i in 0..envelope.len() {
        let start = i.saturating_sub(window);
        let end = (i + window + 1).min(envelope.len());
        let local_mean: f32 = envelope[start..end].iter().sum::<f32>() / (end - start) as f32;

        let threshold = local_mean * 1.5 + 0.01;

        if envelope[i] > threshold {
            let is_peak = (i == 0 || envelope[i] >= envelope[i - 1])
                && (i == envelope.len() - 1 || envelope[i] >= envelope[i + 1]);

            let time = i as f32 / frame_rate;
            // Minimum gap between onsets (100ms)
            let far_enough = onset_times.last().map_or(true, |&last| time - last > 0.1);

            if is_peak && far_enough {
                onset_times.push(time);
            }
        }
    }

    onset_times
}

/// Tempo implied by the median inter-onset interval.
fn interval_tempo(onset_times: &[f32]) -> Option<f32> {
    if onset_times.len() < 2 {
        return None;
    }

    let mut intervals: Vec<f32> = onset_times.windows(2).map(|w| w[1] - w[0]).collect();
    intervals.sort_by(|a, b| a.total_cmp(b));
    let median_interval = intervals[intervals.len() / 2];

    if median_interval > 0.0 {
        Some(60.0 / median_interval)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::test_signals::{generate_chord, generate_click_track, generate_tone, mix};

    fn estimator() -> TempoEstimator {
        TempoEstimator::new(&AnalysisConfig::default())
    }

    #[test]
    fn test_octave_correction() {
        assert_eq!(correct_octave(240.0, 60.0, 200.0), 120.0);
        assert_eq!(correct_octave(40.0, 60.0, 200.0), 80.0);
        assert_eq!(correct_octave(60.0, 60.0, 200.0), 60.0);
        assert_eq!(correct_octave(200.0, 60.0, 200.0), 200.0);
        assert_eq!(correct_octave(133.4, 60.0, 200.0), 133.4);
    }

    #[test]
    fn test_click_track_120bpm() {
        let audio = AudioBuffer::new(generate_click_track(120.0, 22050, 10.0, 0.8), 22050);
        let bpm = estimator().estimate(&audio);
        assert!((bpm as i32 - 120).abs() <= 5, "Expected BPM ~120, got {}", bpm);
    }

    #[test]
    fn test_click_track_140bpm() {
        let audio = AudioBuffer::new(generate_click_track(140.0, 22050, 10.0, 0.8), 22050);
        let bpm = estimator().estimate(&audio);
        assert!((bpm as i32 - 140).abs() <= 5, "Expected BPM ~140, got {}", bpm);
    }

    #[test]
    fn test_clicks_over_sustained_chord() {
        let chord = generate_chord(&[220.0, 261.63, 329.63], 22050, 6.0, 0.4);
        let clicks = generate_click_track(120.0, 22050, 6.0, 0.8);
        let audio = AudioBuffer::new(mix(&chord, &clicks), 22050);
        let bpm = estimator().estimate(&audio);
        assert!((bpm as i32 - 120).abs() <= 5, "Expected BPM ~120, got {}", bpm);
    }

    #[test]
    fn test_silence_falls_back_to_default() {
        let audio = AudioBuffer::new(vec![0.0; 22050 * 5], 22050);
        assert_eq!(estimator().estimate(&audio), 120);
    }

    #[test]
    fn test_steady_tone_stays_in_range() {
        // no real onsets, so whatever periodicity wins is folded into range
        let audio = AudioBuffer::new(generate_tone(440.0, 22050, 5.0, 0.5), 22050);
        let bpm = estimator().estimate(&audio);
        assert!(bpm >= 60 && bpm <= 200, "got {}", bpm);
    }

    #[test]
    fn test_tiny_buffer_falls_back_to_default() {
        let audio = AudioBuffer::new(vec![0.3; 1000], 22050);
        assert_eq!(estimator().estimate(&audio), 120);
    }

    #[test]
    fn test_onset_validation_keeps_estimate_in_range() {
        let config = AnalysisConfig {
            onset_validation: true,
            ..AnalysisConfig::default()
        };
        let audio = AudioBuffer::new(generate_click_track(120.0, 22050, 10.0, 0.8), 22050);
        let bpm = TempoEstimator::new(&config).estimate(&audio);
        assert!((bpm as i32 - 120).abs() <= 5, "Expected BPM ~120, got {}", bpm);
    }

    #[test]
    fn test_interval_tempo_median() {
        let times = [0.0, 0.5, 1.0, 1.5, 2.0, 2.6];
        assert_eq!(interval_tempo(&times), Some(120.0));
        assert_eq!(interval_tempo(&[1.0]), None);
    }

    #[test]
    fn test_smooth_preserves_mass_away_from_edges() {
        let mut env = vec![0.0f32; 11];
        env[5] = 9.0;
        let smoothed = smooth(&env);
        assert_eq!(smoothed[5], 3.0);
        assert_eq!(smoothed[3], 1.0);
        assert!((smoothed.iter().sum::<f32>() - 9.0).abs() < 1e-5);
    }

    #[test]
    fn test_prior_peaks_at_120() {
        assert!((tempo_prior(120.0) - 1.0).abs() < 1e-6);
        assert!(tempo_prior(60.0) < tempo_prior(100.0));
        assert!((tempo_prior(60.0) - tempo_prior(240.0)).abs() < 1e-5);
    }

    #[test]
    fn test_error_messages() {
        assert_eq!(TempoError::TooShort(3).to_string(), "onset envelope too short (3 frames)");
        assert_eq!(TempoError::NoOnsets.to_string(), "no onset energy");
        let err: &dyn std::error::Error = &TempoError::NonFinite;
        assert_eq!(err.to_string(), "non-finite tempo estimate");
    }
}
