use anyhow::{Context, Result};

use super::features::AudioBuffer;
use crate::config::AnalysisConfig;
use crate::error::AnalysisError;

const TRIM_FRAME: usize = 2048;
const TRIM_HOP: usize = 512;

/// Turns decoded PCM into the buffer every later stage reads: fixed rate,
/// silence trimmed from both ends, long enough and loud enough to analyze.
pub struct Preprocessor {
    sample_rate: u32,
    min_duration_secs: f32,
    trim_top_db: f32,
    silence_peak: f32,
}

impl Preprocessor {
    pub fn new(config: &AnalysisConfig) -> Self {
        Self {
            sample_rate: config.sample_rate,
            min_duration_secs: config.min_duration_secs,
            trim_top_db: config.trim_top_db,
            silence_peak: config.silence_peak,
        }
    }

    pub fn process(&self, audio: AudioBuffer) -> Result<AudioBuffer, AnalysisError> {
        if audio.sample_rate == 0 {
            return Err(AnalysisError::Decode("invalid sample rate 0".to_string()));
        }

        let samples = if audio.sample_rate == self.sample_rate || audio.samples.is_empty() {
            audio.samples
        } else {
            resample(&audio.samples, audio.sample_rate, self.sample_rate)
                .map_err(|e| AnalysisError::AnalysisFailure(format!("{:#}", e)))?
        };

        let (start, end) = trim_bounds(&samples, self.trim_top_db);
        let trimmed = AudioBuffer::new(samples[start..end].to_vec(), self.sample_rate);

        log::debug!(
            "Preprocessed: {} samples at {}Hz ({:.2}s), trimmed [{}..{}]",
            trimmed.samples.len(),
            self.sample_rate,
            trimmed.duration_secs(),
            start,
            end
        );

        let duration_secs = trimmed.duration_secs();
        if duration_secs < self.min_duration_secs {
            return Err(AnalysisError::TooShort { duration_secs });
        }

        let peak = trimmed.peak();
        if peak < self.silence_peak {
            return Err(AnalysisError::Silent { peak });
        }

        Ok(trimmed)
    }
}

/// Resample mono f32 audio from `from_rate` to `to_rate` using rubato.
fn resample(samples: &[f32], from_rate: u32, to_rate: u32) -> Result<Vec<f32>> {
    use rubato::{Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction};

    let params = SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };

    let ratio = to_rate as f64 / from_rate as f64;
    let mut resampler = SincFixedIn::<f32>::new(
        ratio,
        2.0,
        params,
        samples.len(),
        1,
    )
    .context("Failed to create resampler")?;

    let input = vec![samples.to_vec()];
    let output = resampler
        .process(&input, None)
        .context("Resampling failed")?;

    Ok(output.into_iter().next().unwrap_or_default())
}

/// Sample range left after dropping frames more than `top_db` below the
/// loudest frame. Frames are centered on multiples of the hop.
/// A buffer with no energy at all is returned whole.
fn trim_bounds(samples: &[f32], top_db: f32) -> (usize, usize) {
    if samples.is_empty() {
        return (0, 0);
    }

    let n_frames = samples.len() / TRIM_HOP + 1;
    let half = TRIM_FRAME / 2;
    let power: Vec<f32> = (0..n_frames)
        .map(|i| {
            let center = i * TRIM_HOP;
            let start = center.saturating_sub(half);
            let end = (center + half).min(samples.len());
            if start >= end {
                return 0.0;
            }
            // zero padding beyond the edges counts toward the frame length
            samples[start..end].iter().map(|s| s * s).sum::<f32>() / TRIM_FRAME as f32
        })
        .collect();

    let max_power = power.iter().copied().fold(0.0f32, f32::max);
    if max_power <= 0.0 {
        return (0, samples.len());
    }

    let threshold = max_power * 10f32.powf(-top_db / 10.0);
    let first = power.iter().position(|&p| p > threshold);
    let last = power.iter().rposition(|&p| p > threshold);

    match (first, last) {
        (Some(first), Some(last)) => {
            let start = first * TRIM_HOP;
            let end = ((last + 1) * TRIM_HOP).min(samples.len());
            (start.min(end), end)
        }
        _ => (0, samples.len()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::test_signals::generate_tone;

    fn preprocessor() -> Preprocessor {
        Preprocessor::new(&AnalysisConfig::default())
    }

    #[test]
    fn test_short_clip_is_too_short() {
        let tone = generate_tone(440.0, 22050, 1.5, 0.5);
        let err = preprocessor().process(AudioBuffer::new(tone, 22050)).unwrap_err();
        assert!(matches!(err, AnalysisError::TooShort { .. }), "got {:?}", err);
    }

    #[test]
    fn test_short_silence_is_too_short() {
        let err = preprocessor()
            .process(AudioBuffer::new(vec![0.0; 22050], 22050))
            .unwrap_err();
        assert!(matches!(err, AnalysisError::TooShort { .. }));
    }

    #[test]
    fn test_all_zero_is_silent() {
        let err = preprocessor()
            .process(AudioBuffer::new(vec![0.0; 22050 * 5], 22050))
            .unwrap_err();
        assert!(matches!(err, AnalysisError::Silent { .. }), "got {:?}", err);
    }

    #[test]
    fn test_trims_leading_and_trailing_silence() {
        let mut samples = vec![0.0f32; 22050];
        samples.extend(generate_tone(440.0, 22050, 3.0, 0.5));
        samples.extend(vec![0.0f32; 22050]);

        let out = preprocessor().process(AudioBuffer::new(samples, 22050)).unwrap();
        let duration = out.duration_secs();
        assert!(duration > 2.9 && duration < 3.2, "trimmed duration {:.3}", duration);
    }

    #[test]
    fn test_trimming_can_make_clip_too_short() {
        // 5 seconds total but only 1 second of content
        let mut samples = vec![0.0f32; 22050 * 2];
        samples.extend(generate_tone(440.0, 22050, 1.0, 0.5));
        samples.extend(vec![0.0f32; 22050 * 2]);

        let err = preprocessor().process(AudioBuffer::new(samples, 22050)).unwrap_err();
        assert!(matches!(err, AnalysisError::TooShort { .. }));
    }

    #[test]
    fn test_resamples_to_fixed_rate() {
        let tone = generate_tone(440.0, 44100, 3.0, 0.5);
        let out = preprocessor().process(AudioBuffer::new(tone, 44100)).unwrap();
        assert_eq!(out.sample_rate, 22050);
        let expected = 22050.0 * 3.0;
        let len = out.samples.len() as f32;
        assert!((len - expected).abs() / expected < 0.05, "got {} samples", len);
    }

    #[test]
    fn test_trim_bounds_keeps_silent_buffer() {
        assert_eq!(trim_bounds(&[0.0; 4096], 20.0), (0, 4096));
        assert_eq!(trim_bounds(&[], 20.0), (0, 0));
    }
}
