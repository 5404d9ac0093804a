//! Synthetic signals shared by the unit tests.

use std::f32::consts::PI;
use std::io::Cursor;

/// Pure sine tone.
pub fn generate_tone(frequency: f32, sample_rate: u32, duration_seconds: f32, amplitude: f32) -> Vec<f32> {
    let total_samples = (sample_rate as f32 * duration_seconds) as usize;
    (0..total_samples)
        .map(|i| {
            let t = i as f32 / sample_rate as f32;
            amplitude * (2.0 * PI * frequency * t).sin()
        })
        .collect()
}

/// Equal-amplitude sum of sines, scaled so the peak stays at or below `amplitude`.
pub fn generate_chord(frequencies: &[f32], sample_rate: u32, duration_seconds: f32, amplitude: f32) -> Vec<f32> {
    let total_samples = (sample_rate as f32 * duration_seconds) as usize;
    let n = frequencies.len().max(1) as f32;
    (0..total_samples)
        .map(|i| {
            let t = i as f32 / sample_rate as f32;
            let sum: f32 = frequencies.iter().map(|&f| (2.0 * PI * f * t).sin()).sum();
            amplitude * sum / n
        })
        .collect()
}

/// Short decaying 1 kHz clicks at a fixed tempo.
pub fn generate_click_track(bpm: f32, sample_rate: u32, duration_seconds: f32, amplitude: f32) -> Vec<f32> {
    let total_samples = (sample_rate as f32 * duration_seconds) as usize;
    let mut samples = vec![0.0f32; total_samples];
    let samples_per_beat = 60.0 / bpm * sample_rate as f32;
    let click_duration = (sample_rate as f32 * 0.005) as usize;

    let mut position = 0.0f32;
    while (position as usize) < total_samples {
        let start = position as usize;
        for j in 0..click_duration {
            let idx = start + j;
            if idx < total_samples {
                let t = j as f32 / sample_rate as f32;
                samples[idx] = amplitude * (2.0 * PI * 1000.0 * t).sin() * (-t * 500.0).exp();
            }
        }
        position += samples_per_beat;
    }
    samples
}

/// Element-wise sum, truncated to the shorter input.
pub fn mix(a: &[f32], b: &[f32]) -> Vec<f32> {
    a.iter().zip(b.iter()).map(|(x, y)| x + y).collect()
}

pub fn wav_bytes(samples: &[f32], sample_rate: u32) -> Vec<u8> {
    encode_wav(&[samples], sample_rate)
}

pub fn wav_bytes_stereo(left: &[f32], right: &[f32], sample_rate: u32) -> Vec<u8> {
    encode_wav(&[left, right], sample_rate)
}

fn encode_wav(channels: &[&[f32]], sample_rate: u32) -> Vec<u8> {
    let spec = hound::WavSpec {
        channels: channels.len() as u16,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let frames = channels.iter().map(|c| c.len()).min().unwrap_or(0);
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
        for i in 0..frames {
            for channel in channels {
                let s = (channel[i].clamp(-1.0, 1.0) * 32767.0).round() as i16;
                writer.write_sample(s).unwrap();
            }
        }
        writer.finalize().unwrap();
    }
    cursor.into_inner()
}
