//! Short-time Fourier transform over `rustfft`.
//!
//! Frames are centered: frame `t` covers `[t * hop - n_fft / 2, t * hop + n_fft / 2)`
//! with reflect padding at the edges, so frame times line up with `t * hop`.

use rustfft::{num_complex::Complex, FftPlanner};

pub type Spectrogram = Vec<Vec<Complex<f32>>>;

pub fn hann_window(size: usize) -> Vec<f32> {
    if size < 2 {
        return vec![1.0; size];
    }
    (0..size)
        .map(|i| 0.5 * (1.0 - (2.0 * std::f32::consts::PI * i as f32 / size as f32).cos()))
        .collect()
}

fn reflect_pad(samples: &[f32], pad: usize) -> Vec<f32> {
    let n = samples.len();
    let mut padded = Vec::with_capacity(n + 2 * pad);
    let reflect = |idx: isize| -> f32 {
        if n == 1 {
            return samples[0];
        }
        let period = 2 * (n as isize - 1);
        let mut i = idx.rem_euclid(period);
        if i >= n as isize {
            i = period - i;
        }
        samples[i as usize]
    };
    for i in 0..(n + 2 * pad) {
        padded.push(reflect(i as isize - pad as isize));
    }
    padded
}

/// Number of centered frames for a signal of `len` samples.
pub fn frame_count(len: usize, hop: usize) -> usize {
    if len == 0 {
        0
    } else {
        len / hop + 1
    }
}

/// Forward STFT. Returns one `n_fft / 2 + 1` bin vector per frame; empty input yields no frames.
pub fn stft(samples: &[f32], n_fft: usize, hop: usize) -> Spectrogram {
    if samples.is_empty() {
        return Vec::new();
    }

    let window = hann_window(n_fft);
    let padded = reflect_pad(samples, n_fft / 2);
    let n_frames = frame_count(samples.len(), hop);
    let n_bins = n_fft / 2 + 1;

    let mut planner = FftPlanner::<f32>::new();
    let fft = planner.plan_fft_forward(n_fft);

    let mut frames = Vec::with_capacity(n_frames);
    let mut buffer = vec![Complex::new(0.0f32, 0.0); n_fft];
    for t in 0..n_frames {
        let start = t * hop;
        for (i, slot) in buffer.iter_mut().enumerate() {
            let s = padded.get(start + i).copied().unwrap_or(0.0);
            *slot = Complex::new(s * window[i], 0.0);
        }
        fft.process(&mut buffer);
        frames.push(buffer[..n_bins].to_vec());
    }
    frames
}

/// Inverse STFT by weighted overlap-add, returning exactly `length` samples.
pub fn istft(spec: &Spectrogram, n_fft: usize, hop: usize, length: usize) -> Vec<f32> {
    let window = hann_window(n_fft);
    let pad = n_fft / 2;
    let total = (spec.len().saturating_sub(1)) * hop + n_fft;
    let mut output = vec![0.0f32; total.max(length + 2 * pad)];
    let mut norm = vec![0.0f32; output.len()];

    let mut planner = FftPlanner::<f32>::new();
    let ifft = planner.plan_fft_inverse(n_fft);
    let mut buffer = vec![Complex::new(0.0f32, 0.0); n_fft];
    let scale = 1.0 / n_fft as f32;

    for (t, frame) in spec.iter().enumerate() {
        // rebuild the conjugate-symmetric upper half
        for (k, slot) in buffer.iter_mut().enumerate() {
            *slot = if k < frame.len() {
                frame[k]
            } else {
                frame[n_fft - k].conj()
            };
        }
        ifft.process(&mut buffer);

        let start = t * hop;
        for i in 0..n_fft {
            let w = window[i];
            output[start + i] += buffer[i].re * scale * w;
            norm[start + i] += w * w;
        }
    }

    (0..length)
        .map(|i| {
            let idx = i + pad;
            if norm[idx] > 1e-8 {
                output[idx] / norm[idx]
            } else {
                0.0
            }
        })
        .collect()
}

/// Magnitude of each bin.
pub fn magnitude(spec: &Spectrogram) -> Vec<Vec<f32>> {
    spec.iter()
        .map(|frame| frame.iter().map(|c| c.norm()).collect())
        .collect()
}
