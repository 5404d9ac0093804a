/// Mono PCM at a known sample rate.
#[derive(Clone, Debug)]
pub struct AudioBuffer {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl AudioBuffer {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self { samples, sample_rate }
    }

    pub fn duration_secs(&self) -> f32 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f32 / self.sample_rate as f32
    }

    pub fn peak(&self) -> f32 {
        self.samples.iter().map(|s| s.abs()).fold(0.0f32, f32::max)
    }
}

/// Energy per pitch class (C..B), summing to 1 unless the input was silent.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ChromaVector(pub [f64; 12]);

impl ChromaVector {
    /// Normalize raw pitch-class energies to sum 1; the epsilon keeps silence at zero.
    pub fn from_energies(energies: [f64; 12]) -> Self {
        let total: f64 = energies.iter().sum::<f64>() + 1e-8;
        let mut bins = [0.0f64; 12];
        for (out, e) in bins.iter_mut().zip(energies.iter()) {
            *out = e.max(0.0) / total;
        }
        Self(bins)
    }

    pub fn bins(&self) -> &[f64; 12] {
        &self.0
    }

    /// Index of the strongest pitch class.
    #[cfg(test)]
    pub fn dominant(&self) -> usize {
        let mut best = 0;
        for (i, &v) in self.0.iter().enumerate() {
            if v > self.0[best] {
                best = i;
            }
        }
        best
    }
}
