// Musical key estimation by Krumhansl-Schmuckler profile correlation.
//
// 1. Average a chroma vector over the harmonic component of the clip
// 2. Correlate it (Pearson) with the 24 rotated major/minor profiles
// 3. Rank candidates; confidence comes from the margin between the top two
// 4. Report up to three runner-up keys and the relative major/minor
//
// Reference: Krumhansl, C.L. (1990). Cognitive Foundations of Musical Pitch.

use std::fmt;

use super::chroma::extract_chroma;
use super::features::{AudioBuffer, ChromaVector};
use crate::config::AnalysisConfig;

/// Krumhansl-Schmuckler major profile, tonic first
pub const KS_MAJOR: [f64; 12] = [
    6.35, 2.23, 3.48, 2.33, 4.38, 4.09, 2.52, 5.19, 2.39, 3.66, 2.29, 2.88,
];

/// Krumhansl-Schmuckler minor profile, tonic first
pub const KS_MINOR: [f64; 12] = [
    6.33, 2.68, 3.52, 5.38, 2.60, 3.53, 2.54, 4.75, 3.98, 2.69, 3.34, 3.17,
];

pub const NOTE_NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mode {
    Major,
    Minor,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Major => write!(f, "Major"),
            Mode::Minor => write!(f, "Minor"),
        }
    }
}

/// A root pitch class (0 = C .. 11 = B) and mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Key {
    pub root: usize,
    pub mode: Mode,
}

impl Key {
    pub fn new(root: usize, mode: Mode) -> Self {
        Self { root: root % 12, mode }
    }

    /// The key sharing this key's pitch collection in the other mode.
    pub fn relative(&self) -> Key {
        match self.mode {
            Mode::Major => Key::new(self.root + 9, Mode::Minor),
            Mode::Minor => Key::new(self.root + 3, Mode::Major),
        }
    }

    /// Parse "<Root> <Mode>" as produced by `Display`.
    pub fn parse(text: &str) -> Option<Key> {
        let mut parts = text.split_whitespace();
        let root = parts.next()?;
        let mode = match parts.next()? {
            "Major" => Mode::Major,
            "Minor" => Mode::Minor,
            _ => return None,
        };
        if parts.next().is_some() {
            return None;
        }
        let root = NOTE_NAMES.iter().position(|n| *n == root)?;
        Some(Key::new(root, mode))
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", NOTE_NAMES[self.root], self.mode)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KeyCandidate {
    pub key: Key,
    pub score: f64,
}

/// The 24 rotated, sum-normalized reference profiles. Built once and shared read-only.
#[derive(Debug, Clone)]
pub struct KeyProfiles {
    major: [[f64; 12]; 12],
    minor: [[f64; 12]; 12],
}

impl KeyProfiles {
    pub fn krumhansl() -> Self {
        Self::from_profiles(&KS_MAJOR, &KS_MINOR)
    }

    pub fn from_profiles(major: &[f64; 12], minor: &[f64; 12]) -> Self {
        let mut out = Self {
            major: [[0.0; 12]; 12],
            minor: [[0.0; 12]; 12],
        };
        for root in 0..12 {
            out.major[root] = rotate(major, root);
            out.minor[root] = rotate(minor, root);
        }
        out
    }

    pub fn template(&self, key: Key) -> &[f64; 12] {
        match key.mode {
            Mode::Major => &self.major[key.root],
            Mode::Minor => &self.minor[key.root],
        }
    }
}

/// Profile shifted so its tonic lands on `root`, re-normalized to sum 1.
fn rotate(profile: &[f64; 12], root: usize) -> [f64; 12] {
    let total: f64 = profile.iter().sum();
    let mut out = [0.0f64; 12];
    for (i, &w) in profile.iter().enumerate() {
        out[(i + root) % 12] = w / total;
    }
    out
}

/// Pearson correlation; zero variance on either side scores 0 instead of NaN.
pub fn pearson(x: &[f64; 12], y: &[f64; 12]) -> f64 {
    let n = 12.0;
    let mean_x = x.iter().sum::<f64>() / n;
    let mean_y = y.iter().sum::<f64>() / n;

    let mut cov = 0.0;
    let mut var_x = 0.0;
    let mut var_y = 0.0;
    for (a, b) in x.iter().zip(y.iter()) {
        let dx = a - mean_x;
        let dy = b - mean_y;
        cov += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }

    let denom = (var_x * var_y).sqrt();
    if denom < 1e-12 || !denom.is_finite() {
        return 0.0;
    }
    let r = cov / denom;
    if r.is_finite() {
        r
    } else {
        0.0
    }
}

/// Outcome of key estimation for one clip.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyEstimate {
    pub key: String,
    /// 0..=100
    pub confidence: f64,
    pub alternatives: Vec<String>,
    pub relative_key: String,
}

impl KeyEstimate {
    /// Neutral answer used when feature extraction fails.
    pub fn fallback() -> Self {
        Self {
            key: "C Major".to_string(),
            confidence: 0.0,
            alternatives: Vec::new(),
            relative_key: "A Minor".to_string(),
        }
    }
}

pub struct KeyEstimator {
    profiles: KeyProfiles,
    alternative_threshold: f64,
    max_alternatives: usize,
}

impl KeyEstimator {
    pub fn new(profiles: KeyProfiles, config: &AnalysisConfig) -> Self {
        Self {
            profiles,
            alternative_threshold: config.alternative_threshold,
            max_alternatives: config.max_alternatives,
        }
    }

    /// Key of the harmonic component. Never fails; extraction errors yield the fallback.
    pub fn estimate(&self, harmonic: &AudioBuffer) -> KeyEstimate {
        match extract_chroma(harmonic) {
            Ok(chroma) => self.estimate_from_chroma(&chroma),
            Err(err) => {
                log::warn!("Key detection error: {}", err);
                KeyEstimate::fallback()
            }
        }
    }

    /// All 24 candidates, best first. Ties keep C..B order with major before minor.
    pub fn rank(&self, chroma: &ChromaVector) -> Vec<KeyCandidate> {
        let mut candidates = Vec::with_capacity(24);
        for root in 0..12 {
            for mode in [Mode::Major, Mode::Minor] {
                let key = Key::new(root, mode);
                let score = pearson(chroma.bins(), self.profiles.template(key));
                candidates.push(KeyCandidate { key, score });
            }
        }
        candidates.sort_by(|a, b| b.score.total_cmp(&a.score));
        candidates
    }

    pub fn estimate_from_chroma(&self, chroma: &ChromaVector) -> KeyEstimate {
        let ranked = self.rank(chroma);
        let best = ranked[0];
        let second = ranked[1];

        let confidence = margin_confidence(best.score, second.score);

        let alternatives: Vec<String> = ranked[1..]
            .iter()
            .take(self.max_alternatives)
            .filter(|c| c.score > self.alternative_threshold)
            .map(|c| c.key.to_string())
            .collect();

        log::debug!(
            "Key candidates: {} ({:.3}), {} ({:.3}), confidence {:.1}",
            best.key,
            best.score,
            second.key,
            second.score,
            confidence
        );

        KeyEstimate {
            key: best.key.to_string(),
            confidence,
            alternatives,
            relative_key: best.key.relative().to_string(),
        }
    }
}

/// 50 for a tie, rising with the gap between the top two scores, clamped to 0..=100.
pub fn margin_confidence(best: f64, second: f64) -> f64 {
    let best = best.max(0.0);
    let second = second.max(0.0);
    ((best - second) * 100.0 + 50.0).clamp(0.0, 100.0)
}
