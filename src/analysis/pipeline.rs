use chrono::Local;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use super::chords::ChordTable;
use super::result::{AnalysisResult, SongMetadata, Status};
use crate::audio::decode::decode_bytes;
use crate::audio::features::AudioBuffer;
use crate::audio::hpss::HarmonicSeparator;
use crate::audio::key::{KeyEstimator, KeyProfiles};
use crate::audio::preprocess::Preprocessor;
use crate::audio::tempo::TempoEstimator;
use crate::config::AnalysisConfig;
use crate::error::AnalysisError;
use crate::services::identify::{NoIdentifier, SongIdentifier};
use crate::services::run_bounded;
use crate::services::store::{AnalysisStore, NoStore};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Decode, measure, identify and record one clip at a time.
///
/// Shared read-only between worker threads; every call is independent.
pub struct AnalysisPipeline {
    preprocessor: Preprocessor,
    tempo: TempoEstimator,
    separator: HarmonicSeparator,
    keys: KeyEstimator,
    chords: Arc<ChordTable>,
    identifier: Arc<dyn SongIdentifier>,
    store: Arc<dyn AnalysisStore>,
    identify_timeout: Duration,
    store_timeout: Duration,
}

impl AnalysisPipeline {
    /// Pipeline without identification or history.
    pub fn new(config: &AnalysisConfig, chords: Arc<ChordTable>) -> Self {
        Self {
            preprocessor: Preprocessor::new(config),
            tempo: TempoEstimator::new(config),
            separator: HarmonicSeparator::new(config.hpss_kernel),
            keys: KeyEstimator::new(KeyProfiles::krumhansl(), config),
            chords,
            identifier: Arc::new(NoIdentifier),
            store: Arc::new(NoStore),
            identify_timeout: DEFAULT_TIMEOUT,
            store_timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_identifier(mut self, identifier: Arc<dyn SongIdentifier>, timeout: Duration) -> Self {
        self.identifier = identifier;
        self.identify_timeout = timeout;
        self
    }

    pub fn with_store(mut self, store: Arc<dyn AnalysisStore>, timeout: Duration) -> Self {
        self.store = store;
        self.store_timeout = timeout;
        self
    }

    /// Full analysis of an encoded clip (WAV, MP3, FLAC, OGG, AAC).
    pub fn analyze(&self, raw: &[u8]) -> Result<AnalysisResult, AnalysisError> {
        let decoded = contain(|| decode_bytes(raw), AnalysisError::Decode)?;
        log::debug!(
            "Decoded {} samples at {} Hz",
            decoded.samples.len(),
            decoded.sample_rate
        );

        let mut result = contain(|| self.measure(decoded), AnalysisError::AnalysisFailure)?;

        match self.identify(raw) {
            Some(song) => {
                log::info!(
                    "Identified: {} - {}",
                    song.artist.as_deref().unwrap_or("?"),
                    song.title.as_deref().unwrap_or("?")
                );
                result.status = Status::Recognized;
                result.song = Some(song);
            }
            None => log::debug!("Song not identified"),
        }

        self.save(&result);
        Ok(result)
    }

    /// Analysis of PCM already in memory. Skips identification.
    #[cfg(test)]
    pub fn analyze_samples(&self, samples: Vec<f32>, sample_rate: u32) -> Result<AnalysisResult, AnalysisError> {
        let audio = AudioBuffer::new(samples, sample_rate);
        let result = contain(|| self.measure(audio), AnalysisError::AnalysisFailure)?;
        self.save(&result);
        Ok(result)
    }

    /// Key, tempo and chords of a decoded clip.
    fn measure(&self, decoded: AudioBuffer) -> Result<AnalysisResult, AnalysisError> {
        let audio = self.preprocessor.process(decoded)?;
        log::debug!("Analyzing {:.2}s at {} Hz", audio.duration_secs(), audio.sample_rate);

        let bpm = self.tempo.estimate(&audio);
        let harmonic = self.separator.harmonic(&audio);
        let estimate = self.keys.estimate(&harmonic);

        log::info!(
            "Key: {} ({:.1}%), tempo: {} BPM",
            estimate.key,
            estimate.confidence,
            bpm
        );

        Ok(AnalysisResult {
            chord_progressions: self.chords.progressions(&estimate.key).to_vec(),
            key: estimate.key,
            key_confidence: (estimate.confidence * 10.0).round() / 10.0,
            bpm,
            alternative_keys: estimate.alternatives,
            relative_key: estimate.relative_key,
            status: Status::NotRecognized,
            song: None,
            analysis_timestamp: Local::now(),
        })
    }

    fn identify(&self, raw: &[u8]) -> Option<SongMetadata> {
        let identifier = Arc::clone(&self.identifier);
        let bytes = raw.to_vec();
        match run_bounded("identify", self.identify_timeout, move || identifier.identify(&bytes))? {
            Ok(song) => song,
            Err(err) => {
                log::warn!("Song identification failed: {:#}", err);
                None
            }
        }
    }

    /// Waits at most `store_timeout` for the store; a slower save keeps
    /// running on its helper thread and its outcome is dropped.
    fn save(&self, result: &AnalysisResult) {
        if result.key.is_empty() || result.bpm == 0 {
            return;
        }
        let store = Arc::clone(&self.store);
        let record = result.clone();
        if let Some(Err(err)) = run_bounded("store", self.store_timeout, move || store.save(&record)) {
            log::error!("Failed to save analysis: {:#}", err);
        }
    }
}

/// Run one stage, turning a panic inside it into `on_panic(message)`.
/// Malformed containers can panic inside the decoder rather than erroring.
fn contain<T>(
    stage: impl FnOnce() -> Result<T, AnalysisError>,
    on_panic: fn(String) -> AnalysisError,
) -> Result<T, AnalysisError> {
    panic::catch_unwind(AssertUnwindSafe(stage)).unwrap_or_else(|payload| {
        let reason = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string());
        log::error!("Analysis stage panicked: {}", reason);
        Err(on_panic(reason))
    })
}
