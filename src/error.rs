use thiserror::Error;

/// Terminal failures of a single analysis run.
///
/// Tempo and key estimation never produce these; they recover with defaults.
#[derive(Debug, Clone, Error)]
pub enum AnalysisError {
    #[error("Audio clip too short ({duration_secs:.2}s, minimum 2 seconds required)")]
    TooShort { duration_secs: f32 },

    #[error("Audio appears to be silent or too quiet (peak {peak:.2e})")]
    Silent { peak: f32 },

    #[error("Failed to decode audio: {0}")]
    Decode(String),

    #[error("Analysis failed: {0}")]
    AnalysisFailure(String),
}

impl AnalysisError {
    /// Stable machine-readable name, used in serialized error results.
    pub fn kind(&self) -> &'static str {
        match self {
            AnalysisError::TooShort { .. } => "too_short",
            AnalysisError::Silent { .. } => "silent",
            AnalysisError::Decode(_) => "decode",
            AnalysisError::AnalysisFailure(_) => "analysis_failure",
        }
    }
}
