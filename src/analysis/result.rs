//! Serializable analysis records

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use crate::error::AnalysisError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Recognized,
    NotRecognized,
    Error,
}

/// What the song-identification service knows about a clip.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SongMetadata {
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub release_date: Option<String>,
    pub spotify_url: Option<String>,
    pub cover_art_url: Option<String>,
}

/// Key and tempo of one clip, plus optional identification.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisResult {
    pub key: String,
    /// 0..=100, one decimal
    pub key_confidence: f64,
    pub bpm: u32,
    pub alternative_keys: Vec<String>,
    pub relative_key: String,
    pub chord_progressions: Vec<String>,
    pub status: Status,
    #[serde(flatten)]
    pub song: Option<SongMetadata>,
    pub analysis_timestamp: DateTime<Local>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorResult {
    pub status: Status,
    pub error: String,
    pub kind: &'static str,
}

impl From<&AnalysisError> for ErrorResult {
    fn from(err: &AnalysisError) -> Self {
        Self {
            status: Status::Error,
            error: err.to_string(),
            kind: err.kind(),
        }
    }
}

/// Either side of an analysis, as handed to callers that serialize it.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum AnalysisOutcome {
    Success(AnalysisResult),
    Error(ErrorResult),
}

impl From<Result<AnalysisResult, AnalysisError>> for AnalysisOutcome {
    fn from(result: Result<AnalysisResult, AnalysisError>) -> Self {
        match result {
            Ok(result) => AnalysisOutcome::Success(result),
            Err(err) => AnalysisOutcome::Error(ErrorResult::from(&err)),
        }
    }
}
