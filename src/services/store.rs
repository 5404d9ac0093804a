use anyhow::{Context, Result};
use serde::Serialize;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;

use crate::analysis::result::{AnalysisResult, Status};

/// Persists finished analyses. Callers treat failures as non-fatal.
pub trait AnalysisStore: Send + Sync {
    fn save(&self, result: &AnalysisResult) -> Result<()>;
}

/// Used when history is disabled.
pub struct NoStore;

impl AnalysisStore for NoStore {
    fn save(&self, _result: &AnalysisResult) -> Result<()> {
        Ok(())
    }
}

/// One line of the history file.
#[derive(Debug, Serialize)]
struct HistoryRecord<'a> {
    timestamp: String,
    key: &'a str,
    bpm: u32,
    confidence: f64,
    title: Option<&'a str>,
    artist: Option<&'a str>,
    status: Status,
}

impl<'a> From<&'a AnalysisResult> for HistoryRecord<'a> {
    fn from(result: &'a AnalysisResult) -> Self {
        let song = result.song.as_ref();
        Self {
            timestamp: result.analysis_timestamp.to_rfc3339(),
            key: &result.key,
            bpm: result.bpm,
            confidence: result.key_confidence,
            title: song.and_then(|s| s.title.as_deref()),
            artist: song.and_then(|s| s.artist.as_deref()),
            status: result.status,
        }
    }
}

/// Appends analyses to a JSON-lines history file.
pub struct JsonlStore {
    path: PathBuf,
    // serializes appends from concurrent analyses
    lock: Mutex<()>,
}

impl JsonlStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path, lock: Mutex::new(()) }
    }
}

impl AnalysisStore for JsonlStore {
    fn save(&self, result: &AnalysisResult) -> Result<()> {
        let line = serde_json::to_string(&HistoryRecord::from(result))
            .context("Failed to serialize history record")?;

        let _guard = self
            .lock
            .lock()
            .map_err(|_| anyhow::anyhow!("History lock poisoned"))?;

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create history dir: {}", parent.display()))?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("Failed to open history file: {}", self.path.display()))?;
        writeln!(file, "{}", line)
            .with_context(|| format!("Failed to write history file: {}", self.path.display()))?;
        Ok(())
    }
}
