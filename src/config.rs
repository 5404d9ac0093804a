use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub analysis: AnalysisConfig,
    #[serde(default)]
    pub identify: IdentifyConfig,
    #[serde(default)]
    pub store: StoreConfig,
}

/// Parameters of the key/tempo pipeline.
#[derive(Debug, Clone, Deserialize)]
pub struct AnalysisConfig {
    /// Rate every clip is resampled to before analysis
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
    #[serde(default = "default_min_duration_secs")]
    pub min_duration_secs: f32,
    /// Frames quieter than the loudest frame by this many dB are trimmed from the ends
    #[serde(default = "default_trim_top_db")]
    pub trim_top_db: f32,
    /// Peak amplitude below which a clip counts as silent
    #[serde(default = "default_silence_peak")]
    pub silence_peak: f32,
    /// Median filter length (frames / bins) for harmonic-percussive separation
    #[serde(default = "default_hpss_kernel")]
    pub hpss_kernel: usize,
    #[serde(default = "default_bpm")]
    pub default_bpm: u32,
    #[serde(default = "default_min_bpm")]
    pub min_bpm: f32,
    #[serde(default = "default_max_bpm")]
    pub max_bpm: f32,
    /// Alternatives scoring at or below this correlation are dropped
    #[serde(default = "default_alternative_threshold")]
    pub alternative_threshold: f64,
    #[serde(default = "default_max_alternatives")]
    pub max_alternatives: usize,
    /// Cross-check the periodicity estimate against median inter-onset intervals
    #[serde(default)]
    pub onset_validation: bool,
    /// Replacement chord progression table (TOML)
    #[serde(default)]
    pub chords_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IdentifyConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_identify_host")]
    pub host: String,
    #[serde(default)]
    pub access_key: Option<String>,
    #[serde(default)]
    pub access_secret: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub history_path: Option<PathBuf>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            sample_rate: default_sample_rate(),
            min_duration_secs: default_min_duration_secs(),
            trim_top_db: default_trim_top_db(),
            silence_peak: default_silence_peak(),
            hpss_kernel: default_hpss_kernel(),
            default_bpm: default_bpm(),
            min_bpm: default_min_bpm(),
            max_bpm: default_max_bpm(),
            alternative_threshold: default_alternative_threshold(),
            max_alternatives: default_max_alternatives(),
            onset_validation: false,
            chords_path: None,
        }
    }
}

impl Default for IdentifyConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host: default_identify_host(),
            access_key: None,
            access_secret: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            history_path: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl IdentifyConfig {
    /// Credentials from the file, falling back to the environment.
    pub fn credentials(&self) -> Option<(String, String)> {
        let key = self
            .access_key
            .clone()
            .or_else(|| std::env::var("ACRCLOUD_ACCESS_KEY").ok())?;
        let secret = self
            .access_secret
            .clone()
            .or_else(|| std::env::var("ACRCLOUD_ACCESS_SECRET").ok())?;
        if key.is_empty() || secret.is_empty() {
            return None;
        }
        Some((key, secret))
    }
}

impl StoreConfig {
    pub fn resolved_history_path(&self) -> Option<PathBuf> {
        self.history_path.clone().or_else(|| {
            dirs::data_dir()
                .or_else(dirs::home_dir)
                .map(|base| base.join("keyfinder").join("history.jsonl"))
        })
    }
}

fn default_sample_rate() -> u32 { 22050 }
fn default_min_duration_secs() -> f32 { 2.0 }
fn default_trim_top_db() -> f32 { 20.0 }
fn default_silence_peak() -> f32 { 1e-5 }
fn default_hpss_kernel() -> usize { 31 }
fn default_bpm() -> u32 { 120 }
fn default_min_bpm() -> f32 { 60.0 }
fn default_max_bpm() -> f32 { 200.0 }
fn default_alternative_threshold() -> f64 { 0.1 }
fn default_max_alternatives() -> usize { 3 }
fn default_identify_host() -> String { "identify-us-west-2.acrcloud.com".into() }
fn default_timeout_secs() -> u64 { 10 }
fn default_true() -> bool { true }

pub fn load_config(path: &Path) -> Option<Config> {
    let content = std::fs::read_to_string(path).ok()?;
    match toml::from_str(&content) {
        Ok(cfg) => Some(cfg),
        Err(err) => {
            log::warn!("Invalid config {}: {}", path.display(), err);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let cfg: Config = toml::from_str("").unwrap();
        assert_eq!(cfg.analysis.sample_rate, 22050);
        assert_eq!(cfg.analysis.default_bpm, 120);
        assert_eq!(cfg.analysis.hpss_kernel, 31);
        assert!(!cfg.analysis.onset_validation);
        assert!(cfg.identify.enabled);
        assert_eq!(cfg.identify.timeout_secs, 10);
        assert!(cfg.store.enabled);
    }

    #[test]
    fn test_partial_sections_fill_defaults() {
        let cfg: Config = toml::from_str(
            r#"
            [analysis]
            onset_validation = true
            max_bpm = 180.0

            [identify]
            host = "identify-eu-west-1.acrcloud.com"
            access_key = "key"
            access_secret = "secret"

            [store]
            enabled = false
            "#,
        )
        .unwrap();
        assert!(cfg.analysis.onset_validation);
        assert_eq!(cfg.analysis.max_bpm, 180.0);
        assert_eq!(cfg.analysis.min_bpm, 60.0);
        assert_eq!(cfg.identify.host, "identify-eu-west-1.acrcloud.com");
        assert_eq!(
            cfg.identify.credentials(),
            Some(("key".to_string(), "secret".to_string()))
        );
        assert!(!cfg.store.enabled);
        assert_eq!(cfg.store.timeout_secs, 10);
    }

    #[test]
    fn test_explicit_history_path_wins() {
        let store = StoreConfig {
            history_path: Some(PathBuf::from("/tmp/history.jsonl")),
            ..StoreConfig::default()
        };
        assert_eq!(
            store.resolved_history_path(),
            Some(PathBuf::from("/tmp/history.jsonl"))
        );
    }

    #[test]
    fn test_load_config_missing_file() {
        assert!(load_config(Path::new("/nonexistent/keyfinder.toml")).is_none());
    }
}
