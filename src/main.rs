mod analysis;
mod audio;
mod cli;
mod config;
mod error;
mod services;

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use analysis::chords::ChordTable;
use analysis::pipeline::AnalysisPipeline;
use analysis::result::AnalysisOutcome;
use audio::key::Key;
use cli::Cli;
use config::Config;
use error::AnalysisError;
use services::identify::{AcrCloudIdentifier, NoIdentifier, SongIdentifier};
use services::store::{AnalysisStore, JsonlStore, NoStore};

/// One analyzed input as printed.
#[derive(Serialize)]
struct FileReport {
    file: String,
    #[serde(flatten)]
    outcome: AnalysisOutcome,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let cli = Cli::parse();

    // Load config: explicit --config path, or auto-detect keyfinder.toml / global config
    let config_path = cli.config.clone().or_else(find_config);
    let mut cfg = match config_path {
        Some(ref path) => match config::load_config(path) {
            Some(cfg) => {
                log::info!("Loaded config from {}", path.display());
                cfg
            }
            None => {
                log::warn!("Failed to load config from {}", path.display());
                Config::default()
            }
        },
        None => Config::default(),
    };

    // Flags only ever switch features on or off relative to the file
    if cli.onset_validation {
        cfg.analysis.onset_validation = true;
    }
    if cli.no_identify {
        cfg.identify.enabled = false;
    }
    if cli.no_history {
        cfg.store.enabled = false;
    }

    let chords = Arc::new(match cfg.analysis.chords_path {
        Some(ref path) => ChordTable::load(path)?,
        None => ChordTable::embedded()?,
    });

    log::debug!("Chord table covers {} keys", chords.len());

    if let Some(ref key) = cli.chords {
        if Key::parse(key).is_none() {
            log::warn!("\"{}\" is not a key name like \"A Minor\" or \"F# Major\"", key);
        }
        let progressions = chords.progressions(key);
        if progressions.is_empty() {
            log::warn!("No chord progressions for \"{}\"", key);
        }
        for progression in progressions {
            println!("{}", progression);
        }
        return Ok(());
    }

    if cli.inputs.is_empty() {
        anyhow::bail!("No input files given (see --help)");
    }

    let pipeline = AnalysisPipeline::new(&cfg.analysis, chords)
        .with_identifier(
            build_identifier(&cfg)?,
            Duration::from_secs(cfg.identify.timeout_secs),
        )
        .with_store(build_store(&cfg), Duration::from_secs(cfg.store.timeout_secs));

    let reports: Vec<FileReport> = if cli.inputs.len() == 1 {
        vec![analyze_file(&pipeline, &cli.inputs[0])]
    } else {
        log::info!("Analyzing {} files...", cli.inputs.len());
        let pb = ProgressBar::new(cli.inputs.len() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} files ({eta} remaining)")
                .context("Invalid progress bar template")?
                .progress_chars("=>-"),
        );
        let reports = cli
            .inputs
            .par_iter()
            .map(|input| {
                let report = analyze_file(&pipeline, input);
                pb.inc(1);
                report
            })
            .collect();
        pb.finish_with_message("Analysis complete");
        reports
    };

    let failed = reports
        .iter()
        .filter(|r| matches!(r.outcome, AnalysisOutcome::Error(_)))
        .count();
    if failed > 0 {
        log::warn!("{} of {} inputs failed", failed, reports.len());
    }

    let json = if reports.len() == 1 {
        to_json(&reports[0], cli.pretty)?
    } else {
        to_json(&reports, cli.pretty)?
    };

    match cli.output {
        Some(ref path) => {
            std::fs::write(path, json + "\n")
                .with_context(|| format!("Failed to write output: {}", path.display()))?;
            log::info!("Done! Output: {}", path.display());
        }
        None => println!("{}", json),
    }
    Ok(())
}

fn find_config() -> Option<PathBuf> {
    let local = PathBuf::from("keyfinder.toml");
    if local.exists() {
        return Some(local);
    }
    if let Some(home) = dirs::home_dir() {
        let xdg = home.join(".config").join("keyfinder").join("config.toml");
        if xdg.exists() {
            return Some(xdg);
        }
    }
    if let Some(config_dir) = dirs::config_dir() {
        let platform = config_dir.join("keyfinder").join("config.toml");
        if platform.exists() {
            return Some(platform);
        }
    }
    None
}

fn build_identifier(cfg: &Config) -> Result<Arc<dyn SongIdentifier>> {
    if !cfg.identify.enabled {
        return Ok(Arc::new(NoIdentifier));
    }
    match cfg.identify.credentials() {
        Some((key, secret)) => {
            log::info!("Song identification via {}", cfg.identify.host);
            let identifier = AcrCloudIdentifier::new(
                &cfg.identify.host,
                key,
                secret,
                Duration::from_secs(cfg.identify.timeout_secs),
            )?;
            Ok(Arc::new(identifier))
        }
        None => {
            log::info!("No ACRCloud credentials, song identification disabled");
            Ok(Arc::new(NoIdentifier))
        }
    }
}

fn build_store(cfg: &Config) -> Arc<dyn AnalysisStore> {
    if !cfg.store.enabled {
        return Arc::new(NoStore);
    }
    match cfg.store.resolved_history_path() {
        Some(path) => {
            log::debug!("History: {}", path.display());
            Arc::new(JsonlStore::new(path))
        }
        None => {
            log::warn!("No data directory found, history disabled");
            Arc::new(NoStore)
        }
    }
}

fn analyze_file(pipeline: &AnalysisPipeline, input: &Path) -> FileReport {
    log::info!("Input: {}", input.display());
    let result = std::fs::read(input)
        .map_err(|err| AnalysisError::Decode(format!("cannot read {}: {}", input.display(), err)))
        .and_then(|bytes| pipeline.analyze(&bytes));
    if let Err(ref err) = result {
        log::error!("{}: {}", input.display(), err);
    }
    FileReport {
        file: input.display().to_string(),
        outcome: AnalysisOutcome::from(result),
    }
}

fn to_json<T: Serialize>(value: &T, pretty: bool) -> Result<String> {
    let json = if pretty {
        serde_json::to_string_pretty(value)
    } else {
        serde_json::to_string(value)
    };
    json.context("Failed to serialize results")
}
