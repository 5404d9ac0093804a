use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "keyfinder", about = "Musical key and tempo detection for audio clips")]
pub struct Cli {
    /// Input audio files (WAV, MP3, FLAC, OGG, AAC)
    pub inputs: Vec<PathBuf>,

    /// Config file (default: keyfinder.toml, then ~/.config/keyfinder/config.toml)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Print the chord progressions for a key (e.g. "A Minor") and exit
    #[arg(long, value_name = "KEY")]
    pub chords: Option<String>,

    /// Skip song identification
    #[arg(long)]
    pub no_identify: bool,

    /// Do not append results to the history file
    #[arg(long)]
    pub no_history: bool,

    /// Cross-check the tempo against inter-onset intervals
    #[arg(long)]
    pub onset_validation: bool,

    /// Write JSON here instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Pretty-print JSON
    #[arg(long)]
    pub pretty: bool,
}
