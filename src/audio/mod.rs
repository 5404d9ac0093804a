pub mod chroma;
pub mod decode;
pub mod features;
pub mod hpss;
pub mod key;
pub mod preprocess;
pub mod stft;
pub mod tempo;

#[cfg(test)]
pub mod test_signals;
