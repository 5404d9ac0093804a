use anyhow::{Context, Result};
use std::collections::HashMap;
use std::path::Path;

const EMBEDDED_TABLE: &str = include_str!("../../assets/chord_progressions.toml");

/// Read-only mapping from a key name ("A Minor") to common chord progressions.
#[derive(Debug, Clone, Default)]
pub struct ChordTable {
    progressions: HashMap<String, Vec<String>>,
}

impl ChordTable {
    /// The table shipped with the binary.
    pub fn embedded() -> Result<Self> {
        Self::parse(EMBEDDED_TABLE).context("Failed to parse embedded chord table")
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read chord table: {}", path.display()))?;
        Self::parse(&content)
            .with_context(|| format!("Failed to parse chord table: {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        let progressions: HashMap<String, Vec<String>> = toml::from_str(content)?;
        Ok(Self { progressions })
    }

    /// Progressions for `key`, empty when the table has no entry.
    pub fn progressions(&self, key: &str) -> &[String] {
        self.progressions.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.progressions.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::key::{Key, Mode};

    #[test]
    fn test_embedded_covers_all_keys() {
        let table = ChordTable::embedded().unwrap();
        assert_eq!(table.len(), 24);
        for root in 0..12 {
            for mode in [Mode::Major, Mode::Minor] {
                let key = Key::new(root, mode).to_string();
                assert!(!table.progressions(&key).is_empty(), "missing {}", key);
            }
        }
    }

    #[test]
    fn test_lookup_order_is_preserved() {
        let table = ChordTable::embedded().unwrap();
        assert_eq!(table.progressions("A Minor")[0], "Am - G - C - F");
        assert_eq!(table.progressions("C Major").len(), 5);
    }

    #[test]
    fn test_unknown_key_is_empty() {
        let table = ChordTable::embedded().unwrap();
        assert!(table.progressions("H Dorian").is_empty());
        assert!(table.progressions("").is_empty());

        let partial = ChordTable::parse(r#""C Major" = ["C - F - G"]"#).unwrap();
        assert!(partial.progressions("A Minor").is_empty());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chords.toml");
        std::fs::write(&path, "\"E Minor\" = [\"Em - C - G - D\"]\n").unwrap();

        let table = ChordTable::load(&path).unwrap();
        assert_eq!(table.progressions("E Minor"), ["Em - C - G - D".to_string()]);
        assert!(ChordTable::load(&dir.path().join("missing.toml")).is_err());
    }
}
