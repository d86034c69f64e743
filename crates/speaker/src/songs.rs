//! Which audio to play for whom.

use anyhow::{Context, Result};
use std::collections::HashMap;

pub const DEFAULT_ALARM_URI: &str = "http://soundbible.com/mp3/School_Fire_Alarm-Cullen_Card-202875844.mp3";
pub const DEFAULT_END_URI: &str = "http://soundbible.com/mp3/Page_Turn-Mark_DiAngelo-1304638748.mp3";

/// Prefix of the per-person song variables, followed by the upper-cased name
pub const SONG_VAR_PREFIX: &str = "SONG_FOR_";

#[derive(Debug, Clone)]
pub struct SongBook {
    alarm_uri: String,
    end_uri: String,
    /// Keyed by upper-cased identity
    songs: HashMap<String, String>,
}

impl Default for SongBook {
    fn default() -> Self {
        Self::new(DEFAULT_ALARM_URI, DEFAULT_END_URI)
    }
}

impl SongBook {
    pub fn new(alarm_uri: impl Into<String>, end_uri: impl Into<String>) -> Self {
        Self {
            alarm_uri: alarm_uri.into(),
            end_uri: end_uri.into(),
            songs: HashMap::new(),
        }
    }

    pub fn with_song(mut self, name: &str, uri: impl Into<String>) -> Self {
        self.songs.insert(name.to_uppercase(), uri.into());
        self
    }

    /// `ALARM_URI`, `END_URI` and every `SONG_FOR_<NAME>` variable
    pub fn from_env() -> Result<Self> {
        Self::from_vars(std::env::vars())
    }

    pub fn from_vars(vars: impl IntoIterator<Item = (String, String)>) -> Result<Self> {
        let mut book = Self::default();

        for (key, value) in vars {
            let value = value.trim().to_string();
            if key == "ALARM_URI" {
                common::validation::validate_uri(&value, "ALARM_URI")?;
                book.alarm_uri = value;
            } else if key == "END_URI" {
                common::validation::validate_uri(&value, "END_URI")?;
                book.end_uri = value;
            } else if let Some(name) = key.strip_prefix(SONG_VAR_PREFIX) {
                if name.is_empty() || value.is_empty() {
                    continue;
                }
                common::validation::validate_uri(&value, &key).with_context(|| format!("Invalid {}", key))?;
                book.songs.insert(name.to_uppercase(), value);
            }
        }

        Ok(book)
    }

    pub fn alarm_uri(&self) -> &str {
        &self.alarm_uri
    }

    pub fn end_uri(&self) -> &str {
        &self.end_uri
    }

    /// The person's configured song, or the alarm when none is set
    pub fn song_for(&self, name: &str) -> &str {
        self.songs
            .get(&name.to_uppercase())
            .map(String::as_str)
            .unwrap_or(&self.alarm_uri)
    }

    pub fn len(&self) -> usize {
        self.songs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.songs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn test_defaults() {
        let book = SongBook::from_vars(Vec::new()).unwrap();
        assert_eq!(book.alarm_uri(), DEFAULT_ALARM_URI);
        assert_eq!(book.end_uri(), DEFAULT_END_URI);
        assert!(book.is_empty());
    }

    #[test]
    fn test_song_lookup_is_case_insensitive_on_name() {
        let book = SongBook::from_vars(vars(&[
            ("SONG_FOR_ALICE", "http://music/alice.mp3"),
            ("PATH", "/usr/bin"),
        ]))
        .unwrap();

        assert_eq!(book.song_for("alice"), "http://music/alice.mp3");
        assert_eq!(book.song_for("Alice"), "http://music/alice.mp3");
        assert_eq!(book.len(), 1);
    }

    #[test]
    fn test_unknown_person_falls_back_to_alarm() {
        let book = SongBook::from_vars(vars(&[("ALARM_URI", "http://alarm/siren.mp3")])).unwrap();
        assert_eq!(book.song_for("bob"), "http://alarm/siren.mp3");
    }

    #[test]
    fn test_empty_entries_are_ignored() {
        let book = SongBook::from_vars(vars(&[("SONG_FOR_", "http://x"), ("SONG_FOR_BOB", "  ")])).unwrap();
        assert!(book.is_empty());
    }

    #[test]
    fn test_invalid_uri_is_rejected() {
        let result = SongBook::from_vars(vars(&[("SONG_FOR_EVE", "http://bad\u{7}uri")]));
        assert!(result.is_err());
    }
}
