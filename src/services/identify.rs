use anyhow::{Context, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use hmac::{Hmac, Mac};
use reqwest::blocking::multipart::{Form, Part};
use serde_json::Value;
use sha1::Sha1;
use std::time::Duration;

use crate::analysis::result::SongMetadata;

/// Looks a clip up in a fingerprint catalog.
///
/// `Ok(None)` means the service answered but did not know the song.
pub trait SongIdentifier: Send + Sync {
    fn identify(&self, audio: &[u8]) -> Result<Option<SongMetadata>>;
}

/// Used when no identification service is configured.
pub struct NoIdentifier;

impl SongIdentifier for NoIdentifier {
    fn identify(&self, _audio: &[u8]) -> Result<Option<SongMetadata>> {
        Ok(None)
    }
}

const ENDPOINT: &str = "/v1/identify";
const DATA_TYPE: &str = "audio";
const SIGNATURE_VERSION: &str = "1";

/// Client for the ACRCloud identification API.
pub struct AcrCloudIdentifier {
    client: reqwest::blocking::Client,
    host: String,
    access_key: String,
    access_secret: String,
}

impl AcrCloudIdentifier {
    pub fn new(host: &str, access_key: String, access_secret: String, timeout: Duration) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            host: host.to_string(),
            access_key,
            access_secret,
        })
    }
}

impl SongIdentifier for AcrCloudIdentifier {
    fn identify(&self, audio: &[u8]) -> Result<Option<SongMetadata>> {
        let timestamp = chrono::Utc::now().timestamp().to_string();
        let signature = sign(&self.access_key, &self.access_secret, &timestamp)?;

        let form = Form::new()
            .text("access_key", self.access_key.clone())
            .text("sample_bytes", audio.len().to_string())
            .text("timestamp", timestamp)
            .text("signature", signature)
            .text("data_type", DATA_TYPE)
            .text("signature_version", SIGNATURE_VERSION)
            .part("sample", Part::bytes(audio.to_vec()).file_name("sample"));

        let url = format!("https://{}{}", self.host, ENDPOINT);
        let response: Value = self
            .client
            .post(&url)
            .multipart(form)
            .send()
            .with_context(|| format!("Identification request to {} failed", self.host))?
            .error_for_status()
            .context("Identification service returned an error status")?
            .json()
            .context("Identification response is not valid JSON")?;

        Ok(parse_response(&response))
    }
}

/// base64(HMAC-SHA1(secret, request description)).
fn sign(access_key: &str, access_secret: &str, timestamp: &str) -> Result<String> {
    let string_to_sign = format!(
        "POST\n{}\n{}\n{}\n{}\n{}",
        ENDPOINT, access_key, DATA_TYPE, SIGNATURE_VERSION, timestamp
    );
    let mut mac = Hmac::<Sha1>::new_from_slice(access_secret.as_bytes())
        .map_err(|e| anyhow::anyhow!("Invalid signing key: {}", e))?;
    mac.update(string_to_sign.as_bytes());
    Ok(STANDARD.encode(mac.finalize().into_bytes()))
}

/// First music match of a response with status code 0, if any.
fn parse_response(response: &Value) -> Option<SongMetadata> {
    let code = response["status"]["code"].as_i64();
    if code != Some(0) {
        log::debug!(
            "No match: {} ({})",
            response["status"]["msg"].as_str().unwrap_or("unknown"),
            code.unwrap_or(-1)
        );
        return None;
    }

    let track = response["metadata"]["music"].as_array()?.first()?;
    let text = |v: &Value| v.as_str().map(str::to_string);

    let artists: Vec<&str> = track["artists"]
        .as_array()
        .map(|list| list.iter().filter_map(|a| a["name"].as_str()).collect())
        .unwrap_or_default();

    Some(SongMetadata {
        title: text(&track["title"]),
        artist: if artists.is_empty() { None } else { Some(artists.join(", ")) },
        album: text(&track["album"]["name"]),
        release_date: text(&track["release_date"]),
        spotify_url: spotify_url(&track["external_metadata"]["spotify"]),
        cover_art_url: text(&track["album"]["cover_art_url"]),
    })
}

/// Spotify link from `external_metadata.spotify`, which may be one object or
/// a list. Each entry carries either `track.id` or `external_ids.spotify`.
fn spotify_url(spotify: &Value) -> Option<String> {
    let entries: Vec<&Value> = match spotify.as_array() {
        Some(list) => list.iter().collect(),
        None => vec![spotify],
    };
    entries.into_iter().find_map(|entry| {
        let id = entry["track"]["id"]
            .as_str()
            .or_else(|| entry["external_ids"]["spotify"].as_str())?;
        if id.starts_with("http") {
            Some(id.to_string())
        } else {
            Some(format!("https://open.spotify.com/track/{}", id))
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_hmac_sha1_known_vector() {
        // RFC 2202 test case 2
        let mut mac = Hmac::<Sha1>::new_from_slice(b"Jefe").unwrap();
        mac.update(b"what do ya want for nothing?");
        assert_eq!(STANDARD.encode(mac.finalize().into_bytes()), "7/zfauXrL6LSdBbV8YTfnCWafHk=");
    }

    #[test]
    fn test_request_signature() {
        let signature = sign("key", "secret", "1700000000").unwrap();
        assert_eq!(signature, "tWbqxXkbyadGeaHIJS/OzfF+KdU=");
    }

    #[test]
    fn test_parse_match() {
        let response = json!({
            "status": {"code": 0, "msg": "Success"},
            "metadata": {"music": [{
                "title": "Song",
                "artists": [{"name": "First"}, {"name": "Second"}],
                "album": {"name": "Record", "cover_art_url": "https://img.example/cover.jpg"},
                "release_date": "2019-05-01",
                "external_metadata": {"spotify": {"track": {"id": "abc123"}}}
            }]}
        });
        let song = parse_response(&response).unwrap();
        assert_eq!(song.title.as_deref(), Some("Song"));
        assert_eq!(song.artist.as_deref(), Some("First, Second"));
        assert_eq!(song.album.as_deref(), Some("Record"));
        assert_eq!(song.release_date.as_deref(), Some("2019-05-01"));
        assert_eq!(song.spotify_url.as_deref(), Some("https://open.spotify.com/track/abc123"));
        assert_eq!(song.cover_art_url.as_deref(), Some("https://img.example/cover.jpg"));
    }

    #[test]
    fn test_parse_sparse_match() {
        let response = json!({
            "status": {"code": 0},
            "metadata": {"music": [{"title": "Only Title"}]}
        });
        let song = parse_response(&response).unwrap();
        assert_eq!(song.title.as_deref(), Some("Only Title"));
        assert_eq!(song.artist, None);
        assert_eq!(song.spotify_url, None);
    }

    #[test]
    fn test_parse_no_result() {
        let response = json!({"status": {"code": 1001, "msg": "No result"}});
        assert_eq!(parse_response(&response), None);

        let empty = json!({"status": {"code": 0}, "metadata": {"music": []}});
        assert_eq!(parse_response(&empty), None);
    }

    #[test]
    fn test_no_identifier() {
        assert_eq!(NoIdentifier.identify(b"anything").unwrap(), None);
    }

    #[test]
    fn test_spotify_from_external_ids() {
        let listed = json!([{"external_ids": {"spotify": "4uLU6hMCjMI75M1A2tKUQC"}}]);
        assert_eq!(
            spotify_url(&listed).as_deref(),
            Some("https://open.spotify.com/track/4uLU6hMCjMI75M1A2tKUQC")
        );

        let url = json!({"external_ids": {"spotify": "https://open.spotify.com/track/xyz"}});
        assert_eq!(spotify_url(&url).as_deref(), Some("https://open.spotify.com/track/xyz"));

        let later_entry = json!([{"album": {}}, {"track": {"id": "abc"}}]);
        assert_eq!(spotify_url(&later_entry).as_deref(), Some("https://open.spotify.com/track/abc"));

        assert_eq!(spotify_url(&Value::Null), None);
        assert_eq!(spotify_url(&json!([])), None);
    }

    #[test]
    fn test_parse_match_with_listed_spotify_ids() {
        let response = json!({
            "status": {"code": 0},
            "metadata": {"music": [{
                "title": "Song",
                "external_metadata": {"spotify": [{"external_ids": {"spotify": "def456"}}]}
            }]}
        });
        let song = parse_response(&response).unwrap();
        assert_eq!(song.spotify_url.as_deref(), Some("https://open.spotify.com/track/def456"));
    }
}
