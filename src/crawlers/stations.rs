// =============================================================================
// crawlers/stations.rs — THE STATION DIRECTORY
// =============================================================================
//
// Stations are described in a JSON file:
//
// [
//   {
//     "name": "FM4",
//     "url": "https://example.org/fm4/now-playing.json",
//     "title_pointer": "/current/title",
//     "artist_pointer": "/current/artist",
//     "interval": "90s"
//   }
// ]
//
// Pointers are RFC 6901 JSON Pointers into the station's response.
// Everything is validated up front so a typo fails at startup, not at
// 3 a.m. on the first crawl.
// =============================================================================

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use url::Url;

#[derive(Debug, Error)]
pub enum StationError {
    #[error("failed to read stations file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse stations file: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("station '{station}': {reason}")]
    Invalid { station: String, reason: String },

    #[error("station '{0}' is defined more than once")]
    Duplicate(String),
}

fn default_title_pointer() -> String {
    "/title".to_string()
}

fn default_artist_pointer() -> String {
    "/artist".to_string()
}

fn default_interval() -> String {
    "60s".to_string()
}

/// One entry of the stations file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StationConfig {
    pub name: String,
    pub url: String,
    #[serde(default = "default_title_pointer")]
    pub title_pointer: String,
    #[serde(default = "default_artist_pointer")]
    pub artist_pointer: String,
    /// How long the station waits between crawls, e.g. "90s".
    #[serde(default = "default_interval")]
    pub interval: String,
}

/// A station that passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Station {
    pub name: String,
    pub url: Url,
    pub title_pointer: String,
    pub artist_pointer: String,
    pub interval: Duration,
}

impl StationConfig {
    pub fn validate(&self) -> Result<Station, StationError> {
        let invalid = |reason: String| StationError::Invalid {
            station: self.name.clone(),
            reason,
        };

        if self.name.trim().is_empty() {
            return Err(invalid("name is empty".to_string()));
        }

        let url = Url::parse(&self.url).map_err(|e| invalid(format!("invalid url: {e}")))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(invalid(format!("unsupported url scheme '{}'", url.scheme())));
        }

        for pointer in [&self.title_pointer, &self.artist_pointer] {
            if !pointer.is_empty() && !pointer.starts_with('/') {
                return Err(invalid(format!("'{pointer}' is not a JSON pointer")));
            }
        }

        let interval = humantime::parse_duration(self.interval.trim())
            .map_err(|e| invalid(format!("invalid interval '{}': {e}", self.interval)))?;
        if interval.is_zero() {
            return Err(invalid("interval must be greater than zero".to_string()));
        }

        Ok(Station {
            name: self.name.trim().to_string(),
            url,
            title_pointer: self.title_pointer.clone(),
            artist_pointer: self.artist_pointer.clone(),
            interval,
        })
    }
}

/// Parse and validate a stations document.
pub fn parse_stations(json: &str) -> Result<Vec<Station>, StationError> {
    let configs: Vec<StationConfig> = serde_json::from_str(json)?;
    let mut seen = HashSet::new();
    let mut stations = Vec::with_capacity(configs.len());

    for config in &configs {
        let station = config.validate()?;
        if !seen.insert(station.name.clone()) {
            return Err(StationError::Duplicate(station.name));
        }
        stations.push(station);
    }

    Ok(stations)
}

/// Read, parse and validate the stations file at `path`.
pub async fn load_stations(path: impl AsRef<Path>) -> Result<Vec<Station>, StationError> {
    let path = path.as_ref();
    let json = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| StationError::Io {
            path: path.display().to_string(),
            source,
        })?;
    parse_stations(&json)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_with_defaults() {
        let stations = parse_stations(
            r#"[{"name": "FM4", "url": "https://example.org/fm4.json"}]"#,
        )
        .unwrap();
        assert_eq!(stations.len(), 1);
        assert_eq!(stations[0].title_pointer, "/title");
        assert_eq!(stations[0].artist_pointer, "/artist");
        assert_eq!(stations[0].interval, Duration::from_secs(60));
    }

    #[test]
    fn test_custom_interval_and_pointers() {
        let stations = parse_stations(
            r#"[{"name": "Ö3", "url": "http://example.org/oe3", "interval": "1m30s",
                 "title_pointer": "/now/0/song", "artist_pointer": "/now/0/by"}]"#,
        )
        .unwrap();
        assert_eq!(stations[0].interval, Duration::from_secs(90));
        assert_eq!(stations[0].title_pointer, "/now/0/song");
    }

    #[test]
    fn test_rejects_bad_entries() {
        let cases = [
            r#"[{"name": "", "url": "https://example.org"}]"#,
            r#"[{"name": "A", "url": "not a url"}]"#,
            r#"[{"name": "A", "url": "ftp://example.org"}]"#,
            r#"[{"name": "A", "url": "https://example.org", "interval": "0s"}]"#,
            r#"[{"name": "A", "url": "https://example.org", "interval": "soon"}]"#,
            r#"[{"name": "A", "url": "https://example.org", "title_pointer": "title"}]"#,
        ];
        for json in cases {
            assert!(
                matches!(parse_stations(json), Err(StationError::Invalid { .. })),
                "expected invalid: {json}"
            );
        }
    }

    #[test]
    fn test_rejects_duplicates() {
        let result = parse_stations(
            r#"[{"name": "A", "url": "https://example.org/1"},
                {"name": "A", "url": "https://example.org/2"}]"#,
        );
        assert!(matches!(result, Err(StationError::Duplicate(name)) if name == "A"));
    }

    #[tokio::test]
    async fn test_load_missing_file() {
        let result = load_stations("/definitely/not/here.json").await;
        assert!(matches!(result, Err(StationError::Io { .. })));
    }
}
