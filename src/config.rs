// =============================================================================
// config.rs — THE CONTROL ROOM
// =============================================================================
//
// Every knob the watcher has, readable from the environment. Prefix is
// RADIOWATCH_, a .env file is honoured if present, and every value has a
// default that works on a laptop with nothing configured.
//
// Numbers that don't parse fall back to their default instead of taking
// the whole program down. The refresh interval is kept as the raw string
// on purpose: Watcher::set_interval is the one place that validates it.
// =============================================================================

use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use tracing::warn;

use crate::circuit_breaker::BreakerSettings;

/// Which writer persists the crawled tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriterKind {
    Csv,
    Json,
    Redis,
}

impl FromStr for WriterKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "csv" => Ok(WriterKind::Csv),
            "json" => Ok(WriterKind::Json),
            "redis" => Ok(WriterKind::Redis),
            other => Err(format!("unknown writer '{other}' (expected csv, json or redis)")),
        }
    }
}

impl fmt::Display for WriterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WriterKind::Csv => write!(f, "csv"),
            WriterKind::Json => write!(f, "json"),
            WriterKind::Redis => write!(f, "redis"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    // =========================================================================
    // WATCHER
    // =========================================================================

    /// How often the watcher checks which stations are due, e.g. "60s", "5m".
    pub refresh_interval: String,

    /// Path to the JSON file describing the stations to crawl.
    pub stations_file: String,

    // =========================================================================
    // WRITERS
    // =========================================================================

    /// csv | json | redis. Default: csv
    pub writer: WriterKind,

    /// Directory the file writers append to.
    pub output_dir: String,

    /// Redis connection URL for the redis writer.
    pub redis_url: String,

    /// Namespace for every Redis key the redis writer touches.
    pub redis_prefix: String,

    /// How many stations the repeat guard remembers.
    pub repeat_memory: usize,

    // =========================================================================
    // CRAWLERS
    // =========================================================================

    /// Timeout for one "now playing" request.
    pub http_timeout: Duration,

    /// Circuit breaker thresholds, one breaker per station.
    pub breaker: BreakerSettings,

    // =========================================================================
    // OBSERVABILITY
    // =========================================================================

    /// Port of the JSON metrics endpoint. 0 disables it.
    pub metrics_port: u16,

    /// Emit logs as JSON instead of human-readable lines.
    pub log_json: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

impl Config {
    /// Load configuration from `.env` (if present) and RADIOWATCH_* variables.
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Only the log format, read ahead of everything else so logging can be
    /// set up before the rest of the configuration gets a chance to warn.
    pub fn log_json_from_env() -> bool {
        let _ = dotenvy::dotenv();
        Self::log_json_from_lookup(|key| env::var(key).ok())
    }

    pub fn log_json_from_lookup(lookup: impl Fn(&str) -> Option<String>) -> bool {
        lookup("RADIOWATCH_LOG_JSON").is_some_and(|v| parse_or(&v, false))
    }

    /// Build a configuration from any key lookup. `from_env` is this with
    /// the process environment; tests use a map.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let writer = get("RADIOWATCH_WRITER", "csv");
        let writer = writer.parse().unwrap_or_else(|e: String| {
            warn!(error = %e, "Falling back to the csv writer");
            WriterKind::Csv
        });

        let defaults = BreakerSettings::default();

        Config {
            refresh_interval: get("RADIOWATCH_REFRESH_INTERVAL", "60s"),
            stations_file: get("RADIOWATCH_STATIONS_FILE", "stations.json"),

            writer,
            output_dir: get("RADIOWATCH_OUTPUT_DIR", "./results/"),
            redis_url: get("RADIOWATCH_REDIS_URL", "redis://127.0.0.1:6379"),
            redis_prefix: get("RADIOWATCH_REDIS_PREFIX", "radiowatch"),
            repeat_memory: parse_or(&get("RADIOWATCH_REPEAT_MEMORY", "1024"), 1024),

            http_timeout: Duration::from_secs(parse_or(
                &get("RADIOWATCH_HTTP_TIMEOUT_SECS", "15"),
                15,
            )),
            breaker: BreakerSettings {
                failure_threshold: parse_or(
                    &get("RADIOWATCH_CB_FAILURE_THRESHOLD", "5"),
                    defaults.failure_threshold,
                ),
                reset_timeout: Duration::from_secs(parse_or(
                    &get("RADIOWATCH_CB_RESET_TIMEOUT_SECS", "60"),
                    defaults.reset_timeout.as_secs(),
                )),
                success_threshold: parse_or(
                    &get("RADIOWATCH_CB_SUCCESS_THRESHOLD", "2"),
                    defaults.success_threshold,
                ),
            },

            metrics_port: parse_or(&get("RADIOWATCH_METRICS_PORT", "9090"), 9090),
            log_json: Self::log_json_from_lookup(&lookup),
        }
    }
}

fn parse_or<T: FromStr>(value: &str, default: T) -> T {
    value.trim().parse().unwrap_or(default)
}
