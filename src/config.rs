//! Run settings: `.gamethumb.toml` merged over built-in defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::Error;

/// Config file looked up in the working directory when `--config` is not given.
pub const CONFIG_FILE: &str = ".gamethumb.toml";

/// Default catalog endpoint.
pub const DEFAULT_BASE_URL: &str = "https://boardgamegeek.com/xmlapi2";

/// Run settings loaded from `.gamethumb.toml`, then overridden by CLI flags.
#[derive(Debug, Clone)]
pub struct Config {
    /// Root URL of the catalog API.
    pub base_url: String,
    /// Largest side of the output canvas, in pixels.
    pub canvas_max: u32,
    /// Number of download/normalize workers.
    pub fetch_workers: usize,
    /// Keep raw downloads next to the normalized output.
    pub keep_originals: bool,
    /// Optional file that receives a copy of the log.
    pub log_file: Option<PathBuf>,
    /// Retries after a transport-class failure.
    pub max_retries: u32,
    /// Minimum spacing between two catalog requests.
    pub min_interval: Duration,
    /// Root directory for images and report files.
    pub output_dir: PathBuf,
    /// Maximum ids per batched entry request.
    pub rank_batch_size: usize,
    /// First retry delay; doubles on every retry.
    pub retry_backoff: Duration,
    /// Subdirectory of `output_dir` for guessed resolutions.
    pub review_dir: PathBuf,
    /// Per-request timeout.
    pub timeout: Duration,
    /// User-Agent header sent with every request.
    pub user_agent: String,
}

/// Raw TOML structure for `.gamethumb.toml`. Every key is optional.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(deny_unknown_fields)]
struct GamethumbTomlConfig {
    base_url: Option<String>,
    canvas_max: Option<u32>,
    fetch_workers: Option<usize>,
    keep_originals: Option<bool>,
    log_file: Option<PathBuf>,
    max_retries: Option<u32>,
    min_interval_ms: Option<u64>,
    output_dir: Option<PathBuf>,
    rank_batch_size: Option<usize>,
    retry_backoff_ms: Option<u64>,
    review_dir: Option<PathBuf>,
    timeout_secs: Option<u64>,
    user_agent: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        return Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            canvas_max: 500,
            fetch_workers: 4,
            keep_originals: false,
            log_file: None,
            max_retries: 3,
            min_interval: Duration::from_secs(5),
            output_dir: PathBuf::from("game_images"),
            rank_batch_size: 20,
            retry_backoff: Duration::from_secs(1),
            review_dir: PathBuf::from("review"),
            timeout: Duration::from_secs(30),
            user_agent: concat!("gamethumb/", env!("CARGO_PKG_VERSION")).to_string(),
        };
    }
}

impl Config {
    /// Load config from `.gamethumb.toml` in `root`, or from an explicit path.
    ///
    /// A missing default file yields the defaults. A missing explicit file is an
    /// error, and so is a malformed one: a config the user wrote is never
    /// silently replaced by defaults.
    ///
    /// # Errors
    ///
    /// Returns `Error::ConfigNotFound` for a missing explicit path,
    /// `Error::Io` if reading fails, `Error::TomlDe` if the TOML is malformed,
    /// or `Error::ConfigValue` if a value is out of range.
    pub fn load(root: &Path, explicit: Option<&Path>) -> Result<Self, Error> {
        let path = explicit.map_or_else(|| root.join(CONFIG_FILE), Path::to_path_buf);
        let content = match std::fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound && explicit.is_none() => {
                return Ok(Self::default());
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::ConfigNotFound { path });
            },
            Err(e) => return Err(Error::Io(e)),
        };
        return Self::parse(&content);
    }

    /// Parse config from TOML content, filling unset keys with defaults.
    ///
    /// # Errors
    ///
    /// Returns `Error::TomlDe` if the TOML is malformed or has unknown keys,
    /// or `Error::ConfigValue` if a value is out of range.
    pub fn parse(content: &str) -> Result<Self, Error> {
        let raw: GamethumbTomlConfig = toml::from_str(content)?;
        let defaults = Self::default();

        let config = Self {
            base_url: raw.base_url.unwrap_or(defaults.base_url),
            canvas_max: raw.canvas_max.unwrap_or(defaults.canvas_max),
            fetch_workers: raw.fetch_workers.unwrap_or(defaults.fetch_workers),
            keep_originals: raw.keep_originals.unwrap_or(defaults.keep_originals),
            log_file: raw.log_file,
            max_retries: raw.max_retries.unwrap_or(defaults.max_retries),
            min_interval: raw.min_interval_ms.map_or(defaults.min_interval, Duration::from_millis),
            output_dir: raw.output_dir.unwrap_or(defaults.output_dir),
            rank_batch_size: raw.rank_batch_size.unwrap_or(defaults.rank_batch_size),
            retry_backoff: raw.retry_backoff_ms.map_or(defaults.retry_backoff, Duration::from_millis),
            review_dir: raw.review_dir.unwrap_or(defaults.review_dir),
            timeout: raw.timeout_secs.map_or(defaults.timeout, Duration::from_secs),
            user_agent: raw.user_agent.unwrap_or(defaults.user_agent),
        };
        config.validate()?;
        return Ok(config);
    }

    /// Reject values the pipeline cannot run with.
    ///
    /// # Errors
    ///
    /// Returns `Error::ConfigValue` naming the first offending key.
    pub fn validate(&self) -> Result<(), Error> {
        if self.canvas_max == 0 {
            return Err(Error::ConfigValue { key: "canvas_max", reason: "must be at least 1".to_string() });
        }
        if self.fetch_workers == 0 {
            return Err(Error::ConfigValue { key: "fetch_workers", reason: "must be at least 1".to_string() });
        }
        if self.rank_batch_size == 0 {
            return Err(Error::ConfigValue { key: "rank_batch_size", reason: "must be at least 1".to_string() });
        }
        if url::Url::parse(&self.base_url).is_err() {
            return Err(Error::ConfigValue { key: "base_url", reason: format!("`{}` is not a URL", self.base_url) });
        }
        if self.review_dir.as_os_str().is_empty() || self.review_dir.is_absolute() {
            return Err(Error::ConfigValue {
                key: "review_dir",
                reason: "must be a relative subdirectory of output_dir".to_string(),
            });
        }
        return Ok(());
    }
}
