//! Configuration loading and parsing.
//!
//! Defines the server config schema and resolves defaults.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;
use song_queue::QueueConfig;

use crate::ytdlp::YtDlpConfig;

/// Top-level server configuration loaded from TOML.
#[derive(Debug, Default, Deserialize)]
pub struct ServerConfig {
    /// Bind address (host:port).
    pub bind: Option<String>,
    /// Directory where downloaded audio is kept until it has played.
    pub download_dir: Option<String>,
    /// Request queue and playback tuning.
    pub queue: Option<QueueSettings>,
    /// yt-dlp invocation settings.
    pub fetcher: Option<FetcherSettings>,
}

/// Queue settings from TOML.
#[derive(Debug, Default, Deserialize)]
pub struct QueueSettings {
    /// Maximum queued requests (default: 50).
    pub capacity: Option<usize>,
    /// Advancer poll interval in milliseconds (default: 1000).
    pub poll_interval_ms: Option<u64>,
    /// Simulated playback length per song in seconds (default: 180).
    pub play_duration_secs: Option<u64>,
    /// Fetch attempts per request (default: 1, no retry).
    pub fetch_attempts: Option<u32>,
    /// Base delay between fetch attempts in milliseconds (default: 5000).
    pub fetch_retry_backoff_ms: Option<u64>,
}

/// Media fetcher settings from TOML.
#[derive(Debug, Default, Deserialize)]
pub struct FetcherSettings {
    /// yt-dlp executable name or path.
    pub program: Option<String>,
    /// Audio codec passed to `--audio-format` (default: mp3).
    pub audio_format: Option<String>,
    /// Quality passed to `--audio-quality` (default: 192K).
    pub audio_quality: Option<String>,
}

impl ServerConfig {
    /// Load configuration from disk.
    pub fn load(path: &Path) -> Result<Self> {
        let raw =
            std::fs::read_to_string(path).with_context(|| format!("read config {:?}", path))?;
        let cfg = toml::from_str::<ServerConfig>(&raw)
            .with_context(|| format!("parse config {:?}", path))?;
        Ok(cfg)
    }
}

/// Parse an optional bind address from config.
pub fn bind_from_config(cfg: &ServerConfig) -> Result<Option<SocketAddr>> {
    let Some(bind) = cfg.bind.as_deref() else {
        return Ok(None);
    };
    let addr = bind.parse().with_context(|| format!("parse bind {bind}"))?;
    Ok(Some(addr))
}

/// Extract the optional download directory from config.
pub fn download_dir_from_config(cfg: &ServerConfig) -> Option<PathBuf> {
    cfg.download_dir.as_deref().and_then(|path| {
        let trimmed = path.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(PathBuf::from(trimmed))
        }
    })
}

/// Resolve queue tuning, falling back to defaults for unset keys.
pub fn queue_config_from_config(cfg: &ServerConfig) -> Result<QueueConfig> {
    let defaults = QueueConfig::default();
    let Some(settings) = cfg.queue.as_ref() else {
        return Ok(defaults);
    };

    let capacity = settings.capacity.unwrap_or(defaults.capacity);
    if capacity == 0 {
        return Err(anyhow::anyhow!("queue.capacity must be greater than 0"));
    }
    let poll_interval = settings
        .poll_interval_ms
        .map(Duration::from_millis)
        .unwrap_or(defaults.poll_interval);
    if poll_interval.is_zero() {
        return Err(anyhow::anyhow!("queue.poll_interval_ms must be greater than 0"));
    }
    let fetch_attempts = settings.fetch_attempts.unwrap_or(defaults.fetch_attempts);
    if fetch_attempts == 0 {
        return Err(anyhow::anyhow!("queue.fetch_attempts must be at least 1"));
    }

    Ok(QueueConfig {
        capacity,
        poll_interval,
        play_duration: settings
            .play_duration_secs
            .map(Duration::from_secs)
            .unwrap_or(defaults.play_duration),
        fetch_attempts,
        fetch_retry_backoff: settings
            .fetch_retry_backoff_ms
            .map(Duration::from_millis)
            .unwrap_or(defaults.fetch_retry_backoff),
    })
}

/// Resolve the yt-dlp invocation for the given download directory.
pub fn fetcher_config_from_config(cfg: &ServerConfig, download_dir: PathBuf) -> YtDlpConfig {
    let defaults = YtDlpConfig::new(download_dir);
    let Some(settings) = cfg.fetcher.as_ref() else {
        return defaults;
    };
    let non_empty = |value: &Option<String>| {
        value
            .as_deref()
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    };
    YtDlpConfig {
        program: non_empty(&settings.program).unwrap_or(defaults.program),
        audio_format: non_empty(&settings.audio_format).unwrap_or(defaults.audio_format),
        audio_quality: non_empty(&settings.audio_quality).unwrap_or(defaults.audio_quality),
        download_dir: defaults.download_dir,
    }
}
