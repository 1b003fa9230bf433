//! yt-dlp backed media fetcher.
//!
//! Each request downloads into its own `request-<uuid>` file so no two requests ever
//! share (or delete) the same asset.

use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{Context, Result};
use song_queue::{FetchError, MediaAsset, MediaFetcher};
use uuid::Uuid;

/// File name prefix for every download owned by this process.
pub const DOWNLOAD_PREFIX: &str = "request-";

/// Resolved yt-dlp invocation settings.
#[derive(Debug, Clone)]
pub struct YtDlpConfig {
    pub program: String,
    pub audio_format: String,
    pub audio_quality: String,
    pub download_dir: PathBuf,
}

impl YtDlpConfig {
    /// Defaults: best audio transcoded to 192K mp3.
    pub fn new(download_dir: PathBuf) -> Self {
        Self {
            program: "yt-dlp".to_string(),
            audio_format: "mp3".to_string(),
            audio_quality: "192K".to_string(),
            download_dir,
        }
    }
}

pub struct YtDlpFetcher {
    cfg: YtDlpConfig,
}

impl YtDlpFetcher {
    /// Create the fetcher, making sure the download directory exists.
    pub fn new(cfg: YtDlpConfig) -> Result<Self> {
        std::fs::create_dir_all(&cfg.download_dir)
            .with_context(|| format!("create download dir {:?}", cfg.download_dir))?;
        Ok(Self { cfg })
    }

    fn command(&self, url: &str, stem: &str) -> Command {
        let template = self.cfg.download_dir.join(format!("{stem}.%(ext)s"));
        let mut cmd = Command::new(&self.cfg.program);
        cmd.args(["--no-playlist", "--format", "bestaudio/best", "--extract-audio"])
            .args(["--audio-format", &self.cfg.audio_format])
            .args(["--audio-quality", &self.cfg.audio_quality])
            .arg("--output")
            .arg(template)
            .args(["--print", "after_move:filepath", "--no-simulate"])
            .arg("--")
            .arg(url);
        cmd
    }
}

impl MediaFetcher for YtDlpFetcher {
    fn fetch(&self, url: &str) -> Result<MediaAsset, FetchError> {
        let stem = format!("{DOWNLOAD_PREFIX}{}", Uuid::new_v4());
        tracing::debug!(url, stem = %stem, "starting yt-dlp");
        let result = self.download(url, &stem);
        if result.is_err() {
            match remove_downloads_with_prefix(&self.cfg.download_dir, &stem) {
                Ok(0) => {}
                Ok(removed) => tracing::debug!(url, removed, "removed partial download"),
                Err(e) => tracing::warn!(url, error = %e, "failed to remove partial download"),
            }
        }
        result
    }
}

impl YtDlpFetcher {
    fn download(&self, url: &str, stem: &str) -> Result<MediaAsset, FetchError> {
        let output = self.command(url, stem).output()?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(FetchError::Failed(format!(
                "{} exited with {}: {}",
                self.cfg.program,
                output.status,
                last_line(&stderr).unwrap_or("no output")
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let path = last_line(&stdout)
            .map(PathBuf::from)
            .unwrap_or_else(|| {
                self.cfg
                    .download_dir
                    .join(format!("{stem}.{}", self.cfg.audio_format))
            });
        if !path.is_file() {
            return Err(FetchError::Failed(format!(
                "downloaded file not found: {}",
                path.display()
            )));
        }
        Ok(MediaAsset::new(path))
    }
}

fn last_line(text: &str) -> Option<&str> {
    text.lines().map(str::trim).filter(|l| !l.is_empty()).last()
}

/// Remove downloads left behind by a previous run. Returns the number of files removed.
pub fn cleanup_stale_downloads(dir: &Path) -> io::Result<usize> {
    remove_downloads_with_prefix(dir, DOWNLOAD_PREFIX)
}

fn remove_downloads_with_prefix(dir: &Path, prefix: &str) -> io::Result<usize> {
    let mut removed = 0usize;
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let file_name = entry.file_name();
        if !file_name.to_string_lossy().starts_with(prefix) {
            continue;
        }
        if std::fs::remove_file(entry.path()).is_ok() {
            removed += 1;
        }
    }
    Ok(removed)
}
