#![forbid(unsafe_code)]

//! Downloads a resolved video into the storage directory.

use std::fs;
use std::path::{Component, Path, PathBuf};

use anyhow::{Context, Result, anyhow, bail};
use serde::Deserialize;
use tracing::info;

use crate::ytdlp::YtDlp;

/// yt-dlp output template: files land as `<id>.<ext>`.
const OUTPUT_TEMPLATE: &str = "%(id)s.%(ext)s";
const FORMAT_SELECTOR: &str = "best";

pub trait Downloader: Send + Sync {
    /// Blocks until the file is on disk and returns its name inside the
    /// storage directory.
    fn download(&self, url: &str) -> Result<String>;
}

pub struct YtDlpFetcher {
    ytdlp: YtDlp,
    storage_dir: PathBuf,
}

/// The only two fields of the yt-dlp info JSON the fetcher cares about.
#[derive(Deserialize)]
struct DownloadedInfo {
    id: Option<String>,
    ext: Option<String>,
}

impl YtDlpFetcher {
    pub fn new(ytdlp: YtDlp, storage_dir: impl Into<PathBuf>) -> Self {
        Self {
            ytdlp,
            storage_dir: storage_dir.into(),
        }
    }
}

impl Downloader for YtDlpFetcher {
    fn download(&self, url: &str) -> Result<String> {
        fs::create_dir_all(&self.storage_dir)
            .with_context(|| format!("creating {}", self.storage_dir.display()))?;

        // The directory goes through --paths so a `%` in it is never read as
        // a template field.
        let mut command = self.ytdlp.command();
        command
            .arg("--format")
            .arg(FORMAT_SELECTOR)
            .arg("--paths")
            .arg(format!("home:{}", self.storage_dir.to_string_lossy()))
            .arg("--output")
            .arg(OUTPUT_TEMPLATE)
            .arg("--no-playlist")
            .arg("--no-progress")
            .arg("--no-warnings")
            .arg("--no-simulate")
            .arg("--dump-single-json")
            // Everything after `--` is a URL, even if it starts with a dash.
            .arg("--")
            .arg(url);

        let stdout = self.ytdlp.run(command, "download")?;
        let info: DownloadedInfo =
            serde_json::from_slice(&stdout).context("parsing yt-dlp download metadata")?;
        let filename = filename_from_info(&info)?;
        info!(url, filename = %filename, "download finished");
        Ok(filename)
    }
}

fn filename_from_info(info: &DownloadedInfo) -> Result<String> {
    let id = non_empty(info.id.as_deref()).ok_or_else(|| anyhow!("yt-dlp reported no id"))?;
    let ext = non_empty(info.ext.as_deref()).ok_or_else(|| anyhow!("yt-dlp reported no ext"))?;
    let filename = format!("{id}.{ext}");
    if !is_single_segment(&filename) {
        bail!("yt-dlp produced an unsafe filename: {filename}");
    }
    Ok(filename)
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}

/// True when `name` is exactly one normal path component.
pub fn is_single_segment(name: &str) -> bool {
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}
