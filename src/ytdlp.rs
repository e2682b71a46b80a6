#![forbid(unsafe_code)]

//! Thin wrapper around the `yt-dlp` executable.
//!
//! Both the search provider and the fetcher go through here so the binary
//! location is configured once and tests can swap in a shell stub.

use anyhow::{Context, Result, bail};
use std::path::PathBuf;
use std::process::{Command, Output};

pub const DEFAULT_YTDLP_BIN: &str = "yt-dlp";

#[derive(Debug, Clone)]
pub struct YtDlp {
    binary: PathBuf,
}

impl Default for YtDlp {
    fn default() -> Self {
        Self::new(DEFAULT_YTDLP_BIN)
    }
}

impl YtDlp {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    pub fn command(&self) -> Command {
        Command::new(&self.binary)
    }

    /// Runs the prepared command to completion and returns its stdout.
    /// A non-zero exit is reported with whatever yt-dlp wrote to stderr.
    pub fn run(&self, mut command: Command, label: &str) -> Result<Vec<u8>> {
        let output: Output = command
            .output()
            .with_context(|| format!("launching {} for {label}", self.binary.display()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let stderr = stderr.trim();
            if stderr.is_empty() {
                bail!("yt-dlp {label} failed (status {})", output.status);
            }
            bail!("yt-dlp {label} failed (status {}): {stderr}", output.status);
        }

        Ok(output.stdout)
    }
}
