#![forbid(unsafe_code)]

//! Video search provider used by the resolver for free-text queries.

use anyhow::Result;
use tracing::debug;

use crate::ytdlp::YtDlp;

/// One search result. Only the identifier is needed to build a watch URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchHit {
    pub id: String,
}

pub trait VideoSearch: Send + Sync {
    /// Returns at most `max_results` hits, best match first.
    fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchHit>>;
}

/// Searches YouTube through yt-dlp's `ytsearchN:` pseudo-URL.
#[derive(Debug, Clone, Default)]
pub struct YtDlpSearch {
    ytdlp: YtDlp,
}

impl YtDlpSearch {
    pub fn new(ytdlp: YtDlp) -> Self {
        Self { ytdlp }
    }
}

impl VideoSearch for YtDlpSearch {
    fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchHit>> {
        let mut command = self.ytdlp.command();
        command
            .arg("--flat-playlist")
            .arg("--get-id")
            .arg("--no-warnings")
            .arg("--")
            .arg(format!("ytsearch{max_results}:{query}"));

        let stdout = self.ytdlp.run(command, "search")?;
        let hits = parse_ids(&String::from_utf8_lossy(&stdout), max_results);
        debug!(query, hits = hits.len(), "search finished");
        Ok(hits)
    }
}

fn parse_ids(stdout: &str, max_results: usize) -> Vec<SearchHit> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .take(max_results)
        .map(|id| SearchHit { id: id.to_owned() })
        .collect()
}
