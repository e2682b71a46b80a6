#![forbid(unsafe_code)]

//! Turns a user query into a video URL the fetcher can download.

use std::sync::Arc;

use thiserror::Error;
use tracing::debug;

use crate::search::VideoSearch;

/// Queries containing one of these substrings are treated as direct links.
pub const RECOGNIZED_HOSTS: &[&str] = &["youtube.com", "youtu.be"];

const WATCH_URL_PREFIX: &str = "https://www.youtube.com/watch?v=";

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("Video not found")]
    NotFound,
    #[error("search failed")]
    Search(#[source] anyhow::Error),
}

#[derive(Clone)]
pub struct Resolver {
    search: Arc<dyn VideoSearch>,
}

impl Resolver {
    pub fn new(search: Arc<dyn VideoSearch>) -> Self {
        Self { search }
    }

    pub fn resolve(&self, query: &str) -> Result<String, ResolveError> {
        if is_direct_url(query) {
            debug!(query, "query is a direct video url");
            return Ok(query.to_owned());
        }

        let hits = self
            .search
            .search(query, 1)
            .map_err(ResolveError::Search)?;
        let top = hits.into_iter().next().ok_or(ResolveError::NotFound)?;
        Ok(watch_url(&top.id))
    }
}

pub fn is_direct_url(query: &str) -> bool {
    RECOGNIZED_HOSTS.iter().any(|host| query.contains(host))
}

pub fn watch_url(video_id: &str) -> String {
    format!("{WATCH_URL_PREFIX}{video_id}")
}
