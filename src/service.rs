#![forbid(unsafe_code)]

//! The resolve, fetch, register pipeline behind `POST /download/`.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::info;

use crate::fetcher::Downloader;
use crate::registry::ExpiryRegistry;
use crate::resolver::{ResolveError, Resolver};

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Resolve(#[from] ResolveError),
    #[error("download failed")]
    Download(#[source] anyhow::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadOutcome {
    pub filename: String,
    pub url: String,
    pub expires_at: DateTime<Utc>,
}

/// Owns every collaborator a download needs. Built once at startup and shared
/// with request handlers through `Arc`.
pub struct VideoService {
    resolver: Resolver,
    downloader: Arc<dyn Downloader>,
    registry: Arc<ExpiryRegistry>,
    public_base_url: String,
}

impl VideoService {
    pub fn new(
        resolver: Resolver,
        downloader: Arc<dyn Downloader>,
        registry: Arc<ExpiryRegistry>,
        public_base_url: &str,
    ) -> Self {
        Self {
            resolver,
            downloader,
            registry,
            public_base_url: normalize_base_url(public_base_url),
        }
    }

    pub fn registry(&self) -> &Arc<ExpiryRegistry> {
        &self.registry
    }

    pub fn public_url(&self, filename: &str) -> String {
        format!("{}{filename}", self.public_base_url)
    }

    /// Runs the whole pipeline synchronously. Callers on an async runtime
    /// must offload this to a blocking thread.
    pub fn download(&self, query: &str) -> Result<DownloadOutcome, ServiceError> {
        let url = self.resolver.resolve(query)?;
        let filename = self
            .downloader
            .download(&url)
            .map_err(ServiceError::Download)?;
        let expires_at = self.registry.register(&filename);
        info!(%url, %filename, %expires_at, "video stored");

        Ok(DownloadOutcome {
            url: self.public_url(&filename),
            filename,
            expires_at,
        })
    }
}

fn normalize_base_url(value: &str) -> String {
    let trimmed = value.trim();
    if trimmed.ends_with('/') {
        trimmed.to_owned()
    } else {
        format!("{trimmed}/")
    }
}

#[cfg(test)]
pub(crate) mod fakes {
    use std::fs;
    use std::path::PathBuf;

    use anyhow::{Result, anyhow};
    use parking_lot::Mutex;

    use crate::fetcher::Downloader;
    use crate::search::{SearchHit, VideoSearch};

    pub(crate) struct FixedSearch(pub Vec<&'static str>);

    impl VideoSearch for FixedSearch {
        fn search(&self, _query: &str, max_results: usize) -> Result<Vec<SearchHit>> {
            Ok(self
                .0
                .iter()
                .take(max_results)
                .map(|id| SearchHit { id: (*id).into() })
                .collect())
        }
    }

    /// Writes `<last path or query segment>.mp4` into `dir`, or fails.
    pub(crate) struct DiskDownloader {
        pub dir: PathBuf,
        pub fail: bool,
        pub urls: Mutex<Vec<String>>,
    }

    impl DiskDownloader {
        pub(crate) fn new(dir: PathBuf) -> Self {
            Self {
                dir,
                fail: false,
                urls: Mutex::new(Vec::new()),
            }
        }
    }

    impl Downloader for DiskDownloader {
        fn download(&self, url: &str) -> Result<String> {
            self.urls.lock().push(url.to_owned());
            if self.fail {
                return Err(anyhow!("ERROR: Video unavailable"));
            }
            let id = url
                .rsplit(['/', '='])
                .next()
                .filter(|id| !id.is_empty())
                .ok_or_else(|| anyhow!("no id in {url}"))?;
            let filename = format!("{id}.mp4");
            fs::create_dir_all(&self.dir)?;
            fs::write(self.dir.join(&filename), b"video")?;
            Ok(filename)
        }
    }
}
