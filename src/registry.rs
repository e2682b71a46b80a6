#![forbid(unsafe_code)]

//! In-memory bookkeeping of stored files and when they must be deleted.
//!
//! Nothing here is persisted. After a restart the map starts empty and any
//! file left in the storage directory is never swept again.

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use tracing::{info, warn};

use crate::clock::Clock;

pub struct ExpiryRegistry {
    entries: Mutex<HashMap<String, DateTime<Utc>>>,
    storage_dir: PathBuf,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

/// Outcome of one sweep pass.
#[derive(Debug, Default)]
pub struct SweepReport {
    pub removed: Vec<String>,
    pub failed: Vec<(String, io::Error)>,
}

impl ExpiryRegistry {
    pub fn new(storage_dir: impl Into<PathBuf>, ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            storage_dir: storage_dir.into(),
            ttl,
            clock,
        }
    }

    pub fn storage_dir(&self) -> &Path {
        &self.storage_dir
    }

    /// Records `filename` as expiring one ttl from now, replacing any earlier
    /// deadline for the same name. A deadline past the calendar's end is
    /// pinned to the latest representable instant.
    pub fn register(&self, filename: &str) -> DateTime<Utc> {
        let expires_at = self
            .clock
            .now()
            .checked_add_signed(self.ttl)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        self.entries.lock().insert(filename.to_owned(), expires_at);
        expires_at
    }

    pub fn expires_at(&self, filename: &str) -> Option<DateTime<Utc>> {
        self.entries.lock().get(filename).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Deletes every file whose deadline has passed and forgets its entry.
    ///
    /// The lock is released before touching the filesystem. An entry whose
    /// file could not be removed stays registered and is retried next pass.
    pub fn sweep(&self) -> SweepReport {
        let now = self.clock.now();
        let expired: Vec<String> = self
            .entries
            .lock()
            .iter()
            .filter(|(_, expires_at)| now > **expires_at)
            .map(|(filename, _)| filename.clone())
            .collect();

        let mut report = SweepReport::default();
        for filename in expired {
            let path = self.storage_dir.join(&filename);
            match std::fs::remove_file(&path) {
                Ok(()) => {}
                Err(err) if err.kind() == io::ErrorKind::NotFound => {}
                Err(err) => {
                    warn!(file = %path.display(), error = %err, "could not delete expired file");
                    report.failed.push((filename, err));
                    continue;
                }
            }
            self.forget_if_expired(&filename, now);
            report.removed.push(filename);
        }

        if !report.removed.is_empty() || !report.failed.is_empty() {
            info!(
                removed = report.removed.len(),
                failed = report.failed.len(),
                remaining = self.len(),
                "expiry sweep finished"
            );
        }
        report
    }

    // A concurrent register() may have pushed the deadline out while the file
    // was being deleted; keep the fresh entry in that case.
    fn forget_if_expired(&self, filename: &str, now: DateTime<Utc>) {
        let mut entries = self.entries.lock();
        if entries
            .get(filename)
            .is_some_and(|expires_at| now > *expires_at)
        {
            entries.remove(filename);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::TimeZone;
    use std::fs;
    use tempfile::tempdir;

    struct RegistryTestContext {
        _temp: tempfile::TempDir,
        clock: Arc<ManualClock>,
        registry: ExpiryRegistry,
    }

    impl RegistryTestContext {
        fn new() -> Self {
            let temp = tempdir().unwrap();
            let start = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
            let clock = Arc::new(ManualClock::new(start));
            let registry = ExpiryRegistry::new(temp.path(), Duration::hours(24), clock.clone());
            Self {
                _temp: temp,
                clock,
                registry,
            }
        }

        fn store(&self, filename: &str) -> PathBuf {
            let path = self.registry.storage_dir().join(filename);
            fs::write(&path, b"video").unwrap();
            self.registry.register(filename);
            path
        }
    }

    #[test]
    fn register_sets_deadline_one_day_out() {
        let ctx = RegistryTestContext::new();
        let now = ctx.clock.now();
        let expires_at = ctx.registry.register("abc.mp4");
        assert_eq!(expires_at, now + Duration::hours(24));
        assert_eq!(ctx.registry.expires_at("abc.mp4"), Some(expires_at));
        assert_eq!(ctx.registry.len(), 1);
    }

    #[test]
    fn register_again_pushes_deadline() {
        let ctx = RegistryTestContext::new();
        let first = ctx.registry.register("abc.mp4");
        ctx.clock.advance(Duration::hours(3));
        let second = ctx.registry.register("abc.mp4");
        assert_eq!(second - first, Duration::hours(3));
        assert_eq!(ctx.registry.len(), 1);
    }

    #[test]
    fn register_with_huge_ttl_saturates() {
        let temp = tempdir().unwrap();
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let registry = ExpiryRegistry::new(temp.path(), Duration::MAX, clock.clone());

        let expires_at = registry.register("forever.mp4");
        assert_eq!(expires_at, DateTime::<Utc>::MAX_UTC);

        clock.advance(Duration::days(365));
        assert!(registry.sweep().removed.is_empty());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn sweep_deletes_expired_files_and_entries() {
        let ctx = RegistryTestContext::new();
        let path = ctx.store("old.mp4");
        ctx.clock.advance(Duration::hours(24) + Duration::seconds(1));

        let report = ctx.registry.sweep();
        assert_eq!(report.removed, vec!["old.mp4".to_string()]);
        assert!(report.failed.is_empty());
        assert!(!path.exists());
        assert!(ctx.registry.is_empty());
    }

    #[test]
    fn sweep_keeps_entries_not_yet_expired() {
        let ctx = RegistryTestContext::new();
        let old = ctx.store("old.mp4");
        ctx.clock.advance(Duration::hours(12));
        let fresh = ctx.store("fresh.mp4");
        ctx.clock.advance(Duration::hours(13));

        let report = ctx.registry.sweep();
        assert_eq!(report.removed, vec!["old.mp4".to_string()]);
        assert!(!old.exists());
        assert!(fresh.exists());
        assert!(ctx.registry.expires_at("fresh.mp4").is_some());
    }

    #[test]
    fn sweep_at_exact_deadline_keeps_entry() {
        let ctx = RegistryTestContext::new();
        let path = ctx.store("edge.mp4");
        ctx.clock.advance(Duration::hours(24));

        let report = ctx.registry.sweep();
        assert!(report.removed.is_empty());
        assert!(path.exists());
        assert_eq!(ctx.registry.len(), 1);
    }

    #[test]
    fn sweep_tolerates_files_already_gone() {
        let ctx = RegistryTestContext::new();
        ctx.registry.register("ghost.mp4");
        ctx.clock.advance(Duration::days(2));

        let report = ctx.registry.sweep();
        assert_eq!(report.removed, vec!["ghost.mp4".to_string()]);
        assert!(ctx.registry.is_empty());
    }

    #[test]
    fn sweep_keeps_entry_when_delete_fails() {
        let ctx = RegistryTestContext::new();
        // A directory cannot be removed with remove_file.
        fs::create_dir(ctx.registry.storage_dir().join("stuck.mp4")).unwrap();
        ctx.registry.register("stuck.mp4");
        ctx.clock.advance(Duration::days(2));

        let report = ctx.registry.sweep();
        assert!(report.removed.is_empty());
        assert_eq!(report.failed.len(), 1);
        assert_eq!(ctx.registry.len(), 1);
    }
}
