#![forbid(unsafe_code)]

//! Background task that periodically sweeps the expiry registry.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tracing::{debug, info, warn};

use crate::config::MAX_SWEEP_INTERVAL_SECS;
use crate::registry::ExpiryRegistry;

const MIN_INTERVAL: Duration = Duration::from_millis(1);
const MAX_INTERVAL: Duration = Duration::from_secs(MAX_SWEEP_INTERVAL_SECS);

/// Handle to the running sweep loop. Dropping it also stops the loop, but
/// only [`Janitor::shutdown`] waits for an in-flight sweep to finish.
pub struct Janitor {
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl Janitor {
    /// Starts the loop on the current tokio runtime. The first sweep happens
    /// one full `every` after the call, not immediately. `every` is clamped
    /// to between one millisecond and the configured maximum.
    pub fn spawn(registry: Arc<ExpiryRegistry>, every: Duration) -> Self {
        let every = clamp_interval(every);
        let (stop, mut stopped) = watch::channel(false);
        let task = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + every, every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            info!(interval_secs = every.as_secs(), "janitor started");

            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    _ = stopped.changed() => break,
                }

                let registry = registry.clone();
                match tokio::task::spawn_blocking(move || registry.sweep()).await {
                    Ok(report) => debug!(removed = report.removed.len(), "janitor pass done"),
                    Err(err) => warn!(error = %err, "janitor sweep panicked"),
                }
            }

            info!("janitor stopped");
        });

        Self { stop, task }
    }

    pub async fn shutdown(self) {
        let _ = self.stop.send(true);
        if let Err(err) = self.task.await {
            warn!(error = %err, "janitor task ended abnormally");
        }
    }
}

fn clamp_interval(every: Duration) -> Duration {
    every.clamp(MIN_INTERVAL, MAX_INTERVAL)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::{Duration as ChronoDuration, Utc};
    use tempfile::tempdir;

    #[tokio::test]
    async fn janitor_sweeps_expired_entries_on_its_interval() {
        let temp = tempdir().unwrap();
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let registry = Arc::new(ExpiryRegistry::new(
            temp.path(),
            ChronoDuration::hours(24),
            clock.clone(),
        ));
        let file = temp.path().join("old.mp4");
        std::fs::write(&file, b"video").unwrap();
        registry.register("old.mp4");
        clock.advance(ChronoDuration::days(2));

        let janitor = Janitor::spawn(registry.clone(), Duration::from_millis(20));
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while !registry.is_empty() && std::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        janitor.shutdown().await;

        assert!(registry.is_empty());
        assert!(!file.exists());
    }

    #[tokio::test]
    async fn janitor_does_not_sweep_before_first_interval() {
        let temp = tempdir().unwrap();
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let registry = Arc::new(ExpiryRegistry::new(
            temp.path(),
            ChronoDuration::hours(24),
            clock.clone(),
        ));
        registry.register("old.mp4");
        clock.advance(ChronoDuration::days(2));

        let janitor = Janitor::spawn(registry.clone(), Duration::from_secs(3600));
        tokio::time::sleep(Duration::from_millis(50)).await;
        janitor.shutdown().await;

        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn interval_is_clamped() {
        assert_eq!(clamp_interval(Duration::ZERO), MIN_INTERVAL);
        assert_eq!(clamp_interval(Duration::MAX), MAX_INTERVAL);
        assert_eq!(
            clamp_interval(Duration::from_secs(60)),
            Duration::from_secs(60)
        );
    }

    #[tokio::test]
    async fn janitor_with_huge_interval_starts_and_stops() {
        let temp = tempdir().unwrap();
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let registry = Arc::new(ExpiryRegistry::new(
            temp.path(),
            ChronoDuration::hours(24),
            clock.clone(),
        ));
        registry.register("old.mp4");
        clock.advance(ChronoDuration::days(2));

        let janitor = Janitor::spawn(registry.clone(), Duration::MAX);
        tokio::time::sleep(Duration::from_millis(20)).await;
        janitor.shutdown().await;

        assert_eq!(registry.len(), 1);
    }
}
