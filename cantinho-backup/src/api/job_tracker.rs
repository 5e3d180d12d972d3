//! Tracking of in-flight backup and restore operations.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tokio::task::JoinError;

/// Kind of a running operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    Backup,
    Restore,
}

impl OperationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            OperationKind::Backup => "backup",
            OperationKind::Restore => "restore",
        }
    }
}

/// Tracks running operations so health checks and shutdown can see them.
///
/// Purely observational: overlapping operations are neither queued nor rejected.
#[derive(Clone)]
pub struct JobTracker {
    jobs: Arc<RwLock<HashMap<u64, (OperationKind, Instant)>>>,
    next_id: Arc<AtomicU64>,
}

impl JobTracker {
    pub fn new() -> Self {
        Self {
            jobs: Arc::new(RwLock::new(HashMap::new())),
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Register a new operation and return its id
    pub async fn begin(&self, kind: OperationKind) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut jobs = self.jobs.write().await;
        if !jobs.is_empty() {
            tracing::warn!(
                operation = kind.as_str(),
                running = jobs.len(),
                "Starting an operation while others are still running against the same database"
            );
        }
        jobs.insert(id, (kind, Instant::now()));
        id
    }

    /// Remove an operation from tracking once it has finished
    pub async fn complete(&self, id: u64) {
        let mut jobs = self.jobs.write().await;
        if let Some((kind, started)) = jobs.remove(&id) {
            tracing::debug!(
                operation = kind.as_str(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Operation finished"
            );
        }
    }

    /// Run `work` on its own task as a tracked operation.
    ///
    /// The operation is completed once the task ends, even if it panicked
    /// or the caller stopped waiting for it.
    pub async fn spawn_tracked<F>(&self, kind: OperationKind, work: F) -> Result<F::Output, JoinError>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        let id = self.begin(kind).await;
        let tracker = self.clone();
        tokio::spawn(async move {
            let outcome = tokio::spawn(work).await;
            tracker.complete(id).await;
            outcome
        })
        .await
        .and_then(|outcome| outcome)
    }

    /// Get count of running operations
    pub async fn running_count(&self) -> usize {
        let jobs = self.jobs.read().await;
        jobs.len()
    }

    /// Wait until nothing is running or `limit` elapses. Returns true when idle.
    pub async fn wait_idle(&self, limit: Duration) -> bool {
        let deadline = Instant::now() + limit;
        loop {
            if self.running_count().await == 0 {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }
}

impl Default for JobTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_begin_and_complete() {
        let tracker = JobTracker::new();
        let backup = tracker.begin(OperationKind::Backup).await;
        let restore = tracker.begin(OperationKind::Restore).await;
        assert_ne!(backup, restore);
        assert_eq!(tracker.running_count().await, 2);

        tracker.complete(backup).await;
        tracker.complete(backup).await;
        assert_eq!(tracker.running_count().await, 1);

        tracker.complete(restore).await;
        assert_eq!(tracker.running_count().await, 0);
    }

    #[tokio::test]
    async fn test_spawn_tracked_returns_output() {
        let tracker = JobTracker::new();
        let observer = tracker.clone();
        let value = tracker
            .spawn_tracked(OperationKind::Backup, async move { observer.running_count().await })
            .await
            .unwrap();
        assert_eq!(value, 1);
        assert_eq!(tracker.running_count().await, 0);
    }

    #[tokio::test]
    async fn test_spawn_tracked_completes_after_panic() {
        let tracker = JobTracker::new();
        let result = tracker
            .spawn_tracked(OperationKind::Restore, async {
                panic!("restore blew up");
            })
            .await;
        assert!(result.unwrap_err().is_panic());
        assert_eq!(tracker.running_count().await, 0);
        assert!(tracker.wait_idle(Duration::from_millis(10)).await);
    }

    #[tokio::test]
    async fn test_spawn_tracked_completes_when_caller_gives_up() {
        let tracker = JobTracker::new();
        let waiting = tracker.spawn_tracked(OperationKind::Restore, async {
            tokio::time::sleep(Duration::from_millis(100)).await;
        });
        // Caller drops the future while the work is still running
        assert!(tokio::time::timeout(Duration::from_millis(20), waiting).await.is_err());
        assert_eq!(tracker.running_count().await, 1);
        assert!(tracker.wait_idle(Duration::from_secs(5)).await);
    }

    #[tokio::test]
    async fn test_wait_idle() {
        let tracker = JobTracker::new();
        assert!(tracker.wait_idle(Duration::from_millis(10)).await);

        let id = tracker.begin(OperationKind::Restore).await;
        assert!(!tracker.wait_idle(Duration::from_millis(150)).await);

        let finisher = tracker.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            finisher.complete(id).await;
        });
        assert!(tracker.wait_idle(Duration::from_secs(5)).await);
    }
}
