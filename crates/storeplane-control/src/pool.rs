//! Supervised pool for background lifecycle jobs.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio_util::task::TaskTracker;
use tracing::{Instrument, debug, error, info_span};

use crate::error::{ControlError, ControlResult};
use crate::types::StoreId;

/// Runs provisioning and deletion jobs with bounded concurrency.
///
/// Jobs are accepted immediately and wait for a permit inside their own task,
/// so submitting never blocks a request handler. Every job is named and
/// carries its store ID; a job that returns an error is logged with both.
#[derive(Debug, Clone)]
pub struct TaskPool {
    permits: Arc<Semaphore>,
    tracker: TaskTracker,
}

impl TaskPool {
    /// Create a pool running at most `max_concurrent` jobs at once.
    #[must_use]
    pub fn new(max_concurrent: usize) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
            tracker: TaskTracker::new(),
        }
    }

    /// Submit a job.
    ///
    /// Fails if the pool has been shut down.
    pub fn submit<F>(&self, job: &'static str, store_id: &StoreId, fut: F) -> ControlResult<()>
    where
        F: Future<Output = ControlResult<()>> + Send + 'static,
    {
        if self.tracker.is_closed() {
            return Err(ControlError::internal("task pool is shut down"));
        }

        let permits = Arc::clone(&self.permits);
        let span = info_span!("job", job, store_id = %store_id);
        let store_id = store_id.clone();

        self.tracker.spawn(
            async move {
                let Ok(_permit) = permits.acquire_owned().await else {
                    error!("task pool semaphore closed");
                    return;
                };

                debug!("job started");
                match fut.await {
                    Ok(()) => debug!("job finished"),
                    Err(e) => error!(store_id = %store_id, error = %e, "job failed"),
                }
            }
            .instrument(span),
        );

        Ok(())
    }

    /// Number of jobs queued or running.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.tracker.len()
    }

    /// Stop accepting jobs and wait for in-flight ones to finish.
    pub async fn shutdown(&self) {
        self.tracker.close();
        self.tracker.wait().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn runs_jobs_and_waits_on_shutdown() {
        let pool = TaskPool::new(2);
        let done = Arc::new(AtomicUsize::new(0));

        for _ in 0..5 {
            let done = Arc::clone(&done);
            pool.submit("test", &StoreId::new("s1"), async move {
                tokio::time::sleep(Duration::from_millis(10)).await;
                done.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .unwrap();
        }

        pool.shutdown().await;
        assert_eq!(done.load(Ordering::SeqCst), 5);
        assert_eq!(pool.in_flight(), 0);
    }

    #[tokio::test]
    async fn bounds_concurrency() {
        let pool = TaskPool::new(2);
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        for _ in 0..6 {
            let running = Arc::clone(&running);
            let peak = Arc::clone(&peak);
            pool.submit("test", &StoreId::new("s1"), async move {
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(20)).await;
                running.fetch_sub(1, Ordering::SeqCst);
                Ok(())
            })
            .unwrap();
        }

        pool.shutdown().await;
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn failed_job_does_not_poison_pool() {
        let pool = TaskPool::new(1);
        pool.submit("failing", &StoreId::new("s1"), async {
            Err(ControlError::deployment("helm exited 1"))
        })
        .unwrap();

        let done = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&done);
        pool.submit("ok", &StoreId::new("s2"), async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .unwrap();

        pool.shutdown().await;
        assert_eq!(done.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn rejects_after_shutdown() {
        let pool = TaskPool::new(1);
        pool.shutdown().await;

        let result = pool.submit("late", &StoreId::new("s1"), async { Ok(()) });
        assert!(result.is_err());
    }
}
