//! Per-instance FIFO send queues: serialize, rate-limit, and optionally
//! prioritize message-send calls to worker processes.

pub mod config;
pub mod instance_queue;
pub mod job;
pub mod manager;

pub use config::QueueConfig;
pub use instance_queue::{InstanceQueue, QueueStatus, QueueTotals};
pub use job::{Job, QueueResponse};
pub use manager::QueueManager;

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use wag_common::GatewayError;

    use super::*;

    fn ok_job(status: u16, body: &'static str) -> Job {
        Box::pin(async move {
            Ok(QueueResponse {
                status,
                body: body.as_bytes().to_vec(),
            })
        })
    }

    fn failing_job() -> Job {
        Box::pin(async { Err(GatewayError::internal("boom")) })
    }

    #[tokio::test]
    async fn add_resolves_with_the_job_result() {
        let queue = InstanceQueue::new(QueueConfig {
            interval: Duration::from_millis(1),
            ..QueueConfig::default()
        });
        let resp = queue.add(ok_job(200, "{\"code\":\"SUCCESS\"}"), 5).await.unwrap();
        assert_eq!(resp.status, 200);
    }

    #[tokio::test]
    async fn failed_jobs_increment_failed_count() {
        let queue = InstanceQueue::new(QueueConfig {
            interval: Duration::from_millis(1),
            ..QueueConfig::default()
        });
        let err = queue.add(failing_job(), 5).await.unwrap_err();
        assert!(matches!(err, GatewayError::Internal(_)));
        let status = queue.status().await;
        assert_eq!(status.totals.failed_jobs, 1);
        assert_eq!(status.totals.completed_jobs, 0);
    }

    #[tokio::test]
    async fn successive_dispatches_are_spaced_by_the_interval() {
        let interval = Duration::from_millis(50);
        let queue = InstanceQueue::new(QueueConfig {
            interval,
            ..QueueConfig::default()
        });
        let start = tokio::time::Instant::now();
        queue.add(ok_job(200, "a"), 5).await.unwrap();
        queue.add(ok_job(200, "b"), 5).await.unwrap();
        assert!(start.elapsed() >= interval);
    }

    #[tokio::test]
    async fn add_bulk_settles_every_job_even_if_some_fail() {
        let queue = InstanceQueue::new(QueueConfig {
            interval: Duration::from_millis(1),
            ..QueueConfig::default()
        });
        let jobs = vec![ok_job(200, "a"), failing_job(), ok_job(200, "b")];
        let results = queue.add_bulk(jobs, 5).await;
        assert_eq!(results.len(), 3);
        assert!(results[0].is_ok());
        assert!(results[1].is_err());
        assert!(results[2].is_ok());
    }

    #[tokio::test]
    async fn pause_blocks_dispatch_until_resumed() {
        let queue = Arc::new(InstanceQueue::new(QueueConfig {
            interval: Duration::from_millis(1),
            ..QueueConfig::default()
        }));
        queue.pause();
        let q = queue.clone();
        let handle = tokio::spawn(async move { q.add(ok_job(200, "a"), 5).await });
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!handle.is_finished());
        queue.resume();
        let result = handle.await.unwrap();
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn manager_creates_queues_lazily_and_reuses_them() {
        let manager = Arc::new(QueueManager::new());
        let a = manager.get_or_create("hash1");
        let b = manager.get_or_create("hash1");
        assert!(Arc::ptr_eq(&a, &b));
        assert!(manager.status("hash-unknown").await.is_none());
    }

    #[tokio::test]
    async fn manager_high_priority_queue_uses_a_distinct_key() {
        let manager = QueueManager::new();
        let normal = manager.get_or_create("hash1");
        let priority = manager.get_or_create_priority("hash1", 1);
        assert!(!Arc::ptr_eq(&normal, &priority));
        assert_eq!(priority.config().concurrency, 2);
    }
}
