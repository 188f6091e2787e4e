use std::{sync::Arc, time::Duration};

use dashmap::DashMap;
use tracing::info;

use crate::{config::QueueConfig, instance_queue::{InstanceQueue, QueueStatus}, job::{Job, QueueResponse}};
use wag_common::Result;

const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(30 * 60);

/// Owns every instance's send queue, creating them lazily and sweeping idle
/// ones away on a timer.
pub struct QueueManager {
    queues: DashMap<String, Arc<InstanceQueue>>,
}

impl Default for QueueManager {
    fn default() -> Self {
        Self::new()
    }
}

impl QueueManager {
    #[must_use]
    pub fn new() -> Self {
        Self { queues: DashMap::new() }
    }

    fn get_or_create_with(&self, key: &str, config: QueueConfig) -> Arc<InstanceQueue> {
        self.queues
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(InstanceQueue::new(config)))
            .clone()
    }

    /// The default per-instance queue, created on first use.
    #[must_use]
    pub fn get_or_create(&self, hash: &str) -> Arc<InstanceQueue> {
        self.get_or_create_with(hash, QueueConfig::default())
    }

    /// An on-demand high-priority queue under `<hash>-priority-<n>`.
    #[must_use]
    pub fn get_or_create_priority(&self, hash: &str, tier: u32) -> Arc<InstanceQueue> {
        let key = format!("{hash}-priority-{tier}");
        self.get_or_create_with(&key, QueueConfig::high_priority())
    }

    pub async fn add(&self, hash: &str, job: Job, priority: i32) -> Result<QueueResponse> {
        self.get_or_create(hash).add(job, priority).await
    }

    pub fn pause(&self, hash: &str) {
        if let Some(queue) = self.queues.get(hash) {
            queue.pause();
        }
    }

    pub fn resume(&self, hash: &str) {
        if let Some(queue) = self.queues.get(hash) {
            queue.resume();
        }
    }

    pub async fn clear(&self, hash: &str) {
        if let Some(queue) = self.queues.get(hash) {
            queue.clear().await;
        }
    }

    /// Remove the queue entirely, dropping its dispatcher task.
    pub fn remove(&self, hash: &str) {
        self.queues.remove(hash);
    }

    pub async fn status(&self, hash: &str) -> Option<QueueStatus> {
        let queue = self.queues.get(hash)?.clone();
        Some(queue.status().await)
    }

    /// Run forever, removing any queue idle for longer than its configured
    /// `max_idle_time`. Intended to be spawned as its own task.
    pub async fn run_idle_sweep_loop(self: Arc<Self>) {
        self.run_idle_sweep_loop_with(DEFAULT_SWEEP_INTERVAL).await;
    }

    pub async fn run_idle_sweep_loop_with(self: Arc<Self>, sweep_interval: Duration) {
        let mut ticker = tokio::time::interval(sweep_interval);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            self.sweep_once().await;
        }
    }

    pub async fn sweep_once(&self) {
        let keys: Vec<String> = self.queues.iter().map(|e| e.key().clone()).collect();
        for key in keys {
            let Some(queue) = self.queues.get(&key).map(|e| e.clone()) else {
                continue;
            };
            if queue.is_idle(queue.config().max_idle_time).await {
                self.queues.remove(&key);
                info!(queue = %key, "removed idle send queue");
            }
        }
    }
}
