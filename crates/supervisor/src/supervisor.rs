use std::{sync::Arc, time::Duration};

use dashmap::DashMap;
use tokio::sync::{Mutex, broadcast};
use tracing::{error, info, warn};
use wag_common::{GatewayError, InstanceStatus, Result};
use wag_config::{GatewaySettings, Paths};
use wag_store::{InstanceUpdate, SqliteInstanceStore};

use crate::{
    events::SupervisorEvent,
    process::{self, WorkerHandle, WorkerProcess},
};

/// How long [`WorkerSupervisor::stop`] waits for a graceful exit before
/// escalating to a forcible kill, unless the caller asks for a different
/// duration.
pub const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(10);

/// A point-in-time view of a running worker, for [`WorkerSupervisor::list_all`].
#[derive(Debug, Clone)]
pub struct WorkerSnapshot {
    pub instance_hash: String,
    pub pid: u32,
    pub port: u16,
    pub started_at: chrono::DateTime<chrono::Utc>,
}

/// Owns the lifecycle of every worker process referenced by the instance
/// store: spawning, health checking, and tearing down.
///
/// Operations on a single instance hash serialize against each other via a
/// per-hash async mutex; operations on different hashes proceed
/// independently.
pub struct WorkerSupervisor {
    store: Arc<SqliteInstanceStore>,
    paths: Arc<Paths>,
    settings: Arc<GatewaySettings>,
    handles: DashMap<String, Arc<Mutex<Option<WorkerProcess>>>>,
    events: broadcast::Sender<SupervisorEvent>,
}

impl WorkerSupervisor {
    #[must_use]
    pub fn new(store: Arc<SqliteInstanceStore>, paths: Arc<Paths>, settings: Arc<GatewaySettings>) -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            store,
            paths,
            settings,
            handles: DashMap::new(),
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SupervisorEvent> {
        self.events.subscribe()
    }

    fn lock_for(&self, hash: &str) -> Arc<Mutex<Option<WorkerProcess>>> {
        self.handles
            .entry(hash.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(None)))
            .clone()
    }

    /// Spawn a new worker for `hash`. Errors with a validation error if one
    /// is already running; errors with `InstanceNotFound` if the instance
    /// doesn't exist; sets status to `error` on a spawn failure.
    pub async fn start(&self, hash: &str) -> Result<()> {
        let lock = self.lock_for(hash);
        let mut guard = lock.lock().await;

        if let Some(worker) = guard.as_mut()
            && worker.handle.is_alive()
        {
            return Err(GatewayError::ValidationError(
                "worker already exists for this instance".to_string(),
            ));
        }
        *guard = None;

        let instance = self
            .store
            .find_by_hash(hash)
            .await?
            .ok_or(GatewayError::InstanceNotFound)?;
        let port = instance
            .port
            .ok_or_else(|| GatewayError::internal("instance has no allocated port"))?;

        let session_path = self
            .paths
            .ensure_session_dir(hash)
            .map_err(|e| GatewayError::internal(format!("failed to create session dir: {e}")))?;

        let worker = match process::spawn_worker(&self.paths, &self.settings, hash, port, session_path).await {
            Ok(w) => w,
            Err(e) => {
                self.mark_error(hash).await;
                return Err(e);
            },
        };

        let pid = worker.handle.pid();
        if let Err(e) = self
            .store
            .update(hash, InstanceUpdate {
                status: Some(InstanceStatus::Active),
                container_id: Some(Some(pid.to_string())),
                ..Default::default()
            })
            .await
        {
            self.mark_error(hash).await;
            return Err(e);
        }

        info!(instance = hash, pid, port, "worker started");
        *guard = Some(worker);
        drop(guard);

        let _ = self.events.send(SupervisorEvent::Started {
            hash: hash.to_string(),
            port,
        });
        Ok(())
    }

    /// Gracefully stop the worker for `hash`, escalating to a forcible kill
    /// after `timeout`. Idempotent: stopping an instance with no live
    /// handle succeeds without doing anything.
    pub async fn stop(&self, hash: &str, timeout: Duration) -> Result<()> {
        let lock = self.lock_for(hash);
        let mut guard = lock.lock().await;

        let Some(mut worker) = guard.take() else {
            return Ok(());
        };

        match &mut worker.handle {
            WorkerHandle::Owned(owned) => {
                process::send_graceful_term(owned.pid);
                let exited = tokio::time::timeout(timeout, owned.child.wait()).await;
                if exited.is_err() || matches!(exited, Ok(Err(_))) {
                    warn!(instance = hash, "worker did not exit gracefully, killing");
                    let _ = owned.child.kill().await;
                    if tokio::time::timeout(Duration::from_secs(5), owned.child.wait())
                        .await
                        .is_err()
                    {
                        self.mark_error(hash).await;
                        return Err(GatewayError::internal("worker did not exit after force kill"));
                    }
                }
            },
            WorkerHandle::Adopted(adopted) => {
                process::send_graceful_term(adopted.pid);
                let deadline = tokio::time::Instant::now() + timeout;
                while tokio::time::Instant::now() < deadline && process::pid_is_alive(adopted.pid) {
                    tokio::time::sleep(Duration::from_millis(100)).await;
                }
                if process::pid_is_alive(adopted.pid) {
                    force_kill(adopted.pid);
                }
            },
        }

        self.store
            .update(hash, InstanceUpdate {
                status: Some(InstanceStatus::Stopped),
                container_id: Some(None),
                ..Default::default()
            })
            .await?;
        info!(instance = hash, "worker stopped");
        Ok(())
    }

    pub async fn restart(&self, hash: &str, timeout: Duration) -> Result<()> {
        self.stop(hash, timeout).await?;
        self.start(hash).await
    }

    /// Snapshot every live worker this supervisor currently tracks.
    pub fn list_all(&self) -> Vec<WorkerSnapshot> {
        self.handles
            .iter()
            .filter_map(|entry| {
                // try_lock: a worker mid start/stop just won't show up in this
                // snapshot, which is fine for a best-effort listing.
                let guard = entry.value().try_lock().ok()?;
                let worker = guard.as_ref()?;
                Some(WorkerSnapshot {
                    instance_hash: worker.instance_hash.clone(),
                    pid: worker.handle.pid(),
                    port: worker.port,
                    started_at: worker.started_at,
                })
            })
            .collect()
    }

    /// Startup recovery: for each instance in the store, adopt a still-alive
    /// pid, resume a session that was previously active, or mark the
    /// instance stopped.
    pub async fn recover(&self) -> Result<()> {
        let instances = self.store.list_all().await?;
        for instance in instances {
            let hash = instance.hash.clone();

            if let Some(pid_str) = &instance.container_id
                && let Ok(pid) = pid_str.parse::<u32>()
                && process::pid_is_alive(pid)
            {
                info!(instance = %hash, pid, "adopting live worker from previous run");
                let lock = self.lock_for(&hash);
                let mut guard = lock.lock().await;
                *guard = Some(WorkerProcess {
                    instance_hash: hash.clone(),
                    port: instance.port.unwrap_or_default(),
                    started_at: instance.updated_at,
                    session_path: self.paths.session_path(&hash),
                    handle: WorkerHandle::Adopted(process::AdoptedWorker { pid }),
                });
                continue;
            }

            if self.paths.session_db_path(&hash).exists() {
                info!(instance = %hash, "resuming session from prior run");
                if let Err(e) = self.start(&hash).await {
                    warn!(instance = %hash, error = %e, "failed to resume session on startup");
                }
                continue;
            }

            let _ = self
                .store
                .update(&hash, InstanceUpdate {
                    status: Some(InstanceStatus::Stopped),
                    container_id: Some(None),
                    ..Default::default()
                })
                .await;
        }
        Ok(())
    }

    /// Run the periodic health check forever. Intended to be spawned as its
    /// own task and aborted on shutdown.
    pub async fn run_health_check_loop(self: Arc<Self>, interval: Duration) {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await; // first tick fires immediately; skip it.
        loop {
            ticker.tick().await;
            self.health_check_once().await;
        }
    }

    /// Check every tracked worker once; dead ones are cleared and their
    /// instance marked `error`, with a `process-stopped` event emitted.
    pub async fn health_check_once(&self) {
        let hashes: Vec<String> = self.handles.iter().map(|e| e.key().clone()).collect();
        for hash in hashes {
            let lock = self.lock_for(&hash);
            let mut guard = lock.lock().await;
            let Some(worker) = guard.as_mut() else { continue };
            if worker.handle.is_alive() {
                continue;
            }
            warn!(instance = %hash, "worker found dead during health check");
            *guard = None;
            drop(guard);
            self.mark_error(&hash).await;
            let _ = self.events.send(SupervisorEvent::ProcessStopped { hash });
        }
    }

    async fn mark_error(&self, hash: &str) {
        if let Err(e) = self
            .store
            .update(hash, InstanceUpdate {
                status: Some(InstanceStatus::Error),
                ..Default::default()
            })
            .await
        {
            error!(instance = hash, error = %e, "failed to mark instance errored");
        }
    }

    /// Stop every tracked worker with the default timeout. Used by graceful
    /// shutdown.
    pub async fn stop_all(&self, timeout: Duration) {
        let hashes: Vec<String> = self.handles.iter().map(|e| e.key().clone()).collect();
        for hash in hashes {
            if let Err(e) = self.stop(&hash, timeout).await {
                error!(instance = %hash, error = %e, "error stopping worker during shutdown");
            }
        }
    }
}

#[cfg(unix)]
fn force_kill(pid: u32) {
    use nix::{
        sys::signal::{Signal, kill},
        unistd::Pid,
    };
    let _ = kill(Pid::from_raw(pid as i32), Signal::SIGKILL);
}

#[cfg(not(unix))]
fn force_kill(_pid: u32) {}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use sqlx::sqlite::SqlitePoolOptions;
    use wag_store::PortAllocator;

    use super::*;

    async fn test_supervisor() -> WorkerSupervisor {
        let pool = SqlitePoolOptions::new()
            .connect(":memory:")
            .await
            .expect("in-memory sqlite pool");
        SqliteInstanceStore::init(&pool).await.expect("init schema");
        let ports = Arc::new(PortAllocator::new(8000, 100));
        let store = Arc::new(SqliteInstanceStore::new(pool, ports));
        let tmp = tempfile::tempdir().expect("tempdir");
        let paths = Arc::new(Paths::resolve_with(move |name| match name {
            "APP_BASE_DIR" => Some(tmp.path().to_string_lossy().into_owned()),
            _ => None,
        }));
        let settings = Arc::new(GatewaySettings::default());
        WorkerSupervisor::new(store, paths, settings)
    }

    #[tokio::test]
    async fn stopping_an_untracked_instance_is_a_no_op() {
        let supervisor = test_supervisor().await;
        supervisor
            .stop("deadbeefdeadbeef", Duration::from_millis(50))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn list_all_is_empty_with_no_workers() {
        let supervisor = test_supervisor().await;
        assert!(supervisor.list_all().is_empty());
    }

    #[tokio::test]
    async fn lock_for_returns_the_same_mutex_for_the_same_hash() {
        let supervisor = test_supervisor().await;
        let a = supervisor.lock_for("abc");
        let b = supervisor.lock_for("abc");
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[tokio::test]
    async fn starting_an_unknown_instance_fails_with_not_found() {
        let supervisor = test_supervisor().await;
        let err = supervisor.start("0000000000000000").await.unwrap_err();
        assert!(matches!(err, GatewayError::InstanceNotFound));
    }

    #[tokio::test]
    async fn recover_with_no_instances_is_a_no_op() {
        let supervisor = test_supervisor().await;
        supervisor.recover().await.unwrap();
        assert!(supervisor.list_all().is_empty());
    }
}
