use std::{path::PathBuf, process::Stdio};

use chrono::{DateTime, Utc};
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    process::{Child, Command},
};
use tracing::{info, warn};
use wag_common::Result;
use wag_config::{GatewaySettings, Paths};

/// A worker process this supervisor owns end to end: it spawned the child
/// and therefore can wait on it directly.
pub struct OwnedWorker {
    pub child: Child,
    pub pid: u32,
}

/// A worker process that predates this gateway run (adopted during startup
/// recovery). We never spawned it, so all we can do is poll whether its pid
/// is still alive.
#[derive(Debug, Clone, Copy)]
pub struct AdoptedWorker {
    pub pid: u32,
}

/// The in-memory handle for a running child process.
pub enum WorkerHandle {
    Owned(OwnedWorker),
    Adopted(AdoptedWorker),
}

impl WorkerHandle {
    #[must_use]
    pub fn pid(&self) -> u32 {
        match self {
            Self::Owned(o) => o.pid,
            Self::Adopted(a) => a.pid,
        }
    }

    /// Non-blocking liveness check.
    pub fn is_alive(&mut self) -> bool {
        match self {
            Self::Owned(o) => matches!(o.child.try_wait(), Ok(None)),
            Self::Adopted(a) => pid_is_alive(a.pid),
        }
    }
}

/// Metadata about a running worker, independent of how we came to track it.
pub struct WorkerProcess {
    pub instance_hash: String,
    pub port: u16,
    pub started_at: DateTime<Utc>,
    pub session_path: PathBuf,
    pub handle: WorkerHandle,
}

/// Spawn the worker binary for `hash`, bound to `port`, rooted at `session_path`.
///
/// Invokes `<binaryPath> rest` with the environment variables the worker
/// wire protocol requires, and forwards its stdout/stderr line-wise to the
/// tracing subscriber tagged with the instance hash.
pub async fn spawn_worker(
    paths: &Paths,
    settings: &GatewaySettings,
    hash: &str,
    port: u16,
    session_path: PathBuf,
) -> Result<WorkerProcess> {
    let db_uri = format!("file:{}/whatsapp.db?_foreign_keys=on", session_path.display());

    let mut cmd = Command::new(&paths.bin_path);
    cmd.arg("rest")
        .current_dir(&session_path)
        .env("APP_PORT", port.to_string())
        .env(
            "APP_BASIC_AUTH",
            format!("{}:{}", settings.default_admin_user, settings.default_admin_pass),
        )
        .env("APP_DEBUG", "true")
        .env("APP_OS", "Chrome")
        .env("APP_ACCOUNT_VALIDATION", "false")
        .env("DB_URI", db_uri)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    // NODE_ENV/LOG_LEVEL are inherited from the gateway's own environment
    // rather than hardcoded, since Command inherits the parent environment
    // by default.

    let mut child = cmd
        .spawn()
        .map_err(|e| wag_common::GatewayError::internal(format!("failed to spawn worker: {e}")))?;

    let pid = child.id().unwrap_or_default();

    if let Some(stdout) = child.stdout.take() {
        let tag = hash.to_string();
        tokio::spawn(forward_lines(stdout, tag, false));
    }
    if let Some(stderr) = child.stderr.take() {
        let tag = hash.to_string();
        tokio::spawn(forward_lines(stderr, tag, true));
    }

    Ok(WorkerProcess {
        instance_hash: hash.to_string(),
        port,
        started_at: Utc::now(),
        session_path,
        handle: WorkerHandle::Owned(OwnedWorker { child, pid }),
    })
}

async fn forward_lines(reader: impl tokio::io::AsyncRead + Unpin, instance_hash: String, is_stderr: bool) {
    let mut lines = BufReader::new(reader).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if is_stderr {
                    warn!(instance = %instance_hash, "{line}");
                } else {
                    info!(instance = %instance_hash, "{line}");
                }
            },
            Ok(None) => break,
            Err(e) => {
                warn!(instance = %instance_hash, error = %e, "error reading worker output");
                break;
            },
        }
    }
}

/// Send the OS-level graceful-termination signal to `pid`.
#[cfg(unix)]
pub fn send_graceful_term(pid: u32) {
    use nix::{sys::signal::{Signal, kill}, unistd::Pid};
    let _ = kill(Pid::from_raw(pid as i32), Signal::SIGTERM);
}

#[cfg(not(unix))]
pub fn send_graceful_term(_pid: u32) {}

/// Check whether a pid is alive without sending it a signal.
#[cfg(unix)]
pub fn pid_is_alive(pid: u32) -> bool {
    use nix::{sys::signal::kill, unistd::Pid};
    kill(Pid::from_raw(pid as i32), None).is_ok()
}

#[cfg(not(unix))]
pub fn pid_is_alive(pid: u32) -> bool {
    let mut system = sysinfo::System::new();
    system.refresh_processes(sysinfo::ProcessesToUpdate::All, true);
    system.process(sysinfo::Pid::from_u32(pid)).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn current_process_is_alive() {
        assert!(pid_is_alive(std::process::id()));
    }

    #[test]
    fn an_unused_high_pid_is_not_alive() {
        // Not airtight against pid reuse, but 2^22-ish pids are never
        // assigned on the CI containers tests run in.
        assert!(!pid_is_alive(4_194_303));
    }
}
