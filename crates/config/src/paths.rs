use std::path::{Path, PathBuf};

/// Resolved filesystem locations the gateway and its workers operate on.
///
/// Every field can be overridden by an environment variable; anything left
/// unset is inferred from the conventional install root (the OS data
/// directory for `wa-gateway`, or `./data` when no data directory can be
/// determined for the current platform).
#[derive(Debug, Clone)]
pub struct Paths {
    pub base_dir: PathBuf,
    pub bin_path: PathBuf,
    pub sessions_dir: PathBuf,
    pub volumes_dir: PathBuf,
}

impl Paths {
    /// Resolve paths from the process environment.
    #[must_use]
    pub fn resolve() -> Self {
        Self::resolve_with(|name| std::env::var(name).ok())
    }

    /// Resolve paths using a custom lookup function, so tests can exercise
    /// overrides without mutating the process environment.
    #[must_use]
    pub fn resolve_with(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let base_dir = lookup("APP_BASE_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(default_base_dir);

        let bin_path = lookup("BIN_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| base_dir.join("bin").join("worker"));

        let sessions_dir = lookup("SESSIONS_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| base_dir.join("sessions"));

        let volumes_dir = lookup("VOLUMES_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| base_dir.join("volumes"));

        Self {
            base_dir,
            bin_path,
            sessions_dir,
            volumes_dir,
        }
    }

    /// The per-instance session directory, `<sessionsDir>/<hash>`.
    #[must_use]
    pub fn session_path(&self, hash: &str) -> PathBuf {
        self.sessions_dir.join(hash)
    }

    /// The worker's sqlite database file within a session directory.
    #[must_use]
    pub fn session_db_path(&self, hash: &str) -> PathBuf {
        self.session_path(hash).join("whatsapp.db")
    }

    /// The worker's transient QR PNG path within a session directory.
    #[must_use]
    pub fn qr_code_path(&self, hash: &str, filename: &str) -> PathBuf {
        self.session_path(hash)
            .join("statics")
            .join("qrcode")
            .join(filename)
    }

    /// Create the session directory for `hash` if it does not already exist,
    /// with mode 0755. Idempotent.
    pub fn ensure_session_dir(&self, hash: &str) -> std::io::Result<PathBuf> {
        let path = self.session_path(hash);
        ensure_dir_mode_0755(&path)?;
        Ok(path)
    }
}

#[cfg(unix)]
fn ensure_dir_mode_0755(path: &Path) -> std::io::Result<()> {
    use std::{fs, os::unix::fs::PermissionsExt};

    fs::create_dir_all(path)?;
    fs::set_permissions(path, fs::Permissions::from_mode(0o755))
}

#[cfg(not(unix))]
fn ensure_dir_mode_0755(path: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(path)
}

fn default_base_dir() -> PathBuf {
    directories::ProjectDirs::from("", "", "wa-gateway")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("./data"))
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overrides_take_precedence_over_defaults() {
        let paths = Paths::resolve_with(|name| match name {
            "APP_BASE_DIR" => Some("/tmp/wag-base".to_string()),
            "SESSIONS_DIR" => Some("/tmp/wag-sessions".to_string()),
            _ => None,
        });
        assert_eq!(paths.base_dir, PathBuf::from("/tmp/wag-base"));
        assert_eq!(paths.sessions_dir, PathBuf::from("/tmp/wag-sessions"));
        // bin_path and volumes_dir fall back to being derived from base_dir.
        assert_eq!(paths.bin_path, PathBuf::from("/tmp/wag-base/bin/worker"));
    }

    #[test]
    fn session_paths_nest_under_sessions_dir() {
        let paths = Paths::resolve_with(|name| match name {
            "SESSIONS_DIR" => Some("/data/sessions".to_string()),
            _ => None,
        });
        assert_eq!(
            paths.session_db_path("abcdef0123456789"),
            PathBuf::from("/data/sessions/abcdef0123456789/whatsapp.db")
        );
        assert_eq!(
            paths.qr_code_path("abcdef0123456789", "x.png"),
            PathBuf::from("/data/sessions/abcdef0123456789/statics/qrcode/x.png")
        );
    }

    #[test]
    fn ensure_session_dir_is_idempotent() {
        let tmp = tempfile::tempdir().unwrap();
        let paths = Paths::resolve_with(|name| match name {
            "SESSIONS_DIR" => Some(tmp.path().to_string_lossy().into_owned()),
            _ => None,
        });
        let first = paths.ensure_session_dir("abcdef0123456789").unwrap();
        let second = paths.ensure_session_dir("abcdef0123456789").unwrap();
        assert_eq!(first, second);
        assert!(first.is_dir());
    }
}
