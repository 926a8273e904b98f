//! Workspace manager (C13): creates and cleans the per-build filesystem
//! layout under a configured root.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use pipeline_core::{Error, Result};

#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;

const SUBDIRS: &[&str] = &["artifacts", "logs", "cache", "tmp"];

/// Owns a configured root directory and lays out
/// `root/<pipeline-name>/<build-id>/{artifacts,logs,cache,tmp}`.
pub struct WorkspaceManager {
    root: PathBuf,
}

impl WorkspaceManager {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Build's top-level directory: `root/<name>/<build_id>`.
    pub fn build_dir(&self, name: &str, build_id: &str) -> PathBuf {
        self.root.join(name).join(build_id)
    }

    /// Create the build directory and its fixed subdirectories with
    /// 0755 permissions.
    pub fn create_build(&self, name: &str, build_id: &str) -> Result<PathBuf> {
        let dir = self.build_dir(name, build_id);
        for sub in SUBDIRS {
            let path = dir.join(sub);
            fs::create_dir_all(&path)
                .map_err(|e| Error::Internal(format!("create {}: {e}", path.display())))?;
            set_mode_0755(&path)?;
        }
        Ok(dir)
    }

    /// Per-job subpath: `root/<name>/<build_id>/<job>`.
    pub fn job_dir(&self, name: &str, build_id: &str, job: &str) -> PathBuf {
        self.build_dir(name, build_id).join(job)
    }

    /// Per-step subpath: `root/<name>/<build_id>/<job>/<step>`.
    pub fn step_dir(&self, name: &str, build_id: &str, job: &str, step: &str) -> PathBuf {
        self.job_dir(name, build_id, job).join(step)
    }

    pub fn ensure_dir(&self, path: &Path) -> Result<()> {
        fs::create_dir_all(path)
            .map_err(|e| Error::Internal(format!("create {}: {e}", path.display())))?;
        set_mode_0755(path)
    }

    /// Remove a build directory, refusing unless it canonicalizes to a
    /// path inside `root`.
    pub fn remove_build(&self, name: &str, build_id: &str) -> Result<()> {
        let dir = self.build_dir(name, build_id);
        self.remove_dir_checked(&dir)
    }

    fn remove_dir_checked(&self, dir: &Path) -> Result<()> {
        if !dir.exists() {
            return Ok(());
        }
        let canon_root = fs::canonicalize(&self.root)
            .map_err(|e| Error::Internal(format!("canonicalize root: {e}")))?;
        let canon_dir = fs::canonicalize(dir)
            .map_err(|e| Error::Internal(format!("canonicalize {}: {e}", dir.display())))?;
        if !canon_dir.starts_with(&canon_root) {
            return Err(Error::Internal(format!(
                "refusing to remove {}: outside workspace root",
                dir.display()
            )));
        }
        fs::remove_dir_all(&canon_dir)
            .map_err(|e| Error::Internal(format!("remove {}: {e}", canon_dir.display())))
    }

    /// Remove every build directory under `root/<name>` whose modified
    /// time is older than `max_age`.
    pub fn sweep_retention(&self, max_age: Duration) -> Result<Vec<PathBuf>> {
        let mut removed = Vec::new();
        let Ok(pipelines) = fs::read_dir(&self.root) else {
            return Ok(removed);
        };
        let now = SystemTime::now();
        for pipeline_entry in pipelines.flatten() {
            let pipeline_path = pipeline_entry.path();
            if !pipeline_path.is_dir() {
                continue;
            }
            let Ok(builds) = fs::read_dir(&pipeline_path) else {
                continue;
            };
            for build_entry in builds.flatten() {
                let build_path = build_entry.path();
                let Ok(meta) = build_entry.metadata() else {
                    continue;
                };
                let Ok(modified) = meta.modified() else {
                    continue;
                };
                let age = now.duration_since(modified).unwrap_or(Duration::ZERO);
                if age > max_age {
                    self.remove_dir_checked(&build_path)?;
                    removed.push(build_path);
                }
            }
        }
        Ok(removed)
    }
}

#[cfg(unix)]
fn set_mode_0755(path: &Path) -> Result<()> {
    let perms = fs::Permissions::from_mode(0o755);
    fs::set_permissions(path, perms)
        .map_err(|e| Error::Internal(format!("chmod {}: {e}", path.display())))
}

#[cfg(not(unix))]
fn set_mode_0755(_path: &Path) -> Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn creates_fixed_layout() {
        let root = tempdir().unwrap();
        let mgr = WorkspaceManager::new(root.path());
        let dir = mgr.create_build("p1", "build-1").unwrap();
        for sub in SUBDIRS {
            assert!(dir.join(sub).is_dir());
        }
    }

    #[test]
    fn refuses_removal_outside_root() {
        let root = tempdir().unwrap();
        let other = tempdir().unwrap();
        let mgr = WorkspaceManager::new(root.path());
        let err = mgr.remove_dir_checked(other.path());
        assert!(err.is_err());
    }

    #[test]
    fn sweep_removes_old_builds() {
        let root = tempdir().unwrap();
        let mgr = WorkspaceManager::new(root.path());
        mgr.create_build("p1", "build-old").unwrap();
        let removed = mgr.sweep_retention(Duration::from_secs(0)).unwrap();
        assert_eq!(removed.len(), 1);
        assert!(!mgr.build_dir("p1", "build-old").exists());
    }
}
