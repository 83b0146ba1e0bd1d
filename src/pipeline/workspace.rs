//! Per-request scratch directories.
//!
//! Each request gets its own randomly named directory under the scratch
//! root. Nothing else ever writes there, so two concurrent uploads of
//! `report.docx` cannot see each other's files. The caller-supplied filename
//! never reaches the filesystem: input is staged as `input.<ext>`.
//!
//! A [`Workspace`] is removed exactly once. [`Workspace::destroy`] is
//! idempotent, and dropping an undestroyed workspace removes it too, so a
//! panic or a cancelled request future cannot leak a directory.

use crate::error::ConvertError;
use crate::observer::ObserverHandle;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, warn};

/// Directory-name prefix for workspaces under the scratch root.
pub const WORKSPACE_PREFIX: &str = "convgate-";

/// Stem of the staged input file.
pub const INPUT_STEM: &str = "input";

/// An isolated directory owned by one in-flight request.
pub struct Workspace {
    path: PathBuf,
    dir: Option<TempDir>,
    observer: Option<ObserverHandle>,
}

impl Workspace {
    /// Allocate a fresh, uniquely named directory under `scratch_root`.
    pub fn create(
        scratch_root: &Path,
        observer: Option<ObserverHandle>,
    ) -> Result<Self, ConvertError> {
        let dir = tempfile::Builder::new()
            .prefix(WORKSPACE_PREFIX)
            .tempdir_in(scratch_root)
            .map_err(|e| {
                ConvertError::workspace(format!("create under {}", scratch_root.display()), e)
            })?;
        let path = dir.path().to_path_buf();
        debug!("Workspace created: {}", path.display());
        if let Some(ref o) = observer {
            o.on_workspace_created(&path);
        }
        Ok(Self {
            path,
            dir: Some(dir),
            observer,
        })
    }

    /// Absolute path of the workspace directory.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// `true` until [`destroy`](Self::destroy) has run.
    pub fn is_live(&self) -> bool {
        self.dir.is_some()
    }

    /// Canonical input path for a given source extension.
    pub fn input_path(&self, source_ext: &str) -> PathBuf {
        self.path.join(format!("{INPUT_STEM}.{source_ext}"))
    }

    /// Write `bytes` to `input.<source_ext>` and return its absolute path.
    ///
    /// `source_ext` must be plain ASCII alphanumerics; anything else could
    /// escape the workspace or confuse the converter's argument parsing.
    pub async fn stage_input(&self, bytes: &[u8], source_ext: &str) -> Result<PathBuf, ConvertError> {
        if !is_safe_extension(source_ext) {
            return Err(ConvertError::Internal(format!(
                "refusing to stage input with extension {source_ext:?}"
            )));
        }
        let path = self.input_path(source_ext);
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| ConvertError::workspace(format!("write {}", path.display()), e))?;
        debug!("Staged {} bytes at {}", bytes.len(), path.display());
        Ok(path)
    }

    /// Recursively remove the workspace. Safe to call any number of times.
    pub fn destroy(&mut self) {
        let Some(dir) = self.dir.take() else {
            return;
        };
        let removed = match dir.close() {
            Ok(()) => {
                debug!("Workspace removed: {}", self.path.display());
                true
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("Workspace already gone: {}", self.path.display());
                true
            }
            Err(e) => {
                warn!("Failed to remove workspace {}: {}", self.path.display(), e);
                false
            }
        };
        if removed {
            if let Some(ref o) = self.observer {
                o.on_workspace_destroyed(&self.path);
            }
        }
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        self.destroy();
    }
}

impl std::fmt::Debug for Workspace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Workspace")
            .field("path", &self.path)
            .field("live", &self.is_live())
            .finish()
    }
}

pub(crate) fn is_safe_extension(ext: &str) -> bool {
    !ext.is_empty() && ext.bytes().all(|b| b.is_ascii_alphanumeric())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_makes_unique_dirs() {
        let root = tempfile::tempdir().unwrap();
        let a = Workspace::create(root.path(), None).unwrap();
        let b = Workspace::create(root.path(), None).unwrap();
        assert_ne!(a.path(), b.path());
        assert!(a.path().is_dir());
        assert!(b.path().is_dir());
        assert!(a
            .path()
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with(WORKSPACE_PREFIX));
    }

    #[test]
    fn create_fails_when_root_missing() {
        let root = tempfile::tempdir().unwrap();
        let missing = root.path().join("does-not-exist");
        let err = Workspace::create(&missing, None).unwrap_err();
        assert!(matches!(err, ConvertError::Workspace { .. }));
    }

    #[tokio::test]
    async fn stage_input_uses_canonical_name() {
        let root = tempfile::tempdir().unwrap();
        let ws = Workspace::create(root.path(), None).unwrap();
        let path = ws.stage_input(b"hello", "docx").await.unwrap();
        assert_eq!(path, ws.path().join("input.docx"));
        assert_eq!(std::fs::read(&path).unwrap(), b"hello");
    }

    #[tokio::test]
    async fn stage_input_rejects_path_like_extensions() {
        let root = tempfile::tempdir().unwrap();
        let ws = Workspace::create(root.path(), None).unwrap();
        for bad in ["", "../x", "a/b", "tar.gz", "p df"] {
            assert!(ws.stage_input(b"x", bad).await.is_err(), "{bad:?} accepted");
        }
    }

    #[test]
    fn destroy_is_idempotent() {
        let root = tempfile::tempdir().unwrap();
        let mut ws = Workspace::create(root.path(), None).unwrap();
        std::fs::write(ws.path().join("output.pdf"), b"x").unwrap();
        let path = ws.path().to_path_buf();

        ws.destroy();
        assert!(!path.exists());
        assert!(!ws.is_live());

        ws.destroy();
        assert!(!path.exists());
    }

    #[test]
    fn destroy_tolerates_externally_removed_dir() {
        let root = tempfile::tempdir().unwrap();
        let mut ws = Workspace::create(root.path(), None).unwrap();
        std::fs::remove_dir_all(ws.path()).unwrap();
        ws.destroy();
        ws.destroy();
    }

    #[test]
    fn drop_removes_directory() {
        let root = tempfile::tempdir().unwrap();
        let path = {
            let ws = Workspace::create(root.path(), None).unwrap();
            std::fs::create_dir(ws.path().join("nested")).unwrap();
            ws.path().to_path_buf()
        };
        assert!(!path.exists());
        assert_eq!(std::fs::read_dir(root.path()).unwrap().count(), 0);
    }

    #[test]
    fn safe_extensions() {
        assert!(is_safe_extension("pdf"));
        assert!(is_safe_extension("mp4"));
        assert!(!is_safe_extension(""));
        assert!(!is_safe_extension("a.b"));
        assert!(!is_safe_extension("é"));
    }
}
