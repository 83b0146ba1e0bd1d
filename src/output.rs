//! Request and result types.

use crate::error::ConvertError;
use crate::pipeline::workspace::Workspace;
use crate::registry::ToolKind;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

/// One conversion job: the caller's bytes, the filename they arrived under,
/// and the requested target format.
///
/// The filename is used only to pick the source format and to name the
/// result; it never becomes a path on disk.
#[derive(Debug, Clone)]
pub struct ConversionRequest {
    pub filename: String,
    pub bytes: Vec<u8>,
    pub target_format: String,
}

impl ConversionRequest {
    pub fn new(
        filename: impl Into<String>,
        bytes: impl Into<Vec<u8>>,
        target_format: impl Into<String>,
    ) -> Self {
        Self {
            filename: filename.into(),
            bytes: bytes.into(),
            target_format: target_format.into(),
        }
    }
}

/// A successfully converted file, still sitting inside its workspace.
///
/// The artifact owns the workspace: the directory lives exactly as long as
/// this value (or the body stream it is moved into via
/// [`crate::stream::stream_artifact`]). Dropping it removes the workspace.
#[derive(Debug)]
pub struct ConvertedArtifact {
    pub(crate) workspace: Workspace,
    pub(crate) output_path: PathBuf,
    pub(crate) mime_type: String,
    pub(crate) filename: String,
    pub(crate) size: u64,
    pub(crate) tool: ToolKind,
    pub(crate) tool_duration: Duration,
}

impl ConvertedArtifact {
    /// Absolute path of the converted file.
    pub fn output_path(&self) -> &Path {
        &self.output_path
    }

    /// MIME type registered for the target extension.
    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    /// Download name: original base name plus the target extension.
    pub fn filename(&self) -> &str {
        &self.filename
    }

    /// Size of the converted file in bytes.
    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn tool(&self) -> ToolKind {
        self.tool
    }

    /// Wall-clock time the converter process ran.
    pub fn tool_duration(&self) -> Duration {
        self.tool_duration
    }

    /// Directory this artifact lives in; gone once the artifact is released.
    pub fn workspace_path(&self) -> &Path {
        self.workspace.path()
    }

    /// Remove the workspace now. Equivalent to dropping the artifact.
    pub fn release(mut self) {
        self.workspace.destroy();
    }

    /// Copy the converted file to `dest`, then release the workspace.
    ///
    /// If `dest` is an existing directory the file lands inside it under
    /// [`filename`](Self::filename). Missing parent directories are created.
    /// The write is atomic: a sibling `.tmp` file is renamed into place, so
    /// `dest` never holds a partial file. Returns the final path.
    pub async fn persist(self, dest: &Path) -> Result<PathBuf, ConvertError> {
        let dest = if dest.is_dir() {
            dest.join(&self.filename)
        } else {
            dest.to_path_buf()
        };
        let write_err = |e| ConvertError::OutputWriteFailed {
            path: dest.clone(),
            source: e,
        };

        if let Some(parent) = dest.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
        }
        let mut tmp_name = dest.file_name().unwrap_or_default().to_os_string();
        tmp_name.push(".tmp");
        let tmp_path = dest.with_file_name(tmp_name);

        tokio::fs::copy(&self.output_path, &tmp_path)
            .await
            .map_err(write_err)?;
        if let Err(e) = tokio::fs::rename(&tmp_path, &dest).await {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(write_err(e));
        }

        info!("Wrote {} ({} bytes)", dest.display(), self.size);
        self.release();
        Ok(dest)
    }
}
