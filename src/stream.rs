//! Streaming a converted artifact with deferred workspace cleanup.
//!
//! The response body must be readable after the handler returns, so the
//! workspace cannot be removed there. Instead the artifact (and with it the
//! workspace) moves into the body stream:
//!
//! * when the last chunk has been yielded, the workspace is destroyed
//!   explicitly;
//! * if the transport drops the stream early (client disconnect, write
//!   error), dropping the stream state destroys it.
//!
//! Either way the directory is removed exactly once, without the core ever
//! polling for disconnects.

use crate::error::ConvertError;
use crate::output::ConvertedArtifact;
use bytes::Bytes;
use futures::stream::{self, StreamExt};
use std::io;
use std::pin::Pin;
use tokio_stream::Stream;
use tokio_util::io::ReaderStream;
use tracing::debug;

/// A boxed stream of artifact chunks.
pub type ArtifactStream = Pin<Box<dyn Stream<Item = io::Result<Bytes>> + Send>>;

/// Open the artifact for reading and return a stream that owns its workspace.
///
/// # Errors
/// Returns [`ConvertError::Workspace`] if the output file cannot be opened;
/// the workspace is removed before returning.
pub async fn stream_artifact(artifact: ConvertedArtifact) -> Result<ArtifactStream, ConvertError> {
    let file = match tokio::fs::File::open(artifact.output_path()).await {
        Ok(f) => f,
        Err(e) => {
            let context = format!("open {}", artifact.output_path().display());
            artifact.release();
            return Err(ConvertError::workspace(context, e));
        }
    };

    let state = StreamState {
        chunks: ReaderStream::new(file),
        artifact: Some(artifact),
        sent: 0,
    };

    let s = stream::unfold(state, |mut st| async move {
        match st.chunks.next().await {
            Some(Ok(chunk)) => {
                st.sent += chunk.len() as u64;
                Some((Ok(chunk), st))
            }
            Some(Err(e)) => {
                st.finish();
                Some((Err(e), st))
            }
            None => {
                st.finish();
                None
            }
        }
    });

    Ok(Box::pin(s))
}

struct StreamState {
    chunks: ReaderStream<tokio::fs::File>,
    artifact: Option<ConvertedArtifact>,
    sent: u64,
}

impl StreamState {
    fn finish(&mut self) {
        if let Some(artifact) = self.artifact.take() {
            debug!(
                "Delivered {} of {} bytes for '{}'",
                self.sent,
                artifact.size(),
                artifact.filename()
            );
            artifact.release();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::workspace::Workspace;
    use crate::registry::ToolKind;
    use std::time::Duration;

    async fn artifact_with(root: &std::path::Path, body: &[u8]) -> ConvertedArtifact {
        let workspace = Workspace::create(root, None).unwrap();
        let output_path = workspace.path().join("output.txt");
        tokio::fs::write(&output_path, body).await.unwrap();
        ConvertedArtifact {
            workspace,
            output_path,
            mime_type: "text/plain".into(),
            filename: "notes.txt".into(),
            size: body.len() as u64,
            tool: ToolKind::Text,
            tool_duration: Duration::ZERO,
        }
    }

    #[tokio::test]
    async fn workspace_removed_after_full_delivery() {
        let root = tempfile::tempdir().unwrap();
        let body = vec![7u8; 200_000];
        let artifact = artifact_with(root.path(), &body).await;
        let ws = artifact.workspace_path().to_path_buf();

        let mut s = stream_artifact(artifact).await.unwrap();
        let mut received = Vec::new();
        while let Some(chunk) = s.next().await {
            assert!(ws.exists(), "workspace must outlive every yielded chunk");
            received.extend_from_slice(&chunk.unwrap());
        }
        assert_eq!(received, body);
        assert!(!ws.exists());
    }

    #[tokio::test]
    async fn workspace_removed_when_stream_dropped_early() {
        let root = tempfile::tempdir().unwrap();
        let artifact = artifact_with(root.path(), &vec![1u8; 500_000]).await;
        let ws = artifact.workspace_path().to_path_buf();

        let mut s = stream_artifact(artifact).await.unwrap();
        let first = s.next().await.unwrap().unwrap();
        assert!(!first.is_empty());
        assert!(ws.exists(), "workspace must outlive partial delivery");

        drop(s);
        assert!(!ws.exists());
    }

    #[tokio::test]
    async fn missing_output_file_cleans_up() {
        let root = tempfile::tempdir().unwrap();
        let artifact = artifact_with(root.path(), b"x").await;
        let ws = artifact.workspace_path().to_path_buf();
        std::fs::remove_file(artifact.output_path()).unwrap();

        let err = stream_artifact(artifact).await.err().unwrap();
        assert!(matches!(err, ConvertError::Workspace { .. }));
        assert!(!ws.exists());
    }
}
