//! Conversion orchestration.
//!
//! [`Converter::convert`] drives one request through
//! `Init → FormatResolved → WorkspaceReady → ToolInvoked → {Succeeded | Failed}`.
//! Requests rejected before `WorkspaceReady` touch neither the disk nor any
//! process. Once a workspace exists, every failure removes it before the
//! error is returned; success hands the workspace to the caller inside the
//! [`ConvertedArtifact`].

use crate::config::GatewayConfig;
use crate::error::ConvertError;
use crate::output::{ConversionRequest, ConvertedArtifact};
use crate::pipeline::command::{self, BuildOptions};
use crate::pipeline::exec;
use crate::pipeline::fetch;
use crate::pipeline::workspace::{is_safe_extension, Workspace};
use crate::registry::{FormatRegistry, ToolKind};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Name used for results whose original filename has an empty base name.
const FALLBACK_BASE_NAME: &str = "converted";

/// Split a caller-supplied filename into `(base_name, extension)`.
///
/// Only the last path component is considered, and the extension is whatever
/// follows its last `.`. Returns `None` when there is no extension.
///
/// ```rust
/// use convgate::convert::split_filename;
///
/// assert_eq!(split_filename("report.final.docx"), Some(("report.final", "docx")));
/// assert_eq!(split_filename("C:\\Users\\me\\scan.PDF"), Some(("scan", "PDF")));
/// assert_eq!(split_filename("README"), None);
/// ```
pub fn split_filename(filename: &str) -> Option<(&str, &str)> {
    let name = filename
        .rsplit(&['/', '\\'][..])
        .next()
        .unwrap_or(filename);
    let (base, ext) = name.rsplit_once('.')?;
    if ext.is_empty() {
        return None;
    }
    Some((base, ext))
}

/// The conversion engine: a read-only registry plus configuration.
///
/// Cheap to clone; clones share the same registry and config.
#[derive(Clone, Debug)]
pub struct Converter {
    registry: Arc<FormatRegistry>,
    config: Arc<GatewayConfig>,
}

impl Converter {
    pub fn new(registry: FormatRegistry, config: GatewayConfig) -> Self {
        Self {
            registry: Arc::new(registry),
            config: Arc::new(config),
        }
    }

    pub fn registry(&self) -> &FormatRegistry {
        &self.registry
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Convert in-memory bytes.
    ///
    /// # Errors
    /// - [`ConvertError::MissingExtension`] / [`ConvertError::UnsupportedPair`]
    ///   before any workspace exists
    /// - [`ConvertError::ToolTimeout`], [`ConvertError::ToolNonZeroExit`],
    ///   [`ConvertError::OutputNotProduced`] after the workspace is removed
    /// - anything else is an unexpected fault, also after cleanup
    pub async fn convert(
        &self,
        request: ConversionRequest,
    ) -> Result<ConvertedArtifact, ConvertError> {
        let result = self.convert_inner(request).await;
        if let Err(ref e) = result {
            self.report_failure(e);
        }
        result
    }

    /// Fetch `url` and convert the downloaded bytes.
    pub async fn convert_from_url(
        &self,
        url: &str,
        to_format: &str,
    ) -> Result<ConvertedArtifact, ConvertError> {
        let fetched = match fetch::fetch_url(
            url,
            self.config.fetch_timeout(),
            self.config.max_body_bytes,
        )
        .await
        {
            Ok(f) => f,
            Err(e) => {
                self.report_failure(&e);
                return Err(e);
            }
        };
        self.convert(ConversionRequest::new(fetched.filename, fetched.bytes, to_format))
            .await
    }

    /// Convert a local file and write the result to `output`.
    ///
    /// If `output` is an existing directory the result is written inside it
    /// under the artifact's download name. The write is atomic; see
    /// [`ConvertedArtifact::persist`]. Returns the final path.
    pub async fn convert_to_file(
        &self,
        input: &Path,
        to_format: &str,
        output: &Path,
    ) -> Result<PathBuf, ConvertError> {
        let bytes = tokio::fs::read(input)
            .await
            .map_err(|e| ConvertError::InputNotReadable {
                path: input.to_path_buf(),
                source: e,
            })?;
        let filename = input
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let artifact = self
            .convert(ConversionRequest::new(filename, bytes, to_format))
            .await?;

        artifact.persist(output).await
    }

    async fn convert_inner(
        &self,
        request: ConversionRequest,
    ) -> Result<ConvertedArtifact, ConvertError> {
        let started = Instant::now();

        // ── Init: source extension from the filename ─────────────────────────
        let (base_name, source_ext) =
            split_filename(&request.filename).ok_or_else(|| ConvertError::MissingExtension {
                filename: request.filename.clone(),
            })?;
        let source_ext = source_ext.to_ascii_lowercase();
        let base_name = if base_name.is_empty() {
            FALLBACK_BASE_NAME
        } else {
            base_name
        };

        // ── FormatResolved: registry lookup ──────────────────────────────────
        let target_ext = request.target_format.trim().to_ascii_lowercase();
        let tool = self
            .registry
            .resolve_tool(&source_ext, &target_ext)
            .ok_or_else(|| ConvertError::UnsupportedPair {
                source_ext: source_ext.clone(),
                target_ext: target_ext.clone(),
            })?;
        info!(
            "Converting '{}' ({} bytes) {} -> {} via {}",
            request.filename,
            request.bytes.len(),
            source_ext,
            target_ext,
            tool
        );

        // ── WorkspaceReady / ToolInvoked ─────────────────────────────────────
        let mut workspace =
            Workspace::create(&self.config.scratch_root(), self.config.observer.clone())?;

        let (output_path, size, tool_duration) = match self
            .run_in_workspace(&workspace, tool, &request.bytes, &source_ext, &target_ext)
            .await
        {
            Ok(done) => done,
            Err(e) => {
                workspace.destroy();
                return Err(e);
            }
        };

        let filename = format!("{base_name}.{target_ext}");
        info!(
            "Converted '{}' -> '{}' ({} bytes) in {}ms",
            request.filename,
            filename,
            size,
            started.elapsed().as_millis()
        );

        Ok(ConvertedArtifact {
            workspace,
            output_path,
            mime_type: self.registry.mime_type_for(&target_ext).to_string(),
            filename,
            size,
            tool,
            tool_duration,
        })
    }

    /// Stage, build, run, classify. Never cleans up; the caller does.
    async fn run_in_workspace(
        &self,
        workspace: &Workspace,
        tool: ToolKind,
        bytes: &[u8],
        source_ext: &str,
        target_ext: &str,
    ) -> Result<(PathBuf, u64, Duration), ConvertError> {
        if !is_safe_extension(target_ext) {
            return Err(ConvertError::Internal(format!(
                "refusing target extension {target_ext:?}"
            )));
        }

        let not_configured = || ConvertError::ToolNotConfigured {
            tool: tool.to_string(),
        };
        let settings = self.config.tools.get(tool).ok_or_else(not_configured)?;

        let input_path = workspace.stage_input(bytes, source_ext).await?;

        let cmd = command::build(
            tool,
            &input_path,
            target_ext,
            workspace.path(),
            &self.config.tools,
            BuildOptions {
                raster_density: self.config.raster_density,
            },
        );
        let expected = match cmd.expected_output {
            Some(ref p) if cmd.is_runnable() => p.clone(),
            _ => return Err(not_configured()),
        };

        if let Some(ref o) = self.config.observer {
            o.on_tool_spawned(tool.name(), &cmd.argv);
        }
        let result = exec::run(&cmd.argv, settings.timeout()).await?;
        if let Some(ref o) = self.config.observer {
            o.on_tool_finished(tool.name(), result.exit_code, result.timed_out, result.elapsed);
        }

        if result.timed_out {
            return Err(ConvertError::ToolTimeout {
                tool: tool.to_string(),
                secs: settings.timeout_secs,
            });
        }
        if result.exit_code != Some(0) {
            return Err(ConvertError::ToolNonZeroExit {
                tool: tool.to_string(),
                code: result.exit_code,
                diagnostic: result.diagnostic(),
            });
        }
        if !result.stderr.is_empty() {
            debug!(
                "{} wrote to stderr on success: {}",
                tool,
                String::from_utf8_lossy(&result.stderr).trim()
            );
        }

        match tokio::fs::metadata(&expected).await {
            Ok(meta) if meta.is_file() => Ok((expected, meta.len(), result.elapsed)),
            _ => Err(ConvertError::OutputNotProduced {
                tool: tool.to_string(),
                expected,
                diagnostic: result.diagnostic(),
            }),
        }
    }

    fn report_failure(&self, e: &ConvertError) {
        let kind = e.kind();
        if kind.is_client_error() {
            info!("Conversion rejected ({}): {}", kind, e);
        } else {
            warn!("Conversion failed ({}): {}", kind, e);
        }
        if let Some(ref o) = self.config.observer {
            o.on_conversion_failed(kind);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FailureKind;

    #[test]
    fn split_filename_cases() {
        assert_eq!(split_filename("report.docx"), Some(("report", "docx")));
        assert_eq!(split_filename("a.b.c.PDF"), Some(("a.b.c", "PDF")));
        assert_eq!(split_filename("../../etc/x.docx"), Some(("x", "docx")));
        assert_eq!(split_filename(".docx"), Some(("", "docx")));
        assert_eq!(split_filename("README"), None);
        assert_eq!(split_filename("trailing."), None);
        assert_eq!(split_filename("dir.v2/README"), None);
        assert_eq!(split_filename(""), None);
    }

    fn converter_in(root: &Path) -> Converter {
        let config = GatewayConfig::builder().scratch_dir(root).build().unwrap();
        Converter::new(FormatRegistry::default(), config)
    }

    #[tokio::test]
    async fn missing_extension_creates_no_workspace() {
        let root = tempfile::tempdir().unwrap();
        let conv = converter_in(root.path());
        let err = conv
            .convert(ConversionRequest::new("README", b"hi".to_vec(), "pdf"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), FailureKind::MissingExtension);
        assert_eq!(std::fs::read_dir(root.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn unsupported_pair_creates_no_workspace() {
        let root = tempfile::tempdir().unwrap();
        let conv = converter_in(root.path());
        let err = conv
            .convert(ConversionRequest::new("a.xyz", b"hi".to_vec(), "pdf"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), FailureKind::UnsupportedPair);
        assert_eq!(std::fs::read_dir(root.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn unknown_tool_is_configuration_failure() {
        let root = tempfile::tempdir().unwrap();
        let config = GatewayConfig::builder()
            .scratch_dir(root.path())
            .build()
            .unwrap();
        let registry = FormatRegistry::empty().with_conversion("svg", "png", ToolKind::Unknown);
        let conv = Converter::new(registry, config);
        let err = conv
            .convert(ConversionRequest::new("logo.svg", b"<svg/>".to_vec(), "png"))
            .await
            .unwrap_err();
        assert!(matches!(err, ConvertError::ToolNotConfigured { .. }), "{err}");
        assert_eq!(err.kind(), FailureKind::Internal);
        assert_eq!(std::fs::read_dir(root.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn target_format_is_normalised() {
        let root = tempfile::tempdir().unwrap();
        let conv = converter_in(root.path());
        // Unsupported either way, but the error shows the normalised form.
        let err = conv
            .convert(ConversionRequest::new("a.XYZ", Vec::new(), "  PDF "))
            .await
            .unwrap_err();
        match err {
            ConvertError::UnsupportedPair {
                source_ext,
                target_ext,
            } => {
                assert_eq!(source_ext, "xyz");
                assert_eq!(target_ext, "pdf");
            }
            other => panic!("unexpected: {other}"),
        }
    }
}
