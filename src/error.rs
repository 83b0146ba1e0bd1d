//! Error types for the convgate library.
//!
//! Every failed conversion surfaces as a single [`ConvertError`]. The
//! orchestrator is the only place that decides which variant applies; the
//! HTTP layer looks at [`ConvertError::kind`] and nothing else when choosing a
//! status code.
//!
//! Variants fall into two groups:
//!
//! * **Client faults**: the request cannot be served as asked (no extension,
//!   unsupported pair, unreachable URL). These map to `400`.
//! * **Server faults**: the converter timed out, crashed, produced nothing,
//!   or the host ran into an I/O problem. These map to `500`.

use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// All errors returned by the convgate library.
#[derive(Debug, Error)]
pub enum ConvertError {
    // ── Request errors ────────────────────────────────────────────────────
    /// The supplied filename has no extension to infer a format from.
    #[error("File '{filename}' has no extension; cannot determine its format")]
    MissingExtension { filename: String },

    /// No tool is registered for this (source, target) pair.
    #[error("Conversion from '{source_ext}' to '{target_ext}' is not supported")]
    UnsupportedPair {
        source_ext: String,
        target_ext: String,
    },

    // ── Upstream fetch errors ─────────────────────────────────────────────
    /// The URL could not be fetched or answered with an error status.
    #[error("Failed to fetch '{url}': {reason}")]
    UpstreamFetch { url: String, reason: String },

    /// The URL path does not end in a usable filename.
    #[error("Cannot derive a filename from URL '{url}'")]
    UrlWithoutFilename { url: String },

    // ── Tool errors ───────────────────────────────────────────────────────
    /// The converter exceeded its wall-clock budget and was killed.
    #[error("Converter '{tool}' timed out after {secs}s")]
    ToolTimeout { tool: String, secs: u64 },

    /// The converter exited with a non-zero status (or was killed by a signal).
    #[error("Converter '{tool}' failed with {}: {diagnostic}", exit_label(*code))]
    ToolNonZeroExit {
        tool: String,
        code: Option<i32>,
        diagnostic: String,
    },

    /// The converter exited 0 but the expected output file does not exist.
    #[error("Converter '{tool}' did not produce '{}': {diagnostic}", expected.display())]
    OutputNotProduced {
        tool: String,
        expected: PathBuf,
        diagnostic: String,
    },

    /// The registry routes to a tool this build cannot invoke.
    #[error("Converter '{tool}' is not configured")]
    ToolNotConfigured { tool: String },

    /// The converter program could not be started at all.
    #[error("Failed to start converter '{program}': {source}")]
    ToolSpawnFailed {
        program: String,
        #[source]
        source: std::io::Error,
    },

    // ── Workspace / I/O errors ────────────────────────────────────────────
    /// Scratch storage is unavailable or a workspace file operation failed.
    #[error("Workspace error ({context}): {source}")]
    Workspace {
        context: String,
        #[source]
        source: std::io::Error,
    },

    /// A local input file could not be read.
    #[error("Cannot read input file '{}': {source}", path.display())]
    InputNotReadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Could not write the converted file to its final destination.
    #[error("Failed to write output file '{}': {source}", path.display())]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation or registry parsing failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

fn exit_label(code: Option<i32>) -> String {
    match code {
        Some(c) => format!("exit code {c}"),
        None => "termination by signal".to_string(),
    }
}

/// Coarse classification of a [`ConvertError`], used for status mapping and
/// in the JSON error body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    MissingExtension,
    UnsupportedPair,
    UpstreamFetchError,
    ToolTimeout,
    ToolNonZeroExit,
    OutputNotProduced,
    /// Unexpected fault: I/O, resource exhaustion, misconfiguration.
    Internal,
}

impl FailureKind {
    /// `true` when the caller, not the server, is at fault.
    pub fn is_client_error(self) -> bool {
        matches!(
            self,
            FailureKind::MissingExtension
                | FailureKind::UnsupportedPair
                | FailureKind::UpstreamFetchError
        )
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FailureKind::MissingExtension => "missing_extension",
            FailureKind::UnsupportedPair => "unsupported_pair",
            FailureKind::UpstreamFetchError => "upstream_fetch_error",
            FailureKind::ToolTimeout => "tool_timeout",
            FailureKind::ToolNonZeroExit => "tool_non_zero_exit",
            FailureKind::OutputNotProduced => "output_not_produced",
            FailureKind::Internal => "internal",
        };
        f.write_str(s)
    }
}

impl ConvertError {
    /// Classify this error.
    pub fn kind(&self) -> FailureKind {
        match self {
            ConvertError::MissingExtension { .. } => FailureKind::MissingExtension,
            ConvertError::UnsupportedPair { .. } => FailureKind::UnsupportedPair,
            ConvertError::UpstreamFetch { .. } | ConvertError::UrlWithoutFilename { .. } => {
                FailureKind::UpstreamFetchError
            }
            ConvertError::ToolTimeout { .. } => FailureKind::ToolTimeout,
            ConvertError::ToolNonZeroExit { .. } => FailureKind::ToolNonZeroExit,
            ConvertError::OutputNotProduced { .. } => FailureKind::OutputNotProduced,
            ConvertError::ToolNotConfigured { .. }
            | ConvertError::ToolSpawnFailed { .. }
            | ConvertError::Workspace { .. }
            | ConvertError::InputNotReadable { .. }
            | ConvertError::OutputWriteFailed { .. }
            | ConvertError::InvalidConfig(_)
            | ConvertError::Internal(_) => FailureKind::Internal,
        }
    }

    /// Captured converter output, when the failure came from a tool run.
    pub fn diagnostic(&self) -> Option<&str> {
        match self {
            ConvertError::ToolNonZeroExit { diagnostic, .. }
            | ConvertError::OutputNotProduced { diagnostic, .. } => Some(diagnostic),
            _ => None,
        }
    }

    pub(crate) fn workspace(context: impl Into<String>, source: std::io::Error) -> Self {
        ConvertError::Workspace {
            context: context.into(),
            source,
        }
    }
}
