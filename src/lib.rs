//! # convgate
//!
//! A stateless HTTP gateway that converts files between formats by running
//! external command-line converters (LibreOffice, ImageMagick, pdftotext).
//!
//! ## Why this crate?
//!
//! The heavy lifting of document conversion already exists as mature
//! command-line tools. What they lack is a safe network front: unique
//! per-request scratch directories, hard wall-clock limits on misbehaving
//! converters, precise failure classification, and guaranteed cleanup even
//! when the client disconnects mid-download. That is all this crate adds.
//!
//! ## Request Lifecycle
//!
//! ```text
//! upload / URL
//!  │
//!  ├─ 1. Resolve   filename extension + target → tool (registry lookup)
//!  ├─ 2. Stage     fresh workspace, input written as input.<ext>
//!  ├─ 3. Invoke    tool argv, spawned with a deadline (killed on timeout)
//!  ├─ 4. Classify  timeout / non-zero exit / missing output / success
//!  └─ 5. Deliver   stream the artifact, remove the workspace afterwards
//! ```
//!
//! Requests rejected in step 1 never touch the disk or spawn a process.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use convgate::{ConversionRequest, Converter, FormatRegistry, GatewayConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = GatewayConfig::builder().office_timeout_secs(90).build()?;
//!     let converter = Converter::new(FormatRegistry::default(), config);
//!
//!     let bytes = std::fs::read("report.docx")?;
//!     let artifact = converter
//!         .convert(ConversionRequest::new("report.docx", bytes, "pdf"))
//!         .await?;
//!     std::fs::copy(artifact.output_path(), artifact.filename())?;
//!     // Dropping the artifact removes its workspace.
//!     Ok(())
//! }
//! ```
//!
//! Serving over HTTP:
//!
//! ```rust,no_run
//! # async fn run() -> std::io::Result<()> {
//! use convgate::{Converter, FormatRegistry, GatewayConfig};
//!
//! let converter = Converter::new(FormatRegistry::default(), GatewayConfig::default());
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:8000").await?;
//! convgate::serve(listener, converter).await
//! # }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `convgate` binary (clap + anyhow + tracing-subscriber) |
//!
//! Disable `cli` when embedding the gateway as a library:
//! ```toml
//! convgate = { version = "0.2", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod convert;
pub mod error;
pub mod observer;
pub mod output;
pub mod pipeline;
pub mod registry;
pub mod server;
pub mod stream;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{GatewayConfig, GatewayConfigBuilder, ToolSet, ToolSettings};
pub use convert::{split_filename, Converter};
pub use error::{ConvertError, FailureKind};
pub use observer::{ConversionObserver, NoopObserver, ObserverHandle};
pub use output::{ConversionRequest, ConvertedArtifact};
pub use registry::{FormatPair, FormatRegistry, ToolKind, DEFAULT_MIME_TYPE};
pub use server::{router, serve};
pub use stream::{stream_artifact, ArtifactStream};
