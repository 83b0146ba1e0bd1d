//! Shared fixtures for the integration tests: fake converter scripts, a
//! small registry, and a counting observer.
#![allow(dead_code)]

use convgate::{
    ConversionObserver, Converter, FailureKind, FormatRegistry, GatewayConfig, ObserverHandle,
    ToolKind,
};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── Fake converters ──────────────────────────────────────────────────────────
//
// Office scripts receive `--headless -env:... --convert-to <ext> --outdir <dir> <input>`
// and must write `<dir>/<input stem>.<ext>`.

/// Writes a small PDF-looking file where LibreOffice would.
pub const OFFICE_OK: &str = r#"
outdir=""; target=""; input=""
while [ $# -gt 0 ]; do
  case "$1" in
    --outdir) outdir="$2"; shift 2 ;;
    --convert-to) target="$2"; shift 2 ;;
    *) input="$1"; shift ;;
  esac
done
base=$(basename "$input")
printf '%%PDF-1.4 converted\n' > "$outdir/${base%.*}.$target"
"#;

/// Succeeds but also chatters on stderr.
pub const OFFICE_OK_NOISY: &str = r#"
outdir=""; target=""; input=""
while [ $# -gt 0 ]; do
  case "$1" in
    --outdir) outdir="$2"; shift 2 ;;
    --convert-to) target="$2"; shift 2 ;;
    *) input="$1"; shift ;;
  esac
done
echo "javaldx: Could not find a Java Runtime Environment!" >&2
base=$(basename "$input")
printf '%%PDF-1.4 converted\n' > "$outdir/${base%.*}.$target"
"#;

/// Produces a zero-byte output.
pub const OFFICE_EMPTY_OUTPUT: &str = r#"
outdir=""; target=""; input=""
while [ $# -gt 0 ]; do
  case "$1" in
    --outdir) outdir="$2"; shift 2 ;;
    --convert-to) target="$2"; shift 2 ;;
    *) input="$1"; shift ;;
  esac
done
base=$(basename "$input")
: > "$outdir/${base%.*}.$target"
"#;

/// Exits 0 without writing anything.
pub const OFFICE_NO_OUTPUT: &str = "echo 'Error: source file could not be loaded'\nexit 0\n";

/// Exits 1 with a diagnostic on stderr.
pub const OFFICE_FAILS: &str = "echo 'boom: unreadable document' >&2\nexit 1\n";

/// Text extractor: `<input> <output>`.
pub const TEXT_COPY: &str = "cp \"$1\" \"$2\"\n";

pub fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{body}")).unwrap();
    path
}

pub fn sh(script: &Path) -> Vec<String> {
    vec!["sh".to_string(), script.display().to_string()]
}

// ── Registry / converter ─────────────────────────────────────────────────────

pub fn test_registry() -> FormatRegistry {
    FormatRegistry::empty()
        .with_conversion("docx", "pdf", ToolKind::Office)
        .with_conversion("pdf", "txt", ToolKind::Text)
        .with_mime_type("pdf", "application/pdf")
        .with_mime_type("txt", "text/plain")
}

/// Route library logs to the test output; `RUST_LOG=debug` shows tool runs.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

pub struct Harness {
    pub scratch: tempfile::TempDir,
    pub scripts: tempfile::TempDir,
    pub observer: Arc<CountingObserver>,
}

impl Harness {
    pub fn new() -> Self {
        init_tracing();
        Self {
            scratch: tempfile::tempdir().unwrap(),
            scripts: tempfile::tempdir().unwrap(),
            observer: Arc::new(CountingObserver::default()),
        }
    }

    pub fn script(&self, name: &str, body: &str) -> PathBuf {
        write_script(self.scripts.path(), name, body)
    }

    /// Converter whose office tool runs `office_body` with the given timeout.
    pub fn converter(&self, office_body: &str, office_timeout_secs: u64) -> Converter {
        let office = self.script("office.sh", office_body);
        self.converter_with_launcher(sh(&office), office_timeout_secs)
    }

    /// Converter whose office tool is started with `office_launcher` verbatim.
    pub fn converter_with_launcher(
        &self,
        office_launcher: Vec<String>,
        office_timeout_secs: u64,
    ) -> Converter {
        let text = self.script("text.sh", TEXT_COPY);
        let observer: ObserverHandle = self.observer.clone();
        let config = GatewayConfig::builder()
            .scratch_dir(self.scratch.path())
            .office_launcher(office_launcher)
            .office_timeout_secs(office_timeout_secs)
            .text_launcher(sh(&text))
            .observer(observer)
            .build()
            .unwrap();
        Converter::new(test_registry(), config)
    }

    pub fn scratch_is_empty(&self) -> bool {
        std::fs::read_dir(self.scratch.path()).unwrap().next().is_none()
    }
}

// ── Observer ─────────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct CountingObserver {
    pub created: AtomicUsize,
    pub spawned: AtomicUsize,
    pub destroyed: AtomicUsize,
    pub failures: Mutex<Vec<FailureKind>>,
}

impl CountingObserver {
    pub fn spawned(&self) -> usize {
        self.spawned.load(Ordering::SeqCst)
    }

    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    pub fn destroyed(&self) -> usize {
        self.destroyed.load(Ordering::SeqCst)
    }
}

impl ConversionObserver for CountingObserver {
    fn on_workspace_created(&self, _path: &Path) {
        self.created.fetch_add(1, Ordering::SeqCst);
    }

    fn on_tool_spawned(&self, _tool: &str, _argv: &[String]) {
        self.spawned.fetch_add(1, Ordering::SeqCst);
    }

    fn on_tool_finished(&self, _: &str, _: Option<i32>, _: bool, _: Duration) {}

    fn on_conversion_failed(&self, kind: FailureKind) {
        self.failures.lock().unwrap().push(kind);
    }

    fn on_workspace_destroyed(&self, _path: &Path) {
        self.destroyed.fetch_add(1, Ordering::SeqCst);
    }
}
