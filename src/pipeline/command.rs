//! Argument vectors for each external converter.
//!
//! The builder owns every tool-specific quirk, and it is the single place
//! that decides where a tool writes its output. The workspace only knows the
//! input name, so the two agree as long as the expected output path returned
//! here is what the orchestrator checks.
//!
//! | Tool   | Output location                      |
//! |--------|--------------------------------------|
//! | office | `<ws>/input.<target>` (tool default) |
//! | raster | `<ws>/output.<target>`               |
//! | text   | `<ws>/output.<target>`               |

use crate::config::ToolSet;
use crate::registry::ToolKind;
use std::path::{Path, PathBuf};

/// Stem used for outputs whose location we choose ourselves.
pub const OUTPUT_STEM: &str = "output";

/// Source formats that hold several pages; rasterising them renders page 1 only.
const PAGINATED_FORMATS: &[&str] = &["pdf", "ps", "eps", "ai"];

/// Renderer profile directory, kept inside the workspace so concurrent
/// office instances never contend for the same user profile lock.
const OFFICE_PROFILE_DIR: &str = ".profile";

/// A ready-to-spawn command and where its output should appear.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuiltCommand {
    /// Program first, then arguments. Empty when the tool cannot be invoked.
    pub argv: Vec<String>,
    /// Where the converter is expected to write. `None` iff `argv` is empty.
    pub expected_output: Option<PathBuf>,
}

impl BuiltCommand {
    fn unavailable() -> Self {
        Self {
            argv: Vec::new(),
            expected_output: None,
        }
    }

    pub fn is_runnable(&self) -> bool {
        !self.argv.is_empty()
    }
}

/// Tool-independent knobs the builder needs besides paths.
#[derive(Debug, Clone, Copy)]
pub struct BuildOptions {
    /// DPI passed to the raster converter for paginated sources.
    pub raster_density: u32,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self { raster_density: 150 }
    }
}

/// Build the command for `tool` converting `input_path` to `target_ext`
/// inside `workspace_dir`.
pub fn build(
    tool: ToolKind,
    input_path: &Path,
    target_ext: &str,
    workspace_dir: &Path,
    tools: &ToolSet,
    opts: BuildOptions,
) -> BuiltCommand {
    let Some(settings) = tools.get(tool) else {
        return BuiltCommand::unavailable();
    };
    if settings.launcher.is_empty() || settings.launcher[0].trim().is_empty() {
        return BuiltCommand::unavailable();
    }

    let mut argv = settings.launcher.clone();
    let input = input_path.to_string_lossy().into_owned();

    let expected = match tool {
        ToolKind::Office => {
            let profile = workspace_dir.join(OFFICE_PROFILE_DIR);
            argv.push("--headless".into());
            argv.push(format!("-env:UserInstallation=file://{}", profile.display()));
            argv.push("--convert-to".into());
            argv.push(target_ext.to_string());
            argv.push("--outdir".into());
            argv.push(workspace_dir.to_string_lossy().into_owned());
            argv.push(input);

            let stem = input_path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| crate::pipeline::workspace::INPUT_STEM.to_string());
            workspace_dir.join(format!("{stem}.{target_ext}"))
        }
        ToolKind::Raster => {
            let output = workspace_dir.join(format!("{OUTPUT_STEM}.{target_ext}"));
            if is_paginated(input_path) {
                // Density must precede the input to apply while reading it.
                argv.push("-density".into());
                argv.push(opts.raster_density.to_string());
                argv.push(format!("{input}[0]"));
            } else {
                argv.push(input);
            }
            argv.push(output.to_string_lossy().into_owned());
            output
        }
        ToolKind::Text => {
            let output = workspace_dir.join(format!("{OUTPUT_STEM}.{target_ext}"));
            argv.push(input);
            argv.push(output.to_string_lossy().into_owned());
            output
        }
        ToolKind::Unknown => return BuiltCommand::unavailable(),
    };

    BuiltCommand {
        argv,
        expected_output: Some(expected),
    }
}

fn is_paginated(input_path: &Path) -> bool {
    input_path
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .is_some_and(|e| PAGINATED_FORMATS.contains(&e.as_str()))
}
