//! Configuration types for the conversion gateway.
//!
//! All runtime behaviour is controlled through [`GatewayConfig`], built via
//! its [`GatewayConfigBuilder`]. The config is shared read-only between
//! concurrent requests (it lives behind an `Arc` inside
//! [`crate::Converter`]).

use crate::error::ConvertError;
use crate::observer::ObserverHandle;
use crate::registry::ToolKind;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// How to launch one external converter, and how long it may run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolSettings {
    /// Program followed by any leading arguments, e.g. `["soffice"]` or
    /// `["flatpak", "run", "org.libreoffice.LibreOffice"]`. Empty means the
    /// tool is disabled.
    pub launcher: Vec<String>,

    /// Wall-clock budget for one invocation, in seconds.
    pub timeout_secs: u64,
}

impl ToolSettings {
    pub fn new(program: impl Into<String>, timeout_secs: u64) -> Self {
        Self {
            launcher: vec![program.into()],
            timeout_secs,
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Launchers for every tool kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolSet {
    pub office: ToolSettings,
    pub raster: ToolSettings,
    pub text: ToolSettings,
}

impl Default for ToolSet {
    fn default() -> Self {
        Self {
            office: ToolSettings::new("libreoffice", 60),
            raster: ToolSettings::new("convert", 120),
            text: ToolSettings::new("pdftotext", 120),
        }
    }
}

impl ToolSet {
    /// Settings for `tool`, or `None` for [`ToolKind::Unknown`].
    pub fn get(&self, tool: ToolKind) -> Option<&ToolSettings> {
        match tool {
            ToolKind::Office => Some(&self.office),
            ToolKind::Raster => Some(&self.raster),
            ToolKind::Text => Some(&self.text),
            ToolKind::Unknown => None,
        }
    }
}

/// Configuration for the gateway.
///
/// # Example
/// ```rust
/// use convgate::GatewayConfig;
///
/// let config = GatewayConfig::builder()
///     .office_timeout_secs(90)
///     .raster_density(200)
///     .build()
///     .unwrap();
/// assert_eq!(config.tools.office.timeout_secs, 90);
/// ```
#[derive(Clone)]
pub struct GatewayConfig {
    /// Directory under which per-request workspaces are created.
    /// Default: the system temp directory.
    pub scratch_dir: Option<PathBuf>,

    /// External converters.
    pub tools: ToolSet,

    /// Rendering density (DPI) used when rasterising paginated sources.
    /// Range: 36–600. Default: 150.
    pub raster_density: u32,

    /// Timeout for fetching a remote URL, in seconds. Default: 120.
    pub fetch_timeout_secs: u64,

    /// Largest accepted upload or download, in bytes. Default: 100 MiB.
    pub max_body_bytes: usize,

    /// Lifecycle hooks. None by default.
    pub observer: Option<ObserverHandle>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            scratch_dir: None,
            tools: ToolSet::default(),
            raster_density: 150,
            fetch_timeout_secs: 120,
            max_body_bytes: 100 * 1024 * 1024,
            observer: None,
        }
    }
}

impl fmt::Debug for GatewayConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GatewayConfig")
            .field("scratch_dir", &self.scratch_dir)
            .field("tools", &self.tools)
            .field("raster_density", &self.raster_density)
            .field("fetch_timeout_secs", &self.fetch_timeout_secs)
            .field("max_body_bytes", &self.max_body_bytes)
            .field("observer", &self.observer.as_ref().map(|_| "<dyn ConversionObserver>"))
            .finish()
    }
}

impl GatewayConfig {
    /// Create a new builder for `GatewayConfig`.
    pub fn builder() -> GatewayConfigBuilder {
        GatewayConfigBuilder {
            config: Self::default(),
        }
    }

    /// Root directory for workspaces.
    pub fn scratch_root(&self) -> PathBuf {
        self.scratch_dir.clone().unwrap_or_else(std::env::temp_dir)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }
}

/// Builder for [`GatewayConfig`].
#[derive(Debug)]
pub struct GatewayConfigBuilder {
    config: GatewayConfig,
}

impl GatewayConfigBuilder {
    pub fn scratch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.scratch_dir = Some(dir.into());
        self
    }

    pub fn tool(mut self, tool: ToolKind, settings: ToolSettings) -> Self {
        match tool {
            ToolKind::Office => self.config.tools.office = settings,
            ToolKind::Raster => self.config.tools.raster = settings,
            ToolKind::Text => self.config.tools.text = settings,
            ToolKind::Unknown => {}
        }
        self
    }

    pub fn office_launcher(mut self, launcher: Vec<String>) -> Self {
        self.config.tools.office.launcher = launcher;
        self
    }

    pub fn raster_launcher(mut self, launcher: Vec<String>) -> Self {
        self.config.tools.raster.launcher = launcher;
        self
    }

    pub fn text_launcher(mut self, launcher: Vec<String>) -> Self {
        self.config.tools.text.launcher = launcher;
        self
    }

    pub fn office_timeout_secs(mut self, secs: u64) -> Self {
        self.config.tools.office.timeout_secs = secs;
        self
    }

    pub fn raster_timeout_secs(mut self, secs: u64) -> Self {
        self.config.tools.raster.timeout_secs = secs;
        self
    }

    pub fn text_timeout_secs(mut self, secs: u64) -> Self {
        self.config.tools.text.timeout_secs = secs;
        self
    }

    pub fn raster_density(mut self, dpi: u32) -> Self {
        self.config.raster_density = dpi.clamp(36, 600);
        self
    }

    pub fn fetch_timeout_secs(mut self, secs: u64) -> Self {
        self.config.fetch_timeout_secs = secs;
        self
    }

    pub fn max_body_bytes(mut self, n: usize) -> Self {
        self.config.max_body_bytes = n;
        self
    }

    pub fn observer(mut self, observer: ObserverHandle) -> Self {
        self.config.observer = Some(observer);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<GatewayConfig, ConvertError> {
        let c = &self.config;
        for (name, tool) in [
            ("office", &c.tools.office),
            ("raster", &c.tools.raster),
            ("text", &c.tools.text),
        ] {
            if tool.timeout_secs == 0 {
                return Err(ConvertError::InvalidConfig(format!(
                    "{name} timeout must be ≥ 1s"
                )));
            }
        }
        if c.fetch_timeout_secs == 0 {
            return Err(ConvertError::InvalidConfig(
                "fetch timeout must be ≥ 1s".into(),
            ));
        }
        if c.max_body_bytes == 0 {
            return Err(ConvertError::InvalidConfig(
                "max body size must be > 0".into(),
            ));
        }
        Ok(self.config)
    }
}
