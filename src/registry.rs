//! Format registry: which external tool converts which extension pair.
//!
//! Routing is data, not branching. The orchestrator asks one question,
//! [`FormatRegistry::resolve_tool`], and never mentions a concrete format.
//! Swapping the table (for instance from a TOML file at startup) changes what
//! the gateway supports without touching the conversion path.
//!
//! Lookups are case-insensitive and exact: if `a -> b` and `b -> c` are
//! registered, `a -> c` is still unsupported.

use crate::error::ConvertError;
use crate::pipeline::workspace::is_safe_extension;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;

/// MIME type used for extensions with no registered type.
pub const DEFAULT_MIME_TYPE: &str = "application/octet-stream";

/// The external converters this gateway knows how to drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolKind {
    /// Office-suite renderer run headless (LibreOffice `soffice`).
    Office,
    /// Raster image converter (ImageMagick).
    Raster,
    /// Plain-text extractor (poppler `pdftotext`).
    Text,
    /// A tool name this build does not recognise. Never invoked.
    #[serde(other)]
    Unknown,
}

impl ToolKind {
    pub fn name(self) -> &'static str {
        match self {
            ToolKind::Office => "office",
            ToolKind::Raster => "raster",
            ToolKind::Text => "text",
            ToolKind::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ToolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Ordered `(source, target)` extension pair. Both sides are lowercase.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FormatPair {
    pub source: String,
    pub target: String,
}

impl FormatPair {
    pub fn new(source: impl AsRef<str>, target: impl AsRef<str>) -> Self {
        Self {
            source: source.as_ref().to_ascii_lowercase(),
            target: target.as_ref().to_ascii_lowercase(),
        }
    }
}

impl fmt::Display for FormatPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.source, self.target)
    }
}

/// Immutable routing table plus the extension → MIME map used to label
/// responses.
#[derive(Debug, Clone)]
pub struct FormatRegistry {
    pairs: Vec<FormatPair>,
    tools: HashMap<FormatPair, ToolKind>,
    mime_types: HashMap<String, String>,
}

const OFFICE_PAIRS: &[(&str, &str)] = &[
    ("doc", "pdf"),
    ("docx", "pdf"),
    ("odt", "pdf"),
    ("rtf", "pdf"),
    ("xls", "pdf"),
    ("xlsx", "pdf"),
    ("ods", "pdf"),
    ("ppt", "pdf"),
    ("pptx", "pdf"),
    ("odp", "pdf"),
    ("docx", "odt"),
    ("odt", "docx"),
    ("doc", "docx"),
    ("xls", "xlsx"),
    ("ppt", "pptx"),
];

const RASTER_PAIRS: &[(&str, &str)] = &[
    ("pdf", "png"),
    ("pdf", "jpg"),
    ("png", "jpg"),
    ("jpg", "png"),
    ("jpeg", "png"),
    ("png", "webp"),
    ("gif", "png"),
    ("bmp", "png"),
    ("tiff", "png"),
    ("png", "pdf"),
    ("jpg", "pdf"),
];

const TEXT_PAIRS: &[(&str, &str)] = &[("pdf", "txt")];

const MIME_TYPES: &[(&str, &str)] = &[
    ("pdf", "application/pdf"),
    ("txt", "text/plain; charset=utf-8"),
    ("png", "image/png"),
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("gif", "image/gif"),
    ("bmp", "image/bmp"),
    ("webp", "image/webp"),
    ("tiff", "image/tiff"),
    ("doc", "application/msword"),
    (
        "docx",
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
    ),
    ("odt", "application/vnd.oasis.opendocument.text"),
    ("rtf", "application/rtf"),
    ("xls", "application/vnd.ms-excel"),
    (
        "xlsx",
        "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
    ),
    ("ods", "application/vnd.oasis.opendocument.spreadsheet"),
    ("ppt", "application/vnd.ms-powerpoint"),
    (
        "pptx",
        "application/vnd.openxmlformats-officedocument.presentationml.presentation",
    ),
    ("odp", "application/vnd.oasis.opendocument.presentation"),
];

impl Default for FormatRegistry {
    /// The built-in table: office documents, raster images, text extraction.
    fn default() -> Self {
        let mut registry = Self::empty();
        for (tool, pairs) in [
            (ToolKind::Office, OFFICE_PAIRS),
            (ToolKind::Raster, RASTER_PAIRS),
            (ToolKind::Text, TEXT_PAIRS),
        ] {
            for (src, dst) in pairs {
                registry.insert(FormatPair::new(src, dst), tool);
            }
        }
        for (ext, mime) in MIME_TYPES {
            registry.mime_types.insert((*ext).to_string(), (*mime).to_string());
        }
        registry
    }
}

impl FormatRegistry {
    /// A registry with no conversions and no MIME types.
    pub fn empty() -> Self {
        Self {
            pairs: Vec::new(),
            tools: HashMap::new(),
            mime_types: HashMap::new(),
        }
    }

    /// Register a conversion. The first registration of a pair wins.
    pub fn with_conversion(
        mut self,
        source: impl AsRef<str>,
        target: impl AsRef<str>,
        tool: ToolKind,
    ) -> Self {
        self.insert(FormatPair::new(source, target), tool);
        self
    }

    /// Register (or replace) the MIME type for an extension.
    pub fn with_mime_type(mut self, ext: impl AsRef<str>, mime: impl Into<String>) -> Self {
        self.mime_types
            .insert(ext.as_ref().to_ascii_lowercase(), mime.into());
        self
    }

    fn insert(&mut self, pair: FormatPair, tool: ToolKind) {
        if self.tools.contains_key(&pair) {
            return;
        }
        self.tools.insert(pair.clone(), tool);
        self.pairs.push(pair);
    }

    /// Tool registered for `source_ext -> target_ext`, if any.
    pub fn resolve_tool(&self, source_ext: &str, target_ext: &str) -> Option<ToolKind> {
        self.tools
            .get(&FormatPair::new(source_ext, target_ext))
            .copied()
    }

    /// All registered pairs in registration order.
    pub fn supported_pairs(&self) -> &[FormatPair] {
        &self.pairs
    }

    /// MIME type for labelling a response body of this extension.
    pub fn mime_type_for(&self, ext: &str) -> &str {
        self.mime_types
            .get(&ext.to_ascii_lowercase())
            .map(String::as_str)
            .unwrap_or(DEFAULT_MIME_TYPE)
    }

    /// Parse a registry table from TOML.
    ///
    /// ```toml
    /// [[conversions]]
    /// source = "docx"
    /// target = "pdf"
    /// tool = "office"
    ///
    /// [mime_types]
    /// pdf = "application/pdf"
    /// ```
    pub fn from_toml_str(raw: &str) -> Result<Self, ConvertError> {
        let file: RegistryFile = toml::from_str(raw)
            .map_err(|e| ConvertError::InvalidConfig(format!("format table: {e}")))?;

        let mut registry = Self::empty();
        for entry in file.conversions {
            let (source, target) = (entry.source.trim(), entry.target.trim());
            if !is_safe_extension(source) || !is_safe_extension(target) {
                return Err(ConvertError::InvalidConfig(format!(
                    "format table: extensions must be non-empty ASCII alphanumerics, got {source:?} -> {target:?}"
                )));
            }
            registry.insert(FormatPair::new(source, target), entry.tool);
        }
        for (ext, mime) in file.mime_types {
            registry.mime_types.insert(ext.to_ascii_lowercase(), mime);
        }
        Ok(registry)
    }

    /// Load a registry table from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConvertError> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            ConvertError::InvalidConfig(format!("reading format table {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&raw)
    }
}

#[derive(Debug, Deserialize)]
struct RegistryFile {
    #[serde(default)]
    conversions: Vec<RegistryEntry>,
    #[serde(default)]
    mime_types: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct RegistryEntry {
    source: String,
    target: String,
    tool: ToolKind,
}
