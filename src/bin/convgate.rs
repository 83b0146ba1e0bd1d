//! CLI binary for convgate.
//!
//! A thin shim over the library crate: maps flags to `GatewayConfig`, then
//! either serves HTTP or runs a single conversion.

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use convgate::pipeline::fetch::is_url;
use convgate::{
    ConversionObserver, Converter, FailureKind, FormatRegistry, GatewayConfig, ObserverHandle,
};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

// ── One-shot conversion observer ─────────────────────────────────────────────

/// Prints tool lifecycle lines to stderr during `convgate convert`.
struct CliObserver;

impl ConversionObserver for CliObserver {
    fn on_tool_spawned(&self, tool: &str, argv: &[String]) {
        eprintln!("{} {} {}", cyan("◆"), bold(tool), dim(&argv.join(" ")));
    }

    fn on_tool_finished(
        &self,
        tool: &str,
        exit_code: Option<i32>,
        timed_out: bool,
        elapsed: Duration,
    ) {
        let secs = dim(&format!("{:.1}s", elapsed.as_secs_f64()));
        if timed_out {
            eprintln!("  {} {tool} timed out  {secs}", red("✗"));
        } else if exit_code == Some(0) {
            eprintln!("  {} {tool} exited 0  {secs}", green("✓"));
        } else {
            let code = exit_code.map_or_else(|| "signal".to_string(), |c| c.to_string());
            eprintln!("  {} {tool} exited {code}  {secs}", red("✗"));
        }
    }

    fn on_conversion_failed(&self, kind: FailureKind) {
        eprintln!("  {} {}", red("✘"), red(&kind.to_string()));
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Run the HTTP gateway
  convgate serve --bind 0.0.0.0:8000

  # Convert a local file (result lands next to the current directory)
  convgate convert report.docx --to pdf

  # Convert into a specific path
  convgate convert slides.pptx --to pdf -o out/slides.pdf

  # Convert a remote file
  convgate convert https://example.com/files/report.docx --to pdf

  # List conversions
  convgate formats

  # Custom registry
  convgate --formats formats.toml serve

HTTP ENDPOINTS:
  GET  /health                       liveness check
  GET  /supported-formats            list of "src -> dst" pairs
  POST /convert?to_format=pdf        multipart upload, part name "file"
  POST /convert-from-url             JSON {"url": "...", "to_format": "pdf"}

REGISTRY FILE (TOML):
  [[conversions]]
  source = "docx"
  target = "pdf"
  tool   = "office"        # office | raster | text

  [mime_types]
  pdf = "application/pdf"

ENVIRONMENT VARIABLES:
  CONVGATE_BIND            Listen address for `serve`
  CONVGATE_FORMATS         Registry TOML file
  CONVGATE_SCRATCH_DIR     Root for per-request workspaces (default: system temp)
  CONVGATE_OFFICE_CMD      Office converter command (default: libreoffice)
  CONVGATE_RASTER_CMD      Raster converter command (default: convert)
  CONVGATE_TEXT_CMD        Text extractor command (default: pdftotext)
  RUST_LOG                 Overrides the log filter
"#;

/// Convert files between formats with external command-line tools.
#[derive(Parser, Debug)]
#[command(
    name = "convgate",
    version,
    about = "Stateless file-conversion gateway backed by command-line converters",
    long_about = "Convert documents, images and PDFs by delegating to LibreOffice, \
ImageMagick and pdftotext, either as an HTTP service or as a one-shot command. Every \
request runs in its own scratch directory that is removed when the request ends.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[command(flatten)]
    gateway: GatewayArgs,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "CONVGATE_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "CONVGATE_QUIET")]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP gateway.
    Serve {
        /// Address to listen on.
        #[arg(long, env = "CONVGATE_BIND", default_value = "0.0.0.0:8000")]
        bind: String,
    },

    /// Convert one local file or URL.
    Convert {
        /// Local file path or HTTP/HTTPS URL.
        input: String,

        /// Target format (extension), e.g. pdf.
        #[arg(long = "to", short = 't')]
        to_format: String,

        /// Output file or directory (default: current directory).
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Print the supported conversions.
    Formats,
}

#[derive(Args, Debug)]
struct GatewayArgs {
    /// TOML file replacing the built-in conversion table.
    #[arg(long, global = true, env = "CONVGATE_FORMATS")]
    formats: Option<PathBuf>,

    /// Root directory for per-request workspaces.
    #[arg(long, global = true, env = "CONVGATE_SCRATCH_DIR")]
    scratch_dir: Option<PathBuf>,

    /// Office converter command line.
    #[arg(long, global = true, env = "CONVGATE_OFFICE_CMD", default_value = "libreoffice")]
    office_cmd: String,

    /// Raster converter command line.
    #[arg(long, global = true, env = "CONVGATE_RASTER_CMD", default_value = "convert")]
    raster_cmd: String,

    /// Text extractor command line.
    #[arg(long, global = true, env = "CONVGATE_TEXT_CMD", default_value = "pdftotext")]
    text_cmd: String,

    /// Office converter timeout in seconds.
    #[arg(long, global = true, env = "CONVGATE_OFFICE_TIMEOUT", default_value_t = 60)]
    office_timeout: u64,

    /// Raster converter timeout in seconds.
    #[arg(long, global = true, env = "CONVGATE_RASTER_TIMEOUT", default_value_t = 120)]
    raster_timeout: u64,

    /// Text extractor timeout in seconds.
    #[arg(long, global = true, env = "CONVGATE_TEXT_TIMEOUT", default_value_t = 120)]
    text_timeout: u64,

    /// Rasterisation density for paginated sources (36–600 DPI).
    #[arg(long, global = true, env = "CONVGATE_RASTER_DENSITY", default_value_t = 150,
          value_parser = clap::value_parser!(u32).range(36..=600))]
    raster_density: u32,

    /// URL download timeout in seconds.
    #[arg(long, global = true, env = "CONVGATE_FETCH_TIMEOUT", default_value_t = 120)]
    fetch_timeout: u64,

    /// Largest accepted upload or download in bytes.
    #[arg(long, global = true, env = "CONVGATE_MAX_BODY_BYTES", default_value_t = 100 * 1024 * 1024)]
    max_body_bytes: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "error"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let registry = load_registry(cli.gateway.formats.as_deref())?;

    match cli.command {
        Command::Formats => {
            for pair in registry.supported_pairs() {
                let tool = registry
                    .resolve_tool(&pair.source, &pair.target)
                    .map(|t| t.to_string())
                    .unwrap_or_default();
                println!("{:<24} {}", pair.to_string(), dim(&tool));
            }
        }

        Command::Serve { ref bind } => {
            let config = build_config(&cli.gateway, None)?;
            let converter = Converter::new(registry, config);
            let listener = tokio::net::TcpListener::bind(bind)
                .await
                .with_context(|| format!("Failed to bind {bind}"))?;
            convgate::serve(listener, converter)
                .await
                .context("HTTP server failed")?;
        }

        Command::Convert {
            ref input,
            ref to_format,
            ref output,
        } => {
            let observer: Option<ObserverHandle> = if cli.quiet {
                None
            } else {
                Some(Arc::new(CliObserver))
            };
            let config = build_config(&cli.gateway, observer)?;
            let converter = Converter::new(registry, config);
            let output = output.clone().unwrap_or_else(|| PathBuf::from("."));

            let dest = if is_url(input) {
                converter
                    .convert_from_url(input, to_format)
                    .await
                    .context("Conversion failed")?
                    .persist(&output)
                    .await
                    .with_context(|| format!("Failed to write {}", output.display()))?
            } else {
                converter
                    .convert_to_file(Path::new(input), to_format, &output)
                    .await
                    .context("Conversion failed")?
            };

            if !cli.quiet {
                eprintln!("{}  →  {}", green("✔"), bold(&dest.display().to_string()));
            }
        }
    }

    Ok(())
}

/// Built-in table, or the TOML file given with `--formats`.
fn load_registry(path: Option<&Path>) -> Result<FormatRegistry> {
    match path {
        Some(p) => FormatRegistry::load(p)
            .with_context(|| format!("Failed to load format registry from {}", p.display())),
        None => Ok(FormatRegistry::default()),
    }
}

/// Map CLI args to `GatewayConfig`.
fn build_config(args: &GatewayArgs, observer: Option<ObserverHandle>) -> Result<GatewayConfig> {
    let mut builder = GatewayConfig::builder()
        .office_launcher(split_command(&args.office_cmd)?)
        .raster_launcher(split_command(&args.raster_cmd)?)
        .text_launcher(split_command(&args.text_cmd)?)
        .office_timeout_secs(args.office_timeout)
        .raster_timeout_secs(args.raster_timeout)
        .text_timeout_secs(args.text_timeout)
        .raster_density(args.raster_density)
        .fetch_timeout_secs(args.fetch_timeout)
        .max_body_bytes(args.max_body_bytes);

    if let Some(ref dir) = args.scratch_dir {
        builder = builder.scratch_dir(dir);
    }
    if let Some(observer) = observer {
        builder = builder.observer(observer);
    }

    builder.build().context("Invalid configuration")
}

/// `"soffice --norestore"` → `["soffice", "--norestore"]`.
fn split_command(cmd: &str) -> Result<Vec<String>> {
    let argv: Vec<String> = cmd.split_whitespace().map(str::to_string).collect();
    if argv.is_empty() {
        bail!("converter command must not be empty");
    }
    Ok(argv)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_command_on_whitespace() {
        assert_eq!(
            split_command("soffice  --norestore").unwrap(),
            vec!["soffice".to_string(), "--norestore".to_string()]
        );
        assert!(split_command("   ").is_err());
    }

    #[test]
    fn cli_parses_convert() {
        let cli = Cli::try_parse_from(["convgate", "convert", "a.docx", "--to", "pdf"]).unwrap();
        match cli.command {
            Command::Convert { input, to_format, output } => {
                assert_eq!(input, "a.docx");
                assert_eq!(to_format, "pdf");
                assert!(output.is_none());
            }
            other => panic!("unexpected command {other:?}"),
        }
    }
}
