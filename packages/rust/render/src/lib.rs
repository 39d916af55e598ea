//! HTML-to-PDF rendering through wkhtmltopdf.
//!
//! The converter is an external executable. Its location is resolved once per
//! run ([`ConversionTool::resolve`]) and reused for every page; each render
//! pipes the wrapped document through the tool's stdin.

mod shell;

pub use shell::{PRINT_STYLESHEET, wrap_document};

use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info, instrument};

use sitepdf_shared::{AppConfig, HostPlatform, Result, SitePdfError};

/// Executable name searched on PATH.
const TOOL_NAME: &str = "wkhtmltopdf";

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// Page geometry passed to the converter.
#[derive(Debug, Clone)]
pub struct RenderOptions {
    pub page_size: String,
    /// Applied to all four sides.
    pub margin: String,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            page_size: "A4".into(),
            margin: "0.75in".into(),
        }
    }
}

impl From<&AppConfig> for RenderOptions {
    fn from(config: &AppConfig) -> Self {
        Self {
            page_size: config.render.page_size.clone(),
            margin: config.render.margin.clone(),
        }
    }
}

/// Command-line arguments for one conversion reading from stdin.
pub fn conversion_args(opts: &RenderOptions, output: &Path) -> Vec<String> {
    let mut args = vec![
        "--quiet".to_string(),
        "--page-size".to_string(),
        opts.page_size.clone(),
    ];
    for side in ["top", "right", "bottom", "left"] {
        args.push(format!("--margin-{side}"));
        args.push(opts.margin.clone());
    }
    args.extend([
        "--encoding".to_string(),
        "UTF-8".to_string(),
        "--no-outline".to_string(),
        "-".to_string(),
        output.to_string_lossy().into_owned(),
    ]);
    args
}

// ---------------------------------------------------------------------------
// Tool resolution
// ---------------------------------------------------------------------------

/// Location of the wkhtmltopdf executable, or why it could not be found.
#[derive(Debug, Clone)]
pub enum ConversionTool {
    Found(PathBuf),
    Missing(String),
}

impl ConversionTool {
    /// Resolve in order: explicit path, PATH lookup, host install locations.
    ///
    /// Never fails outright; a missing tool surfaces as a per-page render error.
    pub fn resolve(explicit: Option<&Path>, host: &dyn HostPlatform) -> Self {
        if let Some(path) = explicit {
            if path.is_file() {
                info!(path = %path.display(), "using configured wkhtmltopdf");
                return Self::Found(path.to_path_buf());
            }
            return Self::Missing(format!(
                "configured wkhtmltopdf_path does not exist: {}",
                path.display()
            ));
        }

        if let Ok(path) = which::which(TOOL_NAME) {
            info!(path = %path.display(), "found wkhtmltopdf on PATH");
            return Self::Found(path);
        }

        if let Some(path) = host.locate_conversion_tool() {
            info!(path = %path.display(), "found wkhtmltopdf in install location");
            return Self::Found(path);
        }

        Self::Missing("wkhtmltopdf not found on PATH or in known install locations".into())
    }

    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::Found(path) => Some(path),
            Self::Missing(_) => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Renderer
// ---------------------------------------------------------------------------

/// Renders content fragments to PDF files with a resolved wkhtmltopdf.
pub struct WkhtmlRenderer {
    tool: ConversionTool,
    opts: RenderOptions,
}

impl WkhtmlRenderer {
    pub fn new(tool: ConversionTool, opts: RenderOptions) -> Self {
        Self { tool, opts }
    }

    /// Wrap `markup` in the print shell and convert it to `output`.
    ///
    /// Succeeds only when the tool exits cleanly and `output` exists.
    #[instrument(skip(self, markup), fields(output = %output.display()))]
    pub async fn render(&self, markup: &str, output: &Path) -> Result<()> {
        let tool = match &self.tool {
            ConversionTool::Found(path) => path,
            ConversionTool::Missing(reason) => {
                return Err(SitePdfError::render(output, reason.clone()));
            }
        };

        let document = wrap_document(markup);

        // A file left by an earlier run must not count as this run's output.
        match std::fs::remove_file(output) {
            Ok(()) => debug!("removed stale output"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(SitePdfError::render(
                    output,
                    format!("cannot replace existing file: {e}"),
                ));
            }
        }

        let mut child = Command::new(tool)
            .args(conversion_args(&self.opts, output))
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                SitePdfError::render(output, format!("failed to start {}: {e}", tool.display()))
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(document.as_bytes())
                .await
                .map_err(|e| SitePdfError::render(output, format!("failed to write document: {e}")))?;
            // Closing stdin signals end of input.
            drop(stdin);
        }

        let result = child
            .wait_with_output()
            .await
            .map_err(|e| SitePdfError::render(output, format!("conversion did not finish: {e}")))?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            return Err(SitePdfError::render(
                output,
                format!("wkhtmltopdf exited with {}: {}", result.status, stderr.trim()),
            ));
        }

        if !output.is_file() {
            return Err(SitePdfError::render(
                output,
                "wkhtmltopdf reported success but produced no file",
            ));
        }

        debug!(bytes_in = document.len(), "page rendered");
        Ok(())
    }
}
