//! Error types for sitepdf.
//!
//! Library crates use [`SitePdfError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Remediation steps shown when no driver acquisition source succeeds.
pub const ACQUISITION_REMEDIATION: &str = "\
Troubleshooting:
  1. Check that Google Chrome is installed.
  2. Update Chrome to the latest version.
  3. Run the program with administrator privileges.
  4. Check whether antivirus or security software is blocking chromedriver.";

/// Remediation steps shown when the PDF conversion tool is missing or fails.
pub const RENDER_REMEDIATION: &str = "\
Troubleshooting:
  1. Install wkhtmltopdf manually: https://wkhtmltopdf.org/downloads.html
  2. Add its install directory to PATH, or set render.wkhtmltopdf_path in the config.
  3. Run the program again.";

/// Top-level error type for all sitepdf operations.
#[derive(Debug, thiserror::Error)]
pub enum SitePdfError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Network/HTTP error while downloading driver packages.
    #[error("network error: {0}")]
    Network(String),

    /// Navigation markup could not be parsed.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error.
    #[error("validation error: {message}")]
    Validation { message: String },

    /// Every driver acquisition source failed, or the browser could not be found.
    #[error("driver acquisition failed: {message}\n\n{remedy}", remedy = ACQUISITION_REMEDIATION)]
    Acquisition { message: String },

    /// Engine launch or WebDriver protocol failure.
    #[error("engine error: {0}")]
    Engine(String),

    /// A single page could not be fetched (recoverable).
    #[error("failed to fetch {url}: {message}")]
    PageFetch { url: String, message: String },

    /// A single page could not be converted to PDF (recoverable).
    #[error("failed to render {path:?}: {message}\n\n{remedy}", remedy = RENDER_REMEDIATION)]
    Render { path: PathBuf, message: String },

    /// PDF merge error.
    #[error("merge error: {0}")]
    Merge(String),
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, SitePdfError>;

impl SitePdfError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a parse error from any displayable message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Create an acquisition error from any displayable message.
    pub fn acquisition(msg: impl Into<String>) -> Self {
        Self::Acquisition {
            message: msg.into(),
        }
    }

    /// Create a per-page fetch error.
    pub fn page_fetch(url: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::PageFetch {
            url: url.into(),
            message: msg.into(),
        }
    }

    /// Create a per-page render error.
    pub fn render(path: impl Into<PathBuf>, msg: impl Into<String>) -> Self {
        Self::Render {
            path: path.into(),
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether this error only affects a single page and the run may continue.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::PageFetch { .. } | Self::Render { .. })
    }
}
