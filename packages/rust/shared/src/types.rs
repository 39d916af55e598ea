//! Core domain types: page references and the persisted page list.

use std::path::Path;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{Result, SitePdfError};

// ---------------------------------------------------------------------------
// PageReference
// ---------------------------------------------------------------------------

/// A relative path identifying one documentation page (e.g. `/app/routing`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PageReference(String);

impl PageReference {
    /// Wrap a relative page path.
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    /// The raw relative path.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Absolute URL for this page: plain concatenation onto the base URL.
    pub fn url(&self, base_url: &str) -> String {
        format!("{base_url}{}", self.0)
    }
}

impl std::fmt::Display for PageReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PageReference {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

// ---------------------------------------------------------------------------
// PageList
// ---------------------------------------------------------------------------

/// The ordered list of pages to harvest, plus the base URL they hang off.
///
/// Order is significant: it is the order of the final merged PDF.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageList {
    /// Base URL every page reference is appended to.
    pub base_url: String,
    /// Page references in merge order.
    #[serde(default)]
    pub pages: Vec<PageReference>,
}

impl PageList {
    /// Build a page list from a base URL and references.
    pub fn new(base_url: impl Into<String>, pages: Vec<PageReference>) -> Self {
        Self {
            base_url: base_url.into(),
            pages,
        }
    }

    /// Load and validate a page list from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| SitePdfError::io(path, e))?;
        let list: Self = toml::from_str(&content).map_err(|e| {
            SitePdfError::config(format!("failed to parse {}: {e}", path.display()))
        })?;
        list.validate()?;

        tracing::debug!(?path, pages = list.pages.len(), "loaded page list");
        Ok(list)
    }

    /// Write the page list to a TOML file, preserving page order.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content =
            toml::to_string_pretty(self).map_err(|e| SitePdfError::config(e.to_string()))?;
        std::fs::write(path, content).map_err(|e| SitePdfError::io(path, e))
    }

    /// Check that the base URL is an absolute http(s) URL.
    pub fn validate(&self) -> Result<()> {
        let url = Url::parse(&self.base_url).map_err(|e| {
            SitePdfError::validation(format!("invalid base_url '{}': {e}", self.base_url))
        })?;
        match url.scheme() {
            "http" | "https" => Ok(()),
            other => Err(SitePdfError::validation(format!(
                "base_url must be http or https, got '{other}'"
            ))),
        }
    }

    /// Number of pages in the list.
    pub fn len(&self) -> usize {
        self.pages.len()
    }

    /// Whether the list holds no pages.
    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }
}
