//! Page list discovery from a documentation site's navigation menu.
//!
//! The page list is never crawled: it is read off a saved copy of the site's
//! navigation markup (e.g. a sidebar `menu.html`). Link order in the menu is
//! the reading order of the docs, and therefore the order of the merged PDF.

mod parser;

use std::path::Path;

use sitepdf_shared::{ExtractConfig, PageList, PageReference, Result, SitePdfError};
use tracing::{info, instrument};

/// Default documentation mount point stripped from hrefs.
const DEFAULT_MOUNT_PREFIX: &str = "/docs";

// ---------------------------------------------------------------------------
// Extraction options
// ---------------------------------------------------------------------------

/// Configuration for link extraction.
#[derive(Debug, Clone)]
pub struct ExtractOptions {
    /// Path prefix removed from the start of each href.
    pub mount_prefix: String,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            mount_prefix: DEFAULT_MOUNT_PREFIX.into(),
        }
    }
}

impl From<&ExtractConfig> for ExtractOptions {
    fn from(config: &ExtractConfig) -> Self {
        Self {
            mount_prefix: config.mount_prefix.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Entry points
// ---------------------------------------------------------------------------

/// Extract internal page references from navigation markup.
///
/// Returns references in order of first appearance with duplicates removed.
/// Fails with a parse error when the input is not markup at all.
#[instrument(skip_all, fields(mount_prefix = %opts.mount_prefix, bytes = markup.len()))]
pub fn extract_links(markup: &str, opts: &ExtractOptions) -> Result<Vec<PageReference>> {
    let pages = parser::parse_navigation(markup, &opts.mount_prefix)?;
    info!(pages = pages.len(), "extracted navigation links");
    Ok(pages)
}

/// Read a navigation document from disk and extract its page references.
pub fn extract_from_file(path: &Path, opts: &ExtractOptions) -> Result<Vec<PageReference>> {
    let bytes = std::fs::read(path).map_err(|e| SitePdfError::io(path, e))?;
    let markup = String::from_utf8(bytes).map_err(|e| {
        SitePdfError::parse(format!("{} is not valid UTF-8: {e}", path.display()))
    })?;
    extract_links(&markup, opts)
}

/// Build a page list from a navigation document, refusing to produce an empty list.
pub fn page_list_from_file(
    path: &Path,
    base_url: &str,
    opts: &ExtractOptions,
) -> Result<PageList> {
    let pages = extract_from_file(path, opts)?;
    if pages.is_empty() {
        return Err(SitePdfError::validation(format!(
            "no internal page links found in {}",
            path.display()
        )));
    }

    let list = PageList::new(base_url, pages);
    list.validate()?;
    Ok(list)
}
