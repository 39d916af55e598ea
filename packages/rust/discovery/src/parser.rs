//! Navigation markup parser.
//!
//! Walks every `<a href>` in document order and keeps the hrefs that point at
//! internal documentation pages:
//! - external (`http://`, `https://`), fragment (`#`), `mailto:` and
//!   `javascript:` links are dropped
//! - the docs mount prefix (e.g. `/docs`) is stripped
//! - empty results are dropped, duplicates keep their first position

use std::collections::HashSet;
use std::sync::LazyLock;

use scraper::{Html, Selector};
use sitepdf_shared::{PageReference, Result, SitePdfError};

/// Href prefixes that never name an internal documentation page.
const EXCLUDED_PREFIXES: [&str; 5] = ["http://", "https://", "#", "mailto:", "javascript:"];

/// Matches every anchor carrying an href.
static ANCHOR_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a[href]").expect("anchor selector"));

/// Parse navigation markup into de-duplicated page references, in order of first appearance.
pub(crate) fn parse_navigation(markup: &str, mount_prefix: &str) -> Result<Vec<PageReference>> {
    if markup.trim().is_empty() {
        return Err(SitePdfError::parse("navigation document is empty"));
    }
    if !markup.contains('<') {
        return Err(SitePdfError::parse(
            "navigation document contains no markup tags",
        ));
    }

    let doc = Html::parse_document(markup);

    let mut seen: HashSet<String> = HashSet::new();
    let mut pages = Vec::new();

    for el in doc.select(&ANCHOR_SEL) {
        let Some(href) = el.value().attr("href") else {
            continue;
        };
        let href = href.trim();

        if is_excluded(href) {
            continue;
        }

        // `/docs#x` and `/docs?x` strip down to a bare fragment or query
        // on the mount root, which is dropped like the root itself.
        let normalized = strip_mount_prefix(href, mount_prefix);
        if normalized.is_empty() || normalized.starts_with('?') || is_excluded(normalized) {
            continue;
        }

        if seen.insert(normalized.to_string()) {
            pages.push(PageReference::new(normalized));
        }
    }

    Ok(pages)
}

/// Whether an href is external, a fragment, or a non-navigational scheme.
fn is_excluded(href: &str) -> bool {
    EXCLUDED_PREFIXES
        .iter()
        .any(|prefix| href.starts_with(prefix))
}

/// Strip the mount prefix when it is the leading path segment of `href`.
///
/// `/docs/x` → `/x`, `/docs` → ``, but `/docsearch` is left alone.
pub(crate) fn strip_mount_prefix<'a>(href: &'a str, mount_prefix: &str) -> &'a str {
    let prefix = mount_prefix.trim_end_matches('/');
    if prefix.is_empty() {
        return href;
    }

    match href.strip_prefix(prefix) {
        Some(rest) if rest.is_empty() || rest.starts_with(['/', '?', '#']) => rest,
        _ => href,
    }
}
