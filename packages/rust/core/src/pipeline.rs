//! Build pipeline: page list → fetch → render → merge.
//!
//! Pages are processed strictly in list order with a single engine. A page
//! whose fetch or render fails is logged and skipped; the run continues. Any
//! other error aborts the run. The engine is released exactly once after the
//! loop and merge, whatever their outcome.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use tracing::{debug, info, instrument, warn};

use sitepdf_artifacts::{MergeReport, merge_pdfs};
use sitepdf_shared::{AppConfig, PageList, PageReference, Result, SitePdfError};

/// Characters replaced when turning a page path into a file name.
const UNSAFE_FILENAME_CHARS: &[char] = &['/', '\\', ':', '*', '?', '"', '<', '>', '|'];

/// File stem used for the empty page reference (the docs root).
const ROOT_PAGE_STEM: &str = "main";

// ---------------------------------------------------------------------------
// Seams
// ---------------------------------------------------------------------------

/// A rendering engine that turns a URL into content markup.
#[allow(async_fn_in_trait)]
pub trait Engine {
    /// Navigate to `url` and return the serialized content region.
    async fn fetch_content(&mut self, url: &str) -> Result<String>;

    /// Shut the engine down. Consumes the engine.
    async fn release(self) -> Result<()>
    where
        Self: Sized;
}

/// Converts content markup into a paginated file.
#[allow(async_fn_in_trait)]
pub trait Renderer {
    async fn render(&self, markup: &str, output: &Path) -> Result<()>;
}

/// Progress callback for reporting build status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called before a page is fetched.
    fn page_started(&self, url: &str, current: usize, total: usize);
    /// Called when a page's PDF has been written.
    fn page_rendered(&self, path: &Path, current: usize, total: usize);
    /// Called when a page is skipped.
    fn page_failed(&self, url: &str, error: &SitePdfError);
    /// Called when the pipeline completes.
    fn done(&self, report: &BuildReport);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn page_started(&self, _url: &str, _current: usize, _total: usize) {}
    fn page_rendered(&self, _path: &Path, _current: usize, _total: usize) {}
    fn page_failed(&self, _url: &str, _error: &SitePdfError) {}
    fn done(&self, _report: &BuildReport) {}
}

// ---------------------------------------------------------------------------
// Config / report
// ---------------------------------------------------------------------------

/// Where a build writes its files.
#[derive(Debug, Clone)]
pub struct BuildConfig {
    /// Directory for per-page PDFs and the merged PDF.
    pub output_dir: PathBuf,
    /// File name of the merged PDF inside `output_dir`.
    pub merged_filename: String,
}

impl BuildConfig {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            output_dir: PathBuf::from(&config.output.dir),
            merged_filename: config.output.merged_filename.clone(),
        }
    }

    pub fn merged_path(&self) -> PathBuf {
        self.output_dir.join(&self.merged_filename)
    }
}

/// Outcome of a build run.
#[derive(Debug, Clone)]
pub struct BuildReport {
    /// Per-page PDFs written, in page-list order.
    pub artifacts: Vec<PathBuf>,
    /// Skipped pages as (url, error message).
    pub failures: Vec<(String, String)>,
    /// Merged PDF, when at least one page succeeded.
    pub merged: Option<PathBuf>,
    pub merge: Option<MergeReport>,
    pub elapsed: Duration,
}

// ---------------------------------------------------------------------------
// Naming
// ---------------------------------------------------------------------------

/// PDF file name for a page reference: `/app/routing` → `app_routing.pdf`.
///
/// Only the leading `/` is dropped, so `/intro` and `/intro/` map to
/// different names.
pub fn output_file_name(page: &PageReference) -> String {
    format!("{}.pdf", file_stem(page))
}

fn file_stem(page: &PageReference) -> String {
    let trimmed = page.as_str().strip_prefix('/').unwrap_or(page.as_str());
    if trimmed.is_empty() {
        return ROOT_PAGE_STEM.to_string();
    }
    trimmed
        .chars()
        .map(|c| if UNSAFE_FILENAME_CHARS.contains(&c) { '_' } else { c })
        .collect()
}

/// Hands out per-page file names that are unique within one run.
///
/// Distinct references can still flatten to the same stem (`/a/b` and
/// `/a_b`); later ones get `-2`, `-3`, ... appended.
#[derive(Debug, Default)]
pub struct OutputNames {
    used: HashSet<String>,
}

impl OutputNames {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn claim(&mut self, page: &PageReference) -> String {
        let stem = file_stem(page);
        let mut name = format!("{stem}.pdf");
        let mut n = 2;
        while self.used.contains(&name) {
            name = format!("{stem}-{n}.pdf");
            n += 1;
        }
        self.used.insert(name.clone());
        name
    }
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// Run the build with an already acquired `engine`.
///
/// The engine is released before this returns on every path. A release
/// failure is logged and does not change the result.
#[instrument(skip_all, fields(base_url = %list.base_url, pages = list.len()))]
pub async fn run_pipeline<E: Engine, R: Renderer>(
    list: &PageList,
    mut engine: E,
    renderer: &R,
    config: &BuildConfig,
    progress: &dyn ProgressReporter,
) -> Result<BuildReport> {
    let start = Instant::now();

    let outcome = process(list, &mut engine, renderer, config, progress).await;

    progress.phase("Releasing browser engine");
    if let Err(e) = engine.release().await {
        warn!(error = %e, "engine release failed");
    }

    let (artifacts, failures, merge) = outcome?;
    let report = BuildReport {
        artifacts,
        failures,
        merged: merge.as_ref().map(|_| config.merged_path()),
        merge,
        elapsed: start.elapsed(),
    };

    info!(
        rendered = report.artifacts.len(),
        failed = report.failures.len(),
        merged = report.merged.is_some(),
        elapsed_ms = report.elapsed.as_millis() as u64,
        "build complete"
    );
    progress.done(&report);
    Ok(report)
}

type Processed = (Vec<PathBuf>, Vec<(String, String)>, Option<MergeReport>);

async fn process<E: Engine, R: Renderer>(
    list: &PageList,
    engine: &mut E,
    renderer: &R,
    config: &BuildConfig,
    progress: &dyn ProgressReporter,
) -> Result<Processed> {
    std::fs::create_dir_all(&config.output_dir)
        .map_err(|e| SitePdfError::io(&config.output_dir, e))?;

    progress.phase("Rendering pages");
    let total = list.len();
    let mut artifacts: Vec<PathBuf> = Vec::new();
    let mut failures: Vec<(String, String)> = Vec::new();
    let mut names = OutputNames::new();

    for (i, page) in list.pages.iter().enumerate() {
        let url = page.url(&list.base_url);
        let output = config.output_dir.join(names.claim(page));
        progress.page_started(&url, i + 1, total);

        let result = match engine.fetch_content(&url).await {
            Ok(markup) => renderer.render(&markup, &output).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(()) => {
                debug!(%url, %page, path = %output.display(), "page rendered");
                progress.page_rendered(&output, i + 1, total);
                artifacts.push(output);
            }
            Err(e) if e.is_recoverable() => {
                warn!(%url, %page, error = %e, "page skipped");
                progress.page_failed(&url, &e);
                failures.push((url, e.to_string()));
            }
            Err(e) => return Err(e),
        }
    }

    if artifacts.is_empty() {
        warn!("no pages rendered, skipping merge");
        return Ok((artifacts, failures, None));
    }

    progress.phase("Merging PDFs");
    let merge = merge_pdfs(&artifacts, &config.merged_path())?;
    let merge = merge.wrote_output().then_some(merge);

    Ok((artifacts, failures, merge))
}

#[cfg(test)]
mod tests {
    use std::collections::{HashMap, HashSet};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use lopdf::{Dictionary, Document, Object, dictionary};

    use super::*;

    /// Serves `<n>` markup per URL; URLs without an entry fail to fetch.
    struct FakeEngine {
        pages: HashMap<String, String>,
        fetched: Vec<String>,
        releases: Arc<AtomicUsize>,
    }

    impl FakeEngine {
        fn new(pages: &[(&str, &str)], releases: Arc<AtomicUsize>) -> Self {
            Self {
                pages: pages
                    .iter()
                    .map(|(u, m)| (u.to_string(), m.to_string()))
                    .collect(),
                fetched: Vec::new(),
                releases,
            }
        }
    }

    impl Engine for FakeEngine {
        async fn fetch_content(&mut self, url: &str) -> Result<String> {
            self.fetched.push(url.to_string());
            self.pages
                .get(url)
                .cloned()
                .ok_or_else(|| SitePdfError::page_fetch(url, "no <article> element within 20s"))
        }

        async fn release(self) -> Result<()> {
            self.releases.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    /// Writes a one-page PDF whose MediaBox width is the markup parsed as a number.
    #[derive(Default)]
    struct FakeRenderer {
        failing: HashSet<String>,
    }

    impl Renderer for FakeRenderer {
        async fn render(&self, markup: &str, output: &Path) -> Result<()> {
            if self.failing.contains(markup) {
                return Err(SitePdfError::render(output, "wkhtmltopdf exited with 1"));
            }
            let width: i64 = markup.parse().unwrap_or(612);
            write_pdf(output, width);
            Ok(())
        }
    }

    fn write_pdf(path: &Path, width: i64) {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let page: Dictionary = dictionary! {
            "Type" => Object::Name(b"Page".to_vec()),
            "Parent" => Object::Reference(pages_id),
            "MediaBox" => Object::Array(vec![
                Object::Integer(0),
                Object::Integer(0),
                Object::Integer(width),
                Object::Integer(842),
            ]),
        };
        let page_id = doc.add_object(page);
        let pages: Dictionary = dictionary! {
            "Type" => Object::Name(b"Pages".to_vec()),
            "Count" => Object::Integer(1),
            "Kids" => Object::Array(vec![Object::Reference(page_id)]),
        };
        doc.objects.insert(pages_id, Object::Dictionary(pages));
        let catalog: Dictionary = dictionary! {
            "Type" => Object::Name(b"Catalog".to_vec()),
            "Pages" => Object::Reference(pages_id),
        };
        let catalog_id = doc.add_object(catalog);
        doc.trailer.set("Root", Object::Reference(catalog_id));
        doc.save(path).expect("save test pdf");
    }

    fn merged_widths(path: &Path) -> Vec<i64> {
        let doc = Document::load(path).expect("load merged pdf");
        doc.get_pages()
            .values()
            .map(|id| {
                let page = doc.get_object(*id).unwrap().as_dict().unwrap();
                page.get(b"MediaBox").unwrap().as_array().unwrap()[2]
                    .as_i64()
                    .unwrap()
            })
            .collect()
    }

    fn build_config(tag: &str) -> BuildConfig {
        BuildConfig {
            output_dir: std::env::temp_dir()
                .join(format!("sitepdf-{tag}-{}", uuid::Uuid::now_v7())),
            merged_filename: "merged_docs.pdf".into(),
        }
    }

    fn list(pages: &[&str]) -> PageList {
        PageList::new(
            "https://site/docs",
            pages.iter().map(|p| PageReference::from(*p)).collect(),
        )
    }

    #[test]
    fn file_names() {
        let name = |p: &str| output_file_name(&PageReference::from(p));
        assert_eq!(name("/intro"), "intro.pdf");
        assert_eq!(name("/x/y"), "x_y.pdf");
        assert_eq!(name("/app/routing/"), "app_routing_.pdf");
        assert_eq!(name(""), "main.pdf");
        assert_eq!(name("/"), "main.pdf");
        assert_eq!(name("/a?b=c"), "a_b=c.pdf");
        assert_eq!(name("/ko/시작하기"), "ko_시작하기.pdf");
    }

    #[test]
    fn colliding_stems_get_suffixes() {
        let mut names = OutputNames::new();
        let mut claim = |p: &str| names.claim(&PageReference::from(p));
        assert_eq!(claim("/a/b"), "a_b.pdf");
        assert_eq!(claim("/a_b"), "a_b-2.pdf");
        assert_eq!(claim("/a?b"), "a_b-3.pdf");
        assert_eq!(claim("/intro"), "intro.pdf");
    }

    #[tokio::test]
    async fn colliding_pages_keep_their_own_files() {
        let releases = Arc::new(AtomicUsize::new(0));
        let engine = FakeEngine::new(
            &[
                ("https://site/docs/intro", "111"),
                ("https://site/docs/intro/", "222"),
                ("https://site/docs/a/b", "333"),
                ("https://site/docs/a_b", "444"),
            ],
            releases.clone(),
        );
        let config = build_config("pipeline-collide");

        let report = run_pipeline(
            &list(&["/intro", "/intro/", "/a/b", "/a_b"]),
            engine,
            &FakeRenderer::default(),
            &config,
            &SilentProgress,
        )
        .await
        .unwrap();

        let unique: HashSet<&PathBuf> = report.artifacts.iter().collect();
        assert_eq!(unique.len(), 4);
        assert_eq!(
            merged_widths(report.merged.as_ref().unwrap()),
            vec![111, 222, 333, 444]
        );

        let _ = std::fs::remove_dir_all(&config.output_dir);
    }

    #[tokio::test]
    async fn single_page_end_to_end() {
        let releases = Arc::new(AtomicUsize::new(0));
        let engine = FakeEngine::new(&[("https://site/docs/intro", "500")], releases.clone());
        let config = build_config("pipeline-e2e");

        let report = run_pipeline(
            &list(&["/intro"]),
            engine,
            &FakeRenderer::default(),
            &config,
            &SilentProgress,
        )
        .await
        .unwrap();

        assert_eq!(report.artifacts, vec![config.output_dir.join("intro.pdf")]);
        assert!(report.failures.is_empty());
        let merged = report.merged.clone().unwrap();
        assert_eq!(merged, config.output_dir.join("merged_docs.pdf"));
        assert_eq!(merged_widths(&merged), vec![500]);
        assert_eq!(releases.load(Ordering::SeqCst), 1);

        let _ = std::fs::remove_dir_all(&config.output_dir);
    }

    #[tokio::test]
    async fn failures_leave_gaps_but_keep_order() {
        let releases = Arc::new(AtomicUsize::new(0));
        let engine = FakeEngine::new(
            &[
                ("https://site/docs/a", "101"),
                // b fails to fetch
                ("https://site/docs/c", "103"),
                ("https://site/docs/d", "104"),
                ("https://site/docs/e", "105"),
            ],
            releases.clone(),
        );
        let renderer = FakeRenderer {
            failing: HashSet::from(["104".to_string()]),
        };
        let config = build_config("pipeline-gaps");

        let report = run_pipeline(
            &list(&["/a", "/b", "/c", "/d", "/e"]),
            engine,
            &renderer,
            &config,
            &SilentProgress,
        )
        .await
        .unwrap();

        let names: Vec<String> = report
            .artifacts
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.pdf", "c.pdf", "e.pdf"]);
        assert_eq!(report.failures.len(), 2);
        assert_eq!(report.failures[0].0, "https://site/docs/b");
        assert_eq!(report.failures[1].0, "https://site/docs/d");
        assert!(!config.output_dir.join("d.pdf").exists());
        assert_eq!(
            merged_widths(report.merged.as_ref().unwrap()),
            vec![101, 103, 105]
        );
        assert_eq!(report.merge.as_ref().unwrap().page_count, 3);
        assert_eq!(releases.load(Ordering::SeqCst), 1);

        let _ = std::fs::remove_dir_all(&config.output_dir);
    }

    #[tokio::test]
    async fn all_failures_skip_merge_and_still_release() {
        let releases = Arc::new(AtomicUsize::new(0));
        let engine = FakeEngine::new(&[], releases.clone());
        let config = build_config("pipeline-none");

        let report = run_pipeline(
            &list(&["/a", "/b"]),
            engine,
            &FakeRenderer::default(),
            &config,
            &SilentProgress,
        )
        .await
        .unwrap();

        assert!(report.artifacts.is_empty());
        assert_eq!(report.failures.len(), 2);
        assert!(report.merged.is_none());
        assert!(!config.merged_path().exists());
        assert_eq!(releases.load(Ordering::SeqCst), 1);

        let _ = std::fs::remove_dir_all(&config.output_dir);
    }

    #[tokio::test]
    async fn fetches_follow_list_order() {
        let releases = Arc::new(AtomicUsize::new(0));
        let mut engine = FakeEngine::new(&[], releases.clone());
        let config = build_config("pipeline-order");
        let pages = list(&["/z", "/a", "/m"]);

        process(
            &pages,
            &mut engine,
            &FakeRenderer::default(),
            &config,
            &SilentProgress,
        )
        .await
        .unwrap();

        assert_eq!(
            engine.fetched,
            vec![
                "https://site/docs/z",
                "https://site/docs/a",
                "https://site/docs/m"
            ]
        );

        let _ = std::fs::remove_dir_all(&config.output_dir);
    }

    #[tokio::test]
    async fn unexpected_error_still_releases() {
        let releases = Arc::new(AtomicUsize::new(0));
        let engine = FakeEngine::new(&[("https://site/docs/a", "101")], releases.clone());

        // Output directory nested under a regular file cannot be created.
        let blocker = std::env::temp_dir().join(format!("sitepdf-blocker-{}", uuid::Uuid::now_v7()));
        std::fs::write(&blocker, b"file").unwrap();
        let config = BuildConfig {
            output_dir: blocker.join("out"),
            merged_filename: "merged_docs.pdf".into(),
        };

        let err = run_pipeline(
            &list(&["/a"]),
            engine,
            &FakeRenderer::default(),
            &config,
            &SilentProgress,
        )
        .await
        .unwrap_err();

        assert!(matches!(err, SitePdfError::Io { .. }));
        assert_eq!(releases.load(Ordering::SeqCst), 1);

        let _ = std::fs::remove_file(&blocker);
    }

    /// Engine whose session dies on the second page.
    struct CrashingEngine {
        calls: usize,
        releases: Arc<AtomicUsize>,
    }

    impl Engine for CrashingEngine {
        async fn fetch_content(&mut self, url: &str) -> Result<String> {
            self.calls += 1;
            if self.calls == 1 {
                Ok("101".into())
            } else {
                Err(SitePdfError::Engine(format!("invalid session id while loading {url}")))
            }
        }

        async fn release(self) -> Result<()> {
            self.releases.fetch_add(1, Ordering::SeqCst);
            Err(SitePdfError::Engine("session already gone".into()))
        }
    }

    #[tokio::test]
    async fn fatal_engine_error_aborts_and_releases() {
        let releases = Arc::new(AtomicUsize::new(0));
        let engine = CrashingEngine {
            calls: 0,
            releases: releases.clone(),
        };
        let config = build_config("pipeline-fatal");

        let err = run_pipeline(
            &list(&["/a", "/b", "/c"]),
            engine,
            &FakeRenderer::default(),
            &config,
            &SilentProgress,
        )
        .await
        .unwrap_err();

        assert!(matches!(err, SitePdfError::Engine(_)));
        assert!(!config.merged_path().exists());
        assert_eq!(releases.load(Ordering::SeqCst), 1);

        let _ = std::fs::remove_dir_all(&config.output_dir);
    }

    #[test]
    fn build_config_from_app_config() {
        let config = BuildConfig::from_config(&AppConfig::default());
        assert_eq!(config.output_dir, PathBuf::from("output_pdfs"));
        assert_eq!(
            config.merged_path(),
            PathBuf::from("output_pdfs").join("merged_docs.pdf")
        );
    }
}
