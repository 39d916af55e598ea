//! Core build orchestration for sitepdf.
//!
//! This crate ties together engine acquisition, page rendering, and PDF
//! merging into the end-to-end `build` workflow.

pub mod pipeline;

pub use pipeline::{
    BuildConfig, BuildReport, Engine, OutputNames, ProgressReporter, Renderer, SilentProgress,
    output_file_name, run_pipeline,
};

use std::path::Path;

use tracing::{instrument, warn};

use sitepdf_browser::{EngineHandle, EngineOptions, acquire_engine};
use sitepdf_render::{ConversionTool, RenderOptions, WkhtmlRenderer};
use sitepdf_shared::{AppConfig, PageList, Result, current_host};

impl Engine for EngineHandle {
    async fn fetch_content(&mut self, url: &str) -> Result<String> {
        self.fetch(url).await
    }

    async fn release(self) -> Result<()> {
        self.quit().await
    }
}

impl Renderer for WkhtmlRenderer {
    async fn render(&self, markup: &str, output: &Path) -> Result<()> {
        WkhtmlRenderer::render(self, markup, output).await
    }
}

/// Acquire a headless Chrome, then render and merge every page in `list`.
///
/// Engine acquisition failures are fatal. Per-page failures end up in
/// [`BuildReport::failures`].
#[instrument(skip_all, fields(pages = list.len()))]
pub async fn build_site(
    list: &PageList,
    config: &AppConfig,
    build: &BuildConfig,
    progress: &dyn ProgressReporter,
) -> Result<BuildReport> {
    let host = current_host();

    progress.phase("Locating wkhtmltopdf");
    let explicit = config.render.wkhtmltopdf_path.as_deref().map(Path::new);
    let tool = ConversionTool::resolve(explicit, host.as_ref());
    if let ConversionTool::Missing(reason) = &tool {
        warn!(%reason, "wkhtmltopdf unavailable, every page will fail to render");
    }
    let renderer = WkhtmlRenderer::new(tool, RenderOptions::from(config));

    progress.phase("Acquiring browser engine");
    let engine = acquire_engine(EngineOptions::from_config(config)?, host.as_ref()).await?;

    run_pipeline(list, engine, &renderer, build, progress).await
}
