//! Browser engine acquisition and page fetching.
//!
//! [`acquire_engine`] runs the full acquisition sequence: detect the installed
//! Chrome version, obtain a matching chromedriver from the first source in
//! the fallback chain that works, and launch a headless session. The returned
//! [`EngineHandle`] fetches rendered page content until it is quit.

pub mod acquire;
pub mod engine;
pub mod sources;
pub mod webdriver;

pub use acquire::DriverAcquirer;
pub use engine::{EngineHandle, EngineOptions, chrome_capabilities};
pub use sources::{AcquisitionSource, SourceKind, default_chain};
pub use webdriver::WebDriverSession;

use std::path::PathBuf;

use sitepdf_shared::{HostPlatform, Result, SitePdfError};
use tracing::{info, instrument};

/// Detect, acquire, and launch. Every failure here is fatal to the run.
#[instrument(skip_all, fields(host = host.name()))]
pub async fn acquire_engine(opts: EngineOptions, host: &dyn HostPlatform) -> Result<EngineHandle> {
    let driver = locate_driver(&opts, host).await?;
    EngineHandle::launch(&driver, opts, host).await
}

/// Resolve the chromedriver executable, downloading it when needed.
pub async fn locate_driver(opts: &EngineOptions, host: &dyn HostPlatform) -> Result<PathBuf> {
    if let Some(path) = &opts.driver_path {
        if !path.is_file() {
            return Err(SitePdfError::acquisition(format!(
                "configured driver_path does not exist: {}",
                path.display()
            )));
        }
        info!(path = %path.display(), "using configured chromedriver");
        return Ok(path.clone());
    }

    let version = host.detect_browser_version()?;
    info!(%version, "detected Chrome");

    let acquirer = DriverAcquirer::new(default_chain(&opts.sources), &opts.driver_dir)?;
    acquirer.acquire(&version, host.driver_platform()).await
}
