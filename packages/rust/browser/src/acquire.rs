//! chromedriver acquisition with multi-source fallback.
//!
//! Each source is attempted once, in order: download the archive, extract it
//! into the source's own directory, confirm the expected executable exists,
//! and mark it executable. Any failure moves on to the next source; only when
//! every source has failed does acquisition fail.

use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use reqwest::Client;
use sitepdf_shared::{DriverPlatform, Result, SitePdfError};
use tracing::{debug, info, instrument, warn};
use zip::ZipArchive;

use crate::sources::AcquisitionSource;

/// User-Agent string for driver downloads.
const USER_AGENT: &str = concat!("sitepdf/", env!("CARGO_PKG_VERSION"));

/// Timeout for a single package download.
const DOWNLOAD_TIMEOUT_SECS: u64 = 120;

/// A resolved driver version must look like `114.0.5735.90`.
static DRIVER_VERSION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d+(\.\d+)+$").expect("driver version regex"));

/// Walks an ordered chain of [`AcquisitionSource`]s until one yields a driver.
pub struct DriverAcquirer {
    client: Client,
    chain: Vec<AcquisitionSource>,
    driver_dir: PathBuf,
}

impl DriverAcquirer {
    /// Create an acquirer that extracts drivers under `driver_dir`.
    pub fn new(chain: Vec<AcquisitionSource>, driver_dir: impl Into<PathBuf>) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(DOWNLOAD_TIMEOUT_SECS))
            .build()
            .map_err(|e| SitePdfError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            chain,
            driver_dir: driver_dir.into(),
        })
    }

    /// Obtain a chromedriver executable matching `browser_version`.
    ///
    /// Reuses a driver extracted by an earlier run for the same browser
    /// version; otherwise tries each source in order.
    #[instrument(skip_all, fields(version = %browser_version, platform = %platform))]
    pub async fn acquire(&self, browser_version: &str, platform: DriverPlatform) -> Result<PathBuf> {
        let version_dir = self.driver_dir.join(browser_version);

        if let Some(cached) = self.cached_driver(&version_dir, platform) {
            info!(path = %cached.display(), "reusing previously downloaded chromedriver");
            return Ok(cached);
        }

        let mut failures: Vec<String> = Vec::new();

        for source in &self.chain {
            info!(source = %source.name, "trying chromedriver source");
            match self
                .try_source(source, browser_version, platform, &version_dir)
                .await
            {
                Ok(path) => {
                    info!(source = %source.name, path = %path.display(), "chromedriver ready");
                    return Ok(path);
                }
                Err(e) => {
                    warn!(source = %source.name, error = %e, "chromedriver source failed");
                    failures.push(format!("{}: {e}", source.name));
                }
            }
        }

        Err(SitePdfError::acquisition(format!(
            "no chromedriver source succeeded for Chrome {browser_version} ({platform}):\n  {}",
            failures.join("\n  ")
        )))
    }

    /// Look for an executable left behind by a previous successful run.
    fn cached_driver(&self, version_dir: &Path, platform: DriverPlatform) -> Option<PathBuf> {
        self.chain
            .iter()
            .map(|source| {
                version_dir
                    .join(&source.name)
                    .join(source.executable_path(platform))
            })
            .find(|path| path.is_file())
    }

    /// One full attempt against a single source.
    async fn try_source(
        &self,
        source: &AcquisitionSource,
        browser_version: &str,
        platform: DriverPlatform,
        version_dir: &Path,
    ) -> Result<PathBuf> {
        let driver_version = match source.resolve_url(browser_version) {
            Some(resolve_url) => self.resolve_driver_version(&resolve_url).await?,
            None => browser_version.to_string(),
        };

        let package_url = source.package_url(&driver_version, platform);
        let archive = self.download(&package_url).await?;

        let dest = version_dir.join(&source.name);
        extract_archive(&archive, &dest)?;

        let exe = dest.join(source.executable_path(platform));
        if !exe.is_file() {
            return Err(SitePdfError::validation(format!(
                "chromedriver executable not found after extraction: {}",
                exe.display()
            )));
        }

        mark_executable(&exe)?;
        Ok(exe)
    }

    /// Ask a latest-release endpoint which driver version to use.
    async fn resolve_driver_version(&self, url: &str) -> Result<String> {
        debug!(%url, "resolving latest driver version");
        let body = self
            .get(url)
            .await?
            .text()
            .await
            .map_err(|e| SitePdfError::Network(format!("{url}: failed to read body: {e}")))?;

        let version = body.trim().to_string();
        if !DRIVER_VERSION_RE.is_match(&version) {
            return Err(SitePdfError::validation(format!(
                "{url}: unexpected version string '{version}'"
            )));
        }
        Ok(version)
    }

    /// Download a package archive into memory.
    async fn download(&self, url: &str) -> Result<Vec<u8>> {
        info!(%url, "downloading chromedriver package");
        let bytes = self
            .get(url)
            .await?
            .bytes()
            .await
            .map_err(|e| SitePdfError::Network(format!("{url}: failed to read body: {e}")))?;
        Ok(bytes.to_vec())
    }

    async fn get(&self, url: &str) -> Result<reqwest::Response> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| SitePdfError::Network(format!("{url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SitePdfError::Network(format!("{url}: HTTP {status}")));
        }
        Ok(response)
    }
}

/// Extract a ZIP archive into a fresh `dest` directory.
fn extract_archive(archive: &[u8], dest: &Path) -> Result<()> {
    if dest.exists() {
        std::fs::remove_dir_all(dest).map_err(|e| SitePdfError::io(dest, e))?;
    }
    std::fs::create_dir_all(dest).map_err(|e| SitePdfError::io(dest, e))?;

    let mut zip = ZipArchive::new(Cursor::new(archive))
        .map_err(|e| SitePdfError::validation(format!("invalid driver archive: {e}")))?;
    zip.extract(dest)
        .map_err(|e| SitePdfError::validation(format!("failed to extract driver archive: {e}")))?;

    debug!(path = %dest.display(), entries = zip.len(), "driver archive extracted");
    Ok(())
}

#[cfg(unix)]
fn mark_executable(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755))
        .map_err(|e| SitePdfError::io(path, e))
}

#[cfg(not(unix))]
fn mark_executable(_path: &Path) -> Result<()> {
    Ok(())
}
