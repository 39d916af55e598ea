//! Application configuration for sitepdf.
//!
//! User config lives at `~/.sitepdf/sitepdf.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, SitePdfError};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "sitepdf.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".sitepdf";

/// Directory (under the config dir) where downloaded drivers are kept.
const DRIVERS_DIR_NAME: &str = "drivers";

// ---------------------------------------------------------------------------
// Config structs (matching sitepdf.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Navigation link extraction.
    #[serde(default)]
    pub extract: ExtractConfig,

    /// Browser and driver settings.
    #[serde(default)]
    pub browser: BrowserConfig,

    /// Driver download sources.
    #[serde(default)]
    pub sources: SourcesConfig,

    /// PDF conversion settings.
    #[serde(default)]
    pub render: RenderConfig,

    /// Output locations.
    #[serde(default)]
    pub output: OutputConfig,
}

/// `[extract]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractConfig {
    /// Path prefix stripped from navigation hrefs (the docs mount point).
    #[serde(default = "default_mount_prefix")]
    pub mount_prefix: String,

    /// Base URL written into freshly extracted page lists.
    #[serde(default = "default_base_url")]
    pub base_url: String,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            mount_prefix: default_mount_prefix(),
            base_url: default_base_url(),
        }
    }
}

fn default_mount_prefix() -> String {
    "/docs".into()
}
fn default_base_url() -> String {
    "https://nextjs-ko.org/docs".into()
}

/// `[browser]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserConfig {
    /// Chrome remote debugging port.
    #[serde(default = "default_debug_port")]
    pub debug_port: u16,

    /// Port chromedriver listens on.
    #[serde(default = "default_driver_port")]
    pub driver_port: u16,

    /// Upper bound for a single page navigation.
    #[serde(default = "default_navigation_timeout")]
    pub navigation_timeout_secs: u64,

    /// Fixed wait after navigation for client-side rendering.
    #[serde(default = "default_settle_delay")]
    pub settle_delay_ms: u64,

    /// Upper bound for the content element to appear.
    #[serde(default = "default_content_timeout")]
    pub content_timeout_secs: u64,

    /// Interval between content element lookups.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    /// Tag name of the element holding the page content.
    #[serde(default = "default_content_tag")]
    pub content_tag: String,

    /// Explicit Chrome binary location.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chrome_binary: Option<String>,

    /// Explicit chromedriver executable; skips driver acquisition when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub driver_path: Option<String>,

    /// Where downloaded drivers are extracted (defaults to `~/.sitepdf/drivers`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub driver_dir: Option<String>,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            debug_port: default_debug_port(),
            driver_port: default_driver_port(),
            navigation_timeout_secs: default_navigation_timeout(),
            settle_delay_ms: default_settle_delay(),
            content_timeout_secs: default_content_timeout(),
            poll_interval_ms: default_poll_interval(),
            content_tag: default_content_tag(),
            chrome_binary: None,
            driver_path: None,
            driver_dir: None,
        }
    }
}

fn default_debug_port() -> u16 {
    9222
}
fn default_driver_port() -> u16 {
    9515
}
fn default_navigation_timeout() -> u64 {
    30
}
fn default_settle_delay() -> u64 {
    5000
}
fn default_content_timeout() -> u64 {
    20
}
fn default_poll_interval() -> u64 {
    500
}
fn default_content_tag() -> String {
    "article".into()
}

/// `[sources]` section: base URLs of the driver package hosts, in priority order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourcesConfig {
    /// Chrome for Testing storage (exact version).
    #[serde(default = "default_primary_source")]
    pub primary: String,

    /// Alternate Chrome for Testing host (exact version).
    #[serde(default = "default_mirror_source")]
    pub mirror: String,

    /// Legacy chromedriver storage with `LATEST_RELEASE_<major>` resolution.
    #[serde(default = "default_legacy_source")]
    pub legacy: String,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            primary: default_primary_source(),
            mirror: default_mirror_source(),
            legacy: default_legacy_source(),
        }
    }
}

fn default_primary_source() -> String {
    "https://storage.googleapis.com/chrome-for-testing-public".into()
}
fn default_mirror_source() -> String {
    "https://edgedl.me.gvt1.com/edgedl/chrome/chrome-for-testing".into()
}
fn default_legacy_source() -> String {
    "https://chromedriver.storage.googleapis.com".into()
}

/// `[render]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderConfig {
    /// Explicit wkhtmltopdf executable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wkhtmltopdf_path: Option<String>,

    /// Paper size passed to the converter.
    #[serde(default = "default_page_size")]
    pub page_size: String,

    /// Margin applied to all four sides.
    #[serde(default = "default_margin")]
    pub margin: String,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            wkhtmltopdf_path: None,
            page_size: default_page_size(),
            margin: default_margin(),
        }
    }
}

fn default_page_size() -> String {
    "A4".into()
}
fn default_margin() -> String {
    "0.75in".into()
}

/// `[output]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Directory for per-page and merged PDFs.
    #[serde(default = "default_output_dir")]
    pub dir: String,

    /// File name of the merged PDF inside `dir`.
    #[serde(default = "default_merged_filename")]
    pub merged_filename: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: default_output_dir(),
            merged_filename: default_merged_filename(),
        }
    }
}

fn default_output_dir() -> String {
    "output_pdfs".into()
}
fn default_merged_filename() -> String {
    "merged_docs.pdf".into()
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.sitepdf/`).
pub fn config_dir() -> Result<PathBuf> {
    let home =
        dirs::home_dir().ok_or_else(|| SitePdfError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.sitepdf/sitepdf.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Resolve the driver download directory, honouring `browser.driver_dir`.
pub fn driver_dir(config: &AppConfig) -> Result<PathBuf> {
    match &config.browser.driver_dir {
        Some(dir) => Ok(PathBuf::from(dir)),
        None => Ok(config_dir()?.join(DRIVERS_DIR_NAME)),
    }
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| SitePdfError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| SitePdfError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| SitePdfError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| SitePdfError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| SitePdfError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("mount_prefix"));
        assert!(toml_str.contains("chrome-for-testing-public"));
        // Unset overrides are omitted
        assert!(!toml_str.contains("driver_path"));
    }

    #[test]
    fn config_roundtrip() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize");
        let parsed: AppConfig = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed.browser.debug_port, 9222);
        assert_eq!(parsed.browser.content_tag, "article");
        assert_eq!(parsed.render.page_size, "A4");
    }

    #[test]
    fn partial_config_fills_defaults() {
        let toml_str = r#"
[browser]
settle_delay_ms = 100
driver_path = "/opt/chromedriver"

[render]
wkhtmltopdf_path = "C:\\Program Files\\wkhtmltopdf\\bin\\wkhtmltopdf.exe"
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        assert_eq!(config.browser.settle_delay_ms, 100);
        assert_eq!(config.browser.content_timeout_secs, 20);
        assert_eq!(config.browser.driver_path.as_deref(), Some("/opt/chromedriver"));
        assert!(config.render.wkhtmltopdf_path.is_some());
        assert_eq!(config.extract.mount_prefix, "/docs");
        assert_eq!(config.output.merged_filename, "merged_docs.pdf");
    }

    #[test]
    fn malformed_config_is_config_error() {
        let dir = std::env::temp_dir().join(format!("sitepdf-config-{}", uuid::Uuid::now_v7()));
        std::fs::create_dir_all(&dir).expect("create tmp dir");
        let path = dir.join("sitepdf.toml");
        std::fs::write(&path, "[browser\nport = ").expect("write");

        let err = load_config_from(&path).unwrap_err();
        assert!(matches!(err, SitePdfError::Config { .. }));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn driver_dir_override() {
        let mut config = AppConfig::default();
        config.browser.driver_dir = Some("/tmp/drivers".into());
        assert_eq!(driver_dir(&config).unwrap(), PathBuf::from("/tmp/drivers"));
    }
}
