//! Host platform capabilities.
//!
//! Everything that differs between Windows and Unix-like hosts lives behind
//! [`HostPlatform`]: how the installed Chrome version is discovered, where the
//! Chrome and wkhtmltopdf binaries usually live, and which chromedriver
//! package matches the host. [`current_host`] picks the implementation once
//! at startup; callers never branch on `cfg!(windows)` themselves.

use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use crate::error::{Result, SitePdfError};

/// Registry key where Chrome records its installed version.
const CHROME_BEACON_KEY: &str = r"HKEY_CURRENT_USER\Software\Google\Chrome\BLBeacon";

/// Matches a full four-part Chrome version (`120.0.6099.109`).
static FULL_VERSION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d+\.\d+\.\d+\.\d+)\b").expect("full version regex"));

/// Matches any dotted version number (`120.0`).
static ANY_VERSION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d+(?:\.\d+)+)\b").expect("version regex"));

// ---------------------------------------------------------------------------
// DriverPlatform
// ---------------------------------------------------------------------------

/// Platform identifiers used by chromedriver package hosts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverPlatform {
    Win32,
    Win64,
    Linux64,
    MacX64,
    MacArm64,
}

impl DriverPlatform {
    /// The platform this binary was compiled for.
    pub fn current() -> Self {
        if cfg!(target_os = "windows") {
            if cfg!(target_pointer_width = "64") {
                Self::Win64
            } else {
                Self::Win32
            }
        } else if cfg!(target_os = "macos") {
            if cfg!(target_arch = "aarch64") {
                Self::MacArm64
            } else {
                Self::MacX64
            }
        } else {
            Self::Linux64
        }
    }

    /// Name used by Chrome for Testing downloads.
    pub fn cft_name(self) -> &'static str {
        match self {
            Self::Win32 => "win32",
            Self::Win64 => "win64",
            Self::Linux64 => "linux64",
            Self::MacX64 => "mac-x64",
            Self::MacArm64 => "mac-arm64",
        }
    }

    /// Name used by the legacy chromedriver storage (only ever shipped win32 for Windows).
    pub fn legacy_name(self) -> &'static str {
        match self {
            Self::Win32 | Self::Win64 => "win32",
            Self::Linux64 => "linux64",
            Self::MacX64 => "mac64",
            Self::MacArm64 => "mac_arm64",
        }
    }

    /// File name of the chromedriver executable on this platform.
    pub fn driver_executable(self) -> &'static str {
        match self {
            Self::Win32 | Self::Win64 => "chromedriver.exe",
            _ => "chromedriver",
        }
    }
}

impl std::fmt::Display for DriverPlatform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.cft_name())
    }
}

// ---------------------------------------------------------------------------
// HostPlatform
// ---------------------------------------------------------------------------

/// Platform-specific lookups for the browser and the PDF converter.
pub trait HostPlatform: Send + Sync {
    /// Human-readable host name for tracing.
    fn name(&self) -> &str;

    /// Read the installed Chrome version from the host.
    fn detect_browser_version(&self) -> Result<String>;

    /// Known Chrome binary locations, most preferred first.
    fn browser_binary_candidates(&self) -> Vec<PathBuf>;

    /// Known wkhtmltopdf install locations, most preferred first.
    fn conversion_tool_candidates(&self) -> Vec<PathBuf>;

    /// chromedriver package flavour for this host.
    fn driver_platform(&self) -> DriverPlatform;

    /// Whether Chrome must be pointed at an explicit binary on this host.
    fn requires_explicit_binary(&self) -> bool {
        false
    }

    /// Extra Chrome switches needed on this host.
    fn extra_browser_args(&self) -> Vec<String> {
        Vec::new()
    }

    /// First existing Chrome binary among the candidates.
    fn browser_binary(&self) -> Option<PathBuf> {
        self.browser_binary_candidates()
            .into_iter()
            .find(|p| p.is_file())
    }

    /// First existing wkhtmltopdf among the install locations.
    fn locate_conversion_tool(&self) -> Option<PathBuf> {
        self.conversion_tool_candidates()
            .into_iter()
            .find(|p| p.is_file())
    }
}

/// Select the host implementation for the running platform.
pub fn current_host() -> Box<dyn HostPlatform> {
    if cfg!(target_os = "windows") {
        Box::new(WindowsHost)
    } else {
        Box::new(UnixHost)
    }
}

// ---------------------------------------------------------------------------
// Windows
// ---------------------------------------------------------------------------

/// Windows: version from the registry, falling back to the `chrome.exe` file version.
pub struct WindowsHost;

impl WindowsHost {
    fn version_from_registry(&self) -> Option<String> {
        let output = Command::new("reg")
            .args(["query", CHROME_BEACON_KEY, "/v", "version"])
            .output()
            .ok()?;
        if !output.status.success() {
            return None;
        }
        parse_version(&String::from_utf8_lossy(&output.stdout))
    }

    fn version_from_file(&self, exe: &Path) -> Option<String> {
        // wmic wants doubled backslashes inside the WQL string
        let wql_path = exe.to_string_lossy().replace('\\', "\\\\");
        let output = Command::new("wmic")
            .args([
                "datafile",
                "where",
                &format!("name=\"{wql_path}\""),
                "get",
                "Version",
                "/value",
            ])
            .output()
            .ok()?;
        parse_version(&String::from_utf8_lossy(&output.stdout))
    }
}

impl HostPlatform for WindowsHost {
    fn name(&self) -> &str {
        "windows"
    }

    fn detect_browser_version(&self) -> Result<String> {
        if let Some(version) = self.version_from_registry() {
            debug!(%version, "chrome version from registry");
            return Ok(version);
        }

        for exe in self.browser_binary_candidates() {
            if !exe.is_file() {
                continue;
            }
            if let Some(version) = self.version_from_file(&exe) {
                debug!(%version, path = %exe.display(), "chrome version from file metadata");
                return Ok(version);
            }
        }

        Err(SitePdfError::acquisition(
            "Chrome browser not found (no registry entry and no chrome.exe in Program Files)",
        ))
    }

    fn browser_binary_candidates(&self) -> Vec<PathBuf> {
        vec![
            PathBuf::from(r"C:\Program Files\Google\Chrome\Application\chrome.exe"),
            PathBuf::from(r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe"),
        ]
    }

    fn conversion_tool_candidates(&self) -> Vec<PathBuf> {
        vec![
            PathBuf::from(r"C:\Program Files\wkhtmltopdf\bin\wkhtmltopdf.exe"),
            PathBuf::from(r"C:\Program Files (x86)\wkhtmltopdf\bin\wkhtmltopdf.exe"),
        ]
    }

    fn driver_platform(&self) -> DriverPlatform {
        DriverPlatform::current()
    }

    fn requires_explicit_binary(&self) -> bool {
        true
    }

    fn extra_browser_args(&self) -> Vec<String> {
        vec![
            "--disable-extensions".into(),
            "--disable-software-rasterizer".into(),
        ]
    }
}

// ---------------------------------------------------------------------------
// Unix (Linux, macOS)
// ---------------------------------------------------------------------------

/// Linux and macOS: version from `<chrome> --version`.
pub struct UnixHost;

impl HostPlatform for UnixHost {
    fn name(&self) -> &str {
        "unix"
    }

    fn detect_browser_version(&self) -> Result<String> {
        for exe in self.browser_binary_candidates() {
            let Ok(output) = Command::new(&exe).arg("--version").output() else {
                continue;
            };
            if !output.status.success() {
                continue;
            }
            if let Some(version) = parse_version(&String::from_utf8_lossy(&output.stdout)) {
                debug!(%version, path = %exe.display(), "chrome version from --version");
                return Ok(version);
            }
        }

        Err(SitePdfError::acquisition(
            "Chrome browser not found (tried google-chrome, chromium and the macOS app bundle)",
        ))
    }

    fn browser_binary_candidates(&self) -> Vec<PathBuf> {
        let mut candidates: Vec<PathBuf> = [
            "google-chrome",
            "google-chrome-stable",
            "chromium",
            "chromium-browser",
        ]
        .iter()
        .filter_map(|name| which::which(name).ok())
        .collect();

        if cfg!(target_os = "macos") {
            candidates.push(PathBuf::from(
                "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
            ));
        }
        candidates
    }

    fn conversion_tool_candidates(&self) -> Vec<PathBuf> {
        vec![
            PathBuf::from("/usr/local/bin/wkhtmltopdf"),
            PathBuf::from("/usr/bin/wkhtmltopdf"),
            PathBuf::from("/opt/homebrew/bin/wkhtmltopdf"),
        ]
    }

    fn driver_platform(&self) -> DriverPlatform {
        DriverPlatform::current()
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Pull a Chrome version out of tool output such as `Google Chrome 120.0.6099.109`.
pub fn parse_version(text: &str) -> Option<String> {
    FULL_VERSION_RE
        .captures(text)
        .or_else(|| ANY_VERSION_RE.captures(text))
        .map(|caps| caps[1].to_string())
}

/// Major component of a dotted version (`120.0.6099.109` → `120`).
pub fn major_version(version: &str) -> &str {
    version.split('.').next().unwrap_or(version)
}
