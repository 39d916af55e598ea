//! chromedriver acquisition sources.
//!
//! A source describes where a driver package lives and what the archive looks
//! like once extracted. Sources are tried in priority order by
//! [`DriverAcquirer`](crate::acquire::DriverAcquirer); the first one that
//! yields an executable wins.

use std::path::PathBuf;

use sitepdf_shared::{DriverPlatform, SourcesConfig, major_version};

/// How a source maps a browser version to a package URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    /// `{base}/{version}/{platform}/chromedriver-{platform}.zip` for the exact version.
    /// The executable sits under `chromedriver-{platform}/`.
    Versioned,
    /// `{base}/LATEST_RELEASE_{major}` names a concrete version, then
    /// `{base}/{resolved}/chromedriver_{legacy-platform}.zip` is fetched.
    /// The executable sits at the archive root.
    LatestForMajor,
}

/// One candidate location for the driver package.
#[derive(Debug, Clone)]
pub struct AcquisitionSource {
    /// Short name used in logs and as the extraction subdirectory.
    pub name: String,
    /// Host base URL, without trailing slash.
    pub base_url: String,
    /// URL scheme and archive layout.
    pub kind: SourceKind,
}

impl AcquisitionSource {
    /// Create a source, normalising the base URL.
    pub fn new(name: impl Into<String>, base_url: &str, kind: SourceKind) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.trim_end_matches('/').to_string(),
            kind,
        }
    }

    /// URL that resolves the concrete driver version, for sources that need one.
    pub fn resolve_url(&self, browser_version: &str) -> Option<String> {
        match self.kind {
            SourceKind::Versioned => None,
            SourceKind::LatestForMajor => Some(format!(
                "{}/LATEST_RELEASE_{}",
                self.base_url,
                major_version(browser_version)
            )),
        }
    }

    /// Package URL for a concrete driver version.
    pub fn package_url(&self, driver_version: &str, platform: DriverPlatform) -> String {
        match self.kind {
            SourceKind::Versioned => {
                let p = platform.cft_name();
                format!(
                    "{}/{driver_version}/{p}/chromedriver-{p}.zip",
                    self.base_url
                )
            }
            SourceKind::LatestForMajor => format!(
                "{}/{driver_version}/chromedriver_{}.zip",
                self.base_url,
                platform.legacy_name()
            ),
        }
    }

    /// Where the executable must be, relative to the extraction directory.
    pub fn executable_path(&self, platform: DriverPlatform) -> PathBuf {
        match self.kind {
            SourceKind::Versioned => PathBuf::from(format!("chromedriver-{}", platform.cft_name()))
                .join(platform.driver_executable()),
            SourceKind::LatestForMajor => PathBuf::from(platform.driver_executable()),
        }
    }
}

/// The standard three-source chain: primary, mirror, latest-for-major.
pub fn default_chain(sources: &SourcesConfig) -> Vec<AcquisitionSource> {
    vec![
        AcquisitionSource::new("primary", &sources.primary, SourceKind::Versioned),
        AcquisitionSource::new("mirror", &sources.mirror, SourceKind::Versioned),
        AcquisitionSource::new("latest-for-major", &sources.legacy, SourceKind::LatestForMajor),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_chain_order() {
        let chain = default_chain(&SourcesConfig::default());
        let names: Vec<&str> = chain.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["primary", "mirror", "latest-for-major"]);
        assert_eq!(chain[2].kind, SourceKind::LatestForMajor);
    }

    #[test]
    fn versioned_urls() {
        let chain = default_chain(&SourcesConfig::default());
        assert_eq!(
            chain[0].package_url("120.0.6099.109", DriverPlatform::Win32),
            "https://storage.googleapis.com/chrome-for-testing-public/120.0.6099.109/win32/chromedriver-win32.zip"
        );
        assert_eq!(
            chain[1].package_url("120.0.6099.109", DriverPlatform::Linux64),
            "https://edgedl.me.gvt1.com/edgedl/chrome/chrome-for-testing/120.0.6099.109/linux64/chromedriver-linux64.zip"
        );
        assert!(chain[0].resolve_url("120.0.6099.109").is_none());
    }

    #[test]
    fn latest_for_major_urls() {
        let chain = default_chain(&SourcesConfig::default());
        let legacy = &chain[2];
        assert_eq!(
            legacy.resolve_url("114.0.5735.199").as_deref(),
            Some("https://chromedriver.storage.googleapis.com/LATEST_RELEASE_114")
        );
        assert_eq!(
            legacy.package_url("114.0.5735.90", DriverPlatform::MacX64),
            "https://chromedriver.storage.googleapis.com/114.0.5735.90/chromedriver_mac64.zip"
        );
    }

    #[test]
    fn executable_layouts() {
        let versioned = AcquisitionSource::new("p", "http://h/", SourceKind::Versioned);
        assert_eq!(
            versioned.executable_path(DriverPlatform::Win64),
            PathBuf::from("chromedriver-win64").join("chromedriver.exe")
        );
        assert_eq!(versioned.base_url, "http://h");

        let legacy = AcquisitionSource::new("l", "http://h", SourceKind::LatestForMajor);
        assert_eq!(
            legacy.executable_path(DriverPlatform::Linux64),
            PathBuf::from("chromedriver")
        );
    }
}
