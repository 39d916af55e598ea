//! Shared types, error model, and configuration for sitepdf.
//!
//! This crate is the foundation depended on by all other sitepdf crates.
//! It provides:
//! - [`SitePdfError`], the unified error type
//! - Domain types ([`PageList`], [`PageReference`])
//! - Configuration ([`AppConfig`], config loading)
//! - Host platform capabilities ([`HostPlatform`], [`current_host`])

pub mod config;
pub mod error;
pub mod host;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, BrowserConfig, ExtractConfig, OutputConfig, RenderConfig, SourcesConfig,
    config_dir, config_file_path, driver_dir, init_config, load_config, load_config_from,
};
pub use error::{ACQUISITION_REMEDIATION, RENDER_REMEDIATION, Result, SitePdfError};
pub use host::{
    DriverPlatform, HostPlatform, UnixHost, WindowsHost, current_host, major_version,
    parse_version,
};
pub use types::{PageList, PageReference};
