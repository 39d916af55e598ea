//! Headless Chrome engine: launch, page fetch, and release.
//!
//! An [`EngineHandle`] owns the chromedriver child process and the WebDriver
//! session driving Chrome. `quit` consumes the handle, so it can run at most
//! once; a handle dropped without `quit` still kills the driver process.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

use reqwest::Client;
use serde_json::{Value, json};
use sitepdf_shared::{AppConfig, HostPlatform, Result, SitePdfError, SourcesConfig, driver_dir};
use tokio::process::{Child, Command};
use tracing::{debug, info, instrument, warn};

use crate::webdriver::WebDriverSession;

/// Upper bound for the driver to answer `/status` after spawn.
const DRIVER_READY_TIMEOUT: Duration = Duration::from_secs(10);

/// Headroom over the page-load timeout for the HTTP request carrying a navigation.
const COMMAND_TIMEOUT_SLACK: Duration = Duration::from_secs(30);

/// Extra time the local navigation bound allows past the driver's `pageLoad`
/// timeout, so the driver reports its own timeout first.
const NAVIGATION_GRACE: Duration = Duration::from_secs(5);

/// Bound on the session delete issued when a handle is dropped without `quit`.
const DROP_DELETE_TIMEOUT: Duration = Duration::from_secs(5);

// ---------------------------------------------------------------------------
// EngineOptions
// ---------------------------------------------------------------------------

/// Launch and fetch settings for one engine.
#[derive(Debug, Clone)]
pub struct EngineOptions {
    pub driver_port: u16,
    pub debug_port: u16,
    pub navigation_timeout: Duration,
    /// Added to `navigation_timeout` for the local bound on a navigation.
    pub navigation_grace: Duration,
    pub settle_delay: Duration,
    pub content_timeout: Duration,
    pub poll_interval: Duration,
    /// Tag name of the element holding the page content.
    pub content_tag: String,
    pub chrome_binary: Option<PathBuf>,
    /// Pre-installed driver; skips acquisition.
    pub driver_path: Option<PathBuf>,
    pub driver_dir: PathBuf,
    pub sources: SourcesConfig,
}

impl EngineOptions {
    /// Build options from the `[browser]` and `[sources]` config sections.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let browser = &config.browser;
        Ok(Self {
            driver_port: browser.driver_port,
            debug_port: browser.debug_port,
            navigation_timeout: Duration::from_secs(browser.navigation_timeout_secs),
            navigation_grace: NAVIGATION_GRACE,
            settle_delay: Duration::from_millis(browser.settle_delay_ms),
            content_timeout: Duration::from_secs(browser.content_timeout_secs),
            poll_interval: Duration::from_millis(browser.poll_interval_ms.max(1)),
            content_tag: browser.content_tag.clone(),
            chrome_binary: browser.chrome_binary.as_ref().map(PathBuf::from),
            driver_path: browser.driver_path.as_ref().map(PathBuf::from),
            driver_dir: driver_dir(config)?,
            sources: config.sources.clone(),
        })
    }

    fn driver_url(&self) -> String {
        format!("http://127.0.0.1:{}", self.driver_port)
    }
}

/// `goog:chromeOptions` capabilities for a headless run on `host`.
pub fn chrome_capabilities(opts: &EngineOptions, host: &dyn HostPlatform) -> Value {
    let mut args = vec![
        "--headless=new".to_string(),
        "--disable-gpu".to_string(),
        "--no-sandbox".to_string(),
        "--disable-dev-shm-usage".to_string(),
        format!("--remote-debugging-port={}", opts.debug_port),
    ];
    args.extend(host.extra_browser_args());

    let mut chrome_options = json!({ "args": args });

    let binary = opts.chrome_binary.clone().or_else(|| {
        if host.requires_explicit_binary() {
            host.browser_binary()
        } else {
            None
        }
    });
    if let Some(binary) = binary {
        chrome_options["binary"] = Value::String(binary.to_string_lossy().into_owned());
    } else if host.requires_explicit_binary() {
        warn!(host = host.name(), "no Chrome binary found in known install locations");
    }

    json!({
        "browserName": "chrome",
        "goog:chromeOptions": chrome_options,
    })
}

// ---------------------------------------------------------------------------
// EngineHandle
// ---------------------------------------------------------------------------

/// A running chromedriver plus its Chrome session.
pub struct EngineHandle {
    session: WebDriverSession,
    driver: Option<Child>,
    opts: EngineOptions,
}

impl EngineHandle {
    /// Spawn `driver` and open a headless Chrome session through it.
    #[instrument(skip_all, fields(driver = %driver.display(), port = opts.driver_port))]
    pub async fn launch(driver: &Path, opts: EngineOptions, host: &dyn HostPlatform) -> Result<Self> {
        let mut child = Command::new(driver)
            .arg(format!("--port={}", opts.driver_port))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                SitePdfError::Engine(format!("failed to start {}: {e}", driver.display()))
            })?;

        let client = Client::builder()
            .timeout(opts.navigation_timeout + COMMAND_TIMEOUT_SLACK)
            .build()
            .map_err(|e| SitePdfError::Engine(format!("failed to build HTTP client: {e}")))?;

        let base = opts.driver_url();
        let session = async {
            WebDriverSession::wait_ready(&client, &base, DRIVER_READY_TIMEOUT).await?;
            let session =
                WebDriverSession::create(client.clone(), &base, chrome_capabilities(&opts, host))
                    .await?;
            session.set_page_load_timeout(opts.navigation_timeout).await?;
            Ok::<_, SitePdfError>(session)
        }
        .await;

        let session = match session {
            Ok(session) => session,
            Err(e) => {
                let _ = child.start_kill();
                return Err(e);
            }
        };

        info!(session_id = session.id(), "headless chrome started");
        Ok(Self {
            session,
            driver: Some(child),
            opts,
        })
    }

    /// Wrap an existing session without owning a driver process.
    pub fn attach(session: WebDriverSession, opts: EngineOptions) -> Self {
        Self {
            session,
            driver: None,
            opts,
        }
    }

    /// Navigate to `url`, wait for the content element, and return its outer markup.
    ///
    /// Every failure becomes a [`SitePdfError::PageFetch`] carrying the URL.
    #[instrument(skip(self))]
    pub async fn fetch(&self, url: &str) -> Result<String> {
        let started = Instant::now();

        let bound = self.opts.navigation_timeout + self.opts.navigation_grace;
        match tokio::time::timeout(bound, self.session.navigate(url)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(SitePdfError::page_fetch(url, e.to_string())),
            Err(_) => {
                return Err(SitePdfError::page_fetch(
                    url,
                    format!("navigation timed out after {}ms", bound.as_millis()),
                ));
            }
        }

        // No readiness signal for client-side rendering.
        tokio::time::sleep(self.opts.settle_delay).await;

        let element = self
            .wait_for_content()
            .await
            .map_err(|e| SitePdfError::page_fetch(url, e.to_string()))?;

        let markup = self
            .session
            .outer_html(&element)
            .await
            .map_err(|e| SitePdfError::page_fetch(url, e.to_string()))?;

        debug!(
            bytes = markup.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "page content captured"
        );
        Ok(markup)
    }

    async fn wait_for_content(&self) -> Result<String> {
        let deadline = Instant::now() + self.opts.content_timeout;
        loop {
            if let Some(id) = self.session.find_element_by_tag(&self.opts.content_tag).await? {
                return Ok(id);
            }
            if Instant::now() >= deadline {
                return Err(SitePdfError::Engine(format!(
                    "no <{}> element within {}s",
                    self.opts.content_tag,
                    self.opts.content_timeout.as_secs()
                )));
            }
            tokio::time::sleep(self.opts.poll_interval).await;
        }
    }

    /// End the session and stop the driver.
    pub async fn quit(mut self) -> Result<()> {
        let result = self.session.delete().await;
        if let Some(mut child) = self.driver.take() {
            if let Err(e) = child.kill().await {
                warn!(error = %e, "failed to stop chromedriver");
            }
        }
        info!("engine released");
        result
    }
}

impl Drop for EngineHandle {
    fn drop(&mut self) {
        let Some(mut child) = self.driver.take() else {
            return;
        };
        warn!("engine dropped without quit, cleaning up");

        // Chrome exits only when its session is deleted; killing the driver
        // alone leaves the browser running.
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                let session = self.session.clone();
                runtime.spawn(async move {
                    if tokio::time::timeout(DROP_DELETE_TIMEOUT, session.delete())
                        .await
                        .is_err()
                    {
                        debug!("session delete on drop timed out");
                    }
                    let _ = child.kill().await;
                });
            }
            Err(_) => {
                let _ = child.start_kill();
            }
        }
    }
}
