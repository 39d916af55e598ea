//! Minimal W3C WebDriver client over HTTP/JSON.
//!
//! Only the handful of commands the page fetcher needs are implemented:
//! status, session create/delete, page-load timeout, navigation, element
//! lookup by tag name and reading `outerHTML`.

use std::time::{Duration, Instant};

use reqwest::{Client, Method};
use serde::Deserialize;
use serde_json::{Value, json};
use sitepdf_shared::{Result, SitePdfError};
use tracing::{debug, trace};

/// JSON key under which WebDriver returns element references.
const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";

/// Error code for a lookup that matched nothing.
const NO_SUCH_ELEMENT: &str = "no such element";

/// Interval between `/status` probes while the driver boots.
const READY_POLL_INTERVAL: Duration = Duration::from_millis(100);

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

/// Every WebDriver response is wrapped in `{"value": ...}`.
#[derive(Debug, Deserialize)]
struct Reply {
    #[serde(default)]
    value: Value,
}

#[derive(Debug, Deserialize)]
struct WireError {
    error: String,
    #[serde(default)]
    message: String,
}

/// Outcome of a command that may legitimately fail with a WebDriver error.
enum CommandOutcome {
    Value(Value),
    Failed(WireError),
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// A WebDriver session against a running driver.
#[derive(Clone)]
pub struct WebDriverSession {
    client: Client,
    base: String,
    session_id: String,
}

impl WebDriverSession {
    /// Poll `GET /status` until the driver reports ready or `timeout` elapses.
    pub async fn wait_ready(client: &Client, base: &str, timeout: Duration) -> Result<()> {
        let url = format!("{}/status", base.trim_end_matches('/'));
        let deadline = Instant::now() + timeout;

        loop {
            if let Ok(response) = client.get(&url).send().await {
                if let Ok(reply) = response.json::<Reply>().await {
                    if reply.value.get("ready").and_then(Value::as_bool) == Some(true) {
                        debug!(%url, "driver ready");
                        return Ok(());
                    }
                }
            }

            if Instant::now() >= deadline {
                return Err(SitePdfError::Engine(format!(
                    "driver at {base} not ready after {}s",
                    timeout.as_secs()
                )));
            }
            tokio::time::sleep(READY_POLL_INTERVAL).await;
        }
    }

    /// Open a new session with the given capabilities.
    pub async fn create(client: Client, base: &str, capabilities: Value) -> Result<Self> {
        let base = base.trim_end_matches('/').to_string();
        let body = json!({ "capabilities": { "alwaysMatch": capabilities } });

        let value = send(&client, Method::POST, &format!("{base}/session"), Some(body))
            .await?
            .into_result()?;

        let session_id = value
            .get("sessionId")
            .and_then(Value::as_str)
            .ok_or_else(|| SitePdfError::Engine("new session response had no sessionId".into()))?
            .to_string();

        debug!(%session_id, "webdriver session created");
        Ok(Self {
            client,
            base,
            session_id,
        })
    }

    /// Attach to an already-open session.
    pub fn attach(client: Client, base: &str, session_id: impl Into<String>) -> Self {
        Self {
            client,
            base: base.trim_end_matches('/').to_string(),
            session_id: session_id.into(),
        }
    }

    pub fn id(&self) -> &str {
        &self.session_id
    }

    /// Bound how long a navigation may wait for the page load event.
    pub async fn set_page_load_timeout(&self, timeout: Duration) -> Result<()> {
        let body = json!({ "pageLoad": timeout.as_millis() as u64 });
        self.command(Method::POST, "timeouts", Some(body))
            .await?
            .into_result()?;
        Ok(())
    }

    /// Navigate the current browsing context to `url`.
    pub async fn navigate(&self, url: &str) -> Result<()> {
        self.command(Method::POST, "url", Some(json!({ "url": url })))
            .await?
            .into_result()?;
        Ok(())
    }

    /// Find the first element with tag `tag`. `None` when nothing matches yet.
    pub async fn find_element_by_tag(&self, tag: &str) -> Result<Option<String>> {
        let body = json!({ "using": "tag name", "value": tag });
        match self.command(Method::POST, "element", Some(body)).await? {
            CommandOutcome::Value(value) => value
                .get(ELEMENT_KEY)
                .and_then(Value::as_str)
                .map(|id| Some(id.to_string()))
                .ok_or_else(|| SitePdfError::Engine("element response had no reference".into())),
            CommandOutcome::Failed(err) if err.error == NO_SUCH_ELEMENT => Ok(None),
            CommandOutcome::Failed(err) => Err(err.into()),
        }
    }

    /// Serialized markup of an element, including the element itself.
    pub async fn outer_html(&self, element_id: &str) -> Result<String> {
        let value = self
            .command(
                Method::GET,
                &format!("element/{element_id}/property/outerHTML"),
                None,
            )
            .await?
            .into_result()?;

        value
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| SitePdfError::Engine("outerHTML was not a string".into()))
    }

    /// End the session; the driver shuts the browser down.
    pub async fn delete(&self) -> Result<()> {
        self.command(Method::DELETE, "", None)
            .await?
            .into_result()?;
        debug!(session_id = %self.session_id, "webdriver session deleted");
        Ok(())
    }

    async fn command(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<CommandOutcome> {
        let url = if path.is_empty() {
            format!("{}/session/{}", self.base, self.session_id)
        } else {
            format!("{}/session/{}/{path}", self.base, self.session_id)
        };
        send(&self.client, method, &url, body).await
    }
}

// ---------------------------------------------------------------------------
// Transport
// ---------------------------------------------------------------------------

async fn send(
    client: &Client,
    method: Method,
    url: &str,
    body: Option<Value>,
) -> Result<CommandOutcome> {
    trace!(%method, %url, "webdriver command");

    let mut request = client.request(method, url);
    if let Some(body) = body {
        request = request.json(&body);
    }

    let response = request
        .send()
        .await
        .map_err(|e| SitePdfError::Engine(format!("{url}: {e}")))?;
    let status = response.status();
    let reply: Reply = response
        .json()
        .await
        .map_err(|e| SitePdfError::Engine(format!("{url}: HTTP {status}, invalid body: {e}")))?;

    if status.is_success() {
        return Ok(CommandOutcome::Value(reply.value));
    }

    match serde_json::from_value::<WireError>(reply.value) {
        Ok(err) => Ok(CommandOutcome::Failed(err)),
        Err(_) => Err(SitePdfError::Engine(format!("{url}: HTTP {status}"))),
    }
}

impl CommandOutcome {
    fn into_result(self) -> Result<Value> {
        match self {
            Self::Value(value) => Ok(value),
            Self::Failed(err) => Err(err.into()),
        }
    }
}

impl From<WireError> for SitePdfError {
    fn from(err: WireError) -> Self {
        SitePdfError::Engine(format!("{}: {}", err.error, err.message))
    }
}
