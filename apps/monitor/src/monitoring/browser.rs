//! Chromium-backed session provider.
//!
//! One headless browser process serves the whole run; every check gets its
//! own browser context, so cookies and storage never leak between projects.
//! The process is launched lazily by the orchestrator and torn down once
//! after the last session-based check.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::network::{EventResponseReceived, ResourceType};
use chromiumoxide::cdp::browser_protocol::target::{
    BrowserContextId, CreateBrowserContextParams, CreateTargetParams,
};
use chromiumoxide::handler::viewport::Viewport;
use chromiumoxide::page::Page;
use futures::StreamExt;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, warn};

use super::session::{BrowserLauncher, PageSession, Session, SessionProvider};

/// Realistic desktop identity; headless defaults get served interstitials
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                          (KHTML, like Gecko) Chrome/121.0.0.0 Safari/537.36";

pub struct ChromeSessionProvider {
    browser: Arc<Mutex<Browser>>,
    handler: JoinHandle<()>,
    navigation_timeout: Duration,
}

impl ChromeSessionProvider {
    pub async fn launch(navigation_timeout: Duration) -> Result<Self> {
        let config = BrowserConfig::builder()
            .no_sandbox()
            .window_size(1280, 800)
            .viewport(Viewport {
                width: 1280,
                height: 800,
                device_scale_factor: None,
                emulating_mobile: false,
                is_landscape: false,
                has_touch: false,
            })
            .arg("--lang=en-US")
            .build()
            .map_err(|error| anyhow!("invalid browser configuration: {error}"))?;

        let (browser, mut handler) =
            Browser::launch(config).await.context("failed to launch browser")?;

        // The handler future must be polled for the lifetime of the
        // connection; it dies with the browser.
        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        Ok(Self { browser: Arc::new(Mutex::new(browser)), handler, navigation_timeout })
    }
}

#[async_trait]
impl SessionProvider for ChromeSessionProvider {
    async fn open(&self) -> Result<Session> {
        let mut browser = self.browser.lock().await;

        let context_id = browser
            .create_browser_context(CreateBrowserContextParams::default())
            .await
            .context("failed to create browser context")?;

        let params = CreateTargetParams::builder()
            .url("about:blank")
            .browser_context_id(context_id.clone())
            .build()
            .map_err(|error| anyhow!("invalid target parameters: {error}"))?;

        let page = browser.new_page(params).await.context("failed to open page")?;
        page.set_user_agent(USER_AGENT).await.context("failed to set user agent")?;

        Ok(Session::new(Box::new(ChromeSession {
            browser: Arc::clone(&self.browser),
            page,
            context_id,
            navigation_timeout: self.navigation_timeout,
        })))
    }

    async fn shutdown(&self) -> Result<()> {
        let mut browser = self.browser.lock().await;
        browser.close().await.context("failed to close browser")?;
        if let Err(error) = browser.wait().await {
            debug!("Browser process did not exit cleanly: {error}");
        }
        self.handler.abort();
        Ok(())
    }
}

struct ChromeSession {
    browser: Arc<Mutex<Browser>>,
    page: Page,
    context_id: BrowserContextId,
    navigation_timeout: Duration,
}

#[async_trait]
impl PageSession for ChromeSession {
    async fn goto(&self, url: &str) -> Result<Option<u16>> {
        // Subscribe before navigating so the main document response is not
        // missed.
        let mut responses = self
            .page
            .event_listener::<EventResponseReceived>()
            .await
            .context("failed to subscribe to network events")?;

        timeout(self.navigation_timeout, self.page.goto(url))
            .await
            .map_err(|_| anyhow!("navigation to {url} timed out"))?
            .with_context(|| format!("navigation to {url} failed"))?;

        // The document response is normally already buffered; give the
        // listener a short grace period to flush it.
        let mut status = None;
        while let Ok(Some(event)) = timeout(Duration::from_millis(500), responses.next()).await {
            if event.r#type == ResourceType::Document {
                status = Some(event.response.status as u16);
                break;
            }
        }
        Ok(status)
    }

    async fn page_title(&self) -> Result<Option<String>> {
        self.page.get_title().await.context("failed to read page title")
    }

    async fn body_text(&self) -> Result<String> {
        let value = self
            .page
            .evaluate("document.body ? document.body.innerText : ''")
            .await
            .context("failed to read body text")?;
        Ok(value.into_value::<String>().unwrap_or_default())
    }

    async fn current_url(&self) -> Result<String> {
        Ok(self.page.url().await.context("failed to read page url")?.unwrap_or_default())
    }

    async fn count_elements(&self, selector: &str) -> Result<usize> {
        // A selector that matches nothing is an ordinary answer, not an
        // error.
        Ok(self.page.find_elements(selector).await.map(|elements| elements.len()).unwrap_or(0))
    }

    async fn type_into(&self, selector: &str, text: &str) -> Result<()> {
        let element = self
            .page
            .find_element(selector)
            .await
            .with_context(|| format!("no element matches {selector}"))?;
        element.click().await.context("failed to focus input")?;
        element.type_str(text).await.context("failed to type into input")?;
        Ok(())
    }

    async fn press_key(&self, selector: &str, key: &str) -> Result<()> {
        let element = self
            .page
            .find_element(selector)
            .await
            .with_context(|| format!("no element matches {selector}"))?;
        element.press_key(key).await.context("failed to press key")?;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        if let Err(error) = self.page.clone().close().await {
            warn!("Failed to close page: {error:#}");
        }
        let mut browser = self.browser.lock().await;
        browser
            .dispose_browser_context(self.context_id.clone())
            .await
            .context("failed to dispose browser context")?;
        Ok(())
    }
}

/// Launches the shared Chromium process on first demand
pub struct ChromeLauncher {
    pub navigation_timeout: Duration,
}

#[async_trait]
impl BrowserLauncher for ChromeLauncher {
    async fn launch(&self) -> Result<Arc<dyn SessionProvider>> {
        let provider = ChromeSessionProvider::launch(self.navigation_timeout).await?;
        Ok(Arc::new(provider))
    }
}
