use anyhow::{Result, anyhow};
use async_trait::async_trait;
use browser_pilot::BrowserDriver;
use headless_chrome::{Browser, LaunchOptions, Tab};
use std::ffi::OsStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::dom;

const SETTLE_AFTER_NAVIGATE: Duration = Duration::from_millis(1500);
const SETTLE_AFTER_INPUT: Duration = Duration::from_millis(1000);

pub struct LaunchSettings {
    pub headless: bool,
    /// DevTools websocket URL of an already running Chrome.
    pub attach: Option<String>,
}

/// The single Chrome tab the agent works in.
pub struct BrowserSession {
    _browser: Browser,
    tab: Arc<Tab>,
}

impl BrowserSession {
    pub fn launch(settings: &LaunchSettings) -> Result<Self> {
        if let Some(url) = &settings.attach {
            info!("[Hands] attempting to attach to existing Chrome at {}", url);
            match Browser::connect(url.clone()) {
                Ok(browser) => {
                    let existing = browser
                        .get_tabs()
                        .lock()
                        .map_err(|_| anyhow!("tab list lock poisoned"))?
                        .first()
                        .cloned();
                    let tab = match existing {
                        Some(tab) => tab,
                        None => browser.new_tab()?,
                    };
                    info!("[Hands] attached to existing Chrome");
                    return Ok(Self {
                        _browser: browser,
                        tab,
                    });
                }
                Err(e) => warn!("[Hands] could not attach ({}), launching Chrome", e),
            }
        }

        let options = LaunchOptions {
            headless: settings.headless,
            args: vec![
                OsStr::new("--no-first-run"),
                OsStr::new("--no-default-browser-check"),
                OsStr::new("--disable-blink-features=AutomationControlled"),
                OsStr::new("--disable-infobars"),
            ],
            idle_browser_timeout: Duration::from_secs(600),
            ..Default::default()
        };

        info!("[Hands] starting Chrome (headless: {})", settings.headless);
        let browser =
            Browser::new(options).map_err(|e| anyhow!("Browser launch failed: {}", e))?;
        let tab = browser.new_tab()?;
        tab.navigate_to("about:blank")?;

        info!("[Hands] Chrome ready");
        Ok(Self {
            _browser: browser,
            tab,
        })
    }

    /// Run blocking CDP calls off the async runtime.
    async fn with_tab<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Tab) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let tab = self.tab.clone();
        tokio::task::spawn_blocking(move || f(&tab))
            .await
            .map_err(|e| anyhow!("browser task panicked: {}", e))?
    }
}

#[async_trait]
impl BrowserDriver for BrowserSession {
    async fn navigate(&self, url: &str) -> Result<()> {
        let url = url.to_string();
        self.with_tab(move |tab| {
            tab.navigate_to(&url)?;
            tab.wait_until_navigated()?;
            tab.wait_for_element("body")?;
            std::thread::sleep(SETTLE_AFTER_NAVIGATE);
            match dom::location(tab) {
                Ok(place) => info!("[Hands] on {}", place),
                Err(e) => debug!("[Hands] navigated, location unreadable: {}", e),
            }
            Ok(())
        })
        .await
    }

    async fn click(&self, selector: &str) -> Result<()> {
        let selector = selector.to_string();
        self.with_tab(move |tab| {
            tab.find_element(&selector)?.click()?;
            std::thread::sleep(SETTLE_AFTER_INPUT);
            Ok(())
        })
        .await
    }

    async fn type_into(&self, selector: &str, text: &str) -> Result<()> {
        let selector = selector.to_string();
        let text = text.to_string();
        self.with_tab(move |tab| {
            tab.find_element(&selector)?.click()?;
            dom::clear_value(tab, &selector)?;
            tab.type_str(&text)?;
            Ok(())
        })
        .await
    }

    async fn press_key(&self, key: &str) -> Result<()> {
        let key = key.to_string();
        self.with_tab(move |tab| {
            tab.press_key(&key)?;
            std::thread::sleep(SETTLE_AFTER_INPUT);
            Ok(())
        })
        .await
    }

    async fn extract_text(&self, selector: &str) -> Result<String> {
        let selector = selector.to_string();
        self.with_tab(move |tab| dom::element_text(tab, &selector)).await
    }

    async fn wait_for(&self, selector: &str, timeout: Duration) -> Result<()> {
        let selector = selector.to_string();
        self.with_tab(move |tab| {
            tab.wait_for_element_with_custom_timeout(&selector, timeout)?;
            Ok(())
        })
        .await
    }

    async fn page_source(&self) -> Result<String> {
        let source = self.with_tab(dom::page_source).await?;
        debug!("[Hands] page source is {} bytes", source.len());
        Ok(source)
    }
}
