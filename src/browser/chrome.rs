use crate::core::RemoteSession;
use crate::errors::{BrowserError, Result};
use crate::types::Viewport;
use async_trait::async_trait;
use headless_chrome::{Browser, LaunchOptions, Tab};
use serde_json::Value;
use std::ffi::OsStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// How to reach Chrome: launch a local binary, or attach to one already
/// listening for remote debugging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChromeOptions {
    pub headless: bool,
    pub viewport: Viewport,
    pub args: Vec<String>,
    /// WebSocket debugger URL of a running browser.
    pub debugging_url: Option<String>,
    pub idle_timeout_ms: u64,
}

impl Default for ChromeOptions {
    fn default() -> Self {
        Self {
            headless: true,
            viewport: Viewport::default(),
            args: Vec::new(),
            debugging_url: None,
            idle_timeout_ms: 300_000,
        }
    }
}

/// A single Chrome tab driven over the DevTools protocol.
pub struct ChromeSession {
    browser: Option<Browser>,
    tab: Option<Arc<Tab>>,
}

impl ChromeSession {
    pub fn start(options: &ChromeOptions) -> Result<Self> {
        let browser = match &options.debugging_url {
            Some(url) => {
                info!("Attaching to Chrome at {}", url);
                Browser::connect(url.clone())
                    .map_err(|e| BrowserError::LaunchFailed(e.to_string()))?
            }
            None => Self::launch(options)?,
        };
        let tab = browser
            .new_tab()
            .map_err(|e| BrowserError::LaunchFailed(e.to_string()))?;
        Ok(Self {
            browser: Some(browser),
            tab: Some(tab),
        })
    }

    fn launch(options: &ChromeOptions) -> Result<Browser> {
        let window_size_arg = format!(
            "--window-size={},{}",
            options.viewport.width, options.viewport.height
        );
        let mut args = vec![
            OsStr::new("--no-sandbox"),
            OsStr::new("--disable-dev-shm-usage"),
            OsStr::new(&window_size_arg),
        ];
        for arg in &options.args {
            args.push(OsStr::new(arg));
        }

        let launch_options = LaunchOptions::default_builder()
            .headless(options.headless)
            .idle_browser_timeout(Duration::from_millis(options.idle_timeout_ms))
            .args(args)
            .build()
            .map_err(|e| BrowserError::LaunchFailed(e.to_string()))?;

        info!("Launching Chrome (headless: {})", options.headless);
        Browser::new(launch_options).map_err(|e| BrowserError::LaunchFailed(e.to_string()))
    }

    fn tab(&self) -> Result<&Arc<Tab>> {
        self.tab
            .as_ref()
            .ok_or_else(|| BrowserError::state("the Chrome session has been closed"))
    }
}

#[async_trait]
impl RemoteSession for ChromeSession {
    async fn navigate(&self, url: &str) -> Result<()> {
        let tab = self.tab()?;
        tab.navigate_to(url)
            .map_err(|e| BrowserError::NavigationFailed(e.to_string()))?;
        tab.wait_until_navigated()
            .map_err(|e| BrowserError::NavigationFailed(e.to_string()))?;
        Ok(())
    }

    async fn execute_script(&self, script: &str) -> Result<Value> {
        let result = self
            .tab()?
            .evaluate(script, false)
            .map_err(|e| BrowserError::JavaScriptFailed(e.to_string()))?;
        Ok(result.value.unwrap_or(Value::Null))
    }

    async fn current_url(&self) -> Result<String> {
        Ok(self.tab()?.get_url())
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(tab) = self.tab.take() {
            if let Err(e) = tab.close(false) {
                debug!("Closing tab failed: {}", e);
            }
        }
        self.browser = None;
        Ok(())
    }
}
