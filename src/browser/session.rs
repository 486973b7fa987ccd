use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use thirtyfour::error::WebDriverError;
use thirtyfour::prelude::*;
use tracing::{debug, error};

use crate::browser::driver::PageDriver;
use crate::cli::config::BrowserSettings;

/// One exclusive browser session, attached to a WebDriver endpoint.
///
/// A session is owned by exactly one task at a time; it is never shared
/// across concurrent tasks, so no DOM or cookie state leaks between hotels.
pub struct BrowserSession {
    /// WebDriver instance; taken on quit so Drop can tell
    driver: Option<WebDriver>,
}

impl BrowserSession {
    /// Start a new session with the capabilities derived from the browser
    /// settings and the per-task timeout budget.
    ///
    /// The budget is split unevenly: the full budget for page loads, a
    /// sixth for implicit element waits and half for scripts.
    pub async fn new(settings: &BrowserSettings, timeout: Duration) -> Result<Self> {
        let mut caps = DesiredCapabilities::chrome();

        if settings.headless {
            caps.set_headless()?;
        }

        caps.add_chrome_arg("--disable-gpu")?;
        caps.add_chrome_arg("--no-sandbox")?;
        caps.add_chrome_arg("--disable-dev-shm-usage")?;
        caps.add_chrome_arg(&format!(
            "--window-size={},{}",
            settings.window_width, settings.window_height
        ))?;

        if settings.disable_images {
            caps.add_chrome_arg("--blink-settings=imagesEnabled=false")?;
        }

        if let Some(user_agent) = &settings.user_agent {
            caps.add_chrome_arg(&format!("--user-agent={}", user_agent))?;
        }

        let driver = WebDriver::new(&settings.webdriver_url, caps)
            .await
            .context(format!(
                "Failed to connect to WebDriver at {}",
                settings.webdriver_url
            ))?;

        driver.set_page_load_timeout(timeout).await?;
        driver.set_implicit_wait_timeout(timeout / 6).await?;
        driver.set_script_timeout(timeout / 2).await?;

        debug!("Browser session started");

        Ok(Self {
            driver: Some(driver),
        })
    }

    fn driver(&self) -> Result<&WebDriver> {
        self.driver
            .as_ref()
            .context("Browser session already closed")
    }

    /// Close the session and release the browser.
    pub async fn quit(mut self) -> Result<()> {
        if let Some(driver) = self.driver.take() {
            driver.quit().await.context("Failed to quit WebDriver")?;
            debug!("Browser session closed");
        }
        Ok(())
    }

    /// Find the first element matching a CSS selector, mapping "not found"
    /// to `None` instead of an error.
    async fn find_optional(&self, selector: &str) -> Result<Option<WebElement>> {
        match self.driver()?.find(By::Css(selector)).await {
            Ok(element) => Ok(Some(element)),
            Err(WebDriverError::NoSuchElement(_)) => Ok(None),
            Err(e) => Err(e).context(format!("Element lookup failed: {}", selector)),
        }
    }
}

#[async_trait]
impl PageDriver for BrowserSession {
    async fn navigate(&self, url: &str) -> Result<()> {
        debug!("Navigating to: {}", url);
        self.driver()?
            .goto(url)
            .await
            .context(format!("Failed to navigate to URL: {}", url))
    }

    async fn element_count(&self, selector: &str) -> Result<usize> {
        let elements = self
            .driver()?
            .find_all(By::Css(selector))
            .await
            .context(format!("Element lookup failed: {}", selector))?;
        Ok(elements.len())
    }

    async fn text(&self, selector: &str) -> Result<Option<String>> {
        match self.find_optional(selector).await? {
            Some(element) => {
                let text = element
                    .text()
                    .await
                    .context(format!("Failed to read text of: {}", selector))?;
                Ok(Some(text))
            }
            None => Ok(None),
        }
    }

    async fn attr(&self, selector: &str, name: &str) -> Result<Option<String>> {
        match self.find_optional(selector).await? {
            Some(element) => element
                .attr(name)
                .await
                .context(format!("Failed to read @{} of: {}", name, selector)),
            None => Ok(None),
        }
    }

    async fn attr_all(&self, selector: &str, name: &str) -> Result<Vec<String>> {
        let elements = self
            .driver()?
            .find_all(By::Css(selector))
            .await
            .context(format!("Element lookup failed: {}", selector))?;

        let mut values = Vec::with_capacity(elements.len());
        for element in elements {
            if let Some(value) = element
                .attr(name)
                .await
                .context(format!("Failed to read @{} of: {}", name, selector))?
            {
                values.push(value);
            }
        }
        Ok(values)
    }

    async fn title(&self) -> Result<String> {
        self.driver()?
            .title()
            .await
            .context("Failed to read page title")
    }
}

impl Drop for BrowserSession {
    fn drop(&mut self) {
        if let Some(driver) = self.driver.take() {
            // Spawn a task to quit the driver
            tokio::spawn(async move {
                if let Err(e) = driver.quit().await {
                    error!("Error closing browser session during drop: {}", e);
                }
            });
        }
    }
}
