use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::network::{EnableParams, EventRequestWillBeSent};
use chromiumoxide::cdp::browser_protocol::page::NavigateParams;
use chromiumoxide::{Browser, BrowserConfig, Page};
use futures::stream::BoxStream;
use futures::StreamExt;
use tokio::task::JoinHandle;

use super::{element_node, element_text, select_in_html, BrowserLauncher, BrowserSession, ElementNode};
use crate::errors::{Result, ScrapeError};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Launches a local Chrome/Chromium through the devtools protocol.
#[derive(Debug, Clone)]
pub struct ChromiumLauncher {
    headless: bool,
    element_timeout: Duration,
}

impl ChromiumLauncher {
    #[must_use]
    pub fn new(headless: bool, element_timeout: Duration) -> Self {
        ChromiumLauncher {
            headless,
            element_timeout,
        }
    }
}

#[async_trait]
impl BrowserLauncher for ChromiumLauncher {
    type Session = ChromiumSession;

    async fn open(&self) -> Result<ChromiumSession> {
        let builder = BrowserConfig::builder();
        let builder = if self.headless {
            builder
        } else {
            builder.with_head()
        };
        let config = builder
            .build()
            .map_err(|e| ScrapeError::browser("configure", "chromium", e))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| ScrapeError::browser("launch", "chromium", e))?;
        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    log::warn!("Browser handler error: {e}");
                }
            }
        });

        // Built before the first tab so an early return below still tears the
        // browser down through Drop.
        let mut session = ChromiumSession {
            browser,
            handler,
            page: None,
            element_timeout: self.element_timeout,
        };
        let page = session
            .browser
            .new_page("about:blank")
            .await
            .map_err(|e| ScrapeError::browser("open", "about:blank", e))?;
        // Network events are only reported once the domain is enabled.
        page.execute(EnableParams::default())
            .await
            .map_err(|e| ScrapeError::browser("enable", "network events", e))?;
        session.page = Some(page);
        Ok(session)
    }
}

pub struct ChromiumSession {
    browser: Browser,
    handler: JoinHandle<()>,
    page: Option<Page>,
    element_timeout: Duration,
}

impl ChromiumSession {
    fn page(&self) -> Result<&Page> {
        self.page
            .as_ref()
            .ok_or_else(|| ScrapeError::browser("use", "page", "session has no open tab"))
    }

    async fn content(&self) -> Result<String> {
        self.page()?
            .content()
            .await
            .map_err(|e| ScrapeError::browser("read", "page content", e))
    }
}

#[async_trait]
impl BrowserSession for ChromiumSession {
    async fn network_events(&self) -> Result<BoxStream<'static, String>> {
        let events = self
            .page()?
            .event_listener::<EventRequestWillBeSent>()
            .await
            .map_err(|e| ScrapeError::browser("listen", "network events", e))?;
        Ok(events.map(|event| event.request.url.clone()).boxed())
    }

    async fn navigate(&self, url: &str) -> Result<()> {
        let params = NavigateParams::builder()
            .url(url)
            .build()
            .map_err(|e| ScrapeError::browser("navigate", url, e))?;
        self.page()?
            .goto(params)
            .await
            .map_err(|e| ScrapeError::browser("navigate", url, e))?
            .wait_for_navigation()
            .await
            .map_err(|e| ScrapeError::browser("navigate", url, e))?;
        Ok(())
    }

    async fn query_text(&self, selector: &str) -> Result<String> {
        let deadline = tokio::time::Instant::now() + self.element_timeout;
        loop {
            let html = self.content().await?;
            if let Some(text) = select_in_html(&html, selector, element_text)?.into_iter().next() {
                return Ok(text);
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(ScrapeError::browser(
                    "find",
                    selector,
                    format!("no match within {:?}", self.element_timeout),
                ));
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    async fn query_nodes(&self, selector: &str) -> Result<Vec<ElementNode>> {
        let html = self.content().await?;
        select_in_html(&html, selector, element_node)
    }

    async fn close(&mut self) -> Result<()> {
        self.page = None;
        self.browser
            .close()
            .await
            .map_err(|e| ScrapeError::browser("close", "chromium", e))?;
        if let Err(e) = self.browser.wait().await {
            log::warn!("Browser did not exit cleanly: {e}");
        }
        self.handler.abort();
        Ok(())
    }
}

impl Drop for ChromiumSession {
    fn drop(&mut self) {
        // Browser kills its child process on drop; the handler loop would
        // otherwise outlive it.
        self.handler.abort();
    }
}
