pub mod chromium;

use std::collections::HashMap;

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::errors::Result;

pub use chromium::{ChromiumLauncher, ChromiumSession};

/// Attributes of an element matched by [`BrowserSession::query_nodes`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ElementNode {
    pub attributes: HashMap<String, String>,
}

impl ElementNode {
    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }
}

/// One browser tab driven sequentially. Network events are delivered on
/// their own schedule, independent of `navigate` returning.
#[async_trait]
pub trait BrowserSession: Send + Sync {
    /// Requests issued by the tab from now on, in the order they are sent.
    async fn network_events(&self) -> Result<BoxStream<'static, String>>;

    async fn navigate(&self, url: &str) -> Result<()>;

    /// Text of the first element matching `selector`, waiting for it to appear.
    async fn query_text(&self, selector: &str) -> Result<String>;

    /// Every element currently matching `selector`; may be empty.
    async fn query_nodes(&self, selector: &str) -> Result<Vec<ElementNode>>;

    /// Shuts the browser down. Dropping a session must also release it.
    async fn close(&mut self) -> Result<()>;
}

#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    type Session: BrowserSession;

    async fn open(&self) -> Result<Self::Session>;
}

/// Parses `html` and runs a CSS query over it, the way page sources are
/// inspected elsewhere in the crate.
pub(crate) fn select_in_html<T>(
    html: &str,
    selector: &str,
    mut map: impl FnMut(scraper::ElementRef<'_>) -> T,
) -> Result<Vec<T>> {
    let document = scraper::Html::parse_document(html);
    let parsed = scraper::Selector::parse(selector)
        .map_err(|e| crate::errors::ScrapeError::browser("parse selector", selector, e))?;
    Ok(document.select(&parsed).map(&mut map).collect())
}

pub(crate) fn element_text(element: scraper::ElementRef<'_>) -> String {
    element.text().collect::<String>()
}

pub(crate) fn element_node(element: scraper::ElementRef<'_>) -> ElementNode {
    ElementNode {
        attributes: element
            .value()
            .attrs()
            .map(|(name, value)| (name.to_owned(), value.to_owned()))
            .collect(),
    }
}
