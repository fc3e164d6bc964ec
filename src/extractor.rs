//! Walks a start page and its sibling episodes in one browser tab and pairs
//! each page with the stream playlist it requests.
//!
//! Navigation is strictly sequential, but the browser reports requests on
//! its own schedule: a page's playlist request may arrive after the next
//! navigation has already begun. Titles and stream urls therefore go through
//! two FIFO queues and a single pairing task matches them up in order. This
//! relies on every page issuing exactly one matching request; a page that
//! issues none surfaces as a stream timeout, a page that issues two shifts
//! every later record.

use std::time::Duration;

use futures::stream::BoxStream;
use futures::StreamExt;
use regex::Regex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use url::Url;

use crate::browser::{BrowserLauncher, BrowserSession};
use crate::config::SiteProfile;
use crate::errors::{Result, ScrapeError};
use crate::record::StreamRecord;

/// One page's stream is in flight at a time, one slot of slack.
const QUEUE_CAPACITY: usize = 2;

pub struct Extractor {
    profile: SiteProfile,
    stream_pattern: Regex,
}

impl Extractor {
    /// # Errors
    ///
    /// Fails if the profile's stream pattern is not a valid regex.
    pub fn new(profile: SiteProfile) -> Result<Self> {
        let stream_pattern = Regex::new(&profile.stream_pattern)?;
        Ok(Extractor {
            profile,
            stream_pattern,
        })
    }

    /// Opens a browser session, extracts every record reachable from
    /// `start_url` and closes the session again, whatever the outcome.
    ///
    /// # Errors
    ///
    /// Any browser failure or a page without a stream request aborts the
    /// whole extraction; no partial list is returned.
    pub async fn extract<L: BrowserLauncher>(
        &self,
        launcher: &L,
        start_url: &str,
    ) -> Result<Vec<StreamRecord>> {
        let mut session = launcher.open().await?;
        let result = self.extract_from(&session, start_url).await;
        if let Err(e) = session.close().await {
            log::warn!("Fail to close browser session: {e}");
        }
        result
    }

    /// Extraction over an already open session.
    ///
    /// # Errors
    ///
    /// See [`Extractor::extract`].
    pub async fn extract_from<S: BrowserSession>(
        &self,
        session: &S,
        start_url: &str,
    ) -> Result<Vec<StreamRecord>> {
        let origin = base_origin(start_url)?;

        // Subscribe before the first navigation so its request is not missed.
        let events = session.network_events().await?;
        let (stream_tx, stream_rx) = mpsc::channel(QUEUE_CAPACITY);
        let (title_tx, title_rx) = mpsc::channel(QUEUE_CAPACITY);
        let forwarder = tokio::spawn(forward_stream_urls(
            events,
            self.stream_pattern.clone(),
            stream_tx,
        ));
        let pairing = tokio::spawn(pair_records(
            title_rx,
            stream_rx,
            self.profile.stream_timeout(),
        ));

        let navigated = self.visit_pages(session, start_url, &origin, title_tx).await;
        let result = match navigated {
            Ok(()) | Err(VisitError::PairingGone) => join_pairing(pairing).await,
            Err(VisitError::Browser(e)) => {
                pairing.abort();
                Err(e)
            }
        };
        forwarder.abort();
        result
    }

    async fn visit_pages<S: BrowserSession>(
        &self,
        session: &S,
        start_url: &str,
        origin: &Url,
        titles: mpsc::Sender<(String, String)>,
    ) -> Result<(), VisitError> {
        self.visit(session, start_url, &titles).await?;

        let nodes = session.query_nodes(&self.profile.listing_selector).await?;
        let hrefs = nodes
            .iter()
            .filter_map(|node| node.attribute(&self.profile.link_attribute));
        let siblings = sibling_urls(origin, start_url, hrefs);
        log::info!("Found {} sibling pages", siblings.len());

        for page_url in &siblings {
            self.visit(session, page_url, &titles).await?;
        }
        Ok(())
    }

    async fn visit<S: BrowserSession>(
        &self,
        session: &S,
        page_url: &str,
        titles: &mpsc::Sender<(String, String)>,
    ) -> Result<(), VisitError> {
        session.navigate(page_url).await?;
        let raw = session.query_text(&self.profile.title_selector).await?;
        let title = trim_title(&raw, &self.profile.title_suffixes);
        log::debug!("Visited {page_url}: {title}");
        titles
            .send((page_url.to_owned(), title))
            .await
            .map_err(|_| VisitError::PairingGone)
    }
}

enum VisitError {
    Browser(ScrapeError),
    /// The pairing task ended early; its own result carries the reason.
    PairingGone,
}

impl From<ScrapeError> for VisitError {
    fn from(e: ScrapeError) -> Self {
        VisitError::Browser(e)
    }
}

async fn join_pairing(pairing: JoinHandle<Result<Vec<StreamRecord>>>) -> Result<Vec<StreamRecord>> {
    pairing
        .await
        .map_err(|e| ScrapeError::Pairing(e.to_string()))?
}

async fn forward_stream_urls(
    mut events: BoxStream<'static, String>,
    pattern: Regex,
    streams: mpsc::Sender<String>,
) {
    while let Some(url) = events.next().await {
        if !pattern.is_match(&url) {
            log::debug!("Ignore request {url}");
            continue;
        }
        if streams.send(url).await.is_err() {
            break;
        }
    }
}

/// Sole writer of the record list: takes titles in navigation order and
/// gives each the next stream url to arrive.
async fn pair_records(
    mut titles: mpsc::Receiver<(String, String)>,
    mut streams: mpsc::Receiver<String>,
    stream_timeout: Duration,
) -> Result<Vec<StreamRecord>> {
    let mut records = Vec::new();
    while let Some((page_url, title)) = titles.recv().await {
        let stream_url = match tokio::time::timeout(stream_timeout, streams.recv()).await {
            Ok(Some(url)) => url,
            Ok(None) => return Err(ScrapeError::StreamClosed { page_url }),
            Err(_) => {
                return Err(ScrapeError::StreamTimeout {
                    page_url,
                    waited: stream_timeout,
                })
            }
        };
        log::info!("{title}: {stream_url}");
        records.push(StreamRecord {
            page_url,
            title,
            stream_url,
        });
    }
    Ok(records)
}

/// Scheme, host and port of `start_url`.
fn base_origin(start_url: &str) -> Result<Url> {
    let invalid = |reason: String| ScrapeError::InvalidUrl {
        url: start_url.to_owned(),
        reason,
    };
    let url = Url::parse(start_url).map_err(|e| invalid(e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") || !url.has_host() {
        return Err(invalid("expected an http(s) url with a host".to_owned()));
    }
    url.join("/").map_err(|e| invalid(e.to_string()))
}

/// Resolves listing links in listing order, dropping the start page and
/// repeats.
fn sibling_urls<'a>(
    origin: &Url,
    start_url: &str,
    hrefs: impl IntoIterator<Item = &'a str>,
) -> Vec<String> {
    let start = Url::parse(start_url).ok();
    let mut siblings: Vec<String> = Vec::new();
    for href in hrefs {
        let Ok(url) = origin.join(href.trim()) else {
            log::warn!("Skip unresolvable link {href}");
            continue;
        };
        if start.as_ref() == Some(&url) || url.as_str() == start_url {
            continue;
        }
        let url = String::from(url);
        if !siblings.contains(&url) {
            siblings.push(url);
        }
    }
    siblings
}

/// Strips trailing whitespace and UI badges such as "正在观看".
fn trim_title(raw: &str, suffixes: &[String]) -> String {
    let mut title = raw.trim();
    loop {
        let before = title.len();
        for suffix in suffixes.iter().filter(|s| !s.is_empty()) {
            title = title.strip_suffix(suffix.as_str()).unwrap_or(title).trim_end();
        }
        if title.len() == before {
            return title.to_owned();
        }
    }
}
