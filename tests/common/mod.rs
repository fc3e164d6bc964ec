//! In-memory browser and transcoder used by the integration tests.
#![allow(dead_code)]

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use stream_harvest::browser::{BrowserLauncher, BrowserSession, ElementNode};
use stream_harvest::downloader::{ToolExit, Transcoder};
use stream_harvest::{Result, ScrapeError};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

pub const ORIGIN: &str = "https://video.example.com";

#[derive(Debug, Clone)]
pub struct FakePage {
    pub title: String,
    pub links: Vec<String>,
    /// Requests the page issues after it loads, in order.
    pub requests: Vec<String>,
}

/// A site of episode pages `/play/<n>`; each page lists every episode and
/// requests `https://cdn.example.com/<n>/index.m3u8` plus some noise.
pub fn episode_site(episodes: usize) -> HashMap<String, FakePage> {
    let links: Vec<String> = (1..=episodes).map(|n| format!("/play/{n}")).collect();
    (1..=episodes)
        .map(|n| {
            let page = FakePage {
                title: format!("  第{n}集 正在观看\n"),
                links: links.clone(),
                requests: vec![
                    format!("{ORIGIN}/static/player.js"),
                    format!("https://cdn.example.com/{n}/index.m3u8?token=abc"),
                    format!("https://cdn.example.com/{n}/index.m3u8"),
                    format!("https://cdn.example.com/{n}/seg-000.ts"),
                ],
            };
            (page_url(n), page)
        })
        .collect()
}

pub fn page_url(n: usize) -> String {
    format!("{ORIGIN}/play/{n}")
}

pub fn stream_url(n: usize) -> String {
    format!("https://cdn.example.com/{n}/index.m3u8")
}

#[derive(Default)]
pub struct SessionLog {
    pub opened: AtomicUsize,
    pub closed: AtomicUsize,
    pub navigations: Mutex<Vec<String>>,
}

pub struct FakeLauncher {
    pages: Arc<HashMap<String, FakePage>>,
    event_delay: Duration,
    fail_on: Option<String>,
    pub log: Arc<SessionLog>,
}

impl FakeLauncher {
    pub fn new(pages: HashMap<String, FakePage>) -> Self {
        FakeLauncher {
            pages: Arc::new(pages),
            event_delay: Duration::ZERO,
            fail_on: None,
            log: Arc::default(),
        }
    }

    /// Deliver each page's requests this long after navigating to it, so they
    /// land while the next page is already loading.
    pub fn with_event_delay(mut self, delay: Duration) -> Self {
        self.event_delay = delay;
        self
    }

    pub fn failing_on(mut self, url: impl Into<String>) -> Self {
        self.fail_on = Some(url.into());
        self
    }
}

#[async_trait]
impl BrowserLauncher for FakeLauncher {
    type Session = FakeSession;

    async fn open(&self) -> Result<FakeSession> {
        self.log.opened.fetch_add(1, Ordering::SeqCst);
        let subscriber: Arc<Mutex<Option<mpsc::UnboundedSender<String>>>> = Arc::default();
        let (network, mut pending) = mpsc::unbounded_channel::<Vec<String>>();
        let delay = self.event_delay;
        let deliver_to = Arc::clone(&subscriber);
        let delivery = tokio::spawn(async move {
            while let Some(requests) = pending.recv().await {
                tokio::time::sleep(delay).await;
                let guard = deliver_to.lock().unwrap();
                if let Some(tx) = guard.as_ref() {
                    for url in requests {
                        let _ = tx.send(url);
                    }
                }
            }
        });
        Ok(FakeSession {
            pages: Arc::clone(&self.pages),
            fail_on: self.fail_on.clone(),
            current: Mutex::new(None),
            subscriber,
            network,
            delivery,
            log: Arc::clone(&self.log),
        })
    }
}

pub struct FakeSession {
    pages: Arc<HashMap<String, FakePage>>,
    fail_on: Option<String>,
    current: Mutex<Option<String>>,
    subscriber: Arc<Mutex<Option<mpsc::UnboundedSender<String>>>>,
    network: mpsc::UnboundedSender<Vec<String>>,
    delivery: JoinHandle<()>,
    log: Arc<SessionLog>,
}

impl FakeSession {
    fn current_page(&self) -> Result<FakePage> {
        let current = self.current.lock().unwrap().clone().unwrap_or_default();
        self.pages
            .get(&current)
            .cloned()
            .ok_or_else(|| ScrapeError::browser("query", current, "no page loaded"))
    }
}

#[async_trait]
impl BrowserSession for FakeSession {
    async fn network_events(&self) -> Result<BoxStream<'static, String>> {
        let (tx, rx) = mpsc::unbounded_channel();
        *self.subscriber.lock().unwrap() = Some(tx);
        Ok(futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|url| (url, rx))
        })
        .boxed())
    }

    async fn navigate(&self, url: &str) -> Result<()> {
        self.log.navigations.lock().unwrap().push(url.to_owned());
        if self.fail_on.as_deref() == Some(url) {
            return Err(ScrapeError::browser(
                "navigate",
                url,
                "net::ERR_CONNECTION_RESET",
            ));
        }
        let page = self
            .pages
            .get(url)
            .ok_or_else(|| ScrapeError::browser("navigate", url, "404"))?;
        *self.current.lock().unwrap() = Some(url.to_owned());
        let _ = self.network.send(page.requests.clone());
        Ok(())
    }

    async fn query_text(&self, _selector: &str) -> Result<String> {
        Ok(self.current_page()?.title)
    }

    async fn query_nodes(&self, _selector: &str) -> Result<Vec<ElementNode>> {
        Ok(self
            .current_page()?
            .links
            .into_iter()
            .map(|href| ElementNode {
                attributes: HashMap::from([("href".to_owned(), href)]),
            })
            .collect())
    }

    async fn close(&mut self) -> Result<()> {
        self.delivery.abort();
        self.log.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

impl Drop for FakeSession {
    fn drop(&mut self) {
        self.delivery.abort();
    }
}

/// Writes `bytes` zeros to the target after `delay`, or fails at once if the
/// target's file name contains one of `fail_on`.
pub struct FakeTranscoder {
    delay: Duration,
    bytes: usize,
    fail_on: Vec<String>,
    in_flight: AtomicUsize,
    pub peak: AtomicUsize,
    pub calls: Mutex<Vec<Vec<String>>>,
}

impl FakeTranscoder {
    pub fn new(delay: Duration, bytes: usize) -> Self {
        FakeTranscoder {
            delay,
            bytes,
            fail_on: Vec::new(),
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn failing_on(mut self, title: impl Into<String>) -> Self {
        self.fail_on.push(title.into());
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn targets(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter_map(|args| args.last().cloned())
            .collect()
    }
}

#[async_trait]
impl Transcoder for FakeTranscoder {
    async fn run(&self, args: &[String]) -> std::io::Result<ToolExit> {
        self.calls.lock().unwrap().push(args.to_vec());
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);

        let target = PathBuf::from(args.last().cloned().unwrap_or_default());
        let name = target
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        // Failures are immediate so they land while other downloads still run.
        let code = if self.fail_on.iter().any(|t| name.contains(t.as_str())) {
            1
        } else {
            tokio::time::sleep(self.delay).await;
            tokio::fs::write(&target, vec![0u8; self.bytes]).await?;
            0
        };
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(ToolExit { code: Some(code) })
    }
}
