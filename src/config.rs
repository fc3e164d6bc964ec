use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Parser;
use serde::Deserialize;

/// Scrape a paginated video site through a real browser and download every
/// episode with ffmpeg.
#[derive(Debug, Parser)]
#[command(version, about)]
pub struct Cli {
    /// Start page url (http/https) or a previously saved record list (.json)
    pub input: String,

    /// Downloads running at the same time
    #[arg(long, default_value_t = 5, value_parser = clap::value_parser!(u16).range(1..))]
    pub parallel: u16,

    /// Directory for downloaded videos and the saved record list
    #[arg(long, default_value = ".")]
    pub output_dir: PathBuf,

    /// Transcoding tool used to remux each stream
    #[arg(long, default_value = "ffmpeg")]
    pub ffmpeg: PathBuf,

    /// TOML file overriding the site profile (selectors, stream pattern, timeouts)
    #[arg(long)]
    pub site: Option<PathBuf>,

    /// Show the browser used for extraction
    #[arg(long)]
    pub headed: bool,

    /// Open the status page in a visible browser
    #[arg(long)]
    pub open_status: bool,

    /// Address of the status page
    #[arg(long, default_value = "127.0.0.1:0")]
    pub bind: String,

    /// Status page refresh interval
    #[arg(long, default_value_t = 1000)]
    pub poll_interval_ms: u64,
}

/// Where the command line asks records to come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    StartUrl(String),
    RecordFile(PathBuf),
}

impl Cli {
    #[must_use]
    pub fn input(&self) -> Input {
        if self.input.starts_with("http://") || self.input.starts_with("https://") {
            Input::StartUrl(self.input.clone())
        } else {
            Input::RecordFile(PathBuf::from(&self.input))
        }
    }

    /// Profile from `--site`, or the built-in default.
    ///
    /// # Errors
    ///
    /// Fails if the profile file cannot be read or parsed.
    pub fn site_profile(&self) -> anyhow::Result<SiteProfile> {
        match &self.site {
            Some(path) => SiteProfile::from_file(path),
            None => Ok(SiteProfile::default()),
        }
    }
}

/// Everything that is specific to the scraped site.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SiteProfile {
    /// Element holding the episode title
    pub title_selector: String,
    /// UI text trailing the title, e.g. a "now watching" badge
    pub title_suffixes: Vec<String>,
    /// Links to the sibling episodes
    pub listing_selector: String,
    pub link_attribute: String,
    /// Requests matching this are the stream playlists
    pub stream_pattern: String,
    pub element_timeout_secs: u64,
    pub stream_timeout_secs: u64,
}

impl Default for SiteProfile {
    fn default() -> Self {
        SiteProfile {
            title_selector: ".video-title > h1".to_owned(),
            title_suffixes: vec!["正在观看".to_owned()],
            listing_selector: ".play-list > .zhwli_1 > a".to_owned(),
            link_attribute: "href".to_owned(),
            stream_pattern: r"\.m3u8$".to_owned(),
            element_timeout_secs: 30,
            stream_timeout_secs: 60,
        }
    }
}

impl SiteProfile {
    /// # Errors
    ///
    /// Fails if the file cannot be read or is not a valid profile.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        use anyhow::Context;

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("fail to read site profile {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("fail to parse site profile {}", path.display()))
    }

    #[must_use]
    pub fn element_timeout(&self) -> Duration {
        Duration::from_secs(self.element_timeout_secs)
    }

    #[must_use]
    pub fn stream_timeout(&self) -> Duration {
        Duration::from_secs(self.stream_timeout_secs)
    }
}
