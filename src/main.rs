use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use stream_harvest::browser::{BrowserLauncher, BrowserSession, ChromiumLauncher, ChromiumSession};
use stream_harvest::config::{Cli, Input};
use stream_harvest::coordinator;
use stream_harvest::downloader::{Downloader, FfmpegTranscoder};
use stream_harvest::extractor::Extractor;
use stream_harvest::record::{load_records, save_records, StreamRecord};
use stream_harvest::server::ProgressServer;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    pretty_env_logger::formatted_timed_builder()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();

    let cli = Cli::parse();
    let profile = cli.site_profile()?;
    let element_timeout = profile.element_timeout();
    std::fs::create_dir_all(&cli.output_dir)
        .with_context(|| format!("fail to create {}", cli.output_dir.display()))?;

    let records = match cli.input() {
        Input::StartUrl(url) => {
            let extractor = Extractor::new(profile)?;
            let launcher = ChromiumLauncher::new(!cli.headed, element_timeout);
            let records = tokio::select! {
                records = extractor.extract(&launcher, &url) => {
                    records.with_context(|| format!("fail to collect download urls from {url}"))?
                }
                interrupted = tokio::signal::ctrl_c() => {
                    interrupted.context("fail to listen for interrupt")?;
                    log::info!("Interrupted during extraction");
                    return Ok(());
                }
            };
            save_records(&records, &cli.output_dir).context("fail to save record list")?;
            records
        }
        Input::RecordFile(path) => load_records(&path)
            .with_context(|| format!("fail to load record list {}", path.display()))?,
    };
    let records: Arc<[StreamRecord]> = records.into();

    let server = ProgressServer::bind(
        &cli.bind,
        Arc::clone(&records),
        &cli.output_dir,
        Duration::from_millis(cli.poll_interval_ms),
    )
    .await
    .context("fail to start status server")?;
    let status_url = server.url()?;
    log::info!("listening {status_url}");
    tokio::spawn(server.serve());

    let viewer = if cli.open_status {
        open_status_page(&status_url, element_timeout).await
    } else {
        None
    };

    let downloader = Arc::new(Downloader::new(
        FfmpegTranscoder::new(&cli.ffmpeg),
        &cli.output_dir,
    ));
    tokio::select! {
        result = coordinator::run_all(downloader, Arc::clone(&records), usize::from(cli.parallel)) => {
            result.context("fail to download")?;
            log::info!("All {} videos downloaded, press Ctrl-C to exit", records.len());
            tokio::signal::ctrl_c()
                .await
                .context("fail to listen for interrupt")?;
        }
        interrupted = tokio::signal::ctrl_c() => {
            interrupted.context("fail to listen for interrupt")?;
            log::info!("Interrupted, aborting downloads");
        }
    }

    if let Some(mut viewer) = viewer {
        if let Err(e) = viewer.close().await {
            log::warn!("Fail to close status browser: {e}");
        }
    }
    Ok(())
}

/// Shows the status page in a visible browser. Best effort only.
async fn open_status_page(url: &str, element_timeout: Duration) -> Option<ChromiumSession> {
    let session = match ChromiumLauncher::new(false, element_timeout).open().await {
        Ok(session) => session,
        Err(e) => {
            log::warn!("Fail to open status browser: {e}");
            return None;
        }
    };
    if let Err(e) = session.navigate(url).await {
        log::warn!("Fail to open server url: {e}");
        return None;
    }
    Some(session)
}
