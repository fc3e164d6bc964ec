use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;

use crate::errors::{Result, ScrapeError};
use crate::record::StreamRecord;
use crate::size::format_file_size;

/// How the transcoding tool finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ToolExit {
    /// `None` when the process was killed by a signal.
    pub code: Option<i32>,
}

impl ToolExit {
    #[must_use]
    pub fn success(self) -> bool {
        self.code == Some(0)
    }
}

/// The external tool that turns a stream playlist into a local file.
#[async_trait]
pub trait Transcoder: Send + Sync {
    async fn run(&self, args: &[String]) -> std::io::Result<ToolExit>;
}

/// Runs `ffmpeg` (or whatever binary it is pointed at) directly, without a
/// shell.
#[derive(Debug, Clone)]
pub struct FfmpegTranscoder {
    program: PathBuf,
}

impl FfmpegTranscoder {
    #[must_use]
    pub fn new(program: impl Into<PathBuf>) -> Self {
        FfmpegTranscoder {
            program: program.into(),
        }
    }
}

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    async fn run(&self, args: &[String]) -> std::io::Result<ToolExit> {
        let status = tokio::process::Command::new(&self.program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .status()
            .await?;
        Ok(ToolExit {
            code: status.code(),
        })
    }
}

/// Remux arguments: copy the video stream, normalise audio to AAC.
#[must_use]
pub fn transcode_args(stream_url: &str, target: &Path) -> Vec<String> {
    vec![
        "-i".to_owned(),
        stream_url.to_owned(),
        "-vcodec".to_owned(),
        "copy".to_owned(),
        "-c".to_owned(),
        "copy".to_owned(),
        "-c:a".to_owned(),
        "aac".to_owned(),
        target.to_string_lossy().into_owned(),
    ]
}

/// Where `record` is downloaded to inside `output_dir`.
#[must_use]
pub fn target_path(output_dir: &Path, record: &StreamRecord) -> PathBuf {
    output_dir.join(record.video_file_name())
}

/// Bytes on disk at `path`, 0 if there is nothing there yet.
pub async fn file_size(path: &Path) -> u64 {
    tokio::fs::metadata(path).await.map_or(0, |meta| meta.len())
}

/// Human readable size of what has been downloaded for `record` so far,
/// `"0"` if nothing has.
pub async fn downloaded_size(output_dir: &Path, record: &StreamRecord) -> String {
    match file_size(&target_path(output_dir, record)).await {
        0 => "0".to_owned(),
        size => format_file_size(size),
    }
}

pub struct Downloader<T> {
    transcoder: T,
    output_dir: PathBuf,
}

impl<T: Transcoder> Downloader<T> {
    #[must_use]
    pub fn new(transcoder: T, output_dir: impl Into<PathBuf>) -> Self {
        Downloader {
            transcoder,
            output_dir: output_dir.into(),
        }
    }

    #[must_use]
    pub fn transcoder(&self) -> &T {
        &self.transcoder
    }

    #[must_use]
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    #[must_use]
    pub fn target_path(&self, record: &StreamRecord) -> PathBuf {
        target_path(&self.output_dir, record)
    }

    pub async fn downloaded_size(&self, record: &StreamRecord) -> String {
        downloaded_size(&self.output_dir, record).await
    }

    /// Downloads `record` unless a non-empty target already exists. Returns
    /// the size of the target afterwards.
    ///
    /// # Errors
    ///
    /// Fails, naming the record, if the tool cannot be started or exits
    /// unsuccessfully.
    pub async fn download(&self, record: &StreamRecord) -> Result<u64> {
        let target = self.target_path(record);
        let existing = file_size(&target).await;
        if existing > 0 {
            log::info!(
                "{} already downloaded {}",
                target.display(),
                format_file_size(existing)
            );
            return Ok(existing);
        }

        let args = transcode_args(&record.stream_url, &target);
        let exit = self
            .transcoder
            .run(&args)
            .await
            .map_err(|e| ScrapeError::Download {
                title: record.title.clone(),
                reason: format!("fail to start transcoder: {e}"),
            })?;
        if !exit.success() {
            return Err(ScrapeError::Download {
                title: record.title.clone(),
                reason: match exit.code {
                    Some(code) => format!("transcoder exited with status {code}"),
                    None => "transcoder was killed".to_owned(),
                },
            });
        }

        let size = file_size(&target).await;
        log::info!("{} downloaded {}", target.display(), format_file_size(size));
        Ok(size)
    }
}
