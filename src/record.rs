use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::errors::{Result, ScrapeError};

const VIDEO_EXTENSION: &str = "mp4";

/// One video page: where it was found, what it is called and where its
/// playlist lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamRecord {
    #[serde(rename = "url")]
    pub page_url: String,
    pub title: String,
    #[serde(rename = "mp4_url")]
    pub stream_url: String,
}

impl StreamRecord {
    #[must_use]
    pub fn new(
        page_url: impl Into<String>,
        title: impl Into<String>,
        stream_url: impl Into<String>,
    ) -> Self {
        StreamRecord {
            page_url: page_url.into(),
            title: title.into(),
            stream_url: stream_url.into(),
        }
    }

    /// Local file name of the downloaded video, `<title>.mp4`.
    #[must_use]
    pub fn video_file_name(&self) -> String {
        format!("{}.{VIDEO_EXTENSION}", file_stem(&self.title))
    }
}

/// Turns a title into something usable as a single path component.
fn file_stem(title: &str) -> String {
    let stem: String = title
        .chars()
        .map(|c| {
            if c == '/' || c == '\\' || c == '\0' || c.is_control() {
                '_'
            } else {
                c
            }
        })
        .collect();
    let stem = stem.trim();
    if stem.is_empty() || stem == "." || stem == ".." {
        "_".to_owned()
    } else {
        stem.to_owned()
    }
}

/// Writes the record list into `dir` as `<first title>.json`.
///
/// # Errors
///
/// Returns [`ScrapeError::NoRecords`] for an empty list, or an I/O error if
/// the file cannot be written.
pub fn save_records(records: &[StreamRecord], dir: &Path) -> Result<PathBuf> {
    let first = records.first().ok_or(ScrapeError::NoRecords)?;
    let path = dir.join(format!("{}.json", file_stem(&first.title)));
    let json = serde_json::to_string_pretty(records).map_err(|source| ScrapeError::Json {
        path: path.clone(),
        source,
    })?;
    std::fs::write(&path, json).map_err(|e| ScrapeError::io("write", &path, e))?;
    log::info!("Saved {} records to {}", records.len(), path.display());
    Ok(path)
}

/// Reads a record list written by [`save_records`].
///
/// # Errors
///
/// Fails if the file is unreadable, is not a record list, or holds no records.
pub fn load_records(path: &Path) -> Result<Vec<StreamRecord>> {
    let content = std::fs::read_to_string(path).map_err(|e| ScrapeError::io("read", path, e))?;
    let records: Vec<StreamRecord> =
        serde_json::from_str(&content).map_err(|source| ScrapeError::Json {
            path: path.to_path_buf(),
            source,
        })?;
    if records.is_empty() {
        return Err(ScrapeError::NoRecords);
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Vec<StreamRecord> {
        vec![
            StreamRecord::new(
                "https://video.example.com/play/1",
                "第1集",
                "https://cdn.example.com/1/index.m3u8",
            ),
            StreamRecord::new(
                "https://video.example.com/play/2",
                "第2集",
                "https://cdn.example.com/2/index.m3u8",
            ),
        ]
    }

    #[test]
    fn file_name_is_title_with_extension() {
        let record = StreamRecord::new("u", "Episode 01", "s");
        assert_eq!(record.video_file_name(), "Episode 01.mp4");
    }

    #[test]
    fn file_name_cannot_escape_directory() {
        let record = StreamRecord::new("u", "../a/b\\c", "s");
        assert_eq!(record.video_file_name(), ".._a_b_c.mp4");
        let record = StreamRecord::new("u", "  ", "s");
        assert_eq!(record.video_file_name(), "_.mp4");
    }

    #[test]
    fn serializes_with_persisted_field_names() {
        let json = serde_json::to_value(&sample()[0]).unwrap();
        assert_eq!(json["url"], "https://video.example.com/play/1");
        assert_eq!(json["title"], "第1集");
        assert_eq!(json["mp4_url"], "https://cdn.example.com/1/index.m3u8");
    }

    #[test]
    fn saved_list_loads_back_identically() {
        let dir = tempfile::tempdir().unwrap();
        let records = sample();
        let path = save_records(&records, dir.path()).unwrap();
        assert_eq!(path.file_name().unwrap(), "第1集.json");
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("\n  {"), "expected indented output: {text}");
        assert_eq!(load_records(&path).unwrap(), records);
    }

    #[test]
    fn empty_lists_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            save_records(&[], dir.path()),
            Err(ScrapeError::NoRecords)
        ));
        let path = dir.path().join("empty.json");
        std::fs::write(&path, "[]").unwrap();
        assert!(matches!(load_records(&path), Err(ScrapeError::NoRecords)));
    }

    #[test]
    fn malformed_list_names_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, "{\"url\": 1}").unwrap();
        let err = load_records(&path).unwrap_err();
        assert!(err.to_string().contains("broken.json"));
    }
}
