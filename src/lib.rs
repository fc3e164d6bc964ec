pub mod browser;
pub mod config;
pub mod coordinator;
pub mod downloader;
pub mod errors;
pub mod extractor;
pub mod record;
pub mod server;
pub mod size;

pub use errors::{Result, ScrapeError};
pub use record::StreamRecord;
