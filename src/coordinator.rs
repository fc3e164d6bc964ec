//! Downloads every record with a fixed number of worker slots.
//!
//! The first failed download ends the run: no further record is started and
//! downloads still in flight are aborted, which kills their tool processes.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::downloader::{Downloader, Transcoder};
use crate::errors::{Result, ScrapeError};
use crate::record::StreamRecord;

/// Runs `downloader` over `records` with at most `max_parallel` downloads in
/// flight. Records are started in order.
///
/// # Errors
///
/// Returns the error of the first download that failed.
pub async fn run_all<T>(
    downloader: Arc<Downloader<T>>,
    records: Arc<[StreamRecord]>,
    max_parallel: usize,
) -> Result<()>
where
    T: Transcoder + 'static,
{
    let slots = Arc::new(Semaphore::new(max_parallel.max(1)));
    let failed = Arc::new(AtomicBool::new(false));
    let mut join_set = JoinSet::new();

    for index in 0..records.len() {
        // Waiting for a slot is also where an earlier failure is noticed.
        let Ok(permit) = Arc::clone(&slots).acquire_owned().await else {
            break;
        };
        if failed.load(Ordering::SeqCst) {
            break;
        }

        let downloader = Arc::clone(&downloader);
        let records = Arc::clone(&records);
        let failed = Arc::clone(&failed);
        join_set.spawn(async move {
            let record = &records[index];
            let result = downloader.download(record).await;
            if result.is_err() {
                failed.store(true, Ordering::SeqCst);
            }
            // Released only after the failure flag is visible.
            drop(permit);
            result.map(|_| ())
        });
    }

    while let Some(joined) = join_set.join_next().await {
        let outcome = match joined {
            Ok(outcome) => outcome,
            Err(e) if e.is_cancelled() => continue,
            Err(e) => Err(ScrapeError::Task(e.to_string())),
        };
        if let Err(e) = outcome {
            log::error!("{e}");
            join_set.abort_all();
            while join_set.join_next().await.is_some() {}
            return Err(e);
        }
    }
    Ok(())
}
