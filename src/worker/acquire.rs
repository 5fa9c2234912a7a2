use crate::error::{AppError, AppResult};
use crate::item::Item;
use crate::store::{ItemMetadata, Stage, Store};
use chrono::NaiveDate;
use std::path::Path;

use super::{select_candidates, RunReport, Selection};

/// Lists the day's source documents and fetches their bytes.
#[allow(async_fn_in_trait)]
pub trait DocumentSource {
    /// Documents for `date`, or for the latest day when `None`. Ids must be
    /// stable across runs.
    async fn list_documents(&self, date: Option<NaiveDate>) -> AppResult<Vec<ItemMetadata>>;

    /// Download `url` to `dest`. `dest` must only appear once complete.
    async fn fetch_document(&self, url: &str, dest: &Path) -> AppResult<u64>;
}

/// Record newly listed items and download every document not yet acquired.
///
/// Items recorded on earlier runs whose download failed are retried even
/// when they no longer appear in the listing.
pub async fn run_acquire<S: DocumentSource>(
    store: &Store,
    source: &S,
    date: Option<NaiveDate>,
    selection: &Selection,
) -> AppResult<RunReport> {
    let mut report = RunReport::new(Stage::Acquire);

    let candidates = match selection {
        Selection::Backlog => match discover(store, source, date).await {
            Ok(candidates) => candidates,
            Err(e) => {
                report.record_run_failure(&e);
                // Earlier sightings can still be downloaded
                store.backlog(Stage::Acquire)?
            }
        },
        Selection::Force { .. } => select_candidates(store, Stage::Acquire, selection)?,
    };

    let total = candidates.len();
    for (i, item) in candidates.iter().enumerate() {
        log::info!("[{}/{}] Acquiring {} ({})", i + 1, total, item.id(), item.metadata().title);
        let result = acquire_item(source, item).await;
        report.finish_item(store, item, Stage::Acquire, result);
    }

    report.log_summary();
    Ok(report)
}

/// Record first sightings and return every item still lacking its document.
async fn discover<S: DocumentSource>(
    store: &Store,
    source: &S,
    date: Option<NaiveDate>,
) -> AppResult<Vec<Item>> {
    let listings = source.list_documents(date).await?;
    log::info!("Found {} documents", listings.len());

    let mut new_items = 0;
    for listing in &listings {
        // Metadata is immutable once recorded
        if store.get_item(&listing.id)?.is_none() {
            store.put_item(listing)?;
            new_items += 1;
        }
    }
    log::info!("{} new items recorded", new_items);

    store.backlog(Stage::Acquire)
}

async fn acquire_item<S: DocumentSource>(source: &S, item: &Item) -> AppResult<()> {
    item.ensure_dir()?;
    let dest = item.document_path();

    if dest.exists() {
        log::info!("Document already on disk for {}", item.id());
        return Ok(());
    }

    let url = &item.metadata().document_url;
    if url.trim().is_empty() {
        return Err(AppError::Precondition(format!("{} has no document url", item.id())));
    }

    log::info!("Downloading document for {} from {}", item.id(), url);
    let bytes = source.fetch_document(url, &dest).await?;
    log::info!("Downloaded {} bytes for {}", bytes, item.id());
    Ok(())
}
