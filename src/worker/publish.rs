use crate::error::{AppError, AppResult};
use crate::item::Item;
use crate::store::{Stage, Store};
use std::path::Path;

use super::{select_candidates, RunReport, Selection};

/// Opens sessions against the distribution platform.
#[allow(async_fn_in_trait)]
pub trait Publisher {
    type Session: PublishSession;

    async fn open(&self) -> AppResult<Self::Session>;
}

/// An open, explicitly owned connection to the platform. Consumed by
/// [`PublishSession::close`].
#[allow(async_fn_in_trait)]
pub trait PublishSession {
    /// `Ok(true)` once the episode is publicly available.
    async fn publish(&self, item: &Item, mixdown: &Path) -> AppResult<bool>;

    async fn close(self) -> AppResult<()>;
}

/// Publish every synthesized item not yet published.
///
/// One session serves the whole run and is closed on every path; a close
/// failure is logged and never replaces an item error.
pub async fn run_publish<P: Publisher>(
    store: &Store,
    publisher: &P,
    selection: &Selection,
) -> AppResult<RunReport> {
    let mut report = RunReport::new(Stage::Publish);
    let candidates = select_candidates(store, Stage::Publish, selection)?;

    if candidates.is_empty() {
        log::info!("Nothing to publish");
        return Ok(report);
    }

    let session = match publisher.open().await {
        Ok(session) => session,
        Err(e) => {
            report.record_run_failure(&e);
            report.log_summary();
            return Ok(report);
        }
    };

    let total = candidates.len();
    for (i, item) in candidates.iter().enumerate() {
        log::info!("[{}/{}] Publishing {} ({})", i + 1, total, item.id(), item.metadata().title);
        let result = publish_item(&session, item).await;
        report.finish_item(store, item, Stage::Publish, result);
    }

    if let Err(e) = session.close().await {
        log::warn!("Failed to close publish session: {}", e);
    }

    report.log_summary();
    Ok(report)
}

async fn publish_item<S: PublishSession>(session: &S, item: &Item) -> AppResult<()> {
    let mixdown = item.mixdown_path();
    if !mixdown.is_file() {
        return Err(AppError::Precondition(format!(
            "mixdown missing for {}: {:?}",
            item.id(),
            mixdown
        )));
    }

    if session.publish(item, &mixdown).await? {
        Ok(())
    } else {
        Err(AppError::Collaborator(format!(
            "publisher did not confirm {}",
            item.id()
        )))
    }
}
