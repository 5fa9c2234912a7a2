//! Stage runners. Each stage scans the store for its backlog (or takes one
//! forced item), runs its checkpointed sub-steps item by item and flips the
//! stage flag on success. A failed item is recorded and the run moves on.

pub mod acquire;
pub mod publish;
pub mod synthesize;


use crate::error::{AppError, AppResult};
use crate::item::Item;
use crate::store::{Stage, Store};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Which items a stage run works on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    /// Every item whose prerequisite is done and whose own flag is not.
    Backlog,
    /// One item, rerun from scratch regardless of its flag. Cached
    /// artifacts of this stage and later ones are deleted first.
    Force {
        item_id: String,
        remove_script: bool,
    },
}

impl Selection {
    pub fn from_args(item_id: Option<String>, remove_script: bool) -> Self {
        match item_id {
            Some(item_id) => Self::Force {
                item_id,
                remove_script,
            },
            None => Self::Backlog,
        }
    }
}

/// Resolve the candidates for `stage`. For a forced item this also deletes
/// its downstream artifacts and clears its downstream flags.
pub fn select_candidates(store: &Store, stage: Stage, selection: &Selection) -> AppResult<Vec<Item>> {
    match selection {
        Selection::Backlog => store.backlog(stage),
        Selection::Force {
            item_id,
            remove_script,
        } => {
            let item = store
                .get_item(item_id)?
                .ok_or_else(|| AppError::NotFound(format!("item {}", item_id)))?;

            if !store.get_flags(item_id)?.is_ready_for(stage) {
                return Err(AppError::Precondition(format!(
                    "{} cannot {}: {} is not done",
                    item_id,
                    stage,
                    stage.prerequisite().map(|p| p.flag_name()).unwrap_or("-")
                )));
            }

            let removed = item.remove_artifacts(stage, *remove_script)?;
            log::info!(
                "Force reprocessing {} for {} ({} artifacts removed)",
                item_id,
                stage,
                removed.len()
            );
            store.set_flag(item_id, stage, false)?;

            Ok(vec![item])
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ItemFailure {
    pub timestamp: DateTime<Utc>,
    pub item_id: String,
    pub stage: String,
    pub error: String,
}

/// Outcome of one stage run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub stage: String,
    pub attempted: usize,
    pub completed: usize,
    pub failures: Vec<ItemFailure>,
}

impl RunReport {
    pub fn new(stage: Stage) -> Self {
        Self {
            stage: stage.to_string(),
            attempted: 0,
            completed: 0,
            failures: Vec::new(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn record_failure(&mut self, item_id: &str, error: &AppError) {
        log::error!("[{}] {} failed: {}", self.stage, item_id, error);
        self.failures.push(ItemFailure {
            timestamp: Utc::now(),
            item_id: item_id.to_string(),
            stage: self.stage.clone(),
            error: error.to_string(),
        });
    }

    /// Record a run-level failure that is not tied to a single item.
    pub fn record_run_failure(&mut self, error: &AppError) {
        self.record_failure("*", error);
    }

    /// Set the stage flag when the item's sub-steps all succeeded, otherwise
    /// record why it did not.
    pub fn finish_item(&mut self, store: &Store, item: &Item, stage: Stage, result: AppResult<()>) {
        self.attempted += 1;
        match result.and_then(|()| item.set_flag(store, stage, true)) {
            Ok(()) => {
                self.completed += 1;
                log::info!("[{}] {} done", self.stage, item.id());
            }
            Err(e) => self.record_failure(item.id(), &e),
        }
    }

    pub fn log_summary(&self) {
        if self.is_success() {
            log::info!(
                "{} finished: {}/{} items completed",
                self.stage,
                self.completed,
                self.attempted
            );
            return;
        }

        log::error!(
            "{} finished with {} error(s), {}/{} items completed",
            self.stage,
            self.failures.len(),
            self.completed,
            self.attempted
        );
        for failure in &self.failures {
            log::error!(
                "  [{}] {}: {}",
                failure.timestamp.to_rfc3339(),
                failure.item_id,
                failure.error
            );
        }
    }
}
