pub mod models;

#[cfg(test)]
mod tests;

use crate::error::{AppError, AppResult};
use crate::item::Item;
use std::path::{Path, PathBuf};

pub use models::*;

const STATE_FILE: &str = "state.json";

/// File-backed item store.
///
/// Every call reloads the whole document and every mutation writes the whole
/// document back, so each call sees the latest state. This is only safe with
/// a single writer process; concurrent pipeline instances must be serialized
/// externally.
pub struct Store {
    data_dir: PathBuf,
    path: PathBuf,
}

impl Store {
    pub fn open(data_dir: &Path) -> AppResult<Self> {
        std::fs::create_dir_all(data_dir)
            .map_err(|e| AppError::Store(format!("Failed to create {:?}: {}", data_dir, e)))?;

        let store = Self {
            data_dir: data_dir.to_path_buf(),
            path: data_dir.join(STATE_FILE),
        };

        // Surface a corrupt or unsupported document at startup, not mid-run
        store.load()?;

        Ok(store)
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> AppResult<StateDocument> {
        if !self.path.exists() {
            return Ok(StateDocument::default());
        }

        let content = std::fs::read_to_string(&self.path)
            .map_err(|e| AppError::Store(format!("Failed to read {:?}: {}", self.path, e)))?;
        let mut doc: StateDocument = serde_json::from_str(&content)
            .map_err(|e| AppError::Store(format!("Failed to parse {:?}: {}", self.path, e)))?;

        if doc.schema_version > SCHEMA_VERSION {
            return Err(AppError::Precondition(format!(
                "state document has schema version {}, this build supports up to {}",
                doc.schema_version, SCHEMA_VERSION
            )));
        }
        // Version 0 has the same shape under older field names, which the
        // serde aliases already map.
        doc.schema_version = SCHEMA_VERSION;

        Ok(doc)
    }

    fn save(&self, doc: &StateDocument) -> AppResult<()> {
        let content = serde_json::to_string_pretty(doc)?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, content)
            .map_err(|e| AppError::Store(format!("Failed to write {:?}: {}", tmp, e)))?;
        std::fs::rename(&tmp, &self.path)
            .map_err(|e| AppError::Store(format!("Failed to replace {:?}: {}", self.path, e)))?;
        Ok(())
    }

    fn update<T>(&self, updater: impl FnOnce(&mut StateDocument) -> AppResult<T>) -> AppResult<T> {
        let mut doc = self.load()?;
        let result = updater(&mut doc)?;
        self.save(&doc)?;
        Ok(result)
    }

    pub fn get_item(&self, id: &str) -> AppResult<Option<Item>> {
        let doc = self.load()?;
        Ok(doc
            .items
            .get(id)
            .map(|metadata| Item::new(metadata.clone(), &self.data_dir)))
    }

    /// Inserts or overwrites the metadata for `metadata.id`.
    pub fn put_item(&self, metadata: &ItemMetadata) -> AppResult<()> {
        self.update(|doc| {
            doc.items.insert(metadata.id.clone(), metadata.clone());
            Ok(())
        })
    }

    /// Setting a flag requires its prerequisite to be done. Clearing a flag
    /// also clears every later stage, so flags stay monotonic.
    pub fn set_flag(&self, id: &str, stage: Stage, value: bool) -> AppResult<()> {
        self.update(|doc| {
            let flags = doc.flags.entry(id.to_string()).or_default();
            if value {
                if !flags.is_ready_for(stage) {
                    return Err(AppError::Precondition(format!(
                        "cannot mark {} as {}: {} is not done",
                        id,
                        stage.flag_name(),
                        stage.prerequisite().map(|p| p.flag_name()).unwrap_or("-")
                    )));
                }
                flags.set(stage, true);
            } else {
                flags.clear_from(stage);
            }
            Ok(())
        })
    }

    pub fn get_flag(&self, id: &str, stage: Stage) -> AppResult<Option<bool>> {
        let doc = self.load()?;
        Ok(doc.flags.get(id).and_then(|flags| flags.get(stage)))
    }

    pub fn get_flags(&self, id: &str) -> AppResult<StageFlags> {
        let doc = self.load()?;
        Ok(doc.flags.get(id).cloned().unwrap_or_default())
    }

    /// Items whose flags match `predicate`, in id order.
    ///
    /// Ids that have flags but no metadata are skipped with a warning.
    pub fn list_by_flags(&self, predicate: impl Fn(&StageFlags) -> bool) -> AppResult<Vec<Item>> {
        let doc = self.load()?;
        Ok(doc
            .flags
            .iter()
            .filter(|(_, flags)| predicate(flags))
            .filter_map(|(id, _)| match doc.items.get(id) {
                Some(metadata) => Some(Item::new(metadata.clone(), &self.data_dir)),
                None => {
                    log::warn!("Flags recorded for unknown item {}, skipping", id);
                    None
                }
            })
            .collect())
    }

    pub fn find_first_by_flags(
        &self,
        predicate: impl Fn(&StageFlags) -> bool,
    ) -> AppResult<Option<Item>> {
        Ok(self.list_by_flags(predicate)?.into_iter().next())
    }

    pub fn count_by_flags(&self, predicate: impl Fn(&StageFlags) -> bool) -> AppResult<usize> {
        Ok(self.list_by_flags(predicate)?.len())
    }

    /// Items waiting for `stage`: prerequisite done, stage itself not done.
    ///
    /// Walks recorded items rather than flags, so an item with no flags yet
    /// is in the acquire backlog. Agrees with [`Store::stage_counts`].
    pub fn backlog(&self, stage: Stage) -> AppResult<Vec<Item>> {
        let doc = self.load()?;
        let no_flags = StageFlags::default();

        Ok(doc
            .items
            .iter()
            .filter(|(id, _)| {
                let flags = doc.flags.get(*id).unwrap_or(&no_flags);
                flags.is_ready_for(stage) && !flags.is_done(stage)
            })
            .map(|(_, metadata)| Item::new(metadata.clone(), &self.data_dir))
            .collect())
    }

    pub fn item_ids(&self) -> AppResult<Vec<String>> {
        Ok(self.load()?.items.into_keys().collect())
    }

    /// Done/backlog counts per stage over every recorded item, including
    /// items that have no flags yet.
    pub fn stage_counts(&self) -> AppResult<Vec<StageCounts>> {
        let doc = self.load()?;
        let no_flags = StageFlags::default();

        Ok(Stage::ALL
            .into_iter()
            .map(|stage| {
                let mut counts = StageCounts {
                    stage: stage.to_string(),
                    ..Default::default()
                };
                for id in doc.items.keys() {
                    let flags = doc.flags.get(id).unwrap_or(&no_flags);
                    if flags.is_done(stage) {
                        counts.done += 1;
                    } else if flags.is_ready_for(stage) {
                        counts.backlog += 1;
                    }
                }
                counts
            })
            .collect())
    }
}
