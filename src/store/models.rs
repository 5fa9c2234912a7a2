use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Current layout of the persisted state document.
pub const SCHEMA_VERSION: u32 = 1;

/// Pipeline stages in execution order. Serialized as the completion flag name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Stage {
    #[serde(rename = "acquired", alias = "downloadedPDF")]
    Acquire,
    #[serde(rename = "synthesized", alias = "processedPodcast")]
    Synthesize,
    #[serde(rename = "published", alias = "publishedToSpotify")]
    Publish,
}

impl Stage {
    pub const ALL: [Stage; 3] = [Stage::Acquire, Stage::Synthesize, Stage::Publish];

    /// The stage whose flag must be set before this one may run.
    pub fn prerequisite(self) -> Option<Stage> {
        match self {
            Self::Acquire => None,
            Self::Synthesize => Some(Self::Acquire),
            Self::Publish => Some(Self::Synthesize),
        }
    }

    /// This stage and every stage after it.
    pub fn and_downstream(self) -> impl Iterator<Item = Stage> {
        Self::ALL.into_iter().filter(move |s| *s >= self)
    }

    pub fn flag_name(self) -> &'static str {
        match self {
            Self::Acquire => "acquired",
            Self::Synthesize => "synthesized",
            Self::Publish => "published",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Acquire => write!(f, "acquire"),
            Self::Synthesize => write!(f, "synthesize"),
            Self::Publish => write!(f, "publish"),
        }
    }
}

/// Immutable metadata recorded when an item is first discovered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemMetadata {
    pub id: String,
    pub date: NaiveDate,
    pub title: String,
    #[serde(alias = "url")]
    pub source_url: String,
    #[serde(alias = "pdfUrl")]
    pub document_url: String,
    #[serde(default, alias = "abstract", skip_serializing_if = "Option::is_none")]
    pub synopsis: Option<String>,
}

/// Per-item completion flags. Absent means "not done".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StageFlags(BTreeMap<Stage, bool>);

impl StageFlags {
    pub fn get(&self, stage: Stage) -> Option<bool> {
        self.0.get(&stage).copied()
    }

    pub fn is_done(&self, stage: Stage) -> bool {
        self.get(stage).unwrap_or(false)
    }

    /// True when the stage's prerequisite (if any) is done.
    pub fn is_ready_for(&self, stage: Stage) -> bool {
        stage.prerequisite().map_or(true, |p| self.is_done(p))
    }

    pub(crate) fn set(&mut self, stage: Stage, value: bool) {
        self.0.insert(stage, value);
    }

    /// Remove the flag for `stage` and every later stage.
    pub(crate) fn clear_from(&mut self, stage: Stage) {
        for s in stage.and_downstream() {
            self.0.remove(&s);
        }
    }
}

impl<const N: usize> From<[(Stage, bool); N]> for StageFlags {
    fn from(entries: [(Stage, bool); N]) -> Self {
        Self(entries.into_iter().collect())
    }
}

/// The whole persisted document: metadata and flags keyed by item id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateDocument {
    #[serde(default)]
    pub schema_version: u32,
    #[serde(default, alias = "papers")]
    pub items: BTreeMap<String, ItemMetadata>,
    #[serde(default, alias = "paper_states")]
    pub flags: BTreeMap<String, StageFlags>,
}

impl Default for StateDocument {
    fn default() -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            items: BTreeMap::new(),
            flags: BTreeMap::new(),
        }
    }
}

/// Per-stage counts for the status command.
#[derive(Debug, Clone, Default, Serialize)]
pub struct StageCounts {
    pub stage: String,
    pub done: usize,
    pub backlog: usize,
}
