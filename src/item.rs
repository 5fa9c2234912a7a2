use crate::error::AppResult;
use crate::script::Speaker;
use crate::store::{ItemMetadata, Stage, Store};
use std::path::{Path, PathBuf};

/// One unit of work: its metadata plus the on-disk locations derived from
/// its id. Locations are never persisted.
#[derive(Debug, Clone)]
pub struct Item {
    metadata: ItemMetadata,
    dir: PathBuf,
}

impl Item {
    pub fn new(metadata: ItemMetadata, data_dir: &Path) -> Self {
        let dir = data_dir.join(safe_dir_name(&metadata.id));
        Self { metadata, dir }
    }

    pub fn id(&self) -> &str {
        &self.metadata.id
    }

    pub fn metadata(&self) -> &ItemMetadata {
        &self.metadata
    }

    pub fn location_on_disk(&self) -> &Path {
        &self.dir
    }

    pub fn ensure_dir(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.dir)
    }

    pub fn document_path(&self) -> PathBuf {
        self.dir.join("document.pdf")
    }

    pub fn script_path(&self) -> PathBuf {
        self.dir.join("script.json")
    }

    pub fn clips_dir(&self) -> PathBuf {
        self.dir.join("audio")
    }

    /// Zero-padded index first, so lexical order equals script order.
    pub fn clip_path(&self, index: usize, speaker: Speaker) -> PathBuf {
        self.clips_dir()
            .join(format!("{:05}-{}.wav", index, speaker.tag()))
    }

    pub fn mixdown_path(&self) -> PathBuf {
        self.dir.join("podcast.mp3")
    }

    pub fn set_flag(&self, store: &Store, stage: Stage, value: bool) -> AppResult<()> {
        store.set_flag(self.id(), stage, value)
    }

    /// Delete the cached artifacts produced by `stage` and every later stage.
    /// A forced synthesize keeps the script unless `remove_script` is set,
    /// since regenerating it calls the paid generation API. Reacquiring the
    /// document always drops the script made from the old one.
    pub fn remove_artifacts(&self, stage: Stage, remove_script: bool) -> std::io::Result<Vec<PathBuf>> {
        let mut removed = Vec::new();
        let remove_script = remove_script || stage < Stage::Synthesize;

        for s in stage.and_downstream() {
            let targets: Vec<PathBuf> = match s {
                Stage::Acquire => vec![self.document_path()],
                Stage::Synthesize => {
                    let mut t = vec![self.clips_dir(), self.mixdown_path()];
                    if remove_script {
                        t.push(self.script_path());
                    }
                    t
                }
                Stage::Publish => Vec::new(),
            };

            for path in targets {
                if path.is_dir() {
                    log::info!("Removing {:?}", path);
                    std::fs::remove_dir_all(&path)?;
                    removed.push(path);
                } else if path.exists() {
                    log::info!("Removing {:?}", path);
                    std::fs::remove_file(&path)?;
                    removed.push(path);
                }
            }
        }

        Ok(removed)
    }
}

/// Map an id to a single safe path component. Bytes outside
/// `[A-Za-z0-9._-]` are percent-encoded, `%` included, so distinct ids never
/// share a directory. An all-dots id is encoded entirely.
fn safe_dir_name(id: &str) -> String {
    let all_dots = !id.is_empty() && id.bytes().all(|b| b == b'.');
    let mut name = String::with_capacity(id.len());
    for b in id.bytes() {
        let keep = b.is_ascii_alphanumeric() || b == b'-' || b == b'_' || (b == b'.' && !all_dots);
        if keep {
            name.push(b as char);
        } else {
            name.push_str(&format!("%{:02X}", b));
        }
    }
    if name.is_empty() {
        name.push('%');
    }
    name
}
