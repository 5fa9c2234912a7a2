use crate::audio::{Clip, MixdownRenderer};
use crate::error::{AppError, AppResult};
use crate::item::Item;
use crate::script::{NarrationScript, Speaker};
use crate::store::{Stage, Store};
use std::path::Path;

use super::{select_candidates, RunReport, Selection};

/// Turns a source document into a narration script.
#[allow(async_fn_in_trait)]
pub trait ScriptWriter {
    async fn write_script(&self, item: &Item, document: &Path) -> AppResult<NarrationScript>;
}

/// Renders one narration line in the speaker's voice.
#[allow(async_fn_in_trait)]
pub trait VoiceSynthesizer {
    /// On success a complete audio file exists at `output`; it must never be
    /// observable half-written.
    async fn synthesize(&self, text: &str, speaker: Speaker, output: &Path) -> AppResult<()>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SynthesizeOptions {
    /// Keep the per-line clips after the mixdown is written.
    pub keep_audio: bool,
}

/// The synthesize stage and its collaborators.
pub struct Synthesizer<'a, W, V, R> {
    store: &'a Store,
    writer: &'a W,
    voice: &'a V,
    renderer: &'a R,
    options: SynthesizeOptions,
}

impl<'a, W, V, R> Synthesizer<'a, W, V, R>
where
    W: ScriptWriter,
    V: VoiceSynthesizer,
    R: MixdownRenderer,
{
    pub fn new(
        store: &'a Store,
        writer: &'a W,
        voice: &'a V,
        renderer: &'a R,
        options: SynthesizeOptions,
    ) -> Self {
        Self {
            store,
            writer,
            voice,
            renderer,
            options,
        }
    }

    pub async fn run(&self, selection: &Selection) -> AppResult<RunReport> {
        let mut report = RunReport::new(Stage::Synthesize);
        let candidates = select_candidates(self.store, Stage::Synthesize, selection)?;

        let total = candidates.len();
        for (i, item) in candidates.iter().enumerate() {
            log::info!(
                "[{}/{}] Synthesizing {} ({})",
                i + 1,
                total,
                item.id(),
                item.metadata().title
            );
            let result = self.process_item(item).await;
            report.finish_item(self.store, item, Stage::Synthesize, result);
        }

        report.log_summary();
        Ok(report)
    }

    /// Checkpointed sub-steps: script, clips, mixdown, clip cleanup. Each
    /// step is skipped when its output is already on disk.
    pub async fn process_item(&self, item: &Item) -> AppResult<()> {
        let mixdown = item.mixdown_path();
        if mixdown.exists() {
            log::info!("Mixdown already present for {}", item.id());
            self.clear_clips(item);
            return Ok(());
        }

        let script = self.load_or_write_script(item).await?;
        let clips = self.synthesize_clips(item, &script).await?;

        self.renderer.assemble(&clips, &mixdown).await?;
        if !mixdown.is_file() {
            return Err(AppError::Render(format!("no mixdown produced at {:?}", mixdown)));
        }

        self.clear_clips(item);
        Ok(())
    }

    async fn load_or_write_script(&self, item: &Item) -> AppResult<NarrationScript> {
        let script_path = item.script_path();
        if script_path.exists() {
            let script = NarrationScript::load(&script_path)?;
            log::info!("Using cached script for {} ({} lines)", item.id(), script.len());
            return Ok(script);
        }

        let document = item.document_path();
        if !document.is_file() {
            return Err(AppError::Precondition(format!(
                "document missing for {}: {:?}",
                item.id(),
                document
            )));
        }

        log::info!("Generating script for {} from {:?}", item.id(), document);
        let script = self.writer.write_script(item, &document).await?;
        if script.is_empty() {
            return Err(AppError::Precondition(format!(
                "generated script for {} has no lines",
                item.id()
            )));
        }
        script.save(&script_path)?;
        log::info!("Script saved for {} ({} lines)", item.id(), script.len());
        Ok(script)
    }

    async fn synthesize_clips(&self, item: &Item, script: &NarrationScript) -> AppResult<Vec<Clip>> {
        std::fs::create_dir_all(item.clips_dir())?;

        let mut clips = Vec::with_capacity(script.len());
        let mut generated = 0;
        for (i, line) in script.lines.iter().enumerate() {
            let path = item.clip_path(i, line.speaker);
            if !path.exists() {
                log::info!(
                    "Generating voice {}/{} [{}] {}",
                    i + 1,
                    script.len(),
                    line.speaker.tag(),
                    line.text
                );
                self.voice.synthesize(&line.text, line.speaker, &path).await?;
                if !path.is_file() {
                    return Err(AppError::Collaborator(format!(
                        "voice synthesis reported success but wrote no clip at {:?}",
                        path
                    )));
                }
                generated += 1;
            }
            clips.push(Clip {
                path,
                speaker: line.speaker,
            });
        }

        log::info!(
            "{} clips for {} ({} generated, {} cached)",
            clips.len(),
            item.id(),
            generated,
            clips.len() - generated
        );
        Ok(clips)
    }

    /// Clips are regenerable from the script, so a failed removal is only
    /// logged.
    fn clear_clips(&self, item: &Item) {
        if self.options.keep_audio {
            return;
        }
        let dir = item.clips_dir();
        if dir.exists() {
            log::info!("Clearing clips from {:?}", dir);
            if let Err(e) = std::fs::remove_dir_all(&dir) {
                log::warn!("Failed to clear clips for {}: {}", item.id(), e);
            }
        }
    }
}
