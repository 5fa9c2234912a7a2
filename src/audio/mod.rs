//! Audio timeline assembly: panned narration clips with gaps, tempo
//! adjustment, intro/outro beds and a loudness-normalized mixdown.
//!
//! Assembly is two-phase. [`TimelineAssembler::measure`] renders the
//! narration alone and measures it; [`TimelineAssembler::render`] uses that
//! duration to place the beds and renders the final mix.

pub mod ffmpeg;
pub mod timeline;

use crate::config::MixConfig;
use crate::error::{AppError, AppResult};
use crate::script::Speaker;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

use ffmpeg::Ffmpeg;
use timeline::{BedPlacement, NarrationSpec};

/// A narration clip in script order.
#[derive(Debug, Clone, PartialEq)]
pub struct Clip {
    pub path: PathBuf,
    pub speaker: Speaker,
}

/// The rendered narration-only track and its measured length.
#[derive(Debug, Clone)]
pub struct Narration {
    pub path: PathBuf,
    pub duration_seconds: f64,
}

/// Produces a mixdown file from an ordered clip set. The output path holds
/// a complete file on success and is untouched on failure.
#[allow(async_fn_in_trait)]
pub trait MixdownRenderer {
    async fn assemble(&self, clips: &[Clip], output: &Path) -> AppResult<()>;
}

pub struct TimelineAssembler {
    ffmpeg: Ffmpeg,
    mix: MixConfig,
}

impl TimelineAssembler {
    pub fn new(mix: &MixConfig) -> Self {
        Self {
            ffmpeg: Ffmpeg::new(&mix.ffmpeg, &mix.ffprobe),
            mix: mix.clone(),
        }
    }

    fn narration_spec(&self, clip_count: usize) -> NarrationSpec {
        NarrationSpec {
            clip_count,
            gap_seconds: self.mix.gap_seconds,
            pan_bleed: self.mix.pan_bleed,
            sample_rate: self.mix.sample_rate,
            speed: self.mix.speed,
        }
    }

    /// Phase one: render narration only to `scratch` and measure it.
    pub async fn measure(&self, clips: &[Clip], scratch: &Path) -> AppResult<Narration> {
        validate_clips(clips)?;
        let graph = self.narration_spec(clips.len()).filter_graph()?;

        let mut args: Vec<OsString> = Vec::with_capacity(clips.len() * 2 + 6);
        for clip in clips {
            args.push("-i".into());
            args.push(clip.path.clone().into());
        }
        args.push(OsString::from("-filter_complex"));
        args.push(OsString::from(graph));
        args.push(OsString::from("-map"));
        args.push(OsString::from("[out]"));
        args.push(scratch.as_os_str().to_os_string());

        self.ffmpeg.run(args).await?;

        let duration_seconds = self.ffmpeg.probe_duration(scratch).await?;
        log::info!("Narration duration: {:.2}s", duration_seconds);

        Ok(Narration {
            path: scratch.to_path_buf(),
            duration_seconds,
        })
    }

    /// Phase two: place the beds around the measured narration, mix and
    /// loudness-normalize into `output`.
    pub async fn render(&self, narration: &Narration, output: &Path) -> AppResult<()> {
        for bed in [&self.mix.intro, &self.mix.outro] {
            if !bed.is_file() {
                return Err(AppError::Precondition(format!("bed asset missing: {:?}", bed)));
            }
        }

        let placement = BedPlacement::compute(
            narration.duration_seconds,
            self.mix.intro_solo_seconds,
            self.mix.outro_overlap_seconds,
        );
        log::info!(
            "Narration at {}ms, outro at {}ms",
            placement.narration_delay_ms,
            placement.outro_delay_ms
        );

        let partial = partial_path(output);
        let args: Vec<OsString> = vec![
            "-i".into(),
            self.mix.intro.clone().into(),
            "-i".into(),
            self.mix.outro.clone().into(),
            "-i".into(),
            narration.path.clone().into(),
            "-filter_complex".into(),
            placement.filter_graph(&self.mix.loudness).into(),
            "-map".into(),
            "[out]".into(),
            "-c:a".into(),
            "libmp3lame".into(),
            "-b:a".into(),
            self.mix.bitrate.clone().into(),
            partial.clone().into(),
        ];

        if let Err(e) = self.ffmpeg.run(args).await {
            remove_quietly(&partial);
            return Err(e);
        }

        std::fs::rename(&partial, output).map_err(|e| {
            remove_quietly(&partial);
            AppError::Io(format!("Failed to move mixdown into place: {}", e))
        })?;

        Ok(())
    }
}

impl MixdownRenderer for TimelineAssembler {
    async fn assemble(&self, clips: &[Clip], output: &Path) -> AppResult<()> {
        log::info!("Assembling {} clips into {:?}", clips.len(), output);

        let scratch = narration_scratch_path(output);
        let result = match self.measure(clips, &scratch).await {
            Ok(narration) => self.render(&narration, output).await,
            Err(e) => Err(e),
        };
        remove_quietly(&scratch);

        if result.is_ok() {
            log::info!("Mixdown written: {:?}", output);
        }
        result
    }
}

/// Every clip must exist and be non-empty before anything is rendered.
pub fn validate_clips(clips: &[Clip]) -> AppResult<()> {
    if clips.is_empty() {
        return Err(AppError::Precondition("no clips to assemble".to_string()));
    }
    for clip in clips {
        let len = std::fs::metadata(&clip.path)
            .map(|m| m.len())
            .map_err(|_| AppError::Precondition(format!("clip missing: {:?}", clip.path)))?;
        if len == 0 {
            return Err(AppError::Precondition(format!("clip is empty: {:?}", clip.path)));
        }
    }
    Ok(())
}

fn file_stem(output: &Path) -> String {
    output
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "mixdown".to_string())
}

fn narration_scratch_path(output: &Path) -> PathBuf {
    output.with_file_name(format!("{}_voices_temp.wav", file_stem(output)))
}

/// Same extension as the output so ffmpeg picks the same container.
fn partial_path(output: &Path) -> PathBuf {
    let ext = output
        .extension()
        .map(|e| e.to_string_lossy().to_string())
        .unwrap_or_else(|| "mp3".to_string());
    output.with_file_name(format!("{}.partial.{}", file_stem(output), ext))
}

fn remove_quietly(path: &Path) {
    if path.exists() {
        if let Err(e) = std::fs::remove_file(path) {
            log::warn!("Failed to remove {:?}: {}", path, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn clip(dir: &Path, name: &str, bytes: &[u8]) -> Clip {
        let path = dir.join(name);
        std::fs::write(&path, bytes).unwrap();
        Clip {
            path,
            speaker: Speaker::A,
        }
    }

    #[test]
    fn test_validate_rejects_missing_and_empty_clips() {
        let temp = TempDir::new().unwrap();
        let good = clip(temp.path(), "00000-a.wav", b"RIFF");
        let empty = clip(temp.path(), "00001-b.wav", b"");
        let missing = Clip {
            path: temp.path().join("00002-a.wav"),
            speaker: Speaker::A,
        };

        assert!(validate_clips(&[good.clone()]).is_ok());
        assert!(matches!(validate_clips(&[]), Err(AppError::Precondition(_))));
        assert!(matches!(
            validate_clips(&[good.clone(), empty]),
            Err(AppError::Precondition(_))
        ));
        assert!(matches!(
            validate_clips(&[good, missing]),
            Err(AppError::Precondition(_))
        ));
    }

    #[tokio::test]
    async fn test_missing_clip_fails_before_rendering() {
        let temp = TempDir::new().unwrap();
        let mix = MixConfig {
            ffmpeg: PathBuf::from("/nonexistent/ffmpeg"),
            ..MixConfig::default()
        };
        let assembler = TimelineAssembler::new(&mix);
        let output = temp.path().join("podcast.mp3");
        let clips = vec![Clip {
            path: temp.path().join("missing.wav"),
            speaker: Speaker::A,
        }];

        // A Render error would mean ffmpeg was attempted.
        let err = assembler.assemble(&clips, &output).await.unwrap_err();
        assert!(matches!(err, AppError::Precondition(_)), "{:?}", err);
        assert!(!output.exists());
    }

    #[tokio::test]
    async fn test_failed_render_leaves_no_mixdown() {
        let temp = TempDir::new().unwrap();
        let mix = MixConfig {
            ffmpeg: PathBuf::from("/nonexistent/ffmpeg"),
            ..MixConfig::default()
        };
        let assembler = TimelineAssembler::new(&mix);
        let output = temp.path().join("podcast.mp3");
        let clips = vec![clip(temp.path(), "00000-a.wav", b"RIFF")];

        let err = assembler.assemble(&clips, &output).await.unwrap_err();
        assert!(matches!(err, AppError::Render(_)), "{:?}", err);
        assert!(!output.exists());
        assert!(!narration_scratch_path(&output).exists());
        assert!(!partial_path(&output).exists());
    }

    #[test]
    fn test_scratch_paths_sit_next_to_output() {
        let output = Path::new("/data/p1/podcast.mp3");
        assert_eq!(
            narration_scratch_path(output),
            Path::new("/data/p1/podcast_voices_temp.wav")
        );
        assert_eq!(partial_path(output), Path::new("/data/p1/podcast.partial.mp3"));
    }
}
