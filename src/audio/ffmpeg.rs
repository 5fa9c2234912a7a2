use crate::error::{AppError, AppResult};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;

/// Lines of ffmpeg stderr kept in a render error.
const STDERR_TAIL_LINES: usize = 12;

/// Thin wrapper around the ffmpeg/ffprobe binaries.
#[derive(Debug, Clone)]
pub struct Ffmpeg {
    ffmpeg: PathBuf,
    ffprobe: PathBuf,
}

impl Ffmpeg {
    pub fn new(ffmpeg: &Path, ffprobe: &Path) -> Self {
        Self {
            ffmpeg: ffmpeg.to_path_buf(),
            ffprobe: ffprobe.to_path_buf(),
        }
    }

    /// Run ffmpeg to completion. A non-zero exit is a render error carrying
    /// the tail of stderr.
    pub async fn run(&self, args: Vec<OsString>) -> AppResult<()> {
        log::debug!("Running {:?} {:?}", self.ffmpeg, args);

        let output = Command::new(&self.ffmpeg)
            .args(["-hide_banner", "-nostdin", "-loglevel", "error", "-y"])
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| AppError::Render(format!("Failed to spawn {:?}: {}", self.ffmpeg, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let tail: Vec<&str> = stderr.lines().rev().take(STDERR_TAIL_LINES).collect();
            let tail: Vec<&str> = tail.into_iter().rev().collect();
            log::error!("ffmpeg stderr: {}", stderr);
            return Err(AppError::Render(format!(
                "ffmpeg exited with {}: {}",
                output.status,
                tail.join(" | ")
            )));
        }

        Ok(())
    }

    /// Container duration in seconds.
    pub async fn probe_duration(&self, path: &Path) -> AppResult<f64> {
        let output = Command::new(&self.ffprobe)
            .args([
                "-v",
                "error",
                "-show_entries",
                "format=duration",
                "-of",
                "csv=p=0",
            ])
            .arg(path)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| AppError::Render(format!("Failed to spawn {:?}: {}", self.ffprobe, e)))?;

        if !output.status.success() {
            return Err(AppError::Render(format!(
                "ffprobe failed on {:?}: {}",
                path,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        parse_duration(&String::from_utf8_lossy(&output.stdout))
            .ok_or_else(|| AppError::Precondition(format!("ffprobe reported no duration for {:?}", path)))
    }
}

fn parse_duration(stdout: &str) -> Option<f64> {
    stdout
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .and_then(|line| line.parse::<f64>().ok())
        .filter(|d| d.is_finite() && *d >= 0.0)
}
