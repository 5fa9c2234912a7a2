//! YAML configuration. Every field has a default so a missing file still
//! yields a runnable setup; secrets are read from the environment or `.env`.

use crate::error::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const CONFIG_FILE: &str = "config.yaml";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub data_dir: PathBuf,
    /// Keep per-line clips after a successful mixdown.
    pub keep_audio: bool,
    pub source: SourceConfig,
    pub narration: NarrationConfig,
    pub voice: VoiceConfig,
    pub mix: MixConfig,
    pub publish: PublishConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            keep_audio: false,
            source: SourceConfig::default(),
            narration: NarrationConfig::default(),
            voice: VoiceConfig::default(),
            mix: MixConfig::default(),
            publish: PublishConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    DailyPapers,
    Feed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub kind: SourceKind,
    pub url: String,
    /// Base for item discussion pages, `{site_url}/papers/{id}`.
    pub site_url: String,
    /// Base for documents, `{document_base_url}/{id}`.
    pub document_base_url: String,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            kind: SourceKind::DailyPapers,
            url: "https://huggingface.co/api/daily_papers".to_string(),
            site_url: "https://huggingface.co".to_string(),
            document_base_url: "https://arxiv.org/pdf".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NarrationConfig {
    pub endpoint: String,
    pub model: String,
    pub api_key_env: String,
    pub show_name: String,
    /// Host names for speaker A and speaker B.
    pub hosts: [String; 2],
    pub target_minutes: u32,
}

impl Default for NarrationConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            model: "gemini-3-pro-preview".to_string(),
            api_key_env: "GEMINI_API_KEY".to_string(),
            show_name: "Daily Hugging Face Papers".to_string(),
            hosts: ["Stefan".to_string(), "Radu".to_string()],
            target_minutes: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VoiceConfig {
    pub endpoint: String,
    pub api_name: String,
    /// Reference recordings for speaker A and speaker B.
    pub voice_a: PathBuf,
    pub voice_b: PathBuf,
    pub temperature: f64,
    pub seed: i64,
    pub min_p: f64,
    pub top_p: f64,
    pub top_k: u32,
    pub repetition_penalty: f64,
    pub norm_loudness: bool,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:13377".to_string(),
            api_name: "generate".to_string(),
            voice_a: PathBuf::from("assets/voices/speaker_a.mp3"),
            voice_b: PathBuf::from("assets/voices/speaker_b.flac"),
            temperature: 0.9,
            seed: 24,
            min_p: 0.0,
            top_p: 0.95,
            top_k: 1000,
            repetition_penalty: 1.2,
            norm_loudness: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MixConfig {
    pub ffmpeg: PathBuf,
    pub ffprobe: PathBuf,
    pub intro: PathBuf,
    pub outro: PathBuf,
    pub gap_seconds: f64,
    pub speed: f64,
    /// Seconds the intro bed plays before narration starts.
    pub intro_solo_seconds: f64,
    /// Seconds the outro bed overlaps the end of the narration.
    pub outro_overlap_seconds: f64,
    pub pan_bleed: f64,
    pub sample_rate: u32,
    pub loudness: LoudnessTarget,
    pub bitrate: String,
}

impl Default for MixConfig {
    fn default() -> Self {
        Self {
            ffmpeg: PathBuf::from("ffmpeg"),
            ffprobe: PathBuf::from("ffprobe"),
            intro: PathBuf::from("assets/jingles/intro.wav"),
            outro: PathBuf::from("assets/jingles/outro.wav"),
            gap_seconds: 0.5,
            speed: 1.25,
            intro_solo_seconds: 10.0,
            outro_overlap_seconds: 7.0,
            pan_bleed: 0.85,
            sample_rate: 44100,
            loudness: LoudnessTarget::default(),
            bitrate: "320k".to_string(),
        }
    }
}

/// EBU R128 targets for the final loudness pass.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct LoudnessTarget {
    pub integrated: f64,
    pub true_peak: f64,
    pub range: f64,
}

impl Default for LoudnessTarget {
    fn default() -> Self {
        Self {
            integrated: -16.0,
            true_peak: -1.5,
            range: 11.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PublishConfig {
    pub endpoint: String,
    pub token_env: String,
    pub credit: String,
    pub max_synopsis_chars: usize,
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:8080/api".to_string(),
            token_env: "PODCAST_HOST_TOKEN".to_string(),
            credit: "Music: Deep Blue - Synths & Percussion Version by Ben Fox".to_string(),
            max_synopsis_chars: 3500,
        }
    }
}

impl Config {
    /// Load from `explicit`, else `./config.yaml`, else the user config dir,
    /// else defaults.
    pub fn load(explicit: Option<&Path>) -> AppResult<Self> {
        if let Some(path) = explicit {
            return Self::from_file(path);
        }

        let candidates = [
            Some(PathBuf::from(CONFIG_FILE)),
            dirs::config_dir().map(|d| d.join("papercast").join(CONFIG_FILE)),
        ];
        for path in candidates.into_iter().flatten() {
            if path.exists() {
                return Self::from_file(&path);
            }
        }

        log::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    pub fn from_file(path: &Path) -> AppResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| AppError::Config(format!("Failed to read {:?}: {}", path, e)))?;
        let config: Config = serde_yaml::from_str(&content)?;
        log::info!("Loaded config from {:?}", path);
        Ok(config)
    }

    /// Resolve a secret from the named environment variable, falling back to
    /// `.env` next to the data dir or in the working directory.
    pub fn secret(&self, var: &str) -> Option<String> {
        if let Ok(value) = std::env::var(var) {
            if !value.trim().is_empty() {
                return Some(value.trim().to_string());
            }
        }
        let parent = self
            .data_dir
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or(Path::new("."));
        load_env_value(parent, var).or_else(|| load_env_value(Path::new("."), var))
    }
}

/// Load a value from the .env file by key name
pub fn load_env_value(dir: &Path, key: &str) -> Option<String> {
    let env_path = dir.join(".env");
    let prefix = format!("{}=", key);
    if let Ok(content) = std::fs::read_to_string(&env_path) {
        for line in content.lines() {
            let trimmed = line.trim();
            if let Some(rest) = trimmed.strip_prefix(&prefix) {
                let value = rest.trim().trim_matches('"').trim_matches('\'');
                if !value.is_empty() {
                    return Some(value.to_string());
                }
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let yaml = "data_dir: /srv/cast\nmix:\n  speed: 1.5\n";
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/srv/cast"));
        assert_eq!(config.mix.speed, 1.5);
        assert_eq!(config.mix.gap_seconds, 0.5);
        assert_eq!(config.mix.loudness.integrated, -16.0);
        assert_eq!(config.source.kind, SourceKind::DailyPapers);
        assert!(!config.keep_audio);
    }

    #[test]
    fn test_source_kind_parses_snake_case() {
        let config: Config = serde_yaml::from_str("source:\n  kind: feed\n  url: http://x/rss\n").unwrap();
        assert_eq!(config.source.kind, SourceKind::Feed);
        assert_eq!(config.source.url, "http://x/rss");
    }

    #[test]
    fn test_load_env_value_strips_quotes() {
        let temp = tempfile::TempDir::new().unwrap();
        std::fs::write(
            temp.path().join(".env"),
            "OTHER=1\nPAPERCAST_TEST_KEY=\"abc123\"\n",
        )
        .unwrap();
        assert_eq!(
            load_env_value(temp.path(), "PAPERCAST_TEST_KEY"),
            Some("abc123".to_string())
        );
        assert_eq!(load_env_value(temp.path(), "MISSING"), None);
    }
}
