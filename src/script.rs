//! Narration script: the speaker-tagged line list produced by the generator
//! and cached beside the item as JSON.

use crate::error::{AppError, AppResult};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Expression tags the voice model understands. Anything else in brackets
/// is stripped from generated text.
pub const EXPRESSION_TAGS: &[&str] = &[
    "[gasp]",
    "[chuckle]",
    "[laugh]",
    "[groan]",
    "[cough]",
    "[shush]",
    "[sigh]",
    "[clear throat]",
];

const SPEAKER_A_TAG: &str = "[S1]";
const SPEAKER_B_TAG: &str = "[S2]";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    A,
    B,
}

impl Speaker {
    pub fn tag(self) -> &'static str {
        match self {
            Self::A => "a",
            Self::B => "b",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NarrationLine {
    pub speaker: Speaker,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NarrationScript {
    pub lines: Vec<NarrationLine>,
}

impl NarrationScript {
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn load(path: &Path) -> AppResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read script {:?}: {}", path, e))?;
        let script: Self = serde_json::from_str(&content)
            .map_err(|e| AppError::Json(format!("Failed to parse script {:?}: {}", path, e)))?;
        if script.is_empty() {
            return Err(AppError::Precondition(format!("script {:?} has no lines", path)));
        }
        Ok(script)
    }

    /// Write via a temp file so a crash never leaves a truncated script that
    /// would later be honored as a checkpoint.
    pub fn save(&self, path: &Path) -> AppResult<()> {
        let content = serde_json::to_string_pretty(self)?;
        let tmp = path.with_extension("json.part");
        std::fs::write(&tmp, content)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }

    /// Parse generator output: one turn per line, `[S1]`/`[S2]` prefixes,
    /// unknown bracket tags removed.
    pub fn parse_generated(raw: &str) -> AppResult<Self> {
        let tag_re = Regex::new(r"\[[^\]]+\]").map_err(|e| e.to_string())?;

        let cleaned = tag_re.replace_all(raw, |caps: &regex::Captures| {
            let tag = &caps[0];
            if tag == SPEAKER_A_TAG || tag == SPEAKER_B_TAG || EXPRESSION_TAGS.contains(&tag) {
                tag.to_string()
            } else {
                String::new()
            }
        });

        let lines: Vec<NarrationLine> = cleaned
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .filter_map(|line| {
                let speaker = if line.starts_with(SPEAKER_A_TAG) {
                    Speaker::A
                } else {
                    Speaker::B
                };
                let text = line
                    .replacen(SPEAKER_A_TAG, "", 1)
                    .replacen(SPEAKER_B_TAG, "", 1)
                    .trim()
                    .to_string();
                if text.is_empty() {
                    None
                } else {
                    Some(NarrationLine { speaker, text })
                }
            })
            .collect();

        if lines.is_empty() {
            return Err(AppError::Precondition(
                "generator returned no narration lines".to_string(),
            ));
        }

        Ok(Self { lines })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_assigns_speakers_and_strips_prefixes() {
        let raw = "[S1] Welcome to the show.\n\n[S2] Thanks, glad to be here.\n[S1] Let's begin.";
        let script = NarrationScript::parse_generated(raw).unwrap();
        assert_eq!(script.len(), 3);
        assert_eq!(script.lines[0].speaker, Speaker::A);
        assert_eq!(script.lines[0].text, "Welcome to the show.");
        assert_eq!(script.lines[1].speaker, Speaker::B);
        assert_eq!(script.lines[1].text, "Thanks, glad to be here.");
        assert_eq!(script.lines[2].speaker, Speaker::A);
    }

    #[test]
    fn test_parse_keeps_known_tags_and_drops_unknown() {
        let raw = "[S2] That is [laugh] wild [sniff] and [citation 3] true [clear throat].";
        let script = NarrationScript::parse_generated(raw).unwrap();
        assert_eq!(
            script.lines[0].text,
            "That is [laugh] wild  and  true [clear throat]."
        );
    }

    #[test]
    fn test_parse_untagged_line_goes_to_speaker_b() {
        let script = NarrationScript::parse_generated("no prefix here").unwrap();
        assert_eq!(script.lines[0].speaker, Speaker::B);
    }

    #[test]
    fn test_parse_drops_tag_only_lines() {
        let script = NarrationScript::parse_generated("[S1]\n[S2] [source]\n[S1] Hi").unwrap();
        assert_eq!(script.len(), 1);
        assert_eq!(script.lines[0].text, "Hi");
    }

    #[test]
    fn test_parse_empty_output_is_an_error() {
        assert!(matches!(
            NarrationScript::parse_generated("\n  \n[foo]"),
            Err(AppError::Precondition(_))
        ));
    }

    #[test]
    fn test_save_then_load_uses_lowercase_speakers() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("script.json");
        let script = NarrationScript::parse_generated("[S1] one\n[S2] two").unwrap();
        script.save(&path).unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.contains("\"speaker\": \"a\""));
        assert!(!temp.path().join("script.json.part").exists());
        assert_eq!(NarrationScript::load(&path).unwrap(), script);
    }
}
