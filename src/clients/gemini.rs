//! Gemini integration for narration scripts
//!
//! Sends the source PDF inline to the `generateContent` REST endpoint and
//! parses the reply into a two-speaker script.

use crate::config::NarrationConfig;
use crate::error::{AppError, AppResult};
use crate::item::Item;
use crate::script::{NarrationScript, Speaker, EXPRESSION_TAGS};
use crate::worker::synthesize::ScriptWriter;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Generation with tools enabled on a long PDF can take several minutes.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(900);

pub struct GeminiClient {
    client: reqwest::Client,
    config: NarrationConfig,
    api_key: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    system_instruction: Content,
    contents: Vec<Content>,
    tools: Vec<serde_json::Value>,
}

#[derive(Debug, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    inline_data: Option<InlineData>,
    /// Set on the model's internal reasoning parts.
    #[serde(default, skip_serializing)]
    thought: Option<bool>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    prompt_feedback: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Content,
    #[serde(default)]
    finish_reason: Option<String>,
}

impl GeminiClient {
    pub fn new(config: &NarrationConfig, api_key: String) -> AppResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| AppError::Http(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self {
            client,
            config: config.clone(),
            api_key,
        })
    }

    /// Raw text of the generated dialogue.
    pub async fn generate(&self, document: &Path, opener: Speaker) -> AppResult<String> {
        let bytes = tokio::fs::read(document)
            .await
            .map_err(|e| AppError::Io(format!("Failed to read {:?}: {}", document, e)))?;

        let request = GenerateRequest {
            system_instruction: Content {
                role: None,
                parts: vec![Part {
                    text: Some(system_instruction(&self.config, opener)),
                    ..Default::default()
                }],
            },
            contents: vec![Content {
                role: Some("user".to_string()),
                parts: vec![Part {
                    inline_data: Some(InlineData {
                        mime_type: "application/pdf".to_string(),
                        data: base64::engine::general_purpose::STANDARD.encode(&bytes),
                    }),
                    ..Default::default()
                }],
            }],
            tools: vec![
                serde_json::json!({ "codeExecution": {} }),
                serde_json::json!({ "googleSearch": {} }),
                serde_json::json!({ "urlContext": {} }),
            ],
        };

        let url = format!(
            "{}/models/{}:generateContent",
            self.config.endpoint.trim_end_matches('/'),
            self.config.model
        );

        log::info!(
            "Sending request to Gemini: model={}, document_bytes={}",
            self.config.model,
            bytes.len()
        );

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| AppError::Http(format!("Failed to call Gemini: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Collaborator(format!("Gemini returned {}: {}", status, body)));
        }

        let result: GenerateResponse = response
            .json()
            .await
            .map_err(|e| AppError::Json(format!("Failed to parse Gemini response: {}", e)))?;

        let text = response_text(result)?;
        log::info!("Gemini response received: {} chars", text.len());
        Ok(text)
    }
}

impl ScriptWriter for GeminiClient {
    async fn write_script(&self, item: &Item, document: &Path) -> AppResult<NarrationScript> {
        let raw = self.generate(document, opening_speaker(item.id())).await?;
        NarrationScript::parse_generated(&raw)
    }
}

/// Alternates the opening host between items, stable for a given id.
pub fn opening_speaker(id: &str) -> Speaker {
    let sum: u32 = id.bytes().map(u32::from).sum();
    if sum % 2 == 0 {
        Speaker::A
    } else {
        Speaker::B
    }
}

fn speaker_tag(speaker: Speaker) -> &'static str {
    match speaker {
        Speaker::A => "[S1]",
        Speaker::B => "[S2]",
    }
}

pub fn system_instruction(config: &NarrationConfig, opener: Speaker) -> String {
    let tags: Vec<String> = EXPRESSION_TAGS.iter().map(|t| format!("  - {}", t)).collect();
    format!(
        r#"Create a podcast between 2 speakers: [S1][S2]

Each speaker:
- will have its turn in a new line
- can use the following tags where appropriate (and no others) to convey emotion:
{tags}

The podcast:
- should aim for around {minutes} minutes runtime
- be professional, engaging, informative, and with a touch of humor

Structure:
1. introduce the abstract
  - introduce the hosts. [S1] is {host_a}, [S2] is {host_b}
  - name of the show is {show}
  - {opener} starts the podcast
2. talk about the need
3. talk about how the paper solves that need
4. go in depth on the methodology
5. talk about findings and limitations
6. outro

Important rules:
- Use plain ASCII
- Use "..." to denote a small pause in speech
- Do not use LaTeX or math notation like $x$ or $z_{{t+1}}$. Write math in plain text (e.g. "z sub t plus 1")

Output format:
- each line is a single speaker's turn
- the line starts with [S1] or [S2] to indicate the speaker, then continues with their text"#,
        tags = tags.join("\n"),
        minutes = config.target_minutes,
        host_a = config.hosts[0],
        host_b = config.hosts[1],
        show = config.show_name,
        opener = speaker_tag(opener),
    )
}

/// Concatenated text parts of the first candidate, skipping thoughts.
fn response_text(response: GenerateResponse) -> AppResult<String> {
    let candidate = response.candidates.into_iter().next().ok_or_else(|| {
        AppError::Collaborator(format!(
            "Gemini returned no candidates (feedback: {})",
            response
                .prompt_feedback
                .map(|f| f.to_string())
                .unwrap_or_else(|| "none".to_string())
        ))
    })?;

    let text: String = candidate
        .content
        .parts
        .into_iter()
        .filter(|p| p.thought != Some(true))
        .filter_map(|p| p.text)
        .collect::<Vec<_>>()
        .join("");

    if text.trim().is_empty() {
        return Err(AppError::Collaborator(format!(
            "Gemini returned no text (finish reason: {})",
            candidate.finish_reason.unwrap_or_else(|| "unknown".to_string())
        )));
    }
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opening_speaker_is_stable_and_alternates() {
        assert_eq!(opening_speaker("2503.01234"), opening_speaker("2503.01234"));
        // Ids one byte apart open with different hosts
        assert_ne!(opening_speaker("2503.01234"), opening_speaker("2503.01235"));
    }

    #[test]
    fn test_system_instruction_names_hosts_and_tags() {
        let config = NarrationConfig::default();
        let text = system_instruction(&config, Speaker::B);
        assert!(text.contains("[S1] is Stefan, [S2] is Radu"));
        assert!(text.contains("[S2] starts the podcast"));
        assert!(text.contains("  - [clear throat]"));
        assert!(text.contains("around 30 minutes"));
        assert!(text.contains("z_{t+1}"));
    }

    #[test]
    fn test_response_text_skips_thoughts() {
        let json = r#"{
            "candidates": [{
                "content": { "role": "model", "parts": [
                    { "text": "planning...", "thought": true },
                    { "text": "[S1] Hello\n" },
                    { "text": "[S2] Hi" }
                ]},
                "finishReason": "STOP"
            }]
        }"#;
        let response: GenerateResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response_text(response).unwrap(), "[S1] Hello\n[S2] Hi");
    }

    #[test]
    fn test_blocked_response_is_collaborator_error() {
        let json = r#"{ "promptFeedback": { "blockReason": "SAFETY" } }"#;
        let response: GenerateResponse = serde_json::from_str(json).unwrap();
        let err = response_text(response).unwrap_err();
        assert!(matches!(err, AppError::Collaborator(ref m) if m.contains("SAFETY")));
    }

    #[test]
    fn test_request_serializes_inline_pdf() {
        let part = Part {
            inline_data: Some(InlineData {
                mime_type: "application/pdf".to_string(),
                data: "JVBERg==".to_string(),
            }),
            ..Default::default()
        };
        let value = serde_json::to_value(&part).unwrap();
        assert_eq!(value["inlineData"]["mimeType"], "application/pdf");
        assert!(value.get("text").is_none());
        assert!(value.get("thought").is_none());
    }
}
