//! Voice synthesis through a local Gradio TTS app.
//!
//! Flow per line: queue a call, read its event stream until it completes,
//! then download the produced file next to the clip and rename it in.

use crate::config::VoiceConfig;
use crate::error::{AppError, AppResult};
use crate::script::Speaker;
use crate::worker::synthesize::VoiceSynthesizer;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use tokio::sync::Mutex;

use super::download::download_to;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(600);

pub struct GradioVoice {
    client: reqwest::Client,
    base_url: String,
    config: VoiceConfig,
    /// Server-side paths of the uploaded reference voices.
    uploaded: Mutex<HashMap<Speaker, String>>,
}

#[derive(Debug, Deserialize)]
struct QueuedCall {
    event_id: String,
}

impl GradioVoice {
    pub fn new(config: &VoiceConfig) -> AppResult<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| AppError::Http(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self {
            client,
            base_url: config.endpoint.trim_end_matches('/').to_string(),
            config: config.clone(),
            uploaded: Mutex::new(HashMap::new()),
        })
    }

    fn reference_voice(&self, speaker: Speaker) -> &Path {
        match speaker {
            Speaker::A => &self.config.voice_a,
            Speaker::B => &self.config.voice_b,
        }
    }

    /// Upload the speaker's reference recording once and reuse its
    /// server path for every later line.
    async fn voice_path(&self, speaker: Speaker) -> AppResult<String> {
        let mut uploaded = self.uploaded.lock().await;
        if let Some(path) = uploaded.get(&speaker) {
            return Ok(path.clone());
        }

        let local = self.reference_voice(speaker);
        let bytes = tokio::fs::read(local)
            .await
            .map_err(|e| AppError::Precondition(format!("reference voice {:?}: {}", local, e)))?;
        let file_name = local
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| format!("voice_{}", speaker.tag()));

        let form = reqwest::multipart::Form::new()
            .part("files", reqwest::multipart::Part::bytes(bytes).file_name(file_name));

        let response = self
            .client
            .post(format!("{}/gradio_api/upload", self.base_url))
            .query(&[("upload_id", uuid::Uuid::new_v4().to_string())])
            .multipart(form)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(AppError::Collaborator(format!(
                "voice upload returned {}",
                response.status()
            )));
        }

        let paths: Vec<String> = response.json().await?;
        let path = paths
            .into_iter()
            .next()
            .ok_or_else(|| AppError::Collaborator("voice upload returned no path".to_string()))?;

        log::info!("Uploaded reference voice {:?} for speaker {}", local, speaker.tag());
        uploaded.insert(speaker, path.clone());
        Ok(path)
    }

    fn call_payload(&self, text: &str, voice_path: &str) -> Value {
        let c = &self.config;
        json!({
            "data": [
                text,
                { "path": voice_path, "meta": { "_type": "gradio.FileData" } },
                c.temperature,
                c.seed,
                c.min_p,
                c.top_p,
                c.top_k,
                c.repetition_penalty,
                c.norm_loudness,
            ]
        })
    }

    async fn generate(&self, text: &str, speaker: Speaker) -> AppResult<String> {
        let voice_path = self.voice_path(speaker).await?;
        let call_url = format!("{}/gradio_api/call/{}", self.base_url, self.config.api_name);

        let response = self
            .client
            .post(&call_url)
            .json(&self.call_payload(text, &voice_path))
            .send()
            .await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Collaborator(format!("TTS call returned {}: {}", status, body)));
        }
        let queued: QueuedCall = response.json().await?;
        log::debug!("TTS call queued as {}", queued.event_id);

        let events = self
            .client
            .get(format!("{}/{}", call_url, queued.event_id))
            .send()
            .await?
            .text()
            .await?;

        let data = completed_data(&events)?;
        file_url(&data, &self.base_url)
    }
}

impl VoiceSynthesizer for GradioVoice {
    async fn synthesize(&self, text: &str, speaker: Speaker, output: &Path) -> AppResult<()> {
        let url = self.generate(text, speaker).await?;
        download_to(&self.client, &url, output).await?;
        Ok(())
    }
}

/// Payload of the `complete` event in a Gradio event stream.
fn completed_data(stream: &str) -> AppResult<Value> {
    let mut event = "";
    for line in stream.lines() {
        if let Some(name) = line.strip_prefix("event:") {
            event = name.trim();
        } else if let Some(data) = line.strip_prefix("data:") {
            match event {
                "complete" => {
                    return serde_json::from_str(data.trim()).map_err(|e| {
                        AppError::Json(format!("Failed to parse TTS result: {}", e))
                    })
                }
                "error" => {
                    return Err(AppError::Collaborator(format!(
                        "TTS generation failed: {}",
                        data.trim()
                    )))
                }
                _ => {}
            }
        }
    }
    Err(AppError::Collaborator(
        "TTS event stream ended without a result".to_string(),
    ))
}

/// Download URL of the first output file.
fn file_url(data: &Value, base_url: &str) -> AppResult<String> {
    let file = data
        .get(0)
        .ok_or_else(|| AppError::Collaborator("TTS result has no output".to_string()))?;

    if let Some(url) = file.get("url").and_then(Value::as_str) {
        return Ok(url.to_string());
    }
    match file.get("path").and_then(Value::as_str) {
        Some(path) => Ok(format!("{}/gradio_api/file={}", base_url, path)),
        None => Err(AppError::Collaborator(format!("TTS output has no file: {}", file))),
    }
}
