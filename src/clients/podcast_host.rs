//! Episode publishing against the podcast host's HTTP API.

use crate::config::PublishConfig;
use crate::error::{AppError, AppResult};
use crate::item::Item;
use crate::store::ItemMetadata;
use crate::worker::publish::{PublishSession, Publisher};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use super::papers::collapse_whitespace;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(900);

pub struct HostPublisher {
    client: reqwest::Client,
    endpoint: String,
    token: String,
    config: PublishConfig,
}

/// An authenticated host session. Must be closed with
/// [`PublishSession::close`].
pub struct HostSession {
    client: reqwest::Client,
    endpoint: String,
    session_id: String,
    session_token: String,
    config: PublishConfig,
}

#[derive(Debug, Deserialize)]
struct SessionResponse {
    id: String,
    #[serde(default)]
    token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EpisodeResponse {
    #[serde(default)]
    published: bool,
    #[serde(default)]
    url: Option<String>,
}

impl HostPublisher {
    pub fn new(config: &PublishConfig, token: String) -> AppResult<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| AppError::Http(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            token,
            config: config.clone(),
        })
    }
}

impl Publisher for HostPublisher {
    type Session = HostSession;

    async fn open(&self) -> AppResult<HostSession> {
        let response = self
            .client
            .post(format!("{}/sessions", self.endpoint))
            .bearer_auth(&self.token)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(AppError::Collaborator(format!(
                "host login returned {}",
                response.status()
            )));
        }

        let session: SessionResponse = response.json().await?;
        log::info!("Opened publish session {}", session.id);

        Ok(HostSession {
            client: self.client.clone(),
            endpoint: self.endpoint.clone(),
            session_token: session.token.unwrap_or_else(|| self.token.clone()),
            session_id: session.id,
            config: self.config.clone(),
        })
    }
}

impl PublishSession for HostSession {
    async fn publish(&self, item: &Item, mixdown: &Path) -> AppResult<bool> {
        let metadata = item.metadata();
        let title = episode_title(metadata);
        let description =
            episode_description(metadata, &self.config.credit, self.config.max_synopsis_chars);

        let bytes = tokio::fs::read(mixdown)
            .await
            .map_err(|e| AppError::Precondition(format!("mixdown {:?}: {}", mixdown, e)))?;
        let file = reqwest::multipart::Part::bytes(bytes)
            .file_name(format!("{}.mp3", item.id()))
            .mime_str("audio/mpeg")?;
        let form = reqwest::multipart::Form::new()
            .text("title", title.clone())
            .text("description", description)
            .text("publish_now", "true")
            .part("file", file);

        log::info!("Uploading episode \"{}\"", title);
        let response = self
            .client
            .post(format!("{}/episodes", self.endpoint))
            .bearer_auth(&self.session_token)
            .header("X-Session-Id", &self.session_id)
            .multipart(form)
            .send()
            .await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Collaborator(format!("episode upload returned {}: {}", status, body)));
        }

        let episode: EpisodeResponse = response.json().await?;
        if let Some(url) = &episode.url {
            log::info!("Episode available at {}", url);
        }
        Ok(episode.published)
    }

    async fn close(self) -> AppResult<()> {
        let response = self
            .client
            .delete(format!("{}/sessions/{}", self.endpoint, self.session_id))
            .bearer_auth(&self.session_token)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(AppError::Collaborator(format!(
                "host logout returned {}",
                response.status()
            )));
        }
        log::info!("Closed publish session {}", self.session_id);
        Ok(())
    }
}

/// `"{title} - {date}"` on a single line.
pub fn episode_title(metadata: &ItemMetadata) -> String {
    collapse_whitespace(&format!("{} - {}", metadata.title, metadata.date))
}

pub fn episode_description(metadata: &ItemMetadata, credit: &str, max_synopsis_chars: usize) -> String {
    let mut parts = vec![format!("Discussion: {}", metadata.source_url)];

    if let Some(synopsis) = metadata.synopsis.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        parts.push(truncate_chars(synopsis, max_synopsis_chars));
    }
    if !credit.trim().is_empty() {
        parts.push(credit.trim().to_string());
    }

    parts.join("\n\n")
}

fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((cut, _)) => format!("{}...", text[..cut].trim_end()),
        None => text.to_string(),
    }
}
