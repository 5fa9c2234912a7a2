//! Daily papers listing (JSON API) as a document source.

use crate::config::SourceConfig;
use crate::error::{AppError, AppResult};
use crate::store::ItemMetadata;
use crate::worker::acquire::DocumentSource;
use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use std::path::Path;

use super::download::{download_to, http_client};

pub struct DailyPapersClient {
    client: reqwest::Client,
    url: String,
    site_url: String,
    document_base_url: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DailyEntry {
    paper: PaperEntry,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    published_at: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PaperEntry {
    id: String,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    published_at: Option<String>,
}

impl DailyPapersClient {
    pub fn new(config: &SourceConfig) -> AppResult<Self> {
        Ok(Self {
            client: http_client()?,
            url: config.url.trim_end_matches('/').to_string(),
            site_url: config.site_url.trim_end_matches('/').to_string(),
            document_base_url: config.document_base_url.trim_end_matches('/').to_string(),
        })
    }
}

impl DocumentSource for DailyPapersClient {
    async fn list_documents(&self, date: Option<NaiveDate>) -> AppResult<Vec<ItemMetadata>> {
        let mut request = self.client.get(&self.url);
        if let Some(date) = date {
            request = request.query(&[("date", date.format("%Y-%m-%d").to_string())]);
        }

        log::info!("Getting papers for {}", date.map_or("today".to_string(), |d| d.to_string()));
        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(AppError::Http(format!(
                "daily papers listing returned {}",
                response.status()
            )));
        }

        let body = response.text().await?;
        parse_daily_papers(&body, date, &self.site_url, &self.document_base_url)
    }

    async fn fetch_document(&self, url: &str, dest: &Path) -> AppResult<u64> {
        download_to(&self.client, url, dest).await
    }
}

/// Map the listing body to item metadata. Entries without a usable id are
/// skipped.
pub fn parse_daily_papers(
    body: &str,
    date: Option<NaiveDate>,
    site_url: &str,
    document_base_url: &str,
) -> AppResult<Vec<ItemMetadata>> {
    let entries: Vec<DailyEntry> = serde_json::from_str(body)
        .map_err(|e| AppError::Json(format!("Failed to parse daily papers listing: {}", e)))?;

    let today = Utc::now().date_naive();
    let mut items = Vec::with_capacity(entries.len());

    for entry in entries {
        let id = entry.paper.id.trim().to_string();
        if id.is_empty() {
            continue;
        }

        let title = entry
            .paper
            .title
            .as_deref()
            .or(entry.title.as_deref())
            .map(collapse_whitespace)
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| id.clone());

        let item_date = date
            .or_else(|| entry.published_at.as_deref().and_then(parse_date))
            .or_else(|| entry.paper.published_at.as_deref().and_then(parse_date))
            .unwrap_or(today);

        let synopsis = entry
            .paper
            .summary
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());

        items.push(ItemMetadata {
            source_url: format!("{}/papers/{}", site_url, id),
            document_url: format!("{}/{}", document_base_url, id),
            id,
            date: item_date,
            title,
            synopsis,
        });
    }

    Ok(items)
}

pub(crate) fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn parse_date(s: &str) -> Option<NaiveDate> {
    DateTime::parse_from_rfc3339(s)
        .map(|d| d.date_naive())
        .ok()
        .or_else(|| NaiveDate::parse_from_str(s.get(..10)?, "%Y-%m-%d").ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    const LISTING: &str = r#"[
        {
            "paper": {
                "id": "2503.01234",
                "title": "Scaling\n  Things   Up",
                "summary": "  We scale things.  ",
                "publishedAt": "2025-03-12T17:59:01.000Z"
            },
            "publishedAt": "2025-03-14T02:11:00.000Z",
            "title": "ignored"
        },
        {
            "paper": { "id": "2503.05678" },
            "title": "Fallback title"
        },
        {
            "paper": { "id": "  " }
        }
    ]"#;

    #[test]
    fn test_parse_listing() {
        let items = parse_daily_papers(LISTING, None, "https://hf.co", "https://arxiv.org/pdf").unwrap();
        assert_eq!(items.len(), 2);

        let first = &items[0];
        assert_eq!(first.id, "2503.01234");
        assert_eq!(first.title, "Scaling Things Up");
        assert_eq!(first.date, NaiveDate::from_ymd_opt(2025, 3, 14).unwrap());
        assert_eq!(first.source_url, "https://hf.co/papers/2503.01234");
        assert_eq!(first.document_url, "https://arxiv.org/pdf/2503.01234");
        assert_eq!(first.synopsis.as_deref(), Some("We scale things."));

        assert_eq!(items[1].title, "Fallback title");
        assert_eq!(items[1].synopsis, None);
    }

    #[test]
    fn test_requested_date_wins() {
        let date = NaiveDate::from_ymd_opt(2025, 1, 7).unwrap();
        let items = parse_daily_papers(LISTING, Some(date), "s", "d").unwrap();
        assert!(items.iter().all(|i| i.date == date));
    }

    #[test]
    fn test_malformed_listing_is_json_error() {
        let result = parse_daily_papers("<html>", None, "s", "d");
        assert!(matches!(result, Err(AppError::Json(_))));
    }
}
