//! RSS/Atom feed as a document source. Entries need a PDF link.

use crate::error::{AppError, AppResult};
use crate::store::ItemMetadata;
use crate::worker::acquire::DocumentSource;
use chrono::{NaiveDate, Utc};
use feed_rs::model::{Entry, Link};
use std::path::Path;

use super::download::{download_to, http_client};
use super::papers::collapse_whitespace;

pub struct FeedSource {
    client: reqwest::Client,
    url: String,
}

impl FeedSource {
    pub fn new(url: &str) -> AppResult<Self> {
        Ok(Self {
            client: http_client()?,
            url: url.to_string(),
        })
    }
}

impl DocumentSource for FeedSource {
    async fn list_documents(&self, date: Option<NaiveDate>) -> AppResult<Vec<ItemMetadata>> {
        log::info!("Fetching feed from: {}", self.url);

        let response = self.client.get(&self.url).send().await?;
        if !response.status().is_success() {
            return Err(AppError::Http(format!("feed returned {}", response.status())));
        }
        let body = response.bytes().await?;

        parse_feed(&body, date)
    }

    async fn fetch_document(&self, url: &str, dest: &Path) -> AppResult<u64> {
        download_to(&self.client, url, dest).await
    }
}

pub fn parse_feed(body: &[u8], date: Option<NaiveDate>) -> AppResult<Vec<ItemMetadata>> {
    let feed = feed_rs::parser::parse(body)
        .map_err(|e| AppError::Collaborator(format!("Failed to parse feed: {}", e)))?;
    log::info!("Parsed {} entries from feed", feed.entries.len());

    let fallback_date = date.unwrap_or_else(|| Utc::now().date_naive());
    Ok(feed
        .entries
        .into_iter()
        .filter_map(|entry| entry_to_item(entry, fallback_date))
        .filter(|item| date.map_or(true, |d| item.date == d))
        .collect())
}

fn entry_to_item(entry: Entry, fallback_date: NaiveDate) -> Option<ItemMetadata> {
    let id = entry
        .id
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .map(str::trim)
        .filter(|s| !s.is_empty())?
        .to_string();

    let document_url = match entry.links.iter().find(|l| is_pdf_link(l)) {
        Some(link) => link.href.clone(),
        None => {
            log::debug!("Skipping feed entry {} without a PDF link", id);
            return None;
        }
    };

    let source_url = entry
        .links
        .iter()
        .find(|l| !is_pdf_link(l))
        .map(|l| l.href.clone())
        .unwrap_or_else(|| entry.id.clone());

    let title = entry
        .title
        .map(|t| collapse_whitespace(&t.content))
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| id.clone());

    Some(ItemMetadata {
        date: entry
            .published
            .or(entry.updated)
            .map(|d| d.date_naive())
            .unwrap_or(fallback_date),
        title,
        source_url,
        document_url,
        synopsis: entry
            .summary
            .map(|s| s.content.trim().to_string())
            .filter(|s| !s.is_empty()),
        id,
    })
}

fn is_pdf_link(link: &Link) -> bool {
    link.media_type.as_deref() == Some("application/pdf")
        || link.href.to_ascii_lowercase().ends_with(".pdf")
        || link.href.contains("/pdf/")
}
