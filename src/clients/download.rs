use crate::error::{AppError, AppResult};
use futures_util::StreamExt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;

const ATTEMPTS: usize = 3;
const BACKOFF_SECS: [u64; 2] = [2, 8];

/// Shared client for document and clip downloads.
pub fn http_client() -> AppResult<reqwest::Client> {
    reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(30))
        .timeout(Duration::from_secs(600))
        .build()
        .map_err(|e| AppError::Http(format!("Failed to create HTTP client: {}", e)))
}

/// Stream `url` into `dest` with retries. The body lands in a `.part`
/// sibling first, so `dest` only ever appears complete.
pub async fn download_to(client: &reqwest::Client, url: &str, dest: &Path) -> AppResult<u64> {
    let partial = part_path(dest);

    for attempt in 0..ATTEMPTS {
        match try_download(client, url, &partial).await {
            Ok(size) => {
                tokio::fs::rename(&partial, dest).await.map_err(|e| {
                    AppError::Io(format!("Failed to move download into place: {}", e))
                })?;
                return Ok(size);
            }
            Err(e) => {
                let _ = tokio::fs::remove_file(&partial).await;

                match BACKOFF_SECS.get(attempt) {
                    Some(&delay) if attempt + 1 < ATTEMPTS => {
                        log::warn!(
                            "Download attempt {} failed, retrying in {}s: {}",
                            attempt + 1,
                            delay,
                            e
                        );
                        tokio::time::sleep(Duration::from_secs(delay)).await;
                    }
                    _ => {
                        return Err(AppError::Http(format!(
                            "Download failed after {} attempts: {}",
                            ATTEMPTS, e
                        )))
                    }
                }
            }
        }
    }

    Err(AppError::Http(format!("Download of {} never attempted", url)))
}

/// Single download attempt with streaming and validation
async fn try_download(client: &reqwest::Client, url: &str, file_path: &Path) -> Result<u64, String> {
    log::debug!("Downloading {} to {:?}", url, file_path);

    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| format!("Failed to start download: {}", e))?;

    if !response.status().is_success() {
        return Err(format!("Download failed with status: {}", response.status()));
    }

    let content_length = response.content_length();
    let mut stream = response.bytes_stream();
    let mut file = tokio::fs::File::create(file_path)
        .await
        .map_err(|e| format!("Failed to create file: {}", e))?;
    let mut downloaded: u64 = 0;

    while let Some(chunk_result) = stream.next().await {
        let chunk = chunk_result.map_err(|e| format!("Error reading download stream: {}", e))?;
        file.write_all(&chunk)
            .await
            .map_err(|e| format!("Failed to write chunk: {}", e))?;
        downloaded += chunk.len() as u64;
    }

    file.flush()
        .await
        .map_err(|e| format!("Failed to flush file: {}", e))?;

    if let Some(expected) = content_length {
        if downloaded != expected {
            return Err(format!(
                "Download incomplete: got {} bytes, expected {}",
                downloaded, expected
            ));
        }
    }

    if downloaded == 0 {
        return Err("Download returned an empty body".to_string());
    }

    Ok(downloaded)
}

/// `document.pdf` -> `document.pdf.part`
pub fn part_path(dest: &Path) -> PathBuf {
    let mut name = dest.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".part");
    dest.with_file_name(name)
}
