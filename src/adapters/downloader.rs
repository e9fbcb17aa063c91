//! HTTP download with resume support.
//!
//! A partial file left by a previous attempt is continued with a
//! `Range: bytes=N-` request. A `206` answer is appended, a `200` answer
//! replaces the file, and a `416` restarts from scratch.

use std::path::Path;

use async_trait::async_trait;
use reqwest::header::{RANGE, REFERER};
use reqwest::StatusCode;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

use super::{CollaboratorError, DownloadOutcome, ResumableDownloader};

/// Resumable downloader over a shared HTTP client
pub struct HttpDownloader {
    client: reqwest::Client,
    referer: String,
}

impl HttpDownloader {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            referer: "https://www.bilibili.com".to_string(),
        }
    }
}

#[async_trait]
impl ResumableDownloader for HttpDownloader {
    async fn fetch(&self, url: &str, dest: &Path) -> Result<DownloadOutcome, CollaboratorError> {
        let mut resume_from = match fs::metadata(dest).await {
            Ok(meta) => meta.len(),
            Err(_) => 0,
        };

        loop {
            let mut request = self.client.get(url).header(REFERER, &self.referer);
            if resume_from > 0 {
                info!(bytes = resume_from, dest = %dest.display(), "Resuming download");
                request = request.header(RANGE, format!("bytes={}-", resume_from));
            }

            let mut response = request.send().await?;
            let status = response.status();

            let mut file = match status {
                StatusCode::PARTIAL_CONTENT => OpenOptions::new().append(true).open(dest).await?,
                StatusCode::OK => {
                    resume_from = 0;
                    fs::File::create(dest).await?
                }
                StatusCode::RANGE_NOT_SATISFIABLE if resume_from > 0 => {
                    warn!(dest = %dest.display(), "Resume point rejected, restarting download");
                    fs::remove_file(dest).await?;
                    resume_from = 0;
                    continue;
                }
                other => {
                    return Ok(DownloadOutcome::Failed {
                        reason: format!("unexpected status {}", other),
                    })
                }
            };

            let mut written = 0u64;
            while let Some(chunk) = response.chunk().await? {
                file.write_all(&chunk).await?;
                written += chunk.len() as u64;
            }
            file.flush().await?;

            info!(bytes = written + resume_from, dest = %dest.display(), "Download complete");
            return Ok(DownloadOutcome::Completed {
                bytes: written + resume_from,
                resumed: resume_from > 0,
            });
        }
    }
}
