//! reqwestによるScanApi実装

use super::{asset_url, guess_mime, ScanApi};
use crate::config::Config;
use crate::error::{Result, ScanError};
use async_trait::async_trait;
use card_scan_common::{parse_progress, parse_record, parse_records, JobId, ProgressSnapshot, ScanJob};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Response, StatusCode};
use std::path::Path;
use tracing::debug;

/// 表示するエラーボディの最大長
const ERROR_BODY_LIMIT: usize = 300;

#[derive(Clone)]
pub struct HttpScanApi {
    client: Client,
    base_url: String,
    list_limit: u32,
}

impl HttpScanApi {
    pub fn new(config: &Config) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            list_limit: config.list_limit,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// 静的ファイルのURL
    pub fn asset_url(&self, path: &str) -> String {
        asset_url(&self.base_url, path)
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn upload(&self, image: &Path) -> Result<ScanJob> {
        if !image.exists() {
            return Err(ScanError::FileNotFound(image.display().to_string()));
        }
        let bytes = tokio::fs::read(image).await?;
        let file_name = image
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "upload".to_string());

        let part = Part::bytes(bytes)
            .file_name(file_name)
            .mime_str(guess_mime(image))?;
        let form = Form::new().part("file", part);

        let response = self
            .client
            .post(self.endpoint("/api/scan"))
            .multipart(form)
            .send()
            .await?;
        let body = read_body(response).await?;
        Ok(parse_record(&body)?)
    }
}

#[async_trait]
impl ScanApi for HttpScanApi {
    async fn submit(&self, image: &Path) -> Result<ScanJob> {
        debug!(path = %image.display(), "submitting scan");
        self.upload(image)
            .await
            .map_err(|e| ScanError::Submission(e.to_string()))
    }

    async fn fetch_record(&self, id: JobId) -> Result<ScanJob> {
        let response = self
            .client
            .get(self.endpoint(&format!("/api/scans/{id}")))
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(ScanError::NotFound(id));
        }
        let body = read_body(response).await?;
        Ok(parse_record(&body)?)
    }

    async fn fetch_progress(&self, id: JobId) -> Result<Option<ProgressSnapshot>> {
        let response = self
            .client
            .get(self.endpoint(&format!("/api/scan/{id}/progress")))
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let body = read_body(response).await?;
        let snapshot = parse_progress(&body)?;
        Ok((!snapshot.is_unknown()).then_some(snapshot))
    }

    async fn list(&self) -> Result<Vec<ScanJob>> {
        let response = self
            .client
            .get(self.endpoint(&format!("/api/scans?skip=0&limit={}", self.list_limit)))
            .send()
            .await?;
        let body = read_body(response).await?;
        Ok(parse_records(&body)?)
    }

    async fn delete(&self, id: JobId) -> Result<()> {
        let response = self
            .client
            .delete(self.endpoint(&format!("/api/scans/{id}")))
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(ScanError::NotFound(id));
        }
        read_body(response).await?;
        Ok(())
    }

    async fn fetch_asset(&self, path: &str) -> Result<Vec<u8>> {
        let response = self.client.get(self.asset_url(path)).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ScanError::Status {
                status: status.as_u16(),
                body: truncate(&response.text().await.unwrap_or_default()),
            });
        }
        Ok(response.bytes().await?.to_vec())
    }
}

/// ステータスを確認してボディを文字列で返す
async fn read_body(response: Response) -> Result<String> {
    let status = response.status();
    let body = response.text().await?;
    if !status.is_success() {
        return Err(ScanError::Status {
            status: status.as_u16(),
            body: truncate(&body),
        });
    }
    Ok(body)
}

fn truncate(body: &str) -> String {
    let trimmed = body.trim();
    match trimmed.char_indices().nth(ERROR_BODY_LIMIT) {
        Some((idx, _)) => format!("{}...", &trimmed[..idx]),
        None => trimmed.to_string(),
    }
}
