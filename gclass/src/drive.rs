//! Google Drive resumable upload, implementing the core `StorageService` trait.
//!
//! A session is opened with one POST, then the file is streamed in chunks of
//! a 256 KiB multiple. Drive answers `308` with a `Range` header until the
//! last chunk, which returns the file metadata. When a chunk fails in
//! transport the committed offset is queried and the upload resumes from there.

use async_trait::async_trait;
use gclass_core::contract::{ServiceError, StorageService, UploadedFile};
use reqwest::header::{CONTENT_LENGTH, CONTENT_RANGE, LOCATION, RANGE};
use reqwest::{Client, Response, StatusCode};
use std::path::Path;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

use crate::http::{api_error, read_json, transport};

pub const DEFAULT_DRIVE_UPLOAD_URL: &str = "https://www.googleapis.com/upload/drive/v3/files";
pub const CHUNK_ALIGN: usize = 256 * 1024;
pub const DEFAULT_CHUNK_SIZE: usize = 8 * 1024 * 1024;
/// Failed chunk attempts tolerated per upload. A transport error and a `308`
/// that does not move the committed offset forward each count once.
const MAX_CHUNK_ATTEMPTS: usize = 3;
const UPLOAD_FIELDS: &str = "id,name,webViewLink";

/// Rounds down to a multiple of [`CHUNK_ALIGN`], never below one unit.
pub fn align_chunk_size(requested: usize) -> usize {
    (requested / CHUNK_ALIGN).max(1) * CHUNK_ALIGN
}

pub struct DriveClient {
    http: Client,
    upload_url: String,
    access_token: String,
    chunk_size: usize,
}

enum ChunkOutcome {
    Incomplete { committed: u64 },
    Done(UploadedFile),
}

impl DriveClient {
    pub fn new(http: Client, upload_url: impl Into<String>, access_token: impl Into<String>) -> Self {
        Self {
            http,
            upload_url: upload_url.into(),
            access_token: access_token.into(),
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = align_chunk_size(chunk_size);
        self
    }

    async fn start_session(&self, name: &str, mime: &str, total: u64) -> Result<String, ServiceError> {
        let resp = self
            .http
            .post(&self.upload_url)
            .bearer_auth(&self.access_token)
            .query(&[("uploadType", "resumable"), ("fields", UPLOAD_FIELDS)])
            .header("X-Upload-Content-Type", mime)
            .header("X-Upload-Content-Length", total.to_string())
            .json(&serde_json::json!({ "name": name }))
            .send()
            .await
            .map_err(transport)?;
        if !resp.status().is_success() {
            return Err(api_error(resp).await.into());
        }
        resp.headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| ServiceError::Decode("upload session response has no Location header".into()))
    }

    async fn put_chunk(
        &self,
        session: &str,
        chunk: Vec<u8>,
        offset: u64,
        total: u64,
    ) -> Result<ChunkOutcome, ServiceError> {
        let content_range = if chunk.is_empty() {
            format!("bytes */{total}")
        } else {
            format!("bytes {}-{}/{}", offset, offset + chunk.len() as u64 - 1, total)
        };
        let resp = self
            .http
            .put(session)
            .header(CONTENT_RANGE, content_range)
            .body(chunk)
            .send()
            .await
            .map_err(transport)?;
        chunk_outcome(resp).await
    }

    /// Asks Drive how many bytes of the session it has persisted.
    async fn query_status(&self, session: &str, total: u64) -> Result<ChunkOutcome, ServiceError> {
        let resp = self
            .http
            .put(session)
            .header(CONTENT_RANGE, format!("bytes */{total}"))
            .header(CONTENT_LENGTH, "0")
            .send()
            .await
            .map_err(transport)?;
        chunk_outcome(resp).await
    }
}

async fn chunk_outcome(resp: Response) -> Result<ChunkOutcome, ServiceError> {
    match resp.status() {
        StatusCode::PERMANENT_REDIRECT => {
            let committed = resp
                .headers()
                .get(RANGE)
                .and_then(|v| v.to_str().ok())
                .and_then(parse_range)
                .unwrap_or(0);
            Ok(ChunkOutcome::Incomplete { committed })
        }
        s if s.is_success() => Ok(ChunkOutcome::Done(read_json(resp).await?)),
        _ => Err(api_error(resp).await.into()),
    }
}

/// Parses `bytes=0-N` into the number of committed bytes (`N + 1`).
pub(crate) fn parse_range(value: &str) -> Option<u64> {
    let end = value.trim().strip_prefix("bytes=")?.split('-').nth(1)?;
    end.trim().parse::<u64>().ok().map(|n| n + 1)
}

pub(crate) fn guess_mime(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    match ext.as_str() {
        "pdf" => "application/pdf",
        "txt" | "md" => "text/plain",
        "csv" => "text/csv",
        "html" | "htm" => "text/html",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "zip" => "application/zip",
        "json" => "application/json",
        "doc" => "application/msword",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "xlsx" => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        "pptx" => "application/vnd.openxmlformats-officedocument.presentationml.presentation",
        _ => "application/octet-stream",
    }
}

#[async_trait]
impl StorageService for DriveClient {
    async fn create_file(&self, name: &str, path: &Path) -> Result<UploadedFile, ServiceError> {
        let mut file = tokio::fs::File::open(path).await?;
        let total = file.metadata().await?.len();
        let mime = guess_mime(path);
        let session = self.start_session(name, mime, total).await?;
        tracing::debug!(name, mime, total, chunk_size = self.chunk_size, "Upload session opened");

        let mut offset = 0u64;
        // Attempts that ended without moving the committed offset forward.
        let mut failures = 0usize;
        loop {
            let remaining = total - offset;
            let len = remaining.min(self.chunk_size as u64) as usize;
            let mut chunk = vec![0u8; len];
            file.seek(std::io::SeekFrom::Start(offset)).await?;
            file.read_exact(&mut chunk).await?;

            let (outcome, counted) = match self.put_chunk(&session, chunk, offset, total).await {
                Ok(outcome) => (outcome, false),
                Err(ServiceError::Transport(e)) => {
                    failures += 1;
                    if failures >= MAX_CHUNK_ATTEMPTS {
                        return Err(ServiceError::Transport(e));
                    }
                    tracing::warn!(error = %e, offset, attempt = failures, "Chunk failed, querying upload status");
                    (self.query_status(&session, total).await?, true)
                }
                Err(e) => return Err(e),
            };

            match outcome {
                ChunkOutcome::Done(uploaded) => {
                    tracing::info!(file_id = %uploaded.id, total, "Upload finished");
                    return Ok(uploaded);
                }
                ChunkOutcome::Incomplete { committed } => {
                    if committed > total {
                        return Err(ServiceError::Decode(format!(
                            "Drive reports {committed} bytes committed of {total}"
                        )));
                    }
                    if committed <= offset && !counted {
                        failures += 1;
                        if failures >= MAX_CHUNK_ATTEMPTS {
                            return Err(ServiceError::Transport(format!(
                                "upload made no progress at byte {offset}"
                            )));
                        }
                    }
                    tracing::debug!(committed, total, "Chunk accepted");
                    offset = committed;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_size_is_aligned_down_with_a_floor() {
        assert_eq!(align_chunk_size(1), CHUNK_ALIGN);
        assert_eq!(align_chunk_size(CHUNK_ALIGN * 3 + 7), CHUNK_ALIGN * 3);
        assert_eq!(align_chunk_size(DEFAULT_CHUNK_SIZE), DEFAULT_CHUNK_SIZE);
    }

    #[test]
    fn range_header_gives_committed_bytes() {
        assert_eq!(parse_range("bytes=0-262143"), Some(262144));
        assert_eq!(parse_range(" bytes=0-0 "), Some(1));
        assert_eq!(parse_range("garbage"), None);
        assert_eq!(parse_range("bytes=0-"), None);
    }

    #[test]
    fn mime_is_guessed_from_extension() {
        assert_eq!(guess_mime(Path::new("essay.PDF")), "application/pdf");
        assert_eq!(guess_mime(Path::new("notes.txt")), "text/plain");
        assert_eq!(guess_mime(Path::new("blob")), "application/octet-stream");
    }
}
