//! # Chunked Upload Client
//!
//! Implementa il protocollo di upload a chunk dell'endpoint media di Twitter.
//!
//! ## Protocollo:
//! 1. **INIT**: dimensione totale + categoria → `media_id`
//! 2. **APPEND**: il file è partizionato in chunk indicizzati; fino a N chunk
//!    in parallelo (2-4 in base alla dimensione), a batch: il pool si svuota
//!    prima di schedulare il batch successivo
//! 3. **FINALIZE**: completamento immediato o descrittore di "processing"
//! 4. **STATUS**: polling sequenziale con l'intervallo suggerito (minimo 1s)
//!
//! ## Progress:
//! Frazione dei byte con APPEND completato, limitata a 0.99 finché FINALIZE
//! (e l'eventuale processing) non termina; poi esattamente 1.0.
//!
//! ## Errori:
//! - Il fallimento di un chunk annulla tutti gli altri chunk in volo
//! - Nessun retry interno: il retry è responsabilità del coordinatore
//! - La cancellazione ritorna `CrossPostError::Canceled`

use async_trait::async_trait;
use serde::Deserialize;
use std::io::SeekFrom;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::{cancellable, sleep_or_cancel, UploadControl, UploadHandle};
use crate::config::Config;
use crate::credentials::TwitterCredentials;
use crate::error::CrossPostError;
use crate::media::{MediaAsset, MediaKind};
use crate::utils::format_size;

/// Progress never reaches 1.0 before FINALIZE completes
const MAX_PROGRESS_BEFORE_FINALIZE: f64 = 0.99;

/// Response body shared by INIT, FINALIZE and STATUS
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct MediaUploadResponse {
    pub media_id_string: String,
    #[serde(default)]
    pub processing_info: Option<ProcessingInfo>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ProcessingInfo {
    pub state: ProcessingState,
    #[serde(default)]
    pub check_after_secs: Option<u64>,
    #[serde(default)]
    pub progress_percent: Option<u8>,
    #[serde(default)]
    pub error: Option<ProcessingError>,
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingState {
    Pending,
    InProgress,
    Succeeded,
    Failed,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ProcessingError {
    #[serde(default)]
    pub code: Option<i64>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

impl ProcessingInfo {
    fn failure_reason(&self) -> String {
        self.error
            .as_ref()
            .and_then(|e| e.message.clone().or_else(|| e.name.clone()))
            .unwrap_or_else(|| "unknown reason".to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitRequest {
    pub total_bytes: u64,
    pub media_type: String,
    pub media_category: &'static str,
}

/// One APPEND segment: `[offset, offset + len)` of the file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkSpec {
    pub index: usize,
    pub offset: u64,
    pub len: usize,
}

/// Split `[0, total)` into contiguous, indexed chunks
pub fn partition(total: u64, chunk_size: usize) -> Vec<ChunkSpec> {
    let chunk_size = chunk_size.max(1) as u64;
    let mut chunks = Vec::new();
    let mut offset = 0;
    while offset < total {
        let len = chunk_size.min(total - offset);
        chunks.push(ChunkSpec {
            index: chunks.len(),
            offset,
            len: len as usize,
        });
        offset += len;
    }
    chunks
}

/// Size classes deciding how many APPENDs run at once
#[derive(Debug, Clone, Copy, PartialEq)]
enum SizeClass {
    Small,  // < 5MB
    Medium, // 5MB - 50MB
    Large,  // > 50MB
}

impl SizeClass {
    fn classify(size_bytes: u64) -> Self {
        const MB_5: u64 = 5 * 1024 * 1024;
        const MB_50: u64 = 50 * 1024 * 1024;

        if size_bytes < MB_5 {
            Self::Small
        } else if size_bytes < MB_50 {
            Self::Medium
        } else {
            Self::Large
        }
    }

    fn max_concurrent(&self) -> usize {
        match self {
            Self::Small => 2,
            Self::Medium => 3,
            Self::Large => 4,
        }
    }
}

/// Signed calls against the large-media upload endpoint
#[async_trait]
pub trait ChunkedMediaApi: Send + Sync {
    async fn init(
        &self,
        credentials: &TwitterCredentials,
        request: &InitRequest,
    ) -> Result<MediaUploadResponse, CrossPostError>;

    async fn append(
        &self,
        credentials: &TwitterCredentials,
        media_id: &str,
        segment_index: usize,
        chunk: Vec<u8>,
    ) -> Result<(), CrossPostError>;

    async fn finalize(
        &self,
        credentials: &TwitterCredentials,
        media_id: &str,
    ) -> Result<MediaUploadResponse, CrossPostError>;

    async fn status(
        &self,
        credentials: &TwitterCredentials,
        media_id: &str,
    ) -> Result<MediaUploadResponse, CrossPostError>;

    /// Create a post, returning its id
    async fn create_tweet(
        &self,
        credentials: &TwitterCredentials,
        text: &str,
        media_ids: &[String],
    ) -> Result<String, CrossPostError>;
}

pub struct ChunkedUploadClient {
    api: Arc<dyn ChunkedMediaApi>,
    small_chunk_bytes: usize,
    large_chunk_bytes: usize,
    large_video_threshold_bytes: u64,
    max_status_polls: u32,
    min_poll_interval: Duration,
}

impl ChunkedUploadClient {
    pub fn new(api: Arc<dyn ChunkedMediaApi>, config: &Config) -> Self {
        Self {
            api,
            small_chunk_bytes: config.small_chunk_bytes,
            large_chunk_bytes: config.large_chunk_bytes,
            large_video_threshold_bytes: config.large_video_threshold_bytes,
            max_status_polls: config.max_status_polls,
            min_poll_interval: Duration::from_secs(config.min_poll_interval_secs),
        }
    }

    pub fn media_category(asset: &MediaAsset) -> &'static str {
        match asset.kind {
            MediaKind::Video => "tweet_video",
            MediaKind::Image if asset.is_gif() => "tweet_gif",
            MediaKind::Image => "tweet_image",
        }
    }

    pub fn chunk_size_for(&self, asset: &MediaAsset) -> usize {
        if asset.is_video() && asset.byte_size > self.large_video_threshold_bytes {
            self.large_chunk_bytes
        } else {
            self.small_chunk_bytes
        }
    }

    /// Upload `asset`, returning the destination media id
    pub async fn upload(
        &self,
        asset: &MediaAsset,
        credentials: &TwitterCredentials,
        control: &UploadControl,
    ) -> Result<UploadHandle, CrossPostError> {
        if asset.byte_size == 0 {
            return Err(CrossPostError::Validation(format!("{} is empty", asset.file_name())));
        }
        let cancel = &control.cancel;

        let request = InitRequest {
            total_bytes: asset.byte_size,
            media_type: asset.mime_type.clone(),
            media_category: Self::media_category(asset),
        };
        let init = cancellable(cancel, self.api.init(credentials, &request)).await?;
        let media_id = init.media_id_string;
        debug!("INIT {} ({}) -> media_id {}", asset.file_name(), format_size(asset.byte_size), media_id);
        control.report(0.0);

        self.append_all(asset, credentials, &media_id, control).await?;

        let finalized = cancellable(cancel, self.api.finalize(credentials, &media_id)).await?;
        if let Some(info) = finalized.processing_info {
            self.await_processing(credentials, &media_id, info, cancel).await?;
        }

        control.report(1.0);
        info!("📤 Uploaded {} to Twitter as {}", asset.file_name(), media_id);
        Ok(UploadHandle::Twitter { media_id })
    }

    async fn append_all(
        &self,
        asset: &MediaAsset,
        credentials: &TwitterCredentials,
        media_id: &str,
        control: &UploadControl,
    ) -> Result<(), CrossPostError> {
        let chunks = partition(asset.byte_size, self.chunk_size_for(asset));
        let workers = SizeClass::classify(asset.byte_size).max_concurrent();
        let completed = AtomicU64::new(0);
        debug!("APPEND {} chunks, {} at a time", chunks.len(), workers);

        for batch in chunks.chunks(workers) {
            let appends = batch.iter().map(|chunk| {
                self.append_chunk(asset, credentials, media_id, *chunk, control, &completed)
            });
            // First failure drops the rest of the batch, aborting their requests
            cancellable(&control.cancel, futures::future::try_join_all(appends)).await?;
        }
        Ok(())
    }

    async fn append_chunk(
        &self,
        asset: &MediaAsset,
        credentials: &TwitterCredentials,
        media_id: &str,
        chunk: ChunkSpec,
        control: &UploadControl,
        completed: &AtomicU64,
    ) -> Result<(), CrossPostError> {
        let data = read_chunk(&asset.path, chunk).await?;
        self.api.append(credentials, media_id, chunk.index, data).await?;

        let done = completed.fetch_add(chunk.len as u64, Ordering::SeqCst) + chunk.len as u64;
        let fraction = done as f64 / asset.byte_size as f64;
        control.report(fraction.min(MAX_PROGRESS_BEFORE_FINALIZE));
        debug!("APPEND segment {} done ({:.0}%)", chunk.index, fraction * 100.0);
        Ok(())
    }

    async fn await_processing(
        &self,
        credentials: &TwitterCredentials,
        media_id: &str,
        mut info: ProcessingInfo,
        cancel: &CancellationToken,
    ) -> Result<(), CrossPostError> {
        let mut polls = 0;
        loop {
            match info.state {
                ProcessingState::Succeeded => return Ok(()),
                ProcessingState::Failed => {
                    return Err(CrossPostError::Protocol(format!(
                        "media processing failed: {}",
                        info.failure_reason()
                    )));
                }
                ProcessingState::Pending | ProcessingState::InProgress => {
                    if polls >= self.max_status_polls {
                        return Err(CrossPostError::Protocol(format!(
                            "media {} still processing after {} status checks",
                            media_id, polls
                        )));
                    }
                    let wait = Duration::from_secs(info.check_after_secs.unwrap_or(0)).max(self.min_poll_interval);
                    debug!(
                        "Media {} processing ({}%), next check in {:?}",
                        media_id,
                        info.progress_percent.unwrap_or(0),
                        wait
                    );
                    sleep_or_cancel(cancel, wait).await?;
                    polls += 1;

                    let status = cancellable(cancel, self.api.status(credentials, media_id)).await?;
                    match status.processing_info {
                        Some(next) => info = next,
                        None => return Ok(()),
                    }
                }
            }
        }
    }

    /// Publish `text` with already-uploaded media
    pub async fn post_tweet(
        &self,
        credentials: &TwitterCredentials,
        text: &str,
        media_ids: &[String],
        cancel: &CancellationToken,
    ) -> Result<String, CrossPostError> {
        cancellable(cancel, self.api.create_tweet(credentials, text, media_ids)).await
    }
}

async fn read_chunk(path: &Path, chunk: ChunkSpec) -> Result<Vec<u8>, CrossPostError> {
    let mut file = tokio::fs::File::open(path).await?;
    file.seek(SeekFrom::Start(chunk.offset)).await?;
    let mut buffer = vec![0u8; chunk.len];
    file.read_exact(&mut buffer).await?;
    Ok(buffer)
}
