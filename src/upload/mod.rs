//! # Upload Module
//!
//! Client di upload per le due destinazioni e i relativi trasporti HTTP:
//! - `chunked`: Protocollo INIT → APPEND×N → FINALIZE → STATUS (Twitter)
//! - `single_shot`: login → upload blob → create record (Bluesky)
//! - `oauth`: Firma OAuth 1.0a HMAC-SHA1 di ogni richiesta chunked
//! - `twitter_http` / `bluesky_http`: Implementazioni `reqwest` delle API
//!
//! Ogni chiamata di rete riceve un `CancellationToken`; la cancellazione
//! produce `CrossPostError::Canceled`, mai un errore da mostrare all'utente.

pub mod bluesky_http;
pub mod chunked;
pub mod oauth;
pub mod single_shot;
pub mod twitter_http;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::error::CrossPostError;

pub use bluesky_http::BlueskyHttpApi;
pub use chunked::{ChunkedMediaApi, ChunkedUploadClient, MediaUploadResponse, ProcessingInfo};
pub use single_shot::{BlobApi, Session, SingleShotUploadClient};
pub use twitter_http::TwitterHttpApi;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Destination {
    Twitter,
    Bluesky,
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Destination::Twitter => write!(f, "Twitter"),
            Destination::Bluesky => write!(f, "Bluesky"),
        }
    }
}

/// Blob descriptor returned by the single-shot endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobRef {
    /// Content link (CID) of the uploaded blob
    pub link: String,
    pub mime_type: String,
    pub size: u64,
}

/// Reference to media already uploaded to a destination
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadHandle {
    Twitter { media_id: String },
    Bluesky(BlobRef),
}

impl UploadHandle {
    pub fn destination(&self) -> Destination {
        match self {
            UploadHandle::Twitter { .. } => Destination::Twitter,
            UploadHandle::Bluesky(_) => Destination::Bluesky,
        }
    }
}

/// Fraction in `[0, 1]`
pub type ProgressCallback = Arc<dyn Fn(f64) + Send + Sync>;

/// Cancellation and progress plumbing handed to an upload
#[derive(Clone, Default)]
pub struct UploadControl {
    pub cancel: CancellationToken,
    pub on_progress: Option<ProgressCallback>,
}

impl UploadControl {
    pub fn new(cancel: CancellationToken) -> Self {
        Self {
            cancel,
            on_progress: None,
        }
    }

    pub fn with_progress(mut self, on_progress: ProgressCallback) -> Self {
        self.on_progress = Some(on_progress);
        self
    }

    pub(crate) fn report(&self, fraction: f64) {
        if let Some(callback) = &self.on_progress {
            callback(fraction.clamp(0.0, 1.0));
        }
    }
}

/// Run `fut` unless `cancel` fires first; the losing future is dropped.
pub(crate) async fn cancellable<T, F>(cancel: &CancellationToken, fut: F) -> Result<T, CrossPostError>
where
    F: Future<Output = Result<T, CrossPostError>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(CrossPostError::Canceled),
        result = fut => result,
    }
}

/// Cancel-aware sleep
pub(crate) async fn sleep_or_cancel(cancel: &CancellationToken, duration: std::time::Duration) -> Result<(), CrossPostError> {
    cancellable(cancel, async {
        tokio::time::sleep(duration).await;
        Ok(())
    })
    .await
}
