//! # Single Shot Upload Client
//!
//! Client per l'endpoint a blob di Bluesky: login → upload blob → create record.
//!
//! ## Caratteristiche:
//! - Ogni chiamata è indipendente; `login` viene ripetuto ad ogni pubblicazione
//! - Upload del blob in un'unica richiesta binaria con il mime type dell'asset
//! - Nessun retry interno: un errore è un singolo `Transport`/`Protocol`
//! - Il record `app.bsky.feed.post` include l'embed immagine se presente

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::{cancellable, BlobRef, UploadHandle};
use crate::credentials::BlueskyCredentials;
use crate::error::CrossPostError;
use crate::media::MediaAsset;

pub const POST_COLLECTION: &str = "app.bsky.feed.post";

/// Authenticated session returned by login
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Session {
    #[serde(rename = "accessJwt")]
    pub access_jwt: String,
    pub did: String,
    #[serde(default)]
    pub handle: String,
}

/// Image attached to a post
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageEmbed {
    pub blob: BlobRef,
    pub alt: String,
    pub aspect_ratio: Option<(u32, u32)>,
}

impl ImageEmbed {
    pub fn for_asset(blob: BlobRef, asset: Option<&MediaAsset>) -> Self {
        let aspect_ratio = asset.and_then(|a| match (a.width, a.height) {
            (Some(w), Some(h)) if w > 0 && h > 0 => Some((w, h)),
            _ => None,
        });
        Self {
            blob,
            alt: String::new(),
            aspect_ratio,
        }
    }
}

/// Raw calls against the blob-oriented posting endpoint
#[async_trait]
pub trait BlobApi: Send + Sync {
    async fn create_session(&self, identifier: &str, password: &str) -> Result<Session, CrossPostError>;

    async fn upload_blob(
        &self,
        session: &Session,
        data: Vec<u8>,
        mime_type: &str,
    ) -> Result<BlobRef, CrossPostError>;

    /// Create a record in the session's repo, returning its URI
    async fn create_record(
        &self,
        session: &Session,
        collection: &str,
        record: serde_json::Value,
    ) -> Result<String, CrossPostError>;
}

pub struct SingleShotUploadClient {
    api: Arc<dyn BlobApi>,
}

impl SingleShotUploadClient {
    pub fn new(api: Arc<dyn BlobApi>) -> Self {
        Self { api }
    }

    pub async fn login(
        &self,
        credentials: &BlueskyCredentials,
        cancel: &CancellationToken,
    ) -> Result<Session, CrossPostError> {
        let session = cancellable(
            cancel,
            self.api.create_session(&credentials.identifier, &credentials.password),
        )
        .await?;
        debug!("Bluesky session opened for {}", session.did);
        Ok(session)
    }

    pub async fn upload_blob(
        &self,
        asset: &MediaAsset,
        session: &Session,
        cancel: &CancellationToken,
    ) -> Result<UploadHandle, CrossPostError> {
        let data = tokio::fs::read(&asset.path).await?;
        let blob = cancellable(cancel, self.api.upload_blob(session, data, &asset.mime_type)).await?;
        info!("📤 Uploaded {} to Bluesky ({} bytes)", asset.file_name(), blob.size);
        Ok(UploadHandle::Bluesky(blob))
    }

    pub async fn post(
        &self,
        text: &str,
        image: Option<&ImageEmbed>,
        session: &Session,
        cancel: &CancellationToken,
    ) -> Result<String, CrossPostError> {
        let created_at = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
        let record = build_record(text, image, &created_at);
        cancellable(cancel, self.api.create_record(session, POST_COLLECTION, record)).await
    }
}

/// `app.bsky.feed.post` record body
pub fn build_record(text: &str, image: Option<&ImageEmbed>, created_at: &str) -> serde_json::Value {
    let mut record = json!({
        "$type": POST_COLLECTION,
        "text": text,
        "createdAt": created_at,
    });

    if let Some(image) = image {
        let mut entry = json!({
            "alt": image.alt,
            "image": {
                "$type": "blob",
                "ref": { "$link": image.blob.link },
                "mimeType": image.blob.mime_type,
                "size": image.blob.size,
            },
        });
        if let Some((width, height)) = image.aspect_ratio {
            entry["aspectRatio"] = json!({ "width": width, "height": height });
        }
        record["embed"] = json!({
            "$type": "app.bsky.embed.images",
            "images": [entry],
        });
    }

    record
}
