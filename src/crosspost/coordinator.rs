//! # Cross Post Coordinator
//!
//! Pubblicazione end-to-end su entrambe le destinazioni.
//!
//! ## Responsabilità:
//! - Eleggibilità di Bluesky (niente video, testo entro il limite)
//! - Ottimizzazione per destinazione (`prepare`) + upload (`upload_for`), usato sia
//!   dalle upload anticipate sia dal fallback sincrono al momento del post
//! - Il file ottimizzato viene rimosso appena l'upload si conclude (anche se fallisce)
//! - Un solo login su Bluesky per pubblicazione
//! - `publish`: Twitter per primo, Bluesky solo dopo un successo di Twitter
//! - Sintesi di un unico `PostOutcome` dai due risultati indipendenti
//!
//! ## Propagazione errori:
//! - `Validation` / `Credential` interrompono prima di qualsiasi upload
//! - Errori di Twitter al momento del post: fallimento dell'intera operazione
//! - Errori di Bluesky: mai oltre il successo parziale

use serde::Serialize;
use std::fmt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::credentials::{BlueskyCredentials, Credentials, TwitterCredentials};
use crate::error::CrossPostError;
use crate::media::{MediaAsset, MediaKind};
use crate::optimizer::{OptimizeReport, SizeAwareOptimizer};
use crate::upload::single_shot::ImageEmbed;
use crate::upload::{BlobRef, ChunkedUploadClient, Destination, SingleShotUploadClient, UploadControl, UploadHandle};

/// Why the secondary destination cannot take a post
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ineligibility {
    Video,
    TextTooLong { chars: usize, limit: usize },
}

impl Ineligibility {
    /// Same rule, regardless of the numbers it was raised with
    pub fn same_kind(&self, other: &Ineligibility) -> bool {
        std::mem::discriminant(self) == std::mem::discriminant(other)
    }
}

impl fmt::Display for Ineligibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Ineligibility::Video => write!(f, "Bluesky does not support video"),
            Ineligibility::TextTooLong { chars, limit } => {
                write!(f, "text is {} characters, Bluesky allows {}", chars, limit)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DestinationToggles {
    pub bluesky: bool,
}

impl Default for DestinationToggles {
    fn default() -> Self {
        Self { bluesky: true }
    }
}

/// Handles already obtained for the current media selection
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CachedHandles {
    pub twitter_media_id: Option<String>,
    pub bluesky_blob: Option<BlobRef>,
}

impl CachedHandles {
    pub fn store(&mut self, handle: UploadHandle) {
        match handle {
            UploadHandle::Twitter { media_id } => self.twitter_media_id = Some(media_id),
            UploadHandle::Bluesky(blob) => self.bluesky_blob = Some(blob),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PublishRequest {
    pub text: String,
    pub asset: Option<MediaAsset>,
    pub toggles: DestinationToggles,
    pub cached: CachedHandles,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DestinationResult {
    Posted { id: String },
    Failed { error: String },
    Skipped { reason: String },
}

impl DestinationResult {
    pub fn is_posted(&self) -> bool {
        matches!(self, DestinationResult::Posted { .. })
    }

    fn skipped(reason: impl Into<String>) -> Self {
        DestinationResult::Skipped { reason: reason.into() }
    }

    fn failed(error: &CrossPostError) -> Self {
        DestinationResult::Failed { error: error.to_string() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
    Success,
    PartialSuccess,
    Failure,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PostOutcome {
    pub twitter: DestinationResult,
    pub bluesky: DestinationResult,
}

impl PostOutcome {
    pub fn kind(&self) -> OutcomeKind {
        match (&self.twitter, &self.bluesky) {
            (DestinationResult::Posted { .. }, DestinationResult::Posted { .. }) => OutcomeKind::Success,
            (DestinationResult::Posted { .. }, _) => OutcomeKind::PartialSuccess,
            _ => OutcomeKind::Failure,
        }
    }

    /// Human readable summary for the presentation layer
    pub fn summary(&self) -> String {
        match (self.kind(), &self.bluesky) {
            (OutcomeKind::Success, _) => "Posted to Twitter and Bluesky".to_string(),
            (OutcomeKind::PartialSuccess, DestinationResult::Skipped { reason }) => {
                format!("Posted to Twitter; Bluesky skipped: {}", reason)
            }
            (OutcomeKind::PartialSuccess, DestinationResult::Failed { error }) => {
                format!("Posted to Twitter; Bluesky failed: {}", error)
            }
            _ => match &self.twitter {
                DestinationResult::Failed { error } => format!("Post failed: {}", error),
                _ => "Post failed".to_string(),
            },
        }
    }
}

#[derive(Debug, Clone)]
pub struct PublishResult {
    pub outcome: PostOutcome,
    /// Handles obtained during this publish, reusable by a retry of the same selection
    pub handles: CachedHandles,
}

/// Upload made ready for one destination
#[derive(Debug, Clone)]
pub struct PreparedUpload {
    pub handle: UploadHandle,
    pub warning: Option<String>,
}

pub struct CrossPostCoordinator {
    config: Config,
    optimizer: SizeAwareOptimizer,
    twitter: ChunkedUploadClient,
    bluesky: SingleShotUploadClient,
}

impl CrossPostCoordinator {
    pub fn new(
        config: Config,
        optimizer: SizeAwareOptimizer,
        twitter: ChunkedUploadClient,
        bluesky: SingleShotUploadClient,
    ) -> Self {
        Self {
            config,
            optimizer,
            twitter,
            bluesky,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn bluesky_eligibility(&self, text: &str, asset: Option<&MediaAsset>) -> Result<(), Ineligibility> {
        if asset.is_some_and(|a| a.kind == MediaKind::Video) {
            return Err(Ineligibility::Video);
        }
        let chars = text.chars().count();
        if chars > self.config.bluesky_max_chars {
            return Err(Ineligibility::TextTooLong {
                chars,
                limit: self.config.bluesky_max_chars,
            });
        }
        Ok(())
    }

    /// Optimize `asset` for `destination`; a result still over the limit is a `Validation` error
    async fn prepare(&self, destination: Destination, asset: &MediaAsset) -> Result<OptimizeReport, CrossPostError> {
        let limit = self
            .config
            .limit_for(destination, asset.kind, asset.is_gif())
            .ok_or_else(|| CrossPostError::Validation(format!("{} does not accept this media type", destination)))?;

        let report = self.optimizer.optimize_with_report(asset, limit).await;
        if let Some(warning) = &report.warning {
            warn!("⚠️ {}", warning);
        }
        if report.asset.byte_size > limit {
            let error = CrossPostError::Validation(format!(
                "{} is {} bytes, {} accepts at most {}",
                report.asset.file_name(),
                report.asset.byte_size,
                destination,
                limit
            ));
            self.optimizer.discard(asset, &report.asset).await;
            return Err(error);
        }
        Ok(report)
    }

    /// Optimize `asset` for `destination` and upload it
    pub async fn upload_for(
        &self,
        destination: Destination,
        asset: &MediaAsset,
        credentials: &Credentials,
        control: &UploadControl,
    ) -> Result<PreparedUpload, CrossPostError> {
        let report = self.prepare(destination, asset).await?;
        let uploaded = self.transfer(destination, &report.asset, credentials, control).await;
        self.optimizer.discard(asset, &report.asset).await;

        Ok(PreparedUpload {
            handle: uploaded?,
            warning: report.warning,
        })
    }

    async fn transfer(
        &self,
        destination: Destination,
        prepared: &MediaAsset,
        credentials: &Credentials,
        control: &UploadControl,
    ) -> Result<UploadHandle, CrossPostError> {
        match destination {
            Destination::Twitter => {
                let credentials = twitter_credentials(credentials)?;
                self.twitter.upload(prepared, credentials, control).await
            }
            Destination::Bluesky => {
                let credentials = bluesky_credentials(credentials)?;
                let session = self.bluesky.login(credentials, &control.cancel).await?;
                let handle = self.bluesky.upload_blob(prepared, &session, &control.cancel).await?;
                control.report(1.0);
                Ok(handle)
            }
        }
    }

    /// Post `request` to Twitter, then to Bluesky when eligible.
    ///
    /// `Err` only for rejections raised before posting (empty content,
    /// missing credentials, over-limit content) and for cancellation; every
    /// other failure is reported inside the outcome.
    pub async fn publish(
        &self,
        request: PublishRequest,
        credentials: &Credentials,
        cancel: &CancellationToken,
    ) -> Result<PublishResult, CrossPostError> {
        if request.text.trim().is_empty() && request.asset.is_none() {
            return Err(CrossPostError::Validation("nothing to post: add text or media".into()));
        }
        let twitter_credentials = twitter_credentials(credentials)?;
        let chars = request.text.chars().count();
        if chars > self.config.twitter_max_chars {
            return Err(CrossPostError::Validation(format!(
                "text is {} characters, Twitter allows {}",
                chars, self.config.twitter_max_chars
            )));
        }

        let mut handles = request.cached.clone();
        let control = UploadControl::new(cancel.clone());

        let media_ids = match (&request.asset, &handles.twitter_media_id) {
            (None, _) => Vec::new(),
            (Some(_), Some(media_id)) => {
                debug!("Reusing Twitter media {}", media_id);
                vec![media_id.clone()]
            }
            (Some(asset), None) => {
                info!("No Twitter upload ready, uploading {} before posting", asset.file_name());
                match self.upload_for(Destination::Twitter, asset, credentials, &control).await {
                    Ok(prepared) => {
                        handles.store(prepared.handle);
                        handles.twitter_media_id.iter().cloned().collect()
                    }
                    Err(e) if e.is_rejection() || e.is_canceled() => return Err(e),
                    Err(e) => return Ok(Self::twitter_failed(&e, handles)),
                }
            }
        };

        let tweet_id = match self
            .twitter
            .post_tweet(twitter_credentials, &request.text, &media_ids, cancel)
            .await
        {
            Ok(id) => id,
            Err(CrossPostError::Canceled) => return Err(CrossPostError::Canceled),
            Err(e) => return Ok(Self::twitter_failed(&e, handles)),
        };
        info!("🐦 Posted to Twitter ({})", tweet_id);

        let bluesky = self.publish_bluesky(&request, credentials, &mut handles, &control).await;
        match &bluesky {
            DestinationResult::Posted { id } => info!("🦋 Posted to Bluesky ({})", id),
            DestinationResult::Failed { error } => warn!("Bluesky post failed: {}", error),
            DestinationResult::Skipped { reason } => info!("Bluesky skipped: {}", reason),
        }

        Ok(PublishResult {
            outcome: PostOutcome {
                twitter: DestinationResult::Posted { id: tweet_id },
                bluesky,
            },
            handles,
        })
    }

    async fn publish_bluesky(
        &self,
        request: &PublishRequest,
        credentials: &Credentials,
        handles: &mut CachedHandles,
        control: &UploadControl,
    ) -> DestinationResult {
        if !request.toggles.bluesky {
            return DestinationResult::skipped("disabled");
        }
        if let Err(reason) = self.bluesky_eligibility(&request.text, request.asset.as_ref()) {
            return DestinationResult::skipped(reason.to_string());
        }
        let Some(bluesky_credentials) = credentials.bluesky.as_ref() else {
            return DestinationResult::skipped("Bluesky credentials are not configured");
        };

        let cancel = &control.cancel;
        let session = match self.bluesky.login(bluesky_credentials, cancel).await {
            Ok(session) => session,
            Err(e) => return DestinationResult::failed(&e),
        };

        let embed = match (&request.asset, &handles.bluesky_blob) {
            (None, _) => None,
            (Some(asset), Some(blob)) => Some(ImageEmbed::for_asset(blob.clone(), Some(asset))),
            (Some(asset), None) => {
                let report = match self.prepare(Destination::Bluesky, asset).await {
                    Ok(report) => report,
                    Err(CrossPostError::Validation(reason)) => return DestinationResult::skipped(reason),
                    Err(e) => return DestinationResult::failed(&e),
                };
                // reuse the session opened above
                let uploaded = self.bluesky.upload_blob(&report.asset, &session, cancel).await;
                self.optimizer.discard(asset, &report.asset).await;
                let blob = match uploaded {
                    Ok(UploadHandle::Bluesky(blob)) => blob,
                    Ok(UploadHandle::Twitter { .. }) => {
                        return DestinationResult::failed(&CrossPostError::Protocol("unexpected upload handle".into()))
                    }
                    Err(e) => return DestinationResult::failed(&e),
                };
                handles.bluesky_blob = Some(blob.clone());
                Some(ImageEmbed::for_asset(blob, Some(asset)))
            }
        };

        match self.bluesky.post(&request.text, embed.as_ref(), &session, cancel).await {
            Ok(uri) => DestinationResult::Posted { id: uri },
            Err(e) => DestinationResult::failed(&e),
        }
    }

    fn twitter_failed(error: &CrossPostError, handles: CachedHandles) -> PublishResult {
        warn!("Twitter post failed: {}", error);
        PublishResult {
            outcome: PostOutcome {
                twitter: DestinationResult::failed(error),
                bluesky: DestinationResult::skipped("not attempted because the Twitter post failed"),
            },
            handles,
        }
    }
}

fn twitter_credentials(credentials: &Credentials) -> Result<&TwitterCredentials, CrossPostError> {
    credentials
        .twitter
        .as_ref()
        .ok_or_else(|| CrossPostError::Credential("Twitter credentials are not configured".into()))
}

fn bluesky_credentials(credentials: &Credentials) -> Result<&BlueskyCredentials, CrossPostError> {
    credentials
        .bluesky
        .as_ref()
        .ok_or_else(|| CrossPostError::Credential("Bluesky credentials are not configured".into()))
}
