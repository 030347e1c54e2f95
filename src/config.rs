//! # Configuration Management Module
//!
//! Questo modulo gestisce tutta la configurazione dell'applicazione.
//!
//! ## Responsabilità:
//! - Definisce la struct `Config` con limiti, chunking, endpoint e polling
//! - Fornisce validazione robusta dei parametri
//! - Supporta caricamento/salvataggio configurazione da/verso file JSON
//! - Fornisce valori di default allineati ai limiti documentati delle API
//!
//! ## Parametri di configurazione:
//! - `*_limit_bytes`: Budget in byte per destinazione e tipo di media
//! - `bluesky_max_chars` / `twitter_max_chars`: Limiti di lunghezza del testo
//! - `min_transform_bytes`: Sotto questa soglia i file non vengono ricompressi
//! - `small_chunk_bytes` / `large_chunk_bytes`: Dimensione chunk APPEND
//! - `max_status_polls` / `min_poll_interval_secs`: Polling STATUS
//! - `twitter_upload_url`, `twitter_tweet_url`, `bluesky_service_url`: Endpoint
//! - `work_dir`: Directory per i file ottimizzati (default: temp dir)
//!
//! ## Esempio:
//! ```ignore
//! let config = Config {
//!     bluesky_image_limit_bytes: 950_000,
//!     ..Default::default()
//! };
//! config.validate()?;
//! ```

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::media::MediaKind;
use crate::upload::Destination;

const MIB: u64 = 1024 * 1024;

/// Configuration for optimization, uploads and posting
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Twitter still image budget
    pub twitter_image_limit_bytes: u64,
    /// Twitter animated GIF budget
    pub twitter_gif_limit_bytes: u64,
    /// Twitter video budget (hard ceiling for the video ladder)
    pub twitter_video_limit_bytes: u64,
    /// Bluesky image blob budget
    pub bluesky_image_limit_bytes: u64,
    /// Longest text Bluesky accepts
    pub bluesky_max_chars: usize,
    /// Longest text Twitter accepts
    pub twitter_max_chars: usize,
    /// Files smaller than this are never re-compressed
    pub min_transform_bytes: u64,
    /// APPEND chunk size for images and small videos
    pub small_chunk_bytes: usize,
    /// APPEND chunk size for big videos
    pub large_chunk_bytes: usize,
    /// Videos above this size use `large_chunk_bytes`
    pub large_video_threshold_bytes: u64,
    /// Upper bound on STATUS polls before giving up
    pub max_status_polls: u32,
    /// Floor for the server suggested poll interval
    pub min_poll_interval_secs: u64,
    /// Per-request timeout for the HTTP transports
    pub request_timeout_secs: u64,
    pub twitter_upload_url: String,
    pub twitter_tweet_url: String,
    pub bluesky_service_url: String,
    /// Directory for optimized files (None = private temp dir)
    pub work_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            twitter_image_limit_bytes: 5 * MIB,
            twitter_gif_limit_bytes: 15 * MIB,
            twitter_video_limit_bytes: 512 * MIB,
            bluesky_image_limit_bytes: 1_000_000,
            bluesky_max_chars: 300,
            twitter_max_chars: 25_000,
            min_transform_bytes: 100 * 1024,
            small_chunk_bytes: MIB as usize,
            large_chunk_bytes: 4 * MIB as usize,
            large_video_threshold_bytes: 20 * MIB,
            max_status_polls: 120,
            min_poll_interval_secs: 1,
            request_timeout_secs: 300,
            twitter_upload_url: "https://upload.twitter.com/1.1/media/upload.json".to_string(),
            twitter_tweet_url: "https://api.twitter.com/2/tweets".to_string(),
            bluesky_service_url: "https://bsky.social".to_string(),
            work_dir: None,
        }
    }
}

impl Config {
    /// Validate configuration parameters
    pub fn validate(&self) -> Result<()> {
        if self.small_chunk_bytes == 0 || self.large_chunk_bytes == 0 {
            return Err(anyhow::anyhow!("Chunk sizes must be greater than 0"));
        }

        if self.large_chunk_bytes < self.small_chunk_bytes {
            return Err(anyhow::anyhow!("Large chunk size must not be smaller than the small chunk size"));
        }

        let limits = [
            self.twitter_image_limit_bytes,
            self.twitter_gif_limit_bytes,
            self.twitter_video_limit_bytes,
            self.bluesky_image_limit_bytes,
        ];
        if limits.iter().any(|limit| *limit == 0) {
            return Err(anyhow::anyhow!("Destination size limits must be greater than 0"));
        }

        if self.bluesky_max_chars == 0 || self.twitter_max_chars == 0 {
            return Err(anyhow::anyhow!("Text length limits must be greater than 0"));
        }

        if self.min_poll_interval_secs == 0 {
            return Err(anyhow::anyhow!("Minimum poll interval must be at least 1 second"));
        }

        if self.max_status_polls == 0 {
            return Err(anyhow::anyhow!("At least one STATUS poll must be allowed"));
        }

        Ok(())
    }

    /// Byte budget for an asset of `kind` at `destination`.
    ///
    /// `None` means the destination does not accept this kind at all.
    pub fn limit_for(&self, destination: Destination, kind: MediaKind, is_gif: bool) -> Option<u64> {
        match (destination, kind) {
            (Destination::Twitter, MediaKind::Image) if is_gif => Some(self.twitter_gif_limit_bytes),
            (Destination::Twitter, MediaKind::Image) => Some(self.twitter_image_limit_bytes),
            (Destination::Twitter, MediaKind::Video) => Some(self.twitter_video_limit_bytes),
            (Destination::Bluesky, MediaKind::Image) => Some(self.bluesky_image_limit_bytes),
            (Destination::Bluesky, MediaKind::Video) => None,
        }
    }

    /// Load configuration from file
    pub async fn from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = tokio::fs::read_to_string(path).await?;
        let config: Config = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub async fn save_to_file(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        tokio::fs::write(path, content).await?;
        Ok(())
    }
}
