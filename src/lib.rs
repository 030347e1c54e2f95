//! # Media Crosspost Library
//!
//! Questo è il modulo principale della libreria che espone tutte le API pubbliche.
//!
//! ## Responsabilità:
//! - Definisce la struttura modulare dell'applicazione
//! - Espone i tipi e le funzioni principali tramite re-exports
//! - Fornisce un'interfaccia pulita per il main.rs e per altri consumatori
//!
//! ## Architettura dei moduli:
//! - `config`: Limiti, chunking, endpoint e validazione parametri
//! - `error`: Tassonomia errori (Transport/Protocol/Validation/Credential)
//! - `media`: `MediaAsset` e probing dei file
//! - `credentials`: Store chiave/valore dei segreti
//! - `optimizer`: Compressione iterativa fino al budget della destinazione
//! - `upload`: Client chunked (Twitter) e a blob (Bluesky) con firma OAuth
//! - `session`: Generazioni e cancel token delle upload in volo
//! - `crosspost`: Coordinatore della pubblicazione e attore del composer
//! - `progress` / `json_output`: Presentazione da CLI
//!
//! ## Utilizzo:
//! ```ignore
//! use media_crosspost::{Composer, Config, Credentials};
//!
//! let coordinator = Arc::new(build_coordinator(Config::default()).await?);
//! let (composer, mut events, _task) = Composer::spawn(coordinator, credentials);
//! composer.select_media(MediaAsset::probe(&path).await?)?;
//! composer.set_text("hello")?;
//! let report = composer.request_post().await?;
//! ```

pub mod config;
pub mod credentials;
pub mod crosspost;
pub mod error;
pub mod json_output;
pub mod media;
pub mod optimizer;
pub mod platform;
pub mod progress;
pub mod session;
pub mod upload;
pub mod utils;

#[cfg(test)]
mod test_support;

pub use config::Config;
pub use credentials::{CredentialStore, Credentials, FileCredentialStore, MemoryCredentialStore};
pub use crosspost::{Composer, ComposerEvent, ComposerHandle, CrossPostCoordinator, PostOutcome, PublishReport};
pub use error::{CrossPostError, OptimizeError};
pub use media::{MediaAsset, MediaKind};
pub use session::{Generation, UploadSessionCoordinator};
pub use upload::{Destination, UploadHandle};

use std::path::PathBuf;
use std::sync::Arc;

use optimizer::{FfmpegTranscoder, JpegLadderTransformer, SizeAwareOptimizer, VideoTranscoder};
use upload::{BlueskyHttpApi, ChunkedUploadClient, SingleShotUploadClient, TwitterHttpApi};

/// Wire the coordinator to the real HTTP transports and the local transforms.
///
/// The video transcoder is only installed when ffmpeg is on the PATH.
pub async fn build_coordinator(config: Config) -> anyhow::Result<CrossPostCoordinator> {
    config.validate()?;

    let work_dir: PathBuf = match &config.work_dir {
        Some(dir) => {
            tokio::fs::create_dir_all(dir).await?;
            dir.clone()
        }
        None => std::env::temp_dir(),
    };

    let video: Option<Arc<dyn VideoTranscoder>> = match FfmpegTranscoder::detect().await {
        Some(transcoder) => Some(Arc::new(transcoder)),
        None => {
            tracing::warn!("ffmpeg not found, videos will be uploaded as-is");
            None
        }
    };
    let optimizer = SizeAwareOptimizer::new(
        Arc::new(JpegLadderTransformer),
        video,
        work_dir,
        config.min_transform_bytes,
    );

    let twitter = ChunkedUploadClient::new(Arc::new(TwitterHttpApi::new(&config)?), &config);
    let bluesky = SingleShotUploadClient::new(Arc::new(BlueskyHttpApi::new(&config)?));
    Ok(CrossPostCoordinator::new(config, optimizer, twitter, bluesky))
}
