//! # Image Transform Module
//!
//! Una singola passata della scala immagini: ridimensiona al lato massimo
//! (mai upscaling, aspect ratio preservato) e ricodifica in JPEG alla qualità data.
//!
//! La decodifica/codifica è CPU-bound, quindi gira su `spawn_blocking`.

use async_trait::async_trait;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::ColorType;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::OptimizeError;
use crate::media::{MediaAsset, MediaKind};

/// One resize/re-encode pass producing a new asset
#[async_trait]
pub trait ImageTransformer: Send + Sync {
    async fn transform(
        &self,
        asset: &MediaAsset,
        max_dimension: u32,
        quality: u8,
        work_dir: &Path,
    ) -> Result<MediaAsset, OptimizeError>;
}

/// Resize + JPEG re-encode using the `image` crate
#[derive(Debug, Default, Clone, Copy)]
pub struct JpegLadderTransformer;

impl JpegLadderTransformer {
    fn encode(
        source: &Path,
        max_dimension: u32,
        quality: u8,
        work_dir: &Path,
    ) -> Result<(PathBuf, u32, u32), OptimizeError> {
        let decoded = image::open(source)?;
        let resized = if decoded.width().max(decoded.height()) > max_dimension {
            decoded.resize(max_dimension, max_dimension, FilterType::Lanczos3)
        } else {
            decoded
        };
        // JPEG has no alpha channel
        let rgb = resized.to_rgb8();
        let (width, height) = rgb.dimensions();

        let (file, path) = tempfile::Builder::new()
            .prefix("optimized-")
            .suffix(".jpg")
            .tempfile_in(work_dir)?
            .keep()
            .map_err(|e| OptimizeError::Io(e.error))?;

        let written = (|| -> Result<(), OptimizeError> {
            let mut writer = BufWriter::new(file);
            JpegEncoder::new_with_quality(&mut writer, quality).encode(
                rgb.as_raw(),
                width,
                height,
                ColorType::Rgb8,
            )?;
            writer.flush()?;
            Ok(())
        })();
        if let Err(e) = written {
            let _ = std::fs::remove_file(&path);
            return Err(e);
        }

        Ok((path, width, height))
    }
}

#[async_trait]
impl ImageTransformer for JpegLadderTransformer {
    async fn transform(
        &self,
        asset: &MediaAsset,
        max_dimension: u32,
        quality: u8,
        work_dir: &Path,
    ) -> Result<MediaAsset, OptimizeError> {
        let source = asset.path.clone();
        let work_dir = work_dir.to_path_buf();

        let (path, width, height) = tokio::task::spawn_blocking(move || {
            Self::encode(&source, max_dimension, quality, &work_dir)
        })
        .await
        .map_err(|e| OptimizeError::Task(e.to_string()))??;

        let byte_size = tokio::fs::metadata(&path).await?.len();
        debug!(
            "Image pass {}px/q{}: {} -> {} bytes",
            max_dimension, quality, asset.byte_size, byte_size
        );

        Ok(MediaAsset {
            path,
            kind: MediaKind::Image,
            width: Some(width),
            height: Some(height),
            mime_type: "image/jpeg".to_string(),
            byte_size,
        })
    }
}
