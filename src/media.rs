//! # Media Asset Module
//!
//! Questo modulo definisce `MediaAsset`, il media pronto per una fase della pipeline.
//!
//! ## Responsabilità:
//! - Determinazione tipo di file (immagine vs video) dall'estensione
//! - Lettura dimensioni (header immagine, ffprobe per i video se disponibile)
//! - Mime type con fallback esplicito per tipo di media
//!
//! ## Formati supportati:
//! - **Immagini**: JPG, JPEG, PNG, WebP, GIF
//! - **Video**: MP4, MOV, M4V, WebM, MKV, AVI
//!
//! Un `MediaAsset` è immutabile: ogni passata di ottimizzazione ne produce uno nuovo.

use anyhow::Result;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::optimizer::video_transcoder::FfmpegTranscoder;

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp", "gif"];
const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mov", "m4v", "webm", "mkv", "avi"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    Image,
    Video,
}

impl MediaKind {
    /// Mime type used when the real one cannot be determined.
    ///
    /// This can misrepresent the content to the destination API (a PNG sent
    /// as `image/jpeg`), so every use is logged.
    pub fn fallback_mime(&self) -> &'static str {
        match self {
            MediaKind::Image => "image/jpeg",
            MediaKind::Video => "video/mp4",
        }
    }
}

/// A media file ready for the next pipeline stage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaAsset {
    pub path: PathBuf,
    pub kind: MediaKind,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub mime_type: String,
    pub byte_size: u64,
}

impl MediaAsset {
    /// Build an asset from a file on disk, reading size, kind and dimensions.
    pub async fn probe(path: &Path) -> Result<Self> {
        let kind = Self::kind_for(path)
            .ok_or_else(|| anyhow::anyhow!("Unsupported media file: {}", path.display()))?;
        let byte_size = tokio::fs::metadata(path).await?.len();

        let (width, height) = match kind {
            MediaKind::Image => match image::image_dimensions(path) {
                Ok((w, h)) => (Some(w), Some(h)),
                Err(e) => {
                    debug!("Could not read image header of {}: {}", path.display(), e);
                    (None, None)
                }
            },
            MediaKind::Video => match FfmpegTranscoder::probe_dimensions(path).await {
                Ok((w, h)) => (Some(w), Some(h)),
                Err(e) => {
                    debug!("Could not probe video dimensions of {}: {}", path.display(), e);
                    (None, None)
                }
            },
        };

        let mime_type = match Self::mime_for(path) {
            Some(mime) => mime.to_string(),
            None => {
                warn!(
                    "Unknown mime type for {}, falling back to {}",
                    path.display(),
                    kind.fallback_mime()
                );
                kind.fallback_mime().to_string()
            }
        };

        Ok(Self {
            path: path.to_path_buf(),
            kind,
            width,
            height,
            mime_type,
            byte_size,
        })
    }

    fn extension(path: &Path) -> Option<String> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_lowercase())
    }

    /// Classify a path by extension (case-insensitive)
    pub fn kind_for(path: &Path) -> Option<MediaKind> {
        let ext = Self::extension(path)?;
        if IMAGE_EXTENSIONS.contains(&ext.as_str()) {
            Some(MediaKind::Image)
        } else if VIDEO_EXTENSIONS.contains(&ext.as_str()) {
            Some(MediaKind::Video)
        } else {
            None
        }
    }

    pub fn mime_for(path: &Path) -> Option<&'static str> {
        let mime = match Self::extension(path)?.as_str() {
            "jpg" | "jpeg" => "image/jpeg",
            "png" => "image/png",
            "webp" => "image/webp",
            "gif" => "image/gif",
            "mp4" | "m4v" => "video/mp4",
            "mov" => "video/quicktime",
            "webm" => "video/webm",
            _ => return None,
        };
        Some(mime)
    }

    pub fn is_video(&self) -> bool {
        self.kind == MediaKind::Video
    }

    pub fn is_gif(&self) -> bool {
        self.mime_type == "image/gif"
    }

    /// Width divided by height, when both are known and non-zero
    pub fn aspect_ratio(&self) -> Option<f64> {
        match (self.width, self.height) {
            (Some(w), Some(h)) if w > 0 && h > 0 => Some(w as f64 / h as f64),
            _ => None,
        }
    }

    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .unwrap_or_default()
            .to_string_lossy()
            .to_string()
    }
}
