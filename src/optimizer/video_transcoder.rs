//! # Video Transcoder Module
//!
//! Questo modulo gestisce la compressione video necessaria per rientrare nel
//! limite della destinazione.
//!
//! ## Responsabilità:
//! - Calcolo del profilo target (lato massimo, bitrate) dall'aspect ratio
//! - Profilo di fallback al ~70% del bitrate
//! - Compressione con FFmpeg (H.264 + AAC, `+faststart`)
//! - Analisi dimensioni con ffprobe
//!
//! ## Profili:
//! - **Quadrato** (aspect ratio entro il 10% di 1:1): 1080px, 3500 kbps
//! - **Landscape / portrait**: 1280px, 5000 kbps
//!
//! Se FFmpeg non è disponibile il transcoder non viene creato e l'optimizer
//! lascia passare il video invariato.

use async_trait::async_trait;
use std::path::Path;
use tokio::process::Command;
use tracing::debug;

use crate::args;
use crate::error::OptimizeError;
use crate::media::{MediaAsset, MediaKind};
use crate::platform::PlatformCommands;

/// Target encoding profile for one compression attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoProfile {
    pub max_side: u32,
    pub bitrate_kbps: u32,
}

impl VideoProfile {
    pub const SQUARE: VideoProfile = VideoProfile { max_side: 1080, bitrate_kbps: 3500 };
    pub const RECTANGULAR: VideoProfile = VideoProfile { max_side: 1280, bitrate_kbps: 5000 };

    /// Pick the profile from the asset's aspect ratio (unknown = rectangular)
    pub fn for_asset(asset: &MediaAsset) -> Self {
        match asset.aspect_ratio() {
            Some(ratio) if (ratio - 1.0).abs() <= 0.1 => Self::SQUARE,
            _ => Self::RECTANGULAR,
        }
    }

    /// Same size, ~70% of the bitrate
    pub fn fallback(&self) -> Self {
        Self {
            max_side: self.max_side,
            bitrate_kbps: self.bitrate_kbps * 7 / 10,
        }
    }

    /// ffmpeg scale filter bounding the longest side, keeping even dimensions
    fn scale_filter(&self) -> String {
        format!(
            "scale='if(gt(iw,ih),min(iw,{side}),-2)':'if(gt(iw,ih),-2,min(ih,{side}))'",
            side = self.max_side
        )
    }
}

/// Compresses a video to a profile, producing a new asset
#[async_trait]
pub trait VideoTranscoder: Send + Sync {
    async fn transcode(
        &self,
        asset: &MediaAsset,
        profile: VideoProfile,
        work_dir: &Path,
    ) -> Result<MediaAsset, OptimizeError>;
}

/// FFmpeg backed transcoder
#[derive(Debug, Default, Clone, Copy)]
pub struct FfmpegTranscoder;

impl FfmpegTranscoder {
    /// Returns a transcoder only when ffmpeg is installed
    pub async fn detect() -> Option<Self> {
        if PlatformCommands::instance().is_command_available("ffmpeg").await {
            Some(Self)
        } else {
            debug!("ffmpeg not found, videos will be uploaded as-is");
            None
        }
    }

    /// Width and height of the first video stream, via ffprobe
    pub async fn probe_dimensions(path: &Path) -> Result<(u32, u32), OptimizeError> {
        let platform = PlatformCommands::instance();
        if !platform.is_command_available("ffprobe").await {
            return Err(OptimizeError::MissingDependency("ffprobe".to_string()));
        }

        let output = Command::new(platform.get_command("ffprobe"))
            .args(args![
                "-v", "quiet",
                "-print_format", "json",
                "-show_streams",
                "-select_streams", "v:0",
                path.to_string_lossy(),
            ])
            .output()
            .await?;

        if !output.status.success() {
            return Err(OptimizeError::FFmpeg(
                String::from_utf8_lossy(&output.stderr).to_string(),
            ));
        }

        let info: serde_json::Value = serde_json::from_slice(&output.stdout)
            .map_err(|e| OptimizeError::FFmpeg(format!("unreadable ffprobe output: {e}")))?;
        let stream = &info["streams"][0];
        match (stream["width"].as_u64(), stream["height"].as_u64()) {
            (Some(w), Some(h)) => Ok((w as u32, h as u32)),
            _ => Err(OptimizeError::FFmpeg("no video stream".to_string())),
        }
    }
}

#[async_trait]
impl VideoTranscoder for FfmpegTranscoder {
    async fn transcode(
        &self,
        asset: &MediaAsset,
        profile: VideoProfile,
        work_dir: &Path,
    ) -> Result<MediaAsset, OptimizeError> {
        let output_path = tempfile::Builder::new()
            .prefix("optimized-")
            .suffix(".mp4")
            .tempfile_in(work_dir)?
            .into_temp_path()
            .keep()
            .map_err(|e| OptimizeError::Io(e.error))?;

        let bitrate = format!("{}k", profile.bitrate_kbps);
        let bufsize = format!("{}k", profile.bitrate_kbps * 2);

        let mut cmd = Command::new(PlatformCommands::instance().get_command("ffmpeg"));
        if !tracing::enabled!(tracing::Level::DEBUG) {
            cmd.args(["-loglevel", "warning"]);
        }
        cmd.args(args![
            "-i", asset.path.to_string_lossy(),
            "-vf", profile.scale_filter(),
            "-c:v", "libx264",
            "-preset", "veryfast",
            "-b:v", bitrate,
            "-maxrate", bitrate,
            "-bufsize", bufsize,
            "-pix_fmt", "yuv420p",
            "-c:a", "aac",
            "-b:a", "128k",
            "-movflags", "+faststart",
            "-y", output_path.to_string_lossy(),
        ]);

        let start_time = std::time::Instant::now();
        let output = cmd.output().await?;
        if !output.status.success() {
            let _ = tokio::fs::remove_file(&output_path).await;
            return Err(OptimizeError::FFmpeg(
                String::from_utf8_lossy(&output.stderr).to_string(),
            ));
        }

        let byte_size = tokio::fs::metadata(&output_path).await?.len();
        debug!(
            "🎬 Video pass {}px/{}kbps done in {:.1}s: {} -> {} bytes",
            profile.max_side,
            profile.bitrate_kbps,
            start_time.elapsed().as_secs_f64(),
            asset.byte_size,
            byte_size
        );

        let (width, height) = match Self::probe_dimensions(&output_path).await {
            Ok((w, h)) => (Some(w), Some(h)),
            Err(_) => (None, None),
        };

        Ok(MediaAsset {
            path: output_path,
            kind: MediaKind::Video,
            width,
            height,
            mime_type: "video/mp4".to_string(),
            byte_size,
        })
    }
}
