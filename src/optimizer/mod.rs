//! # Optimizer Module
//!
//! Separa le responsabilità dell'ottimizzazione in sottomoduli:
//! - `size_aware`: Loop "comprimi finché non rientra nel limite"
//! - `image_transform`: Resize + ricodifica JPEG con il crate `image`
//! - `video_transcoder`: Profili video e transcodifica con FFmpeg

pub mod image_transform;
pub mod size_aware;
pub mod video_transcoder;

pub use image_transform::{ImageTransformer, JpegLadderTransformer};
pub use size_aware::{OptimizeReport, SizeAwareOptimizer, IMAGE_LADDER};
pub use video_transcoder::{FfmpegTranscoder, VideoProfile, VideoTranscoder};
