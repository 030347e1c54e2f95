//! # Size Aware Optimizer
//!
//! Trasforma ripetutamente un media finché non rientra nel budget in byte della
//! destinazione, oppure finché i tentativi non sono esauriti.
//!
//! ## Strategia:
//! 1. **Già nel limite**: ritorna l'input invariato (nessuna trasformazione sprecata)
//! 2. **Sotto soglia minima**: i file piccoli non vengono ricompressi
//! 3. **Immagini**: scala decrescente (1600px/q80, 1200px/q70, 1000px/q60),
//!    ogni passata riparte dall'originale, stop appena size ≤ limite
//! 4. **Video**: profilo da aspect ratio + fallback al 70% del bitrate,
//!    accettato appena sotto il tetto; altrimenti warning e risultato più piccolo
//!
//! `optimize` non fallisce mai: su qualsiasi errore ritorna il miglior asset ottenuto.
//! Le passate scartate vengono rimosse subito dalla work dir; il risultato scelto
//! resta su disco finché il chiamante non lo rilascia con `discard`.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::image_transform::ImageTransformer;
use super::video_transcoder::{VideoProfile, VideoTranscoder};
use crate::media::{MediaAsset, MediaKind};
use crate::utils::format_size;

/// Descending (max dimension, JPEG quality) passes
pub const IMAGE_LADDER: &[(u32, u8)] = &[(1600, 80), (1200, 70), (1000, 60)];

/// Result of an optimization run
#[derive(Debug, Clone)]
pub struct OptimizeReport {
    pub asset: MediaAsset,
    /// Number of transform passes that were attempted
    pub passes: usize,
    /// User-facing warning when the result still exceeds the limit
    pub warning: Option<String>,
}

impl OptimizeReport {
    fn unchanged(asset: &MediaAsset) -> Self {
        Self {
            asset: asset.clone(),
            passes: 0,
            warning: None,
        }
    }
}

pub struct SizeAwareOptimizer {
    image: Arc<dyn ImageTransformer>,
    video: Option<Arc<dyn VideoTranscoder>>,
    work_dir: PathBuf,
    min_transform_bytes: u64,
}

impl SizeAwareOptimizer {
    pub fn new(
        image: Arc<dyn ImageTransformer>,
        video: Option<Arc<dyn VideoTranscoder>>,
        work_dir: PathBuf,
        min_transform_bytes: u64,
    ) -> Self {
        Self {
            image,
            video,
            work_dir,
            min_transform_bytes,
        }
    }

    /// Shrink `asset` until it fits `limit_bytes`, returning the best asset obtained
    pub async fn optimize(&self, asset: &MediaAsset, limit_bytes: u64) -> MediaAsset {
        self.optimize_with_report(asset, limit_bytes).await.asset
    }

    pub async fn optimize_with_report(&self, asset: &MediaAsset, limit_bytes: u64) -> OptimizeReport {
        if asset.byte_size <= limit_bytes {
            debug!("{} already fits {} bytes", asset.file_name(), limit_bytes);
            return OptimizeReport::unchanged(asset);
        }

        if asset.byte_size < self.min_transform_bytes {
            debug!("{} below transform threshold, not re-compressing", asset.file_name());
            return OptimizeReport::unchanged(asset);
        }

        match asset.kind {
            MediaKind::Image if asset.is_gif() => {
                // Re-encoding would drop the animation
                OptimizeReport::unchanged(asset)
            }
            MediaKind::Image => self.optimize_image(asset, limit_bytes).await,
            MediaKind::Video => self.optimize_video(asset, limit_bytes).await,
        }
    }

    async fn optimize_image(&self, asset: &MediaAsset, limit_bytes: u64) -> OptimizeReport {
        let mut best = asset.clone();
        let mut passes = 0;

        for &(max_dimension, quality) in IMAGE_LADDER {
            passes += 1;
            match self.image.transform(asset, max_dimension, quality, &self.work_dir).await {
                Ok(candidate) => {
                    best = self.keep_smaller(asset, best, candidate).await;
                    if best.byte_size <= limit_bytes {
                        info!(
                            "🖼️ {} optimized to {} in {} pass(es)",
                            asset.file_name(),
                            format_size(best.byte_size),
                            passes
                        );
                        return OptimizeReport {
                            asset: best,
                            passes,
                            warning: None,
                        };
                    }
                }
                Err(e) => {
                    warn!("Image pass {}px/q{} failed for {}: {}", max_dimension, quality, asset.file_name(), e);
                    break;
                }
            }
        }

        OptimizeReport {
            asset: best,
            passes,
            warning: None,
        }
    }

    async fn optimize_video(&self, asset: &MediaAsset, ceiling_bytes: u64) -> OptimizeReport {
        let Some(transcoder) = self.video.as_ref() else {
            debug!("No video transcoder available, passing {} through", asset.file_name());
            return OptimizeReport::unchanged(asset);
        };

        let profile = VideoProfile::for_asset(asset);
        let attempts = [profile, profile.fallback()];
        let mut best = asset.clone();
        let mut passes = 0;

        for attempt in attempts {
            passes += 1;
            match transcoder.transcode(asset, attempt, &self.work_dir).await {
                Ok(candidate) => {
                    best = self.keep_smaller(asset, best, candidate).await;
                    if best.byte_size <= ceiling_bytes {
                        info!(
                            "🎬 {} compressed to {} at {} kbps",
                            asset.file_name(),
                            format_size(best.byte_size),
                            attempt.bitrate_kbps
                        );
                        return OptimizeReport {
                            asset: best,
                            passes,
                            warning: None,
                        };
                    }
                }
                Err(e) => {
                    warn!("Video pass at {} kbps failed for {}: {}", attempt.bitrate_kbps, asset.file_name(), e);
                }
            }
        }

        let warning = format!(
            "Video is still {} after compression, above the {} limit",
            format_size(best.byte_size),
            format_size(ceiling_bytes)
        );
        warn!("{}", warning);
        OptimizeReport {
            asset: best,
            passes,
            warning: Some(warning),
        }
    }

    /// Keep the smaller of two results, removing the other one from disk
    async fn keep_smaller(&self, original: &MediaAsset, best: MediaAsset, candidate: MediaAsset) -> MediaAsset {
        if candidate.byte_size < best.byte_size {
            self.discard(original, &best).await;
            candidate
        } else {
            self.discard(original, &candidate).await;
            best
        }
    }

    /// Remove an optimized file once it is no longer needed.
    ///
    /// The original is never touched, nor anything outside the work dir.
    pub async fn discard(&self, original: &MediaAsset, optimized: &MediaAsset) {
        if optimized.path == original.path || !is_within(&optimized.path, &self.work_dir) {
            return;
        }
        match tokio::fs::remove_file(&optimized.path).await {
            Ok(()) => debug!("Removed {}", optimized.path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to remove {}: {}", optimized.path.display(), e),
        }
    }
}

fn is_within(path: &Path, dir: &Path) -> bool {
    path.parent().is_some_and(|parent| parent == dir)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::OptimizeError;
    use crate::test_support::{files_in, media_file, SizedOutputTransformer};
    use async_trait::async_trait;
    use std::path::Path;
    use std::sync::Mutex;

    /// Returns scripted sizes per pass; `None` in the script means the pass fails
    struct ScriptedTransformer {
        sizes: Mutex<Vec<Option<u64>>>,
        calls: Mutex<Vec<(u32, u8)>>,
    }

    impl ScriptedTransformer {
        fn new(sizes: Vec<Option<u64>>) -> Arc<Self> {
            Arc::new(Self {
                sizes: Mutex::new(sizes),
                calls: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> Vec<(u32, u8)> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ImageTransformer for ScriptedTransformer {
        async fn transform(
            &self,
            asset: &MediaAsset,
            max_dimension: u32,
            quality: u8,
            _work_dir: &Path,
        ) -> Result<MediaAsset, OptimizeError> {
            self.calls.lock().unwrap().push((max_dimension, quality));
            let next = self.sizes.lock().unwrap().remove(0);
            match next {
                Some(byte_size) => Ok(MediaAsset {
                    path: PathBuf::from(format!("pass-{max_dimension}.jpg")),
                    byte_size,
                    ..asset.clone()
                }),
                None => Err(OptimizeError::FFmpeg("boom".into())),
            }
        }
    }

    struct ScriptedTranscoder {
        sizes: Mutex<Vec<u64>>,
        profiles: Mutex<Vec<VideoProfile>>,
    }

    #[async_trait]
    impl VideoTranscoder for ScriptedTranscoder {
        async fn transcode(
            &self,
            asset: &MediaAsset,
            profile: VideoProfile,
            _work_dir: &Path,
        ) -> Result<MediaAsset, OptimizeError> {
            self.profiles.lock().unwrap().push(profile);
            let byte_size = self.sizes.lock().unwrap().remove(0);
            Ok(MediaAsset {
                path: PathBuf::from(format!("pass-{}.mp4", profile.bitrate_kbps)),
                byte_size,
                ..asset.clone()
            })
        }
    }

    fn asset(kind: MediaKind, byte_size: u64) -> MediaAsset {
        MediaAsset {
            path: PathBuf::from("input"),
            kind,
            width: Some(4000),
            height: Some(3000),
            mime_type: match kind {
                MediaKind::Image => "image/jpeg".into(),
                MediaKind::Video => "video/mp4".into(),
            },
            byte_size,
        }
    }

    fn optimizer(image: Arc<ScriptedTransformer>, video: Option<Arc<ScriptedTranscoder>>) -> SizeAwareOptimizer {
        SizeAwareOptimizer::new(
            image,
            video.map(|v| v as Arc<dyn VideoTranscoder>),
            PathBuf::from("/tmp"),
            1_000,
        )
    }

    #[tokio::test]
    async fn test_under_limit_is_unchanged() {
        let transformer = ScriptedTransformer::new(vec![]);
        let input = asset(MediaKind::Image, 2 * 1024 * 1024);

        let out = optimizer(transformer.clone(), None).optimize(&input, 5 * 1024 * 1024).await;

        assert_eq!(out, input);
        assert!(transformer.calls().is_empty());
    }

    #[tokio::test]
    async fn test_small_files_are_not_recompressed() {
        let transformer = ScriptedTransformer::new(vec![]);
        let input = asset(MediaKind::Image, 900);

        let out = optimizer(transformer.clone(), None).optimize(&input, 500).await;

        assert_eq!(out, input);
        assert!(transformer.calls().is_empty());
    }

    #[tokio::test]
    async fn test_ladder_stops_when_under_limit() {
        let transformer = ScriptedTransformer::new(vec![Some(8_000), Some(4_000), Some(1_000)]);
        let input = asset(MediaKind::Image, 10_000);

        let report = optimizer(transformer.clone(), None)
            .optimize_with_report(&input, 5_000)
            .await;

        assert_eq!(report.asset.byte_size, 4_000);
        assert_eq!(report.passes, 2);
        assert_eq!(transformer.calls(), vec![(1600, 80), (1200, 70)]);
    }

    #[tokio::test]
    async fn test_exhausted_ladder_returns_smallest() {
        let transformer = ScriptedTransformer::new(vec![Some(9_000), Some(7_000), Some(7_500)]);
        let input = asset(MediaKind::Image, 10_000);

        let out = optimizer(transformer.clone(), None).optimize(&input, 5_000).await;

        assert_eq!(out.byte_size, 7_000);
        assert_eq!(transformer.calls().len(), IMAGE_LADDER.len());
    }

    #[tokio::test]
    async fn test_transform_error_returns_best_so_far() {
        let transformer = ScriptedTransformer::new(vec![Some(9_000), None, Some(1_000)]);
        let input = asset(MediaKind::Image, 10_000);

        let out = optimizer(transformer.clone(), None).optimize(&input, 5_000).await;

        assert_eq!(out.byte_size, 9_000);
        assert_eq!(transformer.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_rejected_passes_are_removed_from_work_dir() {
        let media = tempfile::TempDir::new().unwrap();
        let work = tempfile::TempDir::new().unwrap();
        let input = media_file(&media, "photo.jpg", 12_000);
        let optimizer = SizeAwareOptimizer::new(
            Arc::new(SizedOutputTransformer::new(vec![11_000, 9_000, 9_500])),
            None,
            work.path().to_path_buf(),
            1_000,
        );

        let report = optimizer.optimize_with_report(&input, 5_000).await;

        assert_eq!(report.passes, 3);
        assert_eq!(report.asset.byte_size, 9_000);
        let remaining = files_in(work.path());
        assert_eq!(remaining.len(), 1);
        assert!(report.asset.path.ends_with(&remaining[0]));

        optimizer.discard(&input, &report.asset).await;
        assert!(files_in(work.path()).is_empty());
        assert!(input.path.exists());
    }

    #[tokio::test]
    async fn test_discard_never_removes_the_original() {
        let dir = tempfile::TempDir::new().unwrap();
        let input = media_file(&dir, "photo.jpg", 2_000);
        let optimizer = SizeAwareOptimizer::new(
            Arc::new(SizedOutputTransformer::new(vec![])),
            None,
            dir.path().to_path_buf(),
            1_000,
        );

        optimizer.discard(&input, &input).await;

        assert!(input.path.exists());
    }

    #[tokio::test]
    async fn test_video_without_transcoder_passes_through() {
        let input = asset(MediaKind::Video, 900_000_000);
        let out = optimizer(ScriptedTransformer::new(vec![]), None)
            .optimize(&input, 512 * 1024 * 1024)
            .await;
        assert_eq!(out, input);
    }

    #[tokio::test]
    async fn test_video_fallback_bitrate() {
        let transcoder = Arc::new(ScriptedTranscoder {
            sizes: Mutex::new(vec![600, 400]),
            profiles: Mutex::new(Vec::new()),
        });
        let input = asset(MediaKind::Video, 2_000);

        let report = optimizer(ScriptedTransformer::new(vec![]), Some(transcoder.clone()))
            .optimize_with_report(&input, 500)
            .await;

        assert_eq!(report.asset.byte_size, 400);
        assert!(report.warning.is_none());
        let profiles = transcoder.profiles.lock().unwrap().clone();
        assert_eq!(profiles, vec![VideoProfile::RECTANGULAR, VideoProfile::RECTANGULAR.fallback()]);
    }

    #[tokio::test]
    async fn test_video_over_ceiling_warns_with_smallest() {
        let transcoder = Arc::new(ScriptedTranscoder {
            sizes: Mutex::new(vec![1_500, 1_200]),
            profiles: Mutex::new(Vec::new()),
        });
        let input = asset(MediaKind::Video, 2_000);

        let report = optimizer(ScriptedTransformer::new(vec![]), Some(transcoder))
            .optimize_with_report(&input, 500)
            .await;

        assert_eq!(report.asset.byte_size, 1_200);
        assert!(report.warning.is_some());
    }
}
