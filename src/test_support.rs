//! In-memory stand-ins for the destination APIs plus small fixtures.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::Notify;

use crate::config::Config;
use crate::credentials::{BlueskyCredentials, Credentials, TwitterCredentials};
use crate::error::{CrossPostError, OptimizeError};
use crate::media::{MediaAsset, MediaKind};
use crate::optimizer::ImageTransformer;
use crate::upload::chunked::{ChunkedMediaApi, InitRequest, MediaUploadResponse, ProcessingInfo, ProcessingState};
use crate::upload::single_shot::{BlobApi, Session};
use crate::upload::BlobRef;

pub fn test_config() -> Config {
    Config {
        small_chunk_bytes: 1000,
        large_chunk_bytes: 4000,
        bluesky_image_limit_bytes: 3 * 1024 * 1024,
        ..Config::default()
    }
}

pub fn twitter_credentials() -> TwitterCredentials {
    TwitterCredentials {
        consumer_key: "consumer-key".into(),
        consumer_secret: "consumer-secret".into(),
        access_token: "access-token".into(),
        access_secret: "access-secret".into(),
    }
}

pub fn bluesky_credentials() -> BlueskyCredentials {
    BlueskyCredentials {
        identifier: "tester.bsky.social".into(),
        password: "app-password".into(),
    }
}

pub fn all_credentials() -> Credentials {
    Credentials {
        twitter: Some(twitter_credentials()),
        bluesky: Some(bluesky_credentials()),
    }
}

/// Write `size` filler bytes to `dir/name` and describe them as an asset
pub fn media_file(dir: &TempDir, name: &str, size: usize) -> MediaAsset {
    let path = dir.path().join(name);
    let data: Vec<u8> = (0..size).map(|i| (i % 251) as u8).collect();
    std::fs::write(&path, data).unwrap();
    asset_at(&path, size as u64)
}

/// Lists the file names currently in `dir`, sorted
pub fn files_in(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

/// Image transform that writes one real file per pass, sized from a script
pub struct SizedOutputTransformer {
    sizes: Mutex<VecDeque<usize>>,
}

impl SizedOutputTransformer {
    pub fn new(sizes: Vec<usize>) -> Self {
        Self {
            sizes: Mutex::new(sizes.into()),
        }
    }
}

#[async_trait]
impl ImageTransformer for SizedOutputTransformer {
    async fn transform(
        &self,
        asset: &MediaAsset,
        _max_dimension: u32,
        _quality: u8,
        work_dir: &Path,
    ) -> Result<MediaAsset, OptimizeError> {
        let size = self
            .sizes
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| OptimizeError::Task("no scripted pass left".into()))?;
        let (mut file, path) = tempfile::Builder::new()
            .prefix("optimized-")
            .suffix(".jpg")
            .tempfile_in(work_dir)?
            .keep()
            .map_err(|e| OptimizeError::Io(e.error))?;
        std::io::Write::write_all(&mut file, &vec![0xAB; size])?;
        Ok(MediaAsset {
            path,
            byte_size: size as u64,
            mime_type: "image/jpeg".into(),
            ..asset.clone()
        })
    }
}

fn asset_at(path: &Path, byte_size: u64) -> MediaAsset {
    let kind = MediaAsset::kind_for(path).unwrap_or(MediaKind::Image);
    MediaAsset {
        path: path.to_path_buf(),
        kind,
        width: None,
        height: None,
        mime_type: MediaAsset::mime_for(path).unwrap_or(kind.fallback_mime()).to_string(),
        byte_size,
    }
}

#[derive(Default)]
pub struct MockTwitterApi {
    init_calls: AtomicUsize,
    finalize_calls: AtomicUsize,
    status_calls: AtomicUsize,
    appended: Mutex<Vec<(String, usize, usize)>>,
    tweets: Mutex<Vec<(String, Vec<String>)>>,
    processing: Mutex<VecDeque<ProcessingState>>,
    shuffled: bool,
    fail_append_at: Option<usize>,
    hold_first_init: bool,
    init_gate: Notify,
    fail_tweet: bool,
}

impl MockTwitterApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Later segments finish first
    pub fn with_shuffled_appends(mut self) -> Self {
        self.shuffled = true;
        self
    }

    pub fn failing_append_at(mut self, segment_index: usize) -> Self {
        self.fail_append_at = Some(segment_index);
        self
    }

    /// FINALIZE reports the first state, each STATUS the next one
    pub fn with_processing(self, states: Vec<ProcessingState>) -> Self {
        *self.processing.lock().unwrap() = states.into();
        self
    }

    /// The first INIT waits until `release_held_init` (or forever)
    pub fn holding_first_init(mut self) -> Self {
        self.hold_first_init = true;
        self
    }

    pub fn failing_tweet(mut self) -> Self {
        self.fail_tweet = true;
        self
    }

    pub fn release_held_init(&self) {
        self.init_gate.notify_one();
    }

    pub fn appended(&self) -> Vec<(String, usize, usize)> {
        self.appended.lock().unwrap().clone()
    }

    pub fn tweets(&self) -> Vec<(String, Vec<String>)> {
        self.tweets.lock().unwrap().clone()
    }

    pub fn init_calls(&self) -> usize {
        self.init_calls.load(Ordering::SeqCst)
    }

    pub fn finalize_calls(&self) -> usize {
        self.finalize_calls.load(Ordering::SeqCst)
    }

    pub fn status_calls(&self) -> usize {
        self.status_calls.load(Ordering::SeqCst)
    }

    fn next_processing(&self) -> Option<ProcessingInfo> {
        let state = self.processing.lock().unwrap().pop_front()?;
        Some(ProcessingInfo {
            state,
            check_after_secs: Some(1),
            progress_percent: None,
            error: None,
        })
    }
}

#[async_trait]
impl ChunkedMediaApi for MockTwitterApi {
    async fn init(
        &self,
        _credentials: &TwitterCredentials,
        _request: &InitRequest,
    ) -> Result<MediaUploadResponse, CrossPostError> {
        let call = self.init_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.hold_first_init && call == 1 {
            self.init_gate.notified().await;
        }
        Ok(MediaUploadResponse {
            media_id_string: format!("media-{call}"),
            processing_info: None,
        })
    }

    async fn append(
        &self,
        _credentials: &TwitterCredentials,
        media_id: &str,
        segment_index: usize,
        chunk: Vec<u8>,
    ) -> Result<(), CrossPostError> {
        if self.shuffled {
            tokio::time::sleep(Duration::from_millis(8 - (segment_index % 8) as u64)).await;
        }
        if self.fail_append_at == Some(segment_index) {
            return Err(CrossPostError::Transport("connection reset".into()));
        }
        self.appended
            .lock()
            .unwrap()
            .push((media_id.to_string(), segment_index, chunk.len()));
        Ok(())
    }

    async fn finalize(
        &self,
        _credentials: &TwitterCredentials,
        media_id: &str,
    ) -> Result<MediaUploadResponse, CrossPostError> {
        self.finalize_calls.fetch_add(1, Ordering::SeqCst);
        Ok(MediaUploadResponse {
            media_id_string: media_id.to_string(),
            processing_info: self.next_processing(),
        })
    }

    async fn status(
        &self,
        _credentials: &TwitterCredentials,
        media_id: &str,
    ) -> Result<MediaUploadResponse, CrossPostError> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        let info = self.next_processing().unwrap_or(ProcessingInfo {
            state: ProcessingState::Succeeded,
            check_after_secs: None,
            progress_percent: Some(100),
            error: None,
        });
        Ok(MediaUploadResponse {
            media_id_string: media_id.to_string(),
            processing_info: Some(info),
        })
    }

    async fn create_tweet(
        &self,
        _credentials: &TwitterCredentials,
        text: &str,
        media_ids: &[String],
    ) -> Result<String, CrossPostError> {
        if self.fail_tweet {
            return Err(CrossPostError::Protocol("HTTP 403 Forbidden".into()));
        }
        let mut tweets = self.tweets.lock().unwrap();
        tweets.push((text.to_string(), media_ids.to_vec()));
        Ok(format!("tweet-{}", tweets.len()))
    }
}

#[derive(Default)]
pub struct MockBlobApi {
    login_calls: AtomicUsize,
    upload_calls: AtomicUsize,
    records: Mutex<Vec<serde_json::Value>>,
    fail_upload: bool,
    fail_record: bool,
}

impl MockBlobApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_upload(mut self) -> Self {
        self.fail_upload = true;
        self
    }

    pub fn failing_record(mut self) -> Self {
        self.fail_record = true;
        self
    }

    pub fn login_calls(&self) -> usize {
        self.login_calls.load(Ordering::SeqCst)
    }

    pub fn upload_calls(&self) -> usize {
        self.upload_calls.load(Ordering::SeqCst)
    }

    pub fn records(&self) -> Vec<serde_json::Value> {
        self.records.lock().unwrap().clone()
    }
}

#[async_trait]
impl BlobApi for MockBlobApi {
    async fn create_session(&self, identifier: &str, _password: &str) -> Result<Session, CrossPostError> {
        self.login_calls.fetch_add(1, Ordering::SeqCst);
        Ok(Session {
            access_jwt: "jwt".into(),
            did: "did:plc:tester".into(),
            handle: identifier.to_string(),
        })
    }

    async fn upload_blob(
        &self,
        _session: &Session,
        data: Vec<u8>,
        mime_type: &str,
    ) -> Result<BlobRef, CrossPostError> {
        let call = self.upload_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_upload {
            return Err(CrossPostError::Transport("connection reset".into()));
        }
        Ok(BlobRef {
            link: format!("bafkrei-{call}"),
            mime_type: mime_type.to_string(),
            size: data.len() as u64,
        })
    }

    async fn create_record(
        &self,
        session: &Session,
        collection: &str,
        record: serde_json::Value,
    ) -> Result<String, CrossPostError> {
        if self.fail_record {
            return Err(CrossPostError::Protocol("HTTP 400 InvalidRequest".into()));
        }
        let mut records = self.records.lock().unwrap();
        records.push(record);
        Ok(format!("at://{}/{}/{}", session.did, collection, records.len()))
    }
}
