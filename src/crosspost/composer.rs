//! # Composer Actor
//!
//! Un task tokio per sessione di composizione: l'unico flusso sequenziale che
//! modifica bozza, generazione e handle in cache.
//!
//! ## Responsabilità:
//! - Avvia le upload anticipate appena viene selezionato un media
//! - Scarta i risultati di generazioni superate (nessuna mutazione, nessun errore)
//! - Accoda una richiesta di post finché le upload della generazione corrente
//!   non si concludono; la scarta se una nuova selezione la supera
//! - Disattiva Bluesky quando non è eleggibile, con un motivo visibile
//! - Dopo un post riuscito azzera la bozza; dopo un fallimento la conserva
//!
//! ## Flusso dei messaggi:
//! - `ComposerHandle` → comandi (mpsc) → attore
//! - Task di upload/post → messaggi interni (mpsc) → attore
//! - Attore → `ComposerEvent` verso il livello di presentazione

use anyhow::{anyhow, Result};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::coordinator::{
    CachedHandles, CrossPostCoordinator, DestinationToggles, Ineligibility, PostOutcome, PublishRequest, PublishResult,
};
use crate::credentials::Credentials;
use crate::error::CrossPostError;
use crate::media::MediaAsset;
use crate::session::{AttemptState, Generation, UploadSessionCoordinator};
use crate::upload::{Destination, UploadControl, UploadHandle};

/// Reply to a post request
#[derive(Debug, Clone, PartialEq)]
pub enum PublishReport {
    Completed(PostOutcome),
    /// Rejected before posting: empty content, missing credentials, over-limit content
    Rejected(CrossPostError),
    /// A newer media selection replaced the one this request was made for
    Superseded,
    /// Another post is still running
    Busy,
}

/// Notifications for the presentation layer
#[derive(Debug, Clone, PartialEq)]
pub enum ComposerEvent {
    UploadProgress { destination: Destination, fraction: f64 },
    UploadSettled { destination: Destination, error: Option<String> },
    OptimizerWarning { destination: Destination, message: String },
    BlueskyForcedOff { reason: String },
    PostQueued,
    PublishFinished(PostOutcome),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ComposerSnapshot {
    pub generation: Generation,
    pub text: String,
    pub asset: Option<MediaAsset>,
    pub bluesky_enabled: bool,
    pub bluesky_block_reason: Option<String>,
    pub handles: CachedHandles,
    pub uploads_in_flight: usize,
    pub post_queued: bool,
    pub posting: bool,
}

enum Command {
    SelectMedia(MediaAsset),
    RemoveMedia,
    SetText(String),
    SetBlueskyEnabled(bool, oneshot::Sender<Result<(), String>>),
    RequestPost(oneshot::Sender<PublishReport>),
    Snapshot(oneshot::Sender<ComposerSnapshot>),
    Shutdown,
}

#[derive(Debug)]
enum Internal {
    Progress {
        generation: Generation,
        destination: Destination,
        fraction: f64,
    },
    UploadStarted {
        generation: Generation,
        destination: Destination,
    },
    UploadSettled {
        generation: Generation,
        destination: Destination,
        result: Result<(UploadHandle, Option<String>), CrossPostError>,
    },
    PublishFinished {
        generation: Generation,
        result: Result<PublishResult, CrossPostError>,
    },
}

struct PendingPost {
    generation: Generation,
    reply: oneshot::Sender<PublishReport>,
}

struct RunningPost {
    generation: Generation,
    reply: oneshot::Sender<PublishReport>,
    cancel: CancellationToken,
}

/// Cloneable front-end to a running composer
#[derive(Clone)]
pub struct ComposerHandle {
    commands: mpsc::UnboundedSender<Command>,
}

impl ComposerHandle {
    fn send(&self, command: Command) -> Result<()> {
        self.commands
            .send(command)
            .map_err(|_| anyhow!("composer has shut down"))
    }

    pub fn select_media(&self, asset: MediaAsset) -> Result<()> {
        self.send(Command::SelectMedia(asset))
    }

    pub fn remove_media(&self) -> Result<()> {
        self.send(Command::RemoveMedia)
    }

    pub fn set_text(&self, text: impl Into<String>) -> Result<()> {
        self.send(Command::SetText(text.into()))
    }

    /// `Err(reason)` inside when Bluesky cannot be enabled for the current draft
    pub async fn set_bluesky_enabled(&self, enabled: bool) -> Result<std::result::Result<(), String>> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::SetBlueskyEnabled(enabled, tx))?;
        Ok(rx.await?)
    }

    /// Resolves once the post ran, was rejected, or got superseded
    pub async fn request_post(&self) -> Result<PublishReport> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::RequestPost(tx))?;
        Ok(rx.await?)
    }

    pub async fn snapshot(&self) -> Result<ComposerSnapshot> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Snapshot(tx))?;
        Ok(rx.await?)
    }

    pub fn shutdown(&self) -> Result<()> {
        self.send(Command::Shutdown)
    }
}

pub struct Composer {
    coordinator: Arc<CrossPostCoordinator>,
    credentials: Arc<Credentials>,
    session: UploadSessionCoordinator,
    text: String,
    asset: Option<MediaAsset>,
    bluesky_enabled: bool,
    bluesky_block: Option<Ineligibility>,
    handles: CachedHandles,
    queued: Option<PendingPost>,
    running: Option<RunningPost>,
    internal: mpsc::UnboundedSender<Internal>,
    events: mpsc::UnboundedSender<ComposerEvent>,
}

impl Composer {
    /// Start the actor; events arrive on the returned receiver
    pub fn spawn(
        coordinator: Arc<CrossPostCoordinator>,
        credentials: Credentials,
    ) -> (ComposerHandle, mpsc::UnboundedReceiver<ComposerEvent>, JoinHandle<()>) {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (composer, internal_rx, events_rx) = Self::new(coordinator, credentials);
        let task = tokio::spawn(composer.run(command_rx, internal_rx));
        (ComposerHandle { commands: command_tx }, events_rx, task)
    }

    fn new(
        coordinator: Arc<CrossPostCoordinator>,
        credentials: Credentials,
    ) -> (Self, mpsc::UnboundedReceiver<Internal>, mpsc::UnboundedReceiver<ComposerEvent>) {
        let (internal_tx, internal_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let mut session = UploadSessionCoordinator::new();
        session.begin_attempt();
        let composer = Self {
            coordinator,
            credentials: Arc::new(credentials),
            session,
            text: String::new(),
            asset: None,
            bluesky_enabled: true,
            bluesky_block: None,
            handles: CachedHandles::default(),
            queued: None,
            running: None,
            internal: internal_tx,
            events: events_tx,
        };
        (composer, internal_rx, events_rx)
    }

    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut internal: mpsc::UnboundedReceiver<Internal>,
    ) {
        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::Shutdown) | None => break,
                    Some(command) => self.handle_command(command),
                },
                Some(message) = internal.recv() => self.handle_internal(message),
            }
        }
        self.teardown();
    }

    fn emit(&self, event: ComposerEvent) {
        // Nobody listening is fine
        let _ = self.events.send(event);
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::SelectMedia(asset) => self.select_media(Some(asset)),
            Command::RemoveMedia => self.select_media(None),
            Command::SetText(text) => {
                self.text = text;
                self.refresh_eligibility();
            }
            Command::SetBlueskyEnabled(enabled, reply) => {
                let _ = reply.send(self.set_bluesky_enabled(enabled));
            }
            Command::RequestPost(reply) => self.request_post(reply),
            Command::Snapshot(reply) => {
                let _ = reply.send(self.snapshot());
            }
            Command::Shutdown => {}
        }
    }

    fn handle_internal(&mut self, message: Internal) {
        match message {
            Internal::Progress {
                generation,
                destination,
                fraction,
            } => {
                if self.session.is_current(generation) {
                    self.emit(ComposerEvent::UploadProgress { destination, fraction });
                }
            }
            Internal::UploadStarted {
                generation,
                destination,
            } => {
                self.session.mark_uploading(generation, destination);
            }
            Internal::UploadSettled {
                generation,
                destination,
                result,
            } => self.upload_settled(generation, destination, result),
            Internal::PublishFinished { generation, result } => self.publish_finished(generation, result),
        }
    }

    /// New selection (or removal): cancel everything tied to the old one
    fn select_media(&mut self, asset: Option<MediaAsset>) {
        self.session.cancel_all();
        let generation = self.session.begin_attempt();
        self.handles = CachedHandles::default();
        if let Some(queued) = self.queued.take() {
            let _ = queued.reply.send(PublishReport::Superseded);
        }

        self.asset = asset;
        self.refresh_eligibility();

        if let Some(asset) = self.asset.clone() {
            info!("📎 Selected {} (generation {})", asset.file_name(), generation);
            self.start_upload(generation, Destination::Twitter, &asset);
            if self.bluesky_enabled {
                self.start_upload(generation, Destination::Bluesky, &asset);
            }
        }
    }

    fn refresh_eligibility(&mut self) {
        match self.coordinator.bluesky_eligibility(&self.text, self.asset.as_ref()) {
            Ok(()) => self.bluesky_block = None,
            Err(block) => {
                let newly_blocked = !self.bluesky_block.as_ref().is_some_and(|b| b.same_kind(&block));
                let reason = block.to_string();
                self.bluesky_block = Some(block);
                if self.bluesky_enabled || newly_blocked {
                    self.bluesky_enabled = false;
                    self.emit(ComposerEvent::BlueskyForcedOff { reason });
                }
            }
        }
    }

    fn set_bluesky_enabled(&mut self, enabled: bool) -> std::result::Result<(), String> {
        if enabled {
            if let Some(block) = &self.bluesky_block {
                return Err(block.to_string());
            }
        }
        self.bluesky_enabled = enabled;

        let generation = self.session.current();
        let needs_upload = enabled
            && self.handles.bluesky_blob.is_none()
            && self.session.attempt(generation, Destination::Bluesky).is_none();
        if let (true, Some(asset)) = (needs_upload, self.asset.clone()) {
            self.start_upload(generation, Destination::Bluesky, &asset);
        }
        Ok(())
    }

    fn start_upload(&mut self, generation: Generation, destination: Destination, asset: &MediaAsset) {
        let has_credentials = match destination {
            Destination::Twitter => self.credentials.twitter.is_some(),
            Destination::Bluesky => self.credentials.bluesky.is_some(),
        };
        if !has_credentials {
            debug!("No {} credentials, leaving the upload for post time", destination);
            return;
        }

        let cancel = CancellationToken::new();
        if !self.session.track_cancelable(generation, destination, cancel.clone()) {
            return;
        }

        let progress_tx = self.internal.clone();
        let control = UploadControl::new(cancel).with_progress(Arc::new(move |fraction| {
            let _ = progress_tx.send(Internal::Progress {
                generation,
                destination,
                fraction,
            });
        }));

        let coordinator = self.coordinator.clone();
        let credentials = self.credentials.clone();
        let internal = self.internal.clone();
        let asset = asset.clone();
        tokio::spawn(async move {
            let _ = internal.send(Internal::UploadStarted {
                generation,
                destination,
            });
            let result = coordinator
                .upload_for(destination, &asset, &credentials, &control)
                .await
                .map(|prepared| (prepared.handle, prepared.warning));
            let _ = internal.send(Internal::UploadSettled {
                generation,
                destination,
                result,
            });
        });
    }

    fn upload_settled(
        &mut self,
        generation: Generation,
        destination: Destination,
        result: Result<(UploadHandle, Option<String>), CrossPostError>,
    ) {
        let state = AttemptState::from_result(&result.clone().map(|(handle, _)| handle));
        if !self.session.settle(generation, destination, state) {
            return;
        }

        match result {
            Ok((handle, warning)) => {
                if let Some(message) = warning {
                    self.emit(ComposerEvent::OptimizerWarning { destination, message });
                }
                self.handles.store(handle);
                self.emit(ComposerEvent::UploadSettled {
                    destination,
                    error: None,
                });
            }
            Err(CrossPostError::Canceled) => {}
            Err(e) => {
                // Eager uploads never block composing; post time retries inline
                warn!("Eager {} upload failed: {}", destination, e);
                self.emit(ComposerEvent::UploadSettled {
                    destination,
                    error: Some(e.to_string()),
                });
            }
        }

        if self.session.in_flight(generation) == 0 {
            if let Some(queued) = self.queued.take() {
                debug!("Uploads for generation {} settled, running queued post", generation);
                self.start_publish(queued.generation, queued.reply);
            }
        }
    }

    fn request_post(&mut self, reply: oneshot::Sender<PublishReport>) {
        if self.running.is_some() {
            let _ = reply.send(PublishReport::Busy);
            return;
        }
        if self.text.trim().is_empty() && self.asset.is_none() {
            let error = CrossPostError::Validation("nothing to post: add text or media".into());
            let _ = reply.send(PublishReport::Rejected(error));
            return;
        }
        if self.credentials.twitter.is_none() {
            let error = CrossPostError::Credential("Twitter credentials are not configured".into());
            let _ = reply.send(PublishReport::Rejected(error));
            return;
        }

        let generation = self.session.current();
        if self.asset.is_some() && self.session.in_flight(generation) > 0 {
            if let Some(previous) = self.queued.replace(PendingPost { generation, reply }) {
                let _ = previous.reply.send(PublishReport::Superseded);
            }
            info!("⏳ Uploads still running, post queued");
            self.emit(ComposerEvent::PostQueued);
            return;
        }
        self.start_publish(generation, reply);
    }

    fn start_publish(&mut self, generation: Generation, reply: oneshot::Sender<PublishReport>) {
        if !self.session.is_current(generation) {
            let _ = reply.send(PublishReport::Superseded);
            return;
        }

        let request = PublishRequest {
            text: self.text.clone(),
            asset: self.asset.clone(),
            toggles: DestinationToggles {
                bluesky: self.bluesky_enabled,
            },
            cached: self.handles.clone(),
        };
        let cancel = CancellationToken::new();
        self.running = Some(RunningPost {
            generation,
            reply,
            cancel: cancel.clone(),
        });

        let coordinator = self.coordinator.clone();
        let credentials = self.credentials.clone();
        let internal = self.internal.clone();
        tokio::spawn(async move {
            let result = coordinator.publish(request, &credentials, &cancel).await;
            let _ = internal.send(Internal::PublishFinished { generation, result });
        });
    }

    fn publish_finished(&mut self, generation: Generation, result: Result<PublishResult, CrossPostError>) {
        let Some(running) = self.running.take() else {
            return;
        };
        if running.generation != generation || !self.session.is_current(generation) {
            debug!("Dropping stale publish result from generation {}", generation);
            let _ = running.reply.send(PublishReport::Superseded);
            return;
        }

        let report = match result {
            Ok(result) => {
                let outcome = result.outcome;
                if outcome.twitter.is_posted() {
                    self.reset_draft();
                } else {
                    // keep the draft and the handles for a retry
                    self.handles = result.handles;
                }
                self.emit(ComposerEvent::PublishFinished(outcome.clone()));
                PublishReport::Completed(outcome)
            }
            Err(e) => PublishReport::Rejected(e),
        };
        let _ = running.reply.send(report);
    }

    fn reset_draft(&mut self) {
        self.session.cancel_all();
        self.session.begin_attempt();
        self.text.clear();
        self.asset = None;
        self.handles = CachedHandles::default();
        self.bluesky_enabled = true;
        self.bluesky_block = None;
    }

    fn snapshot(&self) -> ComposerSnapshot {
        let generation = self.session.current();
        ComposerSnapshot {
            generation,
            text: self.text.clone(),
            asset: self.asset.clone(),
            bluesky_enabled: self.bluesky_enabled,
            bluesky_block_reason: self.bluesky_block.as_ref().map(ToString::to_string),
            handles: self.handles.clone(),
            uploads_in_flight: self.session.in_flight(generation),
            post_queued: self.queued.is_some(),
            posting: self.running.is_some(),
        }
    }

    fn teardown(&mut self) {
        self.session.cancel_all();
        if let Some(running) = self.running.take() {
            running.cancel.cancel();
            let _ = running.reply.send(PublishReport::Superseded);
        }
        if let Some(queued) = self.queued.take() {
            let _ = queued.reply.send(PublishReport::Superseded);
        }
        debug!("Composer stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::optimizer::{JpegLadderTransformer, SizeAwareOptimizer};
    use crate::test_support::{all_credentials, media_file, test_config, MockBlobApi, MockTwitterApi};
    use crate::upload::{ChunkedUploadClient, SingleShotUploadClient};
    use crate::crosspost::coordinator::{DestinationResult, OutcomeKind};
    use std::time::Duration;
    use tempfile::TempDir;

    fn coordinator(config: Config, twitter: Arc<MockTwitterApi>, bluesky: Arc<MockBlobApi>, dir: &TempDir) -> Arc<CrossPostCoordinator> {
        let optimizer = SizeAwareOptimizer::new(
            Arc::new(JpegLadderTransformer),
            None,
            dir.path().to_path_buf(),
            config.min_transform_bytes,
        );
        Arc::new(CrossPostCoordinator::new(
            config.clone(),
            optimizer,
            ChunkedUploadClient::new(twitter, &config),
            SingleShotUploadClient::new(bluesky),
        ))
    }

    /// Poll snapshots until no upload of the current generation is running
    async fn settled(handle: &ComposerHandle) -> ComposerSnapshot {
        for _ in 0..500 {
            let snapshot = handle.snapshot().await.unwrap();
            if snapshot.uploads_in_flight == 0 {
                return snapshot;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("uploads never settled");
    }

    #[tokio::test]
    async fn test_eager_upload_then_post() {
        let dir = TempDir::new().unwrap();
        let twitter = Arc::new(MockTwitterApi::new());
        let bluesky = Arc::new(MockBlobApi::new());
        let config = Config {
            small_chunk_bytes: 256 * 1024,
            ..test_config()
        };
        let (handle, _events, _task) = Composer::spawn(
            coordinator(config, twitter.clone(), bluesky.clone(), &dir),
            all_credentials(),
        );

        let image = media_file(&dir, "photo.jpg", 2 * 1024 * 1024);
        handle.select_media(image.clone()).unwrap();
        let snapshot = settled(&handle).await;
        assert_eq!(snapshot.asset.as_ref(), Some(&image));
        assert_eq!(snapshot.handles.twitter_media_id.as_deref(), Some("media-1"));
        let blob = snapshot.handles.bluesky_blob.clone().unwrap();
        assert_eq!(blob.size, image.byte_size);

        handle.set_text("hello").unwrap();
        let report = handle.request_post().await.unwrap();
        let PublishReport::Completed(outcome) = report else {
            panic!("unexpected report {:?}", report);
        };
        assert_eq!(outcome.kind(), OutcomeKind::Success);

        assert_eq!(twitter.tweets(), vec![("hello".to_string(), vec!["media-1".to_string()])]);
        assert_eq!(twitter.init_calls(), 1);
        assert_eq!(bluesky.upload_calls(), 1);
        let records = bluesky.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0]["embed"]["images"][0]["image"]["ref"]["$link"], blob.link.as_str());

        // successful post resets the draft
        let after = handle.snapshot().await.unwrap();
        assert!(after.text.is_empty());
        assert!(after.asset.is_none());
        assert_eq!(after.handles, CachedHandles::default());
    }

    #[tokio::test]
    async fn test_stale_upload_result_is_dropped() {
        let dir = TempDir::new().unwrap();
        let twitter = Arc::new(MockTwitterApi::new());
        let coordinator = coordinator(test_config(), twitter, Arc::new(MockBlobApi::new()), &dir);
        let (mut composer, _internal, _events) = Composer::new(coordinator, all_credentials());

        composer.select_media(Some(media_file(&dir, "first.jpg", 500)));
        let first = composer.session.current();
        composer.select_media(Some(media_file(&dir, "second.jpg", 500)));
        let second = composer.session.current();
        assert!(second > first);

        // the first selection's upload resolves late, successfully
        composer.handle_internal(Internal::UploadSettled {
            generation: first,
            destination: Destination::Twitter,
            result: Ok((UploadHandle::Twitter { media_id: "stale".into() }, None)),
        });
        assert_eq!(composer.handles.twitter_media_id, None);

        composer.handle_internal(Internal::UploadSettled {
            generation: second,
            destination: Destination::Twitter,
            result: Ok((UploadHandle::Twitter { media_id: "fresh".into() }, None)),
        });
        assert_eq!(composer.handles.twitter_media_id.as_deref(), Some("fresh"));
    }

    #[tokio::test]
    async fn test_reselect_cancels_first_upload() {
        let dir = TempDir::new().unwrap();
        let twitter = Arc::new(MockTwitterApi::new().holding_first_init());
        let coordinator = coordinator(test_config(), twitter.clone(), Arc::new(MockBlobApi::new()), &dir);
        let credentials = Credentials {
            bluesky: None,
            ..all_credentials()
        };
        let (handle, _events, _task) = Composer::spawn(coordinator, credentials);

        handle.select_media(media_file(&dir, "first.jpg", 500)).unwrap();
        while twitter.init_calls() == 0 {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        let second = media_file(&dir, "second.jpg", 700);
        handle.select_media(second.clone()).unwrap();

        let snapshot = settled(&handle).await;
        assert_eq!(snapshot.asset, Some(second));
        assert_eq!(snapshot.handles.twitter_media_id.as_deref(), Some("media-2"));
        assert!(twitter.appended().iter().all(|(id, _, _)| id == "media-2"));
    }

    #[tokio::test]
    async fn test_post_waits_for_running_upload() {
        let dir = TempDir::new().unwrap();
        let twitter = Arc::new(MockTwitterApi::new().holding_first_init());
        let coordinator = coordinator(test_config(), twitter.clone(), Arc::new(MockBlobApi::new()), &dir);
        let (handle, mut events, _task) = Composer::spawn(coordinator, all_credentials());

        handle.select_media(media_file(&dir, "photo.jpg", 1_500)).unwrap();
        handle.set_text("queued").unwrap();
        let poster = handle.clone();
        let post = tokio::spawn(async move { poster.request_post().await.unwrap() });

        loop {
            if let Some(ComposerEvent::PostQueued) = events.recv().await {
                break;
            }
        }
        assert!(handle.snapshot().await.unwrap().post_queued);
        assert!(twitter.tweets().is_empty());

        twitter.release_held_init();
        let report = post.await.unwrap();
        assert!(matches!(report, PublishReport::Completed(ref o) if o.kind() == OutcomeKind::Success));
        assert_eq!(twitter.tweets(), vec![("queued".to_string(), vec!["media-1".to_string()])]);
        assert_eq!(twitter.init_calls(), 1);
    }

    #[tokio::test]
    async fn test_queued_post_is_superseded_by_new_selection() {
        let dir = TempDir::new().unwrap();
        let twitter = Arc::new(MockTwitterApi::new().holding_first_init());
        let coordinator = coordinator(test_config(), twitter.clone(), Arc::new(MockBlobApi::new()), &dir);
        let (handle, mut events, _task) = Composer::spawn(coordinator, all_credentials());

        handle.select_media(media_file(&dir, "first.jpg", 500)).unwrap();
        handle.set_text("hello").unwrap();
        let poster = handle.clone();
        let post = tokio::spawn(async move { poster.request_post().await.unwrap() });
        loop {
            if let Some(ComposerEvent::PostQueued) = events.recv().await {
                break;
            }
        }

        handle.select_media(media_file(&dir, "second.jpg", 500)).unwrap();
        assert_eq!(post.await.unwrap(), PublishReport::Superseded);
        assert!(twitter.tweets().is_empty());
    }

    #[tokio::test]
    async fn test_long_text_forces_bluesky_off() {
        let dir = TempDir::new().unwrap();
        let bluesky = Arc::new(MockBlobApi::new());
        let coordinator = coordinator(test_config(), Arc::new(MockTwitterApi::new()), bluesky.clone(), &dir);
        let (handle, mut events, _task) = Composer::spawn(coordinator, all_credentials());

        handle.set_text("a".repeat(305)).unwrap();
        match events.recv().await {
            Some(ComposerEvent::BlueskyForcedOff { reason }) => assert!(reason.contains("300")),
            other => panic!("unexpected event {:?}", other),
        }

        let forced = handle.set_bluesky_enabled(true).await.unwrap();
        assert!(forced.is_err());
        let snapshot = handle.snapshot().await.unwrap();
        assert!(!snapshot.bluesky_enabled);

        let report = handle.request_post().await.unwrap();
        let PublishReport::Completed(outcome) = report else {
            panic!("unexpected report {:?}", report);
        };
        assert_eq!(outcome.kind(), OutcomeKind::PartialSuccess);
        assert_eq!(bluesky.login_calls(), 0);
        assert!(bluesky.records().is_empty());
    }

    #[tokio::test]
    async fn test_typing_past_limit_forces_off_once() {
        let dir = TempDir::new().unwrap();
        let coordinator = coordinator(test_config(), Arc::new(MockTwitterApi::new()), Arc::new(MockBlobApi::new()), &dir);
        let (mut composer, _internal, mut events) = Composer::new(coordinator, all_credentials());

        for len in 301..=305 {
            composer.text = "a".repeat(len);
            composer.refresh_eligibility();
        }
        assert!(matches!(events.try_recv(), Ok(ComposerEvent::BlueskyForcedOff { .. })));
        assert!(events.try_recv().is_err());

        // a different rule is announced again
        composer.asset = Some(media_file(&dir, "clip.mp4", 10));
        composer.refresh_eligibility();
        match events.try_recv() {
            Ok(ComposerEvent::BlueskyForcedOff { reason }) => assert!(reason.contains("video")),
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_bluesky_record_failure_still_resets_draft() {
        let dir = TempDir::new().unwrap();
        let twitter = Arc::new(MockTwitterApi::new());
        let bluesky = Arc::new(MockBlobApi::new().failing_record());
        let coordinator = coordinator(test_config(), twitter.clone(), bluesky.clone(), &dir);
        let (handle, _events, _task) = Composer::spawn(coordinator, all_credentials());

        handle.select_media(media_file(&dir, "photo.jpg", 800)).unwrap();
        settled(&handle).await;
        handle.set_text("hello").unwrap();

        let report = handle.request_post().await.unwrap();
        let PublishReport::Completed(outcome) = report else {
            panic!("unexpected report {:?}", report);
        };
        assert_eq!(outcome.kind(), OutcomeKind::PartialSuccess);
        assert!(matches!(outcome.bluesky, DestinationResult::Failed { .. }));
        assert_eq!(twitter.tweets().len(), 1);

        let after = handle.snapshot().await.unwrap();
        assert!(after.text.is_empty());
        assert!(after.asset.is_none());
    }

    #[tokio::test]
    async fn test_twitter_failure_keeps_draft() {
        let dir = TempDir::new().unwrap();
        let twitter = Arc::new(MockTwitterApi::new().failing_tweet());
        let bluesky = Arc::new(MockBlobApi::new());
        let coordinator = coordinator(test_config(), twitter, bluesky.clone(), &dir);
        let (handle, _events, _task) = Composer::spawn(coordinator, all_credentials());

        handle.select_media(media_file(&dir, "photo.jpg", 800)).unwrap();
        settled(&handle).await;
        handle.set_text("hello").unwrap();

        let report = handle.request_post().await.unwrap();
        let PublishReport::Completed(outcome) = report else {
            panic!("unexpected report {:?}", report);
        };
        assert_eq!(outcome.kind(), OutcomeKind::Failure);
        assert!(bluesky.records().is_empty());

        let snapshot = handle.snapshot().await.unwrap();
        assert_eq!(snapshot.text, "hello");
        assert!(snapshot.asset.is_some());
        assert_eq!(snapshot.handles.twitter_media_id.as_deref(), Some("media-1"));
    }

    #[tokio::test]
    async fn test_eager_bluesky_failure_is_partial_success() {
        let dir = TempDir::new().unwrap();
        let twitter = Arc::new(MockTwitterApi::new());
        let bluesky = Arc::new(MockBlobApi::new().failing_upload());
        let coordinator = coordinator(test_config(), twitter.clone(), bluesky.clone(), &dir);
        let (handle, _events, _task) = Composer::spawn(coordinator, all_credentials());

        handle.select_media(media_file(&dir, "photo.jpg", 800)).unwrap();
        let snapshot = settled(&handle).await;
        assert!(snapshot.handles.bluesky_blob.is_none());
        handle.set_text("hello").unwrap();

        let report = handle.request_post().await.unwrap();
        let PublishReport::Completed(outcome) = report else {
            panic!("unexpected report {:?}", report);
        };
        assert_eq!(outcome.kind(), OutcomeKind::PartialSuccess);
        assert!(matches!(outcome.bluesky, DestinationResult::Failed { .. }));
        assert_eq!(twitter.tweets().len(), 1);
        // eager attempt plus the inline retry at post time
        assert_eq!(bluesky.upload_calls(), 2);
    }

    #[tokio::test]
    async fn test_empty_draft_is_rejected() {
        let dir = TempDir::new().unwrap();
        let coordinator = coordinator(test_config(), Arc::new(MockTwitterApi::new()), Arc::new(MockBlobApi::new()), &dir);
        let (handle, _events, _task) = Composer::spawn(coordinator, all_credentials());

        let report = handle.request_post().await.unwrap();
        assert!(matches!(report, PublishReport::Rejected(CrossPostError::Validation(_))));
    }

    #[tokio::test]
    async fn test_shutdown_stops_actor() {
        let dir = TempDir::new().unwrap();
        let coordinator = coordinator(test_config(), Arc::new(MockTwitterApi::new()), Arc::new(MockBlobApi::new()), &dir);
        let (handle, _events, task) = Composer::spawn(coordinator, all_credentials());

        handle.shutdown().unwrap();
        task.await.unwrap();
        assert!(handle.set_text("late").is_err());
    }
}
