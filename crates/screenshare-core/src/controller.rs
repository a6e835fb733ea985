use std::sync::Arc;

use tokio::sync::Mutex;

use crate::capture::{CaptureManager, CapturePlatform, DeviceType, MediaProjection, ProjectionCallback};
use crate::errors::ShareError;
use crate::navigation::{Destination, Navigator};
use crate::participants::{Participant, SCREEN_SHARE_ID};
use crate::renderer::{ProjectionStopHandler, RosterRenderer};
use crate::service::CaptureService;
use crate::settings::{CredentialStore, StageConfig};
use crate::stage::{LocalStream, PublishStrategy, Stage, StageFactory, StageRenderer, StageStream, StreamType};
use crate::state::StageState;
use crate::strategy::SharePublishStrategy;

/// Owns the single stage session and the local screen share.
///
/// Every operation reports its outcome through [`StageState`] rather than
/// returning an error; the shell only observes state and issues calls.
pub struct StageController {
    factory: Arc<dyn StageFactory>,
    state: Arc<StageState>,
    navigator: Arc<Navigator>,
    credentials: Arc<CredentialStore>,
    capture: Arc<CaptureManager>,
    service: Arc<CaptureService>,
    config: StageConfig,
    stage: Mutex<Option<Arc<dyn Stage>>>,
    /// Serializes start/stop of the screen share.
    share_op: Mutex<()>,
    strategy: Arc<dyn PublishStrategy>,
    renderer: Arc<dyn StageRenderer>,
    projection_handler: Arc<dyn ProjectionCallback>,
}

impl StageController {
    pub fn new(
        factory: Arc<dyn StageFactory>,
        platform: Arc<dyn CapturePlatform>,
        navigator: Arc<Navigator>,
        credentials: Arc<CredentialStore>,
        config: StageConfig,
    ) -> Self {
        let state = Arc::new(StageState::new());
        let capture = Arc::new(CaptureManager::new(platform));
        Self {
            factory,
            strategy: Arc::new(SharePublishStrategy::new(state.clone())),
            renderer: Arc::new(RosterRenderer::new(state.clone())),
            projection_handler: Arc::new(ProjectionStopHandler::new(
                state.clone(),
                capture.clone(),
            )),
            service: Arc::new(CaptureService::new(config.service_ready_delay())),
            state,
            navigator,
            credentials,
            capture,
            config,
            stage: Mutex::new(None),
            share_op: Mutex::new(()),
        }
    }

    pub fn state(&self) -> &Arc<StageState> {
        &self.state
    }

    pub fn navigator(&self) -> &Arc<Navigator> {
        &self.navigator
    }

    pub fn capture(&self) -> &Arc<CaptureManager> {
        &self.capture
    }

    pub fn service(&self) -> &Arc<CaptureService> {
        &self.service
    }

    /// Last token a join was attempted with, for pre-filling token entry.
    pub fn saved_token(&self) -> Option<String> {
        self.credentials.token()
    }

    pub async fn is_joined(&self) -> bool {
        self.stage.lock().await.is_some()
    }

    pub fn clear_invalid_token(&self) {
        self.state.set_invalid_token(false);
    }

    /// Join the stage identified by `token`.
    ///
    /// No-op while a stage is held or for a blank token. The loading flag is
    /// held for at least the settle delay so the shell does not flicker.
    pub async fn join_stage(&self, token: &str) {
        let joined = {
            let mut stage = self.stage.lock().await;
            if stage.is_some() {
                tracing::debug!("join ignored, already on a stage");
                return;
            }
            if token.trim().is_empty() {
                return;
            }

            tracing::info!("joining stage (token length {})", token.len());
            self.credentials.set_token(token);
            self.navigator.set_loading(true);
            match self.create_and_join(token) {
                Ok(handle) => {
                    *stage = Some(handle.clone());
                    Some(handle)
                }
                Err(e) => {
                    tracing::debug!("failed to join stage: {e}");
                    None
                }
            }
        };

        tokio::time::sleep(self.config.join_settle()).await;
        self.navigator.set_loading(false);
        self.state.set_invalid_token(joined.is_none());
        let Some(handle) = joined else {
            return;
        };
        // A leave during the settle delay already dropped this stage.
        let still_held = self
            .stage
            .lock()
            .await
            .as_ref()
            .is_some_and(|current| Arc::ptr_eq(current, &handle));
        if still_held {
            self.navigator.go_to(Destination::Watch);
        } else {
            tracing::debug!("stage left before join settled, staying on token entry");
        }
    }

    fn create_and_join(&self, token: &str) -> Result<Arc<dyn Stage>, ShareError> {
        let stage = self.factory.create(token, self.strategy.clone())?;
        stage.refresh_strategy();
        stage.add_renderer(self.renderer.clone());
        if let Err(e) = stage.join() {
            stage.remove_renderer(&self.renderer);
            return Err(e);
        }
        Ok(stage)
    }

    /// Leave the current stage. No-op when none is held.
    pub async fn leave_stage(&self) {
        let Some(stage) = self.stage.lock().await.take() else {
            return;
        };

        tracing::info!("leaving stage");
        if self.state.is_sharing() {
            // The publish set goes away with the stage, so the share ends too.
            self.service.set_ready(false);
            self.state.set_sharing(false);
            self.capture.release();
        }
        self.state.update_roster(|roster| {
            let changed = !roster.is_empty();
            roster.clear();
            changed
        });
        self.state.replace_publish_set(Vec::new());
        stage.remove_renderer(&self.renderer);
        stage.leave();
    }

    /// Start sharing the screen with the given projection grant.
    ///
    /// No-op while already sharing or without a grant. Failures land on the
    /// error channel and leave sharing off.
    pub async fn start_screen_share(&self, projection: Option<Arc<dyn MediaProjection>>) {
        let _op = self.share_op.lock().await;
        if self.state.is_sharing() {
            return;
        }
        let Some(projection) = projection else {
            return;
        };

        if let Err(e) = self.begin_share(projection).await {
            self.fail_screen_share(&e.to_string());
        }
    }

    /// Surface a start-share failure that happened outside the controller,
    /// such as a panic in a platform adapter. Sharing is left off.
    pub fn fail_screen_share(&self, reason: &str) {
        tracing::warn!("failed to start screen share: {reason}");
        self.state.set_error(format!("Failed to start screen share: {reason}"));
        self.state.set_sharing(false);
    }

    async fn begin_share(&self, projection: Arc<dyn MediaProjection>) -> Result<(), ShareError> {
        let session = self
            .capture
            .acquire(projection, self.projection_handler.clone())?;

        let mut streams = vec![LocalStream::Image {
            source_id: session.image_source.source_id.clone(),
            width: session.width,
            height: session.height,
        }];
        // Only one audio stream can be published.
        if self.config.publish_system_audio && session.loopback.is_some() {
            streams.push(LocalStream::CustomAudio {
                source_id: session.audio_source.source_id.clone(),
            });
        } else if let Some(mic) = self.capture.find_device(DeviceType::Microphone, None) {
            streams.push(LocalStream::Microphone {
                device_id: mic.device_id,
            });
        }

        self.state.replace_publish_set(streams);
        self.state.set_error("");
        self.state.set_sharing(true);
        self.refresh_strategy().await;

        if let Some(loopback) = session.loopback {
            self.capture.start_audio_loop(
                loopback,
                session.audio_source,
                self.state.subscribe_sharing(),
                self.config.audio_start_delay(),
            );
        }

        let preview = StageStream {
            stream_id: session.image_source.source_id,
            stream_type: StreamType::Video,
            muted: false,
        };
        self.state
            .update_roster(|roster| roster.add(Participant::screen_share(preview)));
        tracing::info!("screen share started: [{} : {}]", session.width, session.height);
        Ok(())
    }

    /// Stop publishing the screen and release capture. Idempotent.
    pub async fn stop_screen_share(&self) {
        let _op = self.share_op.lock().await;
        self.service.set_ready(false);
        if self.state.update_roster(|roster| roster.remove(SCREEN_SHARE_ID)) {
            tracing::info!("screen share stopped");
        }
        self.state.replace_publish_set(Vec::new());
        self.state.set_error("");
        self.state.set_sharing(false);

        tokio::time::sleep(self.config.strategy_refresh_delay()).await;
        self.refresh_strategy().await;
        self.dispose_screen_share();
    }

    /// Release the virtual display and projection callback. Safe to repeat.
    pub fn dispose_screen_share(&self) {
        self.capture.release();
    }

    async fn refresh_strategy(&self) {
        if let Some(stage) = self.stage.lock().await.as_ref() {
            stage.refresh_strategy();
        }
    }
}
