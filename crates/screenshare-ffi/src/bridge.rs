//! Foreign-implemented stage SDK and capture adapters.
//!
//! The shell implements the `*Bridge` traits on top of the vendor SDK and
//! the platform capture APIs. The core calls them through the adapters
//! below, and the shell calls back into the core through the exported
//! `*Handle` objects.

use std::sync::{Arc, Mutex as StdMutex, PoisonError};

use screenshare_core::capture::{
    AudioRecorder as CoreAudioRecorder, AudioSource as CoreAudioSource,
    CapturePlatform as CoreCapturePlatform, DeviceDescriptor as CoreDeviceDescriptor,
    ImageSource as CoreImageSource, MediaProjection as CoreMediaProjection,
    ProjectionCallback as CoreProjectionCallback, VirtualDisplay as CoreVirtualDisplay,
    WindowMetrics as CoreWindowMetrics,
};
use screenshare_core::stage::{
    LocalStream as CoreLocalStream, PublishStrategy as CorePublishStrategy,
    Stage as CoreStage, StageFactory as CoreStageFactory, StageRenderer as CoreStageRenderer,
    StageStream as CoreStageStream,
};
use screenshare_core::ShareError as CoreShareError;

use crate::{
    AudioCaptureConfig, AudioEncoding, AudioSource, ConnectionState, DeviceDescriptor,
    ImageSource, LocalStream, ParticipantInfo, ShareError, StageStream, SubscribeType,
    VirtualDisplayConfig, WindowMetrics,
};

// ── Stage SDK ─────────────────────────────────────────────────────────

#[uniffi::export(with_foreign)]
pub trait StageFactoryBridge: Send + Sync {
    fn create(
        &self,
        token: String,
        strategy: Arc<PublishStrategyHandle>,
    ) -> Result<Arc<dyn StageBridge>, ShareError>;
}

#[uniffi::export(with_foreign)]
pub trait StageBridge: Send + Sync {
    fn join(&self) -> Result<(), ShareError>;
    fn leave(&self);
    fn add_renderer(&self, renderer: Arc<StageRendererHandle>);
    fn remove_renderer(&self, renderer: Arc<StageRendererHandle>);
    fn refresh_strategy(&self);
}

/// Publish strategy exposed to the shell's SDK adapter.
#[derive(uniffi::Object)]
pub struct PublishStrategyHandle {
    inner: Arc<dyn CorePublishStrategy>,
}

#[uniffi::export]
impl PublishStrategyHandle {
    pub fn streams_to_publish(&self, participant: ParticipantInfo) -> Vec<LocalStream> {
        self.inner
            .streams_to_publish(&participant.into())
            .into_iter()
            .map(LocalStream::from)
            .collect()
    }

    pub fn should_publish(&self, participant: ParticipantInfo) -> bool {
        self.inner.should_publish(&participant.into())
    }

    pub fn should_subscribe(&self, participant: ParticipantInfo) -> SubscribeType {
        self.inner.should_subscribe(&participant.into()).into()
    }
}

/// Stage event sink exposed to the shell's SDK adapter.
#[derive(uniffi::Object)]
pub struct StageRendererHandle {
    inner: Arc<dyn CoreStageRenderer>,
}

fn core_streams(streams: Vec<StageStream>) -> Vec<CoreStageStream> {
    streams.into_iter().map(CoreStageStream::from).collect()
}

#[uniffi::export]
impl StageRendererHandle {
    pub fn on_connection_state_changed(&self, state: ConnectionState, error: Option<String>) {
        self.inner.on_connection_state_changed(state.into(), error);
    }

    pub fn on_streams_added(&self, participant: ParticipantInfo, streams: Vec<StageStream>) {
        self.inner
            .on_streams_added(&participant.into(), &core_streams(streams));
    }

    pub fn on_streams_removed(&self, participant: ParticipantInfo, streams: Vec<StageStream>) {
        self.inner
            .on_streams_removed(&participant.into(), &core_streams(streams));
    }

    pub fn on_streams_muted_changed(&self, participant: ParticipantInfo, streams: Vec<StageStream>) {
        self.inner
            .on_streams_muted_changed(&participant.into(), &core_streams(streams));
    }

    pub fn on_error(&self, message: String) {
        self.inner.on_error(message);
    }
}

pub(crate) struct StageFactoryAdapter {
    pub(crate) bridge: Arc<dyn StageFactoryBridge>,
}

impl CoreStageFactory for StageFactoryAdapter {
    fn create(
        &self,
        token: &str,
        strategy: Arc<dyn CorePublishStrategy>,
    ) -> Result<Arc<dyn CoreStage>, CoreShareError> {
        let handle = Arc::new(PublishStrategyHandle { inner: strategy });
        let stage = self.bridge.create(token.to_string(), handle)?;
        Ok(Arc::new(StageAdapter {
            bridge: stage,
            renderers: StdMutex::new(Vec::new()),
        }))
    }
}

type RendererPair = (Arc<dyn CoreStageRenderer>, Arc<StageRendererHandle>);

struct StageAdapter {
    bridge: Arc<dyn StageBridge>,
    /// Handles given to the shell, so removal passes back the same object.
    renderers: StdMutex<Vec<RendererPair>>,
}

impl CoreStage for StageAdapter {
    fn join(&self) -> Result<(), CoreShareError> {
        self.bridge.join().map_err(CoreShareError::from)
    }

    fn leave(&self) {
        self.bridge.leave();
    }

    fn add_renderer(&self, renderer: Arc<dyn CoreStageRenderer>) {
        let handle = Arc::new(StageRendererHandle {
            inner: renderer.clone(),
        });
        self.renderers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((renderer, handle.clone()));
        self.bridge.add_renderer(handle);
    }

    fn remove_renderer(&self, renderer: &Arc<dyn CoreStageRenderer>) {
        let handle = {
            let mut renderers = self
                .renderers
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            let Some(index) = renderers.iter().position(|(r, _)| Arc::ptr_eq(r, renderer)) else {
                return;
            };
            renderers.remove(index).1
        };
        self.bridge.remove_renderer(handle);
    }

    fn refresh_strategy(&self) {
        self.bridge.refresh_strategy();
    }
}

// ── Platform capture ──────────────────────────────────────────────────

#[uniffi::export(with_foreign)]
pub trait CapturePlatformBridge: Send + Sync {
    fn window_metrics(&self) -> Result<WindowMetrics, ShareError>;
    fn create_image_source(&self, width: u32, height: u32) -> Result<ImageSource, ShareError>;
    fn create_audio_source(
        &self,
        channels: u32,
        sample_rate: u32,
        encoding: AudioEncoding,
    ) -> Result<AudioSource, ShareError>;
    fn list_devices(&self) -> Vec<DeviceDescriptor>;
    fn min_audio_buffer_size(&self, config: AudioCaptureConfig) -> u64;
    fn append_audio_buffer(
        &self,
        source: AudioSource,
        buffer: Vec<u8>,
        timestamp_ns: u64,
    ) -> Result<(), ShareError>;
}

#[uniffi::export(with_foreign)]
pub trait MediaProjectionBridge: Send + Sync {
    fn register_callback(&self, callback: Arc<ProjectionCallbackHandle>);
    fn unregister_callback(&self);
    fn create_virtual_display(
        &self,
        config: VirtualDisplayConfig,
    ) -> Result<Arc<dyn VirtualDisplayBridge>, ShareError>;
    fn create_loopback_recorder(
        &self,
        config: AudioCaptureConfig,
        buffer_size: u64,
    ) -> Result<Arc<dyn AudioRecorderBridge>, ShareError>;
}

#[uniffi::export(with_foreign)]
pub trait VirtualDisplayBridge: Send + Sync {
    fn release(&self);
}

#[uniffi::export(with_foreign)]
pub trait AudioRecorderBridge: Send + Sync {
    fn start_recording(&self) -> Result<(), ShareError>;
    /// Blocking read of at most `max_bytes`.
    fn read(&self, max_bytes: u64) -> Result<Vec<u8>, ShareError>;
    fn stop(&self);
    fn release(&self);
}

/// Projection-stopped sink the shell invokes from `MediaProjection.Callback.onStop`.
#[derive(uniffi::Object)]
pub struct ProjectionCallbackHandle {
    inner: Arc<dyn CoreProjectionCallback>,
}

#[uniffi::export]
impl ProjectionCallbackHandle {
    pub fn on_stop(&self) {
        self.inner.on_stop();
    }
}

pub(crate) struct CapturePlatformAdapter {
    pub(crate) bridge: Arc<dyn CapturePlatformBridge>,
}

impl CoreCapturePlatform for CapturePlatformAdapter {
    fn window_metrics(&self) -> Result<CoreWindowMetrics, CoreShareError> {
        Ok(self.bridge.window_metrics()?.into())
    }

    fn create_image_source(
        &self,
        width: u32,
        height: u32,
    ) -> Result<CoreImageSource, CoreShareError> {
        Ok(self.bridge.create_image_source(width, height)?.into())
    }

    fn create_audio_source(
        &self,
        channels: u32,
        sample_rate: u32,
        encoding: screenshare_core::capture::AudioEncoding,
    ) -> Result<CoreAudioSource, CoreShareError> {
        Ok(self
            .bridge
            .create_audio_source(channels, sample_rate, encoding.into())?
            .into())
    }

    fn list_devices(&self) -> Vec<CoreDeviceDescriptor> {
        self.bridge
            .list_devices()
            .into_iter()
            .map(CoreDeviceDescriptor::from)
            .collect()
    }

    fn min_audio_buffer_size(&self, config: &screenshare_core::capture::AudioCaptureConfig) -> usize {
        self.bridge.min_audio_buffer_size(config.clone().into()) as usize
    }

    fn append_audio_buffer(
        &self,
        source: &CoreAudioSource,
        buffer: &[u8],
        timestamp_ns: u64,
    ) -> Result<(), CoreShareError> {
        self.bridge
            .append_audio_buffer(source.clone().into(), buffer.to_vec(), timestamp_ns)
            .map_err(CoreShareError::from)
    }
}

pub(crate) struct ProjectionAdapter {
    pub(crate) bridge: Arc<dyn MediaProjectionBridge>,
}

impl CoreMediaProjection for ProjectionAdapter {
    fn register_callback(&self, callback: Arc<dyn CoreProjectionCallback>) {
        self.bridge
            .register_callback(Arc::new(ProjectionCallbackHandle { inner: callback }));
    }

    fn unregister_callback(&self) {
        self.bridge.unregister_callback();
    }

    fn create_virtual_display(
        &self,
        config: &screenshare_core::capture::VirtualDisplayConfig,
    ) -> Result<Box<dyn CoreVirtualDisplay>, CoreShareError> {
        let display = self.bridge.create_virtual_display(config.clone().into())?;
        Ok(Box::new(DisplayAdapter(display)))
    }

    fn create_loopback_recorder(
        &self,
        config: &screenshare_core::capture::AudioCaptureConfig,
        buffer_size: usize,
    ) -> Result<Box<dyn CoreAudioRecorder>, CoreShareError> {
        let recorder = self
            .bridge
            .create_loopback_recorder(config.clone().into(), buffer_size as u64)?;
        Ok(Box::new(RecorderAdapter(recorder)))
    }
}

struct DisplayAdapter(Arc<dyn VirtualDisplayBridge>);

impl CoreVirtualDisplay for DisplayAdapter {
    fn release(&mut self) {
        self.0.release();
    }
}

struct RecorderAdapter(Arc<dyn AudioRecorderBridge>);

impl CoreAudioRecorder for RecorderAdapter {
    fn start_recording(&mut self) -> Result<(), CoreShareError> {
        self.0.start_recording().map_err(CoreShareError::from)
    }

    fn read(&mut self, buffer: &mut [u8]) -> Result<usize, CoreShareError> {
        let data = self.0.read(buffer.len() as u64)?;
        let read = data.len().min(buffer.len());
        buffer[..read].copy_from_slice(&data[..read]);
        Ok(read)
    }

    fn stop(&mut self) {
        self.0.stop();
    }

    fn release(&mut self) {
        self.0.release();
    }
}

impl From<CoreLocalStream> for LocalStream {
    fn from(s: CoreLocalStream) -> Self {
        match s {
            CoreLocalStream::Image {
                source_id,
                width,
                height,
            } => Self::Image {
                source_id,
                width,
                height,
            },
            CoreLocalStream::Microphone { device_id } => Self::Microphone { device_id },
            CoreLocalStream::CustomAudio { source_id } => Self::CustomAudio { source_id },
        }
    }
}
