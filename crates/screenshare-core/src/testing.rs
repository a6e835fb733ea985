//! In-memory fakes of the SDK and platform traits for unit tests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::capture::{
    AudioCaptureConfig, AudioEncoding, AudioRecorder, AudioSource, CapturePlatform,
    DeviceDescriptor, DevicePosition, DeviceType, ImageSource, MediaProjection,
    ProjectionCallback, SurfaceHandle, VirtualDisplay, VirtualDisplayConfig, WindowMetrics,
};
use crate::errors::ShareError;
use crate::stage::{
    ParticipantInfo, PublishStrategy, Stage, StageFactory, StageRenderer, StageStream,
    StreamType,
};

pub struct NoopCallback;

impl ProjectionCallback for NoopCallback {
    fn on_stop(&self) {}
}

pub fn video(id: &str, muted: bool) -> StageStream {
    StageStream {
        stream_id: id.to_string(),
        stream_type: StreamType::Video,
        muted,
    }
}

pub fn audio(id: &str) -> StageStream {
    StageStream {
        stream_id: id.to_string(),
        stream_type: StreamType::Audio,
        muted: false,
    }
}

pub fn remote(id: &str) -> ParticipantInfo {
    ParticipantInfo {
        participant_id: id.to_string(),
        is_local: false,
    }
}

pub fn local(id: &str) -> ParticipantInfo {
    ParticipantInfo {
        participant_id: id.to_string(),
        is_local: true,
    }
}

async fn wait_until(mut done: impl FnMut() -> bool) {
    for _ in 0..2000 {
        if done() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    panic!("condition not reached in time");
}

// ── Platform ─────────────────────────────────────────────────────────

pub struct FakePlatform {
    fail_image_source: AtomicBool,
    fail_audio_source: AtomicBool,
    devices: Mutex<Vec<DeviceDescriptor>>,
    appended: AtomicUsize,
}

impl FakePlatform {
    pub fn new() -> Self {
        Self {
            fail_image_source: AtomicBool::new(false),
            fail_audio_source: AtomicBool::new(false),
            devices: Mutex::new(vec![DeviceDescriptor {
                device_id: "mic-0".into(),
                device_type: DeviceType::Microphone,
                position: DevicePosition::Bottom,
            }]),
            appended: AtomicUsize::new(0),
        }
    }

    pub fn fail_image_source(&self) {
        self.fail_image_source.store(true, Ordering::SeqCst);
    }

    pub fn fail_audio_source(&self) {
        self.fail_audio_source.store(true, Ordering::SeqCst);
    }

    pub fn set_devices(&self, devices: Vec<DeviceDescriptor>) {
        *self.devices.lock().unwrap() = devices;
    }

    pub fn appended_buffers(&self) -> usize {
        self.appended.load(Ordering::SeqCst)
    }
}

impl CapturePlatform for FakePlatform {
    fn window_metrics(&self) -> Result<WindowMetrics, ShareError> {
        Ok(WindowMetrics {
            width: 1080,
            height: 2400,
            density_dpi: 420,
        })
    }

    fn create_image_source(&self, width: u32, height: u32) -> Result<ImageSource, ShareError> {
        if self.fail_image_source.load(Ordering::SeqCst) {
            return Err(ShareError::Capture("no image source".into()));
        }
        Ok(ImageSource {
            source_id: format!("image-{width}x{height}"),
            surface: SurfaceHandle(7),
        })
    }

    fn create_audio_source(
        &self,
        channels: u32,
        sample_rate: u32,
        _encoding: AudioEncoding,
    ) -> Result<AudioSource, ShareError> {
        if self.fail_audio_source.load(Ordering::SeqCst) {
            return Err(ShareError::Capture("no audio source".into()));
        }
        Ok(AudioSource {
            source_id: format!("audio-{channels}ch-{sample_rate}"),
        })
    }

    fn list_devices(&self) -> Vec<DeviceDescriptor> {
        self.devices.lock().unwrap().clone()
    }

    fn min_audio_buffer_size(&self, _config: &AudioCaptureConfig) -> usize {
        64
    }

    fn append_audio_buffer(
        &self,
        _source: &AudioSource,
        buffer: &[u8],
        _timestamp_ns: u64,
    ) -> Result<(), ShareError> {
        assert!(!buffer.is_empty());
        self.appended.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// ── Projection ───────────────────────────────────────────────────────

#[derive(Default)]
pub struct RecorderProbe {
    reads: AtomicUsize,
    stopped: AtomicBool,
    released: AtomicBool,
}

impl RecorderProbe {
    pub async fn wait_for_reads(&self, count: usize) {
        wait_until(|| self.reads.load(Ordering::SeqCst) >= count).await;
    }

    pub async fn wait_for_release(&self) {
        wait_until(|| self.released.load(Ordering::SeqCst)).await;
    }

    pub fn was_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

struct FakeRecorder {
    probe: Arc<RecorderProbe>,
}

impl AudioRecorder for FakeRecorder {
    fn start_recording(&mut self) -> Result<(), ShareError> {
        Ok(())
    }

    fn read(&mut self, buffer: &mut [u8]) -> Result<usize, ShareError> {
        std::thread::sleep(Duration::from_millis(1));
        buffer.fill(1);
        self.probe.reads.fetch_add(1, Ordering::SeqCst);
        Ok(buffer.len())
    }

    fn stop(&mut self) {
        self.probe.stopped.store(true, Ordering::SeqCst);
    }

    fn release(&mut self) {
        self.probe.released.store(true, Ordering::SeqCst);
    }
}

struct FakeDisplay {
    released: Arc<AtomicUsize>,
}

impl VirtualDisplay for FakeDisplay {
    fn release(&mut self) {
        self.released.fetch_add(1, Ordering::SeqCst);
    }
}

pub struct FakeProjection {
    callback: Mutex<Option<Arc<dyn ProjectionCallback>>>,
    fail_display: AtomicBool,
    fail_recorder: AtomicBool,
    display_configs: Mutex<Vec<VirtualDisplayConfig>>,
    displays_released: Arc<AtomicUsize>,
    recorder: Arc<RecorderProbe>,
}

impl FakeProjection {
    pub fn new() -> Self {
        Self {
            callback: Mutex::new(None),
            fail_display: AtomicBool::new(false),
            fail_recorder: AtomicBool::new(false),
            display_configs: Mutex::new(Vec::new()),
            displays_released: Arc::new(AtomicUsize::new(0)),
            recorder: Arc::new(RecorderProbe::default()),
        }
    }

    pub fn fail_display(&self) {
        self.fail_display.store(true, Ordering::SeqCst);
    }

    pub fn fail_recorder(&self) {
        self.fail_recorder.store(true, Ordering::SeqCst);
    }

    pub fn has_callback(&self) -> bool {
        self.callback.lock().unwrap().is_some()
    }

    pub fn last_display_config(&self) -> Option<VirtualDisplayConfig> {
        self.display_configs.lock().unwrap().last().cloned()
    }

    pub fn displays_created(&self) -> usize {
        self.display_configs.lock().unwrap().len()
    }

    pub fn displays_released(&self) -> usize {
        self.displays_released.load(Ordering::SeqCst)
    }

    pub fn recorder_probe(&self) -> Arc<RecorderProbe> {
        self.recorder.clone()
    }

    /// Simulate the system ending the projection.
    pub fn revoke(&self) {
        let callback = self.callback.lock().unwrap().clone();
        if let Some(callback) = callback {
            callback.on_stop();
        }
    }
}

impl MediaProjection for FakeProjection {
    fn register_callback(&self, callback: Arc<dyn ProjectionCallback>) {
        *self.callback.lock().unwrap() = Some(callback);
    }

    fn unregister_callback(&self) {
        *self.callback.lock().unwrap() = None;
    }

    fn create_virtual_display(
        &self,
        config: &VirtualDisplayConfig,
    ) -> Result<Box<dyn VirtualDisplay>, ShareError> {
        if self.fail_display.load(Ordering::SeqCst) {
            return Err(ShareError::Capture("display denied".into()));
        }
        self.display_configs.lock().unwrap().push(config.clone());
        Ok(Box::new(FakeDisplay {
            released: self.displays_released.clone(),
        }))
    }

    fn create_loopback_recorder(
        &self,
        _config: &AudioCaptureConfig,
        _buffer_size: usize,
    ) -> Result<Box<dyn AudioRecorder>, ShareError> {
        if self.fail_recorder.load(Ordering::SeqCst) {
            return Err(ShareError::Capture("playback capture not allowed".into()));
        }
        Ok(Box::new(FakeRecorder {
            probe: self.recorder.clone(),
        }))
    }
}

// ── Stage SDK ────────────────────────────────────────────────────────

pub struct FakeStage {
    pub token: String,
    strategy: Arc<dyn PublishStrategy>,
    renderers: Mutex<Vec<Arc<dyn StageRenderer>>>,
    fail_join: bool,
    joined: AtomicBool,
    left: AtomicUsize,
    refreshes: AtomicUsize,
}

impl FakeStage {
    pub fn strategy(&self) -> Arc<dyn PublishStrategy> {
        self.strategy.clone()
    }

    pub fn renderer(&self) -> Arc<dyn StageRenderer> {
        self.renderers.lock().unwrap()[0].clone()
    }

    pub fn renderer_count(&self) -> usize {
        self.renderers.lock().unwrap().len()
    }

    pub fn is_joined(&self) -> bool {
        self.joined.load(Ordering::SeqCst)
    }

    pub fn leave_count(&self) -> usize {
        self.left.load(Ordering::SeqCst)
    }

    pub fn refresh_count(&self) -> usize {
        self.refreshes.load(Ordering::SeqCst)
    }
}

impl Stage for FakeStage {
    fn join(&self) -> Result<(), ShareError> {
        if self.fail_join {
            return Err(ShareError::Stage("token rejected".into()));
        }
        self.joined.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn leave(&self) {
        self.joined.store(false, Ordering::SeqCst);
        self.left.fetch_add(1, Ordering::SeqCst);
    }

    fn add_renderer(&self, renderer: Arc<dyn StageRenderer>) {
        self.renderers.lock().unwrap().push(renderer);
    }

    fn remove_renderer(&self, renderer: &Arc<dyn StageRenderer>) {
        self.renderers
            .lock()
            .unwrap()
            .retain(|r| !Arc::ptr_eq(r, renderer));
    }

    fn refresh_strategy(&self) {
        self.refreshes.fetch_add(1, Ordering::SeqCst);
    }
}

/// Accepts any token except those listed as rejected.
#[derive(Default)]
pub struct FakeStageFactory {
    rejected: Mutex<Vec<String>>,
    join_failures: Mutex<Vec<String>>,
    stages: Mutex<Vec<Arc<FakeStage>>>,
}

impl FakeStageFactory {
    pub fn reject(&self, token: &str) {
        self.rejected.lock().unwrap().push(token.to_string());
    }

    pub fn fail_join(&self, token: &str) {
        self.join_failures.lock().unwrap().push(token.to_string());
    }

    pub fn created(&self) -> usize {
        self.stages.lock().unwrap().len()
    }

    pub fn last_stage(&self) -> Arc<FakeStage> {
        self.stages.lock().unwrap().last().cloned().unwrap()
    }
}

impl StageFactory for FakeStageFactory {
    fn create(
        &self,
        token: &str,
        strategy: Arc<dyn PublishStrategy>,
    ) -> Result<Arc<dyn Stage>, ShareError> {
        if self.rejected.lock().unwrap().iter().any(|t| t == token) {
            return Err(ShareError::Stage(format!("invalid token: {token}")));
        }
        let stage = Arc::new(FakeStage {
            token: token.to_string(),
            strategy,
            renderers: Mutex::new(Vec::new()),
            fail_join: self.join_failures.lock().unwrap().iter().any(|t| t == token),
            joined: AtomicBool::new(false),
            left: AtomicUsize::new(0),
            refreshes: AtomicUsize::new(0),
        });
        self.stages.lock().unwrap().push(stage.clone());
        Ok(stage)
    }
}
