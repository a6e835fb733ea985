//! Screen and system-audio capture resources.
//!
//! `CaptureManager` owns the virtual display and the loopback recorder for
//! the duration of one screen share. The platform side (projection, display,
//! recorder) is reached through the traits below.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use tokio::sync::watch;

use crate::errors::ShareError;
use crate::participants::SCREEN_SHARE_ID;

/// Loopback capture format.
pub const AUDIO_SAMPLE_RATE: u32 = 44_100;
pub const AUDIO_CHANNELS: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowMetrics {
    pub width: u32,
    pub height: u32,
    pub density_dpi: u32,
}

/// Opaque platform surface handle (e.g. a Surface reference held by the host).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SurfaceHandle(pub u64);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageSource {
    pub source_id: String,
    pub surface: SurfaceHandle,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioSource {
    pub source_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioEncoding {
    Pcm16,
    Pcm16Planar,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioUsage {
    Media,
    Game,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioCaptureConfig {
    pub sample_rate: u32,
    pub channels: u32,
    pub encoding: AudioEncoding,
    pub usages: Vec<AudioUsage>,
}

impl AudioCaptureConfig {
    /// Playback capture of media and game audio, 44.1 kHz stereo PCM16.
    pub fn loopback() -> Self {
        Self {
            sample_rate: AUDIO_SAMPLE_RATE,
            channels: AUDIO_CHANNELS,
            encoding: AudioEncoding::Pcm16,
            usages: vec![AudioUsage::Media, AudioUsage::Game],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VirtualDisplayConfig {
    pub name: String,
    pub width: u32,
    pub height: u32,
    pub density_dpi: u32,
    pub auto_mirror: bool,
    pub surface: SurfaceHandle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceType {
    Camera,
    Microphone,
    UserAudio,
    UserImage,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DevicePosition {
    Front,
    Back,
    Bottom,
    Top,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceDescriptor {
    pub device_id: String,
    pub device_type: DeviceType,
    pub position: DevicePosition,
}

/// Device discovery and source creation offered by the platform.
pub trait CapturePlatform: Send + Sync {
    fn window_metrics(&self) -> Result<WindowMetrics, ShareError>;
    fn create_image_source(&self, width: u32, height: u32) -> Result<ImageSource, ShareError>;
    fn create_audio_source(
        &self,
        channels: u32,
        sample_rate: u32,
        encoding: AudioEncoding,
    ) -> Result<AudioSource, ShareError>;
    fn list_devices(&self) -> Vec<DeviceDescriptor>;
    fn min_audio_buffer_size(&self, config: &AudioCaptureConfig) -> usize;
    /// Hand captured PCM to a custom audio source.
    fn append_audio_buffer(
        &self,
        source: &AudioSource,
        buffer: &[u8],
        timestamp_ns: u64,
    ) -> Result<(), ShareError>;
}

/// A user-approved screen projection grant.
pub trait MediaProjection: Send + Sync {
    fn register_callback(&self, callback: Arc<dyn ProjectionCallback>);
    fn unregister_callback(&self);
    fn create_virtual_display(
        &self,
        config: &VirtualDisplayConfig,
    ) -> Result<Box<dyn VirtualDisplay>, ShareError>;
    fn create_loopback_recorder(
        &self,
        config: &AudioCaptureConfig,
        buffer_size: usize,
    ) -> Result<Box<dyn AudioRecorder>, ShareError>;
}

pub trait ProjectionCallback: Send + Sync {
    /// The system revoked or ended the projection.
    fn on_stop(&self);
}

pub trait VirtualDisplay: Send {
    fn release(&mut self);
}

pub trait AudioRecorder: Send {
    fn start_recording(&mut self) -> Result<(), ShareError>;
    /// Blocks for up to one buffer of audio. Returns the bytes read.
    fn read(&mut self, buffer: &mut [u8]) -> Result<usize, ShareError>;
    fn stop(&mut self);
    fn release(&mut self);
}

/// Recorder plus the buffer size it was configured with.
pub struct LoopbackRecorder {
    recorder: Box<dyn AudioRecorder>,
    buffer_size: usize,
}

/// What a successful acquisition hands back to the controller.
pub struct CaptureSession {
    pub width: u32,
    pub height: u32,
    pub image_source: ImageSource,
    pub audio_source: AudioSource,
    /// `None` when loopback capture could not be configured.
    pub loopback: Option<LoopbackRecorder>,
}

struct CaptureResources {
    projection: Arc<dyn MediaProjection>,
    display: Box<dyn VirtualDisplay>,
    cancel: watch::Sender<bool>,
}

/// Owns the capture resources of the active screen share.
pub struct CaptureManager {
    platform: Arc<dyn CapturePlatform>,
    resources: Mutex<Option<CaptureResources>>,
}

impl CaptureManager {
    pub fn new(platform: Arc<dyn CapturePlatform>) -> Self {
        Self {
            platform,
            resources: Mutex::new(None),
        }
    }

    /// Whether a virtual display is currently held.
    pub fn is_active(&self) -> bool {
        self.lock().is_some()
    }

    /// Acquire the sources, virtual display and loopback recorder for a share.
    ///
    /// All-or-nothing: on error nothing stays registered or allocated.
    /// Loopback failure alone is not an error; the share continues without it.
    pub fn acquire(
        &self,
        projection: Arc<dyn MediaProjection>,
        callback: Arc<dyn ProjectionCallback>,
    ) -> Result<CaptureSession, ShareError> {
        // Leftovers from a share whose projection outlived it.
        self.release();

        let metrics = self.platform.window_metrics()?;
        let image_source = self
            .platform
            .create_image_source(metrics.width, metrics.height)?;
        let audio_source = self.platform.create_audio_source(
            AUDIO_CHANNELS,
            AUDIO_SAMPLE_RATE,
            AudioEncoding::Pcm16Planar,
        )?;

        projection.register_callback(callback);
        let display = match projection.create_virtual_display(&VirtualDisplayConfig {
            name: SCREEN_SHARE_ID.to_string(),
            width: metrics.width,
            height: metrics.height,
            density_dpi: metrics.density_dpi,
            auto_mirror: true,
            surface: image_source.surface,
        }) {
            Ok(display) => display,
            Err(e) => {
                projection.unregister_callback();
                return Err(e);
            }
        };

        let config = AudioCaptureConfig::loopback();
        let buffer_size = self.platform.min_audio_buffer_size(&config);
        let loopback = match projection.create_loopback_recorder(&config, buffer_size) {
            Ok(recorder) => Some(LoopbackRecorder {
                recorder,
                buffer_size,
            }),
            Err(e) => {
                tracing::warn!("system audio capture unavailable: {e}");
                None
            }
        };

        *self.lock() = Some(CaptureResources {
            projection,
            display,
            cancel: watch::Sender::new(false),
        });

        tracing::debug!(
            "capture resources acquired: [{} : {}] @ {}dpi",
            metrics.width,
            metrics.height,
            metrics.density_dpi
        );
        Ok(CaptureSession {
            width: metrics.width,
            height: metrics.height,
            image_source,
            audio_source,
            loopback,
        })
    }

    /// Start pumping loopback audio into `source` after `delay`.
    ///
    /// The loop runs while `sharing` is true and the resources are held,
    /// then stops and releases the recorder.
    pub fn start_audio_loop(
        &self,
        loopback: LoopbackRecorder,
        source: AudioSource,
        sharing: watch::Receiver<bool>,
        delay: Duration,
    ) {
        let Some(cancel) = self.lock().as_ref().map(|r| r.cancel.subscribe()) else {
            tracing::debug!("capture already released, dropping loopback recorder");
            let LoopbackRecorder { mut recorder, .. } = loopback;
            recorder.release();
            return;
        };
        let platform = self.platform.clone();

        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let pump = tokio::task::spawn_blocking(move || {
                record_and_forward(loopback, &*platform, &source, &sharing, &cancel);
            });
            if let Err(e) = pump.await {
                tracing::warn!("audio capture task failed: {e}");
            }
        });
    }

    /// Release the virtual display and unregister the projection callback.
    /// Safe to call any number of times.
    pub fn release(&self) {
        let Some(mut resources) = self.lock().take() else {
            return;
        };
        resources.cancel.send_replace(true);
        resources.display.release();
        resources.projection.unregister_callback();
        tracing::debug!("screen share disposed");
    }

    /// First device of `device_type` (and `position`, if given) in device-id order.
    pub fn find_device(
        &self,
        device_type: DeviceType,
        position: Option<DevicePosition>,
    ) -> Option<DeviceDescriptor> {
        let mut devices = self.platform.list_devices();
        devices.sort_by(|a, b| a.device_id.cmp(&b.device_id));
        devices.into_iter().find(|d| {
            d.device_type == device_type && position.is_none_or(|p| d.position == p)
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<CaptureResources>> {
        self.resources.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn record_and_forward(
    loopback: LoopbackRecorder,
    platform: &dyn CapturePlatform,
    source: &AudioSource,
    sharing: &watch::Receiver<bool>,
    cancel: &watch::Receiver<bool>,
) {
    let LoopbackRecorder {
        mut recorder,
        buffer_size,
    } = loopback;
    let is_active = || *sharing.borrow() && !*cancel.borrow();

    tracing::debug!("recording audio: {}, {buffer_size}", is_active());
    if let Err(e) = recorder.start_recording() {
        tracing::warn!("failed to start audio recording: {e}");
        recorder.release();
        return;
    }

    let mut buffer = vec![0u8; buffer_size];
    let started = Instant::now();
    while is_active() {
        match recorder.read(&mut buffer) {
            Ok(0) => {}
            Ok(read) => {
                let timestamp_ns = started.elapsed().as_nanos() as u64;
                if let Err(e) =
                    platform.append_audio_buffer(source, &buffer[..read.min(buffer.len())], timestamp_ns)
                {
                    tracing::trace!("audio buffer dropped: {e}");
                }
            }
            Err(e) => {
                tracing::warn!("audio read failed: {e}");
                break;
            }
        }
    }

    tracing::debug!("stopping audio recording");
    recorder.stop();
    recorder.release();
}
