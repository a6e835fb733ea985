//! UniFFI bindings for screenshare-core.
//!
//! Provides a ScreenShareClient object that wraps the StageController and
//! Navigator into a single FFI-safe interface. The stage SDK and the
//! platform capture APIs are supplied by the shell through the bridge traits.

use std::sync::{Arc, Mutex as StdMutex, PoisonError};

use screenshare_core::{
    capture as core_capture,
    navigation::Destination as CoreDestination,
    participants::Participant as CoreParticipant,
    stage::{
        ConnectionState as CoreConnectionState, ParticipantInfo as CoreParticipantInfo,
        StageStream as CoreStageStream, StreamType as CoreStreamType,
        SubscribeType as CoreSubscribeType,
    },
    CredentialStore, Navigator, StageConfig, StageController,
};
use tokio::sync::watch;
use tokio::task::AbortHandle;

mod bridge;

pub use bridge::{
    AudioRecorderBridge, CapturePlatformBridge, MediaProjectionBridge, ProjectionCallbackHandle,
    PublishStrategyHandle, StageBridge, StageFactoryBridge, StageRendererHandle,
    VirtualDisplayBridge,
};

uniffi::setup_scaffolding!();

// ── Android logcat helper ────────────────────────────────────────────

/// Write a message to logcat on Android, or stderr on other platforms.
fn share_log(msg: &str) {
    #[cfg(target_os = "android")]
    {
        use std::ffi::CString;
        unsafe extern "C" {
            fn __android_log_write(prio: i32, tag: *const std::ffi::c_char, text: *const std::ffi::c_char) -> i32;
        }
        let Ok(tag) = CString::new("SCREENSHARE_FFI") else {
            return;
        };
        let Ok(text) = CString::new(msg.replace('\0', " ")) else {
            return;
        };
        unsafe { __android_log_write(4 /* INFO */, tag.as_ptr(), text.as_ptr()); }
    }
    #[cfg(not(target_os = "android"))]
    eprintln!("{msg}");
}

// ── Namespace functions ──────────────────────────────────────────────

/// Initialize tracing/logging. Call once from the host before using ScreenShareClient.
#[uniffi::export]
pub fn init_logging() {
    use std::sync::Once;
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("screenshare_core=debug,screenshare_ffi=debug"));
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_ansi(false)
            .init();
    });
}

// ── FFI-safe type conversions ──────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, uniffi::Enum)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

impl From<CoreConnectionState> for ConnectionState {
    fn from(s: CoreConnectionState) -> Self {
        match s {
            CoreConnectionState::Disconnected => Self::Disconnected,
            CoreConnectionState::Connecting => Self::Connecting,
            CoreConnectionState::Connected => Self::Connected,
        }
    }
}

impl From<ConnectionState> for CoreConnectionState {
    fn from(s: ConnectionState) -> Self {
        match s {
            ConnectionState::Disconnected => Self::Disconnected,
            ConnectionState::Connecting => Self::Connecting,
            ConnectionState::Connected => Self::Connected,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, uniffi::Enum)]
pub enum StreamType {
    Video,
    Audio,
}

impl From<CoreStreamType> for StreamType {
    fn from(t: CoreStreamType) -> Self {
        match t {
            CoreStreamType::Video => Self::Video,
            CoreStreamType::Audio => Self::Audio,
        }
    }
}

impl From<StreamType> for CoreStreamType {
    fn from(t: StreamType) -> Self {
        match t {
            StreamType::Video => Self::Video,
            StreamType::Audio => Self::Audio,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, uniffi::Record)]
pub struct StageStream {
    pub stream_id: String,
    pub stream_type: StreamType,
    pub muted: bool,
}

impl From<CoreStageStream> for StageStream {
    fn from(s: CoreStageStream) -> Self {
        Self {
            stream_id: s.stream_id,
            stream_type: s.stream_type.into(),
            muted: s.muted,
        }
    }
}

impl From<StageStream> for CoreStageStream {
    fn from(s: StageStream) -> Self {
        Self {
            stream_id: s.stream_id,
            stream_type: s.stream_type.into(),
            muted: s.muted,
        }
    }
}

#[derive(Debug, Clone, uniffi::Record)]
pub struct ParticipantInfo {
    pub participant_id: String,
    pub is_local: bool,
}

impl From<ParticipantInfo> for CoreParticipantInfo {
    fn from(p: ParticipantInfo) -> Self {
        Self {
            participant_id: p.participant_id,
            is_local: p.is_local,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, uniffi::Enum)]
pub enum SubscribeType {
    None,
    AudioOnly,
    AudioVideo,
}

impl From<CoreSubscribeType> for SubscribeType {
    fn from(t: CoreSubscribeType) -> Self {
        match t {
            CoreSubscribeType::None => Self::None,
            CoreSubscribeType::AudioOnly => Self::AudioOnly,
            CoreSubscribeType::AudioVideo => Self::AudioVideo,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, uniffi::Enum)]
pub enum LocalStream {
    Image {
        source_id: String,
        width: u32,
        height: u32,
    },
    Microphone {
        device_id: String,
    },
    CustomAudio {
        source_id: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, uniffi::Record)]
pub struct Participant {
    pub id: String,
    pub stream: Option<StageStream>,
    pub is_muted: bool,
    pub is_screen_share: bool,
    pub has_preview: bool,
}

impl From<CoreParticipant> for Participant {
    fn from(p: CoreParticipant) -> Self {
        let is_screen_share = p.is_screen_share();
        let has_preview = p.has_preview();
        Self {
            id: p.id,
            stream: p.stream.map(StageStream::from),
            is_muted: p.is_muted,
            is_screen_share,
            has_preview,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, uniffi::Enum)]
pub enum Destination {
    Token,
    Watch,
    Share,
    Finish,
}

impl From<CoreDestination> for Destination {
    fn from(d: CoreDestination) -> Self {
        match d {
            CoreDestination::Token => Self::Token,
            CoreDestination::Watch => Self::Watch,
            CoreDestination::Share => Self::Share,
            CoreDestination::Finish => Self::Finish,
        }
    }
}

impl From<Destination> for CoreDestination {
    fn from(d: Destination) -> Self {
        match d {
            Destination::Token => Self::Token,
            Destination::Watch => Self::Watch,
            Destination::Share => Self::Share,
            Destination::Finish => Self::Finish,
        }
    }
}

#[derive(Debug, Clone, Copy, uniffi::Record)]
pub struct WindowMetrics {
    pub width: u32,
    pub height: u32,
    pub density_dpi: u32,
}

impl From<WindowMetrics> for core_capture::WindowMetrics {
    fn from(m: WindowMetrics) -> Self {
        Self {
            width: m.width,
            height: m.height,
            density_dpi: m.density_dpi,
        }
    }
}

#[derive(Debug, Clone, uniffi::Record)]
pub struct ImageSource {
    pub source_id: String,
    /// Opaque handle of the source's input surface, held by the shell.
    pub surface: u64,
}

impl From<ImageSource> for core_capture::ImageSource {
    fn from(s: ImageSource) -> Self {
        Self {
            source_id: s.source_id,
            surface: core_capture::SurfaceHandle(s.surface),
        }
    }
}

#[derive(Debug, Clone, uniffi::Record)]
pub struct AudioSource {
    pub source_id: String,
}

impl From<AudioSource> for core_capture::AudioSource {
    fn from(s: AudioSource) -> Self {
        Self {
            source_id: s.source_id,
        }
    }
}

impl From<core_capture::AudioSource> for AudioSource {
    fn from(s: core_capture::AudioSource) -> Self {
        Self {
            source_id: s.source_id,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, uniffi::Enum)]
pub enum AudioEncoding {
    Pcm16,
    Pcm16Planar,
}

impl From<core_capture::AudioEncoding> for AudioEncoding {
    fn from(e: core_capture::AudioEncoding) -> Self {
        match e {
            core_capture::AudioEncoding::Pcm16 => Self::Pcm16,
            core_capture::AudioEncoding::Pcm16Planar => Self::Pcm16Planar,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, uniffi::Enum)]
pub enum AudioUsage {
    Media,
    Game,
}

impl From<core_capture::AudioUsage> for AudioUsage {
    fn from(u: core_capture::AudioUsage) -> Self {
        match u {
            core_capture::AudioUsage::Media => Self::Media,
            core_capture::AudioUsage::Game => Self::Game,
        }
    }
}

#[derive(Debug, Clone, uniffi::Record)]
pub struct AudioCaptureConfig {
    pub sample_rate: u32,
    pub channels: u32,
    pub encoding: AudioEncoding,
    pub usages: Vec<AudioUsage>,
}

impl From<core_capture::AudioCaptureConfig> for AudioCaptureConfig {
    fn from(c: core_capture::AudioCaptureConfig) -> Self {
        Self {
            sample_rate: c.sample_rate,
            channels: c.channels,
            encoding: c.encoding.into(),
            usages: c.usages.into_iter().map(AudioUsage::from).collect(),
        }
    }
}

#[derive(Debug, Clone, uniffi::Record)]
pub struct VirtualDisplayConfig {
    pub name: String,
    pub width: u32,
    pub height: u32,
    pub density_dpi: u32,
    pub auto_mirror: bool,
    pub surface: u64,
}

impl From<core_capture::VirtualDisplayConfig> for VirtualDisplayConfig {
    fn from(c: core_capture::VirtualDisplayConfig) -> Self {
        Self {
            name: c.name,
            width: c.width,
            height: c.height,
            density_dpi: c.density_dpi,
            auto_mirror: c.auto_mirror,
            surface: c.surface.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, uniffi::Enum)]
pub enum DeviceType {
    Camera,
    Microphone,
    UserAudio,
    UserImage,
    Unknown,
}

impl From<DeviceType> for core_capture::DeviceType {
    fn from(t: DeviceType) -> Self {
        match t {
            DeviceType::Camera => Self::Camera,
            DeviceType::Microphone => Self::Microphone,
            DeviceType::UserAudio => Self::UserAudio,
            DeviceType::UserImage => Self::UserImage,
            DeviceType::Unknown => Self::Unknown,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, uniffi::Enum)]
pub enum DevicePosition {
    Front,
    Back,
    Bottom,
    Top,
    Unknown,
}

impl From<DevicePosition> for core_capture::DevicePosition {
    fn from(p: DevicePosition) -> Self {
        match p {
            DevicePosition::Front => Self::Front,
            DevicePosition::Back => Self::Back,
            DevicePosition::Bottom => Self::Bottom,
            DevicePosition::Top => Self::Top,
            DevicePosition::Unknown => Self::Unknown,
        }
    }
}

#[derive(Debug, Clone, uniffi::Record)]
pub struct DeviceDescriptor {
    pub device_id: String,
    pub device_type: DeviceType,
    pub position: DevicePosition,
}

impl From<DeviceDescriptor> for core_capture::DeviceDescriptor {
    fn from(d: DeviceDescriptor) -> Self {
        Self {
            device_id: d.device_id,
            device_type: d.device_type.into(),
            position: d.position.into(),
        }
    }
}

/// State change pushed to the shell.
#[derive(Debug, Clone, uniffi::Enum)]
pub enum ShareEvent {
    ConnectionStateChanged { state: ConnectionState },
    ParticipantsChanged { participants: Vec<Participant> },
    SharingChanged { is_sharing: bool },
    ErrorChanged { message: String },
    InvalidTokenChanged { is_invalid: bool },
    DestinationChanged { destination: Destination },
    LoadingChanged { is_loading: bool },
    CaptureServiceReadyChanged { is_ready: bool },
}

// ── Error conversion ──────────────────────────────────────────────────

#[derive(Debug, thiserror::Error, uniffi::Error)]
pub enum ShareError {
    #[error("Stage error: {msg}")]
    Stage { msg: String },
    #[error("Capture error: {msg}")]
    Capture { msg: String },
    #[error("Storage error: {msg}")]
    Storage { msg: String },
    #[error("Runtime error: {msg}")]
    Runtime { msg: String },
}

impl From<screenshare_core::ShareError> for ShareError {
    fn from(e: screenshare_core::ShareError) -> Self {
        match e {
            screenshare_core::ShareError::Stage(msg) => Self::Stage { msg },
            screenshare_core::ShareError::Capture(msg) => Self::Capture { msg },
            screenshare_core::ShareError::Storage(msg) => Self::Storage { msg },
        }
    }
}

impl From<ShareError> for screenshare_core::ShareError {
    fn from(e: ShareError) -> Self {
        match e {
            ShareError::Stage { msg } => Self::Stage(msg),
            ShareError::Capture { msg } => Self::Capture(msg),
            ShareError::Storage { msg } => Self::Storage(msg),
            ShareError::Runtime { msg } => Self::Stage(msg),
        }
    }
}

impl From<uniffi::UnexpectedUniFFICallbackError> for ShareError {
    fn from(e: uniffi::UnexpectedUniFFICallbackError) -> Self {
        tracing::error!("unexpected callback error: {}", e.reason);
        Self::Runtime { msg: e.reason }
    }
}

// ── Callback interface ────────────────────────────────────────────────

#[uniffi::export(with_foreign)]
pub trait ScreenShareListener: Send + Sync {
    fn on_event(&self, event: ShareEvent);
}

// ── ScreenShareClient: main FFI object ────────────────────────────────

#[derive(uniffi::Object)]
pub struct ScreenShareClient {
    controller: Arc<StageController>,
    rt: tokio::runtime::Runtime,
}

#[uniffi::export]
impl ScreenShareClient {
    /// `data_dir` holds the saved token and the optional `config.json`.
    #[uniffi::constructor]
    pub fn new(
        data_dir: String,
        stage_factory: Arc<dyn StageFactoryBridge>,
        platform: Arc<dyn CapturePlatformBridge>,
    ) -> Result<Arc<Self>, ShareError> {
        share_log("SCREENSHARE FFI: ScreenShareClient::new() called");
        let rt = tokio::runtime::Runtime::new().map_err(|e| ShareError::Runtime {
            msg: format!("failed to create tokio runtime: {e}"),
        })?;

        let config = StageConfig::load(&data_dir);
        let navigator = Arc::new(Navigator::new(config.finish_delay()));
        let credentials = Arc::new(CredentialStore::new(&data_dir));
        let controller = Arc::new(StageController::new(
            Arc::new(bridge::StageFactoryAdapter {
                bridge: stage_factory,
            }),
            Arc::new(bridge::CapturePlatformAdapter { bridge: platform }),
            navigator,
            credentials,
            config,
        ));

        share_log("SCREENSHARE FFI: ScreenShareClient::new() completed");
        Ok(Arc::new(Self { controller, rt }))
    }

    /// Token to pre-fill on the token entry screen.
    pub fn saved_token(&self) -> Option<String> {
        self.controller.saved_token()
    }

    pub fn join_stage(&self, token: String) {
        let controller = self.controller.clone();
        self.rt.spawn(async move {
            controller.join_stage(&token).await;
        });
    }

    pub fn leave_stage(&self) {
        let controller = self.controller.clone();
        self.rt.spawn(async move {
            controller.leave_stage().await;
        });
    }

    /// Start sharing with the projection obtained from the user-approved
    /// capture intent. `None` when the user declined.
    pub fn start_screen_share(&self, projection: Option<Arc<dyn MediaProjectionBridge>>) {
        let projection = projection.map(|bridge| {
            Arc::new(bridge::ProjectionAdapter { bridge }) as Arc<dyn core_capture::MediaProjection>
        });

        // Spawned so the call is safe from listener callbacks, which run on runtime threads.
        let controller = self.controller.clone();
        let task = self.rt.spawn(async move {
            controller.start_screen_share(projection).await;
        });

        // A panicking adapter must still leave an error on the error channel.
        let controller = self.controller.clone();
        self.rt.spawn(async move {
            let Err(e) = task.await else {
                return;
            };
            if !e.is_panic() {
                return;
            }
            let panic_info = e.into_panic();
            let msg = if let Some(s) = panic_info.downcast_ref::<&str>() {
                s.to_string()
            } else if let Some(s) = panic_info.downcast_ref::<String>() {
                s.clone()
            } else {
                "unknown panic".to_string()
            };
            share_log(&format!("SCREENSHARE FFI: start_screen_share() PANIC caught: {msg}"));
            controller.fail_screen_share(&msg);
        });
    }

    pub fn stop_screen_share(&self) {
        let controller = self.controller.clone();
        self.rt.spawn(async move {
            controller.stop_screen_share().await;
        });
    }

    /// Release capture resources; call when the destination reaches `Finish`.
    pub fn dispose_screen_share(&self) {
        self.controller.dispose_screen_share();
    }

    pub fn clear_invalid_token(&self) {
        self.controller.clear_invalid_token();
    }

    pub fn go_to(&self, destination: Destination) {
        self.controller.navigator().go_to(destination.into());
    }

    pub fn go_back(&self) {
        let controller = self.controller.clone();
        self.rt.spawn(async move {
            controller.navigator().go_back(&controller).await;
        });
    }

    /// The foreground capture service posted its notification.
    pub fn capture_service_started(&self) {
        let controller = self.controller.clone();
        self.rt.spawn(async move {
            controller.service().start().await;
        });
    }

    pub fn is_capture_service_ready(&self) -> bool {
        self.controller.service().is_ready()
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.controller.state().connection_state().into()
    }

    pub fn participants(&self) -> Vec<Participant> {
        self.controller
            .state()
            .roster()
            .participants()
            .iter()
            .cloned()
            .map(Participant::from)
            .collect()
    }

    pub fn is_sharing(&self) -> bool {
        self.controller.state().is_sharing()
    }

    pub fn error_message(&self) -> String {
        self.controller.state().error()
    }

    pub fn is_invalid_token(&self) -> bool {
        self.controller.state().is_invalid_token()
    }

    pub fn destination(&self) -> Destination {
        self.controller.navigator().destination().into()
    }

    pub fn is_loading(&self) -> bool {
        self.controller.navigator().is_loading()
    }

    /// Push every state stream to `listener`, starting with current values.
    ///
    /// Delivery continues until [`ListenerRegistration::remove`] is called.
    pub fn add_listener(&self, listener: Arc<dyn ScreenShareListener>) -> Arc<ListenerRegistration> {
        let state = self.controller.state();
        let navigator = self.controller.navigator();

        let tasks = vec![
            self.forward(state.subscribe_connection_state(), &listener, |state| {
                ShareEvent::ConnectionStateChanged {
                    state: state.into(),
                }
            }),
            self.forward(state.subscribe_roster(), &listener, |roster| {
                ShareEvent::ParticipantsChanged {
                    participants: roster
                        .participants()
                        .iter()
                        .cloned()
                        .map(Participant::from)
                        .collect(),
                }
            }),
            self.forward(state.subscribe_sharing(), &listener, |is_sharing| {
                ShareEvent::SharingChanged { is_sharing }
            }),
            self.forward(state.subscribe_error(), &listener, |message| {
                ShareEvent::ErrorChanged { message }
            }),
            self.forward(state.subscribe_invalid_token(), &listener, |is_invalid| {
                ShareEvent::InvalidTokenChanged { is_invalid }
            }),
            self.forward(navigator.subscribe_destination(), &listener, |d| {
                ShareEvent::DestinationChanged {
                    destination: d.into(),
                }
            }),
            self.forward(navigator.subscribe_loading(), &listener, |is_loading| {
                ShareEvent::LoadingChanged { is_loading }
            }),
            self.forward(
                self.controller.service().subscribe(),
                &listener,
                |is_ready| ShareEvent::CaptureServiceReadyChanged { is_ready },
            ),
        ];

        Arc::new(ListenerRegistration {
            tasks: StdMutex::new(tasks),
        })
    }
}

impl ScreenShareClient {
    fn forward<T, F>(
        &self,
        mut rx: watch::Receiver<T>,
        listener: &Arc<dyn ScreenShareListener>,
        to_event: F,
    ) -> AbortHandle
    where
        T: Clone + Send + Sync + 'static,
        F: Fn(T) -> ShareEvent + Send + 'static,
    {
        let listener = listener.clone();
        rx.mark_changed();
        self.rt
            .spawn(async move {
                while rx.changed().await.is_ok() {
                    let value = rx.borrow_and_update().clone();
                    listener.on_event(to_event(value));
                }
            })
            .abort_handle()
    }
}

/// Handle returned by `add_listener`; stops event delivery when removed.
#[derive(uniffi::Object)]
pub struct ListenerRegistration {
    tasks: StdMutex<Vec<AbortHandle>>,
}

#[uniffi::export]
impl ListenerRegistration {
    /// Stop forwarding events to the listener. Safe to call more than once.
    pub fn remove(&self) {
        let tasks = std::mem::take(&mut *self.tasks.lock().unwrap_or_else(PoisonError::into_inner));
        for task in tasks {
            task.abort();
        }
    }
}
