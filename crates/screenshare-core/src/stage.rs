//! Capability surface of the real-time stage SDK.
//!
//! The core never talks to the vendor SDK directly. A platform adapter
//! implements [`StageFactory`] and [`Stage`], and calls back into the
//! [`PublishStrategy`] and [`StageRenderer`] handed to it by the controller.

use std::sync::Arc;

use crate::errors::ShareError;

/// Transport state of the joined stage, mirrored from the SDK.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamType {
    Video,
    Audio,
}

/// Reference to a media stream owned by the SDK.
///
/// Only the identifier crosses into the core; the SDK keeps the media.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageStream {
    pub stream_id: String,
    pub stream_type: StreamType,
    pub muted: bool,
}

impl StageStream {
    pub fn is_video(&self) -> bool {
        self.stream_type == StreamType::Video
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParticipantInfo {
    pub participant_id: String,
    pub is_local: bool,
}

/// Which remote media the local participant receives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscribeType {
    None,
    AudioOnly,
    AudioVideo,
}

/// A local outgoing stream advertised through the publish strategy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocalStream {
    /// Screen pixels rendered into an image input source.
    Image {
        source_id: String,
        width: u32,
        height: u32,
    },
    /// A physical capture device.
    Microphone { device_id: String },
    /// A custom audio source fed with system-audio loopback buffers.
    CustomAudio { source_id: String },
}

/// Publish/subscribe policy queried by the SDK.
pub trait PublishStrategy: Send + Sync {
    fn streams_to_publish(&self, participant: &ParticipantInfo) -> Vec<LocalStream>;
    fn should_publish(&self, participant: &ParticipantInfo) -> bool;
    fn should_subscribe(&self, participant: &ParticipantInfo) -> SubscribeType;
}

/// Event callbacks delivered by the SDK for a joined stage.
///
/// Implementations must be Send + Sync (called from SDK threads).
pub trait StageRenderer: Send + Sync {
    fn on_connection_state_changed(&self, state: ConnectionState, error: Option<String>);
    fn on_streams_added(&self, participant: &ParticipantInfo, streams: &[StageStream]);
    fn on_streams_removed(&self, participant: &ParticipantInfo, streams: &[StageStream]);
    fn on_streams_muted_changed(&self, participant: &ParticipantInfo, streams: &[StageStream]);
    fn on_error(&self, message: String);
}

/// One live stage session.
pub trait Stage: Send + Sync {
    fn join(&self) -> Result<(), ShareError>;
    fn leave(&self);
    fn add_renderer(&self, renderer: Arc<dyn StageRenderer>);
    fn remove_renderer(&self, renderer: &Arc<dyn StageRenderer>);
    /// Ask the SDK to re-query the publish strategy.
    fn refresh_strategy(&self);
}

pub trait StageFactory: Send + Sync {
    /// Create a stage bound to `token`. Fails on a malformed or rejected token.
    fn create(
        &self,
        token: &str,
        strategy: Arc<dyn PublishStrategy>,
    ) -> Result<Arc<dyn Stage>, ShareError>;
}
