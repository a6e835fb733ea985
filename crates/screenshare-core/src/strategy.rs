use std::sync::Arc;

use crate::stage::{LocalStream, ParticipantInfo, PublishStrategy, SubscribeType};
use crate::state::StageState;

/// Publishes the local share streams while sharing; always receives
/// audio and video from everyone else.
pub struct SharePublishStrategy {
    state: Arc<StageState>,
}

impl SharePublishStrategy {
    pub fn new(state: Arc<StageState>) -> Self {
        Self { state }
    }
}

impl PublishStrategy for SharePublishStrategy {
    fn streams_to_publish(&self, _participant: &ParticipantInfo) -> Vec<LocalStream> {
        if self.state.is_sharing() {
            self.state.publish_set()
        } else {
            Vec::new()
        }
    }

    fn should_publish(&self, _participant: &ParticipantInfo) -> bool {
        self.state.is_sharing()
    }

    fn should_subscribe(&self, _participant: &ParticipantInfo) -> SubscribeType {
        SubscribeType::AudioVideo
    }
}
