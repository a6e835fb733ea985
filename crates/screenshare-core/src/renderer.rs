use std::sync::Arc;

use crate::capture::{CaptureManager, ProjectionCallback};
use crate::participants::Participant;
use crate::stage::{ConnectionState, ParticipantInfo, StageRenderer, StageStream};
use crate::state::StageState;

/// Translates stage SDK callbacks into roster and status updates.
pub struct RosterRenderer {
    state: Arc<StageState>,
}

impl RosterRenderer {
    pub fn new(state: Arc<StageState>) -> Self {
        Self { state }
    }
}

fn first_video(streams: &[StageStream]) -> Option<&StageStream> {
    streams.iter().find(|s| s.is_video())
}

impl StageRenderer for RosterRenderer {
    fn on_connection_state_changed(&self, state: ConnectionState, error: Option<String>) {
        if let Some(error) = error {
            tracing::debug!("connection state {state:?} with error: {error}");
        }
        self.state.set_connection_state(state);
    }

    fn on_streams_added(&self, participant: &ParticipantInfo, streams: &[StageStream]) {
        if participant.is_local {
            tracing::debug!(
                "self streams added: {:?}",
                streams.iter().map(|s| s.stream_type).collect::<Vec<_>>()
            );
            return;
        }
        let id = &participant.participant_id;
        let added = self.state.update_roster(|roster| {
            roster.add(Participant::remote(id.clone(), first_video(streams).cloned()))
        });
        if added {
            tracing::debug!("stream added for: {id}");
        }
    }

    fn on_streams_removed(&self, participant: &ParticipantInfo, streams: &[StageStream]) {
        if participant.is_local || first_video(streams).is_none() {
            return;
        }
        let id = &participant.participant_id;
        if self.state.update_roster(|roster| roster.remove(id)) {
            tracing::debug!("stream removed for: {id}");
        }
    }

    fn on_streams_muted_changed(&self, participant: &ParticipantInfo, streams: &[StageStream]) {
        if participant.is_local {
            return;
        }
        let Some(stream) = first_video(streams) else {
            return;
        };
        let id = &participant.participant_id;
        if self
            .state
            .update_roster(|roster| roster.update_stream(id, stream.clone()))
        {
            tracing::debug!("stream muted changed for: {id}, is muted: {}", stream.muted);
        }
    }

    fn on_error(&self, message: String) {
        tracing::debug!("stage error: {message}");
        self.state.set_error(message);
    }
}

/// Releases capture resources when the system ends the projection,
/// unless a share is still running and will dispose on its own stop.
pub struct ProjectionStopHandler {
    state: Arc<StageState>,
    capture: Arc<CaptureManager>,
}

impl ProjectionStopHandler {
    pub fn new(state: Arc<StageState>, capture: Arc<CaptureManager>) -> Self {
        Self { state, capture }
    }
}

impl ProjectionCallback for ProjectionStopHandler {
    fn on_stop(&self) {
        let is_sharing = self.state.is_sharing();
        tracing::debug!("media projection stopped, is sharing: {is_sharing}");
        if is_sharing {
            return;
        }
        self.capture.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{
        audio, local, remote, video, FakePlatform, FakeProjection,
    };

    fn renderer() -> (Arc<StageState>, RosterRenderer) {
        let state = Arc::new(StageState::new());
        (state.clone(), RosterRenderer::new(state))
    }

    #[test]
    fn connection_state_is_last_write_wins() {
        let (state, renderer) = renderer();
        renderer.on_connection_state_changed(ConnectionState::Connecting, None);
        renderer.on_connection_state_changed(
            ConnectionState::Disconnected,
            Some("network lost".into()),
        );
        assert_eq!(state.connection_state(), ConnectionState::Disconnected);
    }

    #[test]
    fn streams_added_keys_first_video() {
        let (state, renderer) = renderer();
        renderer.on_streams_added(&remote("p1"), &[audio("a1"), video("v1", false)]);

        let roster = state.roster();
        let p1 = roster.participant("p1").unwrap();
        assert_eq!(p1.stream.as_ref().unwrap().stream_id, "v1");
        assert!(!p1.is_muted);
    }

    #[test]
    fn audio_only_participant_is_muted_without_stream() {
        let (state, renderer) = renderer();
        renderer.on_streams_added(&remote("p1"), &[audio("a1")]);
        let p1 = state.roster().participant("p1").cloned().unwrap();
        assert!(p1.stream.is_none());
        assert!(p1.is_muted);
    }

    #[test]
    fn local_streams_are_ignored() {
        let (state, renderer) = renderer();
        renderer.on_streams_added(&local("me"), &[video("v0", false)]);
        assert!(state.roster().is_empty());
    }

    #[test]
    fn repeated_streams_added_does_not_duplicate() {
        let (state, renderer) = renderer();
        renderer.on_streams_added(&remote("p1"), &[video("v1", false)]);
        renderer.on_streams_added(&remote("p1"), &[video("v2", true)]);
        let roster = state.roster();
        assert_eq!(roster.len(), 1);
        assert_eq!(roster.participant("p1").unwrap().stream.as_ref().unwrap().stream_id, "v1");
    }

    #[test]
    fn audio_removal_keeps_entry() {
        let (state, renderer) = renderer();
        renderer.on_streams_added(&remote("p1"), &[video("v1", false), audio("a1")]);
        renderer.on_streams_removed(&remote("p1"), &[audio("a1")]);
        assert!(state.roster().contains("p1"));
    }

    #[test]
    fn mute_changes_never_resurrect_removed_participant() {
        let (state, renderer) = renderer();
        renderer.on_streams_added(&remote("p1"), &[video("v1", false)]);
        renderer.on_streams_muted_changed(&remote("p1"), &[video("v1", true)]);
        assert!(state.roster().participant("p1").unwrap().is_muted);

        renderer.on_streams_removed(&remote("p1"), &[video("v1", true)]);
        renderer.on_streams_muted_changed(&remote("p1"), &[video("v1", false)]);
        assert!(!state.roster().contains("p1"));
    }

    #[test]
    fn mute_change_leaves_other_entries_untouched() {
        let (state, renderer) = renderer();
        renderer.on_streams_added(&remote("p1"), &[video("v1", false)]);
        renderer.on_streams_added(&remote("p2"), &[video("v2", false)]);
        let before = state.roster().participant("p2").cloned();

        renderer.on_streams_muted_changed(&remote("p1"), &[video("v1", true)]);

        assert_eq!(state.roster().participant("p2").cloned(), before);
    }

    #[test]
    fn errors_overwrite() {
        let (state, renderer) = renderer();
        renderer.on_error("first".into());
        renderer.on_error("second".into());
        assert_eq!(state.error(), "second");
    }

    #[test]
    fn projection_stop_while_idle_releases_capture() {
        let state = Arc::new(StageState::new());
        let capture = Arc::new(CaptureManager::new(Arc::new(FakePlatform::new())));
        let projection = Arc::new(FakeProjection::new());
        let handler = Arc::new(ProjectionStopHandler::new(state, capture.clone()));
        capture.acquire(projection.clone(), handler).unwrap();

        projection.revoke();

        assert!(!capture.is_active());
        assert_eq!(projection.displays_released(), 1);
    }

    #[test]
    fn projection_stop_while_sharing_defers() {
        let state = Arc::new(StageState::new());
        let capture = Arc::new(CaptureManager::new(Arc::new(FakePlatform::new())));
        let projection = Arc::new(FakeProjection::new());
        let handler = Arc::new(ProjectionStopHandler::new(state.clone(), capture.clone()));
        capture.acquire(projection.clone(), handler).unwrap();
        state.set_sharing(true);

        projection.revoke();

        assert!(capture.is_active());
        assert_eq!(projection.displays_released(), 0);
    }
}
