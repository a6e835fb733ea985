use crate::stage::StageStream;

/// Reserved roster id for the local screen-share tile.
///
/// Also used as the virtual display name.
pub const SCREEN_SHARE_ID: &str = "ScreenShareStream";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Participant {
    pub id: String,
    pub stream: Option<StageStream>,
    pub is_muted: bool,
}

impl Participant {
    /// Roster entry for a remote participant, keyed on its first video stream.
    pub fn remote(id: impl Into<String>, stream: Option<StageStream>) -> Self {
        let is_muted = stream.as_ref().is_none_or(|s| s.muted);
        Self {
            id: id.into(),
            stream,
            is_muted,
        }
    }

    pub fn screen_share(stream: StageStream) -> Self {
        Self {
            id: SCREEN_SHARE_ID.to_string(),
            stream: Some(stream),
            is_muted: false,
        }
    }

    pub fn is_screen_share(&self) -> bool {
        self.id == SCREEN_SHARE_ID
    }

    /// Whether the UI should render a live preview for this entry.
    pub fn has_preview(&self) -> bool {
        match &self.stream {
            Some(stream) => !stream.muted && !self.is_muted,
            None => false,
        }
    }
}

/// Ordered set of participants believed to be on stage.
///
/// Snapshots are published whole through the state container; the
/// controller is the only writer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Roster {
    participants: Vec<Participant>,
}

impl Roster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `participant` unless its id is already present.
    /// Returns whether the roster changed.
    pub fn add(&mut self, participant: Participant) -> bool {
        if self.contains(&participant.id) {
            return false;
        }
        self.participants.push(participant);
        true
    }

    pub fn remove(&mut self, id: &str) -> bool {
        let before = self.participants.len();
        self.participants.retain(|p| p.id != id);
        self.participants.len() != before
    }

    /// Replace the stream reference and mute flag of an existing entry.
    pub fn update_stream(&mut self, id: &str, stream: StageStream) -> bool {
        match self.participants.iter_mut().find(|p| p.id == id) {
            Some(p) => {
                p.is_muted = stream.muted;
                p.stream = Some(stream);
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.participants.iter().any(|p| p.id == id)
    }

    pub fn participant(&self, id: &str) -> Option<&Participant> {
        self.participants.iter().find(|p| p.id == id)
    }

    pub fn participants(&self) -> &[Participant] {
        &self.participants
    }

    pub fn len(&self) -> usize {
        self.participants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }

    pub fn clear(&mut self) {
        self.participants.clear();
    }
}
