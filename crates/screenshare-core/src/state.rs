//! Observable state of the stage session.
//!
//! Every field is a `watch` channel carrying a whole snapshot, so readers
//! never see a torn update. Only the controller and its callbacks write.

use std::sync::{Mutex, PoisonError};

use tokio::sync::watch;

use crate::participants::Roster;
use crate::stage::{ConnectionState, LocalStream};

pub struct StageState {
    connection_state: watch::Sender<ConnectionState>,
    roster: watch::Sender<Roster>,
    is_sharing: watch::Sender<bool>,
    error: watch::Sender<String>,
    invalid_token: watch::Sender<bool>,
    publish_set: Mutex<Vec<LocalStream>>,
}

impl StageState {
    pub fn new() -> Self {
        Self {
            connection_state: watch::Sender::new(ConnectionState::Disconnected),
            roster: watch::Sender::new(Roster::new()),
            is_sharing: watch::Sender::new(false),
            error: watch::Sender::new(String::new()),
            invalid_token: watch::Sender::new(false),
            publish_set: Mutex::new(Vec::new()),
        }
    }

    pub fn connection_state(&self) -> ConnectionState {
        *self.connection_state.borrow()
    }

    pub fn subscribe_connection_state(&self) -> watch::Receiver<ConnectionState> {
        self.connection_state.subscribe()
    }

    pub(crate) fn set_connection_state(&self, state: ConnectionState) {
        self.connection_state.send_replace(state);
    }

    pub fn roster(&self) -> Roster {
        self.roster.borrow().clone()
    }

    pub fn subscribe_roster(&self) -> watch::Receiver<Roster> {
        self.roster.subscribe()
    }

    /// Apply `f` to the roster and publish the result if it reports a change.
    pub(crate) fn update_roster(&self, f: impl FnOnce(&mut Roster) -> bool) -> bool {
        self.roster.send_if_modified(f)
    }

    pub fn is_sharing(&self) -> bool {
        *self.is_sharing.borrow()
    }

    pub fn subscribe_sharing(&self) -> watch::Receiver<bool> {
        self.is_sharing.subscribe()
    }

    pub(crate) fn set_sharing(&self, sharing: bool) {
        self.is_sharing.send_replace(sharing);
    }

    /// Latest error text; empty when there is none.
    pub fn error(&self) -> String {
        self.error.borrow().clone()
    }

    pub fn subscribe_error(&self) -> watch::Receiver<String> {
        self.error.subscribe()
    }

    pub(crate) fn set_error(&self, message: impl Into<String>) {
        self.error.send_replace(message.into());
    }

    pub fn is_invalid_token(&self) -> bool {
        *self.invalid_token.borrow()
    }

    pub fn subscribe_invalid_token(&self) -> watch::Receiver<bool> {
        self.invalid_token.subscribe()
    }

    pub(crate) fn set_invalid_token(&self, invalid: bool) {
        self.invalid_token.send_replace(invalid);
    }

    pub fn publish_set(&self) -> Vec<LocalStream> {
        self.publish_set
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub(crate) fn replace_publish_set(&self, streams: Vec<LocalStream>) {
        *self
            .publish_set
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = streams;
    }
}

impl Default for StageState {
    fn default() -> Self {
        Self::new()
    }
}
