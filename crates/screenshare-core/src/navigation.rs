use std::time::Duration;

use tokio::sync::watch;

use crate::controller::StageController;

/// Screen the shell should be showing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Destination {
    /// Token entry. Initial state.
    #[default]
    Token,
    Watch,
    Share,
    /// Transient: the host should dispose capture and close.
    Finish,
}

/// Sequences the user through token entry, the stage views and teardown.
pub struct Navigator {
    destination: watch::Sender<Destination>,
    loading: watch::Sender<bool>,
    finish_delay: Duration,
}

impl Navigator {
    pub fn new(finish_delay: Duration) -> Self {
        Self {
            destination: watch::Sender::new(Destination::Token),
            loading: watch::Sender::new(false),
            finish_delay,
        }
    }

    pub fn destination(&self) -> Destination {
        *self.destination.borrow()
    }

    pub fn subscribe_destination(&self) -> watch::Receiver<Destination> {
        self.destination.subscribe()
    }

    pub fn is_loading(&self) -> bool {
        *self.loading.borrow()
    }

    pub fn subscribe_loading(&self) -> watch::Receiver<bool> {
        self.loading.subscribe()
    }

    pub fn set_loading(&self, loading: bool) {
        self.loading.send_replace(loading);
    }

    pub fn go_to(&self, destination: Destination) {
        self.destination.send_if_modified(|current| {
            if *current == destination {
                return false;
            }
            tracing::debug!("going to: {destination:?}");
            *current = destination;
            true
        });
    }

    /// Step back one screen. Leaving the watch view leaves the stage;
    /// backing out of token entry passes through `Finish`.
    pub async fn go_back(&self, controller: &StageController) {
        match self.destination() {
            Destination::Share => {
                tracing::debug!("going back to Watch");
                self.go_to(Destination::Watch);
            }
            Destination::Watch => {
                tracing::debug!("going back to Token");
                controller.leave_stage().await;
                self.go_to(Destination::Token);
            }
            Destination::Token | Destination::Finish => {
                self.go_to(Destination::Finish);
                tokio::time::sleep(self.finish_delay).await;
                self.go_to(Destination::Token);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_at_token_entry() {
        let nav = Navigator::new(Duration::ZERO);
        assert_eq!(nav.destination(), Destination::Token);
        assert!(!nav.is_loading());
    }

    #[test]
    fn go_to_same_destination_is_silent() {
        let nav = Navigator::new(Duration::ZERO);
        let mut rx = nav.subscribe_destination();
        rx.mark_unchanged();

        nav.go_to(Destination::Token);
        assert!(!rx.has_changed().unwrap());

        nav.go_to(Destination::Watch);
        assert!(rx.has_changed().unwrap());
        assert_eq!(*rx.borrow_and_update(), Destination::Watch);
    }

    #[test]
    fn loading_flag_round_trips() {
        let nav = Navigator::new(Duration::ZERO);
        nav.set_loading(true);
        assert!(nav.is_loading());
        nav.set_loading(false);
        assert!(!nav.is_loading());
    }
}
