use std::time::Duration;

use tokio::sync::watch;

/// Readiness of the platform foreground service that keeps capture alive
/// in the background.
///
/// The host starts the service before requesting a projection and stops it
/// once this signal drops back to not-ready.
pub struct CaptureService {
    ready: watch::Sender<bool>,
    ready_delay: Duration,
}

impl CaptureService {
    pub fn new(ready_delay: Duration) -> Self {
        Self {
            ready: watch::Sender::new(false),
            ready_delay,
        }
    }

    pub fn set_ready(&self, ready: bool) {
        tracing::debug!("setting capture service ready: {ready}");
        self.ready.send_replace(ready);
    }

    pub fn is_ready(&self) -> bool {
        *self.ready.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.ready.subscribe()
    }

    /// Called once the host's foreground notification is posted.
    /// Readiness is signalled after the settle delay.
    pub async fn start(&self) {
        tokio::time::sleep(self.ready_delay).await;
        self.set_ready(true);
        tracing::info!("capture service started");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn start_marks_ready_after_delay() {
        let service = CaptureService::new(Duration::from_millis(200));
        let mut rx = service.subscribe();
        assert!(!service.is_ready());

        service.start().await;

        assert!(service.is_ready());
        assert!(rx.has_changed().unwrap());
        assert!(*rx.borrow_and_update());
    }

    #[test]
    fn set_ready_false_is_observable() {
        let service = CaptureService::new(Duration::ZERO);
        service.set_ready(true);
        let rx = service.subscribe();
        service.set_ready(false);
        assert!(!*rx.borrow());
    }
}
