use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time;

/// Tracks the process-wide shutdown broadcast for one task. The first
/// signal latches (a dropped sender side counts as one); afterwards
/// `is_shutdown` stays true and `recv` completes immediately.
#[derive(Debug)]
pub struct Shutdown {
    seen: bool,
    notify: broadcast::Receiver<()>,
}

impl Shutdown {
    /// Subscribes a new listener to the shutdown broadcast.
    pub fn listen(notify: &broadcast::Sender<()>) -> Shutdown {
        Shutdown {
            seen: false,
            notify: notify.subscribe(),
        }
    }

    pub fn is_shutdown(&self) -> bool {
        self.seen
    }

    /// Completes once shutdown has been signalled.
    pub async fn recv(&mut self) {
        if !self.seen {
            let _ = self.notify.recv().await;
            self.seen = true;
        }
    }

    /// Sleeps for `duration` unless shutdown arrives first; returns `false`
    /// on shutdown.
    pub async fn sleep(&mut self, duration: Duration) -> bool {
        tokio::select! {
            _ = time::delay_for(duration) => true,
            _ = self.recv() => false,
        }
    }
}
