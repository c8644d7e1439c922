use tokio::sync::mpsc;

/// Producer half of the heartbeat wake-up; connection handlers raise it
/// whenever a heartbeat is accepted.
#[derive(Debug, Clone)]
pub(crate) struct HeartbeatSender {
    tx: mpsc::Sender<()>,
}

/// Consumer half; the follower loop waits on it, one wake-up per
/// observation.
#[derive(Debug)]
pub(crate) struct HeartbeatSignal {
    rx: mpsc::Receiver<()>,
    _tx: mpsc::Sender<()>,
}

/// A single-slot wake-up: raises between observations collapse into one.
pub(crate) fn heartbeat_signal() -> (HeartbeatSender, HeartbeatSignal) {
    let (tx, rx) = mpsc::channel(1);
    (
        HeartbeatSender { tx: tx.clone() },
        HeartbeatSignal { rx, _tx: tx },
    )
}

impl HeartbeatSender {
    /// Raises the signal. A raise that is already pending absorbs this one.
    pub(crate) fn raise(&mut self) {
        let _ = self.tx.try_send(());
    }
}

impl HeartbeatSignal {
    /// Completes once the signal has been raised since the last wait, and
    /// consumes the pending raise.
    pub(crate) async fn wait(&mut self) {
        let _ = self.rx.recv().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time;

    #[tokio::test]
    async fn a_raise_wakes_one_wait() {
        let (mut tx, mut signal) = heartbeat_signal();

        tx.raise();

        assert!(time::timeout(Duration::from_millis(10), signal.wait())
            .await
            .is_ok());
        assert!(time::timeout(Duration::from_millis(10), signal.wait())
            .await
            .is_err());
    }

    #[tokio::test]
    async fn raises_collapse_while_unobserved() {
        let (mut tx, mut signal) = heartbeat_signal();

        tx.raise();
        tx.raise();
        tx.raise();

        assert!(time::timeout(Duration::from_millis(10), signal.wait())
            .await
            .is_ok());
        assert!(time::timeout(Duration::from_millis(10), signal.wait())
            .await
            .is_err());
    }

    #[tokio::test]
    async fn wait_blocks_until_raised() {
        let (mut tx, mut signal) = heartbeat_signal();

        assert!(time::timeout(Duration::from_millis(10), signal.wait())
            .await
            .is_err());

        tx.raise();
        assert!(time::timeout(Duration::from_millis(10), signal.wait())
            .await
            .is_ok());
    }
}
