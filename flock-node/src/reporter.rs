use crate::state::RaftStateMachine;
use flock_core::Shutdown;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::info;

/// Logs the node's `(term, role, leader)` at a fixed cadence. Read-only.
pub(crate) struct Reporter {
    context: Arc<RaftStateMachine>,
    report_interval: Duration,
    shutdown: Shutdown,
    _shutdown_complete: mpsc::UnboundedSender<()>,
}

impl Reporter {
    pub(crate) fn new(
        context: Arc<RaftStateMachine>,
        report_interval: Duration,
        shutdown: Shutdown,
        shutdown_complete: mpsc::UnboundedSender<()>,
    ) -> Reporter {
        Reporter {
            context,
            report_interval,
            shutdown,
            _shutdown_complete: shutdown_complete,
        }
    }

    pub(crate) async fn run(&mut self) {
        info!(interval = ?self.report_interval, "start state reporter");

        while !self.shutdown.is_shutdown() {
            let status = self.context.status().await;
            info!(
                name = %self.context.name(),
                term = status.term,
                role = %status.role,
                leader = ?status.leader,
                "report state"
            );

            if !self.shutdown.sleep(self.report_interval).await {
                break;
            }
        }

        info!("reporter stopped");
    }
}
