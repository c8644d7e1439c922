use crate::config::NodeConfig;
use crate::signal::HeartbeatSignal;
use crate::state::{RaftStateMachine, Role, StateError};
use flock_client::broadcast;
use flock_codec::{ErrorCode, Request, Response};
use flock_core::{Result, Shutdown};
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time;
use tracing::{debug, info, warn};

/// Outcome of a single bounded wait for a leader heartbeat.
enum Wait {
    Heartbeat,
    Timeout,
    Shutdown,
}

/// Drives the node through the follower, candidate and leader loops, forever.
pub(crate) struct Actor {
    context: Arc<RaftStateMachine>,
    heartbeat: HeartbeatSignal,
    peers: Vec<String>,
    leader_timeout: Duration,
    election_timeout_jitter: f64,
    vote_interval: Duration,
    heartbeat_interval: Duration,
    shutdown: Shutdown,
    _shutdown_complete: mpsc::UnboundedSender<()>,
}

impl Actor {
    pub(crate) fn new(
        context: Arc<RaftStateMachine>,
        heartbeat: HeartbeatSignal,
        config: &NodeConfig,
        shutdown: Shutdown,
        shutdown_complete: mpsc::UnboundedSender<()>,
    ) -> Actor {
        let peers = context.peers().iter().map(|member| member.addr()).collect();
        Actor {
            context,
            heartbeat,
            peers,
            leader_timeout: Duration::from_secs_f64(config.leader_timeout),
            election_timeout_jitter: config.election_timeout_jitter,
            vote_interval: Duration::from_secs_f64(config.vote_interval),
            heartbeat_interval: Duration::from_secs_f64(config.heartbeat_interval),
            shutdown,
            _shutdown_complete: shutdown_complete,
        }
    }

    pub(crate) async fn run(&mut self) -> Result<()> {
        info!("start raft worker");

        while !self.shutdown.is_shutdown() {
            self.act_as_follower().await?;
            self.act_as_candidate().await?;
            self.act_as_leader().await?;
        }

        info!("worker stopped");
        Ok(())
    }

    /// A follower only responds to leader heartbeats. When they stop coming
    /// it waits out a randomized grace window and stands for election.
    async fn act_as_follower(&mut self) -> Result<()> {
        info!(role = %Role::Follower, "run as follower");

        while !self.shutdown.is_shutdown() && self.context.role().await == Role::Follower {
            debug!(timeout = ?self.leader_timeout, "waiting heartbeat");
            match self.wait_for_leader(self.leader_timeout).await {
                Wait::Heartbeat => {
                    debug!("heartbeat received");
                    continue;
                }
                Wait::Shutdown => return Ok(()),
                Wait::Timeout => warn!("leader timeout"),
            }

            let jitter = self.election_jitter();
            warn!(jitter = ?jitter, "wait for election timeout");
            match self.wait_for_leader(jitter).await {
                Wait::Heartbeat => continue,
                Wait::Shutdown => return Ok(()),
                Wait::Timeout => {
                    warn!("election timeout");
                    self.context.promote_to_candidate().await?;
                }
            }
        }

        Ok(())
    }

    /// A candidate solicits votes until any peer grants one, then takes the
    /// leader role. A heartbeat from an elected leader ends the campaign by
    /// flipping the role back to follower.
    async fn act_as_candidate(&mut self) -> Result<()> {
        info!(role = %Role::Candidate, "run as candidate");

        while !self.shutdown.is_shutdown() && self.context.role().await == Role::Candidate {
            let term = self.context.term().await;
            let request = Request::Vote {
                term,
                candidate: self.context.name().to_string(),
            };
            debug!(term, "sending vote requests");
            let responses = broadcast(&self.peers, &request).await?;
            let votes = responses
                .iter()
                .filter(|response| response.is_positive())
                .count();

            if votes > 0 {
                match self.context.promote_to_leader().await {
                    Ok(()) => {}
                    // Another leader claimed the term while the ballots were
                    // in flight; the supervising loop re-reads the role.
                    Err(StateError::WrongState) => warn!("no longer a candidate, abandoning election"),
                    Err(err) => return Err(err.into()),
                }
                break;
            }

            warn!(interval = ?self.vote_interval, "wait for the next vote");
            if !self.shutdown.sleep(self.vote_interval).await {
                return Ok(());
            }
        }

        Ok(())
    }

    /// A leader periodically asserts liveness towards every peer. A reply
    /// rejecting the heartbeat as stale means a peer has opened a newer
    /// term, so the leader steps down and rejoins the followers.
    async fn act_as_leader(&mut self) -> Result<()> {
        info!(role = %Role::Leader, "run as leader");

        while !self.shutdown.is_shutdown() && self.context.role().await == Role::Leader {
            let term = self.context.term().await;
            let request = Request::Heartbeat {
                term,
                leader: self.context.name().to_string(),
            };
            debug!(term, "sending heartbeats");
            let responses = broadcast(&self.peers, &request).await?;
            debug!(responses = ?responses, "heartbeat replies");

            let deposed = responses
                .iter()
                .any(|response| matches!(response, Response::Err(ErrorCode::TermIsLower)));
            if deposed {
                warn!(term, "a peer reports a higher term, stepping down");
                self.context.step_down().await;
                break;
            }

            if !self.shutdown.sleep(self.heartbeat_interval).await {
                return Ok(());
            }
        }

        Ok(())
    }

    /// Waits for the heartbeat signal, bounded by `duration`. The timer
    /// firing and the supervisor shutting down are reported separately so
    /// the caller can tell a missing leader from a stopping node.
    async fn wait_for_leader(&mut self, duration: Duration) -> Wait {
        tokio::select! {
            res = time::timeout(duration, self.heartbeat.wait()) => match res {
                Ok(()) => Wait::Heartbeat,
                Err(_) => Wait::Timeout,
            },
            _ = self.shutdown.recv() => Wait::Shutdown,
        }
    }

    fn election_jitter(&self) -> Duration {
        if self.election_timeout_jitter > 0.0 {
            let jitter = rand::thread_rng().gen_range(0.0, self.election_timeout_jitter);
            Duration::from_secs_f64(jitter)
        } else {
            Duration::from_millis(0)
        }
    }
}
