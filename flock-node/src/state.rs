use crate::config::Member;
use flock_codec::ErrorCode;
use std::fmt;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::info;

/// The node's position in the election state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Follower,
    Candidate,
    Leader,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let role = match self {
            Role::Follower => "FOLLOWER",
            Role::Candidate => "CANDIDATE",
            Role::Leader => "LEADER",
        };
        role.fmt(f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum StateError {
    #[error("transition not allowed in current role")]
    WrongState,

    #[error("term is lower than current term")]
    TermIsLower,
}

impl From<StateError> for ErrorCode {
    fn from(err: StateError) -> ErrorCode {
        match err {
            StateError::WrongState => ErrorCode::WrongState,
            StateError::TermIsLower => ErrorCode::TermIsLower,
        }
    }
}

/// A point-in-time view of the guarded fields, for reporting and tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Status {
    pub term: u64,
    pub role: Role,
    pub leader: Option<String>,
}

#[derive(Debug)]
struct NodeState {
    role: Role,
    term: u64,
    leader: Option<String>,
}

/// The election state machine. Role, term and leader are only mutated under
/// the mutex; the identity and the peer set are fixed at startup.
#[derive(Debug)]
pub struct RaftStateMachine {
    name: String,
    peers: Vec<Member>,
    inner: Mutex<NodeState>,
}

impl RaftStateMachine {
    pub fn new(name: &str, peers: Vec<Member>) -> RaftStateMachine {
        RaftStateMachine {
            name: name.to_string(),
            peers,
            inner: Mutex::new(NodeState {
                role: Role::Follower,
                term: 0,
                leader: None,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn peers(&self) -> &[Member] {
        &self.peers
    }

    pub async fn role(&self) -> Role {
        self.inner.lock().await.role
    }

    pub async fn term(&self) -> u64 {
        self.inner.lock().await.term
    }

    pub async fn status(&self) -> Status {
        let state = self.inner.lock().await;
        Status {
            term: state.term,
            role: state.role,
            leader: state.leader.clone(),
        }
    }

    /// FOLLOWER -> CANDIDATE. Opens a new term.
    pub async fn promote_to_candidate(&self) -> Result<(), StateError> {
        let mut state = self.inner.lock().await;
        if state.role != Role::Follower {
            return Err(StateError::WrongState);
        }
        state.term += 1;
        state.leader = None;
        state.role = Role::Candidate;
        info!(term = state.term, "promoted to candidate");
        Ok(())
    }

    /// CANDIDATE -> LEADER.
    pub async fn promote_to_leader(&self) -> Result<(), StateError> {
        let mut state = self.inner.lock().await;
        if state.role != Role::Candidate {
            return Err(StateError::WrongState);
        }
        state.leader = None;
        state.role = Role::Leader;
        info!(term = state.term, "promoted to leader");
        Ok(())
    }

    /// Any role -> FOLLOWER.
    pub async fn step_down(&self) {
        let mut state = self.inner.lock().await;
        state.role = Role::Follower;
    }

    /// Records `leader` as the leader for `term` and returns to FOLLOWER.
    pub async fn set_leader(&self, term: u64, leader: &str) {
        let mut state = self.inner.lock().await;
        apply_set_leader(&mut state, term, leader);
    }

    /// Handles `heartbeat <term> <name>`. A heartbeat that is not stale
    /// always leaves this node a follower of the sender.
    pub async fn heartbeat_from_leader(&self, term: u64, leader: &str) -> Result<String, StateError> {
        let mut state = self.inner.lock().await;
        if state.term > term {
            return Err(StateError::TermIsLower);
        }

        if state.leader.as_deref() != Some(leader) {
            apply_set_leader(&mut state, term, leader);
        } else {
            state.role = Role::Follower;
            if state.term < term {
                state.term = term;
            }
        }

        Ok(self.name.clone())
    }

    /// Handles `vote <term> <name>`. Only a follower may grant a vote; the
    /// accepted candidate is recorded as leader-elect for that term.
    pub async fn vote_from_candidate(
        &self,
        term: u64,
        candidate: &str,
    ) -> Result<String, StateError> {
        let mut state = self.inner.lock().await;
        if state.role != Role::Follower {
            return Err(StateError::WrongState);
        }
        if state.term > term {
            return Err(StateError::TermIsLower);
        }

        apply_set_leader(&mut state, term, candidate);

        Ok(self.name.clone())
    }
}

fn apply_set_leader(state: &mut NodeState, term: u64, leader: &str) {
    info!(term, leader = %leader, "new leader elected");
    state.term = term;
    state.leader = Some(leader.to_string());
    state.role = Role::Follower;
}
