//! A single cluster member: the TCP server answering peer commands, the
//! role loops driving elections, and the periodic state reporter.

mod actor;
mod config;
mod reporter;
mod server;
mod signal;
mod state;

pub use config::{ConfigError, Member, NodeConfig};
pub use state::{RaftStateMachine, Role, StateError, Status};

use actor::Actor;
use anyhow::Context;
use flock_core::Shutdown;
use futures::Future;
use reporter::Reporter;
use server::Listener;
use std::fs;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tracing::{error, info};

/// A fully wired node, not yet serving.
pub struct Node {
    config: NodeConfig,
    context: Arc<RaftStateMachine>,
}

impl Node {
    pub fn new(config: NodeConfig) -> anyhow::Result<Node> {
        let peers = config.peers().context("invalid member roster")?;
        let context = Arc::new(RaftStateMachine::new(&config.name, peers));
        Ok(Node { config, context })
    }

    /// A shared handle onto the election state, for observation.
    pub fn context(&self) -> Arc<RaftStateMachine> {
        self.context.clone()
    }

    /// Serves until the `shutdown` future completes, then drains every task
    /// and live connection before returning.
    pub async fn run(self, shutdown: impl Future) -> anyhow::Result<()> {
        fs::create_dir_all(&self.config.data_dir).with_context(|| {
            format!("failed to create data directory {}", self.config.data_dir)
        })?;

        let addr = format!("{}:{}", self.config.addr, self.config.port);
        let listener = TcpListener::bind(&addr)
            .await
            .with_context(|| format!("failed to bind {}", addr))?;
        info!(name = %self.config.name, addr = %addr, "server listening");

        let (notify_shutdown, _) = broadcast::channel(1);
        let (shutdown_complete_tx, mut shutdown_complete_rx) = mpsc::unbounded_channel();
        let (heartbeat_tx, heartbeat_rx) = signal::heartbeat_signal();

        let mut server = Listener::new(
            listener,
            self.context.clone(),
            heartbeat_tx,
            notify_shutdown.clone(),
            shutdown_complete_tx.clone(),
        );

        let mut actor = Actor::new(
            self.context.clone(),
            heartbeat_rx,
            &self.config,
            Shutdown::listen(&notify_shutdown),
            shutdown_complete_tx.clone(),
        );
        tokio::spawn(async move {
            if let Err(err) = actor.run().await {
                error!(cause = %err, "raft worker failed");
                std::process::exit(255);
            }
        });

        let mut reporter = Reporter::new(
            self.context.clone(),
            Duration::from_secs_f64(self.config.report_interval),
            Shutdown::listen(&notify_shutdown),
            shutdown_complete_tx.clone(),
        );
        tokio::spawn(async move {
            reporter.run().await;
        });

        tokio::select! {
            res = server.run() => {
                if let Err(err) = res {
                    error!(cause = %err, "failed to accept");
                }
            }
            _ = shutdown => {
                info!("shutting down");
            }
        }

        drop(server);
        drop(notify_shutdown);
        drop(shutdown_complete_tx);
        let _ = shutdown_complete_rx.recv().await;
        info!("bye");

        Ok(())
    }
}

/// Builds a node from `config` and serves it until `shutdown` completes.
pub async fn run(config: NodeConfig, shutdown: impl Future) -> anyhow::Result<()> {
    Node::new(config)?.run(shutdown).await
}
