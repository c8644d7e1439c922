use crate::signal::HeartbeatSender;
use crate::state::RaftStateMachine;
use bytes::BytesMut;
use flock_codec::{ErrorCode, Request, Response};
use flock_core::{Connection, Result, Shutdown};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc, Semaphore};
use tokio::time::{self, Duration};
use tracing::{debug, error, info, instrument, trace};

const MAX_CONNECTIONS: usize = 250;

/// Accepts peer connections and spawns a handler per connection.
pub(crate) struct Listener {
    pub(crate) listener: TcpListener,
    pub(crate) context: Arc<RaftStateMachine>,
    pub(crate) heartbeat: HeartbeatSender,
    pub(crate) limit_connections: Arc<Semaphore>,
    pub(crate) notify_shutdown: broadcast::Sender<()>,
    pub(crate) shutdown_complete_tx: mpsc::UnboundedSender<()>,
}

/// Serves one peer connection: reads request lines until the peer closes,
/// writing exactly one response line per request.
struct Handler {
    connection: Connection,
    context: Arc<RaftStateMachine>,
    heartbeat: HeartbeatSender,
    limit_connections: Arc<Semaphore>,
    shutdown: Shutdown,
    _shutdown_complete: mpsc::UnboundedSender<()>,
}

impl Listener {
    pub(crate) fn new(
        listener: TcpListener,
        context: Arc<RaftStateMachine>,
        heartbeat: HeartbeatSender,
        notify_shutdown: broadcast::Sender<()>,
        shutdown_complete_tx: mpsc::UnboundedSender<()>,
    ) -> Listener {
        Listener {
            listener,
            context,
            heartbeat,
            limit_connections: Arc::new(Semaphore::new(MAX_CONNECTIONS)),
            notify_shutdown,
            shutdown_complete_tx,
        }
    }

    pub(crate) async fn run(&mut self) -> Result<()> {
        info!("accepting peer connections");

        loop {
            self.limit_connections.acquire().await.forget();
            let (socket, addr) = self.accept().await?;
            trace!(peer = %addr, "peer connected");

            let mut handler = Handler {
                connection: Connection::new(socket),
                context: self.context.clone(),
                heartbeat: self.heartbeat.clone(),
                limit_connections: self.limit_connections.clone(),
                shutdown: Shutdown::listen(&self.notify_shutdown),
                _shutdown_complete: self.shutdown_complete_tx.clone(),
            };

            tokio::spawn(async move {
                if let Err(err) = handler.run().await {
                    error!(cause = ?err, peer = %addr, "connection error");
                }
            });
        }
    }

    async fn accept(&mut self) -> Result<(TcpStream, SocketAddr)> {
        let mut backoff = 1;
        loop {
            match self.listener.accept().await {
                Ok((socket, addr)) => return Ok((socket, addr)),
                Err(err) => {
                    if backoff > 64 {
                        return Err(err.into());
                    }
                }
            }

            time::delay_for(Duration::from_secs(backoff)).await;
            backoff *= 2;
        }
    }
}

impl Handler {
    #[instrument(skip(self))]
    async fn run(&mut self) -> Result<()> {
        while !self.shutdown.is_shutdown() {
            let maybe_line = tokio::select! {
                res = self.connection.read_line() => res?,
                _ = self.shutdown.recv() => {
                    return Ok(())
                }
            };
            let line = match maybe_line {
                Some(line) => line,
                None => return Ok(()),
            };
            if line.is_empty() {
                continue;
            }
            self.process(&line).await?;
        }
        Ok(())
    }

    async fn process(&mut self, line: &str) -> Result<()> {
        let response = match Request::parse(line) {
            Ok(Request::Heartbeat { term, leader }) => {
                trace!(term, leader = %leader, "got heartbeat message");
                match self.context.heartbeat_from_leader(term, &leader).await {
                    Ok(name) => {
                        // state update first, then the wake-up
                        self.heartbeat.raise();
                        Response::Ok(name)
                    }
                    Err(err) => Response::Err(err.into()),
                }
            }
            Ok(Request::Vote { term, candidate }) => {
                trace!(term, candidate = %candidate, "got vote request");
                match self.context.vote_from_candidate(term, &candidate).await {
                    Ok(name) => Response::Ok(name),
                    Err(err) => Response::Err(err.into()),
                }
            }
            Err(err) => {
                error!(cause = %err, line = %line, "failed to handle request");
                Response::Err(ErrorCode::Unknown)
            }
        };

        debug!(response = ?response, "send reply");
        let mut buf = BytesMut::new();
        response.to_buf(&mut buf);
        self.connection.write_frame(&buf).await?;
        Ok(())
    }
}

impl Drop for Handler {
    fn drop(&mut self) {
        self.limit_connections.add_permits(1);
    }
}
