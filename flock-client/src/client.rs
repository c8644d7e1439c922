use bytes::BytesMut;
use flock_codec::{Request, Response};
use flock_core::Connection;
use std::io;
use thiserror::Error;
use tokio::net::{TcpStream, ToSocketAddrs};
use tracing::{debug, instrument, trace, warn};

#[derive(Debug, Error)]
pub enum CallError {
    /// The peer is down. Broadcasts skip over this; everything else
    /// propagates.
    #[error("connection refused")]
    ConnectionRefused,

    #[error("connection closed before a response arrived")]
    Closed,

    #[error("i/o error: {0}")]
    Io(#[from] io::Error),

    #[error(transparent)]
    Codec(#[from] flock_codec::Error),

    #[error("connection error: {0}")]
    Connection(flock_core::Error),
}

pub struct Client {
    connection: Connection,
}

pub async fn connect<T: ToSocketAddrs>(addr: T) -> Result<Client, CallError> {
    let socket = TcpStream::connect(addr).await.map_err(|err| {
        if err.kind() == io::ErrorKind::ConnectionRefused {
            CallError::ConnectionRefused
        } else {
            CallError::Io(err)
        }
    })?;
    let connection = Connection::new(socket);
    Ok(Client { connection })
}

impl Client {
    /// Writes one request line and awaits the single reply line.
    #[instrument(skip(self))]
    pub async fn request(&mut self, request: &Request) -> Result<Response, CallError> {
        let mut buf = BytesMut::new();
        request.to_buf(&mut buf);
        self.connection.write_frame(&buf).await?;

        let line = self
            .connection
            .read_line()
            .await
            .map_err(CallError::Connection)?
            .ok_or(CallError::Closed)?;

        Ok(Response::parse(&line)?)
    }
}

/// One-shot RPC: a fresh connection per call, closed when the reply arrives.
pub async fn call(addr: &str, request: &Request) -> Result<Response, CallError> {
    trace!(addr = %addr, "open connection");
    let mut client = connect(addr).await?;
    let response = client.request(request).await?;
    trace!(addr = %addr, "close connection");
    Ok(response)
}

/// Sends `request` to every peer in order, collecting the successful replies.
/// Peers that refuse the connection are logged and skipped; any other failure
/// propagates to the caller.
pub async fn broadcast(peers: &[String], request: &Request) -> Result<Vec<Response>, CallError> {
    let mut responses = Vec::with_capacity(peers.len());

    for peer in peers {
        match call(peer, request).await {
            Ok(response) => {
                debug!(peer = %peer, response = ?response, "got reply");
                responses.push(response);
            }
            Err(CallError::ConnectionRefused) => {
                warn!(peer = %peer, "dialup failed");
            }
            Err(err) => return Err(err),
        }
    }

    Ok(responses)
}
