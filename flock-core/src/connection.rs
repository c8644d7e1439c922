use crate::Result;
use bytes::BytesMut;
use std::io;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufWriter};
use tokio::net::TcpStream;

/// A line-oriented connection to a peer.
///
/// Requests are `\n`-terminated, responses `\r\n`-terminated; `read_line`
/// accepts either and returns the line without its terminator.
#[derive(Debug)]
pub struct Connection {
    stream: BufWriter<TcpStream>,
    buffer: BytesMut,
}

impl Connection {
    pub fn new(socket: TcpStream) -> Connection {
        Connection {
            stream: BufWriter::new(socket),
            buffer: BytesMut::with_capacity(4 * 1024),
        }
    }

    /// Reads the next line. Returns `None` once the peer has closed the
    /// connection cleanly.
    pub async fn read_line(&mut self) -> Result<Option<String>> {
        loop {
            if let Some(line) = self.parse_line()? {
                return Ok(Some(line));
            }

            // There is not enough buffered data for a full line. Attempt to
            // read more data from the socket.
            //
            // On success, the number of bytes is returned. `0` indicates "end
            // of stream".
            if 0 == self.stream.read_buf(&mut self.buffer).await? {
                return if self.buffer.is_empty() {
                    Ok(None)
                } else {
                    Err("connection reset by peer".into())
                };
            }
        }
    }

    fn parse_line(&mut self) -> Result<Option<String>> {
        let pos = match self.buffer.iter().position(|&b| b == b'\n') {
            Some(pos) => pos,
            None => return Ok(None),
        };

        let frame = self.buffer.split_to(pos + 1);
        let line = std::str::from_utf8(&frame[..pos])?;

        Ok(Some(line.trim_end_matches('\r').to_string()))
    }

    /// Writes an already-terminated frame and flushes it.
    pub async fn write_frame(&mut self, frame: &[u8]) -> io::Result<()> {
        self.stream.write_all(frame).await?;
        self.stream.flush().await
    }
}
