//! Newline-framed text I/O over a TCP connection with wall-clock read
//! deadlines.

use std::fmt;
use std::net::SocketAddr;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::time::{timeout_at, Instant};

/// Why a transport operation did not produce a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportError {
    /// No full line arrived before the deadline.
    Timeout,
    /// The peer closed the connection or the socket errored.
    Closed,
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportError::Timeout => write!(f, "read deadline expired"),
            TransportError::Closed => write!(f, "connection closed"),
        }
    }
}

impl std::error::Error for TransportError {}

/// One client connection, framed into newline-terminated text lines.
///
/// Reads are bounded by absolute deadlines so the round coordinator can
/// always fan back in. A partial line interrupted by a deadline stays
/// buffered and is completed by the next read.
pub struct LineTransport {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
    peer: SocketAddr,
    // Bytes of a line whose newline has not arrived yet. Kept outside the
    // read future so a cancelled read does not drop them.
    pending: Vec<u8>,
}

impl LineTransport {
    pub fn new(stream: TcpStream, peer: SocketAddr) -> Self {
        let (read_half, write_half) = stream.into_split();
        Self {
            reader: BufReader::new(read_half),
            writer: write_half,
            peer,
            pending: Vec::new(),
        }
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Writes `line` plus a trailing newline. Any I/O failure means the peer
    /// is gone.
    pub async fn send_line(&mut self, line: &str) -> Result<(), TransportError> {
        let mut framed = String::with_capacity(line.len() + 1);
        framed.push_str(line);
        framed.push('\n');
        self.writer
            .write_all(framed.as_bytes())
            .await
            .map_err(|_| TransportError::Closed)?;
        self.writer
            .flush()
            .await
            .map_err(|_| TransportError::Closed)
    }

    /// Waits until a full line is available or the wall-clock `deadline`
    /// passes. The returned line has its newline (and any carriage return)
    /// stripped.
    pub async fn read_line_deadline(
        &mut self,
        deadline: Instant,
    ) -> Result<String, TransportError> {
        match timeout_at(deadline, self.reader.read_until(b'\n', &mut self.pending)).await {
            Err(_) => Err(TransportError::Timeout),
            Ok(Ok(0)) => Err(TransportError::Closed),
            Ok(Ok(_)) => {
                let mut bytes = std::mem::take(&mut self.pending);
                while matches!(bytes.last(), Some(&b'\n') | Some(&b'\r')) {
                    bytes.pop();
                }
                Ok(String::from_utf8_lossy(&bytes).into_owned())
            }
            Ok(Err(_)) => Err(TransportError::Closed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::io::AsyncWriteExt;
    use tokio::net::TcpListener;

    async fn pair() -> (TcpStream, LineTransport) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (client, accepted) = tokio::join!(TcpStream::connect(addr), listener.accept());
        let (stream, peer) = accepted.unwrap();
        (client.unwrap(), LineTransport::new(stream, peer))
    }

    #[tokio::test]
    async fn test_read_line_strips_newline() {
        let (mut client, mut transport) = pair().await;
        client.write_all(b"BET 100\n").await.unwrap();
        let deadline = Instant::now() + Duration::from_secs(1);
        let line = transport.read_line_deadline(deadline).await.unwrap();
        assert_eq!(line, "BET 100");
    }

    #[tokio::test]
    async fn test_read_line_times_out() {
        let (_client, mut transport) = pair().await;
        let deadline = Instant::now() + Duration::from_millis(20);
        let err = transport.read_line_deadline(deadline).await.unwrap_err();
        assert_eq!(err, TransportError::Timeout);
    }

    #[tokio::test]
    async fn test_read_line_reports_closed_peer() {
        let (client, mut transport) = pair().await;
        drop(client);
        let deadline = Instant::now() + Duration::from_secs(1);
        let err = transport.read_line_deadline(deadline).await.unwrap_err();
        assert_eq!(err, TransportError::Closed);
    }

    #[tokio::test]
    async fn test_partial_line_survives_timeout() {
        let (mut client, mut transport) = pair().await;
        client.write_all(b"BET 1").await.unwrap();
        let deadline = Instant::now() + Duration::from_millis(50);
        let err = transport.read_line_deadline(deadline).await.unwrap_err();
        assert_eq!(err, TransportError::Timeout);

        client.write_all(b"00\n").await.unwrap();
        let deadline = Instant::now() + Duration::from_secs(1);
        let line = transport.read_line_deadline(deadline).await.unwrap();
        assert_eq!(line, "BET 100");
    }

    #[tokio::test]
    async fn test_send_line_appends_newline() {
        let (client, mut transport) = pair().await;
        transport.send_line("TIMEOUT").await.unwrap();
        let mut reader = BufReader::new(client);
        let mut line = String::new();
        reader.read_line(&mut line).await.unwrap();
        assert_eq!(line, "TIMEOUT\n");
    }
}
