//! Chunked-body writer over a raw TCP connection.
//!
//! A stream is a single HTTP/1.0 `PATCH` request whose body is sent with
//! chunked transfer encoding:
//!
//! ```text
//! PATCH /tables/users/events HTTP/1.0\r\n
//! Host: localhost\r\n
//! Content-Type: application/json\r\n
//! Transfer-Encoding: chunked\r\n
//! \r\n
//! 4f\r\n{...79 bytes...}\r\n
//! 0\r\n\r\n
//! ```
//!
//! The server only answers once the terminating chunk arrives, so the
//! response read in [`StreamWriter::close`] is the acknowledgment that the
//! whole body was accepted.

use std::time::Duration;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader, BufWriter};
use tokio::net::TcpStream;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, info, warn};

use crate::config::ClientConfig;
use crate::error::{Result, SkyError};

/// Lifecycle of a [`StreamWriter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Unconnected,
    Connected,
    Closed,
}

enum Connection {
    Unconnected,
    Connected(BufWriter<TcpStream>),
    Closed,
}

impl Connection {
    fn state(&self) -> StreamState {
        match self {
            Connection::Unconnected => StreamState::Unconnected,
            Connection::Connected(_) => StreamState::Connected,
            Connection::Closed => StreamState::Closed,
        }
    }
}

/// Owns one socket and frames payloads onto it as HTTP chunks.
pub struct StreamWriter {
    address: String,
    path: String,
    header: Vec<u8>,
    timeout: Duration,
    conn: Connection,
}

impl StreamWriter {
    /// Create an unconnected writer that will `PATCH` to `path` on the
    /// configured server.
    pub fn new(config: &ClientConfig, path: impl Into<String>) -> Self {
        let path = path.into();
        Self {
            address: config.address(),
            header: request_header(&config.host, &path),
            path,
            timeout: config.stream_timeout,
            conn: Connection::Unconnected,
        }
    }

    pub fn state(&self) -> StreamState {
        self.conn.state()
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Drop any existing connection, dial, and write the request header.
    ///
    /// On failure the writer is left `Unconnected`.
    pub async fn reconnect(&mut self) -> Result<()> {
        self.conn = Connection::Unconnected;

        let mut socket = TcpStream::connect(&self.address)
            .await
            .map_err(|e| SkyError::Transport(format!("Unable to connect to {}: {e}", self.address)))?;
        socket
            .write_all(&self.header)
            .await
            .map_err(|e| SkyError::Transport(format!("Unable to send stream header to {}: {e}", self.address)))?;

        info!(address = %self.address, path = %self.path, "Event stream connected");
        self.conn = Connection::Connected(BufWriter::new(socket));
        Ok(())
    }

    /// Write `payload` as one chunk and flush it to the socket.
    ///
    /// An empty payload is the terminating chunk: the stream is finished
    /// exactly as by [`close`](Self::close), handshake included.
    pub async fn append(&mut self, payload: &[u8]) -> Result<()> {
        if payload.is_empty() {
            return self.close().await;
        }
        let conn = self.connection()?;
        write_chunk(conn, payload).await?;
        conn.flush().await?;
        Ok(())
    }

    pub async fn flush(&mut self) -> Result<()> {
        self.connection()?.flush().await?;
        Ok(())
    }

    /// Terminate the body and wait for the server's response.
    ///
    /// The socket is released whether or not the handshake succeeds.
    pub async fn close(&mut self) -> Result<()> {
        let mut conn = match std::mem::replace(&mut self.conn, Connection::Closed) {
            Connection::Connected(conn) => conn,
            other => {
                self.conn = other;
                return Err(SkyError::NotConnected);
            }
        };

        write_chunk(&mut conn, &[]).await?;
        conn.flush().await?;

        // The status line decides the outcome; draining the body is best-effort.
        let deadline = Instant::now() + self.timeout;
        let mut reader = BufReader::new(conn.into_inner());
        let response = timeout_at(deadline, read_response_head(&mut reader))
            .await
            .map_err(|_| {
                SkyError::Transport(format!(
                    "Timed out after {:?} waiting for {} to acknowledge stream",
                    self.timeout, self.address
                ))
            })??;

        match timeout_at(deadline, drain_body(&mut reader, response.body)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => debug!(path = %self.path, error = %e, "Stream response body unreadable"),
            Err(_) => debug!(path = %self.path, "Gave up draining stream response body"),
        }

        if response.status != 200 {
            warn!(path = %self.path, status = response.status, "Event stream rejected by server");
            return Err(SkyError::Stream {
                status: response.status,
                status_line: response.status_line,
            });
        }

        debug!(path = %self.path, "Event stream acknowledged");
        Ok(())
    }

    fn connection(&mut self) -> Result<&mut BufWriter<TcpStream>> {
        match &mut self.conn {
            Connection::Connected(conn) => Ok(conn),
            _ => Err(SkyError::NotConnected),
        }
    }
}

/// The literal request line and headers that open a stream.
pub(crate) fn request_header(host: &str, path: &str) -> Vec<u8> {
    format!(
        "PATCH {path} HTTP/1.0\r\nHost: {host}\r\nContent-Type: application/json\r\nTransfer-Encoding: chunked\r\n\r\n"
    )
    .into_bytes()
}

/// Frame `payload` as `{hex len}\r\n{payload}\r\n`.
pub(crate) async fn write_chunk<W: AsyncWrite + Unpin>(w: &mut W, payload: &[u8]) -> std::io::Result<()> {
    w.write_all(format!("{:x}\r\n", payload.len()).as_bytes()).await?;
    w.write_all(payload).await?;
    w.write_all(b"\r\n").await
}

/// How the length of a response body is determined.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BodyFraming {
    Length(u64),
    Chunked,
    UntilClose,
}

#[derive(Debug, PartialEq, Eq)]
pub(crate) struct Response {
    pub status: u16,
    /// Code and reason phrase, e.g. `"200 OK"`.
    pub status_line: String,
    pub body: BodyFraming,
}

/// Read one HTTP response's status line and headers.
pub(crate) async fn read_response_head<R: AsyncBufRead + Unpin>(reader: &mut R) -> Result<Response> {
    let mut line = String::new();
    if reader.read_line(&mut line).await? == 0 {
        return Err(SkyError::Io(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            "connection closed before stream response",
        )));
    }
    let (status, status_line) = parse_status_line(&line)?;

    let mut body = BodyFraming::UntilClose;
    loop {
        line.clear();
        if reader.read_line(&mut line).await? == 0 {
            break;
        }
        let header = line.trim_end();
        if header.is_empty() {
            break;
        }
        let Some((name, value)) = header.split_once(':') else {
            continue;
        };
        let (name, value) = (name.trim(), value.trim());
        if name.eq_ignore_ascii_case("transfer-encoding") && value.eq_ignore_ascii_case("chunked") {
            body = BodyFraming::Chunked;
        } else if name.eq_ignore_ascii_case("content-length") && body != BodyFraming::Chunked {
            if let Ok(len) = value.parse() {
                body = BodyFraming::Length(len);
            }
        }
    }

    Ok(Response {
        status,
        status_line,
        body,
    })
}

/// Consume a response body according to its framing.
pub(crate) async fn drain_body<R: AsyncBufRead + Unpin>(reader: &mut R, framing: BodyFraming) -> std::io::Result<()> {
    let mut sink = tokio::io::sink();
    match framing {
        BodyFraming::Length(len) => {
            tokio::io::copy(&mut (&mut *reader).take(len), &mut sink).await?;
        }
        BodyFraming::UntilClose => {
            tokio::io::copy(reader, &mut sink).await?;
        }
        BodyFraming::Chunked => {
            let mut line = String::new();
            loop {
                line.clear();
                if reader.read_line(&mut line).await? == 0 {
                    return Err(std::io::ErrorKind::UnexpectedEof.into());
                }
                let size = line.trim_end().split(';').next().unwrap_or_default().trim();
                let size = u64::from_str_radix(size, 16)
                    .map_err(|_| std::io::Error::new(std::io::ErrorKind::InvalidData, "bad chunk size"))?;
                if size == 0 {
                    break;
                }
                tokio::io::copy(&mut (&mut *reader).take(size + 2), &mut sink).await?;
            }
            // Trailers end at the first blank line.
            loop {
                line.clear();
                if reader.read_line(&mut line).await? == 0 || line.trim_end().is_empty() {
                    break;
                }
            }
        }
    }
    Ok(())
}

/// Split `HTTP/1.x 200 OK` into the code and `"200 OK"`.
fn parse_status_line(line: &str) -> Result<(u16, String)> {
    let line = line.trim_end();
    let malformed = || SkyError::Decode(format!("Malformed status line: {line:?}"));

    let (version, rest) = line.split_once(' ').ok_or_else(malformed)?;
    if !version.starts_with("HTTP/") {
        return Err(malformed());
    }
    let rest = rest.trim_start();
    let code = rest.split(' ').next().unwrap_or_default();
    let status = code.parse::<u16>().map_err(|_| malformed())?;

    Ok((status, rest.to_string()))
}
